use std::{error::Error, fs};
use std::fmt::Display;
use std::io::ErrorKind as IOErrorKind;
use std::path::Path;

use crate::{ProgramOrigin, RantProgram};
use crate::func::FunctionRegistry;
use self::parser::RantParser;

pub(crate) mod lexer;
pub(crate) mod reader;
pub(crate) mod parser;
pub(crate) mod query;
pub(crate) mod message;

pub use message::*;

/// Type alias for `Result<RantProgram, CompilerErrorKind>`
pub type CompileResult = Result<RantProgram, CompilerErrorKind>;

/// Describes why a compilation failed.
#[derive(Debug)]
pub enum CompilerErrorKind {
  /// Compilation failed due to one or more syntax errors.
  SyntaxError,
  /// Compilation failed due to a file I/O error.
  IOError(IOErrorKind),
}

impl Display for CompilerErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CompilerErrorKind::SyntaxError => write!(f, "syntax error"),
      CompilerErrorKind::IOError(_) => write!(f, "I/O error"),
    }
  }
}

impl Error for CompilerErrorKind {}

/// Provides an interface through which the compiler can report errors and warnings.
pub trait Reporter {
  /// Passes a compiler message to the implementor for processing.
  fn report(&mut self, msg: CompilerMessage);
}

impl Reporter for () {
  fn report(&mut self, _msg: CompilerMessage) {}
}

impl Reporter for Vec<CompilerMessage> {
  fn report(&mut self, msg: CompilerMessage) {
    self.push(msg);
  }
}

pub(crate) fn compile_string<R: Reporter>(
  source: &str,
  reporter: &mut R,
  registry: &FunctionRegistry,
  name: Option<&str>,
  origin: ProgramOrigin,
) -> CompileResult {
  let mut parser = RantParser::new(source, reporter, registry);

  match parser.parse() {
    Ok(root) => {
      let program = RantProgram::new(root, origin).with_source(source);
      match name {
        Some(name) => program.with_name(name).map_err(|_| CompilerErrorKind::SyntaxError),
        None => Ok(program),
      }
    },
    Err(()) => Err(CompilerErrorKind::SyntaxError),
  }
}

pub(crate) fn compile_file<P: AsRef<Path>, R: Reporter>(
  path: P,
  reporter: &mut R,
  registry: &FunctionRegistry,
) -> CompileResult {
  let source_name = path.as_ref()
    .canonicalize()
    .unwrap_or_else(|_| path.as_ref().to_path_buf())
    .to_string_lossy()
    .to_string();
  match fs::read_to_string(path) {
    Ok(source) => {
      let mut parser = RantParser::new(&source, reporter, registry);
      match parser.parse() {
        Ok(root) => Ok(RantProgram::new(root, ProgramOrigin::File(source_name)).with_source(&source)),
        Err(()) => Err(CompilerErrorKind::SyntaxError),
      }
    },
    Err(err) => {
      let problem = match err.kind() {
        IOErrorKind::NotFound => Problem::FileNotFound(source_name),
        _ => Problem::FileSystemError(err.to_string()),
      };
      reporter.report(CompilerMessage::new(problem, Severity::Error, None));
      Err(CompilerErrorKind::IOError(err.kind()))
    },
  }
}

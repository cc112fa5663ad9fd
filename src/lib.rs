//! # Rant
//!
//! Rant is a language for procedurally generating natural-language text.
//! A Rant *pattern* interleaves plain text with blocks of alternatives,
//! function calls, dictionary queries, repeaters, and subroutines; running a
//! compiled pattern against a seeded RNG (and, optionally, a dictionary)
//! produces a string.
//!
//! ## The Rant context
//!
//! Programs are compiled and run through a Rant context, represented by the
//! [`Rant`] struct. It owns the function registry, the dictionary, and the
//! execution budgets, and hands out [`RantProgram`] values from its
//! `compile*` methods.
//!
//! ## Reading compiler errors
//!
//! Compiler errors and warnings are reported through implementors of the
//! [`Reporter`] trait; the unit type discards them and `Vec<CompilerMessage>`
//! collects them.
//!
//! ## Program files
//!
//! A compiled program can be saved to, and later loaded from, a compact
//! binary form (`.rpgm`) without reparsing; see [`RantProgram::save`] and
//! [`RantProgram::load`].

pub mod compiler;
pub mod lang;
pub mod query;
pub mod runtime;

mod codec;
mod format;
mod func;
mod random;
mod stdlib;
mod table;

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;
use std::path::Path;
use std::rc::Rc;

use fnv::FnvHashMap;

pub use codec::{ProgramLoadError, PROGRAM_MAGIC};
pub use compiler::{CompileResult, CompilerErrorKind, CompilerMessage, Position, Problem, Reporter, Severity};
pub use format::{ArticleMode, CapsMode, Endianness, NumberFormat, NumeralSystem, OutputFormat};
pub use func::{FunctionGroup, FunctionOverload, FunctionParam, FunctionRegistry, NativeFunction, ParamMode, RantFuncArg, RantStdResult};
pub use random::RantRng;
pub use runtime::{RuntimeError, RuntimeErrorType, RuntimeLimits, RuntimeResult, SelectorMode, VM};
pub use table::{RantDictionary, RantEntry, RantTable};

use lang::{Rst, RstKind, Sequence, SubroutineDef};

/// The build version according to the crate metadata at the time of compiling.
pub const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The Rant language version implemented by this library.
pub const RANT_VERSION: &str = "3.0";

/// Compact string type used throughout the crate.
pub type InternalString = smartstring::alias::CompactString;

/// Characters that may not appear in a program name.
const PROGRAM_NAME_FORBIDDEN_CHARS: &[char] = &['$', '@', ':', '~', '%', '?', '>', '<', '[', ']', '|', '{', '}'];

/// A Rant execution context: options, function registry, and dictionary.
pub struct Rant {
  options: RantOptions,
  registry: FunctionRegistry,
  dictionary: Option<RantDictionary>,
}

impl Rant {
  /// Creates a new Rant context with the default seed (0) and loads the standard library.
  pub fn new() -> Self {
    Self::with_seed(0)
  }

  /// Creates a new Rant context with the specified seed and loads the standard library.
  pub fn with_seed(seed: u64) -> Self {
    Self::with_options(RantOptions {
      seed,
      .. Default::default()
    })
  }

  /// Creates a new Rant context with the specified options.
  pub fn with_options(options: RantOptions) -> Self {
    let mut registry = FunctionRegistry::new();
    if options.use_stdlib {
      stdlib::register_stdlib(&mut registry);
    }
    Self {
      options,
      registry,
      dictionary: None,
    }
  }

  /// Gets the function registry of the context.
  pub fn functions(&self) -> &FunctionRegistry {
    &self.registry
  }

  /// Gets mutable access to the function registry, e.g. to register host functions.
  pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
    &mut self.registry
  }

  /// Assigns the dictionary consulted by queries.
  pub fn set_dictionary(&mut self, dictionary: RantDictionary) {
    self.dictionary = Some(dictionary);
  }

  /// Gets the dictionary consulted by queries, if any.
  pub fn dictionary(&self) -> Option<&RantDictionary> {
    self.dictionary.as_ref()
  }

  /// Gets the current RNG seed.
  pub fn seed(&self) -> u64 {
    self.options.seed
  }

  /// Sets the seed used by subsequent runs.
  pub fn set_seed(&mut self, seed: u64) {
    self.options.seed = seed;
  }

  /// Gets the execution budgets applied to runs.
  pub fn limits(&self) -> RuntimeLimits {
    self.options.limits
  }

  /// Compiles a source string using the specified reporter.
  #[must_use = "compiling a program without storing or running it achieves nothing"]
  pub fn compile<R: Reporter>(&self, source: &str, reporter: &mut R) -> CompileResult {
    compiler::compile_string(source, reporter, &self.registry, None, ProgramOrigin::String)
  }

  /// Compiles a source string and assigns a (canonicalized) name to the program.
  #[must_use = "compiling a program without storing or running it achieves nothing"]
  pub fn compile_named<R: Reporter>(&self, source: &str, name: &str, reporter: &mut R) -> CompileResult {
    compiler::compile_string(source, reporter, &self.registry, Some(name), ProgramOrigin::String)
  }

  /// Compiles a source string without reporting problems.
  #[must_use = "compiling a program without storing or running it achieves nothing"]
  pub fn compile_quiet(&self, source: &str) -> CompileResult {
    self.compile(source, &mut ())
  }

  /// Compiles a source file using the specified reporter.
  #[must_use = "compiling a program without storing or running it achieves nothing"]
  pub fn compile_file<P: AsRef<Path>, R: Reporter>(&self, path: P, reporter: &mut R) -> CompileResult {
    compiler::compile_file(path, reporter, &self.registry)
  }

  /// Runs the specified program with the context seed.
  pub fn run(&self, program: &RantProgram) -> RuntimeResult<RunResult> {
    self.run_seeded(program, None, self.options.seed)
  }

  /// Runs the specified program with arguments and the context seed.
  pub fn run_with(&self, program: &RantProgram, args: &ProgramArgs) -> RuntimeResult<RunResult> {
    self.run_seeded(program, Some(args), self.options.seed)
  }

  /// Runs the specified program with an explicit seed. Output is a pure
  /// function of (program, seed, args, dictionary).
  pub fn run_seeded(&self, program: &RantProgram, args: Option<&ProgramArgs>, seed: u64) -> RuntimeResult<RunResult> {
    let rng = Rc::new(RantRng::new(seed));
    VM::new(rng, self, program).run(args)
  }
}

impl Default for Rant {
  fn default() -> Self {
    Self::new()
  }
}

/// Provides options for customizing the creation of a `Rant` instance.
#[derive(Debug, Copy, Clone)]
pub struct RantOptions {
  /// Specifies whether the standard library should be loaded.
  pub use_stdlib: bool,
  /// The seed used by runs that don't specify their own. Defaults to 0.
  pub seed: u64,
  /// Execution budgets applied to every run.
  pub limits: RuntimeLimits,
}

impl Default for RantOptions {
  fn default() -> Self {
    Self {
      use_stdlib: true,
      seed: 0,
      limits: Default::default(),
    }
  }
}

/// Where a program came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramOrigin {
  /// Compiled from an in-memory string.
  String,
  /// Compiled from a source file.
  File(String),
  /// Loaded from serialized program data.
  Stream,
}

/// Error returned when a program name fails validation.
#[derive(Debug, PartialEq, Eq)]
pub struct InvalidProgramName(String);

impl Display for InvalidProgramName {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "invalid program name: '{}'", self.0)
  }
}

impl Error for InvalidProgramName {}

/// Canonicalizes a program name: validates its character set, splits it on
/// slashes, trims each segment, and rejoins. Canonicalization is idempotent.
pub fn canonicalize_program_name(name: &str) -> Result<String, InvalidProgramName> {
  if name.trim().is_empty() {
    return Err(InvalidProgramName(name.to_owned()))
  }
  if name.chars().any(|c| PROGRAM_NAME_FORBIDDEN_CHARS.contains(&c)) {
    return Err(InvalidProgramName(name.to_owned()))
  }
  let segments: Vec<&str> = name.split('/')
    .map(|segment| segment.trim())
    .filter(|segment| !segment.is_empty())
    .collect();
  if segments.is_empty() {
    return Err(InvalidProgramName(name.to_owned()))
  }
  Ok(segments.join("/"))
}

/// A compiled Rant program: an immutable RST plus its module table.
/// Safe to run any number of times; every run gets its own engine state.
#[derive(Debug)]
pub struct RantProgram {
  name: Option<String>,
  origin: ProgramOrigin,
  source: Option<String>,
  root: Rc<Sequence>,
  modules: FnvHashMap<InternalString, Rc<SubroutineDef>>,
}

impl RantProgram {
  pub(crate) fn new(root: Rc<Sequence>, origin: ProgramOrigin) -> Self {
    let modules = collect_modules(&root);
    Self {
      name: None,
      origin,
      source: None,
      root,
      modules,
    }
  }

  pub(crate) fn with_source(mut self, source: &str) -> Self {
    self.source = Some(source.to_owned());
    self
  }

  /// Consumes the program and returns it under the canonicalized name.
  pub fn with_name(mut self, name: &str) -> Result<Self, InvalidProgramName> {
    self.name = Some(canonicalize_program_name(name)?);
    Ok(self)
  }

  /// Gets the name of the program, if any.
  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  /// Gets the origin of the program.
  pub fn origin(&self) -> &ProgramOrigin {
    &self.origin
  }

  /// Gets the original source text, when it is known.
  pub fn source(&self) -> Option<&str> {
    self.source.as_deref()
  }

  pub(crate) fn root(&self) -> &Rc<Sequence> {
    &self.root
  }

  /// Looks up a module (top-level subroutine definition) by name.
  pub fn module(&self, name: &str) -> Option<&Rc<SubroutineDef>> {
    self.modules.get(name)
  }

  /// Iterates over the program's module table.
  pub fn modules(&self) -> impl Iterator<Item = (&str, &Rc<SubroutineDef>)> {
    self.modules.iter().map(|(name, def)| (name.as_str(), def))
  }

  /// Serializes the program to its binary form.
  pub fn save(&self) -> Vec<u8> {
    codec::encode_program(&self.root)
  }

  /// Loads a program from its binary form. The module table is rebuilt from
  /// the deserialized tree.
  pub fn load(bytes: &[u8]) -> Result<Self, ProgramLoadError> {
    let root = Rc::new(codec::decode_program(bytes)?);
    Ok(Self::new(root, ProgramOrigin::Stream))
  }
}

/// Collects the program's module table from its top-level subroutine definitions.
fn collect_modules(root: &Sequence) -> FnvHashMap<InternalString, Rc<SubroutineDef>> {
  let mut modules = FnvHashMap::default();
  for rst in root.iter() {
    if let Rst { kind: RstKind::SubDef(def), .. } = rst.as_ref() {
      modules.insert(InternalString::from(def.name.as_str()), Rc::clone(def));
    }
  }
  modules
}

/// Named string arguments passed to a program run. Each field is exposed to
/// the pattern under its declared name, or under a declared alias.
#[derive(Debug, Clone, Default)]
pub struct ProgramArgs {
  fields: FnvHashMap<String, String>,
}

impl ProgramArgs {
  pub fn new() -> Self {
    Default::default()
  }

  /// Adds a field under its own name.
  pub fn arg(mut self, name: &str, value: &str) -> Self {
    self.set(name, value);
    self
  }

  /// Adds a field exposed to the pattern under an alias.
  pub fn arg_as(mut self, _name: &str, alias: &str, value: &str) -> Self {
    self.set(alias, value);
    self
  }

  pub fn set(&mut self, name: &str, value: &str) {
    self.fields.insert(name.to_owned(), value.to_owned());
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.fields.get(name).map(|v| v.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize {
    self.fields.len()
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }
}

/// The output of a program run: the main channel plus all public channels.
#[derive(Debug)]
pub struct RunResult {
  /// Contents of the main channel.
  pub main: String,
  /// Contents of every named public channel.
  pub channels: HashMap<String, String>,
}

impl RunResult {
  /// Gets a channel's output by name.
  pub fn channel(&self, name: &str) -> Option<&str> {
    if name == runtime::MAIN_CHANNEL_NAME {
      return Some(self.main.as_str())
    }
    self.channels.get(name).map(|v| v.as_str())
  }
}

impl Display for RunResult {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.main)
  }
}

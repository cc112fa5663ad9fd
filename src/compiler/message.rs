use std::{fmt::Display, ops::Range};

/// Describes where in a source file a message was triggered.
#[derive(Debug, Clone)]
pub struct Position {
  line: usize,
  col: usize,
  span: Range<usize>,
}

impl Position {
  pub(crate) fn new(line: usize, col: usize, span: Range<usize>) -> Self {
    Self {
      line,
      col,
      span,
    }
  }

  /// Gets the line number of the position.
  pub fn line(&self) -> usize {
    self.line
  }

  /// Gets the column number of the position.
  pub fn col(&self) -> usize {
    self.col
  }

  /// Gets the span associated with the position.
  pub fn span(&self) -> Range<usize> {
    self.span.clone()
  }
}

impl Display for Position {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{},{}", self.line, self.col)
  }
}

/// Describes the severity of a compiler message.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Severity {
  /// Advises the user of a potential problem, but still allows compilation to finish.
  Warning,
  /// Advises the user of a problem that prevents the source from compiling.
  Error,
  /// A problem that stops compilation on the spot.
  Fatal,
}

impl Display for Severity {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", match self {
      Severity::Warning => "warning",
      Severity::Error => "error",
      Severity::Fatal => "fatal",
    })
  }
}

/// Describes the location and nature of a compiler message.
#[derive(Debug)]
pub struct CompilerMessage {
  pos: Option<Position>,
  severity: Severity,
  info: Problem,
}

impl CompilerMessage {
  pub(crate) fn new(info: Problem, severity: Severity, pos: Option<Position>) -> Self {
    Self {
      info,
      severity,
      pos,
    }
  }

  /// Gets the position in the source where the message was triggered.
  pub fn pos(&self) -> Option<Position> {
    self.pos.clone()
  }

  /// Gets the severity of the message.
  pub fn severity(&self) -> Severity {
    self.severity
  }

  /// Gets a reference to the problem variant triggering the message.
  pub fn info(&self) -> &Problem {
    &self.info
  }

  /// Gets the message code associated with the message.
  pub fn code(&self) -> &'static str {
    self.info.code()
  }

  /// Gets a message describing the problem.
  pub fn message(&self) -> String {
    self.info.message()
  }

  /// Gets the inline message text, usually used to annotate the span.
  pub fn inline_message(&self) -> Option<String> {
    self.info.inline_message()
  }

  /// Returns true if the message is an error or worse.
  pub fn is_error(&self) -> bool {
    matches!(self.severity, Severity::Error | Severity::Fatal)
  }
}

impl Display for CompilerMessage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[{}] {}", self.code(), self.message())?;
    if let Some(pos) = &self.pos {
      write!(f, " ({})", pos)?;
    }
    Ok(())
  }
}

/// Describes a problem (warning/error) encountered when building a source.
#[derive(Debug)]
pub enum Problem {
  UnexpectedToken(String),
  ExpectedToken(String),
  UnclosedBlock,
  UnclosedTag,
  UnclosedQuery,
  UnclosedSubroutineSignature,
  UnclosedSubroutineBody,
  UnclosedList,
  UnclosedReplacer,
  UnclosedRegex,
  InvalidEscape,
  InvalidRegex(String),
  UnknownRegexFlag(char),
  MissingIdentifier,
  InvalidIdentifier(String),
  DuplicateParameter(String),
  UnknownFunction(String),
  WrongArity(String, usize),
  InvalidWeight,
  UnknownChannelVisibility(String),
  UnknownSpecialConstant(String),
  MultipleSubtypes,
  SubtypeAfterExclusive,
  MultipleCarriers,
  EmptySyllableRange,
  InvalidSyllableRange,
  UnknownQueryClause(String),
  FileNotFound(String),
  FileSystemError(String),
}

impl Problem {
  pub fn code(&self) -> &'static str {
    match self {
      // Common errors (0000 - 0019)
      Problem::UnexpectedToken(_) =>              "R-0000",
      Problem::ExpectedToken(_) =>                "R-0001",
      Problem::UnclosedBlock =>                   "R-0002",
      Problem::UnclosedTag =>                     "R-0003",
      Problem::UnclosedSubroutineSignature =>     "R-0004",
      Problem::UnclosedSubroutineBody =>          "R-0005",
      Problem::UnclosedList =>                    "R-0006",
      Problem::UnclosedReplacer =>                "R-0007",
      Problem::UnclosedRegex =>                   "R-0008",
      Problem::InvalidEscape =>                   "R-0009",
      Problem::InvalidRegex(_) =>                 "R-0010",
      Problem::InvalidWeight =>                   "R-0011",

      // Identifier errors (0020 - 0029)
      Problem::MissingIdentifier =>               "R-0020",
      Problem::InvalidIdentifier(_) =>            "R-0021",
      Problem::DuplicateParameter(_) =>           "R-0022",

      // Tag errors (0030 - 0039)
      Problem::UnknownFunction(_) =>              "R-0030",
      Problem::WrongArity(..) =>                  "R-0031",
      Problem::UnknownChannelVisibility(_) =>     "R-0032",
      Problem::UnknownSpecialConstant(_) =>       "R-0033",

      // Query errors (0040 - 0049)
      Problem::UnclosedQuery =>                   "R-0040",
      Problem::MultipleSubtypes =>                "R-0041",
      Problem::SubtypeAfterExclusive =>           "R-0042",
      Problem::MultipleCarriers =>                "R-0043",
      Problem::EmptySyllableRange =>              "R-0044",
      Problem::InvalidSyllableRange =>            "R-0045",
      Problem::UnknownQueryClause(_) =>           "R-0046",

      // File access errors (0100 - 0109)
      Problem::FileNotFound(_) =>                 "R-0100",
      Problem::FileSystemError(_) =>              "R-0101",

      // Common warnings (1000 - 1019)
      Problem::UnknownRegexFlag(_) =>             "R-1000",
    }
  }

  pub fn message(&self) -> String {
    match self {
      Problem::UnexpectedToken(token) => format!("unexpected token: '{}'", token),
      Problem::ExpectedToken(token) => format!("expected token: '{}'", token),
      Problem::UnclosedBlock => "unclosed block; expected '}'".to_owned(),
      Problem::UnclosedTag => "unclosed tag; expected ']'".to_owned(),
      Problem::UnclosedQuery => "unclosed query; expected '>'".to_owned(),
      Problem::UnclosedSubroutineSignature => "unclosed subroutine signature; expected ']' followed by body".to_owned(),
      Problem::UnclosedSubroutineBody => "unclosed subroutine body; expected '}'".to_owned(),
      Problem::UnclosedList => "unclosed list; expected ')'".to_owned(),
      Problem::UnclosedReplacer => "unclosed replacer; expected '%'".to_owned(),
      Problem::UnclosedRegex => "unclosed regex literal".to_owned(),
      Problem::InvalidEscape => "escape sequence is missing a character".to_owned(),
      Problem::InvalidRegex(err) => format!("invalid regex: {}", err),
      Problem::UnknownRegexFlag(flag) => format!("unknown regex flag: '{}'", flag),
      Problem::MissingIdentifier => "identifier required but is missing".to_owned(),
      Problem::InvalidIdentifier(idname) => format!("'{}' is not a valid identifier; identifiers may only use alphanumeric characters, underscores, and hyphens but must also contain at least one non-digit", idname),
      Problem::DuplicateParameter(pname) => format!("duplicate parameter '{}' in subroutine signature", pname),
      Problem::UnknownFunction(fname) => format!("function '{}' does not exist", fname),
      Problem::WrongArity(fname, argc) => format!("function '{}' has no overload taking {} argument(s)", fname, argc),
      Problem::InvalidWeight => "branch weight must be an integer or real literal".to_owned(),
      Problem::UnknownChannelVisibility(vis) => format!("unknown channel visibility: '{}'", vis),
      Problem::UnknownSpecialConstant(name) => format!("'{}' is not a special constant; expected 'seed' or 'version'", name),
      Problem::MultipleSubtypes => "query already has a subtype".to_owned(),
      Problem::SubtypeAfterExclusive => "subtype must appear before the exclusive sigil".to_owned(),
      Problem::MultipleCarriers => "query already has a carrier".to_owned(),
      Problem::EmptySyllableRange => "syllable range cannot be empty".to_owned(),
      Problem::InvalidSyllableRange => "syllable range bounds must be integers".to_owned(),
      Problem::UnknownQueryClause(token) => format!("token not valid in query: '{}'", token),
      Problem::FileNotFound(file) => format!("file not found: '{}'", file),
      Problem::FileSystemError(err) => format!("filesystem error: {}", err),
    }
  }

  pub fn inline_message(&self) -> Option<String> {
    Some(match self {
      Problem::UnclosedBlock => "no matching '}' found".to_owned(),
      Problem::UnclosedTag => "no matching ']' found".to_owned(),
      Problem::UnclosedQuery => "no matching '>' found".to_owned(),
      Problem::UnclosedSubroutineSignature => "no matching ']' found".to_owned(),
      Problem::UnclosedSubroutineBody => "no matching '}' found".to_owned(),
      Problem::UnclosedList => "no matching ')' found".to_owned(),
      Problem::UnclosedReplacer => "no matching '%' found".to_owned(),
      Problem::UnclosedRegex => "regex literal needs closing backtick".to_owned(),
      Problem::ExpectedToken(token) => format!("expected '{}'", token),
      Problem::MissingIdentifier => "missing identifier".to_owned(),
      Problem::InvalidIdentifier(_) => "invalid identifier".to_owned(),
      Problem::DuplicateParameter(_) => "rename parameter to something unique".to_owned(),
      Problem::UnknownFunction(_) => "no such function".to_owned(),
      Problem::WrongArity(..) => "wrong number of arguments".to_owned(),
      Problem::UnknownSpecialConstant(_) => "no such special constant".to_owned(),
      Problem::SubtypeAfterExclusive => "move subtype before '$'".to_owned(),
      Problem::EmptySyllableRange => "specify at least one bound".to_owned(),
      _ => return None,
    })
  }
}

impl Display for Problem {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.message())
  }
}

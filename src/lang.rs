//! The `lang` module contains Rant's syntax tree implementation and supporting data structures.

use std::{fmt::Display, ops::{Deref, DerefMut, Range}, rc::Rc};
use crate::InternalString;
use crate::query::Query;

/// Checks if an identifier (variable, subroutine, channel, mark, or target name) is valid.
pub fn is_valid_ident(name: &str) -> bool {
  if name.is_empty() { return false }
  let mut has_non_digit = false;
  let is_valid_chars = name.chars().all(|c| {
    has_non_digit |= !c.is_ascii_digit();
    c.is_alphanumeric() || matches!(c, '_' | '-')
  });
  has_non_digit && is_valid_chars
}

/// Identifiers are special strings used to name variables, subroutines, marks, targets, and channels.
/// This is just a wrapper around a CompactString that enforces identifier formatting requirements.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Identifier(InternalString);

impl Identifier {
  pub fn new(idstr: InternalString) -> Self {
    Self(idstr)
  }
}

impl Deref for Identifier {
  type Target = InternalString;
  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl Display for Identifier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A series of Rant program elements.
#[derive(Debug, PartialEq)]
pub struct Sequence(Vec<Rc<Rst>>);

impl Sequence {
  pub fn new(seq: Vec<Rc<Rst>>) -> Self {
    Self(seq)
  }

  pub fn one(rst: Rst) -> Self {
    Self(vec![Rc::new(rst)])
  }

  pub fn empty() -> Self {
    Self::new(vec![])
  }
}

impl Deref for Sequence {
  type Target = Vec<Rc<Rst>>;
  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl DerefMut for Sequence {
  fn deref_mut(&mut self) -> &mut Self::Target {
    &mut self.0
  }
}

/// A single branch of a block, with an optional selection weight.
#[derive(Debug, PartialEq)]
pub struct BlockBranch {
  /// Selection weight; unweighted branches weigh 1.
  pub weight: Option<f64>,
  /// The branch body.
  pub body: Rc<Sequence>,
}

/// A block is a set of zero or more branches, of which one is selected per iteration.
#[derive(Debug, PartialEq)]
pub struct Block {
  pub branches: Vec<BlockBranch>,
}

impl Block {
  pub fn new(branches: Vec<BlockBranch>) -> Self {
    Block { branches }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.branches.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.branches.is_empty()
  }

  /// True if any branch declares an explicit weight.
  #[inline]
  pub fn is_weighted(&self) -> bool {
    self.branches.iter().any(|b| b.weight.is_some())
  }
}

/// Describes how a function argument is handed to its callee.
#[derive(Debug, PartialEq)]
pub enum FunctionArg {
  /// Argument is evaluated into a sub-output and passed as a string.
  Cooked(Rc<Sequence>),
  /// Argument is passed unevaluated for the callee to run (or not) itself.
  Raw(Rc<Sequence>),
}

impl FunctionArg {
  #[inline]
  pub fn sequence(&self) -> &Rc<Sequence> {
    match self {
      FunctionArg::Cooked(seq) | FunctionArg::Raw(seq) => seq,
    }
  }
}

/// Describes a call to a registry function.
#[derive(Debug, PartialEq)]
pub struct FunctionCall {
  pub name: Identifier,
  pub args: Vec<FunctionArg>,
}

/// Describes a subroutine definition.
#[derive(Debug, PartialEq)]
pub struct SubroutineDef {
  pub name: Identifier,
  pub params: Vec<Identifier>,
  pub body: Rc<Sequence>,
}

/// Describes a call to a previously defined subroutine.
#[derive(Debug, PartialEq)]
pub struct SubroutineCall {
  pub name: Identifier,
  pub args: Vec<Rc<Sequence>>,
}

/// Describes a conditional with an optional else-branch.
#[derive(Debug, PartialEq)]
pub struct Conditional {
  pub condition: Rc<Sequence>,
  /// Inverts the condition (`[unless:...]`).
  pub negate: bool,
  pub then_body: Rc<Sequence>,
  pub else_body: Option<Rc<Sequence>>,
}

/// Arithmetic operators usable in arithmetic expression nodes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum ArithOp {
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Neg,
}

impl ArithOp {
  /// Number of operands the operator consumes.
  #[inline]
  pub fn operand_count(&self) -> usize {
    match self {
      ArithOp::Neg => 1,
      _ => 2,
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    Some(match name {
      "add" => ArithOp::Add,
      "sub" => ArithOp::Sub,
      "mul" => ArithOp::Mul,
      "div" => ArithOp::Div,
      "mod" => ArithOp::Mod,
      "neg" => ArithOp::Neg,
      _ => return None,
    })
  }

  pub fn name(&self) -> &'static str {
    match self {
      ArithOp::Add => "add",
      ArithOp::Sub => "sub",
      ArithOp::Mul => "mul",
      ArithOp::Div => "div",
      ArithOp::Mod => "mod",
      ArithOp::Neg => "neg",
    }
  }
}

/// Visibility of an output channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelVisibility {
  /// Channel is exposed in the run result and writes pass through to channels below it.
  Public,
  /// Channel captures writes for itself and is excluded from the run result.
  Private,
  /// Channel captures writes for itself and appends its contents to its parent when closed.
  Internal,
}

impl ChannelVisibility {
  pub fn from_name(name: &str) -> Option<Self> {
    Some(match name {
      "public" => Self::Public,
      "private" => Self::Private,
      "internal" => Self::Internal,
      _ => return None,
    })
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::Public => "public",
      Self::Private => "private",
      Self::Internal => "internal",
    }
  }
}

/// Character classes producible by random character escapes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum CharClass {
  /// `\d` — decimal digit
  Digit,
  /// `\x` — lowercase hex digit
  HexLower,
  /// `\X` — uppercase hex digit
  HexUpper,
  /// `\c` — lowercase letter
  LetterLower,
  /// `\C` — uppercase letter
  LetterUpper,
}

impl CharClass {
  pub fn from_code(code: char) -> Option<Self> {
    Some(match code {
      'd' => Self::Digit,
      'x' => Self::HexLower,
      'X' => Self::HexUpper,
      'c' => Self::LetterLower,
      'C' => Self::LetterUpper,
      _ => return None,
    })
  }

  pub fn code(&self) -> char {
    match self {
      Self::Digit => 'd',
      Self::HexLower => 'x',
      Self::HexUpper => 'X',
      Self::LetterLower => 'c',
      Self::LetterUpper => 'C',
    }
  }
}

/// A compiled regex literal. Equality considers the source pattern and flags only.
#[derive(Debug, Clone)]
pub struct RantRegex {
  pattern: InternalString,
  case_insensitive: bool,
  regex: regex::Regex,
}

impl RantRegex {
  /// Compiles a pattern with the supplied flags.
  pub fn compile(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
    let regex = regex::RegexBuilder::new(pattern)
      .case_insensitive(case_insensitive)
      .build()?;
    Ok(Self {
      pattern: InternalString::from(pattern),
      case_insensitive,
      regex,
    })
  }

  #[inline]
  pub fn pattern(&self) -> &str {
    self.pattern.as_str()
  }

  #[inline]
  pub fn is_case_insensitive(&self) -> bool {
    self.case_insensitive
  }

  #[inline]
  pub fn is_match(&self, haystack: &str) -> bool {
    self.regex.is_match(haystack)
  }

  #[inline]
  pub fn replace_all(&self, haystack: &str, replacement: &str) -> String {
    self.regex.replace_all(haystack, regex::NoExpand(replacement)).into_owned()
  }
}

impl PartialEq for RantRegex {
  fn eq(&self, other: &Self) -> bool {
    self.pattern == other.pattern && self.case_insensitive == other.case_insensitive
  }
}

/// Describes a regex replacer construct.
#[derive(Debug, PartialEq)]
pub struct Replacer {
  pub pattern: RantRegex,
  pub subject: Rc<Sequence>,
  pub replacement: Rc<Sequence>,
}

/// A single node of the Runtime Syntax Tree with its source span.
#[derive(Debug, PartialEq)]
pub struct Rst {
  /// Byte span of the node in the original source; `0..0` when unknown.
  pub span: Range<usize>,
  pub kind: RstKind,
}

impl Rst {
  pub fn new(span: Range<usize>, kind: RstKind) -> Self {
    Self { span, kind }
  }

  pub fn display_name(&self) -> &'static str {
    self.kind.display_name()
  }
}

impl Display for Rst {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.display_name())
  }
}

/// Rant Syntax Tree node variants.
#[derive(Debug, PartialEq)]
pub enum RstKind {
  /// No Operation
  Nop,
  /// Verbatim text
  Fragment(InternalString),
  /// Printable whitespace
  Whitespace(InternalString),
  /// Integer literal (digit run)
  Integer(i64),
  /// Sequence of child nodes
  Sequence(Rc<Sequence>),
  /// Block containing zero or more branches
  Block(Rc<Block>),
  /// Call to a registry function
  Tag(FunctionCall),
  /// Dictionary query
  Query(Rc<Query>),
  /// Variable getter
  VarGet(Identifier),
  /// Variable setter
  VarSet(Identifier, Rc<Sequence>),
  /// Subroutine definition
  SubDef(Rc<SubroutineDef>),
  /// Subroutine call
  SubCall(SubroutineCall),
  /// Conditional
  Conditional(Conditional),
  /// Arithmetic expression
  Arith {
    op: ArithOp,
    operands: Vec<Rc<Sequence>>,
  },
  /// List literal
  ListInit(Rc<Vec<Rc<Sequence>>>),
  /// Channel directive
  Channel {
    name: Identifier,
    visibility: ChannelVisibility,
    body: Rc<Sequence>,
  },
  /// Records the current output position under a name
  Mark(Identifier),
  /// Prints the character distance between two marks
  Dist(Identifier, Identifier),
  /// Declares an empty target region in the output
  DefTarget(Identifier),
  /// Deferred write into a target region
  Send(Identifier, Rc<Sequence>),
  /// Regex replacer
  Replace(Rc<Replacer>),
  /// Random character generator (`\8,x` and friends)
  CharGen {
    class: CharClass,
    count: u32,
  },
  /// Deferred indefinite article (`\a`)
  Article,
}

impl RstKind {
  pub fn display_name(&self) -> &'static str {
    match self {
      RstKind::Nop =>             "nothing",
      RstKind::Fragment(_) =>     "fragment",
      RstKind::Whitespace(_) =>   "whitespace",
      RstKind::Integer(_) =>      "integer",
      RstKind::Sequence(_) =>     "sequence",
      RstKind::Block(_) =>        "block",
      RstKind::Tag(_) =>          "tag",
      RstKind::Query(_) =>        "query",
      RstKind::VarGet(_) =>       "variable",
      RstKind::VarSet(..) =>      "variable assignment",
      RstKind::SubDef(_) =>       "subroutine definition",
      RstKind::SubCall(_) =>      "subroutine call",
      RstKind::Conditional(_) =>  "conditional",
      RstKind::Arith { .. } =>    "arithmetic expression",
      RstKind::ListInit(_) =>     "list",
      RstKind::Channel { .. } =>  "channel directive",
      RstKind::Mark(_) =>         "mark",
      RstKind::Dist(..) =>        "distance",
      RstKind::DefTarget(_) =>    "target",
      RstKind::Send(..) =>        "send",
      RstKind::Replace(_) =>      "replacer",
      RstKind::CharGen { .. } =>  "character generator",
      RstKind::Article =>         "article",
    }
  }
}

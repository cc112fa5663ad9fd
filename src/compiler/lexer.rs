use logos::*;
use crate::InternalString;
use crate::lang::CharClass;

/// Payload of an escape sequence token.
#[derive(Debug, Clone, PartialEq)]
pub struct EscapeSeq {
  /// Repetition count; 1 unless a digit-count prefix was used (`\8,x`).
  pub count: u32,
  pub kind: EscapeKind,
}

/// What an escape sequence produces.
#[derive(Debug, Clone, PartialEq)]
pub enum EscapeKind {
  /// A literal character.
  Char(char),
  /// A random character from a character class.
  Class(CharClass),
  /// A deferred indefinite article.
  Article,
}

/// Raw parts of a regex literal; compiled by the parser so that bad patterns
/// get a proper diagnostic instead of a lexer error.
#[derive(Debug, Clone, PartialEq)]
pub struct RegexParts {
  pub pattern: InternalString,
  pub flags: InternalString,
}

#[derive(Logos, Debug, Clone, PartialEq)]
pub enum RantToken {
  /// Sequence of printable word characters
  #[error]
  #[regex(r"\w+", priority = 2)]
  Fragment,

  /// Sequence of printable whitespace characters
  #[regex(r"[ \t]+")]
  Whitespace,

  /// Line breaks and adjacent whitespace; structural, never printed
  #[regex(r"[\r\n]+\s*|[ \t]*[\r\n]+\s*", logos::skip, priority = 3)]
  Blackspace,

  /// `{`
  #[token("{")]
  LeftBrace,

  /// `}`
  #[token("}")]
  RightBrace,

  /// `|`
  #[token("|")]
  Pipe,

  /// `[`
  #[token("[")]
  LeftBracket,

  /// `]`
  #[token("]")]
  RightBracket,

  /// `<`
  #[token("<")]
  LeftAngle,

  /// `>`
  #[token(">")]
  RightAngle,

  /// `(`
  #[token("(")]
  LeftParen,

  /// `)`
  #[token(")")]
  RightParen,

  /// `::`
  #[token("::")]
  DoubleColon,

  /// `:`
  #[token(":")]
  Colon,

  /// `;`
  #[token(";")]
  Semicolon,

  /// `,`
  #[token(",")]
  Comma,

  /// `.`
  #[token(".")]
  Dot,

  /// `/`
  #[token("/")]
  Slash,

  /// `$`
  #[token("$")]
  Dollar,

  /// `?`
  #[token("?")]
  Question,

  /// `!`
  #[token("!")]
  Bang,

  /// `-`
  #[token("-")]
  Minus,

  /// `~`
  #[token("~")]
  Tilde,

  /// `%`
  #[token("%")]
  Percent,

  /// `@`
  #[token("@")]
  At,

  /// `=`
  #[token("=")]
  Equals,

  /// Unsigned digit run
  #[regex(r"[0-9]+", parse_integer, priority = 3)]
  Integer(i64),

  /// Real literal, only meaningful in branch weights
  #[regex(r"[0-9]+\.[0-9]+", parse_float, priority = 4)]
  Float(f64),

  /// Any escape sequence, with an optional digit-count prefix
  #[regex(r"\\[0-9]+,\S", parse_counted_escape, priority = 11)]
  #[regex(r"\\\S", parse_escape, priority = 10)]
  Escape(EscapeSeq),

  /// Trailing backslash with nothing to escape
  #[token("\\")]
  InvalidEscape,

  /// Backtick-delimited regex literal with optional trailing flags, e.g. `` `[aeiou]`i ``
  #[regex(r"`([^`\\]|\\.)*`[A-Za-z]*", parse_regex_parts)]
  Regex(RegexParts),

  /// Error token indicating an unterminated regex literal
  #[regex(r"`([^`\\]|\\.)*")]
  UnterminatedRegex,
}

impl RantToken {
  /// True for tokens the loose reader skips.
  #[inline]
  pub fn is_whitespace(&self) -> bool {
    matches!(self, RantToken::Whitespace)
  }
}

fn parse_regex_parts(lex: &mut Lexer<RantToken>) -> RegexParts {
  let slice = lex.slice();
  let close = slice.rfind('`').unwrap();
  let raw_pattern = &slice[1..close];
  // Unescape backtick escapes; everything else is left for the regex engine
  let mut pattern = InternalString::new();
  let mut chars = raw_pattern.chars().peekable();
  while let Some(c) = chars.next() {
    if c == '\\' && chars.peek() == Some(&'`') {
      pattern.push(chars.next().unwrap());
    } else {
      pattern.push(c);
    }
  }
  RegexParts {
    pattern,
    flags: InternalString::from(&slice[close + 1..]),
  }
}

fn char_escape_kind(code: char) -> EscapeKind {
  if let Some(class) = CharClass::from_code(code) {
    return EscapeKind::Class(class)
  }
  match code {
    'n' => EscapeKind::Char('\n'),
    'r' => EscapeKind::Char('\r'),
    't' => EscapeKind::Char('\t'),
    's' => EscapeKind::Char(' '),
    '0' => EscapeKind::Char('\0'),
    'a' => EscapeKind::Article,
    other => EscapeKind::Char(other),
  }
}

fn parse_escape(lex: &mut Lexer<RantToken>) -> Option<EscapeSeq> {
  let code = lex.slice().chars().nth(1)?;
  Some(EscapeSeq {
    count: 1,
    kind: char_escape_kind(code),
  })
}

fn parse_counted_escape(lex: &mut Lexer<RantToken>) -> Option<EscapeSeq> {
  let slice = &lex.slice()[1..];
  let comma = slice.find(',')?;
  let count: u32 = slice[..comma].parse().ok()?;
  let code = slice[comma + 1..].chars().next()?;
  Some(EscapeSeq {
    count,
    kind: char_escape_kind(code),
  })
}

fn parse_float(lex: &mut Lexer<RantToken>) -> Option<f64> {
  lex.slice().parse().ok()
}

fn parse_integer(lex: &mut Lexer<RantToken>) -> Option<i64> {
  lex.slice().parse().ok()
}

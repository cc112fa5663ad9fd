use logos::*;
use super::lexer::RantToken;
use std::mem;
use std::ops::Range;
use crate::InternalString;

/// Error produced by an expectation read: names what was expected and what was found.
/// The reader position is left at the offending token.
#[derive(Debug)]
pub struct ExpectError {
  pub expected: &'static str,
  pub found: Option<InternalString>,
  pub span: Range<usize>,
}

/// Wraps the lexer in a single-token-lookahead reader with "loose"
/// (whitespace-skipping) read variants.
pub struct RantTokenReader<'source> {
  source: &'source str,
  lexer: Lexer<'source, RantToken>,
  peeked: Option<(RantToken, Range<usize>)>,
  last_span: Range<usize>,
}

impl<'source> RantTokenReader<'source> {
  pub fn new(src: &'source str) -> Self {
    Self {
      source: src,
      lexer: RantToken::lexer(src),
      peeked: None,
      last_span: 0..0,
    }
  }

  /// Consumes and returns the next token, or `None` at end of stream.
  pub fn next(&mut self) -> Option<(RantToken, Range<usize>)> {
    let token = self.peeked.take().or_else(|| {
      self.lexer.next().map(|token| (token, self.lexer.span()))
    });
    if let Some((_, span)) = &token {
      self.last_span = span.clone();
    }
    token
  }

  /// Consumes and returns the next non-whitespace token.
  pub fn next_solid(&mut self) -> Option<(RantToken, Range<usize>)> {
    loop {
      match self.next() {
        Some((token, _)) if token.is_whitespace() => continue,
        other => return other,
      }
    }
  }

  /// Returns a reference to the next token without consuming it.
  pub fn peek(&mut self) -> Option<&(RantToken, Range<usize>)> {
    if self.peeked.is_none() {
      self.peeked = self.lexer.next().map(|token| (token, self.lexer.span()));
    }
    self.peeked.as_ref()
  }

  /// Returns a reference to the next non-whitespace token without consuming it.
  /// Whitespace tokens ahead of it are consumed.
  pub fn peek_solid(&mut self) -> Option<&(RantToken, Range<usize>)> {
    self.skip_ws();
    self.peek()
  }

  /// Consumes the next token, requiring it to be of the same kind as `expected`.
  /// On mismatch the offending token is left unconsumed.
  pub fn read_expect(&mut self, expected: &RantToken, label: &'static str) -> Result<(RantToken, Range<usize>), ExpectError> {
    match self.peek() {
      Some((token, _)) if mem::discriminant(token) == mem::discriminant(expected) => {
        Ok(self.next().unwrap())
      },
      Some((_, span)) => {
        let span = span.clone();
        Err(ExpectError {
          expected: label,
          found: Some(InternalString::from(&self.source[span.clone()])),
          span,
        })
      },
      None => Err(ExpectError {
        expected: label,
        found: None,
        span: self.source.len()..self.source.len(),
      }),
    }
  }

  /// Like `read_expect`, but skips leading whitespace.
  pub fn read_expect_solid(&mut self, expected: &RantToken, label: &'static str) -> Result<(RantToken, Range<usize>), ExpectError> {
    self.skip_ws();
    self.read_expect(expected, label)
  }

  pub fn skip_one(&mut self) {
    self.next();
  }

  /// Consumes the next token if it satisfies the predicate; returns whether anything was eaten.
  pub fn eat_where<F: FnOnce(Option<&(RantToken, Range<usize>)>) -> bool>(&mut self, predicate: F) -> bool {
    if predicate(self.peek()) {
      self.skip_one();
      return true
    }
    false
  }

  /// Consumes the next token if it equals the specified token; returns whether anything was eaten.
  pub fn eat(&mut self, token: RantToken) -> bool {
    self.eat_where(|t| matches!(t, Some((peeked, _)) if peeked.eq(&token)))
  }

  /// Consumes the next token if it satisfies the predicate and returns it.
  pub fn take_where<F: FnOnce(Option<&(RantToken, Range<usize>)>) -> bool>(&mut self, predicate: F) -> Option<(RantToken, Range<usize>)> {
    if predicate(self.peek()) {
      self.next()
    } else {
      None
    }
  }

  /// Skips past whitespace tokens.
  pub fn skip_ws(&mut self) {
    while matches!(self.peek(), Some((token, _)) if token.is_whitespace()) {
      self.skip_one();
    }
  }

  /// True once the token stream is exhausted.
  pub fn end(&mut self) -> bool {
    self.peek().is_none()
  }

  /// Gets the source text of a span.
  pub fn token_string(&self, span: &Range<usize>) -> InternalString {
    InternalString::from(&self.source[span.clone()])
  }

  /// Gets the source text of the most recently consumed token.
  pub fn last_token_string(&self) -> InternalString {
    self.token_string(&self.last_span.clone())
  }

  /// Gets the span of the most recently consumed token.
  pub fn last_token_span(&self) -> Range<usize> {
    self.last_span.clone()
  }

  /// Gets the starting position of the most recently consumed token.
  pub fn last_token_pos(&self) -> usize {
    self.last_span.start
  }

  /// Length of the underlying source.
  pub fn source_len(&self) -> usize {
    self.source.len()
  }
}

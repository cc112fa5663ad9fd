//! Parser for the query sublanguage: `<table.subtype -class ?`regex` (range) $ ::=carrier>`.

use std::ops::Range;

use super::lexer::RantToken;
use super::message::Problem;
use super::parser::{ParseResult, ParserContext, SyntaxError};
use crate::query::{Carrier, CarrierKind, ClassFilterRule, Query, RegexFilterRule, SyllableRange};

/// Parses a query after its opening `<`. Recoverable problems are reported
/// and the offending clause skipped; `None` means no usable query came out.
pub(crate) fn parse_query(ctx: &mut ParserContext, start: usize) -> ParseResult<Option<Query>> {
  let table = match ctx.read_ident() {
    Some((name, _)) => name,
    None => {
      skip_to_query_end(ctx, start)?;
      return Ok(None)
    },
  };

  let mut query = Query::of(table);

  loop {
    let (token, span) = match ctx.reader.next_solid() {
      Some(pair) => pair,
      None => return Err(SyntaxError::new(Problem::UnclosedQuery, start..ctx.reader.source_len())),
    };

    match token {
      RantToken::RightAngle => break,

      // Subtype: at most one, and only before the exclusive sigil
      RantToken::Dot => {
        if let Some((subtype, _)) = ctx.read_ident() {
          if query.subtype.is_some() {
            ctx.soft_error(Problem::MultipleSubtypes, &span);
          } else if query.exclusive {
            ctx.soft_error(Problem::SubtypeAfterExclusive, &span);
          } else {
            query.subtype = Some(subtype);
          }
        }
      },

      RantToken::Dollar => {
        query.exclusive = true;
      },

      // Class filter: `-name` includes, `-!name` blacklists
      RantToken::Minus => {
        let include = !ctx.reader.eat(RantToken::Bang);
        if let Some((class_name, _)) = ctx.read_ident() {
          query.class_filter.push(ClassFilterRule { class_name, include });
        }
      },

      // Regex filters: `?` must match, `~` must not
      RantToken::Question | RantToken::Tilde => {
        let positive = matches!(token, RantToken::Question);
        match ctx.reader.next_solid() {
          Some((RantToken::Regex(parts), regex_span)) => {
            if let Some(regex) = ctx.compile_regex(&parts, &regex_span) {
              query.regex_filters.push(RegexFilterRule { positive, regex });
            }
          },
          Some((RantToken::UnterminatedRegex, regex_span)) => {
            return Err(SyntaxError::new(Problem::UnclosedRegex, regex_span))
          },
          Some((_, regex_span)) => {
            ctx.soft_error(Problem::ExpectedToken("regex".to_owned()), &regex_span);
          },
          None => return Err(SyntaxError::new(Problem::UnclosedQuery, start..ctx.reader.source_len())),
        }
      },

      RantToken::LeftParen => {
        if let Some(range) = parse_syllable_range(ctx, start, &span)? {
          query.syllable_range = Some(range);
        }
      },

      // Carrier: `::=name` matches, `::!name` is unique
      RantToken::DoubleColon => {
        let kind = if ctx.reader.eat(RantToken::Equals) {
          CarrierKind::Match
        } else if ctx.reader.eat(RantToken::Bang) {
          CarrierKind::Unique
        } else {
          ctx.soft_error(Problem::UnknownQueryClause("::".to_owned()), &span);
          continue
        };
        if let Some((id, _)) = ctx.read_ident() {
          if query.carrier.is_some() {
            ctx.soft_error(Problem::MultipleCarriers, &span);
          } else {
            query.carrier = Some(Carrier { id, kind });
          }
        }
      },

      RantToken::UnterminatedRegex => {
        return Err(SyntaxError::new(Problem::UnclosedRegex, span))
      },

      // Unrecognized tokens are reported and skipped
      _ => {
        ctx.soft_error(Problem::UnknownQueryClause(ctx.reader.token_string(&span).to_string()), &span);
      },
    }
  }

  Ok(Some(query))
}

/// Parses `(n)`, `(n-)`, `(-n)`, or `(n-m)` after the opening paren.
fn parse_syllable_range(ctx: &mut ParserContext, query_start: usize, open_span: &Range<usize>) -> ParseResult<Option<SyllableRange>> {
  macro_rules! next_solid {
    () => {
      match ctx.reader.next_solid() {
        Some(pair) => pair,
        None => return Err(SyntaxError::new(Problem::UnclosedQuery, query_start..ctx.reader.source_len())),
      }
    };
  }

  macro_rules! bad_range {
    ($span:expr) => {{
      ctx.soft_error(Problem::InvalidSyllableRange, $span);
      skip_to_range_end(ctx, query_start)?;
      return Ok(None)
    }};
  }

  let (token, span) = next_solid!();
  match token {
    RantToken::RightParen => {
      ctx.soft_error(Problem::EmptySyllableRange, open_span);
      Ok(None)
    },
    // (-n)
    RantToken::Minus => {
      let (token, max_span) = next_solid!();
      let max = match token {
        RantToken::Integer(n) => n as usize,
        _ => bad_range!(&max_span),
      };
      let (token, close_span) = next_solid!();
      if !matches!(token, RantToken::RightParen) {
        bad_range!(&close_span);
      }
      Ok(Some(SyllableRange { min: None, max: Some(max) }))
    },
    // (n), (n-), (n-m)
    RantToken::Integer(min) => {
      let min = min as usize;
      let (token, next_span) = next_solid!();
      match token {
        RantToken::RightParen => Ok(Some(SyllableRange::exactly(min))),
        RantToken::Minus => {
          let (token, max_span) = next_solid!();
          match token {
            RantToken::RightParen => Ok(Some(SyllableRange { min: Some(min), max: None })),
            RantToken::Integer(max) => {
              let (token, close_span) = next_solid!();
              if !matches!(token, RantToken::RightParen) {
                bad_range!(&close_span);
              }
              Ok(Some(SyllableRange { min: Some(min), max: Some(max as usize) }))
            },
            _ => bad_range!(&max_span),
          }
        },
        _ => bad_range!(&next_span),
      }
    },
    _ => bad_range!(&span),
  }
}

/// Skips the rest of a malformed syllable range.
fn skip_to_range_end(ctx: &mut ParserContext, query_start: usize) -> ParseResult<()> {
  loop {
    match ctx.reader.peek() {
      Some((RantToken::RightParen, _)) => {
        ctx.reader.skip_one();
        return Ok(())
      },
      // Don't run past the end of the query
      Some((RantToken::RightAngle, _)) => return Ok(()),
      Some(_) => ctx.reader.skip_one(),
      None => return Err(SyntaxError::new(Problem::UnclosedQuery, query_start..ctx.reader.source_len())),
    }
  }
}

/// Skips the rest of a malformed query.
fn skip_to_query_end(ctx: &mut ParserContext, query_start: usize) -> ParseResult<()> {
  loop {
    match ctx.reader.next() {
      Some((RantToken::RightAngle, _)) => return Ok(()),
      Some(_) => {},
      None => return Err(SyntaxError::new(Problem::UnclosedQuery, query_start..ctx.reader.source_len())),
    }
  }
}
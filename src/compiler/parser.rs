//! The parser framework. Each production is a small state machine; a driver
//! runs a work stack of production frames, so deeply nested constructs don't
//! consume host call stack and errors at any depth carry full source context.

use std::{mem, ops::Range, rc::Rc};
use line_col::LineColLookup;

use super::lexer::{EscapeKind, RantToken, RegexParts};
use super::message::{Position, Problem, Severity};
use super::query::parse_query;
use super::{CompilerMessage, Reporter};
use crate::InternalString;
use crate::func::{FunctionRegistry, ParamMode};
use crate::lang::*;

pub(crate) type ParseResult<T> = Result<T, SyntaxError>;

/// A fatal syntax error; aborts compilation on the spot.
#[derive(Debug)]
pub(crate) struct SyntaxError {
  pub problem: Problem,
  pub span: Range<usize>,
}

impl SyntaxError {
  pub fn new(problem: Problem, span: Range<usize>) -> Self {
    Self { problem, span }
  }
}

/// Shared state threaded through every production: the reader, the reporter,
/// and the function registry used for tag resolution.
pub(crate) struct ParserContext<'p> {
  pub reader: super::reader::RantTokenReader<'p>,
  reporter: &'p mut dyn Reporter,
  lookup: LineColLookup<'p>,
  pub registry: &'p FunctionRegistry,
  source_len: usize,
  has_errors: bool,
}

impl<'p> ParserContext<'p> {
  fn new(source: &'p str, reporter: &'p mut dyn Reporter, registry: &'p FunctionRegistry) -> Self {
    Self {
      reader: super::reader::RantTokenReader::new(source),
      reporter,
      lookup: LineColLookup::new(source),
      registry,
      source_len: source.len(),
      has_errors: false,
    }
  }

  fn position(&self, span: &Range<usize>) -> Position {
    let index = span.start.min(self.source_len.saturating_sub(1));
    let (line, col) = self.lookup.get(index);
    Position::new(line, col, span.clone())
  }

  /// Reports a non-fatal error; compilation continues but will fail.
  pub fn soft_error(&mut self, problem: Problem, span: &Range<usize>) {
    self.has_errors = true;
    let pos = self.position(span);
    self.reporter.report(CompilerMessage::new(problem, Severity::Error, Some(pos)));
  }

  pub fn warning(&mut self, problem: Problem, span: &Range<usize>) {
    let pos = self.position(span);
    self.reporter.report(CompilerMessage::new(problem, Severity::Warning, Some(pos)));
  }

  fn report_fatal(&mut self, error: SyntaxError) {
    self.has_errors = true;
    let pos = self.position(&error.span);
    self.reporter.report(CompilerMessage::new(error.problem, Severity::Fatal, Some(pos)));
  }

  /// Reads an identifier: a run of adjacent word/digit tokens. Reports and
  /// recovers on missing or malformed identifiers; the offending token is
  /// left unconsumed when nothing identifier-like is present.
  pub fn read_ident(&mut self) -> Option<(Identifier, Range<usize>)> {
    self.reader.skip_ws();
    match self.reader.peek() {
      Some((RantToken::Fragment, _)) | Some((RantToken::Integer(_), _)) => {},
      Some((_, span)) => {
        let span = span.clone();
        self.soft_error(Problem::MissingIdentifier, &span);
        return None
      },
      None => {
        let span = self.source_len..self.source_len;
        self.soft_error(Problem::MissingIdentifier, &span);
        return None
      },
    }
    let (_, start_span) = self.reader.next().unwrap();
    let mut name = self.reader.token_string(&start_span);
    let mut span = start_span;
    loop {
      match self.reader.peek() {
        Some((RantToken::Fragment, next_span)) | Some((RantToken::Integer(_), next_span))
          if next_span.start == span.end =>
        {
          let next_span = next_span.clone();
          self.reader.skip_one();
          name.push_str(self.reader.token_string(&next_span).as_str());
          span = span.start..next_span.end;
        },
        _ => break,
      }
    }
    if !is_valid_ident(name.as_str()) {
      self.soft_error(Problem::InvalidIdentifier(name.to_string()), &span);
    }
    Some((Identifier::new(name), span))
  }

  /// Compiles a lexed regex literal, reporting bad flags and patterns.
  pub fn compile_regex(&mut self, parts: &RegexParts, span: &Range<usize>) -> Option<RantRegex> {
    let mut case_insensitive = false;
    for flag in parts.flags.chars() {
      match flag {
        'i' => case_insensitive = true,
        other => self.warning(Problem::UnknownRegexFlag(other), span),
      }
    }
    match RantRegex::compile(parts.pattern.as_str(), case_insensitive) {
      Ok(regex) => Some(regex),
      Err(err) => {
        self.soft_error(Problem::InvalidRegex(err.to_string()), span);
        None
      },
    }
  }
}

/// What kind of token ended a sequence.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SequenceEnd {
  ProgramEnd,
  BlockDelim,
  BlockEnd,
  TagArgSep,
  TagEnd,
  SubBodyEnd,
  ListSep,
  ListEnd,
  ReplacerSep,
  ReplacerEnd,
}

/// Context a sequence is parsed in; decides its terminators.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SequenceParseMode {
  TopLevel,
  BlockBranch,
  TagArg,
  SubroutineBody,
  ListElement,
  ReplacerSubject,
  ReplacerReplacement,
}

/// Value a finished production hands back to its parent frame.
enum ParsedUnit {
  Sequence(Sequence, SequenceEnd, Range<usize>),
  Node(Rst),
}

/// What a production does when resumed: descend into a child production, or
/// complete with a value for its parent.
enum Step {
  Descend(Box<dyn Production>),
  Complete(ParsedUnit),
}

/// One production frame. `resume` is called with `None` on first entry and
/// with the child's result each time a yielded child production finishes.
trait Production {
  fn resume(&mut self, ctx: &mut ParserContext, unit: Option<ParsedUnit>) -> ParseResult<Step>;
}

/// Runs a production (and everything it yields) to completion on an explicit
/// work stack.
fn drive(ctx: &mut ParserContext, root: Box<dyn Production>) -> ParseResult<ParsedUnit> {
  let mut stack: Vec<Box<dyn Production>> = vec![root];
  let mut result: Option<ParsedUnit> = None;
  while let Some(top) = stack.last_mut() {
    match top.resume(ctx, result.take())? {
      Step::Descend(child) => stack.push(child),
      Step::Complete(unit) => {
        stack.pop();
        result = Some(unit);
      },
    }
  }
  Ok(result.expect("parser driver finished without a result"))
}

/// A parser that turns Rant source into an RST.
pub(crate) struct RantParser<'p> {
  ctx: ParserContext<'p>,
}

impl<'p> RantParser<'p> {
  pub fn new(source: &'p str, reporter: &'p mut dyn Reporter, registry: &'p FunctionRegistry) -> Self {
    Self {
      ctx: ParserContext::new(source, reporter, registry),
    }
  }

  /// Parses the source to completion. A program is only produced if no
  /// errors were reported along the way.
  pub fn parse(&mut self) -> Result<Rc<Sequence>, ()> {
    let root = Box::new(SequenceProduction::new(SequenceParseMode::TopLevel, 0));
    match drive(&mut self.ctx, root) {
      Ok(ParsedUnit::Sequence(seq, ..)) if !self.ctx.has_errors => Ok(Rc::new(seq)),
      Ok(_) => Err(()),
      Err(fatal) => {
        self.ctx.report_fatal(fatal);
        Err(())
      },
    }
  }
}

// ================================================================
// Sequence production
// ================================================================

struct SequenceProduction {
  mode: SequenceParseMode,
  start: usize,
  out: Vec<Rc<Rst>>,
  pending_ws: Option<(InternalString, Range<usize>)>,
}

impl SequenceProduction {
  fn new(mode: SequenceParseMode, start: usize) -> Self {
    Self {
      mode,
      start,
      out: vec![],
      pending_ws: None,
    }
  }

  fn flush_ws(&mut self) {
    if let Some((ws, span)) = self.pending_ws.take() {
      self.out.push(Rc::new(Rst::new(span, RstKind::Whitespace(ws))));
    }
  }

  fn push(&mut self, rst: Rst) {
    self.flush_ws();
    self.out.push(Rc::new(rst));
  }

  fn end(&mut self, end: SequenceEnd, ctx: &ParserContext) -> Step {
    // Trailing whitespace is dropped
    self.pending_ws = None;
    let span = self.start..ctx.reader.last_token_span().end;
    Step::Complete(ParsedUnit::Sequence(Sequence::new(mem::take(&mut self.out)), end, span))
  }
}

impl Production for SequenceProduction {
  fn resume(&mut self, ctx: &mut ParserContext, unit: Option<ParsedUnit>) -> ParseResult<Step> {
    // Take delivery of a completed child construct
    if let Some(unit) = unit {
      match unit {
        ParsedUnit::Node(rst) => match rst.kind {
          RstKind::Nop => {},
          // Definitions don't print; they swallow surrounding whitespace
          RstKind::SubDef(_) => {
            self.pending_ws = None;
            self.out.push(Rc::new(rst));
          },
          _ => self.push(rst),
        },
        ParsedUnit::Sequence(..) => unreachable!("sequence delivered to sequence production"),
      }
    }

    loop {
      let (token, span) = match ctx.reader.next() {
        Some(pair) => pair,
        None => {
          let span = self.start..ctx.reader.source_len();
          return match self.mode {
            SequenceParseMode::TopLevel => Ok(self.end(SequenceEnd::ProgramEnd, ctx)),
            SequenceParseMode::BlockBranch => Err(SyntaxError::new(Problem::UnclosedBlock, span)),
            SequenceParseMode::TagArg => Err(SyntaxError::new(Problem::UnclosedTag, span)),
            SequenceParseMode::SubroutineBody => Err(SyntaxError::new(Problem::UnclosedSubroutineBody, span)),
            SequenceParseMode::ListElement => Err(SyntaxError::new(Problem::UnclosedList, span)),
            SequenceParseMode::ReplacerSubject | SequenceParseMode::ReplacerReplacement =>
              Err(SyntaxError::new(Problem::UnclosedReplacer, span)),
          }
        },
      };

      match token {
        RantToken::Whitespace => {
          // Whitespace prints only between printed items
          if !self.out.is_empty() {
            self.pending_ws = Some((ctx.reader.last_token_string(), span));
          }
        },

        RantToken::Fragment => {
          let frag = ctx.reader.last_token_string();
          self.push(Rst::new(span, RstKind::Fragment(frag)));
        },

        RantToken::Integer(n) => {
          self.push(Rst::new(span, RstKind::Integer(n)));
        },

        RantToken::UnterminatedRegex => {
          return Err(SyntaxError::new(Problem::UnclosedRegex, span))
        },

        RantToken::InvalidEscape => {
          ctx.soft_error(Problem::InvalidEscape, &span);
        },

        RantToken::Escape(esc) => match esc.kind {
          EscapeKind::Char(c) => {
            let mut text = InternalString::new();
            for _ in 0..esc.count {
              text.push(c);
            }
            self.push(Rst::new(span, RstKind::Fragment(text)));
          },
          EscapeKind::Class(class) => {
            self.push(Rst::new(span, RstKind::CharGen { class, count: esc.count }));
          },
          EscapeKind::Article => {
            for _ in 0..esc.count {
              self.push(Rst::new(span.clone(), RstKind::Article));
            }
          },
        },

        RantToken::Regex(_) => {
          ctx.soft_error(Problem::UnexpectedToken(ctx.reader.last_token_string().to_string()), &span);
        },

        RantToken::LeftBrace => {
          return Ok(Step::Descend(Box::new(BlockProduction::new(span.start))))
        },

        RantToken::LeftBracket => {
          return Ok(Step::Descend(Box::new(TagProduction::new(span.start))))
        },

        RantToken::LeftAngle => {
          if let Some(query) = parse_query(ctx, span.start)? {
            let span = span.start..ctx.reader.last_token_span().end;
            self.push(Rst::new(span, RstKind::Query(Rc::new(query))));
          }
        },

        // '$' opens a subroutine definition only when a signature follows;
        // anywhere else it's just a dollar sign
        RantToken::Dollar => {
          if matches!(ctx.reader.peek(), Some((RantToken::LeftBracket, _))) {
            return Ok(Step::Descend(Box::new(SubroutineProduction::new(span.start))))
          }
          self.push(Rst::new(span, RstKind::Fragment(InternalString::from("$"))));
        },

        RantToken::At => {
          if matches!(ctx.reader.peek(), Some((RantToken::LeftParen, _))) {
            ctx.reader.skip_one();
            return Ok(Step::Descend(Box::new(ListProduction::new(span.start))))
          }
          self.push(Rst::new(span, RstKind::Fragment(InternalString::from("@"))));
        },

        RantToken::Percent => {
          if self.mode == SequenceParseMode::ReplacerReplacement {
            return Ok(self.end(SequenceEnd::ReplacerEnd, ctx))
          }
          if matches!(ctx.reader.peek(), Some((RantToken::Regex(_), _))) {
            return Ok(Step::Descend(Box::new(ReplacerProduction::new(span.start))))
          }
          self.push(Rst::new(span, RstKind::Fragment(InternalString::from("%"))));
        },

        RantToken::Pipe => match self.mode {
          SequenceParseMode::BlockBranch => return Ok(self.end(SequenceEnd::BlockDelim, ctx)),
          _ => ctx.soft_error(Problem::UnexpectedToken("|".to_owned()), &span),
        },

        RantToken::RightBrace => match self.mode {
          SequenceParseMode::BlockBranch => return Ok(self.end(SequenceEnd::BlockEnd, ctx)),
          SequenceParseMode::SubroutineBody => return Ok(self.end(SequenceEnd::SubBodyEnd, ctx)),
          _ => ctx.soft_error(Problem::UnexpectedToken("}".to_owned()), &span),
        },

        RantToken::RightBracket => match self.mode {
          SequenceParseMode::TagArg => return Ok(self.end(SequenceEnd::TagEnd, ctx)),
          _ => ctx.soft_error(Problem::UnexpectedToken("]".to_owned()), &span),
        },

        RantToken::Semicolon => match self.mode {
          SequenceParseMode::TagArg => return Ok(self.end(SequenceEnd::TagArgSep, ctx)),
          SequenceParseMode::ListElement => return Ok(self.end(SequenceEnd::ListSep, ctx)),
          SequenceParseMode::ReplacerSubject => return Ok(self.end(SequenceEnd::ReplacerSep, ctx)),
          _ => self.push(Rst::new(span, RstKind::Fragment(InternalString::from(";")))),
        },

        RantToken::RightParen => match self.mode {
          SequenceParseMode::ListElement => return Ok(self.end(SequenceEnd::ListEnd, ctx)),
          _ => self.push(Rst::new(span, RstKind::Fragment(InternalString::from(")")))),
        },

        // Everything else is plain text
        _ => {
          let text = ctx.reader.last_token_string();
          self.push(Rst::new(span, RstKind::Fragment(text)));
        },
      }
    }
  }
}

// ================================================================
// Block production
// ================================================================

struct BlockProduction {
  start: usize,
  branches: Vec<BlockBranch>,
  pending_weight: Option<f64>,
}

impl BlockProduction {
  fn new(start: usize) -> Self {
    Self {
      start,
      branches: vec![],
      pending_weight: None,
    }
  }

  /// Reads an optional `(weight)` prefix at the start of a branch.
  /// The weight prefix reserves '(' at branch start; escape it for text.
  fn parse_weight(&mut self, ctx: &mut ParserContext) -> Option<f64> {
    ctx.reader.skip_ws();
    if !ctx.reader.eat(RantToken::LeftParen) {
      return None
    }
    let weight = match ctx.reader.next_solid() {
      Some((RantToken::Integer(n), _)) => Some(n as f64),
      Some((RantToken::Float(f), _)) => Some(f),
      Some((_, span)) => {
        ctx.soft_error(Problem::InvalidWeight, &span);
        None
      },
      None => return None,
    };
    if let Err(err) = ctx.reader.read_expect_solid(&RantToken::RightParen, ")") {
      ctx.soft_error(Problem::ExpectedToken(err.expected.to_owned()), &err.span);
    }
    weight
  }
}

impl Production for BlockProduction {
  fn resume(&mut self, ctx: &mut ParserContext, unit: Option<ParsedUnit>) -> ParseResult<Step> {
    if let Some(ParsedUnit::Sequence(seq, end, _)) = unit {
      self.branches.push(BlockBranch {
        weight: self.pending_weight.take(),
        body: Rc::new(seq),
      });
      if end == SequenceEnd::BlockEnd {
        let span = self.start..ctx.reader.last_token_span().end;
        let block = Block::new(mem::take(&mut self.branches));
        return Ok(Step::Complete(ParsedUnit::Node(Rst::new(span, RstKind::Block(Rc::new(block))))))
      }
    }
    self.pending_weight = self.parse_weight(ctx);
    let branch_start = ctx.reader.last_token_span().end;
    Ok(Step::Descend(Box::new(SequenceProduction::new(SequenceParseMode::BlockBranch, branch_start))))
  }
}

// ================================================================
// Tag production
// ================================================================

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum TagKind {
  Function,
  SubroutineCall,
  VarAccess,
  SpecialConstant,
}

/// The closed set of names reachable through the `@` sigil.
const SPECIAL_CONSTANT_NAMES: &[&str] = &["seed", "version"];

enum TagState {
  Start,
  Args,
}

struct TagProduction {
  start: usize,
  kind: TagKind,
  name: Option<Identifier>,
  args: Vec<Rc<Sequence>>,
  state: TagState,
}

impl TagProduction {
  fn new(start: usize) -> Self {
    Self {
      start,
      kind: TagKind::Function,
      name: None,
      args: vec![],
      state: TagState::Start,
    }
  }

  /// Skips to the end of the current tag, balancing nested brackets.
  fn skip_to_tag_end(&self, ctx: &mut ParserContext) -> ParseResult<()> {
    let mut depth = 0usize;
    loop {
      match ctx.reader.next() {
        Some((RantToken::LeftBracket, _)) => depth += 1,
        Some((RantToken::RightBracket, _)) => {
          if depth == 0 {
            return Ok(())
          }
          depth -= 1;
        },
        Some(_) => {},
        None => return Err(SyntaxError::new(Problem::UnclosedTag, self.start..ctx.reader.source_len())),
      }
    }
  }

  fn nop(&self, ctx: &ParserContext) -> Step {
    let span = self.start..ctx.reader.last_token_span().end;
    Step::Complete(ParsedUnit::Node(Rst::new(span, RstKind::Nop)))
  }

  fn finish(&mut self, ctx: &mut ParserContext) -> ParseResult<Step> {
    let span = self.start..ctx.reader.last_token_span().end;
    let name = match self.name.take() {
      Some(name) => name,
      None => return Ok(self.nop(ctx)),
    };
    let args = mem::take(&mut self.args);
    let kind = match self.kind {
      TagKind::SubroutineCall => RstKind::SubCall(SubroutineCall { name, args }),
      TagKind::VarAccess => match args.len() {
        0 => RstKind::VarGet(name),
        1 => RstKind::VarSet(name, args.into_iter().next().unwrap()),
        n => {
          ctx.soft_error(Problem::WrongArity(format!(":{}", name), n), &span);
          RstKind::Nop
        },
      },
      // '@' only reaches the special constants, which resolve like functions
      TagKind::SpecialConstant => {
        let lname = name.as_str().to_lowercase();
        if SPECIAL_CONSTANT_NAMES.contains(&lname.as_str()) {
          self.build_function(ctx, name, args, &span)
        } else {
          ctx.soft_error(Problem::UnknownSpecialConstant(lname), &span);
          RstKind::Nop
        }
      },
      TagKind::Function => self.build_function(ctx, name, args, &span),
    };
    Ok(Step::Complete(ParsedUnit::Node(Rst::new(span, kind))))
  }

  /// Compiles a function-position tag: either one of the distinguished
  /// constructs the parser owns, or a registry call resolved by name and
  /// exact arity.
  fn build_function(&self, ctx: &mut ParserContext, name: Identifier, mut args: Vec<Rc<Sequence>>, span: &Range<usize>) -> RstKind {
    let lname = name.as_str().to_lowercase();

    macro_rules! check_arity {
      ($expected:expr) => {
        if args.len() != $expected {
          ctx.soft_error(Problem::WrongArity(lname.clone(), args.len()), span);
          return RstKind::Nop
        }
      };
    }

    if let Some(op) = ArithOp::from_name(lname.as_str()) {
      check_arity!(op.operand_count());
      return RstKind::Arith { op, operands: args }
    }

    match lname.as_str() {
      "if" | "unless" => {
        if args.len() != 2 && args.len() != 3 {
          ctx.soft_error(Problem::WrongArity(lname.clone(), args.len()), span);
          return RstKind::Nop
        }
        let else_body = if args.len() == 3 { args.pop() } else { None };
        let then_body = args.pop().unwrap();
        RstKind::Conditional(Conditional {
          condition: args.pop().unwrap(),
          negate: lname == "unless",
          then_body,
          else_body,
        })
      },
      "chan" => {
        check_arity!(3);
        let body = args.pop().unwrap();
        let vis_text = match self.static_text(ctx, &args[1], span) {
          Some(text) => text,
          None => return RstKind::Nop,
        };
        let visibility = match ChannelVisibility::from_name(vis_text.trim()) {
          Some(vis) => vis,
          None => {
            ctx.soft_error(Problem::UnknownChannelVisibility(vis_text.trim().to_owned()), span);
            return RstKind::Nop
          },
        };
        let name = match self.static_ident(ctx, &args[0], span) {
          Some(name) => name,
          None => return RstKind::Nop,
        };
        RstKind::Channel { name, visibility, body }
      },
      "mark" => {
        check_arity!(1);
        match self.static_ident(ctx, &args[0], span) {
          Some(name) => RstKind::Mark(name),
          None => RstKind::Nop,
        }
      },
      "get" => {
        check_arity!(1);
        match self.static_ident(ctx, &args[0], span) {
          Some(name) => RstKind::DefTarget(name),
          None => RstKind::Nop,
        }
      },
      "dist" => {
        check_arity!(2);
        match (self.static_ident(ctx, &args[0], span), self.static_ident(ctx, &args[1], span)) {
          (Some(a), Some(b)) => RstKind::Dist(a, b),
          _ => RstKind::Nop,
        }
      },
      "send" => {
        check_arity!(2);
        let value = args.pop().unwrap();
        match self.static_ident(ctx, &args[0], span) {
          Some(name) => RstKind::Send(name, value),
          None => RstKind::Nop,
        }
      },
      _ => {
        let group = match ctx.registry.get(lname.as_str()) {
          Some(group) => Rc::clone(group),
          None => {
            ctx.soft_error(Problem::UnknownFunction(lname), span);
            return RstKind::Nop
          },
        };
        let overload = match group.overload_for_arity(args.len()) {
          Some(overload) => overload,
          None => {
            ctx.soft_error(Problem::WrongArity(lname, args.len()), span);
            return RstKind::Nop
          },
        };
        let args = args.into_iter()
          .zip(overload.params())
          .map(|(seq, param)| match param.mode {
            ParamMode::Cooked => FunctionArg::Cooked(seq),
            ParamMode::Raw => FunctionArg::Raw(seq),
          })
          .collect();
        RstKind::Tag(FunctionCall {
          name: Identifier::new(InternalString::from(lname.as_str())),
          args,
        })
      },
    }
  }

  /// Extracts compile-time-constant text from an argument sequence.
  fn static_text(&self, ctx: &mut ParserContext, seq: &Sequence, span: &Range<usize>) -> Option<InternalString> {
    let mut text = InternalString::new();
    for rst in seq.iter() {
      match &rst.kind {
        RstKind::Fragment(s) | RstKind::Whitespace(s) => text.push_str(s.as_str()),
        RstKind::Integer(n) => text.push_str(n.to_string().as_str()),
        _ => {
          ctx.soft_error(Problem::ExpectedToken("name".to_owned()), span);
          return None
        },
      }
    }
    Some(text)
  }

  fn static_ident(&self, ctx: &mut ParserContext, seq: &Sequence, span: &Range<usize>) -> Option<Identifier> {
    let text = self.static_text(ctx, seq, span)?;
    let trimmed = text.trim();
    if !is_valid_ident(trimmed) {
      ctx.soft_error(Problem::InvalidIdentifier(trimmed.to_owned()), span);
      return None
    }
    Some(Identifier::new(InternalString::from(trimmed)))
  }
}

impl Production for TagProduction {
  fn resume(&mut self, ctx: &mut ParserContext, unit: Option<ParsedUnit>) -> ParseResult<Step> {
    if let Some(ParsedUnit::Sequence(seq, end, _)) = unit {
      self.args.push(Rc::new(seq));
      return match end {
        SequenceEnd::TagArgSep => {
          let arg_start = ctx.reader.last_token_span().end;
          Ok(Step::Descend(Box::new(SequenceProduction::new(SequenceParseMode::TagArg, arg_start))))
        },
        SequenceEnd::TagEnd => self.finish(ctx),
        _ => unreachable!("tag argument ended with non-tag terminator"),
      }
    }

    match self.state {
      TagState::Start => {
        ctx.reader.skip_ws();
        self.kind = if ctx.reader.eat(RantToken::Dollar) {
          TagKind::SubroutineCall
        } else if ctx.reader.eat(RantToken::Colon) {
          TagKind::VarAccess
        } else if ctx.reader.eat(RantToken::At) {
          TagKind::SpecialConstant
        } else {
          TagKind::Function
        };

        self.name = match ctx.read_ident() {
          Some((name, _)) => Some(name),
          None => {
            self.skip_to_tag_end(ctx)?;
            return Ok(self.nop(ctx))
          },
        };
        self.state = TagState::Args;

        match ctx.reader.peek_solid() {
          Some((RantToken::Colon, _)) => {
            ctx.reader.skip_one();
            let arg_start = ctx.reader.last_token_span().end;
            Ok(Step::Descend(Box::new(SequenceProduction::new(SequenceParseMode::TagArg, arg_start))))
          },
          // Variable setters separate the name from the value with ';'
          Some((RantToken::Semicolon, _)) if self.kind == TagKind::VarAccess => {
            ctx.reader.skip_one();
            let arg_start = ctx.reader.last_token_span().end;
            Ok(Step::Descend(Box::new(SequenceProduction::new(SequenceParseMode::TagArg, arg_start))))
          },
          Some((RantToken::RightBracket, _)) => {
            ctx.reader.skip_one();
            self.finish(ctx)
          },
          Some((_, span)) => {
            let span = span.clone();
            ctx.soft_error(Problem::UnexpectedToken(ctx.reader.token_string(&span).to_string()), &span);
            self.skip_to_tag_end(ctx)?;
            Ok(self.nop(ctx))
          },
          None => Err(SyntaxError::new(Problem::UnclosedTag, self.start..ctx.reader.source_len())),
        }
      },
      TagState::Args => unreachable!("tag production resumed without a child result"),
    }
  }
}

// ================================================================
// Subroutine definition production
// ================================================================

struct SubroutineProduction {
  start: usize,
  name: Option<Identifier>,
  params: Vec<Identifier>,
}

impl SubroutineProduction {
  fn new(start: usize) -> Self {
    Self {
      start,
      name: None,
      params: vec![],
    }
  }

  /// Parses `[name:param;param]` after the leading `$`.
  fn parse_signature(&mut self, ctx: &mut ParserContext) -> ParseResult<()> {
    // The dispatching sequence production guarantees the bracket
    ctx.reader.read_expect(&RantToken::LeftBracket, "[")
      .expect("subroutine signature bracket vanished");

    self.name = ctx.read_ident().map(|(name, _)| name);

    match ctx.reader.next_solid() {
      Some((RantToken::RightBracket, _)) => return Ok(()),
      Some((RantToken::Colon, _)) => {},
      Some((_, span)) => {
        ctx.soft_error(Problem::UnexpectedToken(ctx.reader.token_string(&span).to_string()), &span);
      },
      None => return Err(SyntaxError::new(Problem::UnclosedSubroutineSignature, self.start..ctx.reader.source_len())),
    }

    loop {
      match ctx.read_ident() {
        Some((param, span)) => {
          if self.params.contains(&param) {
            ctx.soft_error(Problem::DuplicateParameter(param.to_string()), &span);
          } else {
            self.params.push(param);
          }
        },
        None => {
          ctx.reader.skip_one();
        },
      }
      match ctx.reader.next_solid() {
        Some((RantToken::Semicolon, _)) => continue,
        Some((RantToken::RightBracket, _)) => return Ok(()),
        Some((_, span)) => {
          ctx.soft_error(Problem::UnexpectedToken(ctx.reader.token_string(&span).to_string()), &span);
        },
        None => return Err(SyntaxError::new(Problem::UnclosedSubroutineSignature, self.start..ctx.reader.source_len())),
      }
    }
  }
}

impl Production for SubroutineProduction {
  fn resume(&mut self, ctx: &mut ParserContext, unit: Option<ParsedUnit>) -> ParseResult<Step> {
    if let Some(ParsedUnit::Sequence(body, _, _)) = unit {
      let span = self.start..ctx.reader.last_token_span().end;
      let kind = match self.name.take() {
        Some(name) => RstKind::SubDef(Rc::new(SubroutineDef {
          name,
          params: mem::take(&mut self.params),
          body: Rc::new(body),
        })),
        None => RstKind::Nop,
      };
      return Ok(Step::Complete(ParsedUnit::Node(Rst::new(span, kind))))
    }

    self.parse_signature(ctx)?;

    match ctx.reader.peek_solid() {
      Some((RantToken::LeftBrace, _)) => {
        ctx.reader.skip_one();
        let body_start = ctx.reader.last_token_span().end;
        Ok(Step::Descend(Box::new(SequenceProduction::new(SequenceParseMode::SubroutineBody, body_start))))
      },
      Some((_, span)) => {
        let span = span.clone();
        ctx.soft_error(Problem::ExpectedToken("{".to_owned()), &span);
        let span = self.start..ctx.reader.last_token_span().end;
        Ok(Step::Complete(ParsedUnit::Node(Rst::new(span, RstKind::Nop))))
      },
      None => Err(SyntaxError::new(Problem::ExpectedToken("{".to_owned()), self.start..ctx.reader.source_len())),
    }
  }
}

// ================================================================
// List production
// ================================================================

struct ListProduction {
  start: usize,
  elements: Vec<Rc<Sequence>>,
}

impl ListProduction {
  fn new(start: usize) -> Self {
    Self {
      start,
      elements: vec![],
    }
  }
}

impl Production for ListProduction {
  fn resume(&mut self, ctx: &mut ParserContext, unit: Option<ParsedUnit>) -> ParseResult<Step> {
    if let Some(ParsedUnit::Sequence(seq, end, _)) = unit {
      self.elements.push(Rc::new(seq));
      if end == SequenceEnd::ListEnd {
        let span = self.start..ctx.reader.last_token_span().end;
        let kind = RstKind::ListInit(Rc::new(mem::take(&mut self.elements)));
        return Ok(Step::Complete(ParsedUnit::Node(Rst::new(span, kind))))
      }
    }
    let element_start = ctx.reader.last_token_span().end;
    Ok(Step::Descend(Box::new(SequenceProduction::new(SequenceParseMode::ListElement, element_start))))
  }
}

// ================================================================
// Replacer production
// ================================================================

struct ReplacerProduction {
  start: usize,
  pattern: Option<RantRegex>,
  subject: Option<Rc<Sequence>>,
}

impl ReplacerProduction {
  fn new(start: usize) -> Self {
    Self {
      start,
      pattern: None,
      subject: None,
    }
  }

  /// Consumes the rest of a malformed replacer up to its closing `%`.
  fn skip_to_replacer_end(&self, ctx: &mut ParserContext) -> ParseResult<()> {
    loop {
      match ctx.reader.next() {
        Some((RantToken::Percent, _)) => return Ok(()),
        Some(_) => {},
        None => return Err(SyntaxError::new(Problem::UnclosedReplacer, self.start..ctx.reader.source_len())),
      }
    }
  }
}

impl Production for ReplacerProduction {
  fn resume(&mut self, ctx: &mut ParserContext, unit: Option<ParsedUnit>) -> ParseResult<Step> {
    if let Some(ParsedUnit::Sequence(seq, end, _)) = unit {
      let span = self.start..ctx.reader.last_token_span().end;
      if self.subject.is_none() {
        if end != SequenceEnd::ReplacerSep {
          ctx.soft_error(Problem::ExpectedToken(";".to_owned()), &span);
          return Ok(Step::Complete(ParsedUnit::Node(Rst::new(span, RstKind::Nop))))
        }
        self.subject = Some(Rc::new(seq));
        let rep_start = ctx.reader.last_token_span().end;
        return Ok(Step::Descend(Box::new(SequenceProduction::new(SequenceParseMode::ReplacerReplacement, rep_start))))
      }
      let kind = match self.pattern.take() {
        Some(pattern) => RstKind::Replace(Rc::new(Replacer {
          pattern,
          subject: self.subject.take().unwrap(),
          replacement: Rc::new(seq),
        })),
        // Bad regex was already reported; the structure still parsed
        None => RstKind::Nop,
      };
      return Ok(Step::Complete(ParsedUnit::Node(Rst::new(span, kind))))
    }

    let (token, span) = ctx.reader.next().expect("replacer regex vanished");
    match token {
      RantToken::Regex(parts) => {
        self.pattern = ctx.compile_regex(&parts, &span);
      },
      _ => unreachable!("replacer dispatched without a regex literal"),
    }

    if let Err(err) = ctx.reader.read_expect_solid(&RantToken::Colon, ":") {
      let problem = match err.found {
        Some(found) => Problem::UnexpectedToken(found.to_string()),
        None => Problem::ExpectedToken(err.expected.to_owned()),
      };
      ctx.soft_error(problem, &err.span);
      self.skip_to_replacer_end(ctx)?;
      let span = self.start..ctx.reader.last_token_span().end;
      return Ok(Step::Complete(ParsedUnit::Node(Rst::new(span, RstKind::Nop))))
    }

    let subject_start = ctx.reader.last_token_span().end;
    Ok(Step::Descend(Box::new(SequenceProduction::new(SequenceParseMode::ReplacerSubject, subject_start))))
  }
}

//! The Rant runtime: a single-threaded tree walker over the RST.

pub(crate) mod error;
pub(crate) mod output;
pub(crate) mod resolver;

pub use error::*;
pub use output::MAIN_CHANNEL_NAME;
pub use resolver::{SelectorMode, SelectorError};

use std::{mem, rc::Rc};
use fnv::{FnvBuildHasher, FnvHashMap, FnvHashSet};
use quickscope::ScopeMap;
use smallvec::SmallVec;

use crate::{InternalString, ProgramArgs, Rant, RantProgram, RunResult, RANT_VERSION};
use crate::format::OutputFormat;
use crate::func::RantFuncArg;
use crate::lang::*;
use crate::query::{run_query, CarrierState};
use crate::random::RantRng;
use self::error::runtime_error;
use self::output::{Output, TargetValues};
use self::resolver::Resolver;

macro_rules! runtime_trace {
  ($fmt:literal) => {#[cfg(all(feature = "vm-trace", debug_assertions))]{
    eprintln!("[vm-trace] {}", $fmt)
  }};
  ($fmt:literal, $($args:expr),+) => {#[cfg(all(feature = "vm-trace", debug_assertions))]{
    eprintln!("[vm-trace] {}", format!($fmt, $($args),+))
  }};
}

/// Execution budgets consulted by the VM. Exceeding any of them aborts the
/// run with a runtime error.
#[derive(Debug, Copy, Clone)]
pub struct RuntimeLimits {
  /// Maximum number of execution steps.
  pub max_steps: u64,
  /// Maximum number of characters the program may emit.
  pub max_output: u64,
  /// Maximum RST nesting depth.
  pub max_depth: usize,
}

impl Default for RuntimeLimits {
  fn default() -> Self {
    Self {
      max_steps: 1_000_000,
      max_output: 1_000_000,
      max_depth: 1_000,
    }
  }
}

/// The Rant Virtual Machine: executes one program against one engine state.
pub struct VM<'rant> {
  rng: Rc<RantRng>,
  engine: &'rant Rant,
  program: &'rant RantProgram,
  limits: RuntimeLimits,
  output: Output,
  resolver: Resolver,
  locals: ScopeMap<InternalString, InternalString, FnvBuildHasher>,
  subs: ScopeMap<InternalString, Rc<SubroutineDef>, FnvBuildHasher>,
  args: FnvHashMap<InternalString, InternalString>,
  marks: FnvHashMap<InternalString, (InternalString, usize)>,
  declared_targets: FnvHashSet<InternalString>,
  targets: TargetValues,
  carriers: CarrierState,
  fmt_stack: SmallVec<[OutputFormat; 4]>,
  call_trace: Vec<InternalString>,
  depth: usize,
  steps: u64,
  chars_out: u64,
}

impl<'rant> VM<'rant> {
  pub(crate) fn new(rng: Rc<RantRng>, engine: &'rant Rant, program: &'rant RantProgram) -> Self {
    Self {
      rng,
      limits: engine.limits(),
      engine,
      program,
      output: Output::new(),
      resolver: Resolver::new(),
      locals: Default::default(),
      subs: Default::default(),
      args: Default::default(),
      marks: Default::default(),
      declared_targets: Default::default(),
      targets: Default::default(),
      carriers: Default::default(),
      fmt_stack: {
        let mut stack = SmallVec::new();
        stack.push(OutputFormat::default());
        stack
      },
      call_trace: vec![],
      depth: 0,
      steps: 0,
      chars_out: 0,
    }
  }

  /// Runs the program to completion, then applies the deferred send pass and
  /// assembles the result channels.
  pub(crate) fn run(&mut self, args: Option<&ProgramArgs>) -> RuntimeResult<RunResult> {
    let mut result = self.run_inner(args);
    if let Err(err) = result.as_mut() {
      err.stack_trace = Some(self.gen_stack_trace());
    }
    result
  }

  fn run_inner(&mut self, args: Option<&ProgramArgs>) -> RuntimeResult<RunResult> {
    if let Some(args) = args {
      for (name, value) in args.iter() {
        let value = InternalString::from(value);
        self.args.insert(InternalString::from(name), value.clone());
        self.locals.define(InternalString::from(name), value);
      }
    }

    self.call_trace.push(InternalString::from(self.program.name().unwrap_or("program")));
    runtime_trace!("run start: {}", self.program.name().unwrap_or("program"));

    let root = Rc::clone(self.program.root());
    self.exec_seq(&root)?;

    // Second pass: sends recorded during execution resolve target regions here
    let (main, channels) = mem::take(&mut self.output).finish(&self.targets);
    Ok(RunResult {
      main,
      channels: channels.into_iter().map(|(name, text)| (name.to_string(), text)).collect(),
    })
  }

  fn gen_stack_trace(&self) -> String {
    let mut trace = String::new();
    for (i, frame) in self.call_trace.iter().enumerate().rev() {
      trace.push_str(&format!("-> {}", frame));
      if i > 0 {
        trace.push('\n');
      }
    }
    trace
  }

  #[inline]
  fn step(&mut self) -> RuntimeResult<()> {
    self.steps += 1;
    if self.steps > self.limits.max_steps {
      runtime_error!(RuntimeErrorType::StepBudgetExceeded, "step budget of {} exceeded", self.limits.max_steps);
    }
    Ok(())
  }

  fn push_scope(&mut self) {
    self.locals.push_layer();
    self.subs.push_layer();
    let fmt = self.fmt_stack.last().unwrap().clone();
    self.fmt_stack.push(fmt);
  }

  fn pop_scope(&mut self) {
    self.locals.pop_layer();
    self.subs.pop_layer();
    self.fmt_stack.pop();
  }

  pub(crate) fn exec_seq(&mut self, seq: &Sequence) -> RuntimeResult<()> {
    for rst in seq.iter() {
      self.exec(rst)?;
    }
    Ok(())
  }

  fn exec(&mut self, rst: &Rst) -> RuntimeResult<()> {
    self.step()?;
    self.depth += 1;
    if self.depth > self.limits.max_depth {
      self.depth -= 1;
      runtime_error!(RuntimeErrorType::StackOverflow, "execution depth limit of {} exceeded", self.limits.max_depth);
    }
    let result = self.exec_inner(rst);
    self.depth -= 1;
    match result {
      Err(mut err) => {
        if err.span.is_none() && rst.span != (0..0) {
          err.span = Some(rst.span.clone());
        }
        Err(err)
      },
      ok => ok,
    }
  }

  fn exec_inner(&mut self, rst: &Rst) -> RuntimeResult<()> {
    runtime_trace!("exec: {}", rst.display_name());
    match &rst.kind {
      RstKind::Nop => {},
      RstKind::Fragment(text) => self.print(text.as_str())?,
      RstKind::Whitespace(ws) => self.print(ws.as_str())?,
      // Digit runs are literal text; number formats only apply to computed values
      RstKind::Integer(n) => self.print(n.to_string().as_str())?,
      RstKind::Sequence(seq) => {
        let seq = Rc::clone(seq);
        self.exec_seq(&seq)?;
      },
      RstKind::Block(block) => {
        let block = Rc::clone(block);
        self.exec_block(&block)?;
      },
      RstKind::Tag(call) => self.exec_tag(call)?,
      RstKind::Query(query) => self.exec_query(query)?,
      RstKind::VarGet(name) => {
        let value = match self.locals.get(name.as_str()) {
          Some(value) => value.clone(),
          None => runtime_error!(RuntimeErrorType::InvalidAccess, "variable '{}' not found", name),
        };
        self.print(value.as_str())?;
      },
      RstKind::VarSet(name, value_seq) => {
        let value = self.eval_to_string(value_seq)?;
        match self.locals.get_mut(name.as_str()) {
          Some(slot) => *slot = value,
          None => self.locals.define(InternalString::from(name.as_str()), value),
        }
      },
      RstKind::SubDef(def) => {
        self.subs.define(InternalString::from(def.name.as_str()), Rc::clone(def));
      },
      RstKind::SubCall(call) => self.exec_sub_call(call)?,
      RstKind::Conditional(cond) => {
        let value = self.eval_to_string(&cond.condition)?;
        let truthy = is_truthy(value.as_str()) != cond.negate;
        let body = if truthy {
          Some(Rc::clone(&cond.then_body))
        } else {
          cond.else_body.as_ref().map(Rc::clone)
        };
        if let Some(body) = body {
          self.push_scope();
          let result = self.exec_seq(&body);
          self.pop_scope();
          result?;
        }
      },
      RstKind::Arith { op, operands } => self.exec_arith(*op, operands)?,
      RstKind::ListInit(elements) => {
        let elements = Rc::clone(elements);
        let sep = self.resolver.attrs_mut().sep.take();
        for (i, element) in elements.iter().enumerate() {
          if i > 0 {
            match &sep {
              Some(sep) => self.exec_seq(sep)?,
              None => self.print(", ")?,
            }
          }
          self.exec_seq(element)?;
        }
      },
      RstKind::Channel { name, visibility, body } => {
        self.output.push_channel(name.as_str(), *visibility);
        let body = Rc::clone(body);
        let result = self.exec_seq(&body);
        self.output.pop_channel();
        result?;
      },
      RstKind::Mark(name) => {
        let channel = self.output.active_channel_name();
        let pos = self.output.mark_position();
        self.marks.insert(InternalString::from(name.as_str()), (channel, pos));
      },
      RstKind::Dist(a, b) => {
        let pos_a = self.mark(a)?;
        let pos_b = self.mark(b)?;
        if pos_a.0 != pos_b.0 {
          runtime_error!(RuntimeErrorType::InvalidMark, "marks '{}' and '{}' are in different channels", a, b);
        }
        let dist = if pos_b.1 >= pos_a.1 { pos_b.1 - pos_a.1 } else { pos_a.1 - pos_b.1 };
        self.print_integer(dist as i64)?;
      },
      RstKind::DefTarget(name) => {
        self.declared_targets.insert(InternalString::from(name.as_str()));
        self.output.write_target(name.as_str());
      },
      RstKind::Send(name, value_seq) => {
        if !self.declared_targets.contains(name.as_str()) {
          runtime_error!(RuntimeErrorType::InvalidTarget, "target '{}' does not exist", name);
        }
        let value = self.eval_to_string(value_seq)?;
        self.targets.entry(InternalString::from(name.as_str())).or_default().push_str(value.as_str());
      },
      RstKind::Replace(replacer) => {
        let subject = self.eval_to_string(&replacer.subject)?;
        let replacement = self.eval_to_string(&replacer.replacement)?;
        let result = replacer.pattern.replace_all(subject.as_str(), replacement.as_str());
        self.print(&result)?;
      },
      RstKind::CharGen { class, count } => {
        let charset: &[u8] = match class {
          CharClass::Digit => b"0123456789",
          CharClass::HexLower => b"0123456789abcdef",
          CharClass::HexUpper => b"0123456789ABCDEF",
          CharClass::LetterLower => b"abcdefghijklmnopqrstuvwxyz",
          CharClass::LetterUpper => b"ABCDEFGHIJKLMNOPQRSTUVWXYZ",
        };
        let mut text = InternalString::new();
        for _ in 0..*count {
          text.push(charset[self.rng.next_usize(charset.len())] as char);
        }
        self.print(text.as_str())?;
      },
      RstKind::Article => {
        let mode = self.fmt_stack.last().unwrap().article;
        self.output.defer_article(mode);
      },
    }
    Ok(())
  }

  fn exec_block(&mut self, block: &Rc<Block>) -> RuntimeResult<()> {
    self.resolver.push_block(block);
    let result = self.exec_block_iterations(block);
    self.resolver.pop_block();
    result
  }

  fn exec_block_iterations(&mut self, block: &Rc<Block>) -> RuntimeResult<()> {
    let rng = Rc::clone(&self.rng);
    loop {
      // Loop backedge; repeaters burn budget here even with empty branches
      self.step()?;
      let next = match self.resolver.active_block_mut() {
        Some(state) => state.next_index(&rng)?,
        None => runtime_error!(RuntimeErrorType::InternalError, "block state missing during block execution"),
      };
      let index = match next {
        Some(index) => index,
        None => break,
      };
      let (iteration, sep, before, after) = {
        let state = self.resolver.active_block().unwrap();
        (state.iteration(), state.sep().cloned(), state.before().cloned(), state.after().cloned())
      };
      // Separators fire strictly between iterations
      if iteration > 1 {
        if let Some(sep) = &sep {
          self.exec_seq(sep)?;
        }
      }
      if let Some(before) = &before {
        self.exec_seq(before)?;
      }
      self.push_scope();
      let result = self.exec_seq(&block.branches[index].body);
      self.pop_scope();
      result?;
      if let Some(after) = &after {
        self.exec_seq(after)?;
      }
    }
    Ok(())
  }

  fn exec_tag(&mut self, call: &FunctionCall) -> RuntimeResult<()> {
    let group = match self.engine.functions().get(call.name.as_str()) {
      Some(group) => Rc::clone(group),
      None => runtime_error!(RuntimeErrorType::UnknownFunction, "function '{}' does not exist", call.name),
    };
    let handler = match group.overload_for_arity(call.args.len()) {
      Some(overload) => overload.handler(),
      None => runtime_error!(
        RuntimeErrorType::ArgumentMismatch,
        "function '{}' has no overload taking {} argument(s)", call.name, call.args.len()
      ),
    };
    let mut args = Vec::with_capacity(call.args.len());
    for arg in &call.args {
      args.push(match arg {
        FunctionArg::Cooked(seq) => RantFuncArg::Cooked(self.eval_to_string(seq)?),
        FunctionArg::Raw(seq) => RantFuncArg::Raw(Rc::clone(seq)),
      });
    }
    handler(self, args)
  }

  fn exec_query(&mut self, query: &crate::query::Query) -> RuntimeResult<()> {
    let engine = self.engine;
    let rng = Rc::clone(&self.rng);
    let hit = match engine.dictionary() {
      Some(dict) => run_query(query, dict, &rng, &mut self.carriers).ok(),
      None => None,
    };
    match hit {
      Some(term) => self.print(term.as_str())?,
      // Soft miss: append a diagnostic token and keep going
      None => {
        let diag = format!("[?{}]", query);
        self.print(&diag)?;
      },
    }
    Ok(())
  }

  fn exec_sub_call(&mut self, call: &SubroutineCall) -> RuntimeResult<()> {
    let def = match self.subs.get(call.name.as_str()) {
      Some(def) => Rc::clone(def),
      None => runtime_error!(RuntimeErrorType::UnknownSubroutine, "subroutine '{}' is not defined", call.name),
    };
    if call.args.len() != def.params.len() {
      runtime_error!(
        RuntimeErrorType::ArgumentMismatch,
        "subroutine '{}' expects {} argument(s), but got {}", call.name, def.params.len(), call.args.len()
      );
    }
    let mut arg_values = Vec::with_capacity(call.args.len());
    for arg in &call.args {
      arg_values.push(self.eval_to_string(arg)?);
    }
    self.call_trace.push(InternalString::from(format!("[${}]", call.name).as_str()));
    self.push_scope();
    for (param, value) in def.params.iter().zip(arg_values) {
      self.locals.define(InternalString::from(param.as_str()), value);
    }
    let result = self.exec_seq(&def.body);
    self.pop_scope();
    self.call_trace.pop();
    result
  }

  fn exec_arith(&mut self, op: ArithOp, operands: &[Rc<Sequence>]) -> RuntimeResult<()> {
    let mut values = Vec::with_capacity(operands.len());
    for operand in operands {
      let text = self.eval_to_string(operand)?;
      values.push(self.parse_number(text.as_str())?);
    }
    let result = match op {
      ArithOp::Add => values[0] + values[1],
      ArithOp::Sub => values[0] - values[1],
      ArithOp::Mul => values[0] * values[1],
      ArithOp::Div => {
        if values[1] == 0.0 {
          runtime_error!(RuntimeErrorType::ArgumentError, "division by zero");
        }
        values[0] / values[1]
      },
      ArithOp::Mod => {
        if values[1] == 0.0 {
          runtime_error!(RuntimeErrorType::ArgumentError, "division by zero");
        }
        values[0] % values[1]
      },
      ArithOp::Neg => -values[0],
    };
    self.print_number(result)
  }

  fn mark(&self, name: &Identifier) -> RuntimeResult<(InternalString, usize)> {
    match self.marks.get(name.as_str()) {
      Some(mark) => Ok(mark.clone()),
      None => runtime_error!(RuntimeErrorType::InvalidMark, "mark '{}' does not exist", name),
    }
  }

  fn parse_number(&self, text: &str) -> RuntimeResult<f64> {
    match text.trim().parse::<f64>() {
      Ok(n) => Ok(n),
      Err(_) => runtime_error!(RuntimeErrorType::ArgumentError, "cannot convert '{}' to a number", text),
    }
  }
}

// Facilities used by native functions.
impl<'rant> VM<'rant> {
  /// Writes text to the output through the active formatting filters.
  pub fn print(&mut self, text: &str) -> RuntimeResult<()> {
    self.chars_out += text.chars().count() as u64;
    if self.chars_out > self.limits.max_output {
      runtime_error!(RuntimeErrorType::OutputBudgetExceeded, "output budget of {} characters exceeded", self.limits.max_output);
    }
    let fmt = self.fmt_stack.last().unwrap().clone();
    self.output.write_text(text, &fmt, &mut self.targets);
    Ok(())
  }

  /// Writes an integer formatted according to the active number format.
  pub fn print_integer(&mut self, n: i64) -> RuntimeResult<()> {
    let text = self.fmt_stack.last().unwrap().number_format.format_integer(n);
    self.print(text.as_str())
  }

  /// Writes a number, using integer formatting for whole values.
  pub fn print_number(&mut self, n: f64) -> RuntimeResult<()> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
      self.print_integer(n as i64)
    } else {
      let text = self.fmt_stack.last().unwrap().number_format.format_float(n);
      self.print(text.as_str())
    }
  }

  /// Evaluates a sequence in a fresh sub-output and returns its text.
  /// Nothing leaks to the enclosing channels.
  pub fn eval_to_string(&mut self, seq: &Sequence) -> RuntimeResult<InternalString> {
    self.output.push_capture();
    let result = self.exec_seq(seq);
    let text = self.output.pop_capture(&self.targets);
    result?;
    Ok(text)
  }

  /// The engine RNG.
  #[inline]
  pub fn rng(&self) -> &RantRng {
    &self.rng
  }

  /// The active formatting state.
  #[inline]
  pub fn fmt(&self) -> &OutputFormat {
    self.fmt_stack.last().unwrap()
  }

  /// Mutable access to the active formatting state.
  #[inline]
  pub fn fmt_mut(&mut self) -> &mut OutputFormat {
    self.fmt_stack.last_mut().unwrap()
  }

  /// Resets the capitalization filter state.
  pub fn reset_caps_state(&mut self) {
    self.output.reset_caps_state();
  }

  /// The block resolver.
  #[inline]
  pub(crate) fn resolver_mut(&mut self) -> &mut Resolver {
    &mut self.resolver
  }

  /// Gets the state of the innermost active block, if any.
  pub(crate) fn active_block(&self) -> Option<&resolver::BlockState> {
    self.resolver.active_block()
  }

  /// Gets a program argument by name.
  pub fn program_arg(&self, name: &str) -> Option<&str> {
    self.args.get(name).map(|v| v.as_str())
  }

  /// The seed of the engine RNG.
  pub fn seed(&self) -> u64 {
    self.rng.seed()
  }

  /// The Rant language version implemented by the runtime.
  pub fn version(&self) -> &'static str {
    RANT_VERSION
  }
}

fn is_truthy(text: &str) -> bool {
  let text = text.trim();
  if text.eq_ignore_ascii_case("true") {
    return true
  }
  if text.eq_ignore_ascii_case("false") || text.is_empty() {
    return false
  }
  text.parse::<f64>().map(|n| n != 0.0).unwrap_or(false)
}

//! Block resolution: attribute frames, per-block iteration state, selector
//! strategies, and the synchronizer table.

use std::{cell::RefCell, error::Error, fmt::Display, mem, rc::Rc};
use fnv::FnvHashMap;
use smallvec::SmallVec;
use crate::InternalString;
use crate::lang::{Block, Sequence};
use crate::random::RantRng;
use crate::runtime::{IntoRuntimeResult, RuntimeError, RuntimeErrorType, RuntimeResult};

pub type SyncRef = Rc<RefCell<Synchronizer>>;

const BLOCK_STACK_INLINE_COUNT: usize = 4;

/// Repetition counts assignable to a block.
#[derive(Debug, Copy, Clone)]
pub enum Reps {
  /// Iterate a specific number of times.
  Finite(usize),
  /// Iterate as many times as there are branches in the block.
  Each,
}

impl Default for Reps {
  fn default() -> Self {
    Reps::Finite(1)
  }
}

impl Reps {
  #[inline]
  pub fn count_for(&self, block: &Block) -> usize {
    match self {
      Reps::Finite(n) => *n,
      Reps::Each => block.len(),
    }
  }
}

/// A full set of pending block attributes. Consumed by the next block to execute.
#[derive(Default)]
pub struct AttributeFrame {
  pub reps: Reps,
  pub sep: Option<Rc<Sequence>>,
  pub before: Option<Rc<Sequence>>,
  pub after: Option<Rc<Sequence>>,
  pub sync: Option<SyncRef>,
}

/// Stores state information for a block that is currently being resolved.
pub struct BlockState {
  block: Rc<Block>,
  weights: Option<Vec<f64>>,
  sep: Option<Rc<Sequence>>,
  before: Option<Rc<Sequence>>,
  after: Option<Rc<Sequence>>,
  sync: Option<SyncRef>,
  iter_count: usize,
  total_reps: usize,
}

impl BlockState {
  /// Advances to the next iteration and returns the branch index to run,
  /// or `None` once all iterations are finished.
  ///
  /// Synchronized blocks read the synchronizer's shared sequence from their
  /// own cursor, so blocks of equal shape bound to the same synchronizer
  /// return the same index for their k-th execution.
  pub fn next_index(&mut self, rng: &RantRng) -> RuntimeResult<Option<usize>> {
    if self.is_done() {
      return Ok(None)
    }
    let cursor = self.iter_count;
    self.iter_count += 1;
    let weights = self.weights.as_deref();
    let index = match &self.sync {
      Some(sync) => {
        sync.borrow_mut()
          .index_at(cursor, self.block.len(), weights, rng)
          .into_runtime_result()?
      },
      None => match weights {
        Some(weights) => weighted_pick(rng, weights, None),
        None => rng.next_usize(self.block.len()),
      },
    };
    Ok(Some(index))
  }

  #[inline]
  pub fn is_done(&self) -> bool {
    self.iter_count >= self.total_reps
  }

  /// 1-based number of the iteration currently executing.
  #[inline]
  pub fn iteration(&self) -> usize {
    self.iter_count
  }

  #[inline]
  pub fn total_reps(&self) -> usize {
    self.total_reps
  }

  #[inline]
  pub fn sep(&self) -> Option<&Rc<Sequence>> {
    self.sep.as_ref()
  }

  #[inline]
  pub fn before(&self) -> Option<&Rc<Sequence>> {
    self.before.as_ref()
  }

  #[inline]
  pub fn after(&self) -> Option<&Rc<Sequence>> {
    self.after.as_ref()
  }
}

/// Manages block execution behavior: the pending attribute frame, the stack of
/// active block states, and the synchronizer table.
pub struct Resolver {
  attrs: AttributeFrame,
  block_stack: SmallVec<[BlockState; BLOCK_STACK_INLINE_COUNT]>,
  syncs: FnvHashMap<InternalString, SyncRef>,
}

impl Resolver {
  pub fn new() -> Self {
    Self {
      attrs: Default::default(),
      block_stack: Default::default(),
      syncs: Default::default(),
    }
  }

  /// Takes the pending attribute frame, replacing it with a default one.
  pub fn take_attrs(&mut self) -> AttributeFrame {
    mem::take(&mut self.attrs)
  }

  #[inline]
  pub fn attrs_mut(&mut self) -> &mut AttributeFrame {
    &mut self.attrs
  }

  /// Creates a block state from a block and the pending attribute frame,
  /// and pushes it onto the block stack.
  pub fn push_block(&mut self, block: &Rc<Block>) {
    let attrs = self.take_attrs();
    let weights = if block.is_weighted() {
      Some(block.branches.iter().map(|b| b.weight.unwrap_or(1.0)).collect())
    } else {
      None
    };
    self.block_stack.push(BlockState {
      total_reps: attrs.reps.count_for(block),
      block: Rc::clone(block),
      weights,
      sep: attrs.sep,
      before: attrs.before,
      after: attrs.after,
      sync: attrs.sync,
      iter_count: 0,
    });
  }

  /// Removes the active block state from the block stack.
  #[inline]
  pub fn pop_block(&mut self) -> Option<BlockState> {
    self.block_stack.pop()
  }

  /// Gets a reference to the active block state.
  #[inline]
  pub fn active_block(&self) -> Option<&BlockState> {
    self.block_stack.last()
  }

  /// Gets a mutable reference to the active block state.
  #[inline]
  pub fn active_block_mut(&mut self) -> Option<&mut BlockState> {
    self.block_stack.last_mut()
  }

  /// Gets a synchronizer by name, creating it with the supplied mode if absent.
  pub fn get_or_create_sync(&mut self, name: &str, mode: SelectorMode) -> SyncRef {
    if let Some(sync) = self.syncs.get(name) {
      return Rc::clone(sync)
    }
    let sync: SyncRef = Rc::new(RefCell::new(Synchronizer::new(mode)));
    self.syncs.insert(InternalString::from(name), Rc::clone(&sync));
    sync
  }

  /// Gets an existing synchronizer by name.
  pub fn sync(&self, name: &str) -> Option<&SyncRef> {
    self.syncs.get(name)
  }
}

/// Picks an index weighted by `weights`, optionally excluding one index.
/// Weights `<= 0` drop their branch; if nothing carries positive weight,
/// the pick falls back to uniform over the allowed indices.
fn weighted_pick(rng: &RantRng, weights: &[f64], exclude: Option<usize>) -> usize {
  let weight_of = |i: usize| {
    if Some(i) == exclude { return 0.0 }
    let w = weights[i];
    if w > 0.0 { w } else { 0.0 }
  };
  let total: f64 = (0..weights.len()).map(weight_of).sum();
  if total <= 0.0 {
    let allowed: Vec<usize> = (0..weights.len()).filter(|&i| Some(i) != exclude).collect();
    return allowed[rng.next_usize(allowed.len())]
  }
  let mut roll = rng.next_f64(0.0, total);
  let mut last_positive = 0;
  for i in 0..weights.len() {
    let w = weight_of(i);
    if w <= 0.0 {
      continue
    }
    last_positive = i;
    roll -= w;
    if roll <= 0.0 {
      return i
    }
  }
  last_positive
}

/// A named, shared branch index sequence. The underlying selector generates
/// indices on demand; generated indices are memoized so every consumer reads
/// the same sequence in the same order.
#[derive(Debug)]
pub struct Synchronizer {
  selector: Selector,
  history: Vec<usize>,
  pinned: bool,
}

impl Synchronizer {
  pub fn new(mode: SelectorMode) -> Self {
    Self {
      selector: Selector::new(mode),
      history: vec![],
      pinned: false,
    }
  }

  #[inline]
  pub fn mode(&self) -> SelectorMode {
    self.selector.mode()
  }

  #[inline]
  pub fn is_pinned(&self) -> bool {
    self.pinned
  }

  /// Pinned synchronizers stop advancing; every read yields the most
  /// recently generated index.
  #[inline]
  pub fn set_pinned(&mut self, pinned: bool) {
    self.pinned = pinned;
  }

  /// Clears the sequence and selector state.
  pub fn reset(&mut self) {
    self.selector.reset();
    self.history.clear();
  }

  /// Returns the `k`-th index of the shared sequence, generating and memoizing
  /// entries as needed. A branch count differing from the one the sequence was
  /// built for rebinds the synchronizer.
  pub fn index_at(&mut self, k: usize, elem_count: usize, weights: Option<&[f64]>, rng: &RantRng) -> Result<usize, SelectorError> {
    if self.selector.is_initialized() && elem_count != self.selector.count() {
      self.reset();
    }
    if self.pinned {
      return match self.history.last() {
        Some(&last) => Ok(last),
        None => {
          let first = self.selector.select(elem_count, weights, rng)?;
          self.history.push(first);
          Ok(first)
        }
      }
    }
    while self.history.len() <= k {
      let next = self.selector.select(elem_count, weights, rng)?;
      self.history.push(next);
    }
    Ok(self.history[k])
  }
}

/// Represents a selector instance: one branch selection strategy plus its
/// persistent state.
#[derive(Debug)]
pub struct Selector {
  /// Mode of the selector
  mode: SelectorMode,
  /// Next index to be selected (mode-dependent meaning)
  index: usize,
  /// Branch count the selector is initialized for
  count: usize,
  /// True on odd passes of the ping-pong walk
  parity: bool,
  /// Last index returned, used by modes that forbid immediate repeats
  last: Option<usize>,
  /// Jump table used by the shuffle modes (won't allocate if unused)
  jump_table: Vec<usize>,
}

impl Selector {
  #[inline]
  pub fn new(mode: SelectorMode) -> Self {
    Self {
      mode,
      index: 0,
      count: 0,
      parity: false,
      last: None,
      jump_table: Default::default(),
    }
  }

  #[inline]
  pub fn mode(&self) -> SelectorMode {
    self.mode
  }

  #[inline]
  pub fn count(&self) -> usize {
    self.count
  }

  #[inline]
  pub fn is_initialized(&self) -> bool {
    self.count > 0
  }

  /// Resets the selector to its uninitialized state.
  pub fn reset(&mut self) {
    self.index = 0;
    self.count = 0;
    self.parity = false;
    self.last = None;
    self.jump_table.clear();
  }

  /// Initializes the selector state for the specified branch count.
  fn init(&mut self, rng: &RantRng, elem_count: usize) -> Result<(), SelectorError> {
    if elem_count == 0 {
      return Err(SelectorError::InvalidElementCount(0))
    }

    self.count = elem_count;
    self.parity = false;
    self.last = None;

    match self.mode {
      SelectorMode::Random | SelectorMode::NoRepeat => {
        self.index = 0;
      },
      SelectorMode::Locked => {
        self.index = rng.next_usize(elem_count);
      },
      SelectorMode::Ordered | SelectorMode::PingPong => {
        self.index = 0;
      },
      SelectorMode::RandShuffle | SelectorMode::ContinuousDeck => {
        self.jump_table.clear();
        self.shuffle(rng);
        self.index = 0;
      },
    }

    Ok(())
  }

  /// Shuffles the branch indices in the jump table (Fisher-Yates), ensuring
  /// the new cycle does not open with the index that closed the previous one.
  fn shuffle(&mut self, rng: &RantRng) {
    let jump_table = &mut self.jump_table;
    let n = self.count;

    if jump_table.is_empty() {
      jump_table.reserve(n);
      jump_table.extend(0..n);
    }

    for i in 0..n {
      jump_table.swap(i, rng.next_usize(n));
    }

    if n > 1 {
      if let Some(last) = self.last {
        if jump_table[0] == last {
          let swap_with = 1 + rng.next_usize(n - 1);
          jump_table.swap(0, swap_with);
        }
      }
    }
  }

  /// Returns the next branch index and advances the selector state.
  pub fn select(&mut self, elem_count: usize, weights: Option<&[f64]>, rng: &RantRng) -> Result<usize, SelectorError> {
    if !self.is_initialized() || elem_count != self.count {
      self.init(rng, elem_count)?;
    }

    let cur_index = self.index;

    let result = match self.mode {
      SelectorMode::Random => {
        match weights {
          Some(weights) => weighted_pick(rng, weights, None),
          None => rng.next_usize(elem_count),
        }
      },
      SelectorMode::Locked => cur_index,
      SelectorMode::Ordered => {
        self.index = (cur_index + 1) % elem_count;
        cur_index
      },
      SelectorMode::PingPong => {
        let prev_parity = self.parity;
        if (prev_parity && cur_index == 0) || (!prev_parity && cur_index >= elem_count - 1) {
          self.parity = !prev_parity;
        }
        if self.parity {
          self.index = cur_index.saturating_sub(1);
        } else {
          self.index = (cur_index + 1) % elem_count;
        }
        cur_index
      },
      SelectorMode::RandShuffle => {
        let jump_index = self.jump_table[cur_index];
        // Record before reshuffling so the boundary check sees this pick
        self.last = Some(jump_index);
        if cur_index >= elem_count - 1 {
          self.shuffle(rng);
          self.index = 0;
        } else {
          self.index = cur_index + 1;
        }
        jump_index
      },
      SelectorMode::ContinuousDeck => {
        self.index = (cur_index + 1) % elem_count;
        self.jump_table[cur_index]
      },
      SelectorMode::NoRepeat => {
        if elem_count > 1 {
          match (weights, self.last) {
            (Some(weights), last) => weighted_pick(rng, weights, last),
            (None, Some(last)) => (last + 1 + rng.next_usize(elem_count - 1)) % elem_count,
            (None, None) => rng.next_usize(elem_count),
          }
        } else {
          0
        }
      },
    };

    self.last = Some(result);
    Ok(result)
  }
}

/// Represents error states of a selector.
#[derive(Debug)]
pub enum SelectorError {
  /// The specified element count is not supported.
  InvalidElementCount(usize),
}

impl Error for SelectorError {}

impl Display for SelectorError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SelectorError::InvalidElementCount(n) => write!(f, "selector does not support blocks of size {}", n),
    }
  }
}

impl<T> IntoRuntimeResult<T> for Result<T, SelectorError> {
  fn into_runtime_result(self) -> RuntimeResult<T> {
    self.map_err(|err| RuntimeError {
      description: err.to_string(),
      error_type: RuntimeErrorType::SelectorError(err),
      span: None,
      stack_trace: None,
    })
  }
}

/// Defines available branch selection strategies.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum SelectorMode {
  /// Selects a random branch each time, respecting branch weights.
  Random,
  /// Selects each branch in a wrapping sequence from left to right.
  Ordered,
  /// Selects each branch once per cycle in a random order, reshuffling between
  /// cycles; a cycle never opens with the branch that closed the previous one.
  RandShuffle,
  /// Selects each branch once in a wrapping random sequence, without reshuffling.
  ContinuousDeck,
  /// Selects a random branch once and reuses it forever.
  Locked,
  /// Selects branches left to right, then right to left, without repeating
  /// boundary branches.
  PingPong,
  /// Selects a random branch each time, never the same one twice in a row.
  NoRepeat,
}

impl SelectorMode {
  pub fn from_name(name: &str) -> Option<Self> {
    Some(match name {
      "random" =>       SelectorMode::Random,
      "ordered" =>      SelectorMode::Ordered,
      "rand-shuffle" => SelectorMode::RandShuffle,
      "cdeck" =>        SelectorMode::ContinuousDeck,
      "locked" =>       SelectorMode::Locked,
      "ping-pong" =>    SelectorMode::PingPong,
      "no-repeat" =>    SelectorMode::NoRepeat,
      _ => return None,
    })
  }

  pub fn name(&self) -> &'static str {
    match self {
      SelectorMode::Random =>         "random",
      SelectorMode::Ordered =>        "ordered",
      SelectorMode::RandShuffle =>    "rand-shuffle",
      SelectorMode::ContinuousDeck => "cdeck",
      SelectorMode::Locked =>         "locked",
      SelectorMode::PingPong =>       "ping-pong",
      SelectorMode::NoRepeat =>       "no-repeat",
    }
  }
}

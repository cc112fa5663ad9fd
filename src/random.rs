//! Deterministic random source for program executions.
//!
//! Each run owns exactly one `RantRng`, built from the run's seed; block
//! selection, queries, generator functions, and random character escapes all
//! draw from it in traversal order. Together with the single-threaded walk,
//! that is what makes a run a pure function of (program, seed, args,
//! dictionary). The generator is xoshiro256++, the documented algorithm this
//! crate commits to for seed-stable output across releases.

use std::cell::RefCell;
use rand::Rng;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// The random source of one program execution.
#[derive(Debug)]
pub struct RantRng {
  seed: u64,
  source: RefCell<Xoshiro256PlusPlus>,
}

impl RantRng {
  /// Creates the generator for an execution with the given seed.
  pub fn new(seed: u64) -> Self {
    Self {
      seed,
      source: RefCell::new(Xoshiro256PlusPlus::seed_from_u64(seed)),
    }
  }

  /// The seed this generator was built from.
  pub fn seed(&self) -> u64 {
    self.seed
  }

  /// Draws an integer from the inclusive range between `a` and `b`.
  /// The bounds may be given in either order.
  #[inline]
  pub fn next_i64(&self, a: i64, b: i64) -> i64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo == hi {
      return lo
    }
    self.source.borrow_mut().gen_range(lo, hi + 1)
  }

  /// Draws a float from the range between `a` and `b`.
  /// The bounds may be given in either order.
  #[inline]
  pub fn next_f64(&self, a: f64, b: f64) -> f64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo >= hi {
      return lo
    }
    self.source.borrow_mut().gen_range(lo, hi)
  }

  /// Draws a uniform index below `max`.
  #[inline]
  pub fn next_usize(&self, max: usize) -> usize {
    self.source.borrow_mut().gen_range(0usize, max)
  }

  /// Draws a `bool` that is `true` with probability `p`.
  /// Probabilities outside `[0, 1]` (and NaN) are clamped into range.
  #[inline]
  pub fn next_bool(&self, p: f64) -> bool {
    let p = if p.is_nan() { 0.0 } else { p.max(0.0).min(1.0) };
    self.source.borrow_mut().gen_bool(p)
  }
}

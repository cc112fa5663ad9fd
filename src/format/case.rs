use unicode_segmentation::UnicodeSegmentation;
use crate::InternalString;

/// Capitalization modes applied to output text as a post-append filter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum CapsMode {
  /// Don't change the casing at all.
  None,
  /// Convert everything to uppercase.
  Upper,
  /// Convert everything to lowercase.
  Lower,
  /// Capitalize the next letter, then stop.
  First,
  /// Capitalize the first letter of every word.
  Word,
  /// Capitalize the first letter of every sentence.
  Sentence,
}

impl Default for CapsMode {
  fn default() -> Self {
    Self::None
  }
}

impl CapsMode {
  pub fn from_name(name: &str) -> Option<Self> {
    Some(match name {
      "none" => Self::None,
      "upper" => Self::Upper,
      "lower" => Self::Lower,
      "first" => Self::First,
      "word" => Self::Word,
      "sentence" => Self::Sentence,
      _ => return None,
    })
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::None => "none",
      Self::Upper => "upper",
      Self::Lower => "lower",
      Self::First => "first",
      Self::Word => "word",
      Self::Sentence => "sentence",
    }
  }
}

/// Cross-fragment capitalization state. Output arrives in fragments of
/// arbitrary size, so word and sentence boundaries must survive between
/// filter invocations.
#[derive(Debug, Clone)]
pub struct CapsState {
  /// The next letter encountered should be capitalized.
  pending: bool,
}

impl Default for CapsState {
  fn default() -> Self {
    Self { pending: true }
  }
}

impl CapsState {
  /// Resets the state for a newly selected mode.
  pub fn reset(&mut self) {
    self.pending = true;
  }
}

/// Applies a capitalization mode to a text fragment, updating the
/// cross-fragment state.
pub fn transform(mode: CapsMode, state: &mut CapsState, input: &str) -> InternalString {
  match mode {
    CapsMode::None => InternalString::from(input),
    CapsMode::Upper => {
      let mut out = InternalString::new();
      for c in input.chars() {
        push_upper(&mut out, c);
      }
      out
    },
    CapsMode::Lower => {
      let mut out = InternalString::new();
      for c in input.chars() {
        push_lower(&mut out, c);
      }
      out
    },
    CapsMode::First => transform_boundaries(state, input, |_| false),
    CapsMode::Word => transform_boundaries(state, input, |c| !c.is_alphanumeric()),
    CapsMode::Sentence => transform_boundaries(state, input, |c| matches!(c, '.' | '!' | '?')),
  }
}

/// Walks the input grapheme by grapheme, capitalizing the first letter after
/// each boundary. `is_boundary` re-arms the pending capital.
fn transform_boundaries<F: Fn(char) -> bool>(state: &mut CapsState, input: &str, is_boundary: F) -> InternalString {
  let mut out = InternalString::new();
  for g in input.graphemes(true) {
    let first = match g.chars().next() {
      Some(c) => c,
      None => continue,
    };
    if state.pending && first.is_alphabetic() {
      state.pending = false;
      for (i, c) in g.chars().enumerate() {
        if i == 0 {
          push_upper(&mut out, c);
        } else {
          out.push(c);
        }
      }
      continue
    }
    if is_boundary(first) && !first.is_alphabetic() {
      state.pending = true;
    } else if first.is_alphanumeric() {
      state.pending = false;
    }
    out.push_str(g);
  }
  out
}

#[inline]
fn push_upper(buffer: &mut InternalString, input: char) {
  for c in input.to_uppercase() {
    buffer.push(c);
  }
}

#[inline]
fn push_lower(buffer: &mut InternalString, input: char) {
  for c in input.to_lowercase() {
    buffer.push(c);
  }
}

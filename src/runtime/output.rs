//! Output channels. Writes land on a stack of named channels; visibility
//! decides how far down the stack a write propagates and whether a channel
//! shows up in the final result. Target slots stay empty until the deferred
//! send pass fills them at render time.

use fnv::FnvHashMap;
use smallvec::SmallVec;
use crate::InternalString;
use crate::format::{self, ArticleMode, CapsState, OutputFormat};
use crate::lang::ChannelVisibility;

/// Name of the channel all output lands on by default.
pub const MAIN_CHANNEL_NAME: &str = "main";

const CHANNEL_STACK_INLINE_COUNT: usize = 3;

/// Filled target regions, keyed by target name.
pub type TargetValues = FnvHashMap<InternalString, InternalString>;

/// One unit of channel content.
#[derive(Debug)]
enum OutputSegment {
  Text(InternalString),
  /// An unfilled region, resolved against the target values at render time.
  Target(InternalString),
}

/// A named output buffer.
#[derive(Debug)]
pub struct OutputChannel {
  name: InternalString,
  visibility: ChannelVisibility,
  segments: Vec<OutputSegment>,
  /// Running count of resolved text characters, used for mark positions.
  char_len: usize,
  /// Anonymous channels capture sub-output and never surface in results.
  anonymous: bool,
}

impl OutputChannel {
  fn new(name: &str, visibility: ChannelVisibility, anonymous: bool) -> Self {
    Self {
      name: InternalString::from(name),
      visibility,
      segments: vec![],
      char_len: 0,
      anonymous,
    }
  }

  pub fn name(&self) -> &str {
    self.name.as_str()
  }

  pub fn visibility(&self) -> ChannelVisibility {
    self.visibility
  }

  fn write_text(&mut self, text: &str) {
    self.char_len += text.chars().count();
    if let Some(OutputSegment::Text(last)) = self.segments.last_mut() {
      last.push_str(text);
    } else {
      self.segments.push(OutputSegment::Text(InternalString::from(text)));
    }
  }

  fn write_target(&mut self, name: &str) {
    self.segments.push(OutputSegment::Target(InternalString::from(name)));
  }

  /// Renders the channel, substituting filled target regions.
  pub fn render(&self, targets: &TargetValues) -> InternalString {
    let mut out = InternalString::new();
    for segment in &self.segments {
      match segment {
        OutputSegment::Text(text) => out.push_str(text),
        OutputSegment::Target(name) => {
          if let Some(value) = targets.get(name) {
            out.push_str(value);
          }
        },
      }
    }
    out
  }
}

/// The channel stack plus the post-append filter state
/// (capitalization, deferred articles).
pub struct Output {
  stack: SmallVec<[OutputChannel; CHANNEL_STACK_INLINE_COUNT]>,
  finished: Vec<OutputChannel>,
  caps_state: CapsState,
  pending_articles: SmallVec<[(InternalString, ArticleMode); 1]>,
  article_counter: usize,
}

impl Output {
  pub fn new() -> Self {
    Self {
      stack: {
        let mut stack = SmallVec::new();
        stack.push(OutputChannel::new(MAIN_CHANNEL_NAME, ChannelVisibility::Public, false));
        stack
      },
      finished: vec![],
      caps_state: Default::default(),
      pending_articles: Default::default(),
      article_counter: 0,
    }
  }

  /// Resets the capitalization state, e.g. when a new mode is selected.
  pub fn reset_caps_state(&mut self) {
    self.caps_state.reset();
  }

  /// Writes text through the active filters to every admitting channel.
  /// Pending articles resolve against the first word-bearing text to arrive.
  ///
  /// Writes into a capture buffer are taken verbatim; the filters run when
  /// the captured text is eventually printed to a real channel.
  pub fn write_text(&mut self, text: &str, fmt: &OutputFormat, targets: &mut TargetValues) {
    if self.stack.last().map_or(false, |c| c.anonymous) {
      self.distribute_text(text);
      return
    }
    if !self.pending_articles.is_empty() && text.chars().any(|c| c.is_alphanumeric()) {
      let pending: SmallVec<[(InternalString, ArticleMode); 1]> = self.pending_articles.drain(..).collect();
      for (slot, mode) in pending {
        let article = format::indefinite_article_for(mode, text);
        let filtered = format::transform(fmt.caps, &mut self.caps_state, article);
        targets.insert(slot, filtered);
      }
    }
    let filtered = format::transform(fmt.caps, &mut self.caps_state, text);
    self.distribute_text(filtered.as_str());
  }

  fn distribute_text(&mut self, text: &str) {
    for channel in self.stack.iter_mut().rev() {
      channel.write_text(text);
      if channel.visibility != ChannelVisibility::Public {
        break
      }
    }
  }

  /// Inserts an empty target region into every admitting channel.
  pub fn write_target(&mut self, name: &str) {
    for channel in self.stack.iter_mut().rev() {
      channel.write_target(name);
      if channel.visibility != ChannelVisibility::Public {
        break
      }
    }
  }

  /// Inserts a deferred indefinite article, resolved by the next word written.
  pub fn defer_article(&mut self, mode: ArticleMode) {
    let slot = InternalString::from(format!("__article_{}", self.article_counter).as_str());
    self.article_counter += 1;
    self.write_target(slot.as_str());
    self.pending_articles.push((slot, mode));
  }

  /// Pushes a named channel onto the stack.
  pub fn push_channel(&mut self, name: &str, visibility: ChannelVisibility) {
    self.stack.push(OutputChannel::new(name, visibility, false));
  }

  /// Pops the active channel. Internal channels merge into their parent;
  /// everything else is kept for the run result.
  pub fn pop_channel(&mut self) {
    // The main channel at the bottom of the stack is never popped
    if self.stack.len() < 2 {
      return
    }
    let channel = self.stack.pop().unwrap();
    if channel.visibility == ChannelVisibility::Internal {
      let parent = self.stack.last_mut().unwrap();
      parent.char_len += channel.char_len;
      parent.segments.extend(channel.segments);
    } else if !channel.anonymous {
      self.finished.push(channel);
    }
  }

  /// Pushes an anonymous capture buffer for sub-output evaluation.
  pub fn push_capture(&mut self) {
    self.stack.push(OutputChannel::new("", ChannelVisibility::Private, true));
  }

  /// Pops a capture buffer and renders it with the currently filled targets.
  pub fn pop_capture(&mut self, targets: &TargetValues) -> InternalString {
    debug_assert!(self.stack.len() > 1, "capture popped without matching push");
    let channel = self.stack.pop().unwrap();
    channel.render(targets)
  }

  /// Name of the channel currently on top of the stack.
  pub fn active_channel_name(&self) -> InternalString {
    self.stack.last().unwrap().name.clone()
  }

  /// Resolved character position at the end of the active channel.
  pub fn mark_position(&self) -> usize {
    self.stack.last().unwrap().char_len
  }

  /// Finishes the output: renders the main channel and every public
  /// named channel against the filled targets.
  pub fn finish(mut self, targets: &TargetValues) -> (String, Vec<(InternalString, String)>) {
    while self.stack.len() > 1 {
      self.pop_channel();
    }
    let main = self.stack.pop().unwrap().render(targets).to_string();
    let mut channels: Vec<(InternalString, String)> = vec![];
    for channel in &self.finished {
      if channel.visibility != ChannelVisibility::Public {
        continue
      }
      let rendered = channel.render(targets);
      if let Some((_, existing)) = channels.iter_mut().find(|(name, _)| name == &channel.name) {
        existing.push_str(rendered.as_str());
      } else {
        channels.push((channel.name.clone(), rendered.to_string()));
      }
    }
    (main, channels)
  }
}

impl Default for Output {
  fn default() -> Self {
    Self::new()
  }
}

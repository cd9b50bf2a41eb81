//! Progressive disclosure of replies: collapsed by default, "reveal 3, then
//! +5", with the actor's own replies forced visible.

use std::collections::HashMap;

use super::thread::ThreadIndex;
use super::types::{CommentId, CommentNode};

/// First reveal shows up to this many replies.
pub const INITIAL_REVEAL: usize = 3;

/// Each further reveal shows up to this many more.
pub const REVEAL_STEP: usize = 5;

/// Per-session visible-reply counters, keyed by parent comment. Counters
/// move only on explicit reveal/hide actions or a locally-added reply; a
/// data refetch never collapses an expanded thread, except through
/// [`RevealState::reset`] on a full reload.
#[derive(Debug, Default)]
pub struct RevealState {
  visible: HashMap<CommentId, usize>,
}

impl RevealState {
  pub fn new() -> Self {
    Self::default()
  }

  /// How many replies are currently visible under `parent_id`.
  pub fn visible_count(&self, parent_id: &CommentId) -> usize {
    self.visible.get(parent_id).copied().unwrap_or(0)
  }

  /// Expand: from collapsed to the initial window, then by steps, capped at
  /// `total`.
  pub fn reveal(&mut self, parent_id: &CommentId, total: usize) {
    let current = self.visible_count(parent_id);
    let next = if current == 0 {
      INITIAL_REVEAL.min(total)
    } else {
      (current + REVEAL_STEP).min(total)
    };
    self.visible.insert(parent_id.clone(), next);
  }

  /// Collapse back to nothing.
  pub fn hide(&mut self, parent_id: &CommentId) {
    self.visible.insert(parent_id.clone(), 0);
  }

  /// A reply the actor just posted must be visible without a manual reveal.
  pub fn note_local_reply(&mut self, parent_id: &CommentId) {
    let current = self.visible_count(parent_id);
    self.visible.insert(parent_id.clone(), (current + 1).max(1));
  }

  /// Drop all counters; used only when the whole thread is reloaded.
  pub fn reset(&mut self) {
    self.visible.clear();
  }
}

/// The visible window of a parent's reply bucket.
pub fn visible_replies<'a>(
  index: &'a ThreadIndex,
  reveal: &RevealState,
  parent_id: &CommentId,
) -> &'a [CommentNode] {
  let bucket = index.replies_for(parent_id);
  let shown = reveal.visible_count(parent_id).min(bucket.len());
  &bucket[..shown]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_reveal_three_then_five_capped() {
    let parent: CommentId = "c1".into();
    let mut state = RevealState::new();

    state.reveal(&parent, 10);
    assert_eq!(state.visible_count(&parent), 3);
    state.reveal(&parent, 10);
    assert_eq!(state.visible_count(&parent), 8);
    state.reveal(&parent, 10);
    assert_eq!(state.visible_count(&parent), 10);
    state.reveal(&parent, 10);
    assert_eq!(state.visible_count(&parent), 10);
  }

  #[test]
  fn test_reveal_never_exceeds_small_totals() {
    let parent: CommentId = "c1".into();
    let mut state = RevealState::new();

    state.reveal(&parent, 2);
    assert_eq!(state.visible_count(&parent), 2);
  }

  #[test]
  fn test_hide_collapses_and_reveal_starts_over() {
    let parent: CommentId = "c1".into();
    let mut state = RevealState::new();

    state.reveal(&parent, 10);
    state.reveal(&parent, 10);
    state.hide(&parent);
    assert_eq!(state.visible_count(&parent), 0);

    state.reveal(&parent, 10);
    assert_eq!(state.visible_count(&parent), 3);
  }

  #[test]
  fn test_local_reply_forces_visibility() {
    let parent: CommentId = "c1".into();
    let mut state = RevealState::new();

    // Collapsed thread: the new reply alone becomes visible
    state.note_local_reply(&parent);
    assert_eq!(state.visible_count(&parent), 1);

    // Expanded thread: the window grows to keep the new reply in view
    state.reveal(&parent, 10);
    let before = state.visible_count(&parent);
    state.note_local_reply(&parent);
    assert_eq!(state.visible_count(&parent), before + 1);
  }
}

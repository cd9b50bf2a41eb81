//! Per-post engagement controller.
//!
//! Owns one mounted feed item's view state: the hydration state machine,
//! the thread index with its disclosure counters, per-node like marks, and
//! the composer. Mutations apply to local state synchronously; the matching
//! gateway call is spawned and its completion is applied by [`poll`], so
//! nothing on the rendering path ever awaits.
//!
//! Comment and reply like counts trust the optimistic delta after a
//! successful toggle; only the post's own count is re-fetched. Whether that
//! asymmetry is worth a round trip per node is a product question, so the
//! behavior is kept as-is.
//!
//! [`poll`]: PostEngagementController::poll

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use futures::join;

use super::gateway::EngagementGateway;
use super::moderation::{self, ModerationContext, ParentRef, SubmissionKind, Verdict, VisibleComment};
use super::reveal::{self, RevealState};
use super::store::EngagementStore;
use super::thread::ThreadIndex;
use super::types::{CommentId, CommentNode, LikeTarget, PostId, PostMeta, SeenTarget};

/// How long a rejection reason occupies the composer before the draft text
/// comes back.
pub const REJECTION_HOLD: Duration = Duration::from_millis(2500);

/// Hydration state of a mounted post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// Mounted, nothing requested yet.
  Loading,
  /// Phase 1 (post row, post like state, thread) and phase 2 (batched
  /// like marks for every discovered node) in flight.
  Hydrating,
  /// Everything resolved; no node renders with indeterminate like state.
  Ready,
}

/// Like state of one target as the view shows it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikeMark {
  pub liked: bool,
  pub count: i64,
}

/// The comment composer, shared by comment and reply submission.
#[derive(Debug, Default)]
pub struct Composer {
  text: String,
  locked: bool,
}

impl Composer {
  pub fn text(&self) -> &str {
    &self.text
  }

  /// Locked while a rejection reason is being flashed; input is ignored.
  pub fn is_locked(&self) -> bool {
    self.locked
  }
}

/// Everything a feed item binds to.
#[derive(Debug, Default)]
pub struct PostViewState {
  pub phase: Phase,
  pub meta: Option<PostMeta>,
  pub post_like: LikeMark,
  pub comment_count: i64,
  pub thread: ThreadIndex,
  pub reveal: RevealState,
  pub marks: HashMap<CommentId, LikeMark>,
  pub hydrate_error: Option<String>,
}

impl Default for Phase {
  fn default() -> Self {
    Phase::Loading
  }
}

struct Phase1 {
  meta: PostMeta,
  liked: bool,
  like_count: i64,
  thread: ThreadIndex,
}

struct Hydration {
  counts: HashMap<String, i64>,
  liked: HashSet<String>,
}

/// Exact pre-mutation snapshot to restore when a spawned call fails.
enum Undo {
  PostLike { liked: bool, count: i64 },
  NodeLike { id: CommentId, liked: bool, count: i64 },
  ReloadThread,
}

/// What a successful mutation carries back.
enum Settled {
  Done,
  /// Authoritative post like-count from the post-success re-fetch.
  PostLikeCount(i64),
}

enum Event {
  Phase1Loaded(Result<Phase1, String>),
  Hydrated(Result<Hydration, String>),
  MutationSettled {
    undo: Undo,
    result: Result<Settled, String>,
  },
  SubmissionSettled(Result<CommentNode, String>),
  RejectionElapsed { original: String },
  ThreadReloaded(Result<ThreadIndex, String>),
}

pub struct PostEngagementController<S: EngagementStore + 'static> {
  post_id: PostId,
  gateway: EngagementGateway<S>,
  state: PostViewState,
  composer: Composer,
  reply_to: Option<CommentId>,
  highlight: Option<CommentId>,
  submitting: bool,
  rejection_hold: Duration,
  disposed: bool,
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl<S: EngagementStore + 'static> PostEngagementController<S> {
  pub fn new(gateway: EngagementGateway<S>, post_id: PostId) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      post_id,
      gateway,
      state: PostViewState::default(),
      composer: Composer::default(),
      reply_to: None,
      highlight: None,
      submitting: false,
      rejection_hold: REJECTION_HOLD,
      disposed: false,
      tx,
      rx,
    }
  }

  /// Shorten or lengthen the rejection flash.
  pub fn with_rejection_hold(mut self, hold: Duration) -> Self {
    self.rejection_hold = hold;
    self
  }

  pub fn state(&self) -> &PostViewState {
    &self.state
  }

  pub fn composer(&self) -> &Composer {
    &self.composer
  }

  pub fn replying_to(&self) -> Option<&CommentId> {
    self.reply_to.as_ref()
  }

  pub fn is_submitting(&self) -> bool {
    self.submitting
  }

  /// The element to scroll to and highlight, if a submission just landed.
  /// One-shot: taking it clears it.
  pub fn take_highlight(&mut self) -> Option<CommentId> {
    self.highlight.take()
  }

  /// Kick off hydration. The post's identity is already known, so the state
  /// machine moves to Hydrating immediately and both phases resolve through
  /// [`poll`](Self::poll).
  pub fn mount(&mut self) {
    if self.state.phase != Phase::Loading {
      return;
    }
    self.state.phase = Phase::Hydrating;

    // Best-effort view tracking; outcome is irrelevant to the view
    let gw = self.gateway.clone();
    let post_id = self.post_id.clone();
    tokio::spawn(async move {
      if let Err(e) = gw.mark_seen(SeenTarget::Post, &post_id).await {
        debug!(post_id = %post_id, error = %e, "view tracking failed");
      }
    });

    let gw = self.gateway.clone();
    let post_id = self.post_id.clone();
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let (meta, liked, like_count, thread) = join!(
        gw.fetch_post(&post_id),
        gw.is_liked(LikeTarget::Post, &post_id),
        gw.count(LikeTarget::Post, &post_id),
        gw.fetch_thread(&post_id),
      );
      let result = (|| {
        Ok(Phase1 {
          meta: meta.map_err(|e| e.to_string())?,
          liked: liked.map_err(|e| e.to_string())?,
          like_count: like_count.map_err(|e| e.to_string())?,
          thread: thread.map_err(|e| e.to_string())?,
        })
      })();
      let _ = tx.send(Event::Phase1Loaded(result));
    });
  }

  /// Tear down. Completions still in flight become no-ops.
  pub fn dispose(&mut self) {
    self.disposed = true;
    self.rx.close();
  }

  /// Drain completed background work into the view state. Returns whether
  /// anything changed, so the consumer knows to re-render.
  pub fn poll(&mut self) -> bool {
    if self.disposed {
      return false;
    }
    let mut changed = false;
    while let Ok(event) = self.rx.try_recv() {
      self.handle(event);
      changed = true;
    }
    changed
  }

  // ==========================================================================
  // User actions
  // ==========================================================================

  /// Optimistically flip the post's like state.
  pub fn toggle_post_like(&mut self) {
    if self.gateway.actor().is_none() {
      debug!("ignoring like without a session");
      return;
    }
    if self.state.meta.is_none() {
      return;
    }

    let prior = self.state.post_like;
    let next_liked = !prior.liked;
    self.state.post_like = LikeMark {
      liked: next_liked,
      count: prior.count + if next_liked { 1 } else { -1 },
    };

    let gw = self.gateway.clone();
    let post_id = self.post_id.clone();
    self.run_optimistic(
      Undo::PostLike {
        liked: prior.liked,
        count: prior.count,
      },
      async move {
        gw.toggle_like(LikeTarget::Post, &post_id, next_liked)
          .await
          .map_err(|e| e.to_string())?;
        // Post likes reconcile against the backend; node likes do not
        let count = gw
          .count(LikeTarget::Post, &post_id)
          .await
          .map_err(|e| e.to_string())?;
        Ok(Settled::PostLikeCount(count))
      },
    );
  }

  /// Optimistically flip a comment's or reply's like state.
  pub fn toggle_node_like(&mut self, id: &CommentId) {
    if self.gateway.actor().is_none() {
      debug!("ignoring like without a session");
      return;
    }
    let target = match self.state.thread.target_kind(id) {
      Some(t) => t,
      None => return,
    };

    let prior = self.state.marks.get(id).copied().unwrap_or_default();
    let next_liked = !prior.liked;
    self.state.marks.insert(
      id.clone(),
      LikeMark {
        liked: next_liked,
        count: prior.count + if next_liked { 1 } else { -1 },
      },
    );

    let gw = self.gateway.clone();
    let node_id = id.clone();
    self.run_optimistic(
      Undo::NodeLike {
        id: id.clone(),
        liked: prior.liked,
        count: prior.count,
      },
      async move {
        gw.toggle_like(target, &node_id, next_liked)
          .await
          .map_err(|e| e.to_string())?;
        Ok(Settled::Done)
      },
    );
  }

  /// Expand the reply window under a root comment.
  pub fn reveal_replies(&mut self, parent_id: &CommentId) {
    let total = self.state.thread.replies_for(parent_id).len();
    self.state.reveal.reveal(parent_id, total);
  }

  pub fn hide_replies(&mut self, parent_id: &CommentId) {
    self.state.reveal.hide(parent_id);
  }

  /// The currently visible slice of a reply bucket.
  pub fn visible_replies(&self, parent_id: &CommentId) -> &[CommentNode] {
    reveal::visible_replies(&self.state.thread, &self.state.reveal, parent_id)
  }

  /// Aim the composer at a root comment. Aiming at a reply retargets its
  /// root, since nesting stops at one level.
  pub fn begin_reply(&mut self, id: &CommentId) {
    let parent = match self.state.thread.node(id) {
      Some(node) => node.parent_id.clone().unwrap_or_else(|| node.id.clone()),
      None => return,
    };
    self.reply_to = Some(parent);
  }

  pub fn cancel_reply(&mut self) {
    self.reply_to = None;
  }

  /// Update the composer draft. Ignored while a rejection is flashing.
  pub fn set_composer_text(&mut self, text: &str) {
    if self.composer.locked {
      return;
    }
    self.composer.text = text.to_string();
  }

  /// Submit the composer as a comment, or as a reply when a reply target is
  /// set. Empty input is a silent no-op; rejected input flashes the reason
  /// and restores the draft.
  pub fn submit(&mut self) {
    if self.submitting || self.composer.locked {
      return;
    }
    let raw = self.composer.text.clone();
    if raw.trim().is_empty() {
      return;
    }
    let actor = match self.gateway.actor() {
      Some(a) => a,
      None => {
        debug!("ignoring submission without a session");
        return;
      }
    };
    let post_author = match &self.state.meta {
      Some(m) => m.author_username.clone(),
      None => return,
    };

    // A reply target whose root vanished under us aborts the submission
    let parent_node = match self.reply_to.clone() {
      Some(id) => match self.state.thread.node(&id) {
        Some(node) => Some(node.clone()),
        None => {
          self.reply_to = None;
          return;
        }
      },
      None => None,
    };

    let verdict = {
      let existing: Vec<VisibleComment> = self
        .state
        .thread
        .roots
        .iter()
        .chain(self.state.thread.replies_by_parent.values().flatten())
        .map(|c| VisibleComment {
          id: &c.id,
          author_id: &c.author_id,
          author_username: &c.author_username,
          text: &c.text,
          created_at: c.created_at,
        })
        .collect();
      let parent = parent_node.as_ref().map(|p| ParentRef {
        id: &p.id,
        author_username: &p.author_username,
      });
      let ctx = ModerationContext {
        post_id: &self.post_id,
        post_author: &post_author,
        kind: if parent.is_some() {
          SubmissionKind::Reply
        } else {
          SubmissionKind::Comment
        },
        parent,
        author_id: &actor,
        existing: &existing,
        now: chrono::Utc::now(),
      };
      moderation::validate(&raw, &ctx)
    };

    match verdict {
      Verdict::Rejected(reason) => {
        // Flash the reason where the draft was, then bring the draft back
        self.composer.text = reason;
        self.composer.locked = true;
        let tx = self.tx.clone();
        let hold = self.rejection_hold;
        tokio::spawn(async move {
          tokio::time::sleep(hold).await;
          let _ = tx.send(Event::RejectionElapsed { original: raw });
        });
      }
      Verdict::Accepted(clean) => {
        self.submitting = true;
        let gw = self.gateway.clone();
        let post_id = self.post_id.clone();
        let parent_id = parent_node.map(|p| p.id);
        let tx = self.tx.clone();
        tokio::spawn(async move {
          let result = match parent_id {
            Some(parent) => gw.add_reply(&parent, &clean).await,
            None => gw.add_comment(&post_id, &clean).await,
          };
          let _ = tx.send(Event::SubmissionSettled(result.map_err(|e| e.to_string())));
        });
      }
    }
  }

  /// Remove a comment locally and delete it remotely. A failed delete
  /// forces a full thread reload instead of patching the removed state
  /// back in.
  pub fn delete_comment(&mut self, id: &CommentId) {
    if self.gateway.actor().is_none() {
      return;
    }

    let reply_ids: Vec<CommentId> = self
      .state
      .thread
      .replies_for(id)
      .iter()
      .map(|r| r.id.clone())
      .collect();

    let removed = if let Some(reply_count) = self.state.thread.remove_root(id) {
      for reply_id in &reply_ids {
        self.state.marks.remove(reply_id);
      }
      1 + reply_count as i64
    } else if self.state.thread.remove_reply(id) {
      1
    } else {
      return;
    };

    self.state.marks.remove(id);
    self.state.comment_count -= removed;

    let gw = self.gateway.clone();
    let node_id = id.clone();
    self.run_optimistic(Undo::ReloadThread, async move {
      gw.delete_comment(&node_id)
        .await
        .map_err(|e| e.to_string())?;
      Ok(Settled::Done)
    });
  }

  // ==========================================================================
  // Background completion handling
  // ==========================================================================

  /// Spawn a mutation's backend call, carrying the snapshot needed to
  /// revert it. Every optimistic action funnels through here so failure
  /// handling stays uniform.
  fn run_optimistic<F>(&self, undo: Undo, op: F)
  where
    F: Future<Output = Result<Settled, String>> + Send + 'static,
  {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let result = op.await;
      let _ = tx.send(Event::MutationSettled { undo, result });
    });
  }

  fn spawn_hydration(&self) {
    let (comment_ids, reply_ids) = self.state.thread.ids_by_kind();
    let gw = self.gateway.clone();
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let (comment_counts, reply_counts, comments_liked, replies_liked) = join!(
        gw.count_multiple(LikeTarget::Comment, &comment_ids),
        gw.count_multiple(LikeTarget::Reply, &reply_ids),
        gw.check_multiple_liked(LikeTarget::Comment, &comment_ids),
        gw.check_multiple_liked(LikeTarget::Reply, &reply_ids),
      );
      let result = (|| {
        let mut counts = comment_counts.map_err(|e| e.to_string())?;
        counts.extend(reply_counts.map_err(|e| e.to_string())?);
        let mut liked = comments_liked.map_err(|e| e.to_string())?;
        liked.extend(replies_liked.map_err(|e| e.to_string())?);
        Ok(Hydration { counts, liked })
      })();
      let _ = tx.send(Event::Hydrated(result));
    });
  }

  fn handle(&mut self, event: Event) {
    match event {
      Event::Phase1Loaded(Ok(p)) => {
        self.state.comment_count = p.meta.comment_count;
        self.state.meta = Some(p.meta);
        self.state.post_like = LikeMark {
          liked: p.liked,
          count: p.like_count,
        };
        self.state.thread = p.thread;
        self.state.reveal = RevealState::new();
        self.state.hydrate_error = None;
        // Phase 2 needs the id set phase 1 just produced
        self.spawn_hydration();
      }
      Event::Phase1Loaded(Err(e)) => {
        warn!(post_id = %self.post_id, error = %e, "post hydration failed");
        self.state.hydrate_error = Some(e);
      }
      Event::Hydrated(Ok(h)) => {
        let (comment_ids, reply_ids) = self.state.thread.ids_by_kind();
        for id in comment_ids.into_iter().chain(reply_ids) {
          let mark = LikeMark {
            liked: h.liked.contains(&id),
            count: h.counts.get(&id).copied().unwrap_or(0),
          };
          self.state.marks.insert(id, mark);
        }
        self.state.phase = Phase::Ready;
      }
      Event::Hydrated(Err(e)) => {
        warn!(post_id = %self.post_id, error = %e, "like hydration failed");
        self.state.hydrate_error = Some(e);
      }
      Event::MutationSettled { result: Ok(settled), .. } => {
        if let Settled::PostLikeCount(count) = settled {
          self.state.post_like.count = count;
        }
      }
      Event::MutationSettled {
        undo,
        result: Err(e),
      } => {
        warn!(post_id = %self.post_id, error = %e, "mutation failed, reverting");
        self.apply_undo(undo);
      }
      Event::SubmissionSettled(Ok(node)) => {
        self.submitting = false;
        self.state.comment_count += 1;
        self.state.marks.insert(node.id.clone(), LikeMark::default());
        self.highlight = Some(node.id.clone());
        match node.parent_id.clone() {
          Some(parent) => {
            self.state.thread.prepend_reply(&parent, node);
            self.state.reveal.note_local_reply(&parent);
          }
          None => self.state.thread.prepend_root(node),
        }
        self.reply_to = None;
        self.composer.text.clear();
      }
      Event::SubmissionSettled(Err(e)) => {
        warn!(post_id = %self.post_id, error = %e, "submission failed");
        self.submitting = false;
      }
      Event::RejectionElapsed { original } => {
        self.composer.locked = false;
        self.composer.text = original;
      }
      Event::ThreadReloaded(Ok(index)) => {
        self.state.comment_count = index.len() as i64;
        self.state.thread = index;
        // The one sanctioned collapse: a forced full reload
        self.state.reveal.reset();
        self.spawn_hydration();
      }
      Event::ThreadReloaded(Err(e)) => {
        warn!(post_id = %self.post_id, error = %e, "thread reload failed");
      }
    }
  }

  fn apply_undo(&mut self, undo: Undo) {
    match undo {
      Undo::PostLike { liked, count } => {
        self.state.post_like = LikeMark { liked, count };
      }
      Undo::NodeLike { id, liked, count } => {
        self.state.marks.insert(id, LikeMark { liked, count });
      }
      Undo::ReloadThread => {
        let gw = self.gateway.clone();
        let post_id = self.post_id.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
          let result = gw
            .fetch_thread(&post_id)
            .await
            .map_err(|e| e.to_string());
          let _ = tx.send(Event::ThreadReloaded(result));
        });
      }
    }
  }
}

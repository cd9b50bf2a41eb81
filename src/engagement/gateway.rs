//! Façade over the engagement backend: idempotent like toggling, batched
//! hydration reads, thread fetch, and best-effort view tracking.

use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::auth::AuthContext;

use super::store::{EngagementStore, StoreError};
use super::thread::{self, ThreadIndex};
use super::types::{CommentId, CommentNode, LikeTarget, PostId, PostMeta, SeenTarget, UserId};

/// Gateway to the like/comment/view persistence backend.
///
/// Reads degrade gracefully without a signed-in actor (`is_liked` is false,
/// membership checks are empty); writes abort before reaching the backend.
pub struct EngagementGateway<S> {
  store: Arc<S>,
  auth: Arc<dyn AuthContext>,
}

impl<S> Clone for EngagementGateway<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      auth: Arc::clone(&self.auth),
    }
  }
}

impl<S: EngagementStore> EngagementGateway<S> {
  pub fn new(store: S, auth: Arc<dyn AuthContext>) -> Self {
    Self::from_shared(Arc::new(store), auth)
  }

  /// Build over a backend handle the caller keeps sharing.
  pub fn from_shared(store: Arc<S>, auth: Arc<dyn AuthContext>) -> Self {
    Self { store, auth }
  }

  pub fn actor(&self) -> Option<UserId> {
    self.auth.current_user_id()
  }

  fn require_actor(&self) -> Result<UserId> {
    self
      .actor()
      .ok_or_else(|| eyre!("Not signed in"))
  }

  /// Set or clear a like. Enabling a like that already exists and disabling
  /// one that does not are both treated as success.
  pub async fn toggle_like(&self, target: LikeTarget, id: &str, liked: bool) -> Result<()> {
    let actor = self.require_actor()?;

    let result = if liked {
      self.store.insert_like(&actor, target, id).await
    } else {
      self.store.delete_like(&actor, target, id).await
    };

    match result {
      Ok(()) => Ok(()),
      Err(StoreError::Conflict(_)) if liked => {
        debug!(id, "like already present, treating as success");
        Ok(())
      }
      Err(StoreError::NotFound(_)) if !liked => {
        debug!(id, "like already absent, treating as success");
        Ok(())
      }
      Err(e) => Err(eyre!("Failed to toggle like on {}: {}", id, e)),
    }
  }

  /// Whether the current actor likes the target; `false` when signed out.
  pub async fn is_liked(&self, target: LikeTarget, id: &str) -> Result<bool> {
    let actor = match self.actor() {
      Some(a) => a,
      None => return Ok(false),
    };
    self
      .store
      .has_liked(&actor, target, id)
      .await
      .map_err(|e| eyre!("Failed to check like on {}: {}", id, e))
  }

  pub async fn count(&self, target: LikeTarget, id: &str) -> Result<i64> {
    self
      .store
      .count_likes(target, id)
      .await
      .map_err(|e| eyre!("Failed to count likes on {}: {}", id, e))
  }

  /// Like counts for a whole id set in one round trip.
  pub async fn count_multiple(
    &self,
    target: LikeTarget,
    ids: &[String],
  ) -> Result<HashMap<String, i64>> {
    if ids.is_empty() {
      return Ok(HashMap::new());
    }
    self
      .store
      .count_likes_many(target, ids)
      .await
      .map_err(|e| eyre!("Failed to batch-count likes: {}", e))
  }

  /// Which of `ids` the current actor likes, in one round trip; empty when
  /// signed out.
  pub async fn check_multiple_liked(
    &self,
    target: LikeTarget,
    ids: &[String],
  ) -> Result<HashSet<String>> {
    let actor = match self.actor() {
      Some(a) => a,
      None => return Ok(HashSet::new()),
    };
    if ids.is_empty() {
      return Ok(HashSet::new());
    }
    self
      .store
      .liked_among(&actor, target, ids)
      .await
      .map_err(|e| eyre!("Failed to batch-check likes: {}", e))
  }

  pub async fn fetch_post(&self, post_id: &PostId) -> Result<PostMeta> {
    self
      .store
      .fetch_post(post_id)
      .await
      .map_err(|e| eyre!("Failed to fetch post {}: {}", post_id, e))
  }

  /// The full two-level thread of a post, assembled in one fetch.
  pub async fn fetch_thread(&self, post_id: &PostId) -> Result<ThreadIndex> {
    let rows = self
      .store
      .fetch_comments(post_id)
      .await
      .map_err(|e| eyre!("Failed to fetch thread of {}: {}", post_id, e))?;
    Ok(thread::assemble(rows))
  }

  pub async fn add_comment(&self, post_id: &PostId, text: &str) -> Result<CommentNode> {
    let actor = self.require_actor()?;
    self
      .store
      .insert_comment(&actor, post_id, text)
      .await
      .map_err(|e| eyre!("Failed to add comment: {}", e))
  }

  pub async fn add_reply(&self, parent_id: &CommentId, text: &str) -> Result<CommentNode> {
    let actor = self.require_actor()?;
    self
      .store
      .insert_reply(&actor, parent_id, text)
      .await
      .map_err(|e| eyre!("Failed to add reply: {}", e))
  }

  pub async fn delete_comment(&self, id: &CommentId) -> Result<()> {
    let actor = self.require_actor()?;
    self
      .store
      .delete_comment(&actor, id)
      .await
      .map_err(|e| eyre!("Failed to delete comment {}: {}", id, e))
  }

  /// Record that the actor viewed the target. Best-effort: a missing
  /// session skips the call, and a policy rejection (own content, blocked
  /// content) is swallowed — view tracking must never surface an error.
  pub async fn mark_seen(&self, target: SeenTarget, id: &str) -> Result<()> {
    let actor = match self.actor() {
      Some(a) => a,
      None => return Ok(()),
    };

    match self.store.upsert_seen(&actor, target, id).await {
      Ok(()) => Ok(()),
      Err(StoreError::Denied(reason)) => {
        debug!(id, reason = %reason, "view tracking rejected by policy, ignoring");
        Ok(())
      }
      Err(StoreError::NotAuthenticated) => Ok(()),
      Err(e) => Err(eyre!("Failed to record view of {}: {}", id, e)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::auth::StaticAuth;
  use crate::engagement::store::MemoryStore;

  async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.register_user("u1", "ana", None).await;
    store.register_user("u2", "ben", Some("ben.png")).await;
    store
      .seed_post(PostMeta {
        id: "p1".into(),
        author_id: "u1".into(),
        author_username: "ana".into(),
        media_id: "tt0113277".into(),
        rating: 8.3,
        tags: vec![],
        comment_count: 0,
      })
      .await;
    store
  }

  fn signed_in(store: MemoryStore, user: &str) -> EngagementGateway<MemoryStore> {
    EngagementGateway::new(store, Arc::new(StaticAuth::signed_in(user)))
  }

  #[tokio::test]
  async fn test_toggle_like_is_idempotent_both_ways() {
    let gateway = signed_in(seeded_store().await, "u2");

    gateway.toggle_like(LikeTarget::Post, "p1", true).await.unwrap();
    // Enabling twice hits the duplicate-key conflict, still success
    gateway.toggle_like(LikeTarget::Post, "p1", true).await.unwrap();
    assert_eq!(gateway.count(LikeTarget::Post, "p1").await.unwrap(), 1);

    gateway.toggle_like(LikeTarget::Post, "p1", false).await.unwrap();
    // Disabling twice finds no row, still success
    gateway.toggle_like(LikeTarget::Post, "p1", false).await.unwrap();
    assert_eq!(gateway.count(LikeTarget::Post, "p1").await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_signed_out_reads_degrade_and_writes_abort() {
    let store = seeded_store().await;
    let gateway = EngagementGateway::new(store, Arc::new(StaticAuth::anonymous()));

    assert!(!gateway.is_liked(LikeTarget::Post, "p1").await.unwrap());
    assert!(gateway
      .check_multiple_liked(LikeTarget::Comment, &["c1".into()])
      .await
      .unwrap()
      .is_empty());

    // Writes abort before any backend call
    assert!(gateway.toggle_like(LikeTarget::Post, "p1", true).await.is_err());
    assert!(gateway.add_comment(&"p1".into(), "hi").await.is_err());

    // View tracking is skipped silently instead
    gateway.mark_seen(SeenTarget::Post, "p1").await.unwrap();
  }

  #[tokio::test]
  async fn test_mark_seen_swallows_policy_rejection() {
    // u1 viewing their own post is denied by the backend, not by us
    let gateway = signed_in(seeded_store().await, "u1");
    gateway.mark_seen(SeenTarget::Post, "p1").await.unwrap();
    gateway.mark_seen(SeenTarget::Profile, "u1").await.unwrap();
  }

  #[tokio::test]
  async fn test_fetch_thread_assembles_two_levels() {
    let store = seeded_store().await;
    let c1 = store
      .insert_comment(&"u2".into(), &"p1".into(), "first")
      .await
      .unwrap();
    store
      .insert_reply(&"u1".into(), &c1.id, "thanks!")
      .await
      .unwrap();

    let gateway = signed_in(store, "u2");
    let index = gateway.fetch_thread(&"p1".into()).await.unwrap();

    assert_eq!(index.roots.len(), 1);
    assert_eq!(index.replies_for(&c1.id).len(), 1);
    assert_eq!(index.reply_to_author[&"c2".to_string()], "ben");
  }

  #[tokio::test]
  async fn test_add_reply_resolves_post_from_parent() {
    let store = seeded_store().await;
    let gateway = signed_in(store, "u2");

    let root = gateway.add_comment(&"p1".into(), "root").await.unwrap();
    let reply = gateway.add_reply(&root.id, "reply").await.unwrap();

    assert_eq!(reply.post_id, "p1");
    assert_eq!(reply.parent_id.as_deref(), Some(root.id.as_str()));
    assert_eq!(reply.author_username, "ben");
  }
}

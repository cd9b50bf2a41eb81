//! Backend seam for engagement persistence, plus the in-memory reference
//! implementation used by tests and local development.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

use super::types::{CommentId, CommentNode, LikeTarget, PostId, PostMeta, SeenTarget, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("not authenticated")]
  NotAuthenticated,
  #[error("not found: {0}")]
  NotFound(String),
  #[error("conflict: {0}")]
  Conflict(String),
  #[error("denied: {0}")]
  Denied(String),
  #[error("backend: {0}")]
  Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Raw persistence operations behind the engagement gateway. Implementations
/// report duplicate like rows as [`StoreError::Conflict`] and missing rows as
/// [`StoreError::NotFound`]; the gateway decides which of those are benign.
#[async_trait]
pub trait EngagementStore: Send + Sync {
  async fn insert_like(&self, actor: &UserId, target: LikeTarget, id: &str) -> StoreResult<()>;
  async fn delete_like(&self, actor: &UserId, target: LikeTarget, id: &str) -> StoreResult<()>;
  async fn has_liked(&self, actor: &UserId, target: LikeTarget, id: &str) -> StoreResult<bool>;
  async fn count_likes(&self, target: LikeTarget, id: &str) -> StoreResult<i64>;
  async fn count_likes_many(
    &self,
    target: LikeTarget,
    ids: &[String],
  ) -> StoreResult<HashMap<String, i64>>;
  async fn liked_among(
    &self,
    actor: &UserId,
    target: LikeTarget,
    ids: &[String],
  ) -> StoreResult<HashSet<String>>;

  async fn fetch_post(&self, post_id: &PostId) -> StoreResult<PostMeta>;

  /// All comment rows of a post, oldest first.
  async fn fetch_comments(&self, post_id: &PostId) -> StoreResult<Vec<CommentNode>>;
  async fn insert_comment(
    &self,
    actor: &UserId,
    post_id: &PostId,
    text: &str,
  ) -> StoreResult<CommentNode>;

  /// Insert a reply under a root comment; the post is resolved from the
  /// parent row.
  async fn insert_reply(
    &self,
    actor: &UserId,
    parent_id: &CommentId,
    text: &str,
  ) -> StoreResult<CommentNode>;
  async fn delete_comment(&self, actor: &UserId, id: &CommentId) -> StoreResult<()>;

  async fn upsert_seen(&self, actor: &UserId, target: SeenTarget, id: &str) -> StoreResult<()>;
}

#[derive(Debug, Clone)]
struct UserRow {
  username: String,
  avatar: Option<String>,
}

fn push_comment(
  inner: &mut Inner,
  actor: &UserId,
  post_id: PostId,
  parent_id: Option<CommentId>,
  text: &str,
) -> StoreResult<CommentNode> {
  let user = inner
    .users
    .get(actor)
    .cloned()
    .ok_or_else(|| StoreError::NotFound(format!("user {}", actor)))?;

  inner.next_comment_id += 1;
  let node = CommentNode {
    id: format!("c{}", inner.next_comment_id),
    post_id,
    author_id: actor.clone(),
    parent_id,
    text: text.to_string(),
    like_count: 0,
    created_at: Utc::now(),
    author_username: user.username,
    author_avatar: user.avatar,
  };
  inner.comments.push(node.clone());
  Ok(node)
}

#[derive(Default)]
struct Inner {
  users: HashMap<UserId, UserRow>,
  posts: HashMap<PostId, PostMeta>,
  comments: Vec<CommentNode>,
  likes: HashSet<(LikeTarget, String, UserId)>,
  seen: HashSet<(SeenTarget, String, UserId)>,
  next_comment_id: u64,
}

/// In-memory engagement backend.
///
/// State is lost on drop; consistency is single-process under one
/// `RwLock`. `set_failing` makes every subsequent operation fail, which is
/// how the controller tests exercise the rollback paths.
#[derive(Default)]
pub struct MemoryStore {
  inner: RwLock<Inner>,
  fail_all: AtomicBool,
  fail_once: AtomicBool,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn register_user(&self, id: impl Into<UserId>, username: &str, avatar: Option<&str>) {
    let mut inner = self.inner.write().await;
    inner.users.insert(
      id.into(),
      UserRow {
        username: username.to_string(),
        avatar: avatar.map(String::from),
      },
    );
  }

  pub async fn seed_post(&self, meta: PostMeta) {
    let mut inner = self.inner.write().await;
    inner.posts.insert(meta.id.clone(), meta);
  }

  /// Make every subsequent operation fail with a backend error.
  pub fn set_failing(&self, failing: bool) {
    self.fail_all.store(failing, Ordering::SeqCst);
  }

  /// Make only the next operation fail.
  pub fn set_fail_once(&self) {
    self.fail_once.store(true, Ordering::SeqCst);
  }

  fn guard(&self) -> StoreResult<()> {
    if self.fail_all.load(Ordering::SeqCst) || self.fail_once.swap(false, Ordering::SeqCst) {
      return Err(StoreError::Backend("injected failure".into()));
    }
    Ok(())
  }
}

#[async_trait]
impl EngagementStore for MemoryStore {
  async fn insert_like(&self, actor: &UserId, target: LikeTarget, id: &str) -> StoreResult<()> {
    self.guard()?;
    let mut inner = self.inner.write().await;
    let row = (target, id.to_string(), actor.clone());
    if !inner.likes.insert(row) {
      return Err(StoreError::Conflict(format!("like exists on {}", id)));
    }
    Ok(())
  }

  async fn delete_like(&self, actor: &UserId, target: LikeTarget, id: &str) -> StoreResult<()> {
    self.guard()?;
    let mut inner = self.inner.write().await;
    let row = (target, id.to_string(), actor.clone());
    if !inner.likes.remove(&row) {
      return Err(StoreError::NotFound(format!("no like on {}", id)));
    }
    Ok(())
  }

  async fn has_liked(&self, actor: &UserId, target: LikeTarget, id: &str) -> StoreResult<bool> {
    self.guard()?;
    let inner = self.inner.read().await;
    Ok(inner.likes.contains(&(target, id.to_string(), actor.clone())))
  }

  async fn count_likes(&self, target: LikeTarget, id: &str) -> StoreResult<i64> {
    self.guard()?;
    let inner = self.inner.read().await;
    Ok(
      inner
        .likes
        .iter()
        .filter(|(t, i, _)| *t == target && i == id)
        .count() as i64,
    )
  }

  async fn count_likes_many(
    &self,
    target: LikeTarget,
    ids: &[String],
  ) -> StoreResult<HashMap<String, i64>> {
    self.guard()?;
    let inner = self.inner.read().await;
    let mut counts: HashMap<String, i64> = ids.iter().map(|id| (id.clone(), 0)).collect();
    for (t, id, _) in inner.likes.iter() {
      if *t == target {
        if let Some(n) = counts.get_mut(id) {
          *n += 1;
        }
      }
    }
    Ok(counts)
  }

  async fn liked_among(
    &self,
    actor: &UserId,
    target: LikeTarget,
    ids: &[String],
  ) -> StoreResult<HashSet<String>> {
    self.guard()?;
    let inner = self.inner.read().await;
    Ok(
      ids
        .iter()
        .filter(|id| {
          inner
            .likes
            .contains(&(target, (*id).clone(), actor.clone()))
        })
        .cloned()
        .collect(),
    )
  }

  async fn fetch_post(&self, post_id: &PostId) -> StoreResult<PostMeta> {
    self.guard()?;
    let inner = self.inner.read().await;
    let mut meta = inner
      .posts
      .get(post_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("post {}", post_id)))?;
    meta.comment_count = inner
      .comments
      .iter()
      .filter(|c| &c.post_id == post_id)
      .count() as i64;
    Ok(meta)
  }

  async fn fetch_comments(&self, post_id: &PostId) -> StoreResult<Vec<CommentNode>> {
    self.guard()?;
    let inner = self.inner.read().await;
    Ok(
      inner
        .comments
        .iter()
        .filter(|c| &c.post_id == post_id)
        .cloned()
        .collect(),
    )
  }

  async fn insert_comment(
    &self,
    actor: &UserId,
    post_id: &PostId,
    text: &str,
  ) -> StoreResult<CommentNode> {
    self.guard()?;
    let mut inner = self.inner.write().await;

    if !inner.posts.contains_key(post_id) {
      return Err(StoreError::NotFound(format!("post {}", post_id)));
    }
    let post_id = post_id.clone();
    push_comment(&mut inner, actor, post_id, None, text)
  }

  async fn insert_reply(
    &self,
    actor: &UserId,
    parent_id: &CommentId,
    text: &str,
  ) -> StoreResult<CommentNode> {
    self.guard()?;
    let mut inner = self.inner.write().await;

    let parent_row = inner
      .comments
      .iter()
      .find(|c| &c.id == parent_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("comment {}", parent_id)))?;
    if parent_row.is_reply() {
      return Err(StoreError::Conflict("replies cannot be nested".into()));
    }

    push_comment(
      &mut inner,
      actor,
      parent_row.post_id,
      Some(parent_row.id),
      text,
    )
  }

  async fn delete_comment(&self, actor: &UserId, id: &CommentId) -> StoreResult<()> {
    self.guard()?;
    let mut inner = self.inner.write().await;

    let row = inner
      .comments
      .iter()
      .find(|c| &c.id == id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(format!("comment {}", id)))?;
    if &row.author_id != actor {
      return Err(StoreError::Denied("only the author may delete".into()));
    }

    // A root takes its replies with it
    inner
      .comments
      .retain(|c| &c.id != id && c.parent_id.as_ref() != Some(id));
    Ok(())
  }

  async fn upsert_seen(&self, actor: &UserId, target: SeenTarget, id: &str) -> StoreResult<()> {
    self.guard()?;
    let mut inner = self.inner.write().await;

    // Viewing your own content is rejected by policy, like any other
    // insufficient-privilege write; callers are expected to swallow it.
    if target == SeenTarget::Post {
      if let Some(post) = inner.posts.get(id) {
        if &post.author_id == actor {
          return Err(StoreError::Denied("own content".into()));
        }
      }
    }
    if target == SeenTarget::Profile && id == actor {
      return Err(StoreError::Denied("own profile".into()));
    }

    inner.seen.insert((target, id.to_string(), actor.clone()));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn store_with_post() -> MemoryStore {
    let store = MemoryStore::new();
    store.register_user("u1", "ana", None).await;
    store.register_user("u2", "ben", None).await;
    store
      .seed_post(PostMeta {
        id: "p1".into(),
        author_id: "u1".into(),
        author_username: "ana".into(),
        media_id: "tt0113277".into(),
        rating: 8.3,
        tags: vec!["crime".into()],
        comment_count: 0,
      })
      .await;
    store
  }

  #[tokio::test]
  async fn test_duplicate_like_is_a_conflict() {
    let store = store_with_post().await;
    let actor: UserId = "u2".into();

    store
      .insert_like(&actor, LikeTarget::Post, "p1")
      .await
      .unwrap();
    let err = store
      .insert_like(&actor, LikeTarget::Post, "p1")
      .await
      .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
  }

  #[tokio::test]
  async fn test_nested_reply_is_rejected() {
    let store = store_with_post().await;
    let actor: UserId = "u2".into();

    let root = store
      .insert_comment(&actor, &"p1".into(), "nice pick")
      .await
      .unwrap();
    let reply = store.insert_reply(&actor, &root.id, "agreed").await.unwrap();
    assert_eq!(reply.post_id, "p1");

    let err = store
      .insert_reply(&actor, &reply.id, "nope")
      .await
      .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
  }

  #[tokio::test]
  async fn test_root_delete_cascades_to_replies() {
    let store = store_with_post().await;
    let actor: UserId = "u2".into();

    let root = store
      .insert_comment(&actor, &"p1".into(), "root")
      .await
      .unwrap();
    store.insert_reply(&actor, &root.id, "reply").await.unwrap();

    store.delete_comment(&actor, &root.id).await.unwrap();
    assert!(store.fetch_comments(&"p1".into()).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_seen_on_own_post_is_denied() {
    let store = store_with_post().await;
    let author: UserId = "u1".into();

    let err = store
      .upsert_seen(&author, SeenTarget::Post, "p1")
      .await
      .unwrap_err();
    assert!(matches!(err, StoreError::Denied(_)));

    // Another viewer is fine, and repeat upserts stay fine
    let viewer: UserId = "u2".into();
    store
      .upsert_seen(&viewer, SeenTarget::Post, "p1")
      .await
      .unwrap();
    store
      .upsert_seen(&viewer, SeenTarget::Post, "p1")
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn test_batch_counts_cover_requested_ids() {
    let store = store_with_post().await;
    let a: UserId = "u1".into();
    let b: UserId = "u2".into();

    let c1 = store.insert_comment(&a, &"p1".into(), "one").await.unwrap();
    store
      .insert_like(&a, LikeTarget::Comment, &c1.id)
      .await
      .unwrap();
    store
      .insert_like(&b, LikeTarget::Comment, &c1.id)
      .await
      .unwrap();

    let ids = vec![c1.id.clone(), "missing".to_string()];
    let counts = store
      .count_likes_many(LikeTarget::Comment, &ids)
      .await
      .unwrap();
    assert_eq!(counts[&c1.id], 2);
    assert_eq!(counts["missing"], 0);

    let liked = store
      .liked_among(&a, LikeTarget::Comment, &ids)
      .await
      .unwrap();
    assert!(liked.contains(&c1.id));
    assert!(!liked.contains("missing"));
  }
}

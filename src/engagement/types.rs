//! Data model for posts, comments, and like/seen targets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = String;
pub type PostId = String;
pub type CommentId = String;

/// What a like record attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeTarget {
  Post,
  Comment,
  Reply,
}

/// What a view record attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeenTarget {
  Post,
  Profile,
}

/// One row of a post's thread. A node with a `parent_id` is a reply; the
/// parent is always a root comment (nesting depth is fixed at one level).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentNode {
  pub id: CommentId,
  pub post_id: PostId,
  pub author_id: UserId,
  pub parent_id: Option<CommentId>,
  pub text: String,
  pub like_count: i64,
  pub created_at: DateTime<Utc>,
  pub author_username: String,
  pub author_avatar: Option<String>,
}

impl CommentNode {
  pub fn is_reply(&self) -> bool {
    self.parent_id.is_some()
  }
}

/// The post row a feed item displays: author attribution, the rating being
/// shared, its tags, and the denormalized comment count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMeta {
  pub id: PostId,
  pub author_id: UserId,
  pub author_username: String,
  pub media_id: String,
  pub rating: f64,
  pub tags: Vec<String>,
  pub comment_count: i64,
}

//! Narrow seam to the (external) authentication subsystem.

use crate::engagement::UserId;

/// Provides the identity of the signed-in user, if any.
///
/// Absence degrades gracefully throughout the crate: reads report "not
/// liked", writes abort before any backend call, and view-tracking is
/// skipped. Nothing errors for lack of a session.
pub trait AuthContext: Send + Sync {
  fn current_user_id(&self) -> Option<UserId>;
}

/// Fixed session identity, resolved once at bootstrap by the embedding
/// application.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
  user_id: Option<UserId>,
}

impl StaticAuth {
  pub fn signed_in(user_id: impl Into<UserId>) -> Self {
    Self {
      user_id: Some(user_id.into()),
    }
  }

  pub fn anonymous() -> Self {
    Self { user_id: None }
  }
}

impl AuthContext for StaticAuth {
  fn current_user_id(&self) -> Option<UserId> {
    self.user_id.clone()
  }
}

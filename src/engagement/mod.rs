//! The engagement core: gateway, thread model, moderation, disclosure, and
//! the per-post controller that ties them together.

pub mod controller;
pub mod gateway;
pub mod moderation;
pub mod reveal;
pub mod store;
pub mod thread;
pub mod types;

pub use controller::{Composer, LikeMark, Phase, PostEngagementController, PostViewState};
pub use gateway::EngagementGateway;
pub use store::{EngagementStore, MemoryStore, StoreError, StoreResult};
pub use thread::{assemble, ThreadIndex};
pub use types::{CommentId, CommentNode, LikeTarget, PostId, PostMeta, SeenTarget, UserId};

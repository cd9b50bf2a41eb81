//! Local cache: a single persisted document with independent API-response
//! and rating-draft namespaces, each under its own TTL policy.

mod document;
mod storage;
mod store;

pub use document::{CacheDocument, CacheEntry, CACHE_SCHEMA_VERSION};
pub use storage::{KvStorage, MemoryStorage, SqliteStorage};
pub use store::{CacheStore, CACHE_DOC_KEY, DEFAULT_API_TTL_MS, DEFAULT_DRAFT_TTL_MS};

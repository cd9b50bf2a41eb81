//! The persisted cache document and its entry envelope.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::rating::RatingDraft;

/// Current schema version of the persisted document.
///
/// Any stored document with a different version is discarded wholesale on
/// read; there is no migration path.
pub const CACHE_SCHEMA_VERSION: u32 = 2;

/// A single cached value with its expiry metadata.
///
/// An entry is live iff `now - cached_at_ms <= ttl_ms`. Liveness is a pure
/// function of the three stored fields, so it can be evaluated against any
/// clock reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub data: T,
  #[serde(rename = "cachedAt")]
  pub cached_at_ms: i64,
  #[serde(rename = "timeToLiveMs")]
  pub ttl_ms: i64,
}

impl<T> CacheEntry<T> {
  pub fn new(data: T, now_ms: i64, ttl_ms: i64) -> Self {
    Self {
      data,
      cached_at_ms: now_ms,
      ttl_ms,
    }
  }

  /// Whether the entry is still live at `now_ms`.
  pub fn is_live(&self, now_ms: i64) -> bool {
    now_ms - self.cached_at_ms <= self.ttl_ms
  }
}

/// The whole persisted document: one version tag and two independent
/// namespaces with their own expiry policies.
///
/// `api` holds opaque third-party catalog payloads keyed by external film id;
/// `drafts` holds in-progress rating drafts keyed the same way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDocument {
  pub v: u32,
  #[serde(default)]
  pub api: HashMap<String, CacheEntry<serde_json::Value>>,
  #[serde(default)]
  pub drafts: HashMap<String, CacheEntry<RatingDraft>>,
}

impl Default for CacheDocument {
  fn default() -> Self {
    Self {
      v: CACHE_SCHEMA_VERSION,
      api: HashMap::new(),
      drafts: HashMap::new(),
    }
  }
}

impl CacheDocument {
  /// Whether this document carries the current schema version.
  pub fn is_current(&self) -> bool {
    self.v == CACHE_SCHEMA_VERSION
  }
}

//! Namespace-partitioned TTL cache over the durable storage substrate.

use chrono::Utc;
use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::rating::{RatingDraft, RatingDraftPatch};

use super::document::{CacheDocument, CacheEntry};
use super::storage::KvStorage;

/// Well-known storage key holding the whole cache document.
pub const CACHE_DOC_KEY: &str = "reelfeed.cache";

/// Default TTL for third-party API entries: 2 days.
pub const DEFAULT_API_TTL_MS: i64 = 2 * 24 * 60 * 60 * 1000;

/// Default TTL for rating drafts: 7 days.
pub const DEFAULT_DRAFT_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Local cache store: transient API responses and long-lived rating drafts,
/// each namespace with its own expiry policy.
///
/// Every operation is a whole-document read-modify-write against the
/// storage backend; writes are last-writer-wins at document granularity.
/// Concurrent tabs sharing one backend can therefore lose writes to each
/// other; single-tab clients are unaffected.
///
/// Eviction is entirely access-triggered. Expired entries read as absent;
/// expired drafts are additionally deleted (and the document persisted) on
/// read so stale drafts do not accumulate, while expired API entries are
/// simply overwritten on next use.
pub struct CacheStore<S: KvStorage> {
  storage: Arc<S>,
  api_ttl_ms: i64,
  draft_ttl_ms: i64,
}

impl<S: KvStorage> CacheStore<S> {
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      api_ttl_ms: DEFAULT_API_TTL_MS,
      draft_ttl_ms: DEFAULT_DRAFT_TTL_MS,
    }
  }

  /// Override the default TTLs (milliseconds).
  pub fn with_ttls(mut self, api_ttl_ms: i64, draft_ttl_ms: i64) -> Self {
    self.api_ttl_ms = api_ttl_ms;
    self.draft_ttl_ms = draft_ttl_ms;
    self
  }

  fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
  }

  /// Read and parse the document. A missing document, a parse failure, or a
  /// schema-version mismatch all yield an empty document, never an error.
  fn load(&self) -> Result<CacheDocument> {
    let raw = match self.storage.get(CACHE_DOC_KEY)? {
      Some(value) => value,
      None => return Ok(CacheDocument::default()),
    };

    match serde_json::from_value::<CacheDocument>(raw) {
      Ok(doc) if doc.is_current() => Ok(doc),
      Ok(doc) => {
        debug!(version = doc.v, "discarding cache document with stale schema");
        Ok(CacheDocument::default())
      }
      Err(e) => {
        debug!(error = %e, "discarding unparseable cache document");
        Ok(CacheDocument::default())
      }
    }
  }

  fn persist(&self, doc: &CacheDocument) -> Result<()> {
    let value = serde_json::to_value(doc)?;
    self.storage.set(CACHE_DOC_KEY, &value)
  }

  /// Get a cached API payload. Expired entries behave exactly like misses
  /// and are left in place to be overwritten on next use.
  pub fn get_api<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    let doc = self.load()?;
    let entry = match doc.api.get(key) {
      Some(e) if e.is_live(Self::now_ms()) => e,
      _ => return Ok(None),
    };

    match serde_json::from_value(entry.data.clone()) {
      Ok(data) => Ok(Some(data)),
      Err(e) => {
        debug!(key, error = %e, "cached API payload no longer deserializes, treating as miss");
        Ok(None)
      }
    }
  }

  pub fn set_api<T: Serialize>(&self, key: &str, data: &T) -> Result<()> {
    self.set_api_with_ttl(key, data, self.api_ttl_ms)
  }

  pub fn set_api_with_ttl<T: Serialize>(&self, key: &str, data: &T, ttl_ms: i64) -> Result<()> {
    let mut doc = self.load()?;
    let value = serde_json::to_value(data)?;
    doc
      .api
      .insert(key.to_string(), CacheEntry::new(value, Self::now_ms(), ttl_ms));
    self.persist(&doc)
  }

  /// Get a live draft. An expired draft is deleted and the document
  /// persisted before reporting the miss.
  pub fn get_draft(&self, key: &str) -> Result<Option<RatingDraft>> {
    let mut doc = self.load()?;
    match doc.drafts.get(key) {
      Some(entry) if entry.is_live(Self::now_ms()) => Ok(Some(entry.data.clone())),
      Some(_) => {
        doc.drafts.remove(key);
        self.persist(&doc)?;
        Ok(None)
      }
      None => Ok(None),
    }
  }

  pub fn set_draft(&self, key: &str, draft: &RatingDraft) -> Result<()> {
    self.set_draft_with_ttl(key, draft, self.draft_ttl_ms)
  }

  pub fn set_draft_with_ttl(&self, key: &str, draft: &RatingDraft, ttl_ms: i64) -> Result<()> {
    let mut doc = self.load()?;
    doc.drafts.insert(
      key.to_string(),
      CacheEntry::new(draft.clone(), Self::now_ms(), ttl_ms),
    );
    self.persist(&doc)
  }

  /// Merge `patch` into a live draft and re-store it with a refreshed
  /// timestamp. Returns the merged draft, or `None` without writing anything
  /// when no live draft exists.
  pub fn patch_draft(&self, key: &str, patch: RatingDraftPatch) -> Result<Option<RatingDraft>> {
    let mut doc = self.load()?;
    let entry = match doc.drafts.get_mut(key) {
      Some(e) if e.is_live(Self::now_ms()) => e,
      _ => return Ok(None),
    };

    patch.apply(&mut entry.data);
    entry.cached_at_ms = Self::now_ms();
    let merged = entry.data.clone();
    self.persist(&doc)?;
    Ok(Some(merged))
  }

  pub fn clear_draft(&self, key: &str) -> Result<()> {
    let mut doc = self.load()?;
    doc.drafts.remove(key);
    self.persist(&doc)
  }

  /// Erase the entire document.
  pub fn clear_all(&self) -> Result<()> {
    self.storage.remove(CACHE_DOC_KEY)
  }
}

impl<S: KvStorage> Clone for CacheStore<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      api_ttl_ms: self.api_ttl_ms,
      draft_ttl_ms: self.draft_ttl_ms,
    }
  }
}

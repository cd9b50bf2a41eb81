//! Title resolution for the rating screen: one-shot navigation payload,
//! then the durable cache, then a live fetch.

use async_trait::async_trait;
use color_eyre::Result;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheStore, KvStorage};
use crate::rating::MediaKind;

/// An external-catalog record. Beyond the identity fields the payload is
/// opaque: whatever the provider returned rides along in `extra` and is
/// cached and displayed without interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleRecord {
  pub id: String,
  pub title: String,
  pub kind: MediaKind,
  pub release_date: Option<chrono::NaiveDate>,
  pub poster: Option<String>,
  #[serde(default)]
  pub extra: serde_json::Value,
}

/// Seam to the external film-database clients.
#[async_trait]
pub trait TitleFetcher: Send + Sync {
  async fn fetch_title(&self, id: &str) -> Result<TitleRecord>;
}

/// Resolves a title through the three-tier fallback. Whatever tier supplies
/// the record, it ends up in the cache so the next resolution is local.
pub struct TitleResolver<S: KvStorage, F: TitleFetcher> {
  cache: CacheStore<S>,
  fetcher: F,
}

impl<S: KvStorage, F: TitleFetcher> TitleResolver<S, F> {
  pub fn new(cache: CacheStore<S>, fetcher: F) -> Self {
    Self { cache, fetcher }
  }

  /// Resolve `id`, preferring the one-shot navigation payload, then a live
  /// cache entry, then the network.
  pub async fn resolve(&self, id: &str, nav: Option<TitleRecord>) -> Result<TitleRecord> {
    if let Some(record) = nav {
      self.cache.set_api(id, &record)?;
      return Ok(record);
    }

    if let Some(record) = self.cache.get_api::<TitleRecord>(id)? {
      return Ok(record);
    }

    let record = self.fetcher.fetch_title(id).await?;
    self.cache.set_api(id, &record)?;
    Ok(record)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use color_eyre::eyre::eyre;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct CountingFetcher {
    calls: AtomicUsize,
    fail: bool,
  }

  impl CountingFetcher {
    fn new(fail: bool) -> Self {
      Self {
        calls: AtomicUsize::new(0),
        fail,
      }
    }
  }

  #[async_trait]
  impl TitleFetcher for CountingFetcher {
    async fn fetch_title(&self, id: &str) -> Result<TitleRecord> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.fail {
        return Err(eyre!("provider unavailable"));
      }
      Ok(record(id, "Blade Runner"))
    }
  }

  fn record(id: &str, title: &str) -> TitleRecord {
    TitleRecord {
      id: id.into(),
      title: title.into(),
      kind: MediaKind::Movie,
      release_date: None,
      poster: None,
      extra: serde_json::json!({"providers": ["fake"]}),
    }
  }

  #[tokio::test]
  async fn test_nav_payload_wins_and_is_cached() {
    let resolver = TitleResolver::new(
      CacheStore::new(MemoryStorage::new()),
      CountingFetcher::new(true),
    );

    let handed_over = record("78", "Blade Runner (nav)");
    let got = resolver
      .resolve("78", Some(handed_over.clone()))
      .await
      .unwrap();
    assert_eq!(got, handed_over);
    assert_eq!(resolver.fetcher.calls.load(Ordering::SeqCst), 0);

    // The payload landed in the cache: a later visit without nav state
    // never touches the (failing) network
    let again = resolver.resolve("78", None).await.unwrap();
    assert_eq!(again, handed_over);
    assert_eq!(resolver.fetcher.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_network_is_the_last_resort() {
    let resolver = TitleResolver::new(
      CacheStore::new(MemoryStorage::new()),
      CountingFetcher::new(false),
    );

    let got = resolver.resolve("78", None).await.unwrap();
    assert_eq!(got.title, "Blade Runner");
    assert_eq!(resolver.fetcher.calls.load(Ordering::SeqCst), 1);

    // Second resolution is served from cache
    resolver.resolve("78", None).await.unwrap();
    assert_eq!(resolver.fetcher.calls.load(Ordering::SeqCst), 1);
  }
}

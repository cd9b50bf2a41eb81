use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CacheStore, SqliteStorage, DEFAULT_API_TTL_MS, DEFAULT_DRAFT_TTL_MS};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Where the durable store lives (defaults to the platform data dir)
  pub path: Option<PathBuf>,
  /// How long third-party API entries stay live (e.g. "2days")
  #[serde(default = "default_api_ttl", with = "humantime_serde")]
  pub api_ttl: Duration,
  /// How long rating drafts stay live (e.g. "7days")
  #[serde(default = "default_draft_ttl", with = "humantime_serde")]
  pub draft_ttl: Duration,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      path: None,
      api_ttl: default_api_ttl(),
      draft_ttl: default_draft_ttl(),
    }
  }
}

fn default_api_ttl() -> Duration {
  Duration::from_millis(DEFAULT_API_TTL_MS as u64)
}

fn default_draft_ttl() -> Duration {
  Duration::from_millis(DEFAULT_DRAFT_TTL_MS as u64)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Directory for rotated log files; stderr only when unset
  pub dir: Option<PathBuf>,
  /// Filter directive, e.g. "reelfeed=debug"
  pub filter: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./reelfeed.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/reelfeed/config.yaml
  ///
  /// With no file anywhere, the defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("reelfeed.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("reelfeed").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Open the durable cache store this config describes.
  pub fn open_cache_store(&self) -> Result<CacheStore<SqliteStorage>> {
    let storage = match &self.cache.path {
      Some(path) => SqliteStorage::open_at(path)?,
      None => SqliteStorage::open()?,
    };
    Ok(
      CacheStore::new(storage).with_ttls(
        self.cache.api_ttl.as_millis() as i64,
        self.cache.draft_ttl.as_millis() as i64,
      ),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_match_policy() {
    let config = Config::default();
    assert_eq!(config.cache.api_ttl, Duration::from_millis(DEFAULT_API_TTL_MS as u64));
    assert_eq!(
      config.cache.draft_ttl,
      Duration::from_millis(DEFAULT_DRAFT_TTL_MS as u64)
    );
    assert!(config.cache.path.is_none());
  }

  #[test]
  fn test_parses_human_readable_ttls() {
    let config: Config = serde_yaml::from_str(
      "cache:\n  api_ttl: 12h\n  draft_ttl: 14days\nlog:\n  filter: reelfeed=debug\n",
    )
    .unwrap();

    assert_eq!(config.cache.api_ttl, Duration::from_secs(12 * 60 * 60));
    assert_eq!(config.cache.draft_ttl, Duration::from_secs(14 * 24 * 60 * 60));
    assert_eq!(config.log.filter.as_deref(), Some("reelfeed=debug"));
  }

  #[test]
  fn test_empty_document_uses_defaults() {
    let config: Config = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config.cache.api_ttl, Duration::from_millis(DEFAULT_API_TTL_MS as u64));
    assert!(config.log.dir.is_none());
  }
}

//! Durable key-value storage trait and its SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The storage substrate beneath the cache store: one JSON value per key.
///
/// Implementations must survive application restarts within the same
/// profile; they need not be shared across devices.
pub trait KvStorage: Send + Sync {
  /// Get the value stored under `key`, if any.
  fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &serde_json::Value) -> Result<()>;

  /// Remove the value stored under `key`. Removing a missing key is not an
  /// error.
  fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory storage backend. Used by tests and by embedders that do not
/// want durability.
#[derive(Default)]
pub struct MemoryStorage {
  map: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KvStorage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
    let map = self.map.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(map.get(key).cloned())
  }

  fn set(&self, key: &str, value: &serde_json::Value) -> Result<()> {
    let mut map = self.map.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    map.insert(key.to_string(), value.clone());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut map = self.map.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    map.remove(key);
    Ok(())
  }
}

/// SQLite-backed storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open the storage at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open storage at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("reelfeed").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORAGE_SCHEMA)
      .map_err(|e| eyre!("Failed to run storage migrations: {}", e))?;

    Ok(())
  }
}

const STORAGE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl KvStorage for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read key {}: {}", key, e))?;

    match data {
      Some(bytes) => {
        let value = serde_json::from_slice(&bytes)
          .map_err(|e| eyre!("Failed to parse stored value for {}: {}", key, e))?;
        Ok(Some(value))
      }
      None => Ok(None),
    }
  }

  fn set(&self, key: &str, value: &serde_json::Value) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data = serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize value: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, data],
      )
      .map_err(|e| eyre!("Failed to store key {}: {}", key, e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove key {}: {}", key, e))?;

    Ok(())
  }
}

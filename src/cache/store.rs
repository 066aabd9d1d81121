//! Snapshot stores.
//!
//! A store keeps serialized snapshots under a single key with an expiry.
//! Each store provides atomic get/set for one key; overlapping writers
//! simply overwrite each other.

use crate::error::{UsageError, UsageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;

/// Process-wide key/blob store with per-entry time-to-live.
pub trait SnapshotStore {
    /// Fetch the blob stored under `key`, if present and not expired.
    fn get(&self, key: &str) -> UsageResult<Option<String>>;

    /// Store `blob` under `key` for `ttl`, replacing any previous value.
    fn set(&self, key: &str, blob: &str, ttl: Duration) -> UsageResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> UsageResult<()>;
}

/// Stored value with its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    expires_at: DateTime<Utc>,
    value: String,
}

impl Entry {
    fn new(blob: &str, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            expires_at,
            value: blob.to_string(),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// In-process store; contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` currently holds an unexpired value.
    #[allow(dead_code)] // Inspection helper for tests
    pub fn contains(&self, key: &str) -> bool {
        matches!(self.get(key), Ok(Some(_)))
    }

    fn lock(&self, key: &str) -> UsageResult<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| UsageError::store(key, "memory store lock poisoned"))
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, key: &str) -> UsageResult<Option<String>> {
        let mut entries = self.lock(key)?;
        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return Ok(None),
        };

        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, blob: &str, ttl: Duration) -> UsageResult<()> {
        self.lock(key)?.insert(key.to_string(), Entry::new(blob, ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> UsageResult<()> {
        self.lock(key)?.remove(key);
        Ok(())
    }
}

/// Store keeping one JSON file per key inside a directory.
///
/// Writes go to a temporary file in the same directory which is then
/// renamed over the target, so readers never observe a partial entry.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl SnapshotStore for FileStore {
    fn get(&self, key: &str) -> UsageResult<Option<String>> {
        let path = self.entry_path(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: Entry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Discarding unreadable store entry {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        if entry.is_expired() {
            debug!("Store entry {} expired at {}", key, entry.expires_at);
            self.delete(key)?;
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    fn set(&self, key: &str, blob: &str, ttl: Duration) -> UsageResult<()> {
        std::fs::create_dir_all(&self.dir)?;

        let entry = Entry::new(blob, ttl);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, &entry)?;
        tmp.flush()?;
        tmp.persist(self.entry_path(key))
            .map_err(|e| UsageError::store(key, e.to_string()))?;

        debug!("Stored {} ({} bytes)", key, blob.len());
        Ok(())
    }

    fn delete(&self, key: &str) -> UsageResult<()> {
        match std::fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

//! Key-value persistence backends.
//!
//! The note store only needs `get`/`set` of whole string values under a key.
//! A write that would exceed the configured capacity fails with
//! [`MemoError::StorageFull`] and leaves the previous value in place.
use std::{
    collections::HashMap,
    fs,
    io::{ErrorKind, Write},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use log::{debug, error, trace};
use tempfile::NamedTempFile;

use crate::{MemoError, Result};

/// Opaque string store the notes are persisted into.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if it was never set.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replaces the value under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

fn check_capacity(key: &str, size: usize, capacity: Option<u64>) -> Result<()> {
    match capacity {
        Some(capacity) if size as u64 > capacity => Err(MemoError::StorageFull {
            key: key.to_string(),
            size: size as u64,
            capacity,
        }),
        _ => Ok(()),
    }
}

/// Stores each key as `<dir>/<key>.json`, written atomically.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
    capacity_bytes: Option<u64>,
}

impl FileKeyValueStore {
    /// Opens (and creates if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, capacity_bytes: Option<u64>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            debug!("Data directory does not exist, creating: {}", dir.display());
            fs::create_dir_all(&dir).map_err(|e| {
                error!("Failed to create data directory {}: {}", dir.display(), e);
                MemoError::Io(e)
            })?;
        }
        Ok(Self {
            dir,
            capacity_bytes,
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => {
                trace!("Read {} bytes from {}", value.len(), path.display());
                Ok(Some(value))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                Err(MemoError::Io(e))
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        check_capacity(key, value.len(), self.capacity_bytes)?;

        let path = self.path_for(key);
        let mut temp_file = NamedTempFile::new_in(&self.dir).map_err(|e| {
            error!("Failed to create temporary file: {}", e);
            MemoError::Io(e)
        })?;

        temp_file.write_all(value.as_bytes()).map_err(|e| {
            error!("Failed to write to temporary file: {}", e);
            MemoError::Io(e)
        })?;
        temp_file.flush()?;

        temp_file.persist(&path).map_err(|e| {
            error!("Failed to persist file {}: {}", path.display(), e.error);
            MemoError::Io(e.error)
        })?;

        trace!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }
}

/// In-memory store. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    capacity_bytes: Option<u64>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_bytes(capacity_bytes: u64) -> Self {
        Self {
            capacity_bytes: Some(capacity_bytes),
            ..Self::default()
        }
    }

    /// Returns a handle on the same entries with a different capacity.
    pub fn shared_with_capacity(&self, capacity_bytes: Option<u64>) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            capacity_bytes,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| MemoError::LockAcquisitionFailed {
                message: format!("Failed to lock in-memory store: {}", e),
            })
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        check_capacity(key, value.len(), self.capacity_bytes)?;
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

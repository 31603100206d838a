//! Key-value storage backends
//!
//! Values are JSON strings stored under stable keys, the same layout a
//! browser's local storage would hold.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::{HarnessError, HarnessResult};

/// String key-value persistence
pub trait KeyValueStorage: Send + Sync + Debug {
    fn get(&self, key: &str) -> HarnessResult<Option<String>>;
    fn set(&self, key: &str, value: String) -> HarnessResult<()>;
    fn remove(&self, key: &str) -> HarnessResult<()>;
}

/// Process-local storage, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> HarnessResult<Option<String>> {
        Ok(self.entries.get(key).map(|value| value.value().clone()))
    }

    fn set(&self, key: &str, value: String) -> HarnessResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> HarnessResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Storage persisted as one JSON object in a file
///
/// The whole map is rewritten on every change.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`
    pub fn open(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| {
                    HarnessError::storage(format!("corrupt storage file {}: {e}", path.display()))
                })?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened file storage");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> HarnessResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> HarnessResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> HarnessResult<()> {
        let mut entries = self.entries.write();
        let previous = entries.insert(key.to_string(), value);
        if let Err(e) = self.flush(&entries) {
            restore(&mut entries, key, previous);
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> HarnessResult<()> {
        let mut entries = self.entries.write();
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.flush(&entries) {
            restore(&mut entries, key, Some(previous));
            return Err(e);
        }
        Ok(())
    }
}

/// Undo an in-memory change the file did not take
fn restore(entries: &mut BTreeMap<String, String>, key: &str, previous: Option<String>) {
    tracing::warn!(key, "Storage write failed, change rolled back");
    match previous {
        Some(value) => entries.insert(key.to_string(), value),
        None => entries.remove(key),
    };
}

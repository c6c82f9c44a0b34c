use std::collections::HashMap;
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::trace;

use super::StorageError;

/// Extension for durable slot files
const SLOT_EXTENSION: &str = "slot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    Volatile,
    Durable,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Volatile => "volatile",
            TierKind::Durable => "durable",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// String key/value storage backing one tier.
///
/// Missing keys are `Ok(None)`, not errors. Removing a missing key succeeds.
pub trait StorageTier: Send + Sync {
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process tier. Lives and dies with the client that created it.
#[derive(Debug, Default)]
pub struct MemoryTier {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl StorageTier for MemoryTier {
    fn name(&self) -> &'static str {
        TierKind::Volatile.as_str()
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.slots.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.slots.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.slots.lock().remove(key);
        Ok(())
    }
}

/// Directory-backed tier, one file per slot.
///
/// Every client pointed at the same directory sees the same slots. Each write
/// goes through its own temporary file and a rename, so readers never see a
/// half-written slot and concurrent writers never fail: the last rename wins.
#[derive(Debug, Clone)]
pub struct FileTier {
    dir: PathBuf,
}

impl FileTier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, SLOT_EXTENSION))
    }

    fn unavailable(&self, key: &str, source: std::io::Error) -> StorageError {
        StorageError::unavailable(self.name(), key, source)
    }
}

impl StorageTier for FileTier {
    fn name(&self) -> &'static str {
        TierKind::Durable.as_str()
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.slot_path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.unavailable(key, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| self.unavailable(key, e))?;

        let path = self.slot_path(key);
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| self.unavailable(key, e))?;
        tmp.write_all(value.as_bytes())
            .map_err(|e| self.unavailable(key, e))?;
        tmp.persist(&path)
            .map_err(|e| self.unavailable(key, e.error))?;
        trace!(key, path = %path.display(), "Durable slot written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.slot_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.unavailable(key, e)),
        }
    }
}

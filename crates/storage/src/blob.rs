//! Local durable storage port: synchronous, string-keyed, best-effort.
//!
//! This is the engine's stand-in for a browser's `localStorage` or a desktop
//! app's settings directory. Callers treat failures as reduced durability,
//! never as fatal errors.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::repository::StorageError;

/// String-keyed blob storage with no cross-process atomicity guarantee.
///
/// Read-after-write is consistent within one process; nothing more is
/// promised.
pub trait BlobStore: Send + Sync {
    /// Fetch the blob stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the backing store cannot be
    /// reached.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the backing store cannot be
    /// written (quota, disabled, permissions).
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove the blob stored under `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the backing store cannot be
    /// reached.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Simple in-memory blob store for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .blobs
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .blobs
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .blobs
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

/// Filesystem-backed blob store: one file per key under a root directory.
///
/// The desktop counterpart of `localStorage`. Keys are sanitized so the
/// engine's `module:instance` separators map onto valid file names.
#[derive(Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create the store, making the root directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` when the directory cannot be
    /// created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{sanitized}.json"))
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::write(self.path_for(key), value).map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Unavailable(e.to_string())),
        }
    }
}

/// Blob store that always fails, for exercising degraded-mode behavior.
#[derive(Clone, Copy, Default)]
pub struct UnavailableBlobStore;

impl BlobStore for UnavailableBlobStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }
}

//! Durable storage for the last verified login identifier.
//!
//! Only the identifier is persisted. Credentials never touch this store.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedIdentifier {
    pub identifier: String,
    pub saved_at: DateTime<Utc>,
}

impl PersistedIdentifier {
    pub fn now(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            saved_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum IdentifierStoreError {
    #[error("identifier store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("identifier store at {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// Load/save/clear of a single persisted identifier.
pub trait IdentifierStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedIdentifier>, IdentifierStoreError>;

    fn save(&self, identifier: &PersistedIdentifier) -> Result<(), IdentifierStoreError>;

    fn clear(&self) -> Result<(), IdentifierStoreError>;
}

impl<T> IdentifierStore for Arc<T>
where
    T: IdentifierStore + ?Sized,
{
    fn load(&self) -> Result<Option<PersistedIdentifier>, IdentifierStoreError> {
        (**self).load()
    }

    fn save(&self, identifier: &PersistedIdentifier) -> Result<(), IdentifierStoreError> {
        (**self).save(identifier)
    }

    fn clear(&self) -> Result<(), IdentifierStoreError> {
        (**self).clear()
    }
}

/// Process-local identifier store (tests, embedded use).
#[derive(Debug, Default)]
pub struct InMemoryIdentifierStore {
    slot: Mutex<Option<PersistedIdentifier>>,
}

impl InMemoryIdentifierStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identifier(identifier: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(PersistedIdentifier::now(identifier))),
        }
    }
}

impl IdentifierStore for InMemoryIdentifierStore {
    fn load(&self) -> Result<Option<PersistedIdentifier>, IdentifierStoreError> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, identifier: &PersistedIdentifier) -> Result<(), IdentifierStoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(identifier.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), IdentifierStoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// JSON file identifier store.
///
/// Writes go to a sibling temp file that is then renamed over the target, so a
/// crash mid-write leaves either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileIdentifierStore {
    path: PathBuf,
}

impl FileIdentifierStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> IdentifierStoreError {
        IdentifierStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn write_then_rename(temp: &Path, target: &Path, payload: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(temp)?;
    file.write_all(payload)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp, target)
}

impl IdentifierStore for FileIdentifierStore {
    fn load(&self) -> Result<Option<PersistedIdentifier>, IdentifierStoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| IdentifierStoreError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    fn save(&self, identifier: &PersistedIdentifier) -> Result<(), IdentifierStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let payload = serde_json::to_vec_pretty(identifier).map_err(|e| IdentifierStoreError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let temp = self.temp_path();
        let written = write_then_rename(&temp, &self.path, &payload);
        if written.is_err() {
            // Best effort; the original error is the one worth reporting.
            let _ = fs::remove_file(&temp);
        }
        written.map_err(|e| self.io_error(e))
    }

    fn clear(&self) -> Result<(), IdentifierStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

//! Anomaly model persistence
//!
//! Backends behind the [`ModelStore`] trait:
//! - [`FileModelStore`]: one JSON file, written to a temp file and renamed
//! - [`SledModelStore`]: sled embedded database, key `anomaly_model/current`
//! - [`InMemoryModelStore`]: serialized bytes in memory, for tests and
//!   deployments that retrain on every start
//!
//! Every save overwrites the previous model.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

use super::detector::AnomalyModel;

const SLED_MODEL_KEY: &[u8] = b"anomaly_model/current";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, #[source] io::Error),
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Persistence for the current anomaly model.
pub trait ModelStore: Send + Sync {
    /// Persist `model`, replacing any earlier one.
    fn save(&self, model: &AnomalyModel) -> Result<(), StorageError>;

    /// Load the current model, `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<AnomalyModel>, StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// JSON file
// ============================================================================

#[derive(Debug, Clone)]
pub struct FileModelStore {
    path: PathBuf,
}

impl FileModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelStore for FileModelStore {
    fn save(&self, model: &AnomalyModel) -> Result<(), StorageError> {
        let json = serde_json::to_vec(model)?;

        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Io(parent.to_path_buf(), e))?;
        }
        std::fs::write(&tmp_path, &json).map_err(|e| StorageError::Io(tmp_path.clone(), e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| StorageError::Io(self.path.clone(), e))?;

        debug!(path = %self.path.display(), bytes = json.len(), "Saved anomaly model");
        Ok(())
    }

    fn load(&self) -> Result<Option<AnomalyModel>, StorageError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(self.path.clone(), e)),
        };
        Ok(Some(serde_json::from_slice(&data)?))
    }

    fn backend_name(&self) -> &'static str {
        "File"
    }
}

// ============================================================================
// sled
// ============================================================================

pub struct SledModelStore {
    db: sled::Db,
}

impl SledModelStore {
    /// Open or create the model database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_temp() -> Result<Self, StorageError> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Ok(Self { db })
    }
}

impl ModelStore for SledModelStore {
    fn save(&self, model: &AnomalyModel) -> Result<(), StorageError> {
        let value = serde_json::to_vec(model)?;
        self.db.insert(SLED_MODEL_KEY, value)?;
        self.db.flush()?;
        debug!(version = model.version, "Stored anomaly model in sled");
        Ok(())
    }

    fn load(&self) -> Result<Option<AnomalyModel>, StorageError> {
        match self.db.get(SLED_MODEL_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Keeps the serialized model so loads go through the same decoding as disk.
#[derive(Debug, Default)]
pub struct InMemoryModelStore {
    bytes: RwLock<Option<Vec<u8>>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelStore for InMemoryModelStore {
    fn save(&self, model: &AnomalyModel) -> Result<(), StorageError> {
        let json = serde_json::to_vec(model)?;
        let mut slot = self.bytes.write().map_err(|_| StorageError::Poisoned)?;
        *slot = Some(json);
        Ok(())
    }

    fn load(&self) -> Result<Option<AnomalyModel>, StorageError> {
        let slot = self.bytes.read().map_err(|_| StorageError::Poisoned)?;
        slot.as_deref()
            .map(serde_json::from_slice)
            .transpose()
            .map_err(StorageError::from)
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

//! JSON persistence under `{config_dir}/.storage/`
//!
//! Every file is wrapped in a versioned envelope:
//!
//! ```json
//! {
//!   "version": 1,
//!   "minor_version": 1,
//!   "key": "bafavorank.config_entries",
//!   "data": { ... }
//! }
//! ```

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage file {key} has version {found}, this build reads version {expected}")]
    VersionMismatch {
        key: String,
        expected: u32,
        found: u32,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Versioned envelope around stored data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Major version, bumped on incompatible layout changes
    pub version: u32,
    pub minor_version: u32,
    /// File name under `.storage/`
    pub key: String,
    pub data: T,
}

impl<T> StorageFile<T> {
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            version,
            minor_version,
            key: key.into(),
            data,
        }
    }
}

/// Handle on the `.storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    storage_dir: PathBuf,
}

impl Storage {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: config_dir.as_ref().join(".storage"),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    pub async fn exists(&self, key: &str) -> bool {
        fs::try_exists(self.file_path(key)).await.unwrap_or(false)
    }

    /// Load a file, or None if it has never been written
    pub async fn load<T>(&self, key: &str) -> StorageResult<Option<StorageFile<T>>>
    where
        T: DeserializeOwned,
    {
        let path = self.file_path(key);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "Storage file not found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let file: StorageFile<T> = serde_json::from_str(&content)?;
        debug!(
            key,
            version = file.version,
            minor_version = file.minor_version,
            "Loaded storage file"
        );
        Ok(Some(file))
    }

    /// Write a file through a temp file and rename
    pub async fn save<T>(&self, file: &StorageFile<T>) -> StorageResult<()>
    where
        T: Serialize,
    {
        fs::create_dir_all(&self.storage_dir).await?;

        let path = self.file_path(&file.key);
        let temp_path = self.file_path(&format!("{}.tmp", file.key));

        let content = serde_json::to_string_pretty(file)?;
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(key = %file.key, "Saved storage file");
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => {
                debug!(key, "Deleted storage file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Data that lives in exactly one storage file
pub trait Storable: Serialize + DeserializeOwned {
    const KEY: &'static str;
    const VERSION: u32;
    const MINOR_VERSION: u32;
}

/// Load a [`Storable`], rejecting files written with another major version
pub async fn load_storable<T: Storable>(storage: &Storage) -> StorageResult<Option<T>> {
    let Some(file) = storage.load::<T>(T::KEY).await? else {
        return Ok(None);
    };

    if file.version != T::VERSION {
        return Err(StorageError::VersionMismatch {
            key: T::KEY.to_string(),
            expected: T::VERSION,
            found: file.version,
        });
    }
    if file.minor_version > T::MINOR_VERSION {
        warn!(
            key = T::KEY,
            found = file.minor_version,
            current = T::MINOR_VERSION,
            "Storage file written by a newer minor version"
        );
    }

    Ok(Some(file.data))
}

pub async fn save_storable<T: Storable>(storage: &Storage, data: &T) -> StorageResult<()> {
    let file = StorageFile::new(T::KEY, data, T::VERSION, T::MINOR_VERSION);
    storage.save(&file).await
}

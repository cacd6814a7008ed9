//! Config entries manager
//!
//! Keeps every entry in memory, indexed by entry id and unique id, and
//! rewrites `.storage/bafavorank.config_entries` after each change.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::entry::{ConfigEntry, ConfigEntryState, ConfigEntryUpdate};
use crate::storage::{load_storable, save_storable, Storable, Storage, StorageError};

pub const STORAGE_KEY: &str = "bafavorank.config_entries";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already configured with unique_id {0}")]
    AlreadyExists(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

pub struct ConfigEntries {
    storage: Arc<Storage>,

    /// entry_id -> entry
    entries: DashMap<String, ConfigEntry>,

    /// unique_id -> entry_id
    by_unique_id: DashMap<String, String>,

    /// Serializes writes of the storage file
    save_lock: Mutex<()>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            by_unique_id: DashMap::new(),
            save_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub async fn load(&self) -> ConfigEntriesResult<()> {
        if let Some(data) = load_storable::<ConfigEntriesData>(&self.storage).await? {
            info!(count = data.entries.len(), "Loading config entries from storage");
            for entry in data.entries {
                self.index_entry(&entry);
            }
        }
        Ok(())
    }

    pub async fn save(&self) -> ConfigEntriesResult<()> {
        let _guard = self.save_lock.lock().await;
        let data = ConfigEntriesData {
            entries: self.entries(),
        };
        save_storable(&self.storage, &data).await?;
        debug!(count = data.entries.len(), "Saved config entries");
        Ok(())
    }

    fn index_entry(&self, entry: &ConfigEntry) {
        self.entries.insert(entry.entry_id.clone(), entry.clone());
        self.by_unique_id
            .insert(entry.unique_id.clone(), entry.entry_id.clone());
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        self.by_unique_id.remove(&entry.unique_id);
        self.entries.remove(&entry.entry_id);
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    pub fn get_by_unique_id(&self, unique_id: &str) -> Option<ConfigEntry> {
        self.by_unique_id
            .get(unique_id)
            .and_then(|entry_id| self.get(entry_id.value()))
    }

    /// Add an entry; an entry with the same unique_id must not exist
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if self.by_unique_id.contains_key(&entry.unique_id) {
            return Err(ConfigEntriesError::AlreadyExists(entry.unique_id));
        }

        self.index_entry(&entry);
        self.save().await?;

        info!(
            entry_id = %entry.entry_id,
            unique_id = %entry.unique_id,
            "Added config entry {}", entry.title
        );
        Ok(entry)
    }

    /// Change title or data; new data must not collide with another entry
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        let mut updated = entry.clone();
        if let Some(title) = update.title {
            updated.title = title;
        }
        if let Some(data) = update.data {
            updated.unique_id = data.unique_id();
            updated.data = data;
        }

        if updated.unique_id != entry.unique_id {
            if let Some(other) = self.get_by_unique_id(&updated.unique_id) {
                if other.entry_id != entry.entry_id {
                    return Err(ConfigEntriesError::AlreadyExists(updated.unique_id));
                }
            }
        }

        updated.modified_at = Utc::now();
        self.unindex_entry(&entry);
        self.index_entry(&updated);
        self.save().await?;

        debug!(entry_id, "Updated config entry");
        Ok(updated)
    }

    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        self.unindex_entry(&entry);
        self.save().await?;

        info!(entry_id, "Removed config entry {}", entry.title);
        Ok(entry)
    }

    pub fn set_state(&self, entry_id: &str, state: ConfigEntryState, reason: Option<String>) {
        if let Some(mut entry) = self.entries.get_mut(entry_id) {
            entry.state = state;
            entry.reason = reason;
            debug!(entry_id, ?state, "Entry state changed");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ConfigEntry> + '_ {
        self.entries.iter().map(|r| r.value().clone())
    }

    /// All entries in creation order
    pub fn entries(&self) -> Vec<ConfigEntry> {
        let mut entries: Vec<ConfigEntry> = self.iter().collect();
        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.entry_id.cmp(&b.entry_id))
        });
        entries
    }
}

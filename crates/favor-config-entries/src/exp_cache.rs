//! Last known cumulative exp per entry
//!
//! Lets a restarted process show the previous value while the first poll
//! of the new run is in flight or fails.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::storage::{load_storable, save_storable, Storable, Storage, StorageResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpCacheData {
    /// entry_id -> cumulative exp
    pub values: BTreeMap<String, u64>,
}

impl Storable for ExpCacheData {
    const KEY: &'static str = "bafavorank.exp_cache";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

pub struct ExpCache {
    storage: Arc<Storage>,
    values: DashMap<String, u64>,
    save_lock: Mutex<()>,
}

impl ExpCache {
    /// Open the cache, reading any previously saved values
    pub async fn load(storage: Arc<Storage>) -> StorageResult<Self> {
        let data = load_storable::<ExpCacheData>(&storage)
            .await?
            .unwrap_or_default();
        debug!(count = data.values.len(), "Loaded exp cache");

        Ok(Self {
            storage,
            values: data.values.into_iter().collect(),
            save_lock: Mutex::new(()),
        })
    }

    pub fn get(&self, entry_id: &str) -> Option<u64> {
        self.values.get(entry_id).map(|v| *v)
    }

    /// Record a value; the file is only rewritten when the value changed
    pub async fn set(&self, entry_id: &str, cumulative: u64) -> StorageResult<()> {
        let previous = self.values.insert(entry_id.to_string(), cumulative);
        if previous == Some(cumulative) {
            return Ok(());
        }
        self.save().await
    }

    pub async fn remove(&self, entry_id: &str) -> StorageResult<()> {
        if self.values.remove(entry_id).is_some() {
            self.save().await?;
        }
        Ok(())
    }

    async fn save(&self) -> StorageResult<()> {
        let _guard = self.save_lock.lock().await;
        let data = ExpCacheData {
            values: self
                .values
                .iter()
                .map(|r| (r.key().clone(), *r.value()))
                .collect(),
        };
        save_storable(&self.storage, &data).await
    }
}

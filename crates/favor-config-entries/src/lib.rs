//! Config entries and persistent storage
//!
//! A config entry is one tracked (account, student) pair. Entries are
//! created by a finished config flow or imported from configuration.yaml,
//! and persisted in `.storage/bafavorank.config_entries`.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - One (account, student) pair and its credentials
//! - [`ConfigEntries`] - Manager for all config entries
//! - [`ExpCache`] - Last known cumulative exp per entry
//! - [`Storage`] - The versioned `.storage/` JSON files

pub mod entry;
pub mod exp_cache;
pub mod manager;
pub mod storage;

pub use entry::{
    ConfigEntry, ConfigEntrySource, ConfigEntryState, ConfigEntryUpdate, FavorEntryData,
};
pub use exp_cache::{ExpCache, ExpCacheData};
pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, STORAGE_KEY,
    STORAGE_MINOR_VERSION, STORAGE_VERSION,
};
pub use storage::{
    load_storable, save_storable, Storable, Storage, StorageError, StorageFile, StorageResult,
};

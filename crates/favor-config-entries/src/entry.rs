//! Config entry types
//!
//! One ConfigEntry is one tracked (account, student) pair.

use chrono::{DateTime, Utc};
use favor_core::StudentId;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an entry (not persisted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    #[default]
    NotLoaded,
    SetupInProgress,
    /// Coordinator running and sensors registered
    Loaded,
    /// The first refresh produced no value
    SetupError,
    UnloadInProgress,
}

impl ConfigEntryState {
    /// Whether setup may be (re)started from this state
    pub fn can_setup(&self) -> bool {
        matches!(self, Self::NotLoaded | Self::SetupError)
    }
}

/// How the entry was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntrySource {
    /// Completed config flow
    #[default]
    User,
    /// `entries:` list in configuration.yaml
    Import,
}

/// What an entry needs to poll the friend API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavorEntryData {
    pub url: String,
    pub access_token: String,
    pub usercode: String,
    pub stuid: StudentId,
}

impl FavorEntryData {
    /// `"{usercode}_{stuid}"`, shared by the entry and its sensors
    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.usercode, self.stuid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// ULID
    pub entry_id: String,

    /// `"{usercode}_{student name}"`
    pub title: String,

    pub data: FavorEntryData,

    pub unique_id: String,

    #[serde(default)]
    pub source: ConfigEntrySource,

    #[serde(skip, default)]
    pub state: ConfigEntryState,

    /// Why the entry is in SetupError
    #[serde(skip, default)]
    pub reason: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl ConfigEntry {
    pub fn new(title: impl Into<String>, data: FavorEntryData) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            title: title.into(),
            unique_id: data.unique_id(),
            data,
            source: ConfigEntrySource::User,
            state: ConfigEntryState::NotLoaded,
            reason: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_source(mut self, source: ConfigEntrySource) -> Self {
        self.source = source;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ConfigEntryState::Loaded
    }
}

/// Fields to change in [`ConfigEntries::update`](crate::ConfigEntries::update)
#[derive(Debug, Default)]
pub struct ConfigEntryUpdate {
    pub title: Option<String>,
    pub data: Option<FavorEntryData>,
}

impl ConfigEntryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn data(mut self, data: FavorEntryData) -> Self {
        self.data = Some(data);
        self
    }
}

//! Entry lifecycle: coordinators, sensors and the exp cache
//!
//! Setting up an entry creates its coordinator, waits for the first value,
//! writes the five sensors and then keeps them in sync from a writer task
//! that follows the coordinator's watch channel.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use favor_client::{FriendApi, RefreshRequest, DEFAULT_URL};
use favor_config::{FavorConfig, YamlEntry};
use favor_config_entries::{
    ConfigEntries, ConfigEntriesError, ConfigEntry, ConfigEntrySource, ConfigEntryState,
    ConfigEntryUpdate, ExpCache, FavorEntryData, StorageError,
};
use favor_core::events::FavorExpUpdatedData;
use favor_core::{Context, EntityIdError, StudentDirectory, StudentId};
use favor_event_bus::EventBus;
use favor_rank::RankTable;
use favor_state_store::StateStore;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::coordinator::{CoordinatorError, CoordinatorSettings, FavorRankCoordinator};
use crate::sensor::{sensors_for, FavorSensor};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    NotReady(#[from] CoordinatorError),

    #[error("Invalid sensor id: {0}")]
    InvalidEntity(#[from] EntityIdError),

    #[error("Unknown student: {0}")]
    UnknownStudent(String),

    #[error(transparent)]
    Entries(#[from] ConfigEntriesError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type SetupResult<T> = Result<T, SetupError>;

/// Values shared by every entry
#[derive(Debug, Clone)]
pub struct IntegrationSettings {
    pub table: Arc<RankTable>,
    pub students: Arc<StudentDirectory>,
    pub max_exp: u64,
    pub coordinator: CoordinatorSettings,
}

impl IntegrationSettings {
    pub fn from_config(config: &FavorConfig) -> Self {
        Self {
            table: Arc::new(config.rank_table()),
            students: Arc::new(config.student_directory()),
            max_exp: config.max_exp,
            coordinator: CoordinatorSettings {
                update_interval: config.update_interval(),
                request_timeout: config.request_timeout(),
            },
        }
    }
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            table: Arc::new(RankTable::builtin().clone()),
            students: Arc::new(StudentDirectory::builtin().clone()),
            max_exp: favor_rank::DEFAULT_MAX_EXP,
            coordinator: CoordinatorSettings::default(),
        }
    }
}

struct LoadedEntry {
    coordinator: Arc<FavorRankCoordinator>,
    sensors: Vec<FavorSensor>,
    writer: JoinHandle<()>,
}

pub struct FavorIntegration {
    api: Arc<dyn FriendApi>,
    entries: Arc<ConfigEntries>,
    exp_cache: Arc<ExpCache>,
    state_store: Arc<StateStore>,
    event_bus: Arc<EventBus>,
    settings: IntegrationSettings,
    loaded: DashMap<String, LoadedEntry>,
}

impl FavorIntegration {
    pub fn new(
        api: Arc<dyn FriendApi>,
        entries: Arc<ConfigEntries>,
        exp_cache: Arc<ExpCache>,
        state_store: Arc<StateStore>,
        event_bus: Arc<EventBus>,
        settings: IntegrationSettings,
    ) -> Self {
        Self {
            api,
            entries,
            exp_cache,
            state_store,
            event_bus,
            settings,
            loaded: DashMap::new(),
        }
    }

    pub fn entries(&self) -> &Arc<ConfigEntries> {
        &self.entries
    }

    pub fn settings(&self) -> &IntegrationSettings {
        &self.settings
    }

    pub fn coordinator(&self, entry_id: &str) -> Option<Arc<FavorRankCoordinator>> {
        self.loaded.get(entry_id).map(|l| Arc::clone(&l.coordinator))
    }

    pub fn is_loaded(&self, entry_id: &str) -> bool {
        self.loaded.contains_key(entry_id)
    }

    /// Start polling for an entry and create its sensors
    ///
    /// Fails, leaving the entry in `SetupError`, when neither the first poll
    /// nor the exp cache provides a value.
    pub async fn setup_entry(&self, entry_id: &str) -> SetupResult<()> {
        let entry = self
            .entries
            .get(entry_id)
            .ok_or_else(|| SetupError::NotFound(entry_id.to_string()))?;

        if !entry.state.can_setup() || self.is_loaded(entry_id) {
            debug!(entry_id, state = ?entry.state, "Entry already set up");
            return Ok(());
        }

        info!(entry_id, title = %entry.title, "Setting up entry");
        self.entries
            .set_state(entry_id, ConfigEntryState::SetupInProgress, None);

        match self.load_entry(&entry).await {
            Ok(loaded) => {
                self.loaded.insert(entry_id.to_string(), loaded);
                self.entries.set_state(entry_id, ConfigEntryState::Loaded, None);
                Ok(())
            }
            Err(e) => {
                error!(entry_id, error = %e, "Entry setup failed");
                self.entries
                    .set_state(entry_id, ConfigEntryState::SetupError, Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn load_entry(&self, entry: &ConfigEntry) -> SetupResult<LoadedEntry> {
        let data = &entry.data;
        let student_name = self.settings.students.display_name(data.stuid);
        let sensors = sensors_for(data, &student_name)?;

        let cached = self.exp_cache.get(&entry.entry_id);
        let coordinator = Arc::new(
            FavorRankCoordinator::new(
                Arc::clone(&self.api),
                RefreshRequest {
                    url: data.url.clone(),
                    access_token: data.access_token.clone(),
                    usercode: data.usercode.clone(),
                },
                data.stuid,
                Arc::clone(&self.settings.table),
                self.settings.coordinator,
            )
            .with_initial_value(cached),
        );

        let value = coordinator.first_refresh().await?;

        let writer = SensorWriter {
            entry_id: entry.entry_id.clone(),
            student_id: data.stuid,
            sensors: sensors.clone(),
            state_store: Arc::clone(&self.state_store),
            event_bus: Arc::clone(&self.event_bus),
            exp_cache: Arc::clone(&self.exp_cache),
            table: Arc::clone(&self.settings.table),
            max_exp: self.settings.max_exp,
        };
        writer.publish(cached, value).await;

        let writer = tokio::spawn(writer.run(coordinator.subscribe(), value));
        coordinator.start();

        Ok(LoadedEntry {
            coordinator,
            sensors,
            writer,
        })
    }

    /// Stop polling and remove the entry's sensors
    pub async fn unload_entry(&self, entry_id: &str) -> SetupResult<()> {
        let Some((_, loaded)) = self.loaded.remove(entry_id) else {
            if self.entries.get(entry_id).is_none() {
                return Err(SetupError::NotFound(entry_id.to_string()));
            }
            self.entries.set_state(entry_id, ConfigEntryState::NotLoaded, None);
            return Ok(());
        };

        self.entries
            .set_state(entry_id, ConfigEntryState::UnloadInProgress, None);
        loaded.coordinator.stop();
        loaded.writer.abort();

        let context = Context::with_origin("unload");
        for sensor in &loaded.sensors {
            self.state_store.remove(&sensor.entity_id, context.child());
        }

        self.entries.set_state(entry_id, ConfigEntryState::NotLoaded, None);
        info!(entry_id, "Unloaded entry");
        Ok(())
    }

    /// Set up every stored entry concurrently, returning how many loaded
    pub async fn setup_all(&self) -> usize {
        let entries = self.entries.entries();
        let results = join_all(entries.iter().map(|e| self.setup_entry(&e.entry_id))).await;
        let loaded = results.iter().filter(|r| r.is_ok()).count();
        info!(loaded, total = entries.len(), "Set up config entries");
        loaded
    }

    /// Save a new entry and set it up
    ///
    /// The entry is kept even when setup fails; it stays in `SetupError`.
    pub async fn add_entry(&self, entry: ConfigEntry) -> SetupResult<ConfigEntry> {
        let entry = self.entries.add(entry).await?;
        if let Err(e) = self.setup_entry(&entry.entry_id).await {
            warn!(entry_id = %entry.entry_id, error = %e, "New entry saved but not loaded");
        }
        Ok(self.entries.get(&entry.entry_id).unwrap_or(entry))
    }

    pub async fn remove_entry(&self, entry_id: &str) -> SetupResult<ConfigEntry> {
        self.unload_entry(entry_id).await?;
        let entry = self.entries.remove(entry_id).await?;
        self.exp_cache.remove(entry_id).await?;
        Ok(entry)
    }

    /// Bring the `entries:` list from configuration.yaml into the store
    ///
    /// Known entries get their credentials updated. Entries naming an
    /// unknown student are skipped. Returns how many entries were added or
    /// changed.
    pub async fn import_entries(&self, yaml_entries: &[YamlEntry]) -> usize {
        let mut changed = 0;
        for yaml in yaml_entries {
            match self.import_entry(yaml).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(usercode = %yaml.usercode, error = %e, "Skipping configured entry")
                }
            }
        }
        if changed > 0 {
            info!(changed, "Imported entries from configuration");
        }
        changed
    }

    async fn import_entry(&self, yaml: &YamlEntry) -> SetupResult<bool> {
        let stuid = self.settings.students.resolve_id(&yaml.student);
        if stuid == 0 {
            return Err(SetupError::UnknownStudent(yaml.student.clone()));
        }

        let data = FavorEntryData {
            url: yaml.url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()),
            access_token: yaml.access_token.clone(),
            usercode: yaml.usercode.clone(),
            stuid,
        };

        match self.entries.get_by_unique_id(&data.unique_id()) {
            Some(existing) if existing.data == data => Ok(false),
            Some(existing) => {
                self.entries
                    .update(&existing.entry_id, ConfigEntryUpdate::new().data(data))
                    .await?;
                debug!(entry_id = %existing.entry_id, "Updated imported entry");
                Ok(true)
            }
            None => {
                let student = self.settings.students.display_name(stuid);
                let title = format!("{}_{}", data.usercode, student);
                let entry = ConfigEntry::new(title, data).with_source(ConfigEntrySource::Import);
                self.entries.add(entry).await?;
                Ok(true)
            }
        }
    }

    /// Stop every coordinator and writer
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.loaded.iter().map(|l| l.key().clone()).collect();
        for entry_id in ids {
            if let Some((_, loaded)) = self.loaded.remove(&entry_id) {
                loaded.coordinator.stop();
                loaded.writer.abort();
                self.entries.set_state(&entry_id, ConfigEntryState::NotLoaded, None);
            }
        }
        info!("Integration stopped");
    }
}

/// Turns coordinator values into sensor states, cache writes and events
struct SensorWriter {
    entry_id: String,
    student_id: StudentId,
    sensors: Vec<FavorSensor>,
    state_store: Arc<StateStore>,
    event_bus: Arc<EventBus>,
    exp_cache: Arc<ExpCache>,
    table: Arc<RankTable>,
    max_exp: u64,
}

impl SensorWriter {
    async fn publish(&self, old: Option<u64>, value: u64) {
        let context = Context::with_origin("poll");
        for sensor in &self.sensors {
            sensor.write_state(
                &self.state_store,
                &self.table,
                Some(value),
                self.max_exp,
                context.child(),
            );
        }

        if old != Some(value) {
            self.event_bus.fire_typed(
                FavorExpUpdatedData {
                    entry_id: self.entry_id.clone(),
                    student_id: self.student_id,
                    old_exp: old,
                    new_exp: value,
                },
                context,
            );
        }

        if let Err(e) = self.exp_cache.set(&self.entry_id, value).await {
            warn!(entry_id = %self.entry_id, error = %e, "Failed to persist cumulative exp");
        }
    }

    async fn run(self, mut rx: watch::Receiver<Option<u64>>, mut current: u64) {
        while rx.changed().await.is_ok() {
            let value = *rx.borrow_and_update();
            let Some(value) = value else { continue };
            self.publish(Some(current), value).await;
            current = value;
        }
        debug!(entry_id = %self.entry_id, "Sensor writer finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use favor_client::{success_response, ApiError, StaticFriendApi};
    use favor_config_entries::Storage;
    use favor_core::events::FAVOR_EXP_UPDATED;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        api: Arc<StaticFriendApi>,
        entries: Arc<ConfigEntries>,
        store: Arc<StateStore>,
        bus: Arc<EventBus>,
        integration: FavorIntegration,
    }

    async fn fixture_in(dir: TempDir, api: Arc<StaticFriendApi>) -> Fixture {
        let storage = Arc::new(Storage::new(dir.path()));
        let entries = Arc::new(ConfigEntries::new(Arc::clone(&storage)));
        entries.load().await.unwrap();
        let exp_cache = Arc::new(ExpCache::load(storage).await.unwrap());
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(StateStore::new(Arc::clone(&bus)));

        let settings = IntegrationSettings {
            coordinator: CoordinatorSettings {
                update_interval: Duration::from_secs(60),
                request_timeout: Duration::from_secs(10),
            },
            ..Default::default()
        };
        let integration = FavorIntegration::new(
            api.clone(),
            Arc::clone(&entries),
            exp_cache,
            Arc::clone(&store),
            Arc::clone(&bus),
            settings,
        );
        Fixture {
            dir,
            api,
            entries,
            store,
            bus,
            integration,
        }
    }

    async fn fixture() -> Fixture {
        let api = Arc::new(StaticFriendApi::new(success_response(&[(10000, 15, 46)])));
        fixture_in(TempDir::new().unwrap(), api).await
    }

    fn entry() -> ConfigEntry {
        ConfigEntry::new(
            "ABC_Aru",
            FavorEntryData {
                url: DEFAULT_URL.to_string(),
                access_token: "tok".to_string(),
                usercode: "ABC".to_string(),
                stuid: 10000,
            },
        )
    }

    #[tokio::test]
    async fn test_add_entry_creates_sensors() {
        let f = fixture().await;
        let mut events = f.bus.subscribe(FAVOR_EXP_UPDATED);

        let entry = f.integration.add_entry(entry()).await.unwrap();
        assert_eq!(entry.state, ConfigEntryState::Loaded);
        assert!(f.integration.coordinator(&entry.entry_id).unwrap().is_running());

        assert_eq!(f.store.get_state("sensor.abc_10000_rank").as_deref(), Some("15"));
        assert_eq!(f.store.get_state("sensor.abc_10000_exp").as_deref(), Some("1000"));
        assert_eq!(f.store.get_state("sensor.abc_10000_level_exp").as_deref(), Some("46"));
        assert_eq!(
            f.store.get_state("sensor.abc_10000_level_remain_exp").as_deref(),
            Some("132")
        );
        assert_eq!(
            f.store.get_state("sensor.abc_10000_hundred_percent").as_deref(),
            Some("0.4163")
        );

        let event = events.recv().await.unwrap();
        assert_eq!(event.data["new_exp"], 1000);
        assert!(event.data["old_exp"].is_null());

        f.integration.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_first_refresh_is_setup_error() {
        let api = Arc::new(StaticFriendApi::failing());
        let f = fixture_in(TempDir::new().unwrap(), api).await;

        let entry = f.integration.add_entry(entry()).await.unwrap();
        assert_eq!(entry.state, ConfigEntryState::SetupError);
        assert!(entry.reason.is_some());
        assert!(!f.integration.is_loaded(&entry.entry_id));
        assert_eq!(f.store.entity_count(), 0);

        // retry once the API recovers
        f.api.set_fallback(Some(success_response(&[(10000, 2, 0)])));
        f.integration.setup_entry(&entry.entry_id).await.unwrap();
        assert_eq!(f.store.get_state("sensor.abc_10000_rank").as_deref(), Some("2"));
        f.integration.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_uses_cached_value() {
        let f = fixture().await;
        let entry = f.integration.add_entry(entry()).await.unwrap();
        f.integration.shutdown().await;

        let Fixture { dir, .. } = f;
        let api = Arc::new(StaticFriendApi::failing());
        api.push(Err(ApiError::QuotaExceeded));
        let f = fixture_in(dir, api).await;

        assert_eq!(f.integration.setup_all().await, 1);
        assert_eq!(f.store.get_state("sensor.abc_10000_exp").as_deref(), Some("1000"));
        assert!(f.entries.get(&entry.entry_id).unwrap().is_loaded());
        f.integration.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_writer_follows_coordinator() {
        let f = fixture().await;
        let entry = f.integration.add_entry(entry()).await.unwrap();
        let mut events = f.bus.subscribe(FAVOR_EXP_UPDATED);

        f.api.set_fallback(Some(success_response(&[(10000, 16, 0)])));
        tokio::time::sleep(Duration::from_secs(61)).await;

        let event = events.recv().await.unwrap();
        assert_eq!(event.data["old_exp"], 1000);
        assert_eq!(event.data["new_exp"], 1132);
        assert_eq!(f.store.get_state("sensor.abc_10000_rank").as_deref(), Some("16"));

        let coordinator = f.integration.coordinator(&entry.entry_id).unwrap();
        assert_eq!(coordinator.data(), Some(1132));
        f.integration.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_entry_clears_everything() {
        let f = fixture().await;
        let entry = f.integration.add_entry(entry()).await.unwrap();
        assert_eq!(f.store.entity_count(), 5);

        f.integration.remove_entry(&entry.entry_id).await.unwrap();
        assert_eq!(f.store.entity_count(), 0);
        assert!(f.entries.is_empty());
        assert!(!f.integration.is_loaded(&entry.entry_id));
        assert!(matches!(
            f.integration.unload_entry(&entry.entry_id).await,
            Err(SetupError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_import_entries() {
        let f = fixture().await;
        let yaml = vec![
            YamlEntry {
                url: None,
                access_token: "tok".to_string(),
                usercode: "ABC".to_string(),
                student: "Aru".to_string(),
            },
            YamlEntry {
                url: None,
                access_token: "tok".to_string(),
                usercode: "ABC".to_string(),
                student: "Nobody".to_string(),
            },
        ];

        assert_eq!(f.integration.import_entries(&yaml).await, 1);
        let imported = f.entries.get_by_unique_id("ABC_10000").unwrap();
        assert_eq!(imported.source, ConfigEntrySource::Import);
        assert_eq!(imported.title, "ABC_Aru");
        assert_eq!(imported.data.url, DEFAULT_URL);

        // unchanged on a second run
        assert_eq!(f.integration.import_entries(&yaml).await, 0);

        let mut rotated = yaml[..1].to_vec();
        rotated[0].access_token = "new".to_string();
        assert_eq!(f.integration.import_entries(&rotated).await, 1);
        assert_eq!(
            f.entries.get(&imported.entry_id).unwrap().data.access_token,
            "new"
        );
        assert_eq!(f.entries.len(), 1);
    }
}

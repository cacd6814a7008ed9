//! bafavorank server
//!
//! Loads `configuration.yaml` from the config directory, sets up every
//! config entry and serves the REST API until Ctrl-C. Cumulative exp changes
//! are written to the log as they happen.

use anyhow::{Context, Result};
use favor_api::AppState;
use favor_client::{AronaClient, FriendApi};
use favor_config::FavorConfig;
use favor_config_entries::{ConfigEntries, ExpCache, Storage};
use favor_core::events::FavorExpUpdatedData;
use favor_event_bus::{EventBus, TypedReceiver};
use favor_integration::{FavorIntegration, FlowManager, IntegrationSettings};
use favor_state_store::StateStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment variable naming the config directory
const CONFIG_DIR_ENV: &str = "BAFAVORANK_CONFIG";

/// The running bafavorank instance
pub struct FavorRank {
    pub config: FavorConfig,
    pub bus: Arc<EventBus>,
    pub states: Arc<StateStore>,
    pub integration: Arc<FavorIntegration>,
    pub flows: Arc<FlowManager>,
}

impl FavorRank {
    /// Open storage and import the configured entries
    pub async fn new(
        config_dir: &Path,
        config: FavorConfig,
        api: Arc<dyn FriendApi>,
    ) -> Result<Self> {
        let settings = IntegrationSettings::from_config(&config);

        let storage = Arc::new(Storage::new(config_dir));
        let entries = Arc::new(ConfigEntries::new(Arc::clone(&storage)));
        entries.load().await.context("loading config entries")?;
        let exp_cache = Arc::new(
            ExpCache::load(storage)
                .await
                .context("loading exp cache")?,
        );

        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateStore::new(Arc::clone(&bus)));

        let flows = Arc::new(FlowManager::new(
            Arc::clone(&api),
            Arc::clone(&entries),
            Arc::clone(&settings.students),
            settings.coordinator.request_timeout,
        ));
        let integration = Arc::new(FavorIntegration::new(
            api,
            entries,
            exp_cache,
            Arc::clone(&states),
            Arc::clone(&bus),
            settings,
        ));

        integration.import_entries(&config.entries).await;

        Ok(Self {
            config,
            bus,
            states,
            integration,
            flows,
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            state_store: Arc::clone(&self.states),
            event_bus: Arc::clone(&self.bus),
            integration: Arc::clone(&self.integration),
            flows: Arc::clone(&self.flows),
        }
    }

    /// Start logging exp changes of every entry
    pub fn spawn_exp_log(&self) -> JoinHandle<()> {
        tokio::spawn(log_exp_updates(self.bus.subscribe_typed()))
    }
}

async fn log_exp_updates(mut updates: TypedReceiver<FavorExpUpdatedData>) {
    loop {
        match updates.recv().await {
            Ok(event) => {
                let update = event.data;
                info!(
                    entry_id = %update.entry_id,
                    student_id = update.student_id,
                    old_exp = ?update.old_exp,
                    new_exp = update.new_exp,
                    "Cumulative favor exp changed"
                );
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed exp updates"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_DIR_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_dir = config_dir();
    info!(config_dir = %config_dir.display(), "Starting bafavorank");

    let config = FavorConfig::load(&config_dir)
        .with_context(|| format!("loading configuration from {}", config_dir.display()))?;
    let api: Arc<dyn FriendApi> = Arc::new(AronaClient::with_timeout(config.request_timeout())?);
    let app = FavorRank::new(&config_dir, config, api).await?;
    let exp_log = app.spawn_exp_log();

    let loaded = app.integration.setup_all().await;
    info!(loaded, "bafavorank is running");

    let addr = app.config.server.bind_address();
    tokio::select! {
        result = favor_api::start_server(app.app_state(), &addr) => {
            result.with_context(|| format!("serving API on {addr}"))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    app.integration.shutdown().await;
    exp_log.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use favor_client::{success_response, StaticFriendApi};
    use tempfile::TempDir;

    const CONFIGURATION: &str = r#"
bafavorank:
  update_interval: 600
  students:
    20001: Yuuka
  entries:
    - access_token: !secret arona_token
      usercode: 123456
      student: Yuuka
"#;

    #[tokio::test]
    async fn test_startup_imports_and_loads_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("configuration.yaml"), CONFIGURATION).unwrap();
        std::fs::write(dir.path().join("secrets.yaml"), "arona_token: tok-1\n").unwrap();

        let api = Arc::new(StaticFriendApi::new(success_response(&[(20001, 3, 5)])));
        let config = FavorConfig::load(dir.path()).unwrap();
        let app = FavorRank::new(dir.path(), config, api).await.unwrap();
        assert_eq!(app.integration.entries().len(), 1);

        let entry = app.integration.entries().get_by_unique_id("123456_20001").unwrap();
        assert_eq!(entry.title, "123456_Yuuka");
        assert_eq!(entry.data.access_token, "tok-1");

        assert_eq!(app.integration.setup_all().await, 1);
        assert_eq!(
            app.states.get_state("sensor.123456_20001_exp").as_deref(),
            Some("52")
        );
        app.integration.shutdown().await;

        // entries survive a restart without being imported twice
        let api = Arc::new(StaticFriendApi::failing());
        let config = FavorConfig::load(dir.path()).unwrap();
        let app = FavorRank::new(dir.path(), config, api).await.unwrap();
        assert_eq!(app.integration.entries().len(), 1);
        assert_eq!(app.integration.setup_all().await, 1);
        assert_eq!(
            app.states.get_state("sensor.123456_20001_rank").as_deref(),
            Some("3")
        );
        app.integration.shutdown().await;
    }

    #[tokio::test]
    async fn test_exp_log_follows_bus() {
        let bus = EventBus::new();
        let log = tokio::spawn(log_exp_updates(bus.subscribe_typed()));

        bus.fire_typed(
            FavorExpUpdatedData {
                entry_id: "01ENTRY".to_string(),
                student_id: 20001,
                old_exp: None,
                new_exp: 52,
            },
            favor_core::Context::new(),
        );
        drop(bus);

        // the log drains what was fired and ends with the bus
        log.await.unwrap();
    }

    #[test]
    fn test_configured_settings() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("configuration.yaml"), CONFIGURATION).unwrap();
        std::fs::write(dir.path().join("secrets.yaml"), "arona_token: tok-1\n").unwrap();

        let config = FavorConfig::load(dir.path()).unwrap();
        let settings = IntegrationSettings::from_config(&config);
        assert_eq!(settings.coordinator.update_interval.as_secs(), 600);
        assert_eq!(settings.students.display_name(20001), "Yuuka");
        assert_eq!(config.server.bind_address(), "0.0.0.0:8124");
    }

    #[test]
    fn test_missing_secret_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("configuration.yaml"), CONFIGURATION).unwrap();
        assert!(FavorConfig::load(dir.path()).is_err());
    }
}

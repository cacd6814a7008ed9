//! Periodic polling of one (account, student) pair
//!
//! The coordinator owns the current cumulative exp. Sensors never talk to
//! the API; they watch the coordinator's value instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use favor_client::{ApiError, ApiResult, FriendApi, RefreshRequest, CODE_QUOTA_EXCEEDED};
use favor_core::StudentId;
use favor_rank::RankTable;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(3 * 60 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("{name}: no data after first refresh")]
    NotReady {
        name: String,
        #[source]
        source: Option<ApiError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub update_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

pub struct FavorRankCoordinator {
    /// `bafavorank_{usercode}_{stuid}`, used in logs
    name: String,
    api: Arc<dyn FriendApi>,
    request: RefreshRequest,
    student_id: StudentId,
    table: Arc<RankTable>,
    settings: CoordinatorSettings,
    /// Latest cumulative exp; receivers are only woken on a new value
    data: watch::Sender<Option<u64>>,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl FavorRankCoordinator {
    pub fn new(
        api: Arc<dyn FriendApi>,
        request: RefreshRequest,
        student_id: StudentId,
        table: Arc<RankTable>,
        settings: CoordinatorSettings,
    ) -> Self {
        let name = format!("{}_{}_{}", favor_core::DOMAIN, request.usercode, student_id);
        let (data, _) = watch::channel(None);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            name,
            api,
            request,
            student_id,
            table,
            settings,
            data,
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Start from a value remembered by an earlier run
    pub fn with_initial_value(self, value: Option<u64>) -> Self {
        self.data.send_replace(value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    /// Current cumulative exp, None until a poll has succeeded
    pub fn data(&self) -> Option<u64> {
        *self.data.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.data.subscribe()
    }

    /// One request for the configured student, without touching state
    pub async fn fetch(&self) -> ApiResult<u64> {
        let request = self.api.refresh(&self.request);
        let response = tokio::time::timeout(self.settings.request_timeout, request)
            .await
            .map_err(|_| ApiError::Timeout)??;

        if response.code == CODE_QUOTA_EXCEEDED {
            return Err(ApiError::QuotaExceeded);
        }
        if response.crypt {
            return Err(ApiError::Encrypted);
        }

        response
            .assist(self.student_id)?
            .cumulative_exp(&self.table)
    }

    /// Poll once and publish the result
    ///
    /// A failed poll leaves the previous value in place.
    pub async fn refresh(&self) -> ApiResult<u64> {
        match self.fetch().await {
            Ok(value) => {
                let changed = self.data.send_if_modified(|current| {
                    if *current == Some(value) {
                        false
                    } else {
                        *current = Some(value);
                        true
                    }
                });
                debug!(coordinator = %self.name, value, changed, "Poll succeeded");
                Ok(value)
            }
            Err(e) if e.is_throttled() => {
                warn!(coordinator = %self.name, "Token quota exceeded, keeping previous value");
                Err(e)
            }
            Err(e) => {
                error!(coordinator = %self.name, error = %e, "Poll failed, keeping previous value");
                Err(e)
            }
        }
    }

    /// Poll once and require a value, seeded or fresh
    pub async fn first_refresh(&self) -> Result<u64, CoordinatorError> {
        let result = self.refresh().await;
        match (self.data(), result) {
            (Some(value), _) => Ok(value),
            (None, Err(source)) => Err(CoordinatorError::NotReady {
                name: self.name.clone(),
                source: Some(source),
            }),
            (None, Ok(_)) => Err(CoordinatorError::NotReady {
                name: self.name.clone(),
                source: None,
            }),
        }
    }

    /// Poll every `update_interval` until [`stop`](Self::stop) is called
    ///
    /// An interval that is zero or too large to schedule leaves the
    /// coordinator stopped.
    pub fn start(self: &Arc<Self>) {
        let period = self.settings.update_interval;
        let first_tick = Instant::now().checked_add(period);
        let Some(first_tick) = first_tick.filter(|_| !period.is_zero()) else {
            error!(
                coordinator = %self.name,
                interval_secs = period.as_secs(),
                "Update interval cannot be scheduled, not polling"
            );
            return;
        };

        if self.running.swap(true, Ordering::SeqCst) {
            warn!(coordinator = %self.name, "Coordinator already running");
            return;
        }

        info!(
            coordinator = %self.name,
            interval_secs = period.as_secs(),
            "Starting coordinator"
        );

        let coordinator = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = coordinator.refresh().await;
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }

            debug!(coordinator = %coordinator.name, "Poll loop exited");
        });
    }

    /// Signal the poll loop to exit
    ///
    /// The coordinator counts as stopped immediately, so `start` may follow.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(coordinator = %self.name, "Stopping coordinator");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

//! The bafavorank integration
//!
//! Each config entry tracks one student of one friend account. Its
//! coordinator polls the friend API, turns `(favorRank, favorExp)` into a
//! cumulative exp total, and five sensors are derived from that total.
//!
//! # Key Types
//!
//! - [`FavorRankCoordinator`] - Polls one (account, student) pair
//! - [`FavorSensor`] / [`SensorKind`] - The derived sensor values
//! - [`FlowManager`] - Two-step flow that creates entries
//! - [`FavorIntegration`] - Sets entries up and tears them down

pub mod config_flow;
pub mod coordinator;
pub mod sensor;
pub mod setup;

pub use config_flow::{
    FlowError, FlowInfo, FlowManager, FlowResult, FlowResultType, FlowStepResult, FormField,
    ABORT_ALREADY_CONFIGURED, ERROR_AUTH, ERROR_NO_STUDENT, STEP_SELECT, STEP_USER,
};
pub use coordinator::{
    CoordinatorError, CoordinatorSettings, FavorRankCoordinator, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_UPDATE_INTERVAL,
};
pub use sensor::{sensors_for, FavorSensor, SensorKind, StateClass, ICON};
pub use setup::{FavorIntegration, IntegrationSettings, SetupError, SetupResult};

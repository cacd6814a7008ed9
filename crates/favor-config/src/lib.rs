//! YAML configuration loading for bafavorank
//!
//! Reads `configuration.yaml` from the config directory with support for
//! three custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use favor_config::FavorConfig;
//!
//! let config = FavorConfig::load("/config")?;
//! let table = config.rank_table();
//! ```

mod error;
mod favor_config;
mod loader;
mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use favor_config::{
    FavorConfig, ServerConfig, YamlEntry, CONFIG_KEY, MAX_REQUEST_TIMEOUT_SECS,
    MAX_UPDATE_INTERVAL_SECS,
};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use secrets::Secrets;

pub use serde_yaml::Value;

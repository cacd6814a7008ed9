//! Errors from reading configuration.yaml and the files it pulls in

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid YAML", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("!secret {0} is not defined in secrets.yaml")]
    MissingSecret(String),

    #[error("!env_var {0} is not set")]
    MissingEnvVar(String),

    /// A bad `!include` target, including a file that includes itself
    #[error("!include {path}: {reason}")]
    Include { path: String, reason: String },

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// The section parsed but its values cannot be used
    #[error("invalid bafavorank configuration: {0}")]
    Validation(String),
}

//! `secrets.yaml`, the values behind `!secret`

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Access tokens and user codes by name
///
/// User codes are often written unquoted, so numbers are kept as their text.
#[derive(Debug, Clone, Default)]
pub struct Secrets(HashMap<String, String>);

impl Secrets {
    /// Read `{config_dir}/secrets.yaml`; without the file there are no secrets
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        let path = config_dir.join("secrets.yaml");
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let raw: Option<HashMap<String, Value>> = serde_yaml::from_str(&content)
            .map_err(|source| ConfigError::Yaml {
                path: path.clone(),
                source,
            })?;

        let secrets = raw
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(s) => Ok((key, s)),
                Value::Number(n) => Ok((key, n.to_string())),
                _ => Err(ConfigError::InvalidValue {
                    key: format!("secret {key}"),
                    reason: "expected a string or number".to_string(),
                }),
            })
            .collect::<ConfigResult<HashMap<_, _>>>()?;

        debug!(count = secrets.len(), "Loaded secrets.yaml");
        Ok(Self(secrets))
    }

    pub fn get(&self, key: &str) -> ConfigResult<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingSecret(key.to_string()))
    }
}

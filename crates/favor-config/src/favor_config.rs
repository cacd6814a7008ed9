//! The `bafavorank:` section of configuration.yaml

use favor_core::{StudentDirectory, StudentId};
use favor_rank::{RankTable, DEFAULT_MAX_EXP};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

/// Top-level key of this integration in configuration.yaml
pub const CONFIG_KEY: &str = "bafavorank";

/// Longest accepted poll interval, one week
pub const MAX_UPDATE_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Longest accepted request timeout
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 5 * 60;

/// Bind address of the HTTP API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// A config entry declared in YAML, imported at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YamlEntry {
    /// Friend refresh endpoint; the client default is used when absent
    #[serde(default)]
    pub url: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub access_token: String,
    #[serde(deserialize_with = "string_or_number")]
    pub usercode: String,
    /// Student display name or numeric id
    #[serde(deserialize_with = "string_or_number")]
    pub student: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavorConfig {
    /// Cumulative exp that counts as 100%
    #[serde(default = "default_max_exp")]
    pub max_exp: u64,

    /// Seconds between polls
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    /// Seconds before a single API request is abandoned
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default)]
    pub server: ServerConfig,

    /// Replacement for the built-in rank thresholds
    #[serde(default)]
    pub rank_table: Option<RankTable>,

    /// Extra or corrected student names, merged over the built-in ones
    #[serde(default)]
    pub students: BTreeMap<StudentId, String>,

    #[serde(default)]
    pub entries: Vec<YamlEntry>,
}

fn default_max_exp() -> u64 {
    DEFAULT_MAX_EXP
}

fn default_update_interval() -> u64 {
    3 * 60 * 60
}

fn default_request_timeout() -> u64 {
    10
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8124
}

impl Default for FavorConfig {
    fn default() -> Self {
        Self {
            max_exp: default_max_exp(),
            update_interval: default_update_interval(),
            request_timeout: default_request_timeout(),
            server: ServerConfig::default(),
            rank_table: None,
            students: BTreeMap::new(),
            entries: Vec::new(),
        }
    }
}

impl FavorConfig {
    /// Load the section from `{config_dir}/configuration.yaml`
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let yaml = load_yaml(config_dir.as_ref(), "configuration.yaml")?;
        Self::from_yaml(&yaml)
    }

    /// Parse the section out of a whole configuration document
    ///
    /// A missing section yields the defaults.
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        let mapping = yaml.as_mapping().ok_or_else(|| ConfigError::InvalidValue {
            key: "root".to_string(),
            reason: "configuration must be a mapping".to_string(),
        })?;

        let config: FavorConfig = match mapping.get(CONFIG_KEY) {
            None | Some(Value::Null) => FavorConfig::default(),
            Some(section) => serde_yaml::from_value(section.clone()).map_err(|e| {
                ConfigError::InvalidValue {
                    key: CONFIG_KEY.to_string(),
                    reason: e.to_string(),
                }
            })?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        check_seconds("update_interval", self.update_interval, MAX_UPDATE_INTERVAL_SECS)?;
        check_seconds("request_timeout", self.request_timeout, MAX_REQUEST_TIMEOUT_SECS)?;
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.access_token.is_empty() || e.usercode.is_empty())
        {
            return Err(ConfigError::Validation(format!(
                "entry for student '{}' needs both access_token and usercode",
                entry.student
            )));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// The configured rank table, or the built-in one
    pub fn rank_table(&self) -> RankTable {
        self.rank_table
            .clone()
            .unwrap_or_else(|| RankTable::builtin().clone())
    }

    /// The built-in student names with configured names applied on top
    pub fn student_directory(&self) -> StudentDirectory {
        StudentDirectory::builtin().with_overrides(
            self.students
                .iter()
                .map(|(&id, name)| (id, name.clone())),
        )
    }
}

fn check_seconds(key: &str, value: u64, max: u64) -> ConfigResult<()> {
    if (1..=max).contains(&value) {
        return Ok(());
    }
    Err(ConfigError::Validation(format!(
        "{key} must be between 1 and {max} seconds, got {value}"
    )))
}

/// Accept `usercode: 123456` as well as `usercode: "123456"`
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use favor_rank::RankResult;
    use tempfile::TempDir;

    fn parse(text: &str) -> ConfigResult<FavorConfig> {
        FavorConfig::from_yaml(&serde_yaml::from_str(text).unwrap())
    }

    #[test]
    fn test_defaults_without_section() {
        let config = parse("other: {}\n").unwrap();
        assert_eq!(config.max_exp, 240_225);
        assert_eq!(config.update_interval(), Duration::from_secs(10800));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.server.bind_address(), "0.0.0.0:8124");
        assert!(config.entries.is_empty());
        assert_eq!(config.rank_table().max_rank(), Some(100));
    }

    #[test]
    fn test_empty_section() {
        let config = parse("bafavorank:\n").unwrap();
        assert_eq!(config.update_interval, 10800);
    }

    #[test]
    fn test_full_section() {
        let config = parse(
            r#"
bafavorank:
  max_exp: 1000
  update_interval: 600
  request_timeout: 5
  server:
    port: 9000
  rank_table: {0: 0, 1: 10, 2: 30}
  students:
    10000: Aru (New Year)
    20000: Mika
  entries:
    - access_token: tok
      usercode: 123456
      student: Mika
    - url: http://localhost:1234/refresh
      access_token: tok2
      usercode: ABCDEF
      student: 10001
"#,
        )
        .unwrap();

        assert_eq!(config.max_exp, 1000);
        assert_eq!(config.server.bind_address(), "0.0.0.0:9000");

        let table = config.rank_table();
        assert_eq!(table.rank_for(25), RankResult::new(1, 15));

        let students = config.student_directory();
        assert_eq!(students.display_name(10000), "Aru (New Year)");
        assert_eq!(students.resolve_id("Mika"), 20000);

        assert_eq!(config.entries[0].usercode, "123456");
        assert_eq!(config.entries[0].url, None);
        assert_eq!(config.entries[1].student, "10001");
        assert_eq!(
            config.entries[1].url.as_deref(),
            Some("http://localhost:1234/refresh")
        );
    }

    #[test]
    fn test_invalid_rank_table_rejected() {
        let result = parse("bafavorank:\n  rank_table: {0: 0, 1: 50, 2: 40}\n");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key, .. }) if key == "bafavorank"
        ));

        let result = parse("bafavorank:\n  rank_table: {1: 50}\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = parse("bafavorank:\n  update_interval: 0\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_out_of_range_durations_rejected() {
        let result = parse("bafavorank:\n  update_interval: 18446744073709551615\n");
        assert!(matches!(
            result,
            Err(ConfigError::Validation(message)) if message.contains("update_interval")
        ));

        let result = parse("bafavorank:\n  request_timeout: 301\n");
        assert!(matches!(
            result,
            Err(ConfigError::Validation(message)) if message.contains("request_timeout")
        ));

        let config =
            parse("bafavorank:\n  update_interval: 604800\n  request_timeout: 300\n").unwrap();
        assert_eq!(
            config.update_interval(),
            Duration::from_secs(MAX_UPDATE_INTERVAL_SECS)
        );
    }

    #[test]
    fn test_entry_without_token_rejected() {
        let result = parse(
            "bafavorank:\n  entries:\n    - access_token: ''\n      usercode: A\n      student: Aru\n",
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_with_secret() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("secrets.yaml"), "arona_token: s3cret\n").unwrap();
        std::fs::write(
            dir.path().join("configuration.yaml"),
            r#"
bafavorank:
  entries:
    - access_token: !secret arona_token
      usercode: XYZ
      student: Aru
"#,
        )
        .unwrap();

        let config = FavorConfig::load(dir.path()).unwrap();
        assert_eq!(config.entries[0].access_token, "s3cret");
    }

    #[test]
    fn test_missing_configuration_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            FavorConfig::load(dir.path()),
            Err(ConfigError::Read { .. })
        ));
    }
}

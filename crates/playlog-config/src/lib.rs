// playlog-config - Runtime configuration for the playlist logger
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from PLAYLOG_CONFIG env var
// 3. Config file contents from PLAYLOG_CONFIG_CONTENT env var
// 4. Default config file locations (./playlog.toml, ./.playlog.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};
pub use validation::parse_check_time;

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub attribution: AttributionConfig,

    #[serde(default)]
    pub rotation: RotationConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where record files live and which one to open at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub data_dir: String,
    /// Reopen the most recent record file in `data_dir` at startup.
    pub reload: bool,
    /// Explicit record file; takes precedence over `reload`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: "playlist_data".to_string(),
            reload: true,
            file: None,
        }
    }
}

/// Relay agent attribution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    /// User id the relay bot posts as. Attribution is off when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_agent_id: Option<i64>,
    /// Command prefix that makes the relay agent post on a user's behalf.
    pub trigger: String,
    pub timeout_secs: u64,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            relay_agent_id: None,
            trigger: "!relay".to_string(),
            timeout_secs: 5,
        }
    }
}

/// Monthly playlist rotation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    pub enabled: bool,
    pub min_age_days: u32,
    /// UTC times of day (`HH:MM`) at which rotation is evaluated.
    pub check_times: Vec<String>,
    pub name_prefix: String,
    pub description: String,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_age_days: 20,
            check_times: vec!["08:00".into(), "08:15".into(), "08:30".into()],
            name_prefix: "Sandyland songs".to_string(),
            description: String::new(),
        }
    }
}

/// External music service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Log service calls instead of performing them.
    pub dry_run: bool,
    pub link_base: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            link_base: "https://open.spotify.com/playlist/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Unsupported log format: {}. Supported: text, json", s),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from a specific file path (for CLI usage).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Load configuration with graceful fallback to defaults.
    /// Does not fail if config file is missing - uses defaults instead.
    pub fn load_or_default() -> Result<Self> {
        sources::load_or_default()
    }

    /// Merge another config into this one (used for TOML layering).
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.ledger = other.ledger;
        self.attribution = other.attribution;
        self.rotation = other.rotation;
        self.service = other.service;
        self.logging = other.logging;
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Build a configuration from inline TOML plus overrides supplied by an
    /// `EnvSource`. Used by tests and embedders that do not read files.
    pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<Self> {
        let mut config = RuntimeConfig::default();

        if let Some(inline) = inline_config {
            let file_config: RuntimeConfig =
                toml::from_str(inline).context("Failed to parse inline config content")?;
            config.merge(file_config);
        }

        config.apply_env_overrides_from(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapEnv(HashMap<&'static str, &'static str>);

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).map(|v| v.to_string())
        }
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_default_configs() {
        let config = RuntimeConfig::default();
        assert_eq!(config.ledger.data_dir, "playlist_data");
        assert!(config.ledger.reload);
        assert_eq!(config.attribution.timeout_secs, 5);
        assert_eq!(config.rotation.min_age_days, 20);
        assert_eq!(config.rotation.check_times.len(), 3);
        assert!(config.service.dry_run);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inline_toml_then_env() {
        let inline = r#"
            [ledger]
            data_dir = "/srv/playlog"
            reload = false

            [attribution]
            relay_agent_id = 356268235697553409
            trigger = "!fm"
            timeout_secs = 8
        "#;
        let env = MapEnv(HashMap::from([
            ("ATTRIBUTION_TIMEOUT_SECS", "3"),
            ("LOG_FORMAT", "json"),
        ]));

        let config = RuntimeConfig::load_with_env(Some(inline), &env).unwrap();
        assert_eq!(config.ledger.data_dir, "/srv/playlog");
        assert!(!config.ledger.reload);
        assert_eq!(config.attribution.relay_agent_id, Some(356268235697553409));
        assert_eq!(config.attribution.trigger, "!fm");
        assert_eq!(config.attribution.timeout_secs, 3);
        assert_eq!(config.logging.format, LogFormat::Json);
        // Sections absent from the file keep their defaults.
        assert_eq!(config.rotation.min_age_days, 20);
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let env = MapEnv(HashMap::from([("ROTATION_MIN_AGE_DAYS", "soon")]));
        assert!(RuntimeConfig::load_with_env(None, &env).is_err());
    }
}

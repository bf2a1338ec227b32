// Configuration source loading.
//
// Priority order:
// 1. Environment variables (PLAYLOG_* prefix)
// 2. Config file path from PLAYLOG_CONFIG
// 3. Inline config content from PLAYLOG_CONFIG_CONTENT
// 4. Default config files (./playlog.toml, ./.playlog.toml)
// 5. Built-in defaults

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::RuntimeConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_LOCATIONS: [&str; 2] = ["./playlog.toml", "./.playlog.toml"];

/// Load configuration using native environment/file access.
pub fn load_config() -> Result<RuntimeConfig> {
    load_layered(&StdEnvSource)
}

/// Layer the config file selected by `env` (if any) and `env`'s overrides
/// over the defaults.
fn load_layered<E: EnvSource>(env: &E) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    if let Some(file_config) = load_from_file(env)? {
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file<E: EnvSource>(env: &E) -> Result<Option<RuntimeConfig>> {
    if let Some(path) = env.get("CONFIG") {
        return read_toml(Path::new(&path)).map(Some);
    }

    if let Some(content) = env.get("CONFIG_CONTENT") {
        let config: RuntimeConfig = toml::from_str(&content).with_context(|| {
            format!("Failed to parse inline config from {}CONFIG_CONTENT", ENV_PREFIX)
        })?;
        return Ok(Some(config));
    }

    for path in DEFAULT_LOCATIONS {
        let path = Path::new(path);
        if path.exists() {
            return read_toml(path).map(Some);
        }
    }

    Ok(None)
}

fn read_toml(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns error if file doesn't exist or can't be parsed.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let file_config = read_toml(path.as_ref())?;

    let mut config = RuntimeConfig::default();
    config.merge(file_config);

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration, falling back to defaults when no config file exists.
/// A file that exists (or is named by `PLAYLOG_CONFIG`) but cannot be read
/// or parsed is still an error.
pub fn load_or_default() -> Result<RuntimeConfig> {
    load_layered(&StdEnvSource)
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}

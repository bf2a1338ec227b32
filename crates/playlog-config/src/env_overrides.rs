use super::{LogFormat, RuntimeConfig};
use anyhow::{anyhow, Context, Result};
use std::str::FromStr;

pub const ENV_PREFIX: &str = "PLAYLOG_";

/// Abstraction over environment-variable lookups so tests and embedders can
/// supply their own source of overrides.
pub trait EnvSource {
    /// Look up `key` without the `PLAYLOG_` prefix.
    fn get(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Ledger configuration
    if let Some(dir) = env.get("DATA_DIR") {
        config.ledger.data_dir = dir;
    }
    if let Some(val) = get_env_parsed::<bool, _>(env, "RELOAD")? {
        config.ledger.reload = val;
    }
    if let Some(file) = env.get("LEDGER_FILE") {
        config.ledger.file = if file.is_empty() { None } else { Some(file) };
    }

    // Attribution configuration
    if let Some(val) = get_env_parsed::<i64, _>(env, "RELAY_AGENT_ID")? {
        config.attribution.relay_agent_id = Some(val);
    }
    if let Some(trigger) = env.get("RELAY_TRIGGER") {
        config.attribution.trigger = trigger;
    }
    if let Some(val) = get_env_parsed::<u64, _>(env, "ATTRIBUTION_TIMEOUT_SECS")? {
        config.attribution.timeout_secs = val;
    }

    // Rotation configuration
    if let Some(val) = get_env_parsed::<bool, _>(env, "ROTATION_ENABLED")? {
        config.rotation.enabled = val;
    }
    if let Some(val) = get_env_parsed::<u32, _>(env, "ROTATION_MIN_AGE_DAYS")? {
        config.rotation.min_age_days = val;
    }
    if let Some(times) = env.get("ROTATION_CHECK_TIMES") {
        config.rotation.check_times = times
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }
    if let Some(prefix) = env.get("PLAYLIST_NAME_PREFIX") {
        config.rotation.name_prefix = prefix;
    }

    // Service configuration
    if let Some(val) = get_env_parsed::<bool, _>(env, "DRY_RUN")? {
        config.service.dry_run = val;
    }

    // Logging configuration
    if let Some(level) = env.get("LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = env.get("LOG_FORMAT") {
        config.logging.format = format
            .parse::<LogFormat>()
            .context("Invalid PLAYLOG_LOG_FORMAT value")?;
    }

    Ok(())
}

fn get_env_parsed<T, E>(env: &E, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    E: EnvSource,
{
    match env.get(key) {
        Some(val) => {
            let parsed = val
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

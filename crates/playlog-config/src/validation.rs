// Configuration validation
//
// Validates that required fields are present and values are sensible

use super::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_ledger_config(&config.ledger)?;
    validate_attribution_config(&config.attribution)?;
    validate_rotation_config(&config.rotation)?;
    Ok(())
}

/// Parse a `HH:MM` time of day into `(hour, minute)`.
pub fn parse_check_time(value: &str) -> Result<(u32, u32)> {
    let Some((hour, minute)) = value.split_once(':') else {
        bail!("check time '{}' must be in format 'HH:MM'", value);
    };

    let hour: u32 = hour
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("check time '{}' has an invalid hour", value))?;
    let minute: u32 = minute
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("check time '{}' has an invalid minute", value))?;

    if hour > 23 || minute > 59 {
        bail!("check time '{}' is out of range", value);
    }

    Ok((hour, minute))
}

fn validate_ledger_config(config: &LedgerConfig) -> Result<()> {
    if config.data_dir.is_empty() {
        bail!(
            "Ledger data directory is required\n\n\
            How to fix:\n\
              • Environment: export {}DATA_DIR=playlist_data\n\
              • TOML: [ledger]\n              data_dir = \"playlist_data\"\n",
            ENV_PREFIX
        );
    }

    Ok(())
}

fn validate_attribution_config(config: &AttributionConfig) -> Result<()> {
    if config.timeout_secs == 0 {
        bail!("attribution.timeout_secs must be greater than 0");
    }

    if config.relay_agent_id.is_some() && config.trigger.trim().is_empty() {
        bail!("attribution.trigger must not be empty when relay_agent_id is set");
    }

    if config.timeout_secs > 60 {
        warn!(
            timeout_secs = config.timeout_secs,
            "attribution.timeout_secs is very long; relay posts may be credited to the wrong user"
        );
    }

    Ok(())
}

fn validate_rotation_config(config: &RotationConfig) -> Result<()> {
    if config.min_age_days == 0 {
        bail!("rotation.min_age_days must be greater than 0");
    }

    if config.enabled && config.check_times.is_empty() {
        bail!("rotation.check_times must list at least one time when rotation is enabled");
    }

    for time in &config.check_times {
        parse_check_time(time)?;
    }

    if config.min_age_days > 31 {
        warn!(
            min_age_days = config.min_age_days,
            "rotation.min_age_days exceeds a month; some periods will be skipped"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_check_time() {
        assert_eq!(parse_check_time("08:00").unwrap(), (8, 0));
        assert_eq!(parse_check_time("23:59").unwrap(), (23, 59));
        assert_eq!(parse_check_time("7:5").unwrap(), (7, 5));
        assert!(parse_check_time("24:00").is_err());
        assert!(parse_check_time("08:60").is_err());
        assert!(parse_check_time("0800").is_err());
        assert!(parse_check_time("aa:bb").is_err());
    }

    #[test]
    fn test_validate_attribution_config() {
        let valid = AttributionConfig::default();
        assert!(validate_attribution_config(&valid).is_ok());

        let zero = AttributionConfig {
            timeout_secs: 0,
            ..AttributionConfig::default()
        };
        assert!(validate_attribution_config(&zero).is_err());

        let no_trigger = AttributionConfig {
            relay_agent_id: Some(1),
            trigger: "  ".into(),
            timeout_secs: 5,
        };
        assert!(validate_attribution_config(&no_trigger).is_err());
    }

    #[test]
    fn test_validate_rotation_config() {
        assert!(validate_rotation_config(&RotationConfig::default()).is_ok());

        let bad_time = RotationConfig {
            check_times: vec!["8am".into()],
            ..RotationConfig::default()
        };
        assert!(validate_rotation_config(&bad_time).is_err());

        let disabled_without_times = RotationConfig {
            enabled: false,
            check_times: Vec::new(),
            ..RotationConfig::default()
        };
        assert!(validate_rotation_config(&disabled_without_times).is_ok());
    }

    #[test]
    fn test_validate_ledger_config() {
        let empty = LedgerConfig {
            data_dir: String::new(),
            ..LedgerConfig::default()
        };
        assert!(validate_ledger_config(&empty).is_err());
    }
}

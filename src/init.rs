// Initialization utilities
//
// Logging/tracing setup and playlist service selection

use std::sync::Arc;

use anyhow::{bail, Result};
use playlog_config::{LogFormat, RuntimeConfig};
use tracing::info;

use crate::service::{DryRunService, PlaylistService};

/// Initialize tracing/logging from RuntimeConfig
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Parse log level from config
    let env_filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match config.logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_writer(std::io::stderr)),
        ),
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr)),
        ),
    };
}

/// Build the playlist service selected by RuntimeConfig
pub(crate) fn init_service(config: &RuntimeConfig) -> Result<Arc<dyn PlaylistService>> {
    if !config.service.dry_run {
        bail!(
            "No live playlist service is built in\n\n\
            How to fix:\n\
              • Environment: export PLAYLOG_DRY_RUN=true\n\
              • TOML: [service]\n              dry_run = true\n"
        );
    }

    info!(
        link_base = %config.service.link_base,
        "Using dry-run playlist service"
    );
    Ok(Arc::new(DryRunService::new(&config.service.link_base)))
}

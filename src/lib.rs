// playlog - shared playlist submission logger
//
// Runs one event loop that:
// - Logs submitted tracks into the current month's record file
// - Credits relay-agent posts to the user who invoked the agent
// - Rotates to a new playlist on the first day of each month
// - Shuts down on end of input, Ctrl+C or SIGTERM

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use playlog_config::RuntimeConfig;
use playlog_ledger::UserId;
use tokio::io::BufReader;
use tokio::signal;
use tracing::info;

pub mod attribution;
pub mod events;
mod init;
pub mod links;
pub mod manager;
pub mod rotation;
pub mod service;
pub mod stats;

pub use attribution::{AttributionQueue, AttributionStats, RelayAttributor};
pub use events::{Clock, Event, EventDriver, Reply};
pub use init::init_tracing;
pub use manager::{startup_file, AddOutcome, ManagerSettings, PlaylistManager};
pub use rotation::{RotationController, RotationDecision, RotationPolicy};
pub use service::{DryRunService, PlaylistService, TrackMetadata};

/// Graceful shutdown handler
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}

/// Entry point (loads config automatically)
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    run_with_config(config).await
}

/// Build the event driver described by `config`.
pub async fn build_driver(config: &RuntimeConfig) -> Result<EventDriver> {
    let service = init::init_service(config)?;

    let manager = PlaylistManager::open(
        ManagerSettings::from_config(config),
        startup_file(config),
        service,
        Utc::now(),
    )
    .await
    .context("Failed to open the current playlist")?;
    info!(
        playlist = manager.current_epoch_identity(),
        file = %manager.ledger().path().display(),
        "Logging into playlist"
    );

    let attributor = RelayAttributor::new(
        config.attribution.relay_agent_id.map(UserId),
        config.attribution.trigger.clone(),
        Duration::from_secs(config.attribution.timeout_secs),
    );
    if let Some(agent) = attributor.relay_agent() {
        info!(
            %agent,
            trigger = %config.attribution.trigger,
            timeout_secs = config.attribution.timeout_secs,
            "Relay attribution enabled"
        );
    }

    let rotation = if config.rotation.enabled {
        let policy = RotationPolicy::from_config(&config.rotation)?;
        info!(
            min_age_days = config.rotation.min_age_days,
            checks = ?config.rotation.check_times,
            "Rotation enabled"
        );
        Some(RotationController::new(policy))
    } else {
        info!("Rotation disabled by configuration");
        None
    };

    Ok(EventDriver::new(manager, attributor, rotation))
}

/// Entry point with pre-loaded configuration (for CLI usage)
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config);

    let mut driver = build_driver(&config).await?;

    info!("Reading JSON-lines events from stdin; press Ctrl+C to stop");
    driver
        .run(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown_signal(),
        )
        .await?;

    let stats = driver.attributor().queue().stats();
    info!(
        enqueued = stats.enqueued,
        matched = stats.matched,
        expired = stats.expired,
        desynced = stats.desynced,
        "Shutdown complete"
    );
    Ok(())
}

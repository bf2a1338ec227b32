use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use playlog_config::RuntimeConfig;
use playlog_ledger::{latest_record_file, RecordFile, UserId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Log shared playlist submissions to a per-month ledger
#[derive(Parser)]
#[command(name = "playlog")]
#[command(version)]
#[command(about = "Log shared playlist submissions to a per-month ledger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory holding record files (overrides config file)
    #[arg(short, long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process JSON-lines events from stdin (default if no subcommand given)
    Run,
    /// Print the leaderboard of a record file
    Leaderboard {
        /// Record file (defaults to the current one)
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// Include this user's standing
        #[arg(long, value_name = "USER_ID")]
        viewer: Option<i64>,

        /// Number of rows
        #[arg(long, default_value_t = playlog::stats::DEFAULT_BOARD_SIZE)]
        limit: usize,
    },
    /// Decode and summarise a record file
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    playlog::init_tracing(&config);

    match cli.command {
        Some(Commands::Leaderboard {
            file,
            viewer,
            limit,
        }) => run_leaderboard(&config, file, viewer.map(UserId), limit),
        Some(Commands::Inspect { file }) => run_inspect(&file),
        Some(Commands::Run) | None => run_events(config),
    }
}

fn load_config(cli: &Cli) -> Result<RuntimeConfig> {
    // Step 1: Load base configuration
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load_or_default().context("Failed to load configuration")?
    };

    // Step 2: Apply CLI overrides (highest priority)
    if let Some(data_dir) = &cli.data_dir {
        config.ledger.data_dir = data_dir.to_string_lossy().to_string();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn run_events(config: RuntimeConfig) -> Result<()> {
    // One logical event loop: the ledger has a single writer
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(playlog::run_with_config(config))
}

fn run_leaderboard(
    config: &RuntimeConfig,
    file: Option<PathBuf>,
    viewer: Option<UserId>,
    limit: usize,
) -> Result<()> {
    let file = file
        .or_else(|| playlog::startup_file(config))
        .or_else(|| latest_record_file(Path::new(&config.ledger.data_dir)))
        .with_context(|| format!("No record file found in {}", config.ledger.data_dir))?;

    info!(path = %file.display(), "Reading record file");
    let epoch = RecordFile::new(&file).load()?;
    let counts: BTreeMap<UserId, usize> = epoch
        .entries
        .iter()
        .map(|(user, history)| (*user, history.len()))
        .collect();
    let board = playlog::stats::leaderboard(&counts, viewer, limit);

    println!("Playlist {} ({})", epoch.playlist, file.display());
    for row in board.rows.iter().chain(board.viewer.iter()) {
        println!("{:>3}. {:<20} {:>4}", row.rank, row.user.to_string(), row.count);
    }
    println!("Total tracks: {}", board.total_tracks);
    Ok(())
}

fn run_inspect(file: &Path) -> Result<()> {
    info!(path = %file.display(), "Reading record file");
    let epoch = RecordFile::new(file).load()?;

    let summary = serde_json::json!({
        "path": file.display().to_string(),
        "playlist": epoch.playlist,
        "creation_time": epoch.creation_time,
        "users": epoch.entries.len(),
        "tracks": epoch.total_tracks(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to encode summary")?
    );
    Ok(())
}

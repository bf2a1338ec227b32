//! PlaylistManager: binds the active ledger to its external playlist.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use playlog_config::RuntimeConfig;
use playlog_ledger::{latest_record_file, period_label, unique_name, LedgerStore, UserId};
use tracing::{info, warn};

use crate::links::extract_track_id;
use crate::service::PlaylistService;

/// Settings that outlive any single epoch.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub data_dir: PathBuf,
    pub name_prefix: String,
    pub description: String,
}

impl ManagerSettings {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            data_dir: PathBuf::from(&config.ledger.data_dir),
            name_prefix: config.rotation.name_prefix.clone(),
            description: config.rotation.description.clone(),
        }
    }

    /// Default external playlist name for the period containing `now`.
    pub fn playlist_name(&self, now: DateTime<Utc>) -> String {
        format!("{}: {}", self.name_prefix, period_label(now))
    }
}

/// Record file to open at startup: the configured one, else the most recent
/// one in the data directory when reloading is enabled.
pub fn startup_file(config: &RuntimeConfig) -> Option<PathBuf> {
    if let Some(file) = &config.ledger.file {
        return Some(PathBuf::from(file));
    }
    if config.ledger.reload {
        return latest_record_file(Path::new(&config.ledger.data_dir));
    }
    None
}

/// Result of submitting a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added { track_id: String },
    Duplicate { track_id: String },
    NotATrackLink,
}

pub struct PlaylistManager {
    service: Arc<dyn PlaylistService>,
    settings: ManagerSettings,
    ledger: LedgerStore,
}

impl std::fmt::Debug for PlaylistManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistManager")
            .field("settings", &self.settings)
            .field("ledger", &self.ledger.path())
            .finish()
    }
}

impl PlaylistManager {
    /// Load `file` if it exists; otherwise start a new playlist, recorded at
    /// `file` when given.
    pub async fn open(
        settings: ManagerSettings,
        file: Option<PathBuf>,
        service: Arc<dyn PlaylistService>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let ledger = match file {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading existing playlist");
                LedgerStore::open(path, None)?
            }
            file => new_epoch(&settings, service.as_ref(), None, file, now).await?,
        };

        Ok(Self {
            service,
            settings,
            ledger,
        })
    }

    /// Create a new external playlist and a record file for it.
    pub async fn swap_to_new_playlist(
        &mut self,
        name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ledger = new_epoch(&self.settings, self.service.as_ref(), name, None, now).await?;
        Ok(())
    }

    /// Start logging into an already existing external playlist.
    pub fn create_from_existing_playlist(
        &mut self,
        playlist_id: &str,
        file: Option<PathBuf>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ledger = bind_epoch(&self.settings, playlist_id, file, now)?;
        Ok(())
    }

    pub fn load_existing_playlist(&mut self, file: impl Into<PathBuf>) -> Result<()> {
        let file = file.into();
        info!(path = %file.display(), "Loading existing playlist");
        self.ledger = LedgerStore::open(file, None)?;
        Ok(())
    }

    /// Log the track behind `url` for `user` and forward it to the playlist.
    pub async fn add_to_playlist(&mut self, user: UserId, url: &str) -> Result<AddOutcome> {
        let Some(track_id) = extract_track_id(url) else {
            return Ok(AddOutcome::NotATrackLink);
        };

        if self.add_track(user, &track_id).await? {
            Ok(AddOutcome::Added { track_id })
        } else {
            Ok(AddOutcome::Duplicate { track_id })
        }
    }

    /// Returns `false` when the track is already logged in this epoch.
    pub async fn add_track(&mut self, user: UserId, track_id: &str) -> Result<bool> {
        if !self.ledger.append(user, track_id)? {
            return Ok(false);
        }

        self.service
            .add_item(self.ledger.playlist_id(), track_id)
            .await
            .with_context(|| format!("Track {} was logged but not added to the playlist", track_id))?;
        Ok(true)
    }

    /// Not supported: the ledger refuses, and the playlist is left alone.
    pub fn remove_from_playlist(&mut self, track_ids: &[String]) -> Result<()> {
        self.ledger.remove_track(&track_ids.join(", "))?;
        Ok(())
    }

    pub fn playlist_link(&self) -> String {
        self.service.playlist_link(self.ledger.playlist_id())
    }

    pub fn current_epoch_identity(&self) -> &str {
        self.ledger.playlist_id()
    }

    pub fn creation_time(&self) -> i64 {
        self.ledger.creation_time()
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    pub fn service(&self) -> &dyn PlaylistService {
        self.service.as_ref()
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }
}

async fn new_epoch(
    settings: &ManagerSettings,
    service: &dyn PlaylistService,
    name: Option<&str>,
    file: Option<PathBuf>,
    now: DateTime<Utc>,
) -> Result<LedgerStore> {
    let name = name
        .map(str::to_owned)
        .unwrap_or_else(|| settings.playlist_name(now));
    info!(name = %name, "Creating new playlist");

    let playlist_id = service
        .create_playlist(&name, &settings.description)
        .await
        .context("Failed to create playlist")?;
    bind_epoch(settings, &playlist_id, file, now)
}

fn bind_epoch(
    settings: &ManagerSettings,
    playlist_id: &str,
    file: Option<PathBuf>,
    now: DateTime<Utc>,
) -> Result<LedgerStore> {
    let path = file.unwrap_or_else(|| unique_name(&settings.data_dir, now));
    let ledger = LedgerStore::open_at(&path, Some(playlist_id), now.timestamp())
        .with_context(|| format!("Failed to open record file {}", path.display()))?;

    if ledger.playlist_id() != playlist_id {
        warn!(
            path = %path.display(),
            recorded = ledger.playlist_id(),
            requested = playlist_id,
            "Record file already belongs to another playlist"
        );
    }
    Ok(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::DryRunService;
    use chrono::TimeZone;
    use playlog_ledger::LedgerError;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> ManagerSettings {
        ManagerSettings {
            data_dir: dir.path().to_path_buf(),
            name_prefix: "Songs".to_string(),
            description: String::new(),
        }
    }

    fn march() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_open_without_file_creates_dated_epoch() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(DryRunService::default());
        let manager = PlaylistManager::open(settings(&dir), None, service, march())
            .await
            .unwrap();

        assert_eq!(manager.ledger().path(), dir.path().join("2024-03.json"));
        assert_eq!(manager.current_epoch_identity(), "dry-run-1");
        assert!(manager.playlist_link().ends_with("dry-run-1"));
    }

    #[tokio::test]
    async fn test_swap_uniquifies_file_name() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(DryRunService::default());
        let mut manager = PlaylistManager::open(settings(&dir), None, service, march())
            .await
            .unwrap();

        manager.swap_to_new_playlist(None, march()).await.unwrap();
        assert_eq!(manager.ledger().path(), dir.path().join("2024-03-1.json"));
        assert_eq!(manager.current_epoch_identity(), "dry-run-2");
    }

    #[tokio::test]
    async fn test_add_to_playlist_outcomes() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(DryRunService::default());
        let mut manager = PlaylistManager::open(settings(&dir), None, service, march())
            .await
            .unwrap();

        let url = "https://open.spotify.com/track/abc123?si=xyz";
        assert_eq!(
            manager.add_to_playlist(UserId(1), url).await.unwrap(),
            AddOutcome::Added {
                track_id: "abc123".into()
            }
        );
        assert_eq!(
            manager
                .add_to_playlist(UserId(2), "https://open.spotify.com/track/abc123")
                .await
                .unwrap(),
            AddOutcome::Duplicate {
                track_id: "abc123".into()
            }
        );
        assert_eq!(
            manager
                .add_to_playlist(UserId(2), "https://open.spotify.com/album/abc123")
                .await
                .unwrap(),
            AddOutcome::NotATrackLink
        );
    }

    #[tokio::test]
    async fn test_remove_fails_loudly() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(DryRunService::default());
        let mut manager = PlaylistManager::open(settings(&dir), None, service, march())
            .await
            .unwrap();

        manager.add_track(UserId(1), "abc").await.unwrap();

        let err = manager
            .remove_from_playlist(&["abc".to_string()])
            .unwrap_err();
        let ledger_err = err.downcast_ref::<LedgerError>().unwrap();
        assert!(matches!(ledger_err, LedgerError::Unsupported { .. }));
        assert!(format!("{}", ledger_err).contains("abc"));
        assert!(manager.ledger().contains("abc"));

        // An empty request is refused the same way.
        assert!(manager.remove_from_playlist(&[]).is_err());
    }

    #[tokio::test]
    async fn test_existing_playlist_binding() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(DryRunService::default());
        let mut manager = PlaylistManager::open(settings(&dir), None, service, march())
            .await
            .unwrap();

        manager
            .create_from_existing_playlist("37i9dQZF1DXcBWIGoYBM5M", None, march())
            .unwrap();
        assert_eq!(manager.current_epoch_identity(), "37i9dQZF1DXcBWIGoYBM5M");

        let first = dir.path().join("2024-03.json");
        manager.load_existing_playlist(&first).unwrap();
        assert_eq!(manager.current_epoch_identity(), "dry-run-1");
    }

    #[test]
    fn test_startup_file_selection() {
        let dir = TempDir::new().unwrap();
        let mut config = RuntimeConfig::default();
        config.ledger.data_dir = dir.path().to_string_lossy().into_owned();

        assert_eq!(startup_file(&config), None);

        let existing = dir.path().join("2024-02.json");
        std::fs::write(&existing, b"{}").unwrap();
        assert_eq!(startup_file(&config), Some(existing));

        config.ledger.reload = false;
        assert_eq!(startup_file(&config), None);

        config.ledger.file = Some("explicit.json".into());
        assert_eq!(startup_file(&config), Some(PathBuf::from("explicit.json")));
    }
}

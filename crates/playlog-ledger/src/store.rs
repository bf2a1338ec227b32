//! LedgerStore: the deduplicated submission log of the active epoch.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::epoch::{Epoch, UserHistory, UserId, UNSET_PLAYLIST};
use crate::error::{LedgerError, Result};
use crate::record_file::RecordFile;

/// Owns one record file and the set of track ids already logged in it.
///
/// Track ids are unique across the whole epoch, not per user. Queries read
/// the persisted file rather than the cached epoch.
#[derive(Debug)]
pub struct LedgerStore {
    file: RecordFile,
    epoch: Epoch,
    tracks: HashSet<String>,
}

impl LedgerStore {
    /// Load the epoch at `path`, or create it if the file does not exist.
    ///
    /// `playlist` is only used for a newly created file; an existing file
    /// keeps the identity it was created with.
    pub fn open(path: impl Into<PathBuf>, playlist: Option<&str>) -> Result<Self> {
        Self::open_at(path, playlist, now_secs())
    }

    /// Like [`open`](Self::open); a newly created file records `creation_time`.
    pub fn open_at(
        path: impl Into<PathBuf>,
        playlist: Option<&str>,
        creation_time: i64,
    ) -> Result<Self> {
        let file = RecordFile::new(path);

        let epoch = match file.load() {
            Ok(epoch) => {
                info!(path = %file.path().display(), "Reading existing record file");
                epoch
            }
            Err(e) if e.is_not_found() => {
                info!(path = %file.path().display(), "Creating new record file");
                if let Some(parent) = file.path().parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| LedgerError::from_io(parent, e))?;
                    }
                }
                file.create(playlist.unwrap_or(UNSET_PLAYLIST), creation_time)?
            }
            Err(e) => return Err(e),
        };

        let tracks: HashSet<String> = epoch.track_ids().map(str::to_owned).collect();
        debug!(
            playlist = %epoch.playlist,
            creation_time = epoch.creation_time,
            tracks = tracks.len(),
            "Ledger opened"
        );

        Ok(Self { file, epoch, tracks })
    }

    /// Log `track_id` for `user` at the current time.
    ///
    /// Returns `Ok(false)` without touching anything if the track is already
    /// in this epoch, whoever submitted it.
    pub fn append(&mut self, user: UserId, track_id: &str) -> Result<bool> {
        self.append_at(user, track_id, now_secs())
    }

    /// Like [`append`](Self::append) with an explicit timestamp.
    pub fn append_at(&mut self, user: UserId, track_id: &str, time: i64) -> Result<bool> {
        if self.tracks.contains(track_id) {
            info!(%user, track_id, "Skipped track as it already exists");
            return Ok(false);
        }

        let written = self.file.update(|epoch| epoch.append(user, track_id, time))?;

        // Only after the write succeeded.
        self.tracks.insert(track_id.to_string());
        self.epoch = written;

        info!(%user, track_id, path = %self.file.path().display(), "Logged track");
        Ok(true)
    }

    /// Removing logged tracks is not supported.
    pub fn remove_track(&mut self, track_id: &str) -> Result<()> {
        Err(LedgerError::unsupported(format!(
            "removing '{}' from the ledger; remove it from the playlist directly",
            track_id
        )))
    }

    pub fn playlist_id(&self) -> &str {
        &self.epoch.playlist
    }

    pub fn creation_time(&self) -> i64 {
        self.epoch.creation_time
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Cached epoch as of the last open or append.
    pub fn epoch(&self) -> &Epoch {
        &self.epoch
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.tracks.contains(track_id)
    }

    /// Every track id this store knows is logged.
    pub fn known_tracks(&self) -> &HashSet<String> {
        &self.tracks
    }

    /// Fresh read of the persisted epoch.
    pub fn snapshot(&self) -> Result<Epoch> {
        self.file.load()
    }

    pub fn all_track_counts(&self) -> Result<BTreeMap<UserId, usize>> {
        Ok(self
            .snapshot()?
            .entries
            .into_iter()
            .map(|(user, history)| (user, history.len()))
            .collect())
    }

    pub fn all_tracks(&self) -> Result<BTreeMap<UserId, Vec<String>>> {
        Ok(self
            .snapshot()?
            .entries
            .into_iter()
            .map(|(user, history)| (user, history.tracks))
            .collect())
    }

    pub fn all_last_track_times(&self) -> Result<BTreeMap<UserId, i64>> {
        Ok(self
            .snapshot()?
            .entries
            .into_iter()
            .filter_map(|(user, history)| history.last_time().map(|t| (user, t)))
            .collect())
    }

    pub fn all_last_track_ids(&self) -> Result<BTreeMap<UserId, String>> {
        Ok(self
            .snapshot()?
            .entries
            .into_iter()
            .filter_map(|(user, mut history)| history.tracks.pop().map(|t| (user, t)))
            .collect())
    }

    pub fn history(&self, user: UserId) -> Result<Option<UserHistory>> {
        Ok(self.snapshot()?.entries.remove(&user))
    }

    pub fn track_count(&self, user: UserId) -> Result<usize> {
        Ok(self.history(user)?.map_or(0, |h| h.len()))
    }

    pub fn last_track_time(&self, user: UserId) -> Result<Option<i64>> {
        Ok(self.history(user)?.and_then(|h| h.last_time()))
    }

    pub fn last_track_id(&self, user: UserId) -> Result<Option<String>> {
        Ok(self.history(user)?.and_then(|mut h| h.tracks.pop()))
    }
}

pub(crate) fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_missing_file_and_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("playlist_data").join("2024-05.json");

        let store = LedgerStore::open(&path, Some("pl-1")).unwrap();
        assert!(path.exists());
        assert_eq!(store.playlist_id(), "pl-1");
        assert!(store.creation_time() > 0);
        assert!(store.known_tracks().is_empty());
    }

    #[test]
    fn test_open_at_records_given_creation_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.json");
        let store = LedgerStore::open_at(&path, Some("pl-1"), 1_700_000_000).unwrap();
        assert_eq!(store.creation_time(), 1_700_000_000);

        // Existing files keep their own creation time.
        let reopened = LedgerStore::open_at(&path, Some("pl-1"), 5).unwrap();
        assert_eq!(reopened.creation_time(), 1_700_000_000);
    }

    #[test]
    fn test_open_without_playlist_uses_sentinel() {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::open(dir.path().join("a.json"), None).unwrap();
        assert_eq!(store.playlist_id(), UNSET_PLAYLIST);
    }

    #[test]
    fn test_open_existing_keeps_identity_and_rebuilds_index() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.json");
        {
            let mut store = LedgerStore::open(&path, Some("first")).unwrap();
            store.append_at(UserId(1), "t1", 100).unwrap();
            store.append_at(UserId(2), "t2", 200).unwrap();
        }

        let store = LedgerStore::open(&path, Some("second")).unwrap();
        assert_eq!(store.playlist_id(), "first");
        assert!(store.contains("t1"));
        assert!(store.contains("t2"));
        assert_eq!(store.known_tracks().len(), 2);
    }

    #[test]
    fn test_open_corrupt_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.json");
        std::fs::write(&path, b"garbage").unwrap();
        let err = LedgerStore::open(&path, None).unwrap_err();
        assert!(matches!(err, LedgerError::Decode { .. }));
        // The corrupt file is left for inspection, not replaced.
        assert_eq!(std::fs::read(&path).unwrap(), b"garbage");
    }

    #[test]
    fn test_failed_write_leaves_index_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.json");
        let mut store = LedgerStore::open(&path, None).unwrap();

        std::fs::remove_file(&path).unwrap();
        assert!(store.append_at(UserId(1), "t1", 1).is_err());
        assert!(!store.contains("t1"));
    }

    #[test]
    fn test_remove_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let mut store = LedgerStore::open(dir.path().join("a.json"), None).unwrap();
        store.append_at(UserId(1), "t1", 1).unwrap();

        let err = store.remove_track("t1").unwrap_err();
        assert!(matches!(err, LedgerError::Unsupported { .. }));
        assert!(store.contains("t1"));
        assert_eq!(store.track_count(UserId(1)).unwrap(), 1);
    }

    #[test]
    fn test_per_user_queries_for_unknown_user() {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::open(dir.path().join("a.json"), None).unwrap();
        assert_eq!(store.track_count(UserId(5)).unwrap(), 0);
        assert_eq!(store.last_track_id(UserId(5)).unwrap(), None);
        assert_eq!(store.last_track_time(UserId(5)).unwrap(), None);
        assert_eq!(store.history(UserId(5)).unwrap(), None);
    }
}

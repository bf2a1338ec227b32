//! Durable JSON representation of an [`Epoch`].
//!
//! Layout on disk:
//!
//! ```text
//! {
//!     "playlist": "<id>",
//!     "creation_time": 1700000000,
//!     "<user id>": { "tracks": ["..."], "times": [1700000100] }
//! }
//! ```
//!
//! Any top-level key made only of decimal digits (optionally prefixed by `-`)
//! is a user id; every other key is epoch metadata.

use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::epoch::{Epoch, UserHistory, UserId};
use crate::error::{LedgerError, Result};

const PLAYLIST_KEY: &str = "playlist";
const CREATION_TIME_KEY: &str = "creation_time";

/// Handle on one epoch's record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFile {
    path: PathBuf,
}

impl RecordFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read and decode the file. A missing file is reported as
    /// [`LedgerError::NotFound`].
    pub fn load(&self) -> Result<Epoch> {
        let bytes = std::fs::read(&self.path).map_err(|e| LedgerError::from_io(&self.path, e))?;
        decode(&bytes).map_err(|message| LedgerError::decode(&self.path, message))
    }

    /// Write a fresh epoch with no user entries. Fails if the file exists.
    pub fn create(&self, playlist: &str, creation_time: i64) -> Result<Epoch> {
        let epoch = Epoch::new(playlist, creation_time);
        let bytes = encode(&epoch).map_err(|e| self.io_error(e))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| LedgerError::from_io(&self.path, e))?;
        file.write_all(&bytes)
            .and_then(|_| file.flush())
            .map_err(|e| LedgerError::from_io(&self.path, e))?;

        tracing::info!(path = %self.path.display(), playlist, creation_time, "Created record file");
        Ok(epoch)
    }

    /// Replace the whole file content with `epoch`.
    pub fn save(&self, epoch: &Epoch) -> Result<()> {
        let mut file = self.open_rw()?;
        self.rewrite(&mut file, epoch)
    }

    /// Read the persisted epoch, apply `mutate`, and rewrite it through the
    /// same handle. Returns the epoch as written.
    pub fn update<F>(&self, mutate: F) -> Result<Epoch>
    where
        F: FnOnce(&mut Epoch),
    {
        let mut file = self.open_rw()?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| LedgerError::from_io(&self.path, e))?;
        let mut epoch =
            decode(&bytes).map_err(|message| LedgerError::decode(&self.path, message))?;

        mutate(&mut epoch);
        self.rewrite(&mut file, &epoch)?;
        Ok(epoch)
    }

    fn open_rw(&self) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| LedgerError::from_io(&self.path, e))
    }

    // Seek to the start, write the full encoding, then cut the file to the
    // new length so a shorter encoding leaves no trailing bytes.
    fn rewrite(&self, file: &mut File, epoch: &Epoch) -> Result<()> {
        let bytes = encode(epoch).map_err(|e| self.io_error(e))?;
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(&bytes))
            .and_then(|_| file.set_len(bytes.len() as u64))
            .and_then(|_| file.flush())
            .map_err(|e| LedgerError::from_io(&self.path, e))
    }

    fn io_error(&self, e: serde_json::Error) -> LedgerError {
        LedgerError::from_io(&self.path, std::io::Error::other(e))
    }
}

/// Serialize an epoch as 4-space indented JSON.
pub fn encode(epoch: &Epoch) -> serde_json::Result<Vec<u8>> {
    let mut map = Map::new();
    map.insert(PLAYLIST_KEY.to_string(), Value::from(epoch.playlist.clone()));
    map.insert(CREATION_TIME_KEY.to_string(), Value::from(epoch.creation_time));
    for (key, value) in &epoch.extra {
        map.insert(key.clone(), value.clone());
    }
    for (user, history) in &epoch.entries {
        map.insert(user.to_string(), serde_json::to_value(history)?);
    }

    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    serde::Serialize::serialize(&Value::Object(map), &mut ser)?;
    Ok(out)
}

/// Decode the durable representation. Errors are human-readable reasons.
pub fn decode(bytes: &[u8]) -> std::result::Result<Epoch, String> {
    let map: Map<String, Value> =
        serde_json::from_slice(bytes).map_err(|e| format!("invalid JSON object: {}", e))?;

    let mut playlist = None;
    let mut creation_time = None;
    let mut epoch = Epoch::new(String::new(), 0);

    for (key, value) in map {
        if is_user_key(&key) {
            let user = key
                .parse::<UserId>()
                .map_err(|e| format!("user key '{}' is not a valid id: {}", key, e))?;
            let history: UserHistory = serde_json::from_value(value)
                .map_err(|e| format!("entry for user {}: {}", key, e))?;
            if !history.is_aligned() {
                return Err(format!(
                    "entry for user {} has {} tracks but {} times",
                    key,
                    history.tracks.len(),
                    history.times.len()
                ));
            }
            if epoch.entries.insert(user, history).is_some() {
                return Err(format!("duplicate entry for user {}", user));
            }
            continue;
        }

        match key.as_str() {
            PLAYLIST_KEY => {
                let id = value
                    .as_str()
                    .ok_or_else(|| format!("'{}' must be a string", PLAYLIST_KEY))?;
                playlist = Some(id.to_string());
            }
            CREATION_TIME_KEY => {
                let time = value
                    .as_i64()
                    .ok_or_else(|| format!("'{}' must be an integer", CREATION_TIME_KEY))?;
                creation_time = Some(time);
            }
            _ => {
                epoch.extra.insert(key, value);
            }
        }
    }

    epoch.playlist = playlist.ok_or_else(|| format!("missing '{}'", PLAYLIST_KEY))?;
    epoch.creation_time =
        creation_time.ok_or_else(|| format!("missing '{}'", CREATION_TIME_KEY))?;
    Ok(epoch)
}

/// True for keys of the form `-?[0-9]+`.
pub fn is_user_key(key: &str) -> bool {
    let digits = key.strip_prefix('-').unwrap_or(key);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

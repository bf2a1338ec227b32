//! In-memory model of one playlist epoch.
//!
//! The durable file mixes metadata fields with numeric user keys at the top
//! level. Here they are kept apart: named metadata fields plus an ordered map
//! keyed by [`UserId`]. The string/integer key coercion lives only in
//! [`crate::record_file`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Playlist identity recorded when an epoch is created without one.
pub const UNSET_PLAYLIST: &str = "N/A";

/// Identity of a submitting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        UserId(value)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(UserId)
    }
}

/// Submission history of one user. `tracks[i]` was submitted at `times[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHistory {
    pub tracks: Vec<String>,
    pub times: Vec<i64>,
}

impl UserHistory {
    pub fn push(&mut self, track_id: impl Into<String>, time: i64) {
        self.tracks.push(track_id.into());
        self.times.push(time);
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn last_track(&self) -> Option<&str> {
        self.tracks.last().map(String::as_str)
    }

    pub fn last_time(&self) -> Option<i64> {
        self.times.last().copied()
    }

    pub(crate) fn is_aligned(&self) -> bool {
        self.tracks.len() == self.times.len()
    }
}

/// One playlist epoch: identity, creation time and per-user history.
#[derive(Debug, Clone, PartialEq)]
pub struct Epoch {
    pub playlist: String,
    /// Seconds since the Unix epoch. Set once at creation.
    pub creation_time: i64,
    pub entries: BTreeMap<UserId, UserHistory>,
    /// Unrecognised non-numeric top-level keys, carried through rewrites.
    pub(crate) extra: Map<String, Value>,
}

impl Epoch {
    pub fn new(playlist: impl Into<String>, creation_time: i64) -> Self {
        Self {
            playlist: playlist.into(),
            creation_time,
            entries: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    /// Record one submission, creating the user's history if absent.
    pub fn append(&mut self, user: UserId, track_id: impl Into<String>, time: i64) {
        self.entries.entry(user).or_default().push(track_id, time);
    }

    pub fn history(&self, user: UserId) -> Option<&UserHistory> {
        self.entries.get(&user)
    }

    /// Every track id in the epoch, across all users.
    pub fn track_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .values()
            .flat_map(|history| history.tracks.iter().map(String::as_str))
    }

    pub fn total_tracks(&self) -> usize {
        self.entries.values().map(UserHistory::len).sum()
    }

    pub fn contains_track(&self, track_id: &str) -> bool {
        self.track_ids().any(|t| t == track_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_creates_history_and_keeps_alignment() {
        let mut epoch = Epoch::new(UNSET_PLAYLIST, 1_700_000_000);
        epoch.append(UserId(7), "tid1", 10);
        epoch.append(UserId(7), "tid2", 20);
        epoch.append(UserId(-3), "tid3", 30);

        let seven = epoch.history(UserId(7)).unwrap();
        assert_eq!(seven.tracks, vec!["tid1", "tid2"]);
        assert_eq!(seven.times, vec![10, 20]);
        assert!(seven.is_aligned());
        assert_eq!(seven.last_track(), Some("tid2"));
        assert_eq!(seven.last_time(), Some(20));

        assert_eq!(epoch.total_tracks(), 3);
        assert!(epoch.contains_track("tid3"));
        assert!(!epoch.contains_track("tid4"));
    }

    #[test]
    fn user_id_parses_signed_decimal() {
        assert_eq!("42".parse::<UserId>().unwrap(), UserId(42));
        assert_eq!("-42".parse::<UserId>().unwrap(), UserId(-42));
        assert!("abc".parse::<UserId>().is_err());
    }
}

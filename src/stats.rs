//! Leaderboards and lookups over the current epoch.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use playlog_ledger::UserId;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

pub const DEFAULT_BOARD_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub rank: usize,
    pub user: UserId,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leaderboard {
    pub rows: Vec<Standing>,
    /// The viewer's own row when it is not among `rows`. A viewer with no
    /// submissions ranks just below everyone who has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<Standing>,
    pub total_tracks: usize,
}

/// Rank users by submission count, most first; ties go to the lower id.
pub fn leaderboard(
    counts: &BTreeMap<UserId, usize>,
    viewer: Option<UserId>,
    limit: usize,
) -> Leaderboard {
    let mut sorted: Vec<(UserId, usize)> = counts.iter().map(|(u, c)| (*u, *c)).collect();
    sorted.sort_by_key(|(user, count)| (Reverse(*count), *user));

    let standings: Vec<Standing> = sorted
        .iter()
        .enumerate()
        .map(|(i, (user, count))| Standing {
            rank: i + 1,
            user: *user,
            count: *count,
        })
        .collect();

    let viewer = viewer.and_then(|viewer| {
        match standings.iter().position(|s| s.user == viewer) {
            Some(pos) if pos < limit => None,
            Some(pos) => Some(standings[pos].clone()),
            None => Some(Standing {
                rank: standings.len() + 1,
                user: viewer,
                count: 0,
            }),
        }
    });

    Leaderboard {
        total_tracks: counts.values().sum(),
        rows: standings.into_iter().take(limit).collect(),
        viewer,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentSubmission {
    pub rank: usize,
    pub user: UserId,
    pub track_id: String,
    pub time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentBoard {
    pub rows: Vec<RecentSubmission>,
    /// The viewer's latest submission when it is not among `rows`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<RecentSubmission>,
}

/// Each user's latest submission, newest first.
pub fn recent_submissions(
    times: &BTreeMap<UserId, i64>,
    ids: &BTreeMap<UserId, String>,
    viewer: Option<UserId>,
    limit: usize,
) -> RecentBoard {
    let mut sorted: Vec<(UserId, i64)> = times.iter().map(|(u, t)| (*u, *t)).collect();
    sorted.sort_by_key(|(user, time)| (Reverse(*time), *user));

    let all: Vec<RecentSubmission> = sorted
        .into_iter()
        .filter_map(|(user, time)| ids.get(&user).map(|id| (user, time, id)))
        .enumerate()
        .map(|(i, (user, time, id))| RecentSubmission {
            rank: i + 1,
            user,
            track_id: id.clone(),
            time,
        })
        .collect();

    let viewer = viewer.and_then(|viewer| {
        all.iter()
            .position(|r| r.user == viewer)
            .filter(|pos| *pos >= limit)
            .map(|pos| all[pos].clone())
    });

    RecentBoard {
        rows: all.into_iter().take(limit).collect(),
        viewer,
    }
}

/// A random track from `user`'s submissions, or from everyone's.
pub fn random_track<'a, R>(
    tracks: &'a BTreeMap<UserId, Vec<String>>,
    user: Option<UserId>,
    rng: &mut R,
) -> Option<&'a str>
where
    R: Rng + ?Sized,
{
    let pool: Vec<&String> = match user {
        Some(user) => tracks.get(&user)?.iter().collect(),
        None => tracks.values().flatten().collect(),
    };
    pool.choose(rng).copied().map(String::as_str)
}

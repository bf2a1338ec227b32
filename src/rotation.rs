//! Monthly epoch rotation.
//!
//! Checks run at a few fixed UTC times of day. A check rotates only on the
//! first day of a month and only when the current epoch is old enough, so a
//! playlist created late in a month is kept through the next one.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Days, NaiveTime, Utc};
use playlog_config::{parse_check_time, RotationConfig};
use serde::Serialize;
use tracing::{debug, info};

use crate::manager::PlaylistManager;

const SECS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationDecision {
    NotFirstOfPeriod,
    TooYoung { age_days: i64 },
    Rotate { age_days: i64 },
}

/// When to check and how old an epoch must be to retire.
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    min_age_days: i64,
    check_times: Vec<NaiveTime>,
}

impl RotationPolicy {
    pub fn new(min_age_days: u32, mut check_times: Vec<NaiveTime>) -> Self {
        check_times.sort();
        check_times.dedup();
        Self {
            min_age_days: i64::from(min_age_days),
            check_times,
        }
    }

    pub fn from_config(config: &RotationConfig) -> Result<Self> {
        let check_times = config
            .check_times
            .iter()
            .map(|value| {
                let (hour, minute) = parse_check_time(value)?;
                NaiveTime::from_hms_opt(hour, minute, 0)
                    .with_context(|| format!("invalid check time '{}'", value))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(config.min_age_days, check_times))
    }

    pub fn check_times(&self) -> &[NaiveTime] {
        &self.check_times
    }

    /// Whether an epoch created at `creation_time` should rotate at `now`.
    pub fn evaluate(&self, now: DateTime<Utc>, creation_time: i64) -> RotationDecision {
        let age_days = (now.timestamp() - creation_time).div_euclid(SECS_PER_DAY);
        if now.day() != 1 {
            RotationDecision::NotFirstOfPeriod
        } else if age_days < self.min_age_days {
            RotationDecision::TooYoung { age_days }
        } else {
            RotationDecision::Rotate { age_days }
        }
    }

    /// First check time strictly after `now`.
    pub fn next_check_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        let later_today = self
            .check_times
            .iter()
            .map(|time| today.and_time(*time).and_utc())
            .find(|at| *at > now);
        if later_today.is_some() {
            return later_today;
        }

        let tomorrow = today.checked_add_days(Days::new(1))?;
        self.check_times
            .first()
            .map(|time| tomorrow.and_time(*time).and_utc())
    }
}

/// Links of the retired and the new epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rotation {
    pub old_link: String,
    pub new_link: String,
}

#[derive(Debug, Clone)]
pub struct RotationController {
    policy: RotationPolicy,
}

impl RotationController {
    pub fn new(policy: RotationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Time to wait from `now` until the next check.
    pub fn until_next_check(&self, now: DateTime<Utc>) -> Option<Duration> {
        let next = self.policy.next_check_after(now)?;
        Some((next - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Run one check, swapping the manager to a new playlist when due.
    pub async fn check(
        &self,
        manager: &mut PlaylistManager,
        now: DateTime<Utc>,
    ) -> Result<Option<Rotation>> {
        match self.policy.evaluate(now, manager.creation_time()) {
            RotationDecision::NotFirstOfPeriod => {
                debug!(%now, "Rotation check: not the first day of the month");
                Ok(None)
            }
            RotationDecision::TooYoung { age_days } => {
                debug!(
                    %now,
                    age_days,
                    min_age_days = self.policy.min_age_days,
                    "Rotation check: current playlist is too young"
                );
                Ok(None)
            }
            RotationDecision::Rotate { age_days } => {
                let old_link = manager.playlist_link();
                manager.swap_to_new_playlist(None, now).await?;
                let new_link = manager.playlist_link();
                info!(
                    age_days,
                    old = %old_link,
                    new = %new_link,
                    "Rotated to a new playlist"
                );
                Ok(Some(Rotation { old_link, new_link }))
            }
        }
    }
}

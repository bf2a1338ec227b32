//! JSON-lines event driver.
//!
//! Stands in for a chat front-end: each input line is one [`Event`], each
//! output line one [`Reply`]. Events and rotation checks run on the same
//! task, so the ledger only ever has one writer.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use playlog_ledger::UserId;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::attribution::RelayAttributor;
use crate::links::{extract_playlist_id, extract_track_id, find_track_links, track_url};
use crate::manager::{AddOutcome, PlaylistManager};
use crate::rotation::RotationController;
use crate::service::TrackMetadata;
use crate::stats::{self, Leaderboard, RecentBoard, DEFAULT_BOARD_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A chat message: may invoke the relay agent, carry track links, or both.
    Message { author: UserId, text: String },
    /// Explicit submission of one link.
    Add { user: UserId, url: String },
    Remove { user: UserId, url: String },
    Leaderboard { viewer: Option<UserId> },
    Recent { viewer: Option<UserId> },
    LastTrack { user: UserId },
    Random { user: Option<UserId> },
    Playlist,
    /// Start a new epoch, optionally bound to an existing playlist link.
    NewPlaylist { url: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Queued { user: UserId },
    Added { user: UserId, track_id: String },
    Duplicate { user: UserId, track_id: String },
    NotATrackLink { url: String },
    Leaderboard(Leaderboard),
    Recent(RecentBoard),
    LastTrack {
        user: UserId,
        #[serde(skip_serializing_if = "Option::is_none")]
        track: Option<TrackMetadata>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time: Option<i64>,
    },
    Random { url: Option<String> },
    Playlist { link: String },
    Rotated { old_link: String, new_link: String },
    Error { message: String },
}

impl Reply {
    fn from_outcome(user: UserId, url: &str, outcome: AddOutcome) -> Self {
        match outcome {
            AddOutcome::Added { track_id } => Reply::Added { user, track_id },
            AddOutcome::Duplicate { track_id } => Reply::Duplicate { user, track_id },
            AddOutcome::NotATrackLink => Reply::NotATrackLink {
                url: url.to_string(),
            },
        }
    }
}

/// Source of the wall-clock time used for rotation checks and new epochs.
pub type Clock = fn() -> DateTime<Utc>;

pub struct EventDriver {
    manager: PlaylistManager,
    attributor: RelayAttributor,
    rotation: Option<RotationController>,
    clock: Clock,
}

impl EventDriver {
    pub fn new(
        manager: PlaylistManager,
        attributor: RelayAttributor,
        rotation: Option<RotationController>,
    ) -> Self {
        Self {
            manager,
            attributor,
            rotation,
            clock: Utc::now,
        }
    }

    /// Replace the wall clock, e.g. with one that follows tokio's paused time.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn manager(&self) -> &PlaylistManager {
        &self.manager
    }

    pub fn attributor(&self) -> &RelayAttributor {
        &self.attributor
    }

    /// Process events until the input ends or `shutdown` completes.
    pub async fn run<R, W, S>(&mut self, reader: R, mut writer: W, shutdown: S) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        let mut lines = reader.lines();
        tokio::pin!(shutdown);

        loop {
            let next_check = self
                .rotation
                .as_ref()
                .and_then(|rotation| rotation.until_next_check((self.clock)()));

            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read event")? else {
                        info!("Input closed");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let replies = self.handle_line(&line).await;
                    write_replies(&mut writer, &replies).await?;
                }
                _ = sleep_for(next_check) => {
                    if let Some(reply) = self.check_rotation().await {
                        write_replies(&mut writer, &[reply]).await?;
                    }
                }
                _ = &mut shutdown => {
                    break;
                }
            }
        }

        writer.flush().await.context("Failed to flush replies")?;
        Ok(())
    }

    /// Decode and handle one input line. Failures become error replies.
    pub async fn handle_line(&mut self, line: &str) -> Vec<Reply> {
        let event: Event = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed event");
                return vec![Reply::Error {
                    message: format!("malformed event: {}", e),
                }];
            }
        };

        debug!(?event, "Handling event");
        match self.handle(event).await {
            Ok(replies) => replies,
            Err(e) => {
                let message = format!("{:#}", e);
                error!(error = %message, "Event failed");
                vec![Reply::Error { message }]
            }
        }
    }

    pub async fn handle(&mut self, event: Event) -> Result<Vec<Reply>> {
        match event {
            Event::Message { author, text } => self.on_message(author, &text).await,
            Event::Add { user, url } => {
                let outcome = self.manager.add_to_playlist(user, &url).await?;
                Ok(vec![Reply::from_outcome(user, &url, outcome)])
            }
            Event::Remove { user, url } => {
                info!(%user, %url, "Removal requested");
                let ids: Vec<String> = extract_track_id(&url).into_iter().collect();
                self.manager.remove_from_playlist(&ids)?;
                Ok(Vec::new())
            }
            Event::Leaderboard { viewer } => {
                let counts = self.manager.ledger().all_track_counts()?;
                Ok(vec![Reply::Leaderboard(stats::leaderboard(
                    &counts,
                    viewer,
                    DEFAULT_BOARD_SIZE,
                ))])
            }
            Event::Recent { viewer } => {
                let ledger = self.manager.ledger();
                let board = stats::recent_submissions(
                    &ledger.all_last_track_times()?,
                    &ledger.all_last_track_ids()?,
                    viewer,
                    DEFAULT_BOARD_SIZE,
                );
                Ok(vec![Reply::Recent(board)])
            }
            Event::LastTrack { user } => self.last_track(user).await,
            Event::Random { user } => {
                let tracks = self.manager.ledger().all_tracks()?;
                let url =
                    stats::random_track(&tracks, user, &mut rand::thread_rng()).map(track_url);
                Ok(vec![Reply::Random { url }])
            }
            Event::Playlist => Ok(vec![Reply::Playlist {
                link: self.manager.playlist_link(),
            }]),
            Event::NewPlaylist { url } => {
                let now = (self.clock)();
                match url {
                    None => self.manager.swap_to_new_playlist(None, now).await?,
                    Some(url) => {
                        let playlist_id = extract_playlist_id(&url)
                            .with_context(|| format!("Invalid playlist link: {}", url))?;
                        self.manager
                            .create_from_existing_playlist(&playlist_id, None, now)?;
                    }
                }
                Ok(vec![Reply::Playlist {
                    link: self.manager.playlist_link(),
                }])
            }
        }
    }

    async fn on_message(&mut self, author: UserId, text: &str) -> Result<Vec<Reply>> {
        let mut replies = Vec::new();
        if self.attributor.observe_command(author, text) {
            replies.push(Reply::Queued { user: author });
        }

        let links = find_track_links(text);
        if links.is_empty() {
            return Ok(replies);
        }

        // One relay post is one request, however many links it carries.
        let submitter = self.attributor.submitter_for(author);
        for url in links {
            let outcome = self.manager.add_to_playlist(submitter, url).await?;
            replies.push(Reply::from_outcome(submitter, url, outcome));
        }
        Ok(replies)
    }

    async fn last_track(&self, user: UserId) -> Result<Vec<Reply>> {
        let ledger = self.manager.ledger();
        let Some(track_id) = ledger.last_track_id(user)? else {
            return Ok(vec![Reply::LastTrack {
                user,
                track: None,
                time: None,
            }]);
        };
        let time = ledger.last_track_time(user)?;
        let track = self
            .manager
            .service()
            .item_metadata(&[track_id])
            .await?
            .into_iter()
            .next();
        Ok(vec![Reply::LastTrack { user, track, time }])
    }

    /// Run a scheduled rotation check. Failures are logged; the next
    /// scheduled check retries.
    pub async fn check_rotation(&mut self) -> Option<Reply> {
        let rotation = self.rotation.as_ref()?;
        match rotation.check(&mut self.manager, (self.clock)()).await {
            Ok(Some(rotated)) => Some(Reply::Rotated {
                old_link: rotated.old_link,
                new_link: rotated.new_link,
            }),
            Ok(None) => None,
            Err(e) => {
                error!(error = ?e, "Rotation check failed");
                None
            }
        }
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

async fn write_replies<W>(writer: &mut W, replies: &[Reply]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for reply in replies {
        let mut line = serde_json::to_vec(reply).context("Failed to encode reply")?;
        line.push(b'\n');
        writer
            .write_all(&line)
            .await
            .context("Failed to write reply")?;
    }
    writer.flush().await.context("Failed to flush replies")?;
    Ok(())
}

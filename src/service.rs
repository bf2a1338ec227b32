//! External music service capability.
//!
//! The ledger never talks to the network itself; playlist creation and item
//! updates go through [`PlaylistService`]. Only a dry-run implementation
//! ships with the crate.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// Display data for one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackMetadata {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub url: String,
}

#[async_trait]
pub trait PlaylistService: Send + Sync {
    /// Create a playlist and return its id.
    async fn create_playlist(&self, name: &str, description: &str) -> Result<String>;

    async fn add_item(&self, playlist_id: &str, item_id: &str) -> Result<()>;

    /// Metadata for `item_ids`, in the same order.
    async fn item_metadata(&self, item_ids: &[String]) -> Result<Vec<TrackMetadata>>;

    /// Public link to a playlist.
    fn playlist_link(&self, playlist_id: &str) -> String;
}

/// Service that logs every call and touches nothing.
#[derive(Debug)]
pub struct DryRunService {
    link_base: String,
    created: AtomicU64,
}

impl DryRunService {
    pub fn new(link_base: impl Into<String>) -> Self {
        Self {
            link_base: link_base.into(),
            created: AtomicU64::new(0),
        }
    }
}

impl Default for DryRunService {
    fn default() -> Self {
        Self::new("http://localhost:5000/playlist/")
    }
}

#[async_trait]
impl PlaylistService for DryRunService {
    async fn create_playlist(&self, name: &str, description: &str) -> Result<String> {
        let n = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("dry-run-{}", n);
        info!(name, description, playlist = %id, "Dry run: creating playlist");
        Ok(id)
    }

    async fn add_item(&self, playlist_id: &str, item_id: &str) -> Result<()> {
        info!(playlist = playlist_id, item = item_id, "Dry run: adding item");
        Ok(())
    }

    async fn item_metadata(&self, item_ids: &[String]) -> Result<Vec<TrackMetadata>> {
        Ok(item_ids
            .iter()
            .map(|id| TrackMetadata {
                id: id.clone(),
                name: "Track".to_string(),
                artist: "Artist".to_string(),
                url: crate::links::track_url(id),
            })
            .collect())
    }

    fn playlist_link(&self, playlist_id: &str) -> String {
        format!("{}{}", self.link_base, playlist_id)
    }
}

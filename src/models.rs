// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Lifecycle state of a queued download.
///
/// `Queued -> Downloading -> {Completed, Skipped, Failed}` and
/// `Queued -> Cancelled`. The last four are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Queued,
    Downloading,
    Completed,
    Skipped,
    Failed,
    Cancelled,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Skipped | ItemStatus::Failed | ItemStatus::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Skip and Fail are also accepted straight from Queued: the existence
    /// precheck and UI-side failures both happen before a download starts.
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        match (self, next) {
            (Queued, Downloading) => true,
            (Queued, Cancelled) => true,
            (Queued | Downloading, Skipped | Failed) => true,
            (Downloading, Completed) => true,
            _ => false,
        }
    }
}

/// One in-flight or finished download, as shown in the UI queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadItem {
    pub id: String,
    pub status: ItemStatus,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    pub spotify_id: String,

    pub file_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub size_mb: Option<f64>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DownloadItem {
    pub fn new(
        id: String,
        track_name: impl Into<String>,
        artist_name: impl Into<String>,
        album_name: impl Into<String>,
        spotify_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            status: ItemStatus::Queued,
            track_name: track_name.into(),
            artist_name: artist_name.into(),
            album_name: album_name.into(),
            spotify_id: spotify_id.into(),
            file_path: None,
            error_message: None,
            size_mb: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// A completed download as persisted by the history store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryItem {
    /// Row id, assigned by the store on append.
    #[serde(default)]
    pub id: i64,
    pub spotify_id: String,
    pub title: String,
    pub artists: String,
    pub album: String,
    pub duration_str: String,
    pub cover_url: String,
    pub quality: String,
    pub format: String,
    pub path: String,
    /// Unix seconds, assigned by the store on append.
    #[serde(default)]
    pub timestamp: i64,
}

/// Stream properties read back from a finished file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioProperties {
    pub bit_depth: Option<u8>,
    pub sample_rate: Option<u32>,
    pub duration: Duration,
}

impl AudioProperties {
    /// `"24-bit/96.0kHz"`, or `None` when either half is unknown.
    pub fn quality_label(&self) -> Option<String> {
        match (self.bit_depth, self.sample_rate) {
            (Some(bits), Some(rate)) => Some(format!("{}-bit/{:.1}kHz", bits, rate as f64 / 1000.0)),
            _ => None,
        }
    }

    /// `"m:ss"`.
    pub fn duration_label(&self) -> String {
        let secs = self.duration.as_secs();
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

/// Descriptive fields fetched from the Spotify data source to fill gaps in a
/// request. Zero / empty means "not known".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackMetadata {
    #[serde(default)]
    pub copyright: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub total_discs: u32,
    #[serde(default)]
    pub total_tracks: u32,
    #[serde(default)]
    pub track_number: u32,
    #[serde(default)]
    pub release_date: String,
}

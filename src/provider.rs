// src/provider.rs

//! Contracts of the external services the orchestrator drives.
//!
//! Each provider is a black box with a narrow "resolve and fetch" surface.
//! Retry and backoff, if any, live inside the implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::history::HistoryError;
use crate::isrc::Isrc;
use crate::lyrics::Lyrics;
use crate::models::{AudioProperties, HistoryItem, TrackMetadata};
use crate::request::TrackJob;
use crate::tagging::TagError;

/// Errors a provider strategy reports. Treated the same regardless of source.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("{0}")]
    Other(String),
    #[error("all {} mirrors failed: {}", .0.len(), .0.join("; "))]
    AllMirrorsFailed(Vec<String>),
    #[error("no mirrors available")]
    NoMirrors,
}

/// A provider's successful result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// A new file was written.
    Created(PathBuf),
    /// The provider found the track already present and wrote nothing.
    AlreadyExists(PathBuf),
}

impl DownloadOutcome {
    pub fn path(&self) -> &Path {
        match self {
            DownloadOutcome::Created(path) | DownloadOutcome::AlreadyExists(path) => path,
        }
    }
}

/// A provider's failed result. `partial` names a file the attempt created and
/// did not finish; the caller removes it.
#[derive(Debug)]
pub struct ProviderFailure {
    pub error: ProviderError,
    pub partial: Option<PathBuf>,
}

impl ProviderFailure {
    pub fn new(error: impl Into<ProviderError>) -> Self {
        Self {
            error: error.into(),
            partial: None,
        }
    }

    pub fn with_partial(error: impl Into<ProviderError>, partial: impl Into<PathBuf>) -> Self {
        Self {
            error: error.into(),
            partial: Some(partial.into()),
        }
    }
}

impl From<ProviderError> for ProviderFailure {
    fn from(error: ProviderError) -> Self {
        ProviderFailure::new(error)
    }
}

impl From<std::io::Error> for ProviderFailure {
    fn from(error: std::io::Error) -> Self {
        ProviderFailure::new(error)
    }
}

impl From<reqwest::Error> for ProviderFailure {
    fn from(error: reqwest::Error) -> Self {
        ProviderFailure::new(error)
    }
}

pub type ProviderResult = Result<DownloadOutcome, ProviderFailure>;

#[async_trait]
pub trait AmazonProvider: Send + Sync {
    async fn download_by_url(&self, url: &str, job: &TrackJob) -> ProviderResult;
    async fn download_by_spotify_id(&self, spotify_id: &str, job: &TrackJob) -> ProviderResult;
}

#[async_trait]
pub trait TidalProvider: Send + Sync {
    /// Upstream API mirrors the client knows about, in preference order.
    fn mirrors(&self) -> Vec<String>;
    async fn download_by_url(&self, api_base: &str, url: &str, job: &TrackJob) -> ProviderResult;
    async fn download_by_spotify_id(&self, api_base: &str, spotify_id: &str, job: &TrackJob) -> ProviderResult;
}

#[async_trait]
pub trait QobuzProvider: Send + Sync {
    async fn download_by_isrc(&self, isrc: &Isrc, job: &TrackJob) -> ProviderResult;
}

/// Spotify ID to the same track's URL on the ISRC-bearing service.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve_cross_service_url(&self, spotify_id: &str) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait IsrcResolver: Send + Sync {
    async fn resolve_isrc_from_url(&self, url: &str) -> Result<Isrc, ProviderError>;
}

/// Spotify track data used to backfill missing request fields.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_track_metadata(&self, url: &str) -> Result<TrackMetadata, ProviderError>;
}

#[async_trait]
pub trait LyricsSource: Send + Sync {
    /// `Ok(None)` when every source answered but none had lyrics.
    async fn fetch_lyrics(
        &self,
        spotify_id: &str,
        track_name: &str,
        artist_name: &str,
    ) -> Result<Option<(Lyrics, String)>, ProviderError>;
}

/// Reads and writes tags of a finished audio file.
#[async_trait]
pub trait AudioTagger: Send + Sync {
    async fn embed_lyrics(&self, path: &Path, lrc: &str) -> Result<(), TagError>;
    async fn read_properties(&self, path: &Path) -> Result<AudioProperties, TagError>;
}

/// Where completed downloads are recorded.
#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn append(&self, item: HistoryItem, namespace: &str) -> Result<(), HistoryError>;
}

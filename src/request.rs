// src/request.rs

//! The download request as the UI sends it, and its normalized form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::isrc::Isrc;
use crate::models::TrackMetadata;
use crate::naming::{self, FilenameSpec, DEFAULT_FILENAME_FORMAT};

pub const DEFAULT_AUDIO_FORMAT: &str = "LOSSLESS";

/// Requests that are rejected before any I/O or queue registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown service: {0}")]
    UnknownService(String),
    #[error("Spotify ID or ISRC is required for Qobuz")]
    QobuzIdentityMissing,
    #[error("Spotify ID is required for {0}")]
    SpotifyIdMissing(Service),
}

/// External music source a request is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Amazon,
    Tidal,
    Qobuz,
}

impl Service {
    pub fn as_str(self) -> &'static str {
        match self {
            Service::Amazon => "amazon",
            Service::Tidal => "tidal",
            Service::Qobuz => "qobuz",
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            Service::Amazon => "Amazon Music",
            Service::Tidal => "Tidal",
            Service::Qobuz => "Qobuz",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Service {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "tidal" => Ok(Service::Tidal),
            "amazon" => Ok(Service::Amazon),
            "qobuz" => Ok(Service::Qobuz),
            other => Err(ValidationError::UnknownService(other.to_string())),
        }
    }
}

/// Which Tidal API a request goes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TidalApi {
    /// Walk the mirror list until one succeeds.
    Auto,
    /// One fixed base URL, no fallback.
    Fixed(String),
}

/// A download request exactly as submitted. Empty strings and zeroes mean
/// "not provided".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadRequest {
    pub isrc: String,
    pub service: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    pub album_artist: String,
    pub release_date: String,
    pub cover_url: String,
    pub api_url: String,
    pub output_dir: String,
    pub audio_format: String,
    pub filename_format: String,
    pub track_number: bool,
    pub position: u32,
    pub use_album_track_number: bool,
    pub spotify_id: String,
    pub embed_lyrics: bool,
    pub embed_max_quality_cover: bool,
    pub service_url: String,
    pub duration: u32,
    pub item_id: String,
    pub spotify_track_number: u32,
    pub spotify_disc_number: u32,
    pub spotify_total_tracks: u32,
    pub spotify_total_discs: u32,
    pub copyright: String,
    pub publisher: String,
}

/// A validated request with every default applied. This is what the provider
/// strategies see.
#[derive(Debug, Clone)]
pub struct TrackJob {
    pub service: Service,
    pub item_id: Option<String>,
    pub isrc: Option<Isrc>,
    pub spotify_id: Option<String>,
    pub service_url: Option<String>,
    pub tidal_api: TidalApi,

    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    pub album_artist: String,
    pub release_date: String,
    pub cover_url: String,
    pub copyright: String,
    pub publisher: String,
    pub duration_secs: u32,

    pub output_dir: PathBuf,
    pub audio_format: String,
    pub filename_format: String,
    pub include_track_number: bool,
    pub position: u32,
    pub use_album_track_number: bool,
    pub track_number: u32,
    pub disc_number: u32,
    pub total_tracks: u32,
    pub total_discs: u32,

    pub embed_lyrics: bool,
    pub embed_max_quality_cover: bool,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl DownloadRequest {
    /// Applies defaults and checks provider preconditions. Performs no I/O.
    pub fn normalize(self) -> Result<TrackJob, ValidationError> {
        let service: Service = self.service.trim().parse()?;

        let isrc = Isrc::parse(&self.isrc);
        let spotify_id = non_empty(self.spotify_id);
        let service_url = non_empty(self.service_url);

        match service {
            Service::Qobuz if isrc.is_none() && spotify_id.is_none() => {
                return Err(ValidationError::QobuzIdentityMissing);
            }
            Service::Amazon | Service::Tidal if service_url.is_none() && spotify_id.is_none() => {
                return Err(ValidationError::SpotifyIdMissing(service));
            }
            _ => {}
        }

        let tidal_api = match non_empty(self.api_url) {
            None => TidalApi::Auto,
            Some(url) if url == "auto" => TidalApi::Auto,
            Some(url) => TidalApi::Fixed(url),
        };

        Ok(TrackJob {
            service,
            item_id: non_empty(self.item_id),
            isrc,
            spotify_id,
            service_url,
            tidal_api,
            track_name: self.track_name,
            artist_name: self.artist_name,
            album_name: self.album_name,
            album_artist: self.album_artist,
            release_date: self.release_date,
            cover_url: self.cover_url,
            copyright: self.copyright,
            publisher: self.publisher,
            duration_secs: self.duration,
            output_dir: naming::normalize_path(&self.output_dir),
            audio_format: non_empty(self.audio_format).unwrap_or_else(|| DEFAULT_AUDIO_FORMAT.to_string()),
            filename_format: non_empty(self.filename_format)
                .unwrap_or_else(|| DEFAULT_FILENAME_FORMAT.to_string()),
            include_track_number: self.track_number,
            position: self.position,
            use_album_track_number: self.use_album_track_number,
            track_number: self.spotify_track_number,
            disc_number: self.spotify_disc_number,
            total_tracks: self.spotify_total_tracks,
            total_discs: self.spotify_total_discs,
            embed_lyrics: self.embed_lyrics,
            embed_max_quality_cover: self.embed_max_quality_cover,
        })
    }
}

impl TrackJob {
    pub fn spotify_url(&self) -> Option<String> {
        self.spotify_id
            .as_deref()
            .map(|id| format!("https://open.spotify.com/track/{id}"))
    }

    /// Whether any field the Spotify backfill can supply is still missing.
    pub fn needs_metadata_backfill(&self) -> bool {
        self.spotify_id.is_some()
            && (self.copyright.is_empty()
                || self.publisher.is_empty()
                || self.total_discs == 0
                || self.release_date.is_empty()
                || self.total_tracks == 0
                || self.track_number == 0)
    }

    /// Copies fetched metadata into fields the caller left empty. Values the
    /// caller supplied are never overridden.
    pub fn fill_missing(&mut self, meta: TrackMetadata) {
        if self.copyright.is_empty() && !meta.copyright.is_empty() {
            self.copyright = meta.copyright;
        }
        if self.publisher.is_empty() && !meta.publisher.is_empty() {
            self.publisher = meta.publisher;
        }
        if self.total_discs == 0 {
            self.total_discs = meta.total_discs;
        }
        if self.total_tracks == 0 {
            self.total_tracks = meta.total_tracks;
        }
        if self.track_number == 0 {
            self.track_number = meta.track_number;
        }
        if self.release_date.is_empty() && !meta.release_date.is_empty() {
            self.release_date = meta.release_date;
        }
    }

    pub fn has_names(&self) -> bool {
        !self.track_name.is_empty() && !self.artist_name.is_empty()
    }

    pub fn filename_spec(&self) -> FilenameSpec<'_> {
        FilenameSpec {
            track_name: &self.track_name,
            artist_name: &self.artist_name,
            album_name: &self.album_name,
            album_artist: &self.album_artist,
            release_date: &self.release_date,
            format: &self.filename_format,
            include_track_number: self.include_track_number,
            position: self.position,
            album_track_number: self.track_number,
            disc_number: self.disc_number,
            use_album_track_number: self.use_album_track_number,
        }
    }

    /// Where the finished file is expected to land.
    pub fn expected_path(&self) -> PathBuf {
        self.output_dir.join(naming::expected_filename(&self.filename_spec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tidal_request() -> DownloadRequest {
        DownloadRequest {
            spotify_id: "abc123".into(),
            track_name: "X".into(),
            artist_name: "Y".into(),
            ..Default::default()
        }
    }

    #[test]
    fn free_text_query_is_not_an_identity() {
        // every provider needs a concrete identifier; a bare search query is dropped
        let request: DownloadRequest =
            serde_json::from_str(r#"{"service": "tidal", "query": "x y", "track_name": "X"}"#).unwrap();
        assert_eq!(
            request.normalize().unwrap_err(),
            ValidationError::SpotifyIdMissing(Service::Tidal)
        );
    }

    #[test]
    fn defaults_are_applied() {
        let job = tidal_request().normalize().unwrap();
        assert_eq!(job.service, Service::Tidal);
        assert_eq!(job.output_dir, PathBuf::from("."));
        assert_eq!(job.audio_format, "LOSSLESS");
        assert_eq!(job.filename_format, "title-artist");
        assert_eq!(job.tidal_api, TidalApi::Auto);
        assert_eq!(job.expected_path(), PathBuf::from("./X - Y.flac"));
    }

    #[test]
    fn explicit_tidal_api_is_fixed_unless_auto() {
        let mut req = tidal_request();
        req.api_url = "auto".into();
        assert_eq!(req.clone().normalize().unwrap().tidal_api, TidalApi::Auto);
        req.api_url = "https://api.example.org".into();
        assert_eq!(
            req.normalize().unwrap().tidal_api,
            TidalApi::Fixed("https://api.example.org".into())
        );
    }

    #[test]
    fn unknown_service_is_rejected() {
        let mut req = tidal_request();
        req.service = "napster".into();
        assert_eq!(
            req.normalize().unwrap_err(),
            ValidationError::UnknownService("napster".into())
        );
    }

    #[test]
    fn qobuz_needs_isrc_or_spotify_id() {
        let req = DownloadRequest {
            service: "qobuz".into(),
            track_name: "X".into(),
            artist_name: "Y".into(),
            ..Default::default()
        };
        assert_eq!(req.clone().normalize().unwrap_err(), ValidationError::QobuzIdentityMissing);

        let with_bad_isrc = DownloadRequest { isrc: "nope".into(), ..req.clone() };
        assert_eq!(with_bad_isrc.normalize().unwrap_err(), ValidationError::QobuzIdentityMissing);

        let with_isrc = DownloadRequest { isrc: "USUM71703861".into(), ..req };
        let job = with_isrc.normalize().unwrap();
        assert_eq!(job.isrc.unwrap().as_str(), "USUM71703861");
    }

    #[test]
    fn amazon_without_url_needs_spotify_id() {
        let req = DownloadRequest {
            service: "amazon".into(),
            isrc: "USUM71703861".into(),
            ..Default::default()
        };
        assert_eq!(
            req.clone().normalize().unwrap_err(),
            ValidationError::SpotifyIdMissing(Service::Amazon)
        );
        let with_url = DownloadRequest { service_url: "https://music.amazon.com/x".into(), ..req };
        assert!(with_url.normalize().is_ok());
    }

    #[test]
    fn backfill_needed_only_with_spotify_id_and_gaps() {
        let mut job = tidal_request().normalize().unwrap();
        assert!(job.needs_metadata_backfill());
        job.copyright = "c".into();
        job.publisher = "p".into();
        job.total_discs = 1;
        job.total_tracks = 10;
        job.track_number = 3;
        job.release_date = "2020-01-01".into();
        assert!(!job.needs_metadata_backfill());
        job.copyright.clear();
        job.spotify_id = None;
        assert!(!job.needs_metadata_backfill());
    }

    #[test]
    fn fill_missing_keeps_caller_values() {
        let mut job = DownloadRequest {
            copyright: "mine".into(),
            spotify_track_number: 4,
            ..tidal_request()
        }
        .normalize()
        .unwrap();
        job.fill_missing(TrackMetadata {
            copyright: "theirs".into(),
            publisher: "Label".into(),
            total_discs: 2,
            total_tracks: 12,
            track_number: 9,
            release_date: "2019-05-01".into(),
        });
        assert_eq!(job.copyright, "mine");
        assert_eq!(job.track_number, 4);
        assert_eq!(job.publisher, "Label");
        assert_eq!(job.total_discs, 2);
        assert_eq!(job.total_tracks, 12);
        assert_eq!(job.release_date, "2019-05-01");
    }

    #[test]
    fn request_deserializes_from_ui_json() {
        let req: DownloadRequest = serde_json::from_str(
            r#"{"service":"tidal","spotify_id":"abc123","track_name":"X","artist_name":"Y","output_dir":"/tmp/out"}"#,
        )
        .unwrap();
        let job = req.normalize().unwrap();
        assert_eq!(job.expected_path(), PathBuf::from("/tmp/out/X - Y.flac"));
    }
}

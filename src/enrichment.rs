// src/enrichment.rs

//! Post-download work that runs on the orchestrator's background pool:
//! lyrics embedding and the history record. Nothing here reports back to the
//! download caller; failures end in a log line.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::history::HistoryError;
use crate::lyrics::render_lrc;
use crate::models::{AudioProperties, HistoryItem};
use crate::provider::{AudioTagger, HistoryLog, LyricsSource, ProviderError};
use crate::request::{TrackJob, DEFAULT_AUDIO_FORMAT};
use crate::tagging::TagError;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("lyrics lookup failed: {0}")]
    Lyrics(#[from] ProviderError),
    #[error("no lyrics found")]
    NoLyrics,
    #[error("tagging failed: {0}")]
    Tag(#[from] TagError),
    #[error("history append failed: {0}")]
    History(#[from] HistoryError),
}

/// What the lyrics task needs, detached from the request.
#[derive(Debug, Clone)]
pub struct LyricsTask {
    pub path: PathBuf,
    pub spotify_id: String,
    pub track_name: String,
    pub artist_name: String,
}

impl LyricsTask {
    /// Lyrics are embedded only when asked for, when a Spotify ID is known
    /// and when the output is a FLAC container.
    pub fn for_download(job: &TrackJob, path: &Path) -> Option<Self> {
        let is_flac = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("flac"));
        if !job.embed_lyrics || !is_flac {
            return None;
        }
        let spotify_id = job.spotify_id.clone()?;
        Some(Self {
            path: path.to_path_buf(),
            spotify_id,
            track_name: job.track_name.clone(),
            artist_name: job.artist_name.clone(),
        })
    }
}

/// The descriptive half of a history record; the quality half is read from
/// the file when the task runs.
#[derive(Debug, Clone)]
pub struct HistoryDraft {
    pub path: PathBuf,
    pub spotify_id: String,
    pub title: String,
    pub artists: String,
    pub album: String,
    pub cover_url: String,
    pub audio_format: String,
}

impl HistoryDraft {
    pub fn for_download(job: &TrackJob, path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            spotify_id: job.spotify_id.clone().unwrap_or_default(),
            title: job.track_name.clone(),
            artists: job.artist_name.clone(),
            album: job.album_name.clone(),
            cover_url: job.cover_url.clone(),
            audio_format: job.audio_format.clone(),
        }
    }

    /// Builds the stored record. Unreadable properties give `"Unknown"`
    /// quality and a `"--:--"` duration.
    pub fn into_item(self, properties: Option<&AudioProperties>) -> HistoryItem {
        let quality = properties
            .and_then(AudioProperties::quality_label)
            .unwrap_or_else(|| "Unknown".to_string());
        let duration_str = properties
            .map(AudioProperties::duration_label)
            .unwrap_or_else(|| "--:--".to_string());

        let mut format = self.audio_format;
        if format.is_empty() || format == DEFAULT_AUDIO_FORMAT {
            if let Some(ext) = self.path.extension().and_then(|e| e.to_str()).filter(|e| !e.is_empty()) {
                format = ext.to_uppercase();
            }
        }

        HistoryItem {
            id: 0,
            spotify_id: self.spotify_id,
            title: self.title,
            artists: self.artists,
            album: self.album,
            duration_str,
            cover_url: self.cover_url,
            quality,
            format,
            path: self.path.to_string_lossy().into_owned(),
            timestamp: 0,
        }
    }
}

pub async fn embed_lyrics(
    source: &dyn LyricsSource,
    tagger: &dyn AudioTagger,
    task: &LyricsTask,
) -> Result<(), EnrichmentError> {
    let (lyrics, origin) = source
        .fetch_lyrics(&task.spotify_id, &task.track_name, &task.artist_name)
        .await?
        .ok_or(EnrichmentError::NoLyrics)?;
    debug!(source = %origin, lines = lyrics.lines.len(), sync = ?lyrics.sync_type, "lyrics found");

    let lrc = render_lrc(&lyrics, &task.track_name, &task.artist_name);
    if lrc.is_empty() {
        return Err(EnrichmentError::NoLyrics);
    }
    tagger.embed_lyrics(&task.path, &lrc).await?;
    Ok(())
}

pub async fn record_history(
    tagger: &dyn AudioTagger,
    history: &dyn HistoryLog,
    namespace: &str,
    draft: HistoryDraft,
) -> Result<(), EnrichmentError> {
    let properties = match tagger.read_properties(&draft.path).await {
        Ok(properties) => Some(properties),
        Err(err) => {
            debug!(path = %draft.path.display(), error = %err, "could not read audio properties");
            None
        }
    };
    history.append(draft.into_item(properties.as_ref()), namespace).await?;
    Ok(())
}

/// Background entry point for the lyrics task.
pub async fn run_lyrics_task(source: &dyn LyricsSource, tagger: &dyn AudioTagger, task: LyricsTask) {
    match embed_lyrics(source, tagger, &task).await {
        Ok(()) => info!(path = %task.path.display(), "lyrics embedded"),
        Err(err) => warn!(path = %task.path.display(), error = %err, "lyrics embedding failed"),
    }
}

/// Background entry point for the history task.
pub async fn run_history_task(tagger: &dyn AudioTagger, history: &dyn HistoryLog, namespace: &str, draft: HistoryDraft) {
    let path = draft.path.clone();
    match record_history(tagger, history, namespace, draft).await {
        Ok(()) => debug!(path = %path.display(), "history record appended"),
        Err(err) => warn!(path = %path.display(), error = %err, "history append failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::DownloadRequest;
    use std::time::Duration;

    fn job(embed_lyrics: bool, spotify_id: &str) -> TrackJob {
        DownloadRequest {
            spotify_id: spotify_id.into(),
            service_url: "https://listen.tidal.com/track/1".into(),
            track_name: "X".into(),
            artist_name: "Y".into(),
            album_name: "Z".into(),
            embed_lyrics,
            ..Default::default()
        }
        .normalize()
        .unwrap()
    }

    #[test]
    fn lyrics_need_flag_spotify_id_and_flac() {
        let flac = Path::new("/tmp/X - Y.flac");
        assert!(LyricsTask::for_download(&job(true, "abc123"), flac).is_some());
        assert!(LyricsTask::for_download(&job(false, "abc123"), flac).is_none());
        assert!(LyricsTask::for_download(&job(true, ""), flac).is_none());
        assert!(LyricsTask::for_download(&job(true, "abc123"), Path::new("/tmp/X - Y.m4a")).is_none());
    }

    #[test]
    fn history_item_uses_properties_when_readable() {
        let draft = HistoryDraft::for_download(&job(false, "abc123"), Path::new("/tmp/X - Y.flac"));
        let props = AudioProperties {
            bit_depth: Some(24),
            sample_rate: Some(96_000),
            duration: Duration::from_secs(185),
        };
        let item = draft.into_item(Some(&props));
        assert_eq!(item.quality, "24-bit/96.0kHz");
        assert_eq!(item.duration_str, "3:05");
        assert_eq!(item.format, "FLAC");
        assert_eq!(item.spotify_id, "abc123");
        assert_eq!(item.path, "/tmp/X - Y.flac");
    }

    #[test]
    fn history_item_falls_back_when_unreadable() {
        let mut draft = HistoryDraft::for_download(&job(false, "abc123"), Path::new("/tmp/X - Y.flac"));
        draft.audio_format = "HI_RES".into();
        let item = draft.into_item(None);
        assert_eq!(item.quality, "Unknown");
        assert_eq!(item.duration_str, "--:--");
        assert_eq!(item.format, "HI_RES");
    }
}

// src/batch.rs

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::naming::{self, FilenameSpec, DEFAULT_FILENAME_FORMAT};

/// One track of a batch existence check, as the UI sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckFileExistenceRequest {
    pub spotify_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    pub album_artist: String,
    pub release_date: String,
    pub track_number: u32,
    pub disc_number: u32,
    pub position: u32,
    pub use_album_track_number: bool,
    pub filename_format: String,
    pub include_track_number: bool,
    pub audio_format: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFileExistenceResult {
    pub spotify_id: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    pub track_name: String,
    pub artist_name: String,
}

impl CheckFileExistenceRequest {
    /// Expected location of the track under `output_dir`, or `None` when the
    /// name or artist is missing.
    pub fn expected_path(&self, output_dir: &Path) -> Option<PathBuf> {
        if self.track_name.is_empty() || self.artist_name.is_empty() {
            return None;
        }
        let format = if self.filename_format.is_empty() {
            DEFAULT_FILENAME_FORMAT
        } else {
            self.filename_format.as_str()
        };
        let filename = naming::expected_filename(&FilenameSpec {
            track_name: &self.track_name,
            artist_name: &self.artist_name,
            album_name: &self.album_name,
            album_artist: &self.album_artist,
            release_date: &self.release_date,
            format,
            include_track_number: self.include_track_number,
            position: self.position,
            album_track_number: self.track_number,
            disc_number: self.disc_number,
            use_album_track_number: self.use_album_track_number,
        });

        let filename = if self.audio_format == "mp3" {
            match filename.strip_suffix(".flac") {
                Some(stem) => format!("{stem}.mp3"),
                None => filename,
            }
        } else {
            filename
        };
        Some(output_dir.join(filename))
    }

    async fn check(&self, output_dir: &Path) -> CheckFileExistenceResult {
        let mut result = CheckFileExistenceResult {
            spotify_id: self.spotify_id.clone(),
            exists: false,
            file_path: None,
            track_name: self.track_name.clone(),
            artist_name: self.artist_name.clone(),
        };
        if let Some(path) = self.expected_path(output_dir) {
            if naming::existing_file_size(&path).await.is_some() {
                result.exists = true;
                result.file_path = Some(path);
            }
        }
        result
    }
}

/// Checks every track concurrently, at most `limit` at a time. `results[i]`
/// always answers `tracks[i]`, whatever order the checks finish in.
pub async fn check_existence(
    output_dir: &str,
    tracks: &[CheckFileExistenceRequest],
    limit: usize,
) -> Vec<CheckFileExistenceResult> {
    if tracks.is_empty() {
        return Vec::new();
    }
    let output_dir = naming::normalize_path(output_dir);
    let output_dir = output_dir.as_path();

    let mut tagged: Vec<(usize, CheckFileExistenceResult)> = stream::iter(tracks.iter().enumerate())
        .map(|(index, track)| async move { (index, track.check(output_dir).await) })
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    tagged.sort_unstable_by_key(|(index, _)| *index);
    debug!(
        checked = tagged.len(),
        existing = tagged.iter().filter(|(_, r)| r.exists).count(),
        "batch existence check finished"
    );
    tagged.into_iter().map(|(_, result)| result).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str, artist: &str) -> CheckFileExistenceRequest {
        CheckFileExistenceRequest {
            spotify_id: format!("id-{title}"),
            track_name: title.into(),
            artist_name: artist.into(),
            ..Default::default()
        }
    }

    #[test]
    fn mp3_and_album_numbering_shape_the_path() {
        let dir = Path::new("/music");
        let mut t = track("X", "Y");
        t.audio_format = "mp3".into();
        assert_eq!(t.expected_path(dir), Some(PathBuf::from("/music/X - Y.mp3")));

        let mut t = track("X", "Y");
        t.include_track_number = true;
        t.position = 7;
        t.track_number = 3;
        t.use_album_track_number = true;
        assert_eq!(t.expected_path(dir), Some(PathBuf::from("/music/03. X - Y.flac")));
        t.use_album_track_number = false;
        assert_eq!(t.expected_path(dir), Some(PathBuf::from("/music/07. X - Y.flac")));
    }

    #[test]
    fn nameless_tracks_have_no_path() {
        assert_eq!(track("", "Y").expected_path(Path::new("/music")), None);
        assert_eq!(track("X", "").expected_path(Path::new("/music")), None);
    }

    #[tokio::test]
    async fn results_follow_input_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("B - Y.flac"), vec![0u8; 200 * 1024]).unwrap();
        std::fs::write(dir.path().join("D - Y.flac"), vec![0u8; 200 * 1024]).unwrap();
        std::fs::write(dir.path().join("C - Y.flac"), vec![0u8; 10]).unwrap();

        let tracks: Vec<_> = ["A", "B", "C", "D", "E"].iter().map(|t| track(t, "Y")).collect();
        let results = check_existence(&dir.path().to_string_lossy(), &tracks, 2).await;

        let ids: Vec<_> = results.iter().map(|r| r.spotify_id.as_str()).collect();
        assert_eq!(ids, vec!["id-A", "id-B", "id-C", "id-D", "id-E"]);
        let exists: Vec<_> = results.iter().map(|r| r.exists).collect();
        assert_eq!(exists, vec![false, true, false, true, false]);
        assert_eq!(results[1].file_path, Some(dir.path().join("B - Y.flac")));
        assert_eq!(results[2].file_path, None);
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        assert!(check_existence(".", &[], 4).await.is_empty());
    }
}

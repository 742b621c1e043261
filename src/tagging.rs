// src/tagging.rs

use async_trait::async_trait;
use lofty::config::WriteOptions;
use lofty::error::LoftyError;
use lofty::prelude::{AudioFile, TagExt, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::AudioProperties;
use crate::provider::AudioTagger;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("tag error: {0}")]
    Lofty(#[from] LoftyError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tagging task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("no writable tag in {0}")]
    NoTag(PathBuf),
}

/// Tag reader and writer backed by `lofty`. File access runs on the blocking
/// pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagger;

fn write_lyrics(path: &Path, lrc: &str) -> Result<(), TagError> {
    let mut tagged_file = Probe::open(path)?.read()?;

    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .primary_tag_mut()
        .ok_or_else(|| TagError::NoTag(path.to_path_buf()))?;

    tag.insert_text(ItemKey::Lyrics, lrc.to_string());
    tag.save_to_path(path, WriteOptions::default())?;
    Ok(())
}

fn read_properties(path: &Path) -> Result<AudioProperties, TagError> {
    let tagged_file = Probe::open(path)?.read()?;
    let properties = tagged_file.properties();
    Ok(AudioProperties {
        bit_depth: properties.bit_depth(),
        sample_rate: properties.sample_rate(),
        duration: properties.duration(),
    })
}

#[async_trait]
impl AudioTagger for LoftyTagger {
    async fn embed_lyrics(&self, path: &Path, lrc: &str) -> Result<(), TagError> {
        let path = path.to_path_buf();
        let lrc = lrc.to_string();
        tokio::task::spawn_blocking(move || write_lyrics(&path, &lrc)).await?
    }

    async fn read_properties(&self, path: &Path) -> Result<AudioProperties, TagError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_properties(&path)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// A FLAC stream with only a STREAMINFO block: 44.1 kHz, stereo, 16 bit,
    /// two seconds of samples, no frames.
    fn minimal_flac() -> Vec<u8> {
        let mut bytes = b"fLaC".to_vec();
        bytes.push(0x80); // last block, STREAMINFO
        bytes.extend_from_slice(&[0x00, 0x00, 0x22]);
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&[0; 6]);
        let packed: u64 = (44_100u64 << 44) | (1 << 41) | (15 << 36) | 88_200;
        bytes.extend_from_slice(&packed.to_be_bytes());
        bytes.extend_from_slice(&[0; 16]);
        bytes
    }

    #[tokio::test]
    async fn reads_stream_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.flac");
        std::fs::write(&path, minimal_flac()).unwrap();

        let props = LoftyTagger.read_properties(&path).await.unwrap();
        assert_eq!(props.bit_depth, Some(16));
        assert_eq!(props.sample_rate, Some(44_100));
        assert_eq!(props.duration, Duration::from_secs(2));
        assert_eq!(props.quality_label().as_deref(), Some("16-bit/44.1kHz"));
    }

    #[tokio::test]
    async fn embedded_lyrics_can_be_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.flac");
        std::fs::write(&path, minimal_flac()).unwrap();

        LoftyTagger
            .embed_lyrics(&path, "[00:01.00]hello")
            .await
            .unwrap();

        let tagged_file = Probe::open(&path).unwrap().read().unwrap();
        let lyrics = tagged_file
            .primary_tag()
            .and_then(|tag| tag.get_string(&ItemKey::Lyrics))
            .map(str::to_string);
        assert_eq!(lyrics.as_deref(), Some("[00:01.00]hello"));
    }

    #[tokio::test]
    async fn garbage_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stub.flac");
        std::fs::write(&path, b"<html>error</html>").unwrap();

        assert!(LoftyTagger.read_properties(&path).await.is_err());
        assert!(LoftyTagger.embed_lyrics(&path, "x").await.is_err());
    }
}

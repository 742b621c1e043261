// src/naming.rs

//! Expected-filename rendering and the "does it already exist" check.
//!
//! Everything here except [`existing_file_size`] is pure: the same inputs
//! always render the same filename, so the orchestrator, the batch checker and
//! the UI agree on where a track lives before anything is downloaded.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

/// A file at the expected path only counts as present when it is strictly
/// larger than this. Zero-byte and error-stub files fall under it.
pub const MIN_EXISTING_FILE_BYTES: u64 = 100 * 1024;

pub const DEFAULT_FILENAME_FORMAT: &str = "title-artist";

const EXPECTED_EXTENSION: &str = ".flac";

static TRACK_WITH_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{track\}\.\s*").expect("static track pattern"));
static TRACK_WITH_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{track\}\s*-\s*").expect("static track pattern"));
static TRACK_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{track\}\s*").expect("static track pattern"));

/// Inputs of [`expected_filename`].
#[derive(Debug, Clone, Default)]
pub struct FilenameSpec<'a> {
    pub track_name: &'a str,
    pub artist_name: &'a str,
    pub album_name: &'a str,
    pub album_artist: &'a str,
    pub release_date: &'a str,
    /// A preset (`title-artist`, `artist-title`, `title`) or a `{token}` template.
    pub format: &'a str,
    pub include_track_number: bool,
    /// Place of the track in the batch or playlist being downloaded.
    pub position: u32,
    /// Track number on its album, 0 when unknown.
    pub album_track_number: u32,
    pub disc_number: u32,
    pub use_album_track_number: bool,
}

/// Picks the number rendered for `{track}` and the `NN. ` prefix: the album
/// track number when asked for and known, the batch position otherwise.
pub fn resolve_track_number(position: u32, album_track_number: u32, use_album_track_number: bool) -> u32 {
    if use_album_track_number && album_track_number > 0 {
        album_track_number
    } else {
        position
    }
}

/// Renders the filename (with `.flac` extension) a track is stored under.
pub fn expected_filename(spec: &FilenameSpec<'_>) -> String {
    let title = sanitize_component(spec.track_name);
    let artist = sanitize_component(spec.artist_name);
    let album = sanitize_component(spec.album_name);
    let album_artist = sanitize_component(spec.album_artist);
    let year = release_year(spec.release_date);
    let track = resolve_track_number(spec.position, spec.album_track_number, spec.use_album_track_number);

    let stem = if spec.format.contains('{') {
        let mut rendered = spec
            .format
            .replace("{title}", &title)
            .replace("{artist}", &artist)
            .replace("{album_artist}", &album_artist)
            .replace("{album}", &album)
            .replace("{year}", year);

        rendered = if spec.disc_number > 0 {
            rendered.replace("{disc}", &spec.disc_number.to_string())
        } else {
            rendered.replace("{disc}", "")
        };

        if track > 0 {
            rendered.replace("{track}", &format!("{track:02}"))
        } else {
            let rendered = TRACK_WITH_DOT.replace_all(&rendered, "");
            let rendered = TRACK_WITH_DASH.replace_all(&rendered, "");
            TRACK_BARE.replace_all(&rendered, "").into_owned()
        }
    } else {
        let base = match spec.format {
            "artist-title" => format!("{artist} - {title}"),
            "title" => title.clone(),
            _ => format!("{title} - {artist}"),
        };
        if spec.include_track_number && track > 0 {
            format!("{track:02}. {base}")
        } else {
            base
        }
    };

    format!("{}{}", sanitize_component(&stem), EXPECTED_EXTENSION)
}

/// Makes one path component safe on every mainstream filesystem.
///
/// Reserved characters and control characters become spaces, whitespace runs
/// collapse, surrounding spaces and trailing dots go away. Never returns an
/// empty string.
pub fn sanitize_component(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches('.').trim();

    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

fn release_year(release_date: &str) -> &str {
    release_date.get(..4).unwrap_or("")
}

/// Lexically normalizes a user-supplied output directory. No filesystem access.
pub fn normalize_path(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() {
        return PathBuf::from(".");
    }

    let expanded = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => {
            match dirs::home_dir() {
                Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
                None => PathBuf::from(raw),
            }
        }
        _ => PathBuf::from(raw),
    };

    let mut normalized = PathBuf::new();
    for component in expanded.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(normalized.components().next_back(), Some(Component::Normal(_)));
                if popped {
                    normalized.pop();
                } else {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}

/// Size of the file at `path` if it exists and is large enough to be a real
/// audio file.
pub async fn existing_file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > MIN_EXISTING_FILE_BYTES => Some(meta.len()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec<'a>(title: &'a str, artist: &'a str, format: &'a str) -> FilenameSpec<'a> {
        FilenameSpec {
            track_name: title,
            artist_name: artist,
            format,
            ..Default::default()
        }
    }

    #[test]
    fn presets_render_title_and_artist() {
        assert_eq!(expected_filename(&spec("X", "Y", "title-artist")), "X - Y.flac");
        assert_eq!(expected_filename(&spec("X", "Y", "artist-title")), "Y - X.flac");
        assert_eq!(expected_filename(&spec("X", "Y", "title")), "X.flac");
        assert_eq!(expected_filename(&spec("X", "Y", "")), "X - Y.flac");
    }

    #[test]
    fn illegal_characters_never_reach_the_filename() {
        let name = expected_filename(&spec("Test / Song", "Artist: A", "title-artist"));
        assert_eq!(name, "Test Song - Artist A.flac");
        for bad in ['<', '>', ':', '"', '/', '\\', '|', '?', '*'] {
            assert!(!name.contains(bad), "{name} contains {bad}");
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        let s = FilenameSpec {
            track_name: "Song?",
            artist_name: "Band|Name",
            album_name: "Album",
            release_date: "2019-05-01",
            format: "{year} - {album} - {track} - {title}",
            position: 3,
            ..Default::default()
        };
        let first = expected_filename(&s);
        for _ in 0..10 {
            assert_eq!(expected_filename(&s), first);
        }
        assert_eq!(first, "2019 - Album - 03 - Song.flac");
    }

    #[test]
    fn track_prefix_only_when_requested_and_known() {
        let mut s = spec("X", "Y", "title-artist");
        s.position = 7;
        assert_eq!(expected_filename(&s), "X - Y.flac");
        s.include_track_number = true;
        assert_eq!(expected_filename(&s), "07. X - Y.flac");
        s.position = 0;
        assert_eq!(expected_filename(&s), "X - Y.flac");
    }

    #[test]
    fn album_track_number_wins_only_when_enabled() {
        let mut s = spec("X", "Y", "{track}. {title}");
        s.position = 2;
        s.album_track_number = 11;
        assert_eq!(expected_filename(&s), "02. X.flac");
        s.use_album_track_number = true;
        assert_eq!(expected_filename(&s), "11. X.flac");
        s.album_track_number = 0;
        assert_eq!(expected_filename(&s), "02. X.flac");
    }

    #[test]
    fn unknown_track_token_is_dropped_with_its_separator() {
        assert_eq!(expected_filename(&spec("X", "Y", "{track}. {title}")), "X.flac");
        assert_eq!(expected_filename(&spec("X", "Y", "{track} - {artist} - {title}")), "Y - X.flac");
        assert_eq!(expected_filename(&spec("X", "Y", "{track} {title}")), "X.flac");
    }

    #[test]
    fn disc_and_album_artist_tokens() {
        let s = FilenameSpec {
            track_name: "X",
            artist_name: "Y",
            album_artist: "Various",
            format: "{album_artist} - {disc}-{title}",
            disc_number: 2,
            ..Default::default()
        };
        assert_eq!(expected_filename(&s), "Various - 2-X.flac");
    }

    #[test]
    fn sanitize_handles_degenerate_input() {
        assert_eq!(sanitize_component(""), "Unknown");
        assert_eq!(sanitize_component("???"), "Unknown");
        assert_eq!(sanitize_component("  a\tb\n c  "), "a b c");
        assert_eq!(sanitize_component("Name..."), "Name");
    }

    #[test]
    fn normalize_path_is_lexical() {
        assert_eq!(normalize_path(""), PathBuf::from("."));
        assert_eq!(normalize_path("/tmp/out/"), PathBuf::from("/tmp/out"));
        assert_eq!(normalize_path("/tmp/./a/../out"), PathBuf::from("/tmp/out"));
        assert_eq!(normalize_path("../music"), PathBuf::from("../music"));
    }

    #[tokio::test]
    async fn existence_requires_more_than_the_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.flac");
        let exact = dir.path().join("exact.flac");
        let big = dir.path().join("big.flac");
        std::fs::write(&small, vec![0u8; 10]).unwrap();
        std::fs::write(&exact, vec![0u8; MIN_EXISTING_FILE_BYTES as usize]).unwrap();
        std::fs::write(&big, vec![0u8; MIN_EXISTING_FILE_BYTES as usize + 1]).unwrap();

        assert_eq!(existing_file_size(&small).await, None);
        assert_eq!(existing_file_size(&exact).await, None);
        assert_eq!(existing_file_size(&big).await, Some(MIN_EXISTING_FILE_BYTES + 1));
        assert_eq!(existing_file_size(&dir.path().join("missing.flac")).await, None);
        assert_eq!(existing_file_size(dir.path()).await, None);
    }
}

// src/lyrics.rs

//! Time-synced lyrics: the model, LRC parsing and rendering, and the LRCLIB
//! client used as the default lyrics source.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::provider::{LyricsSource, ProviderError};

const LRCLIB_BASE_URL: &str = "https://lrclib.net";
const LRCLIB_SOURCE: &str = "LRCLIB";

static LRC_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\d+):(\d{1,2})(?:[.:](\d{1,3}))?\]").expect("static LRC pattern"));
static LRC_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[[a-zA-Z#]+:[^\]]*\]$").expect("static LRC tag pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncType {
    LineSynced,
    Unsynced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LyricLine {
    pub start_ms: Option<u64>,
    pub words: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lyrics {
    pub sync_type: SyncType,
    pub lines: Vec<LyricLine>,
}

impl Lyrics {
    /// Parses LRC text. A line may carry several timestamps; ID tags such as
    /// `[ar:...]` are dropped. Text without any timestamp parses as unsynced.
    pub fn parse_lrc(text: &str) -> Self {
        let mut synced = Vec::new();
        let mut plain = Vec::new();

        for raw in text.lines() {
            let mut rest = raw.trim();
            if LRC_TAG.is_match(rest) {
                continue;
            }

            let mut stamps = Vec::new();
            let mut timestamped = false;
            while let Some(caps) = LRC_TIMESTAMP.captures(rest) {
                timestamped = true;
                let seconds: u64 = caps[2].parse().unwrap_or(0);
                let fraction = caps.get(3).map_or(0, |m| {
                    let digits = m.as_str();
                    let value: u64 = digits.parse().unwrap_or(0);
                    match digits.len() {
                        1 => value * 100,
                        2 => value * 10,
                        _ => value,
                    }
                });
                // out-of-range minutes drop the stamp
                let start = caps[1]
                    .parse::<u64>()
                    .ok()
                    .and_then(|minutes| minutes.checked_mul(60_000))
                    .and_then(|ms| ms.checked_add(seconds * 1000 + fraction));
                stamps.extend(start);
                rest = &rest[caps[0].len()..];
            }

            let words = rest.trim().to_string();
            if !timestamped {
                if !words.is_empty() {
                    plain.push(LyricLine { start_ms: None, words });
                }
            } else {
                for start in stamps {
                    synced.push(LyricLine {
                        start_ms: Some(start),
                        words: words.clone(),
                    });
                }
            }
        }

        if synced.is_empty() {
            Self {
                sync_type: SyncType::Unsynced,
                lines: plain,
            }
        } else {
            synced.sort_by_key(|line| line.start_ms);
            Self {
                sync_type: SyncType::LineSynced,
                lines: synced,
            }
        }
    }

    pub fn from_plain(text: &str) -> Self {
        Self {
            sync_type: SyncType::Unsynced,
            lines: text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|words| LyricLine {
                    start_ms: None,
                    words: words.to_string(),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.words.is_empty())
    }
}

fn format_timestamp(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let centis = (ms % 1000) / 10;
    format!("[{minutes:02}:{seconds:02}.{centis:02}]")
}

/// Renders lyrics as LRC text ready to embed. Empty when there is nothing
/// to embed.
pub fn render_lrc(lyrics: &Lyrics, track_name: &str, artist_name: &str) -> String {
    if lyrics.is_empty() {
        return String::new();
    }

    let mut out = format!("[ti:{track_name}]\n[ar:{artist_name}]\n[by:flacfetch]\n\n");
    for line in &lyrics.lines {
        if let Some(ms) = line.start_ms {
            out.push_str(&format_timestamp(ms));
        }
        out.push_str(&line.words);
        out.push('\n');
    }
    out
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LrclibRecord {
    #[serde(default)]
    synced_lyrics: Option<String>,
    #[serde(default)]
    plain_lyrics: Option<String>,
    #[serde(default)]
    instrumental: bool,
}

impl LrclibRecord {
    fn into_lyrics(self) -> Option<Lyrics> {
        if self.instrumental {
            return None;
        }
        let lyrics = match (self.synced_lyrics, self.plain_lyrics) {
            (Some(synced), _) if !synced.trim().is_empty() => Lyrics::parse_lrc(&synced),
            (_, Some(plain)) if !plain.trim().is_empty() => Lyrics::from_plain(&plain),
            _ => return None,
        };
        (!lyrics.is_empty()).then_some(lyrics)
    }
}

/// Lyrics lookup against the public LRCLIB API: an exact `get` first, then
/// the first usable `search` hit.
#[derive(Clone)]
pub struct LrclibClient {
    client: Client,
    base_url: String,
}

impl LrclibClient {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_base_url(LRCLIB_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("flacfetch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_exact(&self, track_name: &str, artist_name: &str) -> Result<Option<Lyrics>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/api/get", self.base_url))
            .query(&[("track_name", track_name), ("artist_name", artist_name)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Upstream {
                status: response.status().as_u16(),
                message: "lyrics lookup failed".to_string(),
            });
        }
        let record: LrclibRecord = response.json().await?;
        Ok(record.into_lyrics())
    }

    async fn search(&self, track_name: &str, artist_name: &str) -> Result<Option<Lyrics>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/api/search", self.base_url))
            .query(&[("track_name", track_name), ("artist_name", artist_name)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Upstream {
                status: response.status().as_u16(),
                message: "lyrics search failed".to_string(),
            });
        }
        let records: Vec<LrclibRecord> = response.json().await?;
        Ok(records.into_iter().find_map(LrclibRecord::into_lyrics))
    }
}

#[async_trait]
impl LyricsSource for LrclibClient {
    async fn fetch_lyrics(
        &self,
        _spotify_id: &str,
        track_name: &str,
        artist_name: &str,
    ) -> Result<Option<(Lyrics, String)>, ProviderError> {
        if let Some(lyrics) = self.get_exact(track_name, artist_name).await? {
            return Ok(Some((lyrics, LRCLIB_SOURCE.to_string())));
        }
        debug!(track_name, artist_name, "no exact lyrics match, searching");
        Ok(self
            .search(track_name, artist_name)
            .await?
            .map(|lyrics| (lyrics, LRCLIB_SOURCE.to_string())))
    }
}

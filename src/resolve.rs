// src/resolve.rs

//! HTTP clients that derive an ISRC for a Spotify track: song.link maps the
//! Spotify ID to a Deezer URL, Deezer's public API returns the ISRC.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::isrc::Isrc;
use crate::provider::{IsrcResolver, LinkResolver, ProviderError};

const SONGLINK_BASE_URL: &str = "https://api.song.link/v1-alpha.1";
const DEEZER_API_BASE_URL: &str = "https://api.deezer.com";

static DEEZER_TRACK_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"deezer\.com/(?:[a-z]{2}(?:-[a-z]{2})?/)?track/(\d+)").expect("static Deezer URL pattern")
});

fn http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("flacfetch/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Upstream {
        status: status.as_u16(),
        message: format!("{what}: {}", body.chars().take(200).collect::<String>()),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SongLinkResponse {
    #[serde(default)]
    links_by_platform: HashMap<String, SongLinkPlatform>,
}

#[derive(Debug, Deserialize)]
struct SongLinkPlatform {
    url: String,
}

#[derive(Clone)]
pub struct SongLinkClient {
    client: Client,
    base_url: String,
}

impl SongLinkClient {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_base_url(SONGLINK_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Every platform URL song.link knows for the track, keyed by platform.
    pub async fn platform_urls(&self, spotify_id: &str) -> Result<HashMap<String, String>, ProviderError> {
        let spotify_url = format!("https://open.spotify.com/track/{spotify_id}");
        let response = self
            .client
            .get(format!("{}/links", self.base_url))
            .query(&[("url", spotify_url.as_str())])
            .send()
            .await?;
        let response = check_status(response, "song.link lookup failed").await?;
        let body: SongLinkResponse = response.json().await?;

        Ok(body
            .links_by_platform
            .into_iter()
            .map(|(platform, link)| (platform, link.url))
            .collect())
    }
}

#[async_trait]
impl LinkResolver for SongLinkClient {
    async fn resolve_cross_service_url(&self, spotify_id: &str) -> Result<String, ProviderError> {
        let mut urls = self.platform_urls(spotify_id).await?;
        let url = urls
            .remove("deezer")
            .ok_or_else(|| ProviderError::Other("track is not available on Deezer".to_string()))?;
        debug!(spotify_id, url = %url, "resolved Deezer link");
        Ok(url)
    }
}

/// Extracts the numeric track ID from a Deezer track URL.
pub fn deezer_track_id(url: &str) -> Option<&str> {
    DEEZER_TRACK_URL
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[derive(Debug, Deserialize)]
struct DeezerTrack {
    #[serde(default)]
    isrc: Option<String>,
    #[serde(default)]
    error: Option<DeezerApiError>,
}

#[derive(Debug, Deserialize)]
struct DeezerApiError {
    #[serde(default)]
    message: String,
}

#[derive(Clone)]
pub struct DeezerClient {
    client: Client,
    base_url: String,
}

impl DeezerClient {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_base_url(DEEZER_API_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IsrcResolver for DeezerClient {
    async fn resolve_isrc_from_url(&self, url: &str) -> Result<Isrc, ProviderError> {
        let track_id = deezer_track_id(url)
            .ok_or_else(|| ProviderError::Other(format!("not a Deezer track URL: {url}")))?;

        let response = self
            .client
            .get(format!("{}/track/{track_id}", self.base_url))
            .send()
            .await?;
        let response = check_status(response, "Deezer track lookup failed").await?;
        let track: DeezerTrack = response.json().await?;

        if let Some(error) = track.error {
            return Err(ProviderError::Other(format!("Deezer API error: {}", error.message)));
        }
        let raw = track
            .isrc
            .ok_or_else(|| ProviderError::Other(format!("Deezer track {track_id} has no ISRC")))?;
        Isrc::parse(&raw).ok_or_else(|| ProviderError::Other(format!("Deezer returned an invalid ISRC: {raw}")))
    }
}

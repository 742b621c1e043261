// src/orchestrator.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::enrichment::{self, HistoryDraft, LyricsTask};
use crate::isrc::Isrc;
use crate::lyrics::LrclibClient;
use crate::models::{DownloadItem, ItemStatus};
use crate::naming;
use crate::provider::{
    AmazonProvider, AudioTagger, DownloadOutcome, HistoryLog, IsrcResolver, LinkResolver, LyricsSource,
    MetadataSource, ProviderError, ProviderFailure, ProviderResult, QobuzProvider, TidalProvider,
};
use crate::queue::{QueueError, QueueTracker};
use crate::request::{DownloadRequest, Service, TidalApi, TrackJob, ValidationError};
use crate::resolve::{DeezerClient, SongLinkClient};
use crate::tagging::LoftyTagger;

/// Failure to derive the ISRC a Qobuz download needs, attributed to the step
/// that failed.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("failed to resolve cross-service URL: {0}")]
    CrossServiceUrl(#[source] ProviderError),
    #[error("failed to resolve ISRC from {url}: {source}")]
    Isrc {
        url: String,
        #[source]
        source: ProviderError,
    },
    #[error("ISRC is required for Qobuz and could not be derived")]
    MissingIsrc,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("download failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("queue item was cancelled before the download started")]
    Cancelled,
    #[error("queue item is {status:?}, not queued")]
    NotQueued { status: ItemStatus },
    #[error(transparent)]
    Queue(QueueError),
}

impl From<QueueError> for DownloadError {
    /// A rejected claim on the queue item; nothing was downloaded.
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::InvalidTransition {
                from: ItemStatus::Cancelled,
                ..
            } => DownloadError::Cancelled,
            QueueError::InvalidTransition { from, .. } => DownloadError::NotQueued { status: from },
            err @ QueueError::UnknownItem(_) => DownloadError::Queue(err),
        }
    }
}

/// A finished download call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub item_id: String,
    pub file: PathBuf,
    /// The file was already present, either locally or per the provider.
    pub already_exists: bool,
}

#[derive(Debug, Error)]
#[error("{error}")]
pub struct DownloadFailure {
    /// Absent when the request was rejected before queue registration.
    pub item_id: Option<String>,
    #[source]
    pub error: DownloadError,
}

impl DownloadFailure {
    fn new(item_id: Option<&str>, error: impl Into<DownloadError>) -> Self {
        Self {
            item_id: item_id.map(str::to_string),
            error: error.into(),
        }
    }
}

/// The external services the orchestrator calls.
#[derive(Clone)]
pub struct Services {
    pub amazon: Arc<dyn AmazonProvider>,
    pub tidal: Arc<dyn TidalProvider>,
    pub qobuz: Arc<dyn QobuzProvider>,
    pub links: Arc<dyn LinkResolver>,
    pub isrc_lookup: Arc<dyn IsrcResolver>,
    pub metadata: Arc<dyn MetadataSource>,
    pub lyrics: Arc<dyn LyricsSource>,
    pub tagger: Arc<dyn AudioTagger>,
}

impl Services {
    /// Wires the download providers and metadata source with the built-in
    /// song.link, Deezer and LRCLIB clients and the lofty tagger.
    pub fn with_default_clients(
        amazon: Arc<dyn AmazonProvider>,
        tidal: Arc<dyn TidalProvider>,
        qobuz: Arc<dyn QobuzProvider>,
        metadata: Arc<dyn MetadataSource>,
        http_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            amazon,
            tidal,
            qobuz,
            links: Arc::new(SongLinkClient::new(http_timeout)?),
            isrc_lookup: Arc::new(DeezerClient::new(http_timeout)?),
            metadata,
            lyrics: Arc::new(LrclibClient::new(http_timeout)?),
            tagger: Arc::new(LoftyTagger),
        })
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub metadata_timeout: Duration,
    /// Overrides the Tidal provider's own mirror list when non-empty.
    pub tidal_mirrors: Vec<String>,
    pub history_namespace: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            metadata_timeout: Duration::from_secs(10),
            tidal_mirrors: Vec::new(),
            history_namespace: "flacfetch".to_string(),
        }
    }
}

enum DispatchError {
    Resolution(ResolutionError),
    Provider(ProviderFailure),
}

impl From<ProviderFailure> for DispatchError {
    fn from(failure: ProviderFailure) -> Self {
        DispatchError::Provider(failure)
    }
}

/// Turns download requests into provider calls and keeps the queue item of
/// each request in step with the outcome.
pub struct Orchestrator {
    queue: Arc<QueueTracker>,
    services: Services,
    history: Arc<dyn HistoryLog>,
    settings: OrchestratorSettings,
    background: TaskTracker,
}

impl Orchestrator {
    pub fn new(
        queue: Arc<QueueTracker>,
        services: Services,
        history: Arc<dyn HistoryLog>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            queue,
            services,
            history,
            settings,
            background: TaskTracker::new(),
        }
    }

    pub fn queue(&self) -> &Arc<QueueTracker> {
        &self.queue
    }

    pub async fn download(&self, request: DownloadRequest) -> Result<DownloadReport, DownloadFailure> {
        let mut job = request.normalize().map_err(|e| DownloadFailure::new(None, e))?;
        let item_id = self.register(&job).await;
        let failure = |error: DownloadError| DownloadFailure::new(Some(item_id.as_str()), error);

        self.backfill_metadata(&mut job).await;

        if job.has_names() {
            let expected = job.expected_path();
            if let Some(size) = naming::existing_file_size(&expected).await {
                if let Err(err) = self.queue.skip_queued(&item_id, expected.clone()).await {
                    info!(item_id = %item_id, error = %err, "item is not queued, not skipping");
                    return Err(failure(err.into()));
                }
                info!(item_id = %item_id, path = %expected.display(), size, "file already exists, skipping");
                return Ok(DownloadReport {
                    item_id,
                    file: expected,
                    already_exists: true,
                });
            }
        }

        let _downloading = self.queue.begin_download();
        if let Err(err) = self.queue.start(&item_id).await {
            info!(item_id = %item_id, error = %err, "item is not queued, not downloading");
            return Err(failure(err.into()));
        }

        info!(item_id = %item_id, service = job.service.as_str(), "starting download");
        let outcome = match self.dispatch(&job).await {
            Ok(outcome) => outcome,
            Err(DispatchError::Resolution(err)) => {
                let err = DownloadError::from(err);
                self.mark_failed(&item_id, &err).await;
                return Err(failure(err));
            }
            Err(DispatchError::Provider(ProviderFailure { error, partial })) => {
                let err = DownloadError::from(error);
                self.mark_failed(&item_id, &err).await;
                if let Some(partial) = partial {
                    remove_partial(&partial).await;
                }
                return Err(failure(err));
            }
        };

        match outcome {
            DownloadOutcome::AlreadyExists(path) => {
                info!(item_id = %item_id, path = %path.display(), "provider reports file already exists");
                self.mark_skipped(&item_id, &path).await;
                Ok(DownloadReport {
                    item_id,
                    file: path,
                    already_exists: true,
                })
            }
            DownloadOutcome::Created(path) => {
                let size_mb = tokio::fs::metadata(&path)
                    .await
                    .map(|m| m.len() as f64 / (1024.0 * 1024.0))
                    .unwrap_or(0.0);
                if let Err(err) = self.queue.complete(&item_id, path.clone(), size_mb).await {
                    warn!(item_id = %item_id, error = %err, "could not mark item as completed");
                }
                info!(item_id = %item_id, path = %path.display(), size_mb, "download completed");
                self.spawn_enrichment(&job, &path);
                Ok(DownloadReport {
                    item_id,
                    file: path,
                    already_exists: false,
                })
            }
        }
    }

    /// Waits for every background enrichment task spawned so far.
    pub async fn drain_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    async fn register(&self, job: &TrackJob) -> String {
        if let Some(id) = &job.item_id {
            // Caller-tracked items are reused; an unknown id is registered so
            // the transitions that follow have something to act on.
            if self.queue.get(id).await.is_none() {
                self.queue
                    .add(DownloadItem::new(
                        id.clone(),
                        &job.track_name,
                        &job.artist_name,
                        &job.album_name,
                        job.spotify_id.clone().unwrap_or_default(),
                    ))
                    .await;
            }
            return id.clone();
        }

        let key = match &job.spotify_id {
            Some(id) => id.clone(),
            None => format!("{}-{}", job.track_name, job.artist_name),
        };
        self.queue
            .add_to_queue(
                &key,
                &job.track_name,
                &job.artist_name,
                &job.album_name,
                job.spotify_id.as_deref().unwrap_or_default(),
            )
            .await
    }

    async fn backfill_metadata(&self, job: &mut TrackJob) {
        if !job.needs_metadata_backfill() {
            return;
        }
        let Some(url) = job.spotify_url() else {
            return;
        };

        let fetch = self.services.metadata.fetch_track_metadata(&url);
        match tokio::time::timeout(self.settings.metadata_timeout, fetch).await {
            Ok(Ok(meta)) => {
                debug!(url = %url, "metadata backfilled");
                job.fill_missing(meta);
            }
            Ok(Err(err)) => warn!(url = %url, error = %err, "metadata backfill failed, continuing"),
            Err(_) => warn!(
                url = %url,
                timeout_secs = self.settings.metadata_timeout.as_secs(),
                "metadata backfill timed out, continuing"
            ),
        }
    }

    async fn dispatch(&self, job: &TrackJob) -> Result<DownloadOutcome, DispatchError> {
        match job.service {
            Service::Amazon => Ok(self.download_amazon(job).await?),
            Service::Tidal => Ok(self.download_tidal(job).await?),
            Service::Qobuz => {
                let isrc = self.qobuz_isrc(job).await.map_err(DispatchError::Resolution)?;
                Ok(self.services.qobuz.download_by_isrc(&isrc, job).await?)
            }
        }
    }

    async fn download_amazon(&self, job: &TrackJob) -> ProviderResult {
        match (&job.service_url, &job.spotify_id) {
            (Some(url), _) => self.services.amazon.download_by_url(url, job).await,
            (None, Some(id)) => self.services.amazon.download_by_spotify_id(id, job).await,
            (None, None) => Err(ProviderFailure::new(ProviderError::Other(
                ValidationError::SpotifyIdMissing(Service::Amazon).to_string(),
            ))),
        }
    }

    async fn download_tidal(&self, job: &TrackJob) -> ProviderResult {
        let mirrors = match &job.tidal_api {
            TidalApi::Fixed(base) => return self.download_tidal_from(base, job).await,
            TidalApi::Auto if self.settings.tidal_mirrors.is_empty() => self.services.tidal.mirrors(),
            TidalApi::Auto => self.settings.tidal_mirrors.clone(),
        };
        if mirrors.is_empty() {
            return Err(ProviderFailure::new(ProviderError::NoMirrors));
        }

        let mut errors = Vec::with_capacity(mirrors.len());
        for base in &mirrors {
            match self.download_tidal_from(base, job).await {
                Ok(outcome) => {
                    debug!(mirror = %base, "tidal mirror succeeded");
                    return Ok(outcome);
                }
                Err(ProviderFailure { error, partial }) => {
                    warn!(mirror = %base, error = %error, "tidal mirror failed");
                    if let Some(partial) = partial {
                        remove_partial(&partial).await;
                    }
                    errors.push(format!("{base}: {error}"));
                }
            }
        }
        Err(ProviderFailure::new(ProviderError::AllMirrorsFailed(errors)))
    }

    async fn download_tidal_from(&self, base: &str, job: &TrackJob) -> ProviderResult {
        match (&job.service_url, &job.spotify_id) {
            (Some(url), _) => self.services.tidal.download_by_url(base, url, job).await,
            (None, Some(id)) => self.services.tidal.download_by_spotify_id(base, id, job).await,
            (None, None) => Err(ProviderFailure::new(ProviderError::Other(
                ValidationError::SpotifyIdMissing(Service::Tidal).to_string(),
            ))),
        }
    }

    async fn qobuz_isrc(&self, job: &TrackJob) -> Result<Isrc, ResolutionError> {
        if let Some(isrc) = &job.isrc {
            return Ok(isrc.clone());
        }
        let spotify_id = job.spotify_id.as_deref().ok_or(ResolutionError::MissingIsrc)?;

        let url = self
            .services
            .links
            .resolve_cross_service_url(spotify_id)
            .await
            .map_err(ResolutionError::CrossServiceUrl)?;
        let isrc = self
            .services
            .isrc_lookup
            .resolve_isrc_from_url(&url)
            .await
            .map_err(|source| ResolutionError::Isrc { url, source })?;
        debug!(spotify_id, isrc = %isrc, "derived ISRC");
        Ok(isrc)
    }

    async fn mark_skipped(&self, item_id: &str, path: &Path) {
        if let Err(err) = self.queue.skip(item_id, path.to_path_buf()).await {
            warn!(item_id, error = %err, "could not mark item as skipped");
        }
    }

    async fn mark_failed(&self, item_id: &str, error: &DownloadError) {
        warn!(item_id, error = %error, "download failed");
        if let Err(err) = self.queue.fail(item_id, error.to_string()).await {
            warn!(item_id, error = %err, "could not mark item as failed");
        }
    }

    fn spawn_enrichment(&self, job: &TrackJob, path: &Path) {
        if let Some(task) = LyricsTask::for_download(job, path) {
            let source = self.services.lyrics.clone();
            let tagger = self.services.tagger.clone();
            self.background.spawn(async move {
                enrichment::run_lyrics_task(source.as_ref(), tagger.as_ref(), task).await;
            });
        }

        let draft = HistoryDraft::for_download(job, path);
        let tagger = self.services.tagger.clone();
        let history = self.history.clone();
        let namespace = self.settings.history_namespace.clone();
        self.background.spawn(async move {
            enrichment::run_history_task(tagger.as_ref(), history.as_ref(), &namespace, draft).await;
        });
    }
}

/// Best-effort removal of a file a failed attempt left behind.
async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(path = %path.display(), "removed partial file after failed download"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove partial file"),
    }
}

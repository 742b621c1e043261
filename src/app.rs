// src/app.rs

//! The composition root: owns the queue, the history store and the
//! orchestrator, and exposes the operations the UI calls. Every operation
//! answers with a plain response value; internal error types stop here.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::batch::{self, CheckFileExistenceRequest, CheckFileExistenceResult};
use crate::config::Settings;
use crate::history::{HistoryError, HistoryStore};
use crate::models::HistoryItem;
use crate::orchestrator::{DownloadFailure, DownloadReport, Orchestrator, Services};
use crate::queue::{QueueSnapshot, QueueTracker};
use crate::request::DownloadRequest;

/// Result of a download call. `success`, `already_exists` and `error` tell
/// the three outcomes apart: fresh download, existing file, failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DownloadResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub already_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

impl From<DownloadReport> for DownloadResponse {
    fn from(report: DownloadReport) -> Self {
        let message = if report.already_exists {
            "File already exists"
        } else {
            "Download completed successfully"
        };
        Self {
            success: true,
            message: message.to_string(),
            file: Some(report.file),
            error: None,
            already_exists: report.already_exists,
            item_id: Some(report.item_id),
        }
    }
}

impl From<DownloadFailure> for DownloadResponse {
    fn from(failure: DownloadFailure) -> Self {
        Self {
            success: false,
            message: "Download failed".to_string(),
            file: None,
            error: Some(failure.error.to_string()),
            already_exists: false,
            item_id: failure.item_id,
        }
    }
}

/// Response of the non-download operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    fn err(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            data: None,
        }
    }
}

pub struct App {
    settings: Settings,
    queue: Arc<QueueTracker>,
    history: HistoryStore,
    orchestrator: Orchestrator,
}

impl App {
    /// Opens the history database named by `settings` and wires everything.
    pub async fn open(settings: Settings, services: Services) -> Result<Self, HistoryError> {
        let history = HistoryStore::open(&settings.history_db).await?;
        Ok(Self::with_history(settings, services, history))
    }

    pub fn with_history(settings: Settings, services: Services, history: HistoryStore) -> Self {
        let queue = Arc::new(QueueTracker::new());
        let orchestrator = Orchestrator::new(
            queue.clone(),
            services,
            Arc::new(history.clone()),
            settings.orchestrator_settings(),
        );
        Self {
            settings,
            queue,
            history,
            orchestrator,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Downloads one track. A request without an output directory uses the
    /// configured `Settings::output_dir`; this differs from
    /// [`DownloadRequest::normalize`], which falls back to the current
    /// directory.
    pub async fn download_track(&self, mut request: DownloadRequest) -> DownloadResponse {
        if request.output_dir.trim().is_empty() {
            request.output_dir = self.settings.output_dir.to_string_lossy().into_owned();
        }
        match self.orchestrator.download(request).await {
            Ok(report) => report.into(),
            Err(failure) => failure.into(),
        }
    }

    /// Registers a Queued item ahead of its download and returns its id.
    pub async fn add_to_queue(&self, key: &str, track_name: &str, artist_name: &str, album_name: &str) -> String {
        self.queue
            .add_to_queue(key, track_name, artist_name, album_name, key)
            .await
    }

    pub async fn mark_item_failed(&self, item_id: &str, error: &str) -> ApiResponse<()> {
        match self.queue.fail(item_id, error).await {
            Ok(()) => ApiResponse::ok(()),
            Err(err) => {
                warn!(item_id, error = %err, "mark failed rejected");
                ApiResponse::err(err)
            }
        }
    }

    pub async fn skip_item(&self, item_id: &str, file_path: &str) -> ApiResponse<()> {
        match self.queue.skip(item_id, PathBuf::from(file_path)).await {
            Ok(()) => ApiResponse::ok(()),
            Err(err) => {
                warn!(item_id, error = %err, "skip rejected");
                ApiResponse::err(err)
            }
        }
    }

    pub async fn cancel_all_queued(&self) -> usize {
        let cancelled = self.queue.cancel_all_queued().await;
        info!(cancelled, "cancelled queued items");
        cancelled
    }

    pub async fn clear_completed(&self) -> usize {
        self.queue.clear_completed().await
    }

    pub async fn clear_all(&self) {
        self.queue.clear_all().await;
    }

    pub async fn queue_snapshot(&self) -> QueueSnapshot {
        self.queue.snapshot().await
    }

    /// Batch existence check. An empty `output_dir` means the configured one.
    pub async fn check_files_existence(
        &self,
        output_dir: &str,
        tracks: &[CheckFileExistenceRequest],
    ) -> Vec<CheckFileExistenceResult> {
        let configured;
        let output_dir = if output_dir.trim().is_empty() {
            configured = self.settings.output_dir.to_string_lossy().into_owned();
            configured.as_str()
        } else {
            output_dir
        };
        batch::check_existence(output_dir, tracks, self.settings.batch_concurrency).await
    }

    pub async fn history(&self) -> ApiResponse<Vec<HistoryItem>> {
        match self.history.list(&self.settings.history_namespace).await {
            Ok(items) => ApiResponse::ok(items),
            Err(err) => ApiResponse::err(err),
        }
    }

    pub async fn clear_history(&self) -> ApiResponse<usize> {
        match self.history.clear(&self.settings.history_namespace).await {
            Ok(removed) => {
                info!(removed, "history cleared");
                ApiResponse::ok(removed)
            }
            Err(err) => ApiResponse::err(err),
        }
    }

    /// Waits for pending lyrics and history tasks.
    pub async fn shutdown(&self) {
        self.orchestrator.drain_background().await;
        info!("background tasks drained");
    }
}

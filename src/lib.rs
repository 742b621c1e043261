pub mod app;
pub mod batch;
pub mod config;
pub mod enrichment;
pub mod history;
pub mod isrc;
pub mod lyrics;
pub mod models;
pub mod naming;
pub mod orchestrator;
pub mod provider;
pub mod queue;
pub mod request;
pub mod resolve;
pub mod tagging;

/// Convenient re-exports of the types most callers touch.
pub mod prelude {
    pub use crate::app::{ApiResponse, App, DownloadResponse};
    pub use crate::batch::{CheckFileExistenceRequest, CheckFileExistenceResult};
    pub use crate::config::Settings;
    pub use crate::models::{DownloadItem, HistoryItem, ItemStatus};
    pub use crate::orchestrator::{DownloadError, Orchestrator, Services};
    pub use crate::provider::{DownloadOutcome, ProviderError, ProviderFailure, ProviderResult};
    pub use crate::queue::{QueueSnapshot, QueueTracker};
    pub use crate::request::{DownloadRequest, Service};
}

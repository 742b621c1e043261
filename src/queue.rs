// src/queue.rs

use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{DownloadItem, ItemStatus};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue item {0} not found")]
    UnknownItem(String),
    #[error("queue item {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: String,
        from: ItemStatus,
        to: ItemStatus,
    },
}

/// Point-in-time view of the queue for UI polling.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub is_downloading: bool,
    /// The most recently started item that is still downloading.
    pub current: Option<DownloadItem>,
    pub items: Vec<DownloadItem>,
    pub queued: usize,
    pub downloading: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Megabytes written by downloads completed this session.
    pub total_downloaded_mb: f64,
}

#[derive(Debug, Default)]
struct QueueState {
    items: IndexMap<String, DownloadItem>,
    current: Option<String>,
    session_mb: f64,
}

impl QueueState {
    fn transition(&mut self, id: &str, to: ItemStatus) -> Result<&mut DownloadItem, QueueError> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| QueueError::UnknownItem(id.to_string()))?;
        if !item.status.can_transition_to(to) {
            return Err(QueueError::InvalidTransition {
                id: id.to_string(),
                from: item.status,
                to,
            });
        }
        item.status = to;
        if to.is_terminal() {
            item.finished_at = Some(Utc::now());
        }
        Ok(item)
    }
}

/// In-memory registry of download items keyed by item id.
///
/// Owned by the application root and shared behind an `Arc`; every mutation
/// goes through the inner mutex.
#[derive(Debug, Default)]
pub struct QueueTracker {
    state: Mutex<QueueState>,
    active_downloads: Arc<AtomicUsize>,
    last_stamp: AtomicU64,
}

/// Keeps the "is downloading" flag raised while alive.
#[derive(Debug)]
pub struct DownloadingGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for DownloadingGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl QueueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds `<key>-<nanos>`. Stamps strictly increase within a tracker, so
    /// two ids minted in the same nanosecond still differ.
    pub fn next_item_id(&self, key: &str) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let prev = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| Some(now.max(prev + 1)))
            .unwrap_or_else(|prev| prev);
        format!("{}-{}", key, now.max(prev + 1))
    }

    /// Registers an item as Queued. An id that is already present is left
    /// untouched.
    pub async fn add(&self, item: DownloadItem) {
        let mut state = self.state.lock().await;
        if state.items.contains_key(&item.id) {
            debug!(item_id = %item.id, "queue item already registered");
            return;
        }
        state.items.insert(item.id.clone(), item);
    }

    /// Synthesizes an id from `key` and registers a Queued item under it.
    pub async fn add_to_queue(
        &self,
        key: &str,
        track_name: &str,
        artist_name: &str,
        album_name: &str,
        spotify_id: &str,
    ) -> String {
        let id = self.next_item_id(key);
        self.add(DownloadItem::new(id.clone(), track_name, artist_name, album_name, spotify_id))
            .await;
        id
    }

    pub async fn start(&self, id: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let item = state.transition(id, ItemStatus::Downloading)?;
        item.started_at = Some(Utc::now());
        state.current = Some(id.to_string());
        Ok(())
    }

    pub async fn complete(&self, id: &str, path: PathBuf, size_mb: f64) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let item = state.transition(id, ItemStatus::Completed)?;
        item.file_path = Some(path);
        item.size_mb = Some(size_mb);
        state.session_mb += size_mb;
        Ok(())
    }

    pub async fn skip(&self, id: &str, path: PathBuf) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let item = state.transition(id, ItemStatus::Skipped)?;
        item.file_path = Some(path);
        Ok(())
    }

    /// Skips an item that has not started yet. Unlike [`skip`](Self::skip),
    /// a Downloading item is refused since another caller owns it.
    pub async fn skip_queued(&self, id: &str, path: PathBuf) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let status = state
            .items
            .get(id)
            .map(|item| item.status)
            .ok_or_else(|| QueueError::UnknownItem(id.to_string()))?;
        if status != ItemStatus::Queued {
            return Err(QueueError::InvalidTransition {
                id: id.to_string(),
                from: status,
                to: ItemStatus::Skipped,
            });
        }
        let item = state.transition(id, ItemStatus::Skipped)?;
        item.file_path = Some(path);
        Ok(())
    }

    pub async fn fail(&self, id: &str, message: impl Into<String>) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let item = state.transition(id, ItemStatus::Failed)?;
        item.error_message = Some(message.into());
        Ok(())
    }

    /// Cancels every item still Queued. In-flight downloads are not touched.
    pub async fn cancel_all_queued(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut cancelled = 0;
        for item in state.items.values_mut() {
            if item.status == ItemStatus::Queued {
                item.status = ItemStatus::Cancelled;
                item.finished_at = Some(now);
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Drops Completed, Skipped and Failed entries.
    pub async fn clear_completed(&self) -> usize {
        let mut state = self.state.lock().await;
        let before = state.items.len();
        state.items.retain(|_, item| {
            !matches!(
                item.status,
                ItemStatus::Completed | ItemStatus::Skipped | ItemStatus::Failed
            )
        });
        before - state.items.len()
    }

    pub async fn clear_all(&self) {
        let mut state = self.state.lock().await;
        state.items.clear();
        state.current = None;
        state.session_mb = 0.0;
    }

    pub async fn get(&self, id: &str) -> Option<DownloadItem> {
        self.state.lock().await.items.get(id).cloned()
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock().await;

        let mut snapshot = QueueSnapshot {
            is_downloading: self.is_downloading(),
            current: None,
            items: Vec::with_capacity(state.items.len()),
            queued: 0,
            downloading: 0,
            completed: 0,
            skipped: 0,
            failed: 0,
            cancelled: 0,
            total_downloaded_mb: state.session_mb,
        };

        for item in state.items.values() {
            match item.status {
                ItemStatus::Queued => snapshot.queued += 1,
                ItemStatus::Downloading => snapshot.downloading += 1,
                ItemStatus::Completed => snapshot.completed += 1,
                ItemStatus::Skipped => snapshot.skipped += 1,
                ItemStatus::Failed => snapshot.failed += 1,
                ItemStatus::Cancelled => snapshot.cancelled += 1,
            }
            snapshot.items.push(item.clone());
        }

        snapshot.current = state
            .current
            .as_ref()
            .and_then(|id| state.items.get(id))
            .filter(|item| item.status == ItemStatus::Downloading)
            .or_else(|| {
                state
                    .items
                    .values()
                    .rev()
                    .find(|item| item.status == ItemStatus::Downloading)
            })
            .cloned();

        snapshot
    }

    /// Raises the global "a download is running" flag until the guard drops.
    pub fn begin_download(&self) -> DownloadingGuard {
        self.active_downloads.fetch_add(1, Ordering::SeqCst);
        DownloadingGuard {
            active: self.active_downloads.clone(),
        }
    }

    pub fn is_downloading(&self) -> bool {
        self.active_downloads.load(Ordering::SeqCst) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn tracker_with(id: &str) -> QueueTracker {
        let tracker = QueueTracker::new();
        tracker.add(DownloadItem::new(id.to_string(), "X", "Y", "Z", "abc123")).await;
        tracker
    }

    #[tokio::test]
    async fn happy_path_transitions() {
        let tracker = tracker_with("a").await;
        tracker.start("a").await.unwrap();
        tracker.complete("a", PathBuf::from("/tmp/a.flac"), 12.5).await.unwrap();

        let item = tracker.get("a").await.unwrap();
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.file_path, Some(PathBuf::from("/tmp/a.flac")));
        assert_eq!(item.size_mb, Some(12.5));
        assert!(item.started_at.is_some() && item.finished_at.is_some());
        assert_eq!(tracker.snapshot().await.total_downloaded_mb, 12.5);
    }

    #[tokio::test]
    async fn terminal_items_reject_further_transitions() {
        let tracker = tracker_with("a").await;
        tracker.start("a").await.unwrap();
        tracker.fail("a", "boom").await.unwrap();

        assert!(matches!(
            tracker.complete("a", PathBuf::from("x"), 1.0).await,
            Err(QueueError::InvalidTransition { from: ItemStatus::Failed, .. })
        ));
        assert!(tracker.start("a").await.is_err());
        assert!(tracker.skip("a", PathBuf::from("x")).await.is_err());
        assert_eq!(tracker.cancel_all_queued().await, 0);

        let item = tracker.get("a").await.unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.error_message.as_deref(), Some("boom"));
        assert_eq!(item.file_path, None);
    }

    #[tokio::test]
    async fn skip_queued_refuses_started_items() {
        let tracker = tracker_with("a").await;
        tracker.start("a").await.unwrap();
        assert!(matches!(
            tracker.skip_queued("a", PathBuf::from("a.flac")).await,
            Err(QueueError::InvalidTransition { from: ItemStatus::Downloading, .. })
        ));
        assert_eq!(tracker.get("a").await.unwrap().status, ItemStatus::Downloading);

        let tracker = tracker_with("b").await;
        tracker.skip_queued("b", PathBuf::from("b.flac")).await.unwrap();
        let item = tracker.get("b").await.unwrap();
        assert_eq!(item.status, ItemStatus::Skipped);
        assert_eq!(item.file_path, Some(PathBuf::from("b.flac")));
    }

    #[tokio::test]
    async fn complete_requires_downloading() {
        let tracker = tracker_with("a").await;
        assert!(tracker.complete("a", PathBuf::from("x"), 1.0).await.is_err());
        assert_eq!(
            tracker.start("missing").await,
            Err(QueueError::UnknownItem("missing".into()))
        );
    }

    #[tokio::test]
    async fn cancel_only_touches_queued_items() {
        let tracker = QueueTracker::new();
        for id in ["q1", "q2", "d1"] {
            tracker.add(DownloadItem::new(id.into(), "X", "Y", "", "")).await;
        }
        tracker.start("d1").await.unwrap();

        assert_eq!(tracker.cancel_all_queued().await, 2);
        assert_eq!(tracker.get("q1").await.unwrap().status, ItemStatus::Cancelled);
        assert_eq!(tracker.get("d1").await.unwrap().status, ItemStatus::Downloading);

        // the in-flight download can still finish
        tracker.complete("d1", PathBuf::from("d1.flac"), 3.0).await.unwrap();
    }

    #[tokio::test]
    async fn clear_completed_keeps_pending_work() {
        let tracker = QueueTracker::new();
        for id in ["done", "skipped", "failed", "queued", "running", "cancelled"] {
            tracker.add(DownloadItem::new(id.into(), "X", "Y", "", "")).await;
        }
        tracker.start("done").await.unwrap();
        tracker.complete("done", PathBuf::from("a"), 1.0).await.unwrap();
        tracker.skip("skipped", PathBuf::from("b")).await.unwrap();
        tracker.fail("failed", "nope").await.unwrap();
        tracker.start("running").await.unwrap();
        tracker.state.lock().await.items.get_mut("cancelled").unwrap().status = ItemStatus::Cancelled;

        assert_eq!(tracker.clear_completed().await, 3);
        let remaining: Vec<_> = tracker.snapshot().await.items.into_iter().map(|i| i.id).collect();
        assert_eq!(remaining, vec!["queued", "running", "cancelled"]);

        tracker.clear_all().await;
        assert!(tracker.snapshot().await.items.is_empty());
    }

    #[tokio::test]
    async fn snapshot_counts_and_current_item() {
        let tracker = QueueTracker::new();
        for id in ["a", "b", "c"] {
            tracker.add(DownloadItem::new(id.into(), "X", "Y", "", "")).await;
        }
        tracker.start("a").await.unwrap();
        tracker.start("b").await.unwrap();

        let snap = tracker.snapshot().await;
        assert_eq!((snap.queued, snap.downloading), (1, 2));
        assert_eq!(snap.current.unwrap().id, "b");

        tracker.complete("b", PathBuf::from("b"), 2.0).await.unwrap();
        let snap = tracker.snapshot().await;
        assert_eq!(snap.current.unwrap().id, "a");
        assert_eq!(snap.completed, 1);
    }

    #[tokio::test]
    async fn re_adding_an_id_does_not_reset_it() {
        let tracker = tracker_with("a").await;
        tracker.start("a").await.unwrap();
        tracker.add(DownloadItem::new("a".into(), "Other", "Other", "", "")).await;
        let item = tracker.get("a").await.unwrap();
        assert_eq!(item.status, ItemStatus::Downloading);
        assert_eq!(item.track_name, "X");
    }

    #[test]
    fn minted_ids_are_unique() {
        let tracker = QueueTracker::new();
        let ids: HashSet<_> = (0..1000).map(|_| tracker.next_item_id("abc123")).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.starts_with("abc123-")));
    }

    #[test]
    fn downloading_flag_follows_guards() {
        let tracker = QueueTracker::new();
        assert!(!tracker.is_downloading());
        let first = tracker.begin_download();
        let second = tracker.begin_download();
        drop(first);
        assert!(tracker.is_downloading());
        drop(second);
        assert!(!tracker.is_downloading());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_workers_keep_the_registry_consistent() {
        let tracker = Arc::new(QueueTracker::new());
        let mut handles = Vec::new();
        for n in 0..64 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                let id = tracker.add_to_queue("track", "X", "Y", "", "").await;
                let _guard = tracker.begin_download();
                tracker.start(&id).await.unwrap();
                if n % 2 == 0 {
                    tracker.complete(&id, PathBuf::from(&id), 1.0).await.unwrap();
                } else {
                    tracker.fail(&id, "err").await.unwrap();
                }
                // polling readers interleave with writers
                tracker.snapshot().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snap = tracker.snapshot().await;
        assert_eq!(snap.items.len(), 64);
        assert_eq!((snap.completed, snap.failed), (32, 32));
        assert_eq!(snap.total_downloaded_mb, 32.0);
        assert!(!snap.is_downloading);
    }
}

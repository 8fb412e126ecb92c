//! Expiry sweeper
//!
//! A recurring background task that deletes stored files once their expiry
//! has passed. The task can be started and stopped at runtime, and a sweep
//! can be triggered on demand.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::storage::{FileKind, FileStore, StoreError};

/// Orphaned sidecars and staging files younger than this are left alone
const ORPHAN_GRACE_MINUTES: i64 = 60;

/// Outcome of a single sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    /// Ids removed by this sweep
    pub deleted: Vec<String>,
    /// Expired files that could not be removed
    pub failed: usize,
    pub orphans_removed: usize,
    pub swept_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweeperStatus {
    pub running: bool,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub files_deleted_last_sweep: usize,
    pub interval_secs: u64,
    pub ttl_hours: i64,
}

// ============================================================================
// Expiry Sweeper
// ============================================================================

#[derive(Clone)]
pub struct ExpirySweeper {
    inner: Arc<SweeperInner>,
}

struct SweeperInner {
    store: FileStore,
    interval: Duration,
    task: Mutex<Option<RunningTask>>,
    stats: Mutex<SweepStats>,
}

struct RunningTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct SweepStats {
    last_sweep_at: Option<DateTime<Utc>>,
    files_deleted_last_sweep: usize,
}

impl ExpirySweeper {
    pub fn new(store: FileStore, interval: Duration) -> Self {
        Self {
            inner: Arc::new(SweeperInner {
                store,
                interval,
                task: Mutex::new(None),
                stats: Mutex::new(SweepStats::default()),
            }),
        }
    }

    /// Spawn the periodic task
    ///
    /// Returns `false` without spawning anything if the task is already
    /// running. Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut task = self.inner.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let sweeper = self.clone();
        let handle = tokio::spawn(async move { sweeper.run(stop_rx).await });
        *task = Some(RunningTask { stop_tx, handle });

        tracing::info!(interval_secs = self.inner.interval.as_secs(), "Expiry sweeper started");
        true
    }

    /// Signal the periodic task and wait for it to exit
    ///
    /// Returns `false` if the sweeper was not running.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.inner.task.lock().take() else {
            return false;
        };

        let _ = running.stop_tx.send(true);
        if let Err(e) = running.handle.await {
            tracing::warn!(error = %e, "Expiry sweeper task ended abnormally");
        }

        tracing::info!("Expiry sweeper stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub fn status(&self) -> SweeperStatus {
        let stats = self.inner.stats.lock();
        SweeperStatus {
            running: self.is_running(),
            last_sweep_at: stats.last_sweep_at,
            files_deleted_last_sweep: stats.files_deleted_last_sweep,
            interval_secs: self.inner.interval.as_secs(),
            ttl_hours: self.inner.store.ttl().num_hours(),
        }
    }

    /// Run one sweep now, whether or not the periodic task is running
    pub async fn manual_sweep(&self) -> Result<SweepReport, StoreError> {
        let now = Utc::now();
        let mut report = SweepReport {
            deleted: Vec::new(),
            failed: 0,
            orphans_removed: 0,
            swept_at: now,
        };

        for kind in FileKind::ALL {
            for entry in self.inner.store.entries(kind).await? {
                if !entry.is_expired_at(now) {
                    continue;
                }
                match self.inner.store.delete(&entry.id).await {
                    Ok(()) => report.deleted.push(entry.id),
                    // Removed by a request in the meantime
                    Err(StoreError::NotFound(_)) => {}
                    Err(e) => {
                        tracing::warn!(file_id = %entry.id, error = %e, "Failed to delete expired file");
                        report.failed += 1;
                    }
                }
            }
        }

        match self
            .inner
            .store
            .prune_orphans(chrono::Duration::minutes(ORPHAN_GRACE_MINUTES))
            .await
        {
            Ok(count) => report.orphans_removed = count,
            Err(e) => tracing::warn!(error = %e, "Failed to prune orphaned files"),
        }

        {
            let mut stats = self.inner.stats.lock();
            stats.last_sweep_at = Some(now);
            stats.files_deleted_last_sweep = report.deleted.len();
        }

        if report.deleted.is_empty() {
            tracing::debug!("Sweep found no expired files");
        } else {
            tracing::info!(
                count = report.deleted.len(),
                failed = report.failed,
                "Swept expired files"
            );
        }

        Ok(report)
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.inner.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.manual_sweep().await {
                        tracing::warn!(error = %e, "Sweep failed");
                    }
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup(ttl: chrono::Duration, interval: Duration) -> (TempDir, FileStore, ExpirySweeper) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path(), ttl).await.unwrap();
        let sweeper = ExpirySweeper::new(store.clone(), interval);
        (temp_dir, store, sweeper)
    }

    #[tokio::test]
    async fn test_manual_sweep_removes_expired() {
        let (_dir, store, sweeper) = setup(chrono::Duration::zero(), Duration::from_secs(3600)).await;
        store.put(FileKind::Pdf, "a.pdf", b"a").await.unwrap();
        store.put(FileKind::Pptx, "b", b"b").await.unwrap();

        let report = sweeper.manual_sweep().await.unwrap();
        assert_eq!(report.deleted.len(), 2);
        assert_eq!(report.failed, 0);
        assert!(store.entries(FileKind::Pdf).await.unwrap().is_empty());
        assert!(store.entries(FileKind::Pptx).await.unwrap().is_empty());

        let status = sweeper.status();
        assert_eq!(status.files_deleted_last_sweep, 2);
        assert!(status.last_sweep_at.is_some());
        assert!(!status.running);
    }

    #[tokio::test]
    async fn test_manual_sweep_keeps_live_files() {
        let (_dir, store, sweeper) = setup(chrono::Duration::hours(1), Duration::from_secs(3600)).await;
        let stored = store.put(FileKind::Pdf, "a.pdf", b"a").await.unwrap();

        let report = sweeper.manual_sweep().await.unwrap();
        assert!(report.deleted.is_empty());
        assert!(store.get(&stored.id).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_delete_does_not_stop_sweep() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store, sweeper) = setup(chrono::Duration::zero(), Duration::from_secs(3600)).await;
        let stuck = store.put(FileKind::Pdf, "a.pdf", b"a").await.unwrap();
        let removable = store.put(FileKind::Pptx, "b", b"b").await.unwrap();

        let pdf_dir = store.kind_dir(FileKind::Pdf);
        std::fs::set_permissions(&pdf_dir, std::fs::Permissions::from_mode(0o555)).unwrap();
        // Permission bits do not bind root
        if std::fs::write(pdf_dir.join("write-check"), b"x").is_ok() {
            std::fs::remove_file(pdf_dir.join("write-check")).unwrap();
            std::fs::set_permissions(&pdf_dir, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let report = sweeper.manual_sweep().await;
        std::fs::set_permissions(&pdf_dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        let report = report.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, vec![removable.id.clone()]);
        assert!(store.get(&stuck.id).await.is_ok());
        assert!(store.get(&removable.id).await.is_err());
        assert_eq!(sweeper.status().files_deleted_last_sweep, 1);
    }

    #[tokio::test]
    async fn test_start_stop_transitions() {
        let (_dir, _store, sweeper) = setup(chrono::Duration::hours(1), Duration::from_secs(3600)).await;

        assert!(sweeper.start());
        assert!(!sweeper.start());
        assert!(sweeper.status().running);

        assert!(sweeper.stop().await);
        assert!(!sweeper.status().running);
        assert!(!sweeper.stop().await);

        // Restartable after a stop
        assert!(sweeper.start());
        assert!(sweeper.stop().await);
    }

    #[tokio::test]
    async fn test_periodic_sweep_runs() {
        let (_dir, store, sweeper) = setup(chrono::Duration::zero(), Duration::from_millis(50)).await;
        store.put(FileKind::Pdf, "a.pdf", b"a").await.unwrap();

        assert!(sweeper.start());
        tokio::time::sleep(Duration::from_millis(300)).await;
        sweeper.stop().await;

        assert!(store.entries(FileKind::Pdf).await.unwrap().is_empty());
        assert!(sweeper.status().last_sweep_at.is_some());
    }

    #[tokio::test]
    async fn test_open_stream_survives_sweep() {
        use tokio::io::AsyncReadExt;

        let (_dir, store, sweeper) = setup(chrono::Duration::hours(1), Duration::from_secs(3600)).await;
        let stored = store.put(FileKind::Pdf, "a.pdf", b"streamed bytes").await.unwrap();
        let (_, mut file) = store.open_file(&stored.id).await.unwrap();

        store.delete(&stored.id).await.unwrap();
        sweeper.manual_sweep().await.unwrap();

        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"streamed bytes");
        assert!(matches!(store.get(&stored.id).await, Err(StoreError::NotFound(_))));
    }
}

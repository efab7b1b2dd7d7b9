//! Background task that walks queued crawls through simulated progress.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ProcessorConfig;
use crate::error::Result;
use crate::models::{CrawlJob, CrawlStatus};
use crate::store::CrawlStore;
use crate::telemetry::CrawlMetrics;

/// Wakes the processor when work is queued.
#[derive(Debug, Clone, Default)]
pub struct QueueNotifier {
    notify: Arc<Notify>,
}

impl QueueNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake the processor. A wake-up sent while it is busy is kept for the next wait.
    pub fn notify(&self) {
        self.notify.notify_one();
    }

    async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Counters for processed crawls.
#[derive(Debug, Clone, Default)]
pub struct ProcessorStats {
    pub processed: Arc<AtomicU64>,
    pub succeeded: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,
    /// Stopped or deleted while running
    pub aborted: Arc<AtomicU64>,
}

impl ProcessorStats {
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn aborted(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }
}

/// Whether the background task is still running. Shared with health checks.
#[derive(Debug, Clone, Default)]
pub struct ProcessorLiveness(Arc<AtomicBool>);

impl ProcessorLiveness {
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, alive: bool) {
        self.0.store(alive, Ordering::Release);
    }

    /// Mark alive until the returned guard drops, including on unwind.
    fn mark_alive(&self) -> AliveGuard {
        self.set(true);
        AliveGuard(self.clone())
    }
}

struct AliveGuard(ProcessorLiveness);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        CrawlMetrics::set_processor_active(false);
        self.0.set(false);
    }
}

/// Percentage reached after `step` of `steps`.
fn progress_at(step: u32, steps: u32) -> i32 {
    (u64::from(step) * 100 / u64::from(steps.max(1))) as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Aborted,
}

/// Handle for controlling a running processor.
pub struct ProcessorHandle {
    shutdown: watch::Sender<bool>,
    stats: ProcessorStats,
    liveness: ProcessorLiveness,
    task: JoinHandle<()>,
}

impl ProcessorHandle {
    /// Signal the processor to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal shutdown and wait for the task to exit.
    pub async fn stop(self) {
        self.shutdown();
        if let Err(e) = self.task.await {
            error!(error = %e, "Crawl processor task failed");
        }
    }

    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }

    pub fn liveness(&self) -> ProcessorLiveness {
        self.liveness.clone()
    }
}

/// Processes one crawl at a time from the store's queue.
pub struct CrawlProcessor {
    store: Arc<dyn CrawlStore>,
    config: ProcessorConfig,
    notifier: QueueNotifier,
    stats: ProcessorStats,
}

impl CrawlProcessor {
    pub fn new(store: Arc<dyn CrawlStore>, config: ProcessorConfig, notifier: QueueNotifier) -> Self {
        Self {
            store,
            config,
            notifier,
            stats: ProcessorStats::default(),
        }
    }

    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }

    /// Process the oldest queued crawl, if any. Returns whether one was claimed.
    pub async fn run_once(&self) -> Result<bool> {
        let Some(job) = self.store.claim_next_queued().await? else {
            return Ok(false);
        };

        let started = Instant::now();
        info!(crawl_id = job.id, url = %job.url, "Processing crawl");
        CrawlMetrics::set_processor_active(true);
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        let result = self.simulate(&job).await;
        CrawlMetrics::set_processor_active(false);
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(Outcome::Completed) => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                CrawlMetrics::record_finished("done", elapsed);
                info!(crawl_id = job.id, elapsed_secs = elapsed, "Crawl completed");
            }
            Ok(Outcome::Aborted) => {
                self.stats.aborted.fetch_add(1, Ordering::Relaxed);
                info!(crawl_id = job.id, "Crawl stopped or deleted while running");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                CrawlMetrics::record_finished("error", elapsed);
                warn!(crawl_id = job.id, error = %e, "Crawl failed");

                let message = e.to_string();
                if let Err(mark_err) = self
                    .store
                    .finish_crawl(job.id, CrawlStatus::Error, Some(&message))
                    .await
                {
                    error!(crawl_id = job.id, error = %mark_err, "Could not record crawl failure");
                }
            }
        }

        Ok(true)
    }

    async fn simulate(&self, job: &CrawlJob) -> Result<Outcome> {
        let steps = self.config.steps.max(1);

        for step in 1..=steps {
            tokio::time::sleep(self.config.step_delay).await;

            let progress = progress_at(step, steps);
            if !self.store.update_progress(job.id, progress).await? {
                return Ok(Outcome::Aborted);
            }
            debug!(crawl_id = job.id, progress, "Crawl progress");
        }

        if self
            .store
            .finish_crawl(job.id, CrawlStatus::Done, None)
            .await?
        {
            Ok(Outcome::Completed)
        } else {
            Ok(Outcome::Aborted)
        }
    }

    /// Drain the queue, stopping early on shutdown.
    async fn drain(&self, shutdown: &watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    error!(error = %e, "Failed to claim queued crawl");
                    break;
                }
            }
        }
    }

    /// Reset orphaned jobs and spawn the processing loop.
    pub async fn start(self) -> Result<ProcessorHandle> {
        let orphaned = self.store.reset_orphaned_running().await?;
        if orphaned > 0 {
            warn!(count = orphaned, "Requeued crawls left running by a previous process");
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let stats = self.stats.clone();
        let liveness = ProcessorLiveness::default();
        let alive = liveness.mark_alive();

        let task = tokio::spawn(async move {
            let _alive = alive;
            let drain_rx = shutdown_rx.clone();
            info!(
                steps = self.config.steps,
                step_delay_ms = self.config.step_delay.as_millis() as u64,
                poll_interval_ms = self.config.poll_interval.as_millis() as u64,
                "Crawl processor started"
            );

            loop {
                tokio::select! {
                    _ = self.drain(&drain_rx) => {}
                    _ = shutdown_rx.changed() => {}
                }
                if *shutdown_rx.borrow() {
                    break;
                }

                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = self.notifier.notified() => {}
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }

            // A job interrupted by shutdown goes back to the queue.
            match self.store.reset_orphaned_running().await {
                Ok(0) => {}
                Ok(count) => info!(count, "Requeued interrupted crawls"),
                Err(e) => error!(error = %e, "Failed to requeue interrupted crawls"),
            }
            info!("Crawl processor stopped");
        });

        Ok(ProcessorHandle {
            shutdown: shutdown_tx,
            stats,
            liveness,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn fast_config() -> ProcessorConfig {
        ProcessorConfig {
            enabled: true,
            poll_interval: Duration::from_millis(20),
            steps: 4,
            step_delay: Duration::from_millis(1),
        }
    }

    fn processor(store: Arc<dyn CrawlStore>) -> CrawlProcessor {
        CrawlProcessor::new(store, fast_config(), QueueNotifier::new())
    }

    #[test]
    fn test_progress_at() {
        assert_eq!(progress_at(1, 4), 25);
        assert_eq!(progress_at(3, 3), 100);
        assert_eq!(progress_at(1, 3), 33);
        assert_eq!(progress_at(u32::MAX, u32::MAX), 100);
        assert_eq!(progress_at(u32::MAX / 2, u32::MAX), 49);
    }

    #[tokio::test]
    async fn test_liveness_cleared_when_task_panics() {
        let liveness = ProcessorLiveness::default();
        let alive = liveness.mark_alive();
        assert!(liveness.is_alive());

        let task = tokio::spawn(async move {
            let _alive = alive;
            panic!("processing loop failed");
        });
        assert!(task.await.unwrap_err().is_panic());
        assert!(!liveness.is_alive());
    }

    #[tokio::test]
    async fn test_run_once_empty_queue() {
        let store: Arc<dyn CrawlStore> = Arc::new(MemoryStore::new());
        assert!(!processor(store).run_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_run_once_completes_job() {
        let store: Arc<dyn CrawlStore> = Arc::new(MemoryStore::new());
        let job = store.insert_crawl(Some(1), "https://example.com").await.unwrap();

        let processor = processor(store.clone());
        assert!(processor.run_once().await.unwrap());

        let done = store.get_crawl(job.id).await.unwrap().unwrap();
        assert_eq!(done.status, CrawlStatus::Done);
        assert_eq!(done.progress, 100);
        assert!(done.started_at.is_some());
        assert!(done.finished_at.is_some());
        assert_eq!(processor.stats().succeeded(), 1);
    }

    #[tokio::test]
    async fn test_oldest_first() {
        let store: Arc<dyn CrawlStore> = Arc::new(MemoryStore::new());
        let first = store.insert_crawl(None, "https://a.example").await.unwrap();
        let second = store.insert_crawl(None, "https://b.example").await.unwrap();

        let processor = processor(store.clone());
        processor.run_once().await.unwrap();

        let first = store.get_crawl(first.id).await.unwrap().unwrap();
        let second = store.get_crawl(second.id).await.unwrap().unwrap();
        assert_eq!(first.status, CrawlStatus::Done);
        assert_eq!(second.status, CrawlStatus::Queued);
    }

    #[tokio::test]
    async fn test_started_loop_processes_on_notify() {
        let store: Arc<dyn CrawlStore> = Arc::new(MemoryStore::new());
        let notifier = QueueNotifier::new();
        let handle = CrawlProcessor::new(
            store.clone(),
            ProcessorConfig {
                poll_interval: Duration::from_secs(60),
                ..fast_config()
            },
            notifier.clone(),
        )
        .start()
        .await
        .unwrap();
        let liveness = handle.liveness();

        let job = store.insert_crawl(None, "https://example.com").await.unwrap();
        notifier.notify();

        let mut status = CrawlStatus::Queued;
        for _ in 0..200 {
            status = store.get_crawl(job.id).await.unwrap().unwrap().status;
            if status == CrawlStatus::Done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(status, CrawlStatus::Done);
        assert!(liveness.is_alive());

        handle.stop().await;
        assert!(!liveness.is_alive());
    }

    #[tokio::test]
    async fn test_start_resets_orphans() {
        let store: Arc<dyn CrawlStore> = Arc::new(MemoryStore::new());
        let job = store.insert_crawl(None, "https://example.com").await.unwrap();
        store.claim_next_queued().await.unwrap();

        let handle = CrawlProcessor::new(
            store.clone(),
            ProcessorConfig {
                steps: 1,
                ..fast_config()
            },
            QueueNotifier::new(),
        )
        .start()
        .await
        .unwrap();

        let mut status = CrawlStatus::Running;
        for _ in 0..200 {
            status = store.get_crawl(job.id).await.unwrap().unwrap().status;
            if status == CrawlStatus::Done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.stop().await;
        assert_eq!(status, CrawlStatus::Done);
    }
}

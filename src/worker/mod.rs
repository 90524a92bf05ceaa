//! Bounded worker pool for batch jobs
//!
//! Producer-consumer over a tokio mpsc channel. A fixed number of workers pull
//! item ids from a shared receiver and run the same job function on each;
//! outcomes flow to a collector that keeps the counters.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  mpsc   ┌─────────────┐  mpsc   ┌─────────────┐
//! │  Id         │────────▶│  Worker × N │────────▶│  Collector  │──▶ StatsSnapshot
//! │  Producer   │         │  job(id)    │         │  (stats)    │
//! └─────────────┘         └─────────────┘         └─────────────┘
//! ```
//!
//! Jobs share nothing through the pool itself; whatever they coordinate on
//! (stores, fingerprints) is captured by the job closure.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ============================================================================
// Jobs
// ============================================================================

/// What a job reports back for one id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    Skipped(String),
    Failed(String),
}

#[derive(Debug)]
struct JobResult {
    job_id: u64,
    item_id: String,
    outcome: JobOutcome,
}

// ============================================================================
// Statistics
// ============================================================================

/// Pool statistics (thread-safe)
#[derive(Debug, Default)]
pub struct PoolStats {
    pub total_jobs: AtomicU64,
    pub success_count: AtomicU64,
    pub failed_count: AtomicU64,
    pub skipped_count: AtomicU64,
}

impl PoolStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, outcome: &JobOutcome) {
        let counter = match outcome {
            JobOutcome::Done => &self.success_count,
            JobOutcome::Skipped(_) => &self.skipped_count,
            JobOutcome::Failed(_) => &self.failed_count,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_jobs: self.total_jobs.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            failed_count: self.failed_count.load(Ordering::Relaxed),
            skipped_count: self.skipped_count.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_jobs: u64,
    pub success_count: u64,
    pub failed_count: u64,
    pub skipped_count: u64,
}

impl StatsSnapshot {
    /// Jobs that reported any outcome
    pub fn completed(&self) -> u64 {
        self.success_count + self.failed_count + self.skipped_count
    }
}

// ============================================================================
// Pool
// ============================================================================

#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    channel_buffer_size: usize,
}

impl WorkerPool {
    /// `workers` is clamped to at least one
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            channel_buffer_size: workers * 4,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` over every id and wait for all of them
    pub async fn run<F, Fut>(&self, ids: Vec<String>, job: F) -> StatsSnapshot
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobOutcome> + Send + 'static,
    {
        let stats = PoolStats::new();
        stats.total_jobs.store(ids.len() as u64, Ordering::Relaxed);

        tracing::info!(total = ids.len(), workers = self.workers, "Starting worker pool");

        let (job_tx, job_rx) = mpsc::channel::<(u64, String)>(self.channel_buffer_size);
        let (result_tx, mut result_rx) = mpsc::channel::<JobResult>(self.channel_buffer_size);

        let handles = self.spawn_workers(job_rx, result_tx, Arc::new(job));

        let collector_stats = Arc::clone(&stats);
        let collector = tokio::spawn(async move {
            while let Some(result) = result_rx.recv().await {
                collector_stats.record(&result.outcome);
                match &result.outcome {
                    JobOutcome::Done => {
                        tracing::debug!(job_id = result.job_id, item_id = %result.item_id, "Job completed");
                    }
                    JobOutcome::Skipped(reason) => {
                        tracing::debug!(job_id = result.job_id, item_id = %result.item_id, reason = %reason, "Job skipped");
                    }
                    JobOutcome::Failed(error) => {
                        tracing::warn!(job_id = result.job_id, item_id = %result.item_id, error = %error, "Job failed");
                    }
                }
            }
        });

        for (idx, id) in ids.into_iter().enumerate() {
            if job_tx.send((idx as u64, id)).await.is_err() {
                tracing::error!("Failed to send job - channel closed");
                break;
            }
        }
        drop(job_tx);

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task aborted");
            }
        }
        let _ = collector.await;

        let snapshot = stats.snapshot();
        tracing::info!(
            success = snapshot.success_count,
            failed = snapshot.failed_count,
            skipped = snapshot.skipped_count,
            "Worker pool completed"
        );
        snapshot
    }

    fn spawn_workers<F, Fut>(
        &self,
        job_rx: mpsc::Receiver<(u64, String)>,
        result_tx: mpsc::Sender<JobResult>,
        job: Arc<F>,
    ) -> Vec<JoinHandle<()>>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobOutcome> + Send + 'static,
    {
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
        let mut handles = Vec::with_capacity(self.workers);

        for worker_id in 0..self.workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let job = Arc::clone(&job);

            handles.push(tokio::spawn(async move {
                loop {
                    let next = {
                        let mut rx = job_rx.lock().await;
                        rx.recv().await
                    };
                    let Some((job_id, item_id)) = next else {
                        break;
                    };

                    let outcome = (*job)(item_id.clone()).await;
                    let result = JobResult {
                        job_id,
                        item_id,
                        outcome,
                    };
                    if result_tx.send(result).await.is_err() {
                        break;
                    }
                }
                tracing::debug!(worker_id, "Worker finished");
            }));
        }

        handles
    }
}

//! Post job queue
//!
//! A single background worker drains an in-process channel of post jobs.
//! Runs directly in a background task rather than behind an external job
//! broker; acknowledgment therefore never waits on document creation. Each
//! job is attempted up to the configured limit with exponentially doubling
//! backoff between attempts; a terminally failed job is logged and dropped,
//! it never blocks the rest of the batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::mapper::MapperContext;
use super::resolve::BatchCaches;
use super::rows::RowRecord;
use super::IngestError;
use crate::config::IngestConfig;

/// One row's worth of asynchronous work
#[derive(Debug, Clone)]
pub struct PostJob {
    pub row: RowRecord,
    pub dataset: String,
    /// Caches of the batch this job belongs to.
    pub caches: Arc<BatchCaches>,
}

/// Attempt limit and backoff schedule for failed jobs
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: u32,
    base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_backoff_ms: u64) -> Self {
        Self {
            // A job always runs at least once.
            attempts: attempts.max(1),
            base_backoff: Duration::from_millis(base_backoff_ms),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.job_attempts, config.job_backoff_ms)
    }

    /// Delay before the attempt after `attempt` (1-based), doubling each
    /// time.
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(1u32 << (attempt - 1).min(16))
    }
}

/// Cloneable handle for submitting jobs to the worker
#[derive(Clone)]
pub struct JobSender {
    tx: mpsc::UnboundedSender<PostJob>,
    closed: Arc<AtomicBool>,
}

impl JobSender {
    /// Wrap a raw channel; lets tests observe dispatch without a worker.
    pub(crate) fn from_channel(tx: mpsc::UnboundedSender<PostJob>) -> Self {
        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn enqueue(&self, job: PostJob) -> Result<(), IngestError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(queue_closed());
        }
        self.tx.send(job).map_err(|_| queue_closed())
    }
}

fn queue_closed() -> IngestError {
    IngestError::Queue("job queue is not accepting work".to_string())
}

/// The running queue: one channel, one worker task
pub struct JobQueue {
    sender: JobSender,
    stop: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

impl JobQueue {
    /// Spawn the worker and hand back the queue
    pub fn start(context: MapperContext, policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = oneshot::channel();
        let worker = tokio::spawn(run_worker(rx, stop_rx, context, policy));
        Self {
            sender: JobSender::from_channel(tx),
            stop,
            worker,
        }
    }

    pub fn sender(&self) -> JobSender {
        self.sender.clone()
    }

    /// Stop accepting jobs and wait for the worker to drain the channel.
    /// Outstanding sender handles stay valid but refuse further work, so
    /// shutdown never waits on them being dropped.
    pub async fn shutdown(self) {
        self.sender.closed.store(true, Ordering::SeqCst);
        drop(self.sender);
        let _ = self.stop.send(());
        if let Err(error) = self.worker.await {
            tracing::error!(error = %error, "Queue worker panicked");
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<PostJob>,
    mut stop: oneshot::Receiver<()>,
    context: MapperContext,
    policy: RetryPolicy,
) {
    tracing::debug!(attempts = policy.attempts, "Queue worker started");

    loop {
        tokio::select! {
            // Queued jobs take priority over the stop signal so the
            // channel is drained before the worker exits.
            biased;
            job = rx.recv() => match job {
                Some(job) => process_with_retry(&context, &policy, &job).await,
                None => break,
            },
            _ = &mut stop => {
                while let Ok(job) = rx.try_recv() {
                    process_with_retry(&context, &policy, &job).await;
                }
                break;
            },
        }
    }

    tracing::debug!("Queue worker stopped");
}

async fn process_with_retry(context: &MapperContext, policy: &RetryPolicy, job: &PostJob) {
    for attempt in 1..=policy.attempts {
        match context
            .process_row(&job.row, &job.dataset, &job.caches)
            .await
        {
            Ok(id) => {
                tracing::debug!(slug = %job.row.slug, id = %id, attempt, "Job finished");
                return;
            },
            Err(error) if attempt < policy.attempts => {
                let delay = policy.backoff_for(attempt);
                tracing::warn!(
                    slug = %job.row.slug,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error.description(),
                    "Job attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            },
            Err(error) => {
                tracing::error!(
                    slug = %job.row.slug,
                    attempts = policy.attempts,
                    error = %error.description(),
                    "Job failed terminally"
                );
            },
        }
    }
}

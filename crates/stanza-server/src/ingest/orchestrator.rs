//! Batch orchestration
//!
//! Walks a parsed batch row by row: validate, then hand valid rows to the
//! job queue, pacing dispatch with a configurable inter-row delay so the
//! content store is never hit with a burst. A row that fails validation or
//! enqueueing is recorded and skipped; it never stops the batch. When
//! dispatch finishes, the error report goes out in the background and the
//! outcome is returned to the caller immediately.

use std::sync::Arc;
use std::time::Duration;

use super::queue::{JobSender, PostJob};
use super::report::ReportMailer;
use super::resolve::BatchCaches;
use super::rows::RowRecord;
use super::validate::validate_row;
use super::{ErrorRecord, IngestError};
use crate::config::IngestConfig;

/// What happened to one submitted batch
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub total: usize,
    pub enqueued: usize,
    pub errors: Vec<ErrorRecord>,
}

/// Dispatches batches into the job queue
pub struct Orchestrator {
    sender: JobSender,
    mailer: Arc<ReportMailer>,
    row_delay: Duration,
}

impl Orchestrator {
    pub fn new(sender: JobSender, mailer: Arc<ReportMailer>, config: &IngestConfig) -> Self {
        Self {
            sender,
            mailer,
            row_delay: Duration::from_millis(config.row_delay_ms),
        }
    }

    /// Validate and enqueue every row of one batch
    ///
    /// Returns once dispatch is complete; document creation continues in
    /// the queue worker, and the report email is sent in the background.
    #[tracing::instrument(skip(self, rows), fields(total = rows.len(), dataset = %dataset))]
    pub async fn run_batch(&self, rows: Vec<RowRecord>, dataset: &str) -> BatchOutcome {
        let caches = Arc::new(BatchCaches::default());
        let total = rows.len();
        let mut enqueued = 0;
        let mut errors = Vec::new();

        for (index, row) in rows.into_iter().enumerate() {
            if index > 0 && !self.row_delay.is_zero() {
                tokio::time::sleep(self.row_delay).await;
            }

            if let Err(message) = validate_row(&row) {
                let error = IngestError::Validation(message);
                tracing::warn!(slug = %row.slug, error = %error.description(), "Row rejected");
                errors.push(ErrorRecord::new(&row.slug, &error));
                continue;
            }

            let job = PostJob {
                dataset: dataset.to_string(),
                caches: Arc::clone(&caches),
                row,
            };
            let slug = job.row.slug.clone();

            match self.sender.enqueue(job) {
                Ok(()) => enqueued += 1,
                Err(error) => {
                    tracing::error!(slug = %slug, error = %error.description(), "Enqueue failed");
                    errors.push(ErrorRecord::new(&slug, &error));
                },
            }
        }

        tracing::info!(total, enqueued, failed = errors.len(), "Batch dispatched");

        let mailer = Arc::clone(&self.mailer);
        let report_errors = errors.clone();
        tokio::spawn(async move {
            mailer.send_report(total, &report_errors).await;
        });

        BatchOutcome {
            total,
            enqueued,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportConfig;
    use std::time::Instant;

    fn test_orchestrator(sender: JobSender, row_delay_ms: u64) -> Orchestrator {
        let config = IngestConfig {
            job_attempts: 1,
            job_backoff_ms: 1,
            row_delay_ms,
            image_fetch_timeout_secs: 5,
        };
        // No API key configured, so reporting is a logged no-op in tests.
        let mailer = ReportMailer::new(ReportConfig {
            api_base_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            to: Vec::new(),
            from_email: "noreply@example.com".to_string(),
            from_name: "Stanza".to_string(),
        })
        .unwrap();
        Orchestrator::new(sender, Arc::new(mailer), &config)
    }

    fn valid_row(slug: &str) -> RowRecord {
        RowRecord {
            body: "<p>body</p>".to_string(),
            meta: "meta".to_string(),
            title: "title".to_string(),
            author: "Jane".to_string(),
            language: "English".to_string(),
            category: "News".to_string(),
            slug: slug.to_string(),
            image_url: "https://img.example/cover.png".to_string(),
            ..RowRecord::default()
        }
    }

    fn drain_queue() -> (JobSender, tokio::sync::mpsc::UnboundedReceiver<PostJob>) {
        // A bare channel stands in for the queue so dispatch can be
        // observed without a worker.
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (test_sender(tx), rx)
    }

    fn test_sender(tx: tokio::sync::mpsc::UnboundedSender<PostJob>) -> JobSender {
        JobSender::from_channel(tx)
    }

    #[tokio::test]
    async fn test_invalid_rows_are_recorded_and_skipped() {
        let (sender, mut rx) = drain_queue();
        let orchestrator = test_orchestrator(sender, 0);

        let mut bad = valid_row("no-title");
        bad.title.clear();
        let rows = vec![valid_row("first"), bad, valid_row("second")];

        let outcome = orchestrator.run_batch(rows, "staging").await;

        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.enqueued, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].slug, "no-title");
        assert_eq!(
            outcome.errors[0].error_description,
            "Validation Error - \"Title\" is not allowed to be empty"
        );

        assert_eq!(rx.recv().await.unwrap().row.slug, "first");
        assert_eq!(rx.recv().await.unwrap().row.slug, "second");
    }

    #[tokio::test]
    async fn test_jobs_share_one_batch_cache() {
        let (sender, mut rx) = drain_queue();
        let orchestrator = test_orchestrator(sender, 0);

        orchestrator
            .run_batch(vec![valid_row("a"), valid_row("b")], "staging")
            .await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(Arc::ptr_eq(&first.caches, &second.caches));
    }

    #[tokio::test]
    async fn test_dispatch_is_paced_between_rows() {
        let (sender, _rx) = drain_queue();
        let orchestrator = test_orchestrator(sender, 20);

        let started = Instant::now();
        orchestrator
            .run_batch(vec![valid_row("a"), valid_row("b"), valid_row("c")], "staging")
            .await;

        // Two gaps between three rows.
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_closed_queue_becomes_row_errors() {
        let (sender, rx) = drain_queue();
        drop(rx);
        let orchestrator = test_orchestrator(sender, 0);

        let outcome = orchestrator.run_batch(vec![valid_row("a")], "staging").await;

        assert_eq!(outcome.enqueued, 0);
        assert_eq!(
            outcome.errors[0].error_description,
            "Queue Error - job queue is not accepting work"
        );
    }
}

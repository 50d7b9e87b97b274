use super::indexer::IndexingService;
use super::pipeline::{PipelineExecutor, RunOutcome};
use crate::domain::jobs::Job;
use crate::ports::index::{TextIndex, VectorStore};
use crate::ports::queue::{Delivery, JobQueuePort};
use crate::ports::repository::{StatusTracker, SubtitleRepository};
use crate::ports::BoxError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Seconds a consumer blocks on the queue before checking for shutdown
const POLL_TIMEOUT_SECS: f64 = 5.0;

/// What a worker did with one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    Analyze(RunOutcome),
    Index { indexed: usize, failed: usize },
    IndexFailed(String),
}

/// Consumes the shared queue and routes each job to its service.
pub struct WorkerService<Q, R, V, T> {
    queue: Q,
    executor: PipelineExecutor<Q, R, V>,
    indexer: IndexingService<T>,
}

impl<Q, R, V, T> WorkerService<Q, R, V, T>
where
    Q: JobQueuePort + Clone + 'static,
    R: StatusTracker + SubtitleRepository + 'static,
    V: VectorStore + 'static,
    T: TextIndex + 'static,
{
    pub fn new(
        queue: Q,
        executor: PipelineExecutor<Q, R, V>,
        indexer: IndexingService<T>,
    ) -> Self {
        Self {
            queue,
            executor,
            indexer,
        }
    }

    /// Shutdown is only observed while waiting for a job. A delivery that
    /// was taken is always handled and acknowledged.
    pub async fn run_worker_loop(&self, worker_id: usize, shutdown: CancellationToken) {
        info!(worker = worker_id, "worker started");
        loop {
            let dequeued = tokio::select! {
                _ = shutdown.cancelled() => break,
                dequeued = self.queue.dequeue_job(POLL_TIMEOUT_SECS) => dequeued,
            };
            match dequeued {
                Ok(Some(delivery)) => match self.complete(delivery).await {
                    Ok(handled) => debug!(worker = worker_id, ?handled, "job handled"),
                    Err(e) => error!(worker = worker_id, error = %e, "failed to acknowledge job"),
                },
                Ok(None) => continue,
                Err(e) => {
                    error!(worker = worker_id, error = %e, "queue error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        info!(worker = worker_id, "worker stopped");
    }

    /// Wait up to `timeout_secs` for one job, handle it and acknowledge it.
    pub async fn process_next(&self, timeout_secs: f64) -> Result<Option<Handled>, BoxError> {
        match self.queue.dequeue_job(timeout_secs).await? {
            Some(delivery) => Ok(Some(self.complete(delivery).await?)),
            None => Ok(None),
        }
    }

    async fn complete(&self, delivery: Delivery) -> Result<Handled, BoxError> {
        let handled = self.handle(&delivery).await;
        // Retries are separate messages, this delivery is done either way
        self.queue.ack_job(&delivery).await?;
        Ok(handled)
    }

    async fn handle(&self, delivery: &Delivery) -> Handled {
        match &delivery.job {
            Job::Analyze(job) => Handled::Analyze(self.executor.run(job).await),
            Job::Index(job) => match self.indexer.index_batch(job).await {
                Ok(summary) => Handled::Index {
                    indexed: summary.indexed,
                    failed: summary.failed,
                },
                Err(e) => {
                    warn!(video_id = job.video_id, error = %e, "indexing sub-job failed");
                    Handled::IndexFailed(e.to_string())
                }
            },
        }
    }
}

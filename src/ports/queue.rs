use super::BoxError;
use crate::domain::jobs::Job;
use async_trait::async_trait;
use std::time::Duration;

/// A job handed to one consumer. It stays in flight until acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub job: Job,
    /// Adapter-specific handle used to acknowledge the job
    pub receipt: String,
}

/// Shared work queue with at-least-once delivery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueuePort: Send + Sync {
    /// Enqueue a job
    async fn enqueue_job(&self, job: Job) -> Result<(), BoxError>;

    /// Enqueue a job that becomes visible to consumers after `delay`
    async fn enqueue_job_delayed(&self, job: Job, delay: Duration) -> Result<(), BoxError>;

    /// Dequeue a job (blocking with timeout)
    /// timeout_secs: 0.0 for infinite (or long poll), >0.0 for specific timeout
    async fn dequeue_job(&self, timeout_secs: f64) -> Result<Option<Delivery>, BoxError>;

    /// Remove a handled job from the consumer's in-flight set
    async fn ack_job(&self, delivery: &Delivery) -> Result<(), BoxError>;

    /// Put jobs this consumer never acknowledged back on the queue.
    /// Returns how many jobs were redelivered.
    async fn recover_inflight(&self) -> Result<usize, BoxError>;
}

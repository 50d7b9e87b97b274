//! Redis connection pool.

use super::error::QueueError;
use super::INFLIGHT_PREFIX;
use deadpool_redis::{Config, Pool, Runtime};

/// Redis-backed adapter for queue and repository operations.
#[derive(Clone)]
pub struct RedisPool {
    pub(super) pool: Pool,
    pub(super) consumer: String,
}

impl RedisPool {
    /// Create a new RedisPool with connection pool.
    ///
    /// `consumer` names the in-flight list of this process; a restarted
    /// worker must reuse it to recover its unacknowledged jobs.
    pub fn new(redis_url: &str, consumer: &str) -> Result<Self, QueueError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self {
            pool,
            consumer: consumer.to_string(),
        })
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    pub(super) fn inflight_key(&self) -> String {
        format!("{}{}", INFLIGHT_PREFIX, self.consumer)
    }
}

//! Redis JobQueuePort implementation.
//!
//! Jobs are JSON strings in a list. A dequeue moves the payload into the
//! consumer's in-flight list, and the ack removes it from there. Delayed jobs
//! wait in a sorted set scored by their due time in unix milliseconds.

use super::error::QueueError;
use super::pool::RedisPool;
use super::{DELAYED_QUEUE, JOB_QUEUE};
use crate::domain::jobs::Job;
use crate::ports::queue::{Delivery, JobQueuePort};
use crate::ports::BoxError;
use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::Connection;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Upper bound of delayed jobs moved per dequeue call
const PROMOTE_BATCH: isize = 100;

fn unix_millis(at: SystemTime) -> i64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl RedisPool {
    /// Move due delayed jobs to the main list.
    ///
    /// ZREM decides which consumer owns a due job, so concurrent
    /// promoters never push the same payload twice.
    async fn promote_due(&self, conn: &mut Connection) -> Result<usize, QueueError> {
        let now = unix_millis(SystemTime::now());
        let due: Vec<String> = conn
            .zrangebyscore_limit(DELAYED_QUEUE, "-inf", now, 0, PROMOTE_BATCH)
            .await?;

        let mut promoted = 0;
        for payload in due {
            let removed: i64 = conn.zrem(DELAYED_QUEUE, &payload).await?;
            if removed == 1 {
                conn.lpush::<_, _, ()>(JOB_QUEUE, &payload).await?;
                promoted += 1;
            }
        }
        if promoted > 0 {
            debug!(promoted, "delayed jobs promoted");
        }
        Ok(promoted)
    }
}

#[async_trait]
impl JobQueuePort for RedisPool {
    async fn enqueue_job(&self, job: Job) -> Result<(), BoxError> {
        let mut conn = self.pool.get().await.map_err(QueueError::from)?;
        let json = serde_json::to_string(&job)?;
        conn.lpush::<_, _, ()>(JOB_QUEUE, json)
            .await
            .map_err(QueueError::from)?;
        Ok(())
    }

    async fn enqueue_job_delayed(&self, job: Job, delay: Duration) -> Result<(), BoxError> {
        let mut conn = self.pool.get().await.map_err(QueueError::from)?;
        let json = serde_json::to_string(&job)?;
        let due = unix_millis(SystemTime::now() + delay);
        conn.zadd::<_, _, _, ()>(DELAYED_QUEUE, json, due)
            .await
            .map_err(QueueError::from)?;
        Ok(())
    }

    async fn dequeue_job(&self, timeout_secs: f64) -> Result<Option<Delivery>, BoxError> {
        let mut conn = self.pool.get().await.map_err(QueueError::from)?;
        self.promote_due(&mut conn).await?;

        let inflight = self.inflight_key();
        let payload: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(JOB_QUEUE)
            .arg(&inflight)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await
            .map_err(QueueError::from)?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        match serde_json::from_str::<Job>(&payload) {
            Ok(job) => Ok(Some(Delivery {
                job,
                receipt: payload,
            })),
            Err(e) => {
                // A payload that never parses would be redelivered forever
                warn!(error = %e, payload = %payload, "discarding malformed job");
                conn.lrem::<_, _, ()>(&inflight, 1, &payload)
                    .await
                    .map_err(QueueError::from)?;
                Ok(None)
            }
        }
    }

    async fn ack_job(&self, delivery: &Delivery) -> Result<(), BoxError> {
        let mut conn = self.pool.get().await.map_err(QueueError::from)?;
        conn.lrem::<_, _, ()>(self.inflight_key(), 1, &delivery.receipt)
            .await
            .map_err(QueueError::from)?;
        Ok(())
    }

    async fn recover_inflight(&self) -> Result<usize, BoxError> {
        let mut conn = self.pool.get().await.map_err(QueueError::from)?;
        let inflight = self.inflight_key();
        let mut recovered = 0;
        loop {
            let moved: Option<String> = conn
                .rpoplpush(&inflight, JOB_QUEUE)
                .await
                .map_err(QueueError::from)?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_millis() {
        let at = UNIX_EPOCH + Duration::from_secs(90);
        assert_eq!(unix_millis(at), 90_000);
        assert_eq!(unix_millis(at + Duration::from_secs(60)), 150_000);
    }
}

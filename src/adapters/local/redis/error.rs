//! Errors of the Redis queue and job state adapter.

use crate::domain::jobs::VideoId;
use deadpool_redis::{CreatePoolError, PoolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis command failed: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),
    #[error("no redis connection available: {0}")]
    Pool(#[from] PoolError),
    #[error("invalid redis url: {0}")]
    CreatePool(#[from] CreatePoolError),
    #[error("stored payload is not valid json: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("no job record for video {0}")]
    UnknownJob(VideoId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_error_keeps_source() {
        let json_err = serde_json::from_str::<u64>("{").unwrap_err();
        let err = QueueError::from(json_err);
        assert!(err.to_string().starts_with("stored payload is not valid json"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_unknown_job_message() {
        assert_eq!(
            QueueError::UnknownJob(42).to_string(),
            "no job record for video 42"
        );
    }
}

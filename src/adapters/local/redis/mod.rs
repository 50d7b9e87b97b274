//! Redis adapter for local deployment.
//!
//! This module provides Redis-backed implementations of:
//! - `JobQueuePort` with per-consumer in-flight lists and delayed retries
//! - `StatusTracker` and `SubtitleRepository` for job records and subtitles

mod error;
mod pool;
mod queue;
mod repository;

pub use error::QueueError;
pub use pool::RedisPool;

/// Redis key constants
const JOB_QUEUE: &str = "vidsight:jobs";
const DELAYED_QUEUE: &str = "vidsight:jobs:delayed";
const INFLIGHT_PREFIX: &str = "vidsight:jobs:inflight:";
const VIDEO_PREFIX: &str = "vidsight:video:";
const VIDEO_ID_SEQ: &str = "vidsight:video_id_seq";
const SUBTITLES_PREFIX: &str = "vidsight:subtitles:";
const SUBTITLE_ID_SEQ: &str = "vidsight:subtitle_id_seq";

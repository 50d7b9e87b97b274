//! Local adapters: Redis state, ffmpeg extraction and an in-process embedder.

pub mod ffmpeg;
pub mod pixel_embedder;
pub mod redis;

pub use ffmpeg::FfmpegExtractor;
pub use pixel_embedder::PixelEmbedder;
pub use redis::{QueueError, RedisPool};

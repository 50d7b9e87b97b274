//! Capabilities consumed by the pipeline executor.
//!
//! Implementations are built once per worker process and shared by every
//! worker task, so they must serialize their own inference calls.

use crate::domain::errors::CapabilityError;
use crate::domain::media::{ExtractedFrames, TranscriptSegment};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Write the audio track beside the video and return its path
    async fn extract_audio(&self, video: &Path) -> Result<PathBuf, CapabilityError>;

    /// Snapshot one frame every `interval_secs` into the video's frames directory
    async fn extract_frames(
        &self,
        video: &Path,
        interval_secs: u32,
    ) -> Result<ExtractedFrames, CapabilityError>;

    /// Write a single frame taken at `timestamp_secs` to `output`
    async fn extract_frame(
        &self,
        video: &Path,
        timestamp_secs: f64,
        output: &Path,
    ) -> Result<PathBuf, CapabilityError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Timed segments ordered by start time
    async fn transcribe(&self, audio: &Path) -> Result<Vec<TranscriptSegment>, CapabilityError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    async fn embed_image(&self, frame: &Path) -> Result<Vec<f32>, CapabilityError>;

    /// Length of every vector returned by `embed_image`
    fn dimension(&self) -> usize;
}

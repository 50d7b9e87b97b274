use super::BoxError;
use crate::domain::errors::Diagnostic;
use crate::domain::jobs::{JobRecord, JobStatus, StatusView, VideoId};
use crate::domain::media::{SubtitleRecord, TranscriptSegment};
use async_trait::async_trait;

/// Persisted lifecycle state of pipeline jobs.
#[async_trait]
pub trait StatusTracker: Send + Sync {
    /// Allocate an id for a new upload
    async fn next_video_id(&self) -> Result<VideoId, BoxError>;

    /// Store a new job record (normally done by the upload endpoint)
    async fn register_job(&self, record: &JobRecord) -> Result<(), BoxError>;

    /// Read the job record, `None` if the id is unknown
    async fn get_job(&self, video_id: VideoId) -> Result<Option<JobRecord>, BoxError>;

    /// Commit a status transition. `diagnostic` replaces the stored one.
    async fn set_status(
        &self,
        video_id: VideoId,
        status: JobStatus,
        diagnostic: Option<Diagnostic>,
    ) -> Result<(), BoxError>;

    /// Status query used by external observers
    async fn get_status(&self, video_id: VideoId) -> Result<Option<StatusView>, BoxError>;
}

#[async_trait]
pub trait SubtitleRepository: Send + Sync {
    /// Persist one transcription batch, assigning ids in input order.
    /// Appends: a re-run stores a second copy.
    async fn append_subtitles(
        &self,
        video_id: VideoId,
        segments: &[TranscriptSegment],
    ) -> Result<Vec<SubtitleRecord>, BoxError>;

    /// All subtitles of a video ordered by start time
    async fn list_subtitles(&self, video_id: VideoId) -> Result<Vec<SubtitleRecord>, BoxError>;
}

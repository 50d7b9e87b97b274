use crate::domain::jobs::{AnalyzeJob, Job, JobRecord, VideoId};
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::StatusTracker;
use crate::ports::BoxError;
use std::path::Path;
use tracing::info;

/// Entry point of the pipeline: registers uploads and schedules runs.
pub struct JobDispatcher<Q, R> {
    queue: Q,
    repo: R,
}

impl<Q, R> JobDispatcher<Q, R>
where
    Q: JobQueuePort,
    R: StatusTracker,
{
    pub fn new(queue: Q, repo: R) -> Self {
        Self { queue, repo }
    }

    /// Store a `PENDING` job for an uploaded file and schedule its run.
    pub async fn register(&self, source_path: &Path) -> Result<VideoId, BoxError> {
        let video_id = self.repo.next_video_id().await?;
        let record = JobRecord::new(video_id, source_path);
        self.repo.register_job(&record).await?;
        info!(video_id, filename = %record.filename, "video registered");
        self.submit(video_id).await?;
        Ok(video_id)
    }

    /// Enqueue exactly one analysis run. Nothing is returned to the caller
    /// beyond the enqueue itself; progress is read through the status tracker.
    pub async fn submit(&self, video_id: VideoId) -> Result<(), BoxError> {
        self.queue
            .enqueue_job(Job::Analyze(AnalyzeJob::new(video_id)))
            .await?;
        info!(video_id, "analysis job submitted");
        Ok(())
    }
}

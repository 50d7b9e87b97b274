use crate::domain::errors::IndexError;
use crate::domain::jobs::IndexJob;
use crate::ports::index::{BulkSummary, IndexCreation, TextIndex};
use tracing::{debug, info, warn};

/// Runs the subtitle indexing sub-job.
pub struct IndexingService<T> {
    index: T,
}

impl<T: TextIndex> IndexingService<T> {
    pub fn new(index: T) -> Self {
        Self { index }
    }

    /// Ensure the index exists, then upsert the batch keyed by subtitle id.
    /// Errors stay within this sub-job.
    pub async fn index_batch(&self, job: &IndexJob) -> Result<BulkSummary, IndexError> {
        match self.index.create_index().await? {
            IndexCreation::Created => info!(video_id = job.video_id, "subtitle index created"),
            IndexCreation::AlreadyExists => debug!("subtitle index already exists"),
        }

        if job.records.is_empty() {
            debug!(video_id = job.video_id, "empty subtitle batch");
            return Ok(BulkSummary::default());
        }

        let summary = self.index.bulk_upsert(&job.records).await?;
        if summary.failed > 0 {
            warn!(
                video_id = job.video_id,
                indexed = summary.indexed,
                failed = summary.failed,
                "subtitle batch partially indexed"
            );
        } else {
            info!(video_id = job.video_id, indexed = summary.indexed, "subtitles indexed");
        }
        Ok(summary)
    }
}

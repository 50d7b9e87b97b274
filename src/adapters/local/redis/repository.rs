//! Redis StatusTracker and SubtitleRepository implementations.

use super::error::QueueError;
use super::pool::RedisPool;
use super::{SUBTITLES_PREFIX, SUBTITLE_ID_SEQ, VIDEO_ID_SEQ, VIDEO_PREFIX};
use crate::domain::errors::Diagnostic;
use crate::domain::jobs::{JobRecord, JobStatus, StatusView, VideoId};
use crate::domain::media::{SubtitleRecord, TranscriptSegment};
use crate::ports::repository::{StatusTracker, SubtitleRepository};
use crate::ports::BoxError;
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;

fn video_key(video_id: VideoId) -> String {
    format!("{}{}", VIDEO_PREFIX, video_id)
}

fn subtitles_key(video_id: VideoId) -> String {
    format!("{}{}", SUBTITLES_PREFIX, video_id)
}

/// Ids of a batch reserved with one INCRBY returning `last`.
fn reserved_ids(last: u64, count: usize) -> impl Iterator<Item = u64> {
    let first = last + 1 - count as u64;
    first..=last
}

#[async_trait]
impl StatusTracker for RedisPool {
    async fn next_video_id(&self) -> Result<VideoId, BoxError> {
        let mut conn = self.pool.get().await.map_err(QueueError::from)?;
        let id: u64 = conn.incr(VIDEO_ID_SEQ, 1u64).await.map_err(QueueError::from)?;
        Ok(id)
    }

    async fn register_job(&self, record: &JobRecord) -> Result<(), BoxError> {
        let mut conn = self.pool.get().await.map_err(QueueError::from)?;
        let json = serde_json::to_string(record)?;
        conn.set::<_, _, ()>(video_key(record.video_id), json)
            .await
            .map_err(QueueError::from)?;
        Ok(())
    }

    async fn get_job(&self, video_id: VideoId) -> Result<Option<JobRecord>, BoxError> {
        let mut conn = self.pool.get().await.map_err(QueueError::from)?;
        let json: Option<String> = conn
            .get(video_key(video_id))
            .await
            .map_err(QueueError::from)?;
        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn set_status(
        &self,
        video_id: VideoId,
        status: JobStatus,
        diagnostic: Option<Diagnostic>,
    ) -> Result<(), BoxError> {
        // Only the worker holding the delivery writes this record
        let mut record = self
            .get_job(video_id)
            .await?
            .ok_or(QueueError::UnknownJob(video_id))?;
        record.status = status;
        record.diagnostic = diagnostic;
        self.register_job(&record).await
    }

    async fn get_status(&self, video_id: VideoId) -> Result<Option<StatusView>, BoxError> {
        Ok(self.get_job(video_id).await?.map(|record| record.view()))
    }
}

#[async_trait]
impl SubtitleRepository for RedisPool {
    async fn append_subtitles(
        &self,
        video_id: VideoId,
        segments: &[TranscriptSegment],
    ) -> Result<Vec<SubtitleRecord>, BoxError> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await.map_err(QueueError::from)?;
        let last: u64 = conn
            .incr(SUBTITLE_ID_SEQ, segments.len() as u64)
            .await
            .map_err(QueueError::from)?;

        let records: Vec<SubtitleRecord> = reserved_ids(last, segments.len())
            .zip(segments)
            .map(|(id, segment)| SubtitleRecord {
                id,
                video_id,
                start_time: segment.start_time,
                end_time: segment.end_time,
                text: segment.text.clone(),
            })
            .collect();

        let payloads = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        conn.rpush::<_, _, ()>(subtitles_key(video_id), payloads)
            .await
            .map_err(QueueError::from)?;
        Ok(records)
    }

    async fn list_subtitles(&self, video_id: VideoId) -> Result<Vec<SubtitleRecord>, BoxError> {
        let mut conn = self.pool.get().await.map_err(QueueError::from)?;
        let payloads: Vec<String> = conn
            .lrange(subtitles_key(video_id), 0, -1)
            .await
            .map_err(QueueError::from)?;
        let mut records = payloads
            .iter()
            .map(|json| serde_json::from_str::<SubtitleRecord>(json))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_ids_end_at_counter() {
        assert_eq!(reserved_ids(10, 3).collect::<Vec<_>>(), vec![8, 9, 10]);
        assert_eq!(reserved_ids(1, 1).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_keys() {
        assert_eq!(video_key(42), "vidsight:video:42");
        assert_eq!(subtitles_key(42), "vidsight:subtitles:42");
    }
}

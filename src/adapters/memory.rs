//! In-process adapters used by tests and single-process runs.

use crate::domain::errors::{Diagnostic, IndexError};
use crate::domain::jobs::{Job, JobRecord, JobStatus, StatusView, VideoId};
use crate::domain::media::{FrameEmbedding, IndexRecord, SubtitleRecord, TranscriptSegment};
use crate::ports::index::{BulkSummary, IndexCreation, TextIndex, VectorStore};
use crate::ports::queue::{Delivery, JobQueuePort};
use crate::ports::repository::{StatusTracker, SubtitleRepository};
use crate::ports::BoxError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Job>,
    delayed: Vec<(Instant, Job)>,
    inflight: HashMap<String, Job>,
    next_receipt: u64,
}

impl QueueState {
    fn promote_due(&mut self) {
        let now = Instant::now();
        let (due, pending): (Vec<_>, Vec<_>) =
            self.delayed.drain(..).partition(|(at, _)| *at <= now);
        self.delayed = pending;
        let mut due = due;
        due.sort_by_key(|(at, _)| *at);
        self.ready.extend(due.into_iter().map(|(_, job)| job));
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.iter().map(|(at, _)| *at).min()
    }
}

/// FIFO queue with delayed jobs and an in-flight set.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs visible to consumers, in delivery order
    pub fn ready_jobs(&self) -> Vec<Job> {
        lock(&self.state).ready.iter().cloned().collect()
    }

    /// Delayed jobs with the time left before they become visible
    pub fn delayed_jobs(&self) -> Vec<(Duration, Job)> {
        let now = Instant::now();
        let mut delayed: Vec<_> = lock(&self.state)
            .delayed
            .iter()
            .map(|(at, job)| (at.saturating_duration_since(now), job.clone()))
            .collect();
        delayed.sort_by_key(|(left, _)| *left);
        delayed
    }

    pub fn inflight_count(&self) -> usize {
        lock(&self.state).inflight.len()
    }

    fn try_take(&self) -> Result<Option<Delivery>, Option<Instant>> {
        let mut state = lock(&self.state);
        state.promote_due();
        match state.ready.pop_front() {
            Some(job) => {
                state.next_receipt += 1;
                let receipt = state.next_receipt.to_string();
                state.inflight.insert(receipt.clone(), job.clone());
                Ok(Some(Delivery { job, receipt }))
            }
            None => Err(state.next_due()),
        }
    }
}

#[async_trait]
impl JobQueuePort for MemoryQueue {
    async fn enqueue_job(&self, job: Job) -> Result<(), BoxError> {
        lock(&self.state).ready.push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    async fn enqueue_job_delayed(&self, job: Job, delay: Duration) -> Result<(), BoxError> {
        lock(&self.state).delayed.push((Instant::now() + delay, job));
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue_job(&self, timeout_secs: f64) -> Result<Option<Delivery>, BoxError> {
        let deadline = (timeout_secs > 0.0)
            .then(|| Instant::now() + Duration::from_secs_f64(timeout_secs));

        loop {
            let next_due = match self.try_take() {
                Ok(delivery) => return Ok(delivery),
                Err(next_due) => next_due,
            };

            let wake_at = match (next_due, deadline) {
                (Some(due), Some(deadline)) => Some(due.min(deadline)),
                (due, deadline) => due.or(deadline),
            };

            match wake_at {
                Some(at) => {
                    let _ = tokio::time::timeout_at(at, self.notify.notified()).await;
                }
                None => self.notify.notified().await,
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return self.try_take().or(Ok(None));
                }
            }
        }
    }

    async fn ack_job(&self, delivery: &Delivery) -> Result<(), BoxError> {
        lock(&self.state).inflight.remove(&delivery.receipt);
        Ok(())
    }

    async fn recover_inflight(&self) -> Result<usize, BoxError> {
        let mut state = lock(&self.state);
        let mut recovered: Vec<_> = state.inflight.drain().collect();
        recovered.sort_by_key(|(receipt, _)| receipt.parse::<u64>().unwrap_or(u64::MAX));
        let count = recovered.len();
        for (_, job) in recovered {
            state.ready.push_back(job);
        }
        drop(state);
        if count > 0 {
            self.notify.notify_one();
        }
        Ok(count)
    }
}

#[derive(Default)]
struct StoreState {
    next_video_id: VideoId,
    next_subtitle_id: u64,
    jobs: HashMap<VideoId, JobRecord>,
    history: HashMap<VideoId, Vec<JobStatus>>,
    subtitles: BTreeMap<VideoId, Vec<SubtitleRecord>>,
    embeddings: BTreeMap<String, FrameEmbedding>,
}

/// Job records, subtitles and embeddings kept in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status committed through `set_status`, oldest first
    pub fn status_history(&self, video_id: VideoId) -> Vec<JobStatus> {
        lock(&self.state)
            .history
            .get(&video_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Stored embeddings ordered by id
    pub fn embeddings(&self) -> Vec<FrameEmbedding> {
        lock(&self.state).embeddings.values().cloned().collect()
    }
}

#[async_trait]
impl StatusTracker for MemoryStore {
    async fn next_video_id(&self) -> Result<VideoId, BoxError> {
        let mut state = lock(&self.state);
        state.next_video_id += 1;
        Ok(state.next_video_id)
    }

    async fn register_job(&self, record: &JobRecord) -> Result<(), BoxError> {
        let mut state = lock(&self.state);
        state.next_video_id = state.next_video_id.max(record.video_id);
        state.jobs.insert(record.video_id, record.clone());
        Ok(())
    }

    async fn get_job(&self, video_id: VideoId) -> Result<Option<JobRecord>, BoxError> {
        Ok(lock(&self.state).jobs.get(&video_id).cloned())
    }

    async fn set_status(
        &self,
        video_id: VideoId,
        status: JobStatus,
        diagnostic: Option<Diagnostic>,
    ) -> Result<(), BoxError> {
        let mut state = lock(&self.state);
        let record = state
            .jobs
            .get_mut(&video_id)
            .ok_or_else(|| format!("no job record for video {}", video_id))?;
        record.status = status;
        record.diagnostic = diagnostic;
        state.history.entry(video_id).or_default().push(status);
        Ok(())
    }

    async fn get_status(&self, video_id: VideoId) -> Result<Option<StatusView>, BoxError> {
        Ok(lock(&self.state).jobs.get(&video_id).map(JobRecord::view))
    }
}

#[async_trait]
impl SubtitleRepository for MemoryStore {
    async fn append_subtitles(
        &self,
        video_id: VideoId,
        segments: &[TranscriptSegment],
    ) -> Result<Vec<SubtitleRecord>, BoxError> {
        let mut state = lock(&self.state);
        let mut records = Vec::with_capacity(segments.len());
        for segment in segments {
            state.next_subtitle_id += 1;
            records.push(SubtitleRecord {
                id: state.next_subtitle_id,
                video_id,
                start_time: segment.start_time,
                end_time: segment.end_time,
                text: segment.text.clone(),
            });
        }
        state
            .subtitles
            .entry(video_id)
            .or_default()
            .extend(records.iter().cloned());
        Ok(records)
    }

    async fn list_subtitles(&self, video_id: VideoId) -> Result<Vec<SubtitleRecord>, BoxError> {
        let mut subtitles = lock(&self.state)
            .subtitles
            .get(&video_id)
            .cloned()
            .unwrap_or_default();
        subtitles.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        Ok(subtitles)
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn add_embeddings(&self, records: &[FrameEmbedding]) -> Result<(), BoxError> {
        let mut state = lock(&self.state);
        for record in records {
            state.embeddings.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
struct IndexState {
    created: bool,
    documents: BTreeMap<u64, IndexRecord>,
    create_calls: usize,
    bulk_calls: usize,
    failure: Option<String>,
}

/// Text index keyed by subtitle id.
#[derive(Clone, Default)]
pub struct MemoryTextIndex {
    state: Arc<Mutex<IndexState>>,
}

impl MemoryTextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// An index whose bulk writes are rejected with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        let index = Self::default();
        lock(&index.state).failure = Some(message.into());
        index
    }

    pub fn documents(&self) -> Vec<IndexRecord> {
        lock(&self.state).documents.values().cloned().collect()
    }

    pub fn create_calls(&self) -> usize {
        lock(&self.state).create_calls
    }

    pub fn bulk_calls(&self) -> usize {
        lock(&self.state).bulk_calls
    }
}

#[async_trait]
impl TextIndex for MemoryTextIndex {
    async fn create_index(&self) -> Result<IndexCreation, IndexError> {
        let mut state = lock(&self.state);
        state.create_calls += 1;
        if state.created {
            return Ok(IndexCreation::AlreadyExists);
        }
        state.created = true;
        Ok(IndexCreation::Created)
    }

    async fn bulk_upsert(&self, records: &[IndexRecord]) -> Result<BulkSummary, IndexError> {
        let mut state = lock(&self.state);
        state.bulk_calls += 1;
        if let Some(message) = &state.failure {
            return Err(IndexError::Bulk {
                index: "memory".to_string(),
                message: message.clone(),
            });
        }
        for record in records {
            state.documents.insert(record.id, record.clone());
        }
        Ok(BulkSummary {
            indexed: records.len(),
            failed: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::AnalyzeJob;

    #[tokio::test]
    async fn test_queue_is_fifo_and_tracks_inflight() {
        let queue = MemoryQueue::new();
        queue.enqueue_job(Job::Analyze(AnalyzeJob::new(1))).await.unwrap();
        queue.enqueue_job(Job::Analyze(AnalyzeJob::new(2))).await.unwrap();

        let first = queue.dequeue_job(0.1).await.unwrap().unwrap();
        assert_eq!(first.job.video_id(), 1);
        assert_eq!(queue.inflight_count(), 1);

        queue.ack_job(&first).await.unwrap();
        assert_eq!(queue.inflight_count(), 0);

        let second = queue.dequeue_job(0.1).await.unwrap().unwrap();
        assert_eq!(second.job.video_id(), 2);
        assert!(queue.dequeue_job(0.05).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_job_becomes_visible_after_delay() {
        let queue = MemoryQueue::new();
        queue
            .enqueue_job_delayed(Job::Analyze(AnalyzeJob::new(9)), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(queue.dequeue_job(30.0).await.unwrap().is_none());

        let delivery = queue.dequeue_job(60.0).await.unwrap().unwrap();
        assert_eq!(delivery.job.video_id(), 9);
        assert!(queue.delayed_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_recover_inflight_redelivers_unacked_jobs() {
        let queue = MemoryQueue::new();
        queue.enqueue_job(Job::Analyze(AnalyzeJob::new(5))).await.unwrap();
        let _lost = queue.dequeue_job(0.1).await.unwrap().unwrap();

        assert_eq!(queue.recover_inflight().await.unwrap(), 1);
        assert_eq!(queue.inflight_count(), 0);
        assert_eq!(queue.ready_jobs(), vec![Job::Analyze(AnalyzeJob::new(5))]);
    }

    #[tokio::test]
    async fn test_set_status_requires_record() {
        let store = MemoryStore::new();
        assert!(store
            .set_status(1, JobStatus::Processing, None)
            .await
            .is_err());

        let id = store.next_video_id().await.unwrap();
        store
            .register_job(&JobRecord::new(id, "/media/1.mp4"))
            .await
            .unwrap();
        store
            .set_status(id, JobStatus::Processing, None)
            .await
            .unwrap();
        let view = store.get_status(id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Processing);
        assert_eq!(view.filename, "1.mp4");
    }

    #[tokio::test]
    async fn test_subtitles_get_sequential_ids() {
        let store = MemoryStore::new();
        let first = store
            .append_subtitles(1, &[TranscriptSegment::new(0.0, 1.0, "a")])
            .await
            .unwrap();
        let second = store
            .append_subtitles(
                1,
                &[
                    TranscriptSegment::new(1.0, 2.0, "b"),
                    TranscriptSegment::new(2.0, 3.0, "c"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(first[0].id, 1);
        assert_eq!(second.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(store.list_subtitles(1).await.unwrap().len(), 3);
        assert!(store.list_subtitles(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embeddings_upsert_by_id() {
        let store = MemoryStore::new();
        let frame = std::path::Path::new("frame_0001.jpg");
        store
            .add_embeddings(&[FrameEmbedding::new(42, 1, frame, vec![0.0, 1.0], 5)])
            .await
            .unwrap();
        store
            .add_embeddings(&[FrameEmbedding::new(42, 1, frame, vec![1.0, 0.0], 5)])
            .await
            .unwrap();

        let stored = store.embeddings();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "video_42_frame_0001");
        assert_eq!(stored[0].vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_text_index_create_is_idempotent() {
        let index = MemoryTextIndex::new();
        assert_eq!(index.create_index().await.unwrap(), IndexCreation::Created);
        assert_eq!(
            index.create_index().await.unwrap(),
            IndexCreation::AlreadyExists
        );
        assert_eq!(index.create_calls(), 2);
    }
}

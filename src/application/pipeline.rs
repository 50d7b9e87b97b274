use crate::domain::errors::{Diagnostic, FailureKind, FrameError, Stage, StageFailure};
use crate::domain::jobs::{AnalyzeJob, IndexJob, Job, JobRecord, JobStatus, VideoId};
use crate::domain::media::{
    frame_ordinal, sort_segments, ExtractedFrames, FrameEmbedding, SubtitleRecord,
};
use crate::ports::capabilities::{ImageEmbedder, MediaExtractor, Transcriber};
use crate::ports::index::VectorStore;
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::{StatusTracker, SubtitleRepository};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Name of the cover image written next to the frame snapshots.
pub const COVER_FILENAME: &str = "cover.jpg";

/// Hard ceiling on retries, whatever the settings ask for.
pub const RETRY_LIMIT: u32 = 3;

/// Capability objects shared by every run in the process.
#[derive(Clone)]
pub struct Capabilities {
    pub extractor: Arc<dyn MediaExtractor>,
    pub transcriber: Arc<dyn Transcriber>,
    pub embedder: Arc<dyn ImageEmbedder>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Seconds between two frame snapshots
    pub frame_interval_secs: u32,
    /// Position of the cover frame
    pub cover_timestamp_secs: f64,
    /// Retries granted to a job after transient failures
    pub max_retries: u32,
    /// Fixed wait before each retry
    pub retry_delay: Duration,
}

impl PipelineSettings {
    /// Retries actually granted: `max_retries` capped at `RETRY_LIMIT`.
    pub fn retry_limit(&self) -> u32 {
        self.max_retries.min(RETRY_LIMIT)
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frame_interval_secs: 5,
            cover_timestamp_secs: 1.0,
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub video_id: VideoId,
    pub subtitles: usize,
    pub embeddings: usize,
    pub skipped_frames: usize,
    pub cover_path: PathBuf,
}

/// How a single delivery of an analyze job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunReport),
    /// Terminal failure, no retry will follow
    Failed(Diagnostic),
    /// Transient failure, the job was re-enqueued from the first stage
    RetryScheduled { attempt: u32, delay: Duration },
    /// The job id did not resolve to a job record
    Dropped,
}

/// Sequences the analysis stages of one job and decides retry-vs-fail.
pub struct PipelineExecutor<Q, R, V> {
    queue: Q,
    repo: R,
    vectors: V,
    capabilities: Capabilities,
    settings: PipelineSettings,
}

impl<Q, R, V> PipelineExecutor<Q, R, V>
where
    Q: JobQueuePort,
    R: StatusTracker + SubtitleRepository,
    V: VectorStore,
{
    pub fn new(
        queue: Q,
        repo: R,
        vectors: V,
        capabilities: Capabilities,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            queue,
            repo,
            vectors,
            capabilities,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run every stage of the job. Never returns an error: failures are
    /// recorded on the job and turned into a retry or a terminal status.
    pub async fn run(&self, job: &AnalyzeJob) -> RunOutcome {
        // Re-read the record on every attempt, nothing is trusted across runs
        let record = match self.repo.get_job(job.video_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(video_id = job.video_id, "unknown video, dropping job");
                return RunOutcome::Dropped;
            }
            Err(e) => {
                return self
                    .handle_failure(job, StageFailure::transient(Stage::Claim, e))
                    .await;
            }
        };

        match self.run_stages(job, &record).await {
            Ok(report) => {
                info!(
                    video_id = report.video_id,
                    subtitles = report.subtitles,
                    embeddings = report.embeddings,
                    skipped_frames = report.skipped_frames,
                    "video analysis completed"
                );
                RunOutcome::Completed(report)
            }
            Err(failure) => self.handle_failure(job, failure).await,
        }
    }

    async fn run_stages(
        &self,
        job: &AnalyzeJob,
        record: &JobRecord,
    ) -> Result<RunReport, StageFailure> {
        let video_id = record.video_id;
        let source = &record.source_path;

        // 1. PROCESSING must be visible before any artifact is committed
        self.repo
            .set_status(video_id, JobStatus::Processing, None)
            .await
            .map_err(|e| StageFailure::transient(Stage::MarkProcessing, e))?;
        info!(video_id, attempt = job.attempt, source = %source.display(), "processing video");

        // 2. Audio track
        let audio = self
            .capabilities
            .extractor
            .extract_audio(source)
            .await
            .map_err(|e| StageFailure::capability(Stage::ExtractAudio, e))?;

        // 3. Periodic frames
        let frames = self
            .capabilities
            .extractor
            .extract_frames(source, self.settings.frame_interval_secs)
            .await
            .map_err(|e| StageFailure::capability(Stage::ExtractFrames, e))?;
        debug!(video_id, frames = frames.frames.len(), "frames extracted");

        // 4. Transcription
        let mut segments = self
            .capabilities
            .transcriber
            .transcribe(&audio)
            .await
            .map_err(|e| StageFailure::capability(Stage::Transcribe, e))?;
        sort_segments(&mut segments);
        let subtitles = self
            .repo
            .append_subtitles(video_id, &segments)
            .await
            .map_err(|e| StageFailure::transient(Stage::PersistSubtitles, e))?;
        debug!(video_id, subtitles = subtitles.len(), "subtitles stored");

        // 5. Indexing runs as its own job, not awaited
        self.dispatch_index(video_id, &subtitles).await?;

        // 6. Embeddings, a bad frame only costs its own record
        let (embeddings, skipped_frames) = self.embed_frames(video_id, &frames).await;
        if !embeddings.is_empty() {
            self.vectors
                .add_embeddings(&embeddings)
                .await
                .map_err(|e| StageFailure::transient(Stage::PersistEmbeddings, e))?;
        }

        // 7. Cover
        let cover_target = frames.directory.join(COVER_FILENAME);
        let cover_path = self
            .capabilities
            .extractor
            .extract_frame(source, self.settings.cover_timestamp_secs, &cover_target)
            .await
            .map_err(|e| StageFailure::capability(Stage::ExtractCover, e))?;

        // 8. Done
        self.repo
            .set_status(video_id, JobStatus::Completed, None)
            .await
            .map_err(|e| StageFailure::transient(Stage::MarkCompleted, e))?;

        Ok(RunReport {
            video_id,
            subtitles: subtitles.len(),
            embeddings: embeddings.len(),
            skipped_frames,
            cover_path,
        })
    }

    async fn dispatch_index(
        &self,
        video_id: VideoId,
        subtitles: &[SubtitleRecord],
    ) -> Result<(), StageFailure> {
        let records = subtitles
            .iter()
            .map(SubtitleRecord::to_index_record)
            .collect::<Vec<_>>();
        let batch_size = records.len();
        self.queue
            .enqueue_job(Job::Index(IndexJob { video_id, records }))
            .await
            .map_err(|e| StageFailure::transient(Stage::DispatchIndex, e))?;
        debug!(video_id, batch_size, "indexing job dispatched");
        Ok(())
    }

    async fn embed_frames(
        &self,
        video_id: VideoId,
        frames: &ExtractedFrames,
    ) -> (Vec<FrameEmbedding>, usize) {
        let mut embeddings = Vec::with_capacity(frames.frames.len());
        let mut skipped = 0;

        for (position, frame) in frames.frames.iter().enumerate() {
            let ordinal = frame_ordinal(frame).unwrap_or(position as u32 + 1);
            match self.capabilities.embedder.embed_image(frame).await {
                Ok(vector) => embeddings.push(FrameEmbedding::new(
                    video_id,
                    ordinal,
                    frame,
                    vector,
                    self.settings.frame_interval_secs,
                )),
                Err(e) => {
                    let skip = FrameError::new(frame, e);
                    warn!(video_id, error = %skip, "frame not embedded");
                    skipped += 1;
                }
            }
        }

        (embeddings, skipped)
    }

    async fn handle_failure(&self, job: &AnalyzeJob, failure: StageFailure) -> RunOutcome {
        let video_id = job.video_id;
        let diagnostic = failure.into_diagnostic(job.attempt);

        if let Err(e) = self
            .repo
            .set_status(video_id, JobStatus::Failed, Some(diagnostic.clone()))
            .await
        {
            error!(video_id, error = %e, "could not record failed status");
        }

        match diagnostic.kind {
            FailureKind::Fatal => {
                error!(
                    video_id,
                    stage = %diagnostic.stage,
                    error = %diagnostic.message,
                    "fatal media error, job failed"
                );
                RunOutcome::Failed(diagnostic)
            }
            FailureKind::Transient if job.attempt < self.settings.retry_limit() => {
                let retry = job.next_attempt();
                let delay = self.settings.retry_delay;
                match self
                    .queue
                    .enqueue_job_delayed(Job::Analyze(retry.clone()), delay)
                    .await
                {
                    Ok(()) => {
                        warn!(
                            video_id,
                            stage = %diagnostic.stage,
                            error = %diagnostic.message,
                            retry = retry.attempt,
                            max_retries = self.settings.retry_limit(),
                            delay_secs = delay.as_secs(),
                            "transient failure, job rescheduled after fixed delay"
                        );
                        RunOutcome::RetryScheduled {
                            attempt: retry.attempt,
                            delay,
                        }
                    }
                    Err(e) => {
                        error!(video_id, error = %e, "could not schedule retry, job failed");
                        RunOutcome::Failed(diagnostic)
                    }
                }
            }
            FailureKind::Transient => {
                error!(
                    video_id,
                    stage = %diagnostic.stage,
                    error = %diagnostic.message,
                    retries = job.attempt,
                    "retries exhausted, job failed"
                );
                RunOutcome::Failed(diagnostic)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryQueue, MemoryStore};
    use crate::domain::errors::CapabilityError;
    use crate::domain::media::TranscriptSegment;
    use crate::ports::capabilities::{MockImageEmbedder, MockMediaExtractor, MockTranscriber};
    use std::path::Path;

    const SOURCE: &str = "/media/42.mp4";

    fn frames(count: u32) -> ExtractedFrames {
        ExtractedFrames {
            directory: PathBuf::from("/media/42"),
            frames: (1..=count)
                .map(|i| PathBuf::from(format!("/media/42/frame_{:04}.jpg", i)))
                .collect(),
        }
    }

    fn healthy_extractor(frame_count: u32) -> MockMediaExtractor {
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract_audio()
            .returning(|_| Ok(PathBuf::from("/media/42.wav")));
        extractor
            .expect_extract_frames()
            .withf(|video, interval| video == Path::new(SOURCE) && *interval == 5)
            .returning(move |_, _| Ok(frames(frame_count)));
        extractor
            .expect_extract_frame()
            .withf(|_, ts, out| *ts == 1.0 && out == Path::new("/media/42/cover.jpg"))
            .returning(|_, _, out| Ok(out.to_path_buf()));
        extractor
    }

    fn hello_world() -> MockTranscriber {
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().returning(|_| {
            Ok(vec![
                TranscriptSegment::new(2.5, 5.0, "world"),
                TranscriptSegment::new(0.0, 2.5, "hello"),
            ])
        });
        transcriber
    }

    fn embedder_failing_on(bad_frame: Option<&'static str>) -> MockImageEmbedder {
        let mut embedder = MockImageEmbedder::new();
        embedder.expect_embed_image().returning(move |frame| {
            if Some(frame.file_name().unwrap().to_str().unwrap()) == bad_frame {
                Err(CapabilityError::Processing("truncated JPEG".into()))
            } else {
                Ok(vec![0.1, 0.2, 0.3])
            }
        });
        embedder.expect_dimension().return_const(3usize);
        embedder
    }

    fn executor(
        store: &MemoryStore,
        queue: &MemoryQueue,
        extractor: MockMediaExtractor,
        transcriber: MockTranscriber,
        embedder: MockImageEmbedder,
    ) -> PipelineExecutor<MemoryQueue, MemoryStore, MemoryStore> {
        PipelineExecutor::new(
            queue.clone(),
            store.clone(),
            store.clone(),
            Capabilities {
                extractor: Arc::new(extractor),
                transcriber: Arc::new(transcriber),
                embedder: Arc::new(embedder),
            },
            PipelineSettings::default(),
        )
    }

    async fn store_with_job() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .register_job(&JobRecord::new(42, SOURCE))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_run_completes_and_commits_artifacts() {
        let store = store_with_job().await;
        let queue = MemoryQueue::new();
        let executor = executor(
            &store,
            &queue,
            healthy_extractor(3),
            hello_world(),
            embedder_failing_on(None),
        );

        let outcome = executor.run(&AnalyzeJob::new(42)).await;

        let RunOutcome::Completed(report) = outcome else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert_eq!(report.subtitles, 2);
        assert_eq!(report.embeddings, 3);
        assert_eq!(report.skipped_frames, 0);
        assert_eq!(report.cover_path, PathBuf::from("/media/42/cover.jpg"));

        let texts: Vec<_> = store
            .list_subtitles(42)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.text)
            .collect();
        assert_eq!(texts, vec!["hello", "world"]);

        let ids: Vec<_> = store.embeddings().into_iter().map(|e| e.id).collect();
        assert_eq!(
            ids,
            vec![
                "video_42_frame_0001",
                "video_42_frame_0002",
                "video_42_frame_0003"
            ]
        );
        assert_eq!(
            store.status_history(42),
            vec![JobStatus::Processing, JobStatus::Completed]
        );

        let ready = queue.ready_jobs();
        assert_eq!(ready.len(), 1);
        match &ready[0] {
            Job::Index(index) => {
                assert_eq!(index.video_id, 42);
                assert_eq!(index.records.len(), 2);
                assert_eq!(index.records[0].text, "hello");
            }
            other => panic!("expected index job, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_corrupted_frame_is_skipped() {
        let store = store_with_job().await;
        let queue = MemoryQueue::new();
        let executor = executor(
            &store,
            &queue,
            healthy_extractor(3),
            hello_world(),
            embedder_failing_on(Some("frame_0002.jpg")),
        );

        let outcome = executor.run(&AnalyzeJob::new(42)).await;

        assert!(matches!(outcome, RunOutcome::Completed(ref r) if r.skipped_frames == 1));
        let ids: Vec<_> = store.embeddings().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["video_42_frame_0001", "video_42_frame_0003"]);
    }

    #[tokio::test]
    async fn test_fatal_extraction_error_fails_without_retry() {
        let store = store_with_job().await;
        let queue = MemoryQueue::new();
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_extract_audio().times(1).returning(|_| {
            Err(CapabilityError::Processing(
                "moov atom not found".to_string(),
            ))
        });
        extractor.expect_extract_frames().times(0);
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(0);

        let executor = executor(
            &store,
            &queue,
            extractor,
            transcriber,
            embedder_failing_on(None),
        );
        let outcome = executor.run(&AnalyzeJob::new(42)).await;

        let RunOutcome::Failed(diagnostic) = outcome else {
            panic!("expected failure, got {:?}", outcome);
        };
        assert_eq!(diagnostic.kind, FailureKind::Fatal);
        assert_eq!(diagnostic.stage, Stage::ExtractAudio);
        assert!(diagnostic.message.contains("moov atom not found"));
        assert_eq!(
            store.status_history(42),
            vec![JobStatus::Processing, JobStatus::Failed]
        );
        let view = store.get_status(42).await.unwrap().unwrap();
        assert_eq!(view.diagnostic, Some(diagnostic));
        assert!(queue.ready_jobs().is_empty());
        assert!(queue.delayed_jobs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_schedules_retry() {
        let store = store_with_job().await;
        let queue = MemoryQueue::new();
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .returning(|_| Err(CapabilityError::Unavailable("model server down".into())));

        let executor = executor(
            &store,
            &queue,
            healthy_extractor(1),
            transcriber,
            embedder_failing_on(None),
        );
        let outcome = executor.run(&AnalyzeJob::new(42)).await;

        assert_eq!(
            outcome,
            RunOutcome::RetryScheduled {
                attempt: 1,
                delay: Duration::from_secs(60)
            }
        );
        assert_eq!(
            queue.delayed_jobs(),
            vec![(
                Duration::from_secs(60),
                Job::Analyze(AnalyzeJob {
                    video_id: 42,
                    attempt: 1
                })
            )]
        );
        let view = store.get_status(42).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(
            view.diagnostic.map(|d| d.kind),
            Some(FailureKind::Transient)
        );
        // Transcription never finished, so nothing reached the indexer
        assert!(queue.ready_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_last_retry_is_terminal() {
        let store = store_with_job().await;
        let queue = MemoryQueue::new();
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .returning(|_| Err(CapabilityError::Unavailable("model server down".into())));

        let executor = executor(
            &store,
            &queue,
            healthy_extractor(1),
            transcriber,
            embedder_failing_on(None),
        );
        let outcome = executor
            .run(&AnalyzeJob {
                video_id: 42,
                attempt: 3,
            })
            .await;

        assert!(matches!(outcome, RunOutcome::Failed(ref d) if d.attempt == 3));
        assert!(queue.delayed_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_retries_are_capped_at_three() {
        let store = store_with_job().await;
        let queue = MemoryQueue::new();
        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .returning(|_| Err(CapabilityError::Unavailable("model server down".into())));

        let executor = PipelineExecutor::new(
            queue.clone(),
            store.clone(),
            store.clone(),
            Capabilities {
                extractor: Arc::new(healthy_extractor(1)),
                transcriber: Arc::new(transcriber),
                embedder: Arc::new(embedder_failing_on(None)),
            },
            PipelineSettings {
                max_retries: 5,
                ..PipelineSettings::default()
            },
        );

        let third = executor
            .run(&AnalyzeJob {
                video_id: 42,
                attempt: 2,
            })
            .await;
        assert!(matches!(third, RunOutcome::RetryScheduled { attempt: 3, .. }));

        let last = executor
            .run(&AnalyzeJob {
                video_id: 42,
                attempt: 3,
            })
            .await;
        assert!(matches!(last, RunOutcome::Failed(ref d) if d.attempt == 3));
        assert_eq!(queue.delayed_jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_job_is_dropped_silently() {
        let store = MemoryStore::new();
        let queue = MemoryQueue::new();
        let executor = executor(
            &store,
            &queue,
            MockMediaExtractor::new(),
            MockTranscriber::new(),
            MockImageEmbedder::new(),
        );

        let outcome = executor.run(&AnalyzeJob::new(404)).await;

        assert_eq!(outcome, RunOutcome::Dropped);
        assert!(store.status_history(404).is_empty());
        assert!(queue.delayed_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_cover_failure_after_indexing_dispatch() {
        let store = store_with_job().await;
        let queue = MemoryQueue::new();
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract_audio()
            .returning(|_| Ok(PathBuf::from("/media/42.wav")));
        extractor
            .expect_extract_frames()
            .returning(|_, _| Ok(frames(2)));
        extractor
            .expect_extract_frame()
            .returning(|_, _, _| Err(CapabilityError::Processing("seek past end".into())));

        let executor = executor(
            &store,
            &queue,
            extractor,
            hello_world(),
            embedder_failing_on(None),
        );
        let outcome = executor.run(&AnalyzeJob::new(42)).await;

        assert!(matches!(outcome, RunOutcome::Failed(ref d) if d.stage == Stage::ExtractCover));
        // The indexing batch was already handed off and is not taken back
        let index_jobs = queue
            .ready_jobs()
            .into_iter()
            .filter(|job| matches!(job, Job::Index(_)))
            .count();
        assert_eq!(index_jobs, 1);
        assert_eq!(store.embeddings().len(), 2);
    }
}

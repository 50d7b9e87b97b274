use super::errors::Diagnostic;
use super::media::IndexRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Stable key of an uploaded video and of its pipeline job.
pub type VideoId = u64;

/// Request to run the analysis pipeline for one video.
///
/// The message only carries the id; the source path is read from the job
/// record when a worker claims the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeJob {
    pub video_id: VideoId,
    /// Retries already spent on this job (0 for the first delivery)
    #[serde(default)]
    pub attempt: u32,
}

impl AnalyzeJob {
    pub fn new(video_id: VideoId) -> Self {
        Self {
            video_id,
            attempt: 0,
        }
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            video_id: self.video_id,
            attempt: self.attempt + 1,
        }
    }
}

/// Snapshot of a video's subtitles handed to the indexing sub-job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexJob {
    pub video_id: VideoId,
    pub records: Vec<IndexRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Job {
    Analyze(AnalyzeJob),
    Index(IndexJob),
}

impl Job {
    pub fn video_id(&self) -> VideoId {
        match self {
            Job::Analyze(job) => job.video_id,
            Job::Index(job) => job.video_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// `FAILED` is only final once the executor stops scheduling retries.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Persisted state of one video's processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub video_id: VideoId,
    /// Original upload filename
    pub filename: String,
    /// Absolute path of the uploaded video
    pub source_path: PathBuf,
    pub status: JobStatus,
    /// Error kind and message of the last failure
    #[serde(default)]
    pub diagnostic: Option<Diagnostic>,
}

impl JobRecord {
    pub fn new(video_id: VideoId, source_path: impl AsRef<Path>) -> Self {
        let source_path = source_path.as_ref().to_path_buf();
        let filename = source_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            video_id,
            filename,
            source_path,
            status: JobStatus::Pending,
            diagnostic: None,
        }
    }

    pub fn view(&self) -> StatusView {
        StatusView {
            video_id: self.video_id,
            status: self.status,
            filename: self.filename.clone(),
            diagnostic: self.diagnostic.clone(),
        }
    }
}

/// Read-only answer to a status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub video_id: VideoId,
    pub status: JobStatus,
    pub filename: String,
    pub diagnostic: Option<Diagnostic>,
}

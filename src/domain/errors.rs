//! Failure taxonomy of the analysis pipeline.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How the executor reacts to a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Bad input media: the job fails immediately.
    Fatal,
    /// Infrastructure trouble: the whole job is retried later.
    Transient,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Fatal => write!(f, "fatal"),
            FailureKind::Transient => write!(f, "transient"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Claim,
    MarkProcessing,
    ExtractAudio,
    ExtractFrames,
    Transcribe,
    PersistSubtitles,
    DispatchIndex,
    PersistEmbeddings,
    ExtractCover,
    MarkCompleted,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Claim => "claim",
            Stage::MarkProcessing => "mark_processing",
            Stage::ExtractAudio => "extract_audio",
            Stage::ExtractFrames => "extract_frames",
            Stage::Transcribe => "transcribe",
            Stage::PersistSubtitles => "persist_subtitles",
            Stage::DispatchIndex => "dispatch_index",
            Stage::PersistEmbeddings => "persist_embeddings",
            Stage::ExtractCover => "extract_cover",
            Stage::MarkCompleted => "mark_completed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned by the extraction, transcription and embedding capabilities.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("media processing failed: {0}")]
    Processing(String),
    #[error("unsupported media: {0}")]
    Unsupported(String),
    #[error("capability unavailable: {0}")]
    Unavailable(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl CapabilityError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        CapabilityError::Io {
            source,
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            CapabilityError::Processing(_) | CapabilityError::Unsupported(_) => FailureKind::Fatal,
            CapabilityError::Unavailable(_) | CapabilityError::Io { .. } => FailureKind::Transient,
        }
    }
}

/// A single frame that could not be embedded. Never fails the job.
#[derive(Debug, Error)]
#[error("frame {} skipped: {}", .frame.display(), .reason)]
pub struct FrameError {
    pub frame: PathBuf,
    pub reason: String,
}

impl FrameError {
    pub fn new(frame: &Path, reason: impl fmt::Display) -> Self {
        Self {
            frame: frame.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Errors of the subtitle indexing sub-job.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to create index {index}: {message}")]
    Create { index: String, message: String },
    #[error("bulk write to {index} failed: {message}")]
    Bulk { index: String, message: String },
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure observed at a stage boundary, already classified.
#[derive(Debug, Error)]
#[error("{stage} failed ({kind}): {message}")]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

impl StageFailure {
    pub fn capability(stage: Stage, error: CapabilityError) -> Self {
        Self {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// Storage and queue errors are infrastructure errors.
    pub fn transient(stage: Stage, error: Box<dyn Error + Send + Sync>) -> Self {
        Self {
            stage,
            kind: FailureKind::Transient,
            message: error.to_string(),
        }
    }

    pub fn into_diagnostic(self, attempt: u32) -> Diagnostic {
        Diagnostic {
            kind: self.kind,
            stage: self.stage,
            message: self.message,
            attempt,
        }
    }
}

/// Failure details stored next to a `FAILED` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: FailureKind,
    pub stage: Stage,
    pub message: String,
    pub attempt: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_error_kinds() {
        assert_eq!(
            CapabilityError::Processing("bad moov atom".into()).kind(),
            FailureKind::Fatal
        );
        assert_eq!(
            CapabilityError::Unsupported("no video stream".into()).kind(),
            FailureKind::Fatal
        );
        assert_eq!(
            CapabilityError::Unavailable("connection refused".into()).kind(),
            FailureKind::Transient
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(
            CapabilityError::io("/media/1.wav", io).kind(),
            FailureKind::Transient
        );
    }

    #[test]
    fn test_stage_failure_diagnostic() {
        let failure = StageFailure::capability(
            Stage::ExtractAudio,
            CapabilityError::Processing("Invalid data found".into()),
        );
        assert_eq!(
            failure.to_string(),
            "extract_audio failed (fatal): media processing failed: Invalid data found"
        );
        let diagnostic = failure.into_diagnostic(2);
        assert_eq!(diagnostic.kind, FailureKind::Fatal);
        assert_eq!(diagnostic.stage, Stage::ExtractAudio);
        assert_eq!(diagnostic.attempt, 2);
    }

    #[test]
    fn test_infrastructure_errors_are_transient() {
        let failure = StageFailure::transient(Stage::PersistSubtitles, "redis down".into());
        assert_eq!(failure.kind, FailureKind::Transient);
        assert_eq!(failure.message, "redis down");
    }
}

//! Artifacts produced by the analysis stages.

use super::jobs::VideoId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of the periodic frame snapshots inside a frames directory.
pub const FRAME_PREFIX: &str = "frame_";

/// One timed piece of text returned by a transcriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start_time: f64, end_time: f64, text: impl Into<String>) -> Self {
        Self {
            start_time,
            end_time,
            text: text.into(),
        }
    }
}

/// Stable sort by start time, keeping the producer's order on ties.
pub fn sort_segments(segments: &mut [TranscriptSegment]) {
    segments.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
}

/// A persisted subtitle segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleRecord {
    pub id: u64,
    pub video_id: VideoId,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

impl SubtitleRecord {
    pub fn to_index_record(&self) -> IndexRecord {
        IndexRecord {
            id: self.id,
            video_id: self.video_id,
            start_time: self.start_time,
            text: self.text.clone(),
        }
    }
}

/// Document written to the subtitle text index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: u64,
    pub video_id: VideoId,
    pub start_time: f64,
    pub text: String,
}

/// Periodic snapshots written by the extractor, in playback order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFrames {
    pub directory: PathBuf,
    pub frames: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMetadata {
    pub video_id: VideoId,
    pub frame_filename: String,
    pub timestamp_approx: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameEmbedding {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: FrameMetadata,
}

impl FrameEmbedding {
    pub fn new(
        video_id: VideoId,
        ordinal: u32,
        frame: &Path,
        vector: Vec<f32>,
        interval_secs: u32,
    ) -> Self {
        let frame_filename = frame
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            id: frame_record_id(video_id, ordinal),
            vector,
            metadata: FrameMetadata {
                video_id,
                frame_filename,
                timestamp_approx: approx_timestamp(ordinal, interval_secs),
            },
        }
    }
}

pub fn frame_record_id(video_id: VideoId, ordinal: u32) -> String {
    format!("video_{}_frame_{:04}", video_id, ordinal)
}

/// Frame ordinals start at 1, the first snapshot is taken at the start of the video.
pub fn approx_timestamp(ordinal: u32, interval_secs: u32) -> f64 {
    ordinal.saturating_sub(1) as f64 * interval_secs as f64
}

/// Ordinal encoded in a `frame_0001.jpg` style filename.
pub fn frame_ordinal(path: &Path) -> Option<u32> {
    let re = Regex::new(r"^frame_(\d+)\.[A-Za-z0-9]+$").ok()?;
    let name = path.file_name()?.to_str()?;
    let caps = re.captures(name)?;
    caps.get(1)?.as_str().parse().ok()
}

//! Media extraction through the ffmpeg command line.

use crate::domain::errors::CapabilityError;
use crate::domain::media::{frame_ordinal, ExtractedFrames, FRAME_PREFIX};
use crate::ports::capabilities::MediaExtractor;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command as TokioCommand;
use tracing::debug;

/// Lines of ffmpeg stderr kept in an error message
const STDERR_TAIL_LINES: usize = 5;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<Output>;
}

pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<Output> {
        TokioCommand::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
    }
}

/// `MediaExtractor` writing its artifacts next to the source video:
/// `<stem>.wav` for the audio track and `<stem>/frame_NNNN.jpg` for frames.
pub struct FfmpegExtractor<C = TokioCommandRunner> {
    runner: C,
    ffmpeg: String,
}

impl FfmpegExtractor<TokioCommandRunner> {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self::with_runner(TokioCommandRunner, ffmpeg)
    }
}

impl<C: CommandRunner> FfmpegExtractor<C> {
    pub fn with_runner(runner: C, ffmpeg: impl Into<String>) -> Self {
        Self {
            runner,
            ffmpeg: ffmpeg.into(),
        }
    }

    async fn ffmpeg(&self, args: Vec<String>) -> Result<(), CapabilityError> {
        debug!(program = %self.ffmpeg, args = ?args, "running ffmpeg");
        let output = self
            .runner
            .run(&self.ffmpeg, &args)
            .await
            .map_err(|e| CapabilityError::Unavailable(format!("{}: {}", self.ffmpeg, e)))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(CapabilityError::Processing(stderr_tail(&output)))
        }
    }
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
    if tail.is_empty() {
        format!("ffmpeg exited with {}", output.status)
    } else {
        tail
    }
}

async fn ensure_source(video: &Path) -> Result<(), CapabilityError> {
    match tokio::fs::metadata(video).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(CapabilityError::Unsupported(format!(
            "{} is not a file",
            video.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CapabilityError::Unsupported(
            format!("{} does not exist", video.display()),
        )),
        Err(e) => Err(CapabilityError::io(video, e)),
    }
}

pub fn audio_path(video: &Path) -> PathBuf {
    video.with_extension("wav")
}

pub fn frames_dir(video: &Path) -> PathBuf {
    video.with_extension("")
}

pub fn audio_args(video: &Path, output: &Path) -> Vec<String> {
    vec![
        "-i".into(),
        arg(video),
        "-y".into(),
        "-vn".into(),
        "-acodec".into(),
        "pcm_s16le".into(),
        "-ar".into(),
        "16000".into(),
        "-ac".into(),
        "1".into(),
        arg(output),
    ]
}

pub fn frames_args(video: &Path, directory: &Path, interval_secs: u32) -> Vec<String> {
    vec![
        "-i".into(),
        arg(video),
        "-y".into(),
        "-vf".into(),
        format!("fps=1/{}", interval_secs),
        "-q:v".into(),
        "2".into(),
        arg(&directory.join(format!("{}%04d.jpg", FRAME_PREFIX))),
    ]
}

pub fn single_frame_args(video: &Path, timestamp_secs: f64, output: &Path) -> Vec<String> {
    vec![
        "-ss".into(),
        format!("{:.3}", timestamp_secs),
        "-i".into(),
        arg(video),
        "-y".into(),
        "-frames:v".into(),
        "1".into(),
        "-q:v".into(),
        "2".into(),
        arg(output),
    ]
}

/// Frame files of a directory ordered by ordinal. Other files are ignored.
async fn list_frames(directory: &Path) -> Result<Vec<PathBuf>, CapabilityError> {
    let mut entries = tokio::fs::read_dir(directory)
        .await
        .map_err(|e| CapabilityError::io(directory, e))?;
    let mut frames = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CapabilityError::io(directory, e))?
    {
        let path = entry.path();
        if let Some(ordinal) = frame_ordinal(&path) {
            frames.push((ordinal, path));
        }
    }
    frames.sort_by_key(|(ordinal, _)| *ordinal);
    Ok(frames.into_iter().map(|(_, path)| path).collect())
}

/// Leftovers of an earlier attempt would be embedded twice.
async fn clear_frames(directory: &Path) -> Result<(), CapabilityError> {
    for frame in list_frames(directory).await? {
        tokio::fs::remove_file(&frame)
            .await
            .map_err(|e| CapabilityError::io(&frame, e))?;
    }
    Ok(())
}

#[async_trait]
impl<C: CommandRunner> MediaExtractor for FfmpegExtractor<C> {
    async fn extract_audio(&self, video: &Path) -> Result<PathBuf, CapabilityError> {
        ensure_source(video).await?;
        let output = audio_path(video);
        self.ffmpeg(audio_args(video, &output)).await?;
        Ok(output)
    }

    async fn extract_frames(
        &self,
        video: &Path,
        interval_secs: u32,
    ) -> Result<ExtractedFrames, CapabilityError> {
        ensure_source(video).await?;
        if interval_secs == 0 {
            return Err(CapabilityError::Unsupported(
                "frame interval must be at least one second".to_string(),
            ));
        }
        let directory = frames_dir(video);
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| CapabilityError::io(&directory, e))?;
        clear_frames(&directory).await?;

        self.ffmpeg(frames_args(video, &directory, interval_secs))
            .await?;

        let frames = list_frames(&directory).await?;
        if frames.is_empty() {
            return Err(CapabilityError::Processing(format!(
                "no frames extracted from {}",
                video.display()
            )));
        }
        Ok(ExtractedFrames { directory, frames })
    }

    async fn extract_frame(
        &self,
        video: &Path,
        timestamp_secs: f64,
        output: &Path,
    ) -> Result<PathBuf, CapabilityError> {
        ensure_source(video).await?;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CapabilityError::io(parent, e))?;
        }
        self.ffmpeg(single_frame_args(video, timestamp_secs, output))
            .await?;
        if !output.exists() {
            return Err(CapabilityError::Processing(format!(
                "no frame at {}s in {}",
                timestamp_secs,
                video.display()
            )));
        }
        Ok(output.to_path_buf())
    }
}

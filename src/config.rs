//! Configuration for the worker and the command line.

use crate::application::pipeline::{PipelineSettings, RETRY_LIMIT};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Redis connection URL
    pub redis_url: String,
    /// Directory holding uploaded videos and their artifacts
    pub media_root: PathBuf,
    /// Number of concurrent worker tasks
    pub worker_count: usize,
    /// Name of this process's in-flight list, must survive restarts
    pub consumer_name: String,
    pub frame_interval_secs: u32,
    pub cover_timestamp_secs: f64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    /// Whisper-compatible transcription server
    pub whisper_url: String,
    pub whisper_model: String,
    pub elasticsearch_url: String,
    pub subtitle_index: String,
    pub chroma_url: String,
    pub chroma_collection: String,
    /// ffmpeg binary, looked up in PATH unless absolute
    pub ffmpeg_bin: String,
}

/// Install the log subscriber. Call before `WorkerConfig::from_env` so
/// configuration warnings are printed. Logs go to stderr.
pub fn init_logging(default_filter: &str) {
    // RUST_LOG may come from .env
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| String::from(default))
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|e| {
            warn!(var = name, value = %value, error = %e, default = %default, "invalid value, using default");
            default
        }),
        None => default,
    }
}

fn parsed_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    parse_or(name, env::var(name).ok(), default)
}

fn capped_retries(requested: u32) -> u32 {
    if requested > RETRY_LIMIT {
        warn!(requested, limit = RETRY_LIMIT, "MAX_RETRIES above limit, capping");
    }
    requested.min(RETRY_LIMIT)
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            redis_url: var_or("REDIS_URL", "redis://127.0.0.1/"),
            media_root: PathBuf::from(var_or("MEDIA_ROOT", "./media")),
            worker_count: parsed_var("WORKER_COUNT", 4usize).max(1),
            consumer_name: var_or("CONSUMER_NAME", "worker"),
            frame_interval_secs: parsed_var("FRAME_INTERVAL_SECS", 5u32).max(1),
            cover_timestamp_secs: parsed_var("COVER_TIMESTAMP_SECS", 1.0f64),
            max_retries: capped_retries(parsed_var("MAX_RETRIES", RETRY_LIMIT)),
            retry_delay_secs: parsed_var("RETRY_DELAY_SECS", 60u64),
            whisper_url: var_or("WHISPER_URL", "http://127.0.0.1:9000"),
            whisper_model: var_or("WHISPER_MODEL", "base"),
            elasticsearch_url: var_or("ELASTICSEARCH_URL", "http://127.0.0.1:9200"),
            subtitle_index: var_or("SUBTITLE_INDEX", "subtitles"),
            chroma_url: var_or("CHROMA_URL", "http://127.0.0.1:8001"),
            chroma_collection: var_or("CHROMA_COLLECTION", "video_frames"),
            ffmpeg_bin: var_or("FFMPEG_BIN", "ffmpeg"),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            frame_interval_secs: self.frame_interval_secs,
            cover_timestamp_secs: self.cover_timestamp_secs,
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    /// Uploads given by relative path live under `media_root`.
    pub fn resolve_media(&self, path: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.media_root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_invalid_value_is_logged() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let value = tracing::subscriber::with_default(subscriber, || {
            parse_or("WORKER_COUNT", Some("many".into()), 4usize)
        });

        assert_eq!(value, 4);
        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("invalid value, using default"));
        assert!(logs.contains("WORKER_COUNT"));
    }

    #[test]
    fn test_parse_or_falls_back() {
        assert_eq!(parse_or("WORKER_COUNT", Some(" 8 ".into()), 4usize), 8);
        assert_eq!(parse_or("WORKER_COUNT", Some("many".into()), 4usize), 4);
        assert_eq!(parse_or("WORKER_COUNT", None, 4usize), 4);
        assert_eq!(parse_or("COVER_TIMESTAMP_SECS", Some("2.5".into()), 1.0f64), 2.5);
    }

    #[test]
    fn test_max_retries_is_capped() {
        assert_eq!(capped_retries(5), 3);
        assert_eq!(capped_retries(1), 1);
    }

    #[test]
    fn test_pipeline_settings_defaults() {
        let config = WorkerConfig {
            redis_url: "redis://127.0.0.1/".into(),
            media_root: PathBuf::from("/srv/media"),
            worker_count: 4,
            consumer_name: "worker".into(),
            frame_interval_secs: 5,
            cover_timestamp_secs: 1.0,
            max_retries: 3,
            retry_delay_secs: 60,
            whisper_url: String::new(),
            whisper_model: "base".into(),
            elasticsearch_url: String::new(),
            subtitle_index: "subtitles".into(),
            chroma_url: String::new(),
            chroma_collection: "video_frames".into(),
            ffmpeg_bin: "ffmpeg".into(),
        };
        assert_eq!(config.pipeline_settings(), PipelineSettings::default());
        assert_eq!(
            config.resolve_media(Path::new("42.mp4")),
            PathBuf::from("/srv/media/42.mp4")
        );
        assert_eq!(
            config.resolve_media(Path::new("/tmp/42.mp4")),
            PathBuf::from("/tmp/42.mp4")
        );
    }
}

//! Transcriber backed by an OpenAI-compatible Whisper server.

use super::classify_status;
use crate::domain::errors::CapabilityError;
use crate::domain::media::{sort_segments, TranscriptSegment};
use crate::ports::capabilities::Transcriber;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    start: f64,
    end: f64,
    text: String,
}

pub struct WhisperClient {
    client: Client,
    base_url: String,
    model: String,
    // One inference at a time per process
    gate: Mutex<()>,
}

impl WhisperClient {
    pub fn new(client: Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            gate: Mutex::new(()),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/audio/transcriptions", self.base_url)
    }
}

fn parse_segments(body: &str) -> Result<Vec<TranscriptSegment>, CapabilityError> {
    let parsed: VerboseTranscription = serde_json::from_str(body)
        .map_err(|e| CapabilityError::Unavailable(format!("malformed transcription: {}", e)))?;
    let mut segments: Vec<TranscriptSegment> = parsed
        .segments
        .into_iter()
        .filter_map(|s| {
            let text = s.text.trim();
            (!text.is_empty()).then(|| TranscriptSegment::new(s.start, s.end, text))
        })
        .collect();
    sort_segments(&mut segments);
    Ok(segments)
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, audio: &Path) -> Result<Vec<TranscriptSegment>, CapabilityError> {
        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|e| CapabilityError::io(audio, e))?;
        let filename = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());

        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str("audio/wav")
            .map_err(|e| CapabilityError::Unavailable(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let _guard = self.gate.lock().await;
        debug!(audio = %audio.display(), model = %self.model, "transcribing");
        let response = self
            .client
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(|e| CapabilityError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CapabilityError::Unavailable(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        parse_segments(&body)
    }
}

//! HTTP adapters for the transcription service and the two search stores.

pub mod chroma;
pub mod elastic;
pub mod whisper;

pub use chroma::ChromaStore;
pub use elastic::ElasticIndex;
pub use whisper::WhisperClient;

use crate::domain::errors::CapabilityError;
use reqwest::StatusCode;

/// Client errors mean the request (the media) is bad, everything else is
/// worth retrying.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> CapabilityError {
    let message = format!("{}: {}", status, body.trim());
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        CapabilityError::Unsupported(message)
    } else {
        CapabilityError::Unavailable(message)
    }
}

//! Domain layer - Pure business logic.

// Failure taxonomy (fatal / transient / per-frame)
pub mod errors;

// Job messages and persisted job state
pub mod jobs;

// Subtitles, frames and embeddings
pub mod media;

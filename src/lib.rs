//! Vidsight - Video Analysis Pipeline
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (jobs, media artifacts, failure taxonomy)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations
//! - application/: Generic services (dispatcher, pipeline executor, indexer, worker)
//! - config: Environment configuration
//!
//! # Features
//! - `local`: Redis queue and job state, ffmpeg extraction, pixel embedder
//! - `remote`: Whisper transcription, Chroma vector store, Elasticsearch index

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports for convenience
pub use application::dispatcher::JobDispatcher;
pub use application::pipeline::{Capabilities, PipelineExecutor, PipelineSettings, RunOutcome};
pub use application::worker::WorkerService;
pub use config::WorkerConfig;

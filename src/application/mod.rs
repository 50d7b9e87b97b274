//! Application layer - Generic services that use ports.

// Job submission and upload registration
pub mod dispatcher;

// Subtitle indexing sub-job
pub mod indexer;

// Analysis stages, failure classification and retries
pub mod pipeline;

// Queue consumer routing jobs to the services above
pub mod worker;

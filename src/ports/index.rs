use super::BoxError;
use crate::domain::errors::IndexError;
use crate::domain::media::{FrameEmbedding, IndexRecord};
use async_trait::async_trait;

/// Result of an idempotent index creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCreation {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub indexed: usize,
    pub failed: usize,
}

/// Full-text index of subtitles.
#[async_trait]
pub trait TextIndex: Send + Sync {
    /// Create the index. An existing index is not an error.
    async fn create_index(&self) -> Result<IndexCreation, IndexError>;

    /// Upsert documents keyed by subtitle id
    async fn bulk_upsert(&self, records: &[IndexRecord]) -> Result<BulkSummary, IndexError>;
}

/// Store of frame embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Write one batch. An empty batch is a no-op.
    async fn add_embeddings(&self, records: &[FrameEmbedding]) -> Result<(), BoxError>;
}

//! Frame embeddings stored in a Chroma collection.

use crate::domain::media::{FrameEmbedding, FrameMetadata};
use crate::ports::index::VectorStore;
use crate::ports::BoxError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct CreateCollection<'a> {
    name: &'a str,
    get_or_create: bool,
}

#[derive(Debug, Deserialize)]
struct Collection {
    id: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct AddRequest<'a> {
    ids: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    metadatas: Vec<&'a FrameMetadata>,
}

impl<'a> AddRequest<'a> {
    fn from_records(records: &'a [FrameEmbedding]) -> Self {
        Self {
            ids: records.iter().map(|r| r.id.as_str()).collect(),
            embeddings: records.iter().map(|r| r.vector.as_slice()).collect(),
            metadatas: records.iter().map(|r| &r.metadata).collect(),
        }
    }
}

pub struct ChromaStore {
    client: Client,
    base_url: String,
    collection: String,
    collection_id: OnceCell<String>,
}

impl ChromaStore {
    pub fn new(client: Client, base_url: &str, collection: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            collection_id: OnceCell::new(),
        }
    }

    async fn collection_id(&self) -> Result<&str, BoxError> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let collection: Collection = self
                    .client
                    .post(format!("{}/api/v1/collections", self.base_url))
                    .json(&CreateCollection {
                        name: &self.collection,
                        get_or_create: true,
                    })
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                info!(collection = %self.collection, id = %collection.id, "chroma collection ready");
                Ok::<_, BoxError>(collection.id)
            })
            .await?;
        Ok(id.as_str())
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn add_embeddings(&self, records: &[FrameEmbedding]) -> Result<(), BoxError> {
        if records.is_empty() {
            return Ok(());
        }
        let id = self.collection_id().await?;
        self.client
            .post(format!("{}/api/v1/collections/{}/add", self.base_url, id))
            .json(&AddRequest::from_records(records))
            .send()
            .await?
            .error_for_status()?;
        debug!(count = records.len(), "embeddings stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_add_request_uses_parallel_arrays() {
        let records = vec![
            FrameEmbedding::new(42, 1, Path::new("frame_0001.jpg"), vec![0.1, 0.2], 5),
            FrameEmbedding::new(42, 2, Path::new("frame_0002.jpg"), vec![0.3, 0.4], 5),
        ];
        let json = serde_json::to_value(AddRequest::from_records(&records)).unwrap();
        assert_eq!(
            json["ids"],
            serde_json::json!(["video_42_frame_0001", "video_42_frame_0002"])
        );
        assert_eq!(json["embeddings"][1][0].as_f64().unwrap() as f32, 0.3);
        assert_eq!(json["metadatas"][1]["timestampApprox"], 5.0);
        assert_eq!(json["metadatas"][0]["videoId"], 42);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_network() {
        // Nothing listens on this port, any request would fail
        let store = ChromaStore::new(Client::new(), "http://127.0.0.1:9", "frames");
        store.add_embeddings(&[]).await.unwrap();
    }
}

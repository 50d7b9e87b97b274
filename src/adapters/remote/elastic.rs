//! Subtitle full-text index on Elasticsearch.

use crate::domain::errors::IndexError;
use crate::domain::media::IndexRecord;
use crate::ports::index::{BulkSummary, IndexCreation, TextIndex};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<BulkItem>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    index: BulkItemResult,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

pub struct ElasticIndex {
    client: Client,
    base_url: String,
    index: String,
}

impl ElasticIndex {
    pub fn new(client: Client, base_url: &str, index: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        }
    }

    fn transport(e: reqwest::Error) -> IndexError {
        IndexError::Transport(e.to_string())
    }
}

fn mapping() -> serde_json::Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "integer" },
                "video_id": { "type": "integer" },
                "start_time": { "type": "float" },
                "text": { "type": "text" }
            }
        }
    })
}

/// NDJSON body: an action line and a document line per record.
fn bulk_body(index: &str, records: &[IndexRecord]) -> Result<String, serde_json::Error> {
    let mut body = String::new();
    for record in records {
        let action = json!({ "index": { "_index": index, "_id": record.id.to_string() } });
        let doc = json!({
            "id": record.id,
            "video_id": record.video_id,
            "start_time": record.start_time,
            "text": record.text,
        });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&doc)?);
        body.push('\n');
    }
    Ok(body)
}

fn summarize(index: &str, response: BulkResponse) -> BulkSummary {
    let failed: Vec<_> = response
        .items
        .iter()
        .filter(|item| item.index.error.is_some())
        .collect();
    if response.errors {
        for item in &failed {
            warn!(index, id = %item.index.id, error = ?item.index.error, "document not indexed");
        }
    }
    BulkSummary {
        indexed: response.items.len() - failed.len(),
        failed: failed.len(),
    }
}

#[async_trait]
impl TextIndex for ElasticIndex {
    async fn create_index(&self) -> Result<IndexCreation, IndexError> {
        let response = self
            .client
            .put(format!("{}/{}", self.base_url, self.index))
            .json(&mapping())
            .send()
            .await
            .map_err(Self::transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(IndexCreation::Created);
        }
        let body = response.text().await.map_err(Self::transport)?;
        if status == StatusCode::BAD_REQUEST && body.contains("resource_already_exists_exception")
        {
            return Ok(IndexCreation::AlreadyExists);
        }
        Err(IndexError::Create {
            index: self.index.clone(),
            message: format!("{}: {}", status, body),
        })
    }

    async fn bulk_upsert(&self, records: &[IndexRecord]) -> Result<BulkSummary, IndexError> {
        if records.is_empty() {
            return Ok(BulkSummary::default());
        }
        let body = bulk_body(&self.index, records).map_err(|e| IndexError::Bulk {
            index: self.index.clone(),
            message: e.to_string(),
        })?;
        let response = self
            .client
            .post(format!("{}/_bulk", self.base_url))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(Self::transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Bulk {
                index: self.index.clone(),
                message: format!("{}: {}", status, body),
            });
        }
        let parsed: BulkResponse = response.json().await.map_err(Self::transport)?;
        Ok(summarize(&self.index, parsed))
    }
}

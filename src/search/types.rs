//! Shared types used by the Azure AI Search client and helpers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Azure AI Search.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Endpoint failed to parse or normalize.
    #[error("Invalid search endpoint: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The search service responded with an unexpected status code.
    #[error("Unexpected search response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Prepared chunk ready for indexing, including text, hash, and vector.
#[derive(Debug, Clone)]
pub struct ChunkInsert {
    /// Chunk text.
    pub text: String,
    /// Deterministic hash of the chunk, used as the document key.
    pub chunk_hash: String,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
    /// Header path and other metadata captured while chunking.
    pub metadata: Map<String, Value>,
}

/// Chunk returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    /// Document key.
    pub id: String,
    /// Similarity score reported by the service.
    pub score: f32,
    /// Stored chunk text.
    pub content: String,
    /// Stored chunk metadata.
    pub metadata: Map<String, Value>,
    /// File name or URL the chunk was indexed from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Summary describing how the service applied an indexing batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Documents created by the batch.
    pub inserted: usize,
    /// Existing documents merged in place.
    pub updated: usize,
    /// Documents the service rejected.
    pub failed: usize,
}

#[derive(Deserialize)]
pub(crate) struct IndexBatchResponse {
    #[serde(default)]
    pub(crate) value: Vec<IndexingResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IndexingResult {
    pub(crate) key: String,
    pub(crate) status: bool,
    #[serde(default)]
    pub(crate) error_message: Option<String>,
    pub(crate) status_code: u16,
}

#[derive(Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub(crate) value: Vec<SearchDocument>,
}

#[derive(Deserialize)]
pub(crate) struct SearchDocument {
    #[serde(rename = "@search.score")]
    pub(crate) score: f32,
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) metadata: Option<String>,
    #[serde(default)]
    pub(crate) source: Option<String>,
}

//! Vector store integration backed by Azure AI Search.

pub mod client;
pub mod payload;
pub mod types;

use async_trait::async_trait;

pub use client::AzureSearchClient;
pub use payload::compute_chunk_hash;
pub use types::{ChunkInsert, IndexSummary, ScoredChunk, SearchError};

/// Interface implemented by vector stores holding document chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the index when it does not exist yet.
    async fn ensure_index(&self, dimension: usize) -> Result<(), SearchError>;

    /// Insert or overwrite chunks, keyed by their content hash.
    async fn upsert(
        &self,
        chunks: Vec<ChunkInsert>,
        source: Option<&str>,
    ) -> Result<IndexSummary, SearchError>;

    /// Return the `k` chunks most similar to `vector`, best first.
    async fn query(&self, vector: Vec<f32>, k: usize) -> Result<Vec<ScoredChunk>, SearchError>;
}

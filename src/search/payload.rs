//! Helpers for building index definitions and search documents.

use crate::search::types::ChunkInsert;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

pub(crate) const VECTOR_FIELD: &str = "content_vector";
const VECTOR_PROFILE: &str = "docsift-vector-profile";
const VECTOR_ALGORITHM: &str = "docsift-hnsw";
/// Azure AI Search accepts at most 1000 actions per indexing request.
pub(crate) const MAX_BATCH_DOCUMENTS: usize = 1000;
/// Requests are capped at 16 MB; leave room for the envelope.
pub(crate) const MAX_BATCH_BYTES: usize = 15 * 1024 * 1024;

/// Index schema with a cosine HNSW vector field of the given dimension.
pub(crate) fn index_definition(index_name: &str, dimension: usize) -> Value {
    json!({
        "name": index_name,
        "fields": [
            { "name": "id", "type": "Edm.String", "key": true, "filterable": true },
            { "name": "content", "type": "Edm.String", "searchable": true },
            {
                "name": VECTOR_FIELD,
                "type": "Collection(Edm.Single)",
                "searchable": true,
                "dimensions": dimension,
                "vectorSearchProfile": VECTOR_PROFILE
            },
            { "name": "metadata", "type": "Edm.String", "searchable": true },
            { "name": "source", "type": "Edm.String", "filterable": true },
            { "name": "indexed_at", "type": "Edm.DateTimeOffset", "filterable": true, "sortable": true }
        ],
        "vectorSearch": {
            "algorithms": [
                { "name": VECTOR_ALGORITHM, "kind": "hnsw", "hnswParameters": { "metric": "cosine" } }
            ],
            "profiles": [
                { "name": VECTOR_PROFILE, "algorithm": VECTOR_ALGORITHM }
            ]
        }
    })
}

/// Build the `mergeOrUpload` action stored for each chunk.
///
/// The chunk hash is the document key, so re-indexing identical text overwrites in place.
pub(crate) fn build_document(
    chunk: ChunkInsert,
    source: Option<&str>,
    timestamp_rfc3339: &str,
) -> Value {
    let mut document = Map::new();
    document.insert("@search.action".into(), Value::String("mergeOrUpload".into()));
    document.insert("id".into(), Value::String(chunk.chunk_hash));
    document.insert("content".into(), Value::String(chunk.text));
    document.insert(VECTOR_FIELD.into(), json!(chunk.vector));
    document.insert(
        "metadata".into(),
        Value::String(Value::Object(chunk.metadata).to_string()),
    );
    if let Some(source) = source.map(str::trim).filter(|value| !value.is_empty()) {
        document.insert("source".into(), Value::String(source.to_string()));
    }
    document.insert(
        "indexed_at".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    Value::Object(document)
}

/// Split indexing actions into request-sized batches, preserving order.
///
/// A batch closes when it reaches `max_documents` actions or when the next action would push
/// its serialized size past `max_bytes`. An action larger than `max_bytes` still gets a batch
/// of its own so the service can reject it with a per-document error.
pub(crate) fn batch_documents(
    documents: Vec<Value>,
    max_documents: usize,
    max_bytes: usize,
) -> Vec<Vec<Value>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut current_bytes = 0usize;

    for document in documents {
        let size = document.to_string().len() + 1;
        let full = current.len() >= max_documents || current_bytes + size > max_bytes;
        if full && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += size;
        current.push(document);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Decode the metadata column, which is stored as a JSON string.
pub(crate) fn parse_metadata(raw: Option<&str>) -> Map<String, Value> {
    match raw.map(serde_json::from_str::<Value>) {
        Some(Ok(Value::Object(map))) => map,
        Some(Ok(_)) | None => Map::new(),
        Some(Err(error)) => {
            tracing::debug!(error = %error, "Ignoring undecodable chunk metadata");
            Map::new()
        }
    }
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for document storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

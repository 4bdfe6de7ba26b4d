//! Mapping helpers between chunking output, the vector store, and prompts.

use crate::{
    processing::chunking::MarkdownChunk,
    search::{ChunkInsert, ScoredChunk, compute_chunk_hash},
};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Chunk text with associated hash and heading metadata ready for embedding.
#[derive(Debug, Clone)]
pub(crate) struct PreparedChunk {
    /// Chunk text content.
    pub(crate) text: String,
    /// Stable digest used for dedupe and as the document key.
    pub(crate) chunk_hash: String,
    /// Heading path as a JSON object.
    pub(crate) metadata: Map<String, Value>,
}

impl PreparedChunk {
    pub(crate) fn into_insert(self, vector: Vec<f32>) -> ChunkInsert {
        ChunkInsert {
            text: self.text,
            chunk_hash: self.chunk_hash,
            vector,
            metadata: self.metadata,
        }
    }
}

/// Remove duplicate chunks within a document, keeping the first occurrence.
pub(crate) fn dedupe_chunks(chunks: Vec<MarkdownChunk>) -> (Vec<PreparedChunk>, usize) {
    let mut seen = HashSet::new();
    let mut prepared = Vec::new();
    let mut skipped = 0;

    for chunk in chunks {
        if chunk.content.trim().is_empty() {
            continue;
        }
        let hash = compute_chunk_hash(&chunk.content);
        if seen.insert(hash.clone()) {
            prepared.push(PreparedChunk {
                text: chunk.content,
                chunk_hash: hash,
                metadata: chunk
                    .metadata
                    .into_iter()
                    .map(|(key, value)| (key, Value::String(value)))
                    .collect(),
            });
        } else {
            skipped += 1;
        }
    }

    (prepared, skipped)
}

/// Join retrieved chunks into the context block of a retrieval prompt.
pub(crate) fn format_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|hit| hit.content.trim())
        .filter(|content| !content.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn chunk(content: &str, header: Option<&str>) -> MarkdownChunk {
        let mut metadata = BTreeMap::new();
        if let Some(header) = header {
            metadata.insert("Header 1".to_string(), header.to_string());
        }
        MarkdownChunk {
            content: content.to_string(),
            metadata,
        }
    }

    #[test]
    fn dedupe_chunks_removes_duplicates_and_counts_skips() {
        let chunks = vec![
            chunk("alpha", Some("A")),
            chunk("beta", None),
            chunk("alpha", Some("B")),
            chunk("   ", None),
            chunk("beta", None),
        ];
        let (deduped, skipped) = dedupe_chunks(chunks);
        let texts: Vec<_> = deduped.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "beta"]);
        assert_eq!(skipped, 2);
        assert_ne!(deduped[0].chunk_hash, deduped[1].chunk_hash);
        assert_eq!(deduped[0].metadata["Header 1"], "A");
        assert!(deduped[1].metadata.is_empty());
    }

    #[test]
    fn context_joins_hits_with_blank_lines() {
        let hit = |content: &str| ScoredChunk {
            id: compute_chunk_hash(content),
            score: 0.5,
            content: content.to_string(),
            metadata: Map::new(),
            source: None,
        };
        let context = format_context(&[hit("First chunk\n"), hit(""), hit("Second chunk")]);
        assert_eq!(context, "First chunk\n\nSecond chunk");
    }
}

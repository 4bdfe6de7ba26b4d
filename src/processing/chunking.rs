//! Header-based markdown chunking and token budgets.
//!
//! Layout analysis returns markdown, which is split on `#`, `##`, and `###` headings. Each chunk
//! carries the heading path it sits under (`Header 1` .. `Header 3`) and the heading lines
//! themselves are dropped from the content. Fenced code blocks are never split. Sections that
//! still exceed the embedding token budget are cut further with `semchunk-rs`, counting tokens
//! with `tiktoken-rs`.

use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::collections::BTreeMap;
use std::sync::Arc;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, model::get_context_size, o200k_base};

use super::types::ChunkingError;

pub(crate) type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const HEADERS_TO_SPLIT_ON: [(&str, &str); 3] =
    [("###", "Header 3"), ("##", "Header 2"), ("#", "Header 1")];
const MIN_AUTOMATIC_CHUNK_SIZE: usize = 256;
const MAX_AUTOMATIC_CHUNK_SIZE: usize = 1024;

/// A section of markdown together with the headings it sits under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownChunk {
    /// Section text without its heading line.
    pub content: String,
    /// Heading path, keyed `Header 1` .. `Header 3`.
    pub metadata: BTreeMap<String, String>,
}

struct Heading {
    level: usize,
    name: &'static str,
}

/// Split markdown on level 1-3 headings.
///
/// Lines under the same heading path are merged into one chunk, with blank-line separated
/// blocks joined by `"  \n"`. Text before the first heading forms a chunk with no metadata.
pub fn split_markdown_by_headers(text: &str) -> Vec<MarkdownChunk> {
    let mut sections: Vec<MarkdownChunk> = Vec::new();
    let mut current_content: Vec<String> = Vec::new();
    let mut current_metadata: BTreeMap<String, String> = BTreeMap::new();
    let mut active_metadata: BTreeMap<String, String> = BTreeMap::new();
    let mut heading_stack: Vec<Heading> = Vec::new();
    let mut opening_fence: Option<&'static str> = None;

    for line in text.split('\n') {
        let stripped: String = line.trim().chars().filter(|c| !c.is_control()).collect();

        match opening_fence {
            None => {
                if let Some(fence) = ["```", "~~~"]
                    .into_iter()
                    .find(|fence| stripped.starts_with(fence) && stripped.matches(fence).count() == 1)
                {
                    opening_fence = Some(fence);
                }
            }
            Some(fence) => {
                if stripped.starts_with(fence) {
                    opening_fence = None;
                }
            }
        }

        if opening_fence.is_some() {
            current_content.push(stripped);
            continue;
        }

        let heading = HEADERS_TO_SPLIT_ON.iter().find(|(marker, _)| {
            stripped.starts_with(marker)
                && (stripped.len() == marker.len() || stripped[marker.len()..].starts_with(' '))
        });

        match heading {
            Some((marker, name)) => {
                let level = marker.len();
                while heading_stack.last().is_some_and(|top| top.level >= level) {
                    if let Some(popped) = heading_stack.pop() {
                        active_metadata.remove(popped.name);
                    }
                }
                let title = stripped[marker.len()..].trim().to_string();
                heading_stack.push(Heading { level, name: *name });
                active_metadata.insert((*name).to_string(), title);
                flush(&mut current_content, &current_metadata, &mut sections);
            }
            None if !stripped.is_empty() => current_content.push(stripped),
            None => flush(&mut current_content, &current_metadata, &mut sections),
        }

        current_metadata = active_metadata.clone();
    }
    flush(&mut current_content, &current_metadata, &mut sections);

    aggregate_sections(sections)
}

fn flush(
    content: &mut Vec<String>,
    metadata: &BTreeMap<String, String>,
    sections: &mut Vec<MarkdownChunk>,
) {
    if !content.is_empty() {
        sections.push(MarkdownChunk {
            content: content.join("\n"),
            metadata: metadata.clone(),
        });
        content.clear();
    }
}

/// Merge consecutive sections that share the same heading path.
fn aggregate_sections(sections: Vec<MarkdownChunk>) -> Vec<MarkdownChunk> {
    let mut aggregated: Vec<MarkdownChunk> = Vec::new();
    for section in sections {
        match aggregated.last_mut() {
            Some(last) if last.metadata == section.metadata => {
                last.content.push_str("  \n");
                last.content.push_str(&section.content);
            }
            _ => aggregated.push(section),
        }
    }
    aggregated
}

/// Determine the token budget for a chunk.
///
/// An explicit override (`TEXT_SPLITTER_CHUNK_SIZE`) wins and is clamped at `>= 1`. Otherwise a
/// quarter of the embedding model's context window is used, clamped into `[256, 1024]`.
pub(crate) fn determine_chunk_size(override_size: Option<usize>, model: &str) -> usize {
    if let Some(explicit) = override_size {
        return explicit.max(1);
    }

    let window = embedding_context_window(model);
    (window / 4).clamp(MIN_AUTOMATIC_CHUNK_SIZE, MAX_AUTOMATIC_CHUNK_SIZE)
}

fn embedding_context_window(model: &str) -> usize {
    if model.starts_with("text-embedding-3") || model.starts_with("text-embedding-ada-002") {
        return 8192;
    }

    let size = get_context_size(model);
    if size == 4096 && model.contains("embedding") {
        tracing::debug!(model, "Using default embedding context window fallback");
    }
    size
}

/// Build a `tiktoken` token counter for the embedding model.
///
/// Deployment names that are not model names fall back to `cl100k_base`, the encoding used by
/// the Azure OpenAI embedding models.
pub(crate) fn build_token_counter(model: &str) -> Result<TokenCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            match model {
                "o200k_base" => o200k_base(),
                _ => cl100k_base(),
            }
        }
    }
}

/// Split sections that exceed `chunk_size` tokens, keeping their heading metadata and order.
pub(crate) fn enforce_token_budget(
    chunks: Vec<MarkdownChunk>,
    chunk_size: usize,
    token_counter: TokenCounter,
) -> Result<Vec<MarkdownChunk>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let counter_for_chunker = token_counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );

    let mut bounded = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if chunk.content.trim().is_empty() {
            continue;
        }
        if token_counter.as_ref()(&chunk.content) <= chunk_size {
            bounded.push(chunk);
            continue;
        }
        let pieces = chunker.chunk(&chunk.content);
        tracing::debug!(pieces = pieces.len(), chunk_size, "Split oversized section");
        bounded.extend(pieces.into_iter().map(|content| MarkdownChunk {
            content,
            metadata: chunk.metadata.clone(),
        }));
    }
    Ok(bounded)
}

/// Split markdown on headings and bound every chunk to `chunk_size` tokens of `model`.
pub fn chunk_markdown(
    text: &str,
    chunk_size: usize,
    model: &str,
) -> Result<Vec<MarkdownChunk>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let token_counter = build_token_counter(model)?;
    enforce_token_budget(split_markdown_by_headers(text), chunk_size, token_counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitespace_counter() -> TokenCounter {
        Arc::new(|segment: &str| segment.split_whitespace().count())
    }

    fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn splits_on_headers_and_tracks_path() {
        let text = "# Intro\nHello world\nSecond line\n\n## Details\nMore text\n### Deep\nDeepest\n# Next\nLast";
        let chunks = split_markdown_by_headers(text);

        assert_eq!(
            chunks,
            vec![
                MarkdownChunk {
                    content: "Hello world\nSecond line".into(),
                    metadata: meta(&[("Header 1", "Intro")]),
                },
                MarkdownChunk {
                    content: "More text".into(),
                    metadata: meta(&[("Header 1", "Intro"), ("Header 2", "Details")]),
                },
                MarkdownChunk {
                    content: "Deepest".into(),
                    metadata: meta(&[
                        ("Header 1", "Intro"),
                        ("Header 2", "Details"),
                        ("Header 3", "Deep"),
                    ]),
                },
                MarkdownChunk {
                    content: "Last".into(),
                    metadata: meta(&[("Header 1", "Next")]),
                },
            ]
        );
    }

    #[test]
    fn blocks_under_the_same_heading_are_merged() {
        let chunks = split_markdown_by_headers("# A\nline1\n\nline2");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "line1  \nline2");
    }

    #[test]
    fn text_before_first_heading_has_no_metadata() {
        let chunks = split_markdown_by_headers("Preamble\n# Title\nBody");
        assert_eq!(chunks[0].content, "Preamble");
        assert!(chunks[0].metadata.is_empty());
        assert_eq!(chunks[1].metadata, meta(&[("Header 1", "Title")]));
    }

    #[test]
    fn fenced_code_is_never_split() {
        let chunks = split_markdown_by_headers("# Code\n```\n# not a header\n\n```\nafter");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "```\n# not a header\n\n```\nafter");
        assert_eq!(chunks[0].metadata, meta(&[("Header 1", "Code")]));
    }

    #[test]
    fn deeper_markers_and_hashtags_are_content() {
        let chunks = split_markdown_by_headers("# Top\n#### Minor\n#hashtag");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "#### Minor\n#hashtag");
    }

    #[test]
    fn oversized_sections_are_split_with_metadata_kept() {
        let chunks = vec![
            MarkdownChunk {
                content: "one two three four five".into(),
                metadata: meta(&[("Header 1", "Long")]),
            },
            MarkdownChunk {
                content: "short".into(),
                metadata: BTreeMap::new(),
            },
        ];

        let bounded = enforce_token_budget(chunks, 2, whitespace_counter()).expect("bounded");

        let contents: Vec<_> = bounded.iter().map(|chunk| chunk.content.as_str()).collect();
        assert_eq!(contents, vec!["one two", "three four", "five", "short"]);
        assert!(bounded[..3]
            .iter()
            .all(|chunk| chunk.metadata == meta(&[("Header 1", "Long")])));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let error = chunk_markdown("# A\nb", 0, "text-embedding-ada-002").unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn tiktoken_budget_is_respected() {
        let text = "# Fox\nThe quick brown fox jumps over the lazy dog.";
        let chunks = chunk_markdown(text, 5, "text-embedding-ada-002").expect("chunks");
        let counter = build_token_counter("text-embedding-ada-002").expect("counter");
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(counter.as_ref()(&chunk.content) <= 5);
        }
        let words: Vec<&str> = chunks
            .iter()
            .flat_map(|chunk| chunk.content.split_whitespace())
            .collect();
        assert_eq!(
            words,
            "The quick brown fox jumps over the lazy dog."
                .split_whitespace()
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn determine_chunk_size_prefers_override_then_model_window() {
        assert_eq!(determine_chunk_size(Some(42), "text-embedding-ada-002"), 42);
        assert_eq!(determine_chunk_size(Some(0), "text-embedding-ada-002"), 1);
        assert_eq!(determine_chunk_size(None, "text-embedding-ada-002"), 1024);
    }

    #[test]
    fn unknown_deployment_names_fall_back_to_cl100k() {
        let counter = build_token_counter("my-embedding-deployment").expect("fallback counter");
        assert!(counter.as_ref()("hello world") > 0);
    }
}

//! Core data types and error definitions for the processing pipeline.

use crate::{
    chat::ChatClientError,
    correction::CorrectionError,
    dispatch::FileKind,
    embedding::EmbeddingClientError,
    extract::ExtractionError,
    search::{ScoredChunk, SearchError},
    storage::StorageError,
};
use anyhow::Error as TokenizerError;
use serde::Serialize;
use thiserror::Error;

/// Errors produced while turning markdown into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Processing configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Model we attempted to load a tokenizer for.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors emitted by the document processing pipeline.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The file name does not map to any extraction path.
    #[error("Unsupported file type.")]
    UnsupportedFileType {
        /// File name that was rejected.
        file_name: String,
    },
    /// The request was missing or carried unusable input.
    #[error("{0}")]
    InvalidInput(String),
    /// Downloading the source document failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Text extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// The correction model failed for a whole-document correction.
    #[error(transparent)]
    Correction(#[from] CorrectionError),
    /// The chat model failed while answering a question.
    #[error("Failed to generate answer: {0}")]
    Chat(#[from] ChatClientError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the input text.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector store interaction failed.
    #[error("Vector store request failed: {0}")]
    Search(#[from] SearchError),
    /// Returned embedding dimension does not match configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected embedding dimension configured on the server.
        expected: usize,
        /// Actual embedding dimension produced by the provider.
        actual: usize,
    },
    /// The operation needs a component that is not configured.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

/// Where a document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// Blob name inside the configured container.
    Blob(String),
    /// URL the hosted service downloads itself.
    Url(String),
}

impl DocumentSource {
    /// Human-readable identifier stored alongside indexed chunks.
    pub fn label(&self) -> &str {
        match self {
            Self::Blob(name) => name,
            Self::Url(url) => url,
        }
    }
}

/// Parameters for extracting (and optionally correcting) a document's text.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    /// Blob name, or image URL for OCR by URL.
    pub source: DocumentSource,
    /// Per-request override of the correction default.
    pub correct: Option<bool>,
    /// Split the text into header chunks and correct each chunk separately.
    pub chunked: bool,
}

/// Result of an extraction request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractOutcome {
    /// Extracted, possibly corrected, text.
    pub text: String,
    /// Extraction path used.
    pub kind: Option<FileKind>,
    /// Whether the text went through the correction model.
    pub corrected: bool,
    /// Number of chunks produced in chunked mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    /// Chunks dropped because their correction failed.
    pub skipped_chunks: Vec<usize>,
}

/// Parameters for indexing a document into the vector store.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    /// Blob name or document URL.
    pub source: DocumentSource,
}

/// Summary of a completed indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexOutcome {
    /// Number of unique chunks produced for the document.
    pub chunk_count: usize,
    /// Token budget used for oversize sections.
    pub chunk_size: usize,
    /// Chunks newly written to the index.
    pub inserted: usize,
    /// Chunks that already existed and were overwritten.
    pub updated: usize,
    /// Chunks the index rejected.
    pub failed: usize,
    /// Chunks skipped within the request due to duplicate content.
    pub skipped_duplicates: usize,
}

/// Parameters for a retrieval-augmented question.
#[derive(Debug, Clone)]
pub struct AskRequest {
    /// Natural language question.
    pub question: String,
    /// Number of chunks to retrieve (defaults applied downstream).
    pub top_k: Option<usize>,
}

/// Answer composed from retrieved chunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskOutcome {
    /// Model answer.
    pub answer: String,
    /// Chunks used as context, best match first.
    pub sources: Vec<ScoredChunk>,
}

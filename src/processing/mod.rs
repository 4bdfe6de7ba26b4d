//! Document processing pipeline: extraction, correction, chunking, and retrieval.

pub mod chunking;
mod mappers;
mod sanitize;
mod service;
pub mod types;

pub use service::{ProcessingApi, ProcessingService, ServiceComponents, ServiceSettings};
pub use types::{
    AskOutcome, AskRequest, ChunkingError, DocumentSource, ExtractOutcome, ExtractRequest,
    IndexOutcome, IndexRequest, ProcessingError,
};

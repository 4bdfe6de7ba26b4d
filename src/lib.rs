#![deny(missing_docs)]

//! Core library for the Docsift document extraction server.

/// HTTP routing and REST handlers.
pub mod api;
/// Chat-completion client abstraction and the Azure OpenAI adapter.
pub mod chat;
/// Environment-driven configuration management.
pub mod config;
/// OCR noise correction through the chat model.
pub mod correction;
/// File-type classification.
pub mod dispatch;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text extraction backends.
pub mod extract;
/// Structured logging and tracing setup.
pub mod logging;
/// Processing counters.
pub mod metrics;
/// Extraction and retrieval pipeline orchestration.
pub mod processing;
/// Azure AI Search vector store integration.
pub mod search;
/// Blob storage access.
pub mod storage;

//! Text extraction backends.
//!
//! Images go to the hosted OCR service, PDFs to the hosted document-analysis service, and
//! Office Open XML files (Word, Excel, PowerPoint) are parsed in-process. Every backend returns
//! plain text with one line per recognized line, paragraph, row, or shape.

pub mod document;
pub mod excel;
pub mod ocr;
mod ooxml;
pub mod slides;
pub mod word;

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::dispatch::FileKind;

pub use document::{AnalysisSource, DocumentAnalyzer, DocumentIntelligenceClient, PollSettings};
pub use ocr::{ComputerVisionClient, OcrClient};

/// Errors produced by any extraction backend.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The HTTP request never produced a response.
    #[error("{service} request failed: {source}")]
    Network {
        /// Hosted service that was being called.
        service: &'static str,
        /// Transport error raised by the HTTP client.
        #[source]
        source: reqwest::Error,
    },
    /// The hosted service answered with a non-success status.
    #[error("{service} returned {status}: {body}")]
    Upstream {
        /// Hosted service that was being called.
        service: &'static str,
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Response body for diagnostics.
        body: String,
    },
    /// The hosted service answered with a body we could not interpret.
    #[error("{service} returned an unexpected response: {message}")]
    InvalidResponse {
        /// Hosted service that was being called.
        service: &'static str,
        /// What was wrong with the response.
        message: String,
    },
    /// Document analysis finished with a `failed` status.
    #[error("Document analysis failed: {0}")]
    AnalysisFailed(String),
    /// Document analysis did not finish within the polling window.
    #[error("Document analysis did not complete within {0:?}")]
    AnalysisTimedOut(Duration),
    /// A locally parsed file was not a valid document of its declared format.
    #[error("Malformed {format} document: {message}")]
    Malformed {
        /// Format the file was expected to be in.
        format: &'static str,
        /// Parser diagnostic.
        message: String,
    },
}

impl ExtractionError {
    pub(crate) fn malformed(format: &'static str, message: impl ToString) -> Self {
        Self::Malformed {
            format,
            message: message.to_string(),
        }
    }
}

/// Parse an Office Open XML document of the given kind.
///
/// Returns `None` for kinds that need a hosted service (images and PDFs).
pub fn extract_office(kind: FileKind, bytes: &[u8]) -> Option<Result<String, ExtractionError>> {
    match kind {
        FileKind::Word => Some(word::extract_text(bytes)),
        FileKind::Excel => Some(excel::extract_text(bytes)),
        FileKind::PowerPoint => Some(slides::extract_text(bytes)),
        FileKind::Image | FileKind::Pdf => None,
    }
}

//! Helpers for normalizing request values.

use super::types::{DocumentSource, ProcessingError};

/// Upper bound for the number of chunks retrieved per question.
pub(crate) const MAX_TOP_K: usize = 50;

/// Sanitize arbitrary string input by trimming whitespace and dropping empties.
pub(crate) fn sanitize_string(value: Option<String>) -> Option<String> {
    value.and_then(|input| {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Normalize a document source, rejecting blank names and URLs that are not http(s).
pub(crate) fn sanitize_source(source: DocumentSource) -> Result<DocumentSource, ProcessingError> {
    match source {
        DocumentSource::Blob(name) => sanitize_string(Some(name))
            .map(DocumentSource::Blob)
            .ok_or_else(|| ProcessingError::InvalidInput("file_name must not be empty".into())),
        DocumentSource::Url(url) => {
            let trimmed = sanitize_string(Some(url))
                .ok_or_else(|| ProcessingError::InvalidInput("URL must not be empty".into()))?;
            let parsed = reqwest::Url::parse(&trimmed)
                .map_err(|error| ProcessingError::InvalidInput(format!("Invalid URL: {error}")))?;
            match parsed.scheme() {
                "http" | "https" => Ok(DocumentSource::Url(trimmed)),
                scheme => Err(ProcessingError::InvalidInput(format!(
                    "Unsupported URL scheme: {scheme}"
                ))),
            }
        }
    }
}

/// Resolve the number of chunks to retrieve, clamped into `[1, MAX_TOP_K]`.
pub(crate) fn resolve_top_k(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).clamp(1, MAX_TOP_K)
}

//! PDF text extraction through Azure Document Intelligence.
//!
//! Analysis is asynchronous on the service side: the analyze request is accepted with an
//! `Operation-Location` header, which is polled until the operation reports `succeeded` or
//! `failed`. Polling backs off exponentially, honours `Retry-After` on 429, and gives up after
//! an overall timeout.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, StatusCode, header::CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;

use super::ExtractionError;
use super::ocr::SUBSCRIPTION_KEY_HEADER;
use crate::config::ServiceCredentials;

const SERVICE: &str = "Document Intelligence";
const READ_API_VERSION: &str = "2023-07-31";
const LAYOUT_API_VERSION: &str = "2024-11-30";
const OPERATION_LOCATION: &str = "Operation-Location";
const RETRY_AFTER: &str = "Retry-After";

/// Where the document-analysis service should read the document from.
#[derive(Debug, Clone)]
pub enum AnalysisSource {
    /// Document bytes sent inline.
    Bytes(Bytes),
    /// Publicly reachable URL the service downloads itself.
    Url(String),
}

/// Interface implemented by document-analysis backends.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Read every page and return its lines, each terminated by `\n`.
    async fn read_lines(&self, document: Bytes) -> Result<String, ExtractionError>;

    /// Analyze the layout and return the document as markdown.
    async fn layout_markdown(&self, source: AnalysisSource) -> Result<String, ExtractionError>;
}

/// Timing for polling a long-running analysis.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Delay before the second poll; doubles after every pending response.
    pub initial_backoff: Duration,
    /// Upper bound for the delay between polls.
    pub max_backoff: Duration,
    /// Total time allowed for the operation to finish.
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            timeout: Duration::from_secs(300),
        }
    }
}

/// HTTP client for the Document Intelligence analyze APIs.
pub struct DocumentIntelligenceClient {
    http: Client,
    endpoint: String,
    api_key: String,
    poll: PollSettings,
}

impl DocumentIntelligenceClient {
    /// Build a client for the configured Document Intelligence resource.
    pub fn new(credentials: &ServiceCredentials) -> Result<Self, ExtractionError> {
        let http = Client::builder()
            .user_agent("docsift/document-intelligence")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| ExtractionError::Network {
                service: SERVICE,
                source,
            })?;
        Ok(Self {
            http,
            endpoint: credentials.endpoint.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
            poll: PollSettings::default(),
        })
    }

    /// Replace the polling schedule.
    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Submit an analyze request and return the operation URL to poll.
    async fn submit(&self, request: RequestBuilder) -> Result<String, ExtractionError> {
        let response = request
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(network)?;

        if !response.status().is_success() {
            return Err(upstream(response, "Analyze request rejected").await);
        }

        response
            .headers()
            .get(OPERATION_LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ExtractionError::InvalidResponse {
                service: SERVICE,
                message: format!("response is missing the {OPERATION_LOCATION} header"),
            })
    }

    async fn poll_until_complete(
        &self,
        operation_url: &str,
    ) -> Result<AnalyzeResult, ExtractionError> {
        let poll = async {
            let mut backoff = self.poll.initial_backoff;
            let mut attempts = 0u32;

            loop {
                attempts += 1;
                let response = self
                    .http
                    .get(operation_url)
                    .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
                    .send()
                    .await
                    .map_err(network)?;

                if response.status() == StatusCode::TOO_MANY_REQUESTS {
                    let wait = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|value| value.to_str().ok())
                        .and_then(|value| value.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or(backoff);
                    tracing::warn!(wait_ms = wait.as_millis() as u64, "Analysis poll throttled");
                    tokio::time::sleep(wait).await;
                    continue;
                }

                if !response.status().is_success() {
                    return Err(upstream(response, "Analysis poll rejected").await);
                }

                let operation: AnalyzeOperation =
                    response
                        .json()
                        .await
                        .map_err(|error| ExtractionError::InvalidResponse {
                            service: SERVICE,
                            message: error.to_string(),
                        })?;

                match operation.status.as_str() {
                    "succeeded" => {
                        tracing::debug!(attempts, "Document analysis succeeded");
                        return Ok(operation.analyze_result.unwrap_or_default());
                    }
                    "failed" => {
                        let message = operation
                            .error
                            .map(|error| error.describe())
                            .unwrap_or_else(|| "no error details returned".to_string());
                        tracing::error!(%message, "Document analysis failed");
                        return Err(ExtractionError::AnalysisFailed(message));
                    }
                    status => {
                        tracing::trace!(status, attempts, "Document analysis pending");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(self.poll.max_backoff);
                    }
                }
            }
        };

        tokio::time::timeout(self.poll.timeout, poll)
            .await
            .map_err(|_| ExtractionError::AnalysisTimedOut(self.poll.timeout))?
    }
}

#[async_trait]
impl DocumentAnalyzer for DocumentIntelligenceClient {
    #[tracing::instrument(skip(self, document), fields(size = document.len()))]
    async fn read_lines(&self, document: Bytes) -> Result<String, ExtractionError> {
        let url = format!(
            "{}/formrecognizer/documentModels/prebuilt-document:analyze?api-version={READ_API_VERSION}",
            self.endpoint
        );
        let request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(document);

        let operation_url = self.submit(request).await?;
        let result = self.poll_until_complete(&operation_url).await?;
        Ok(result.page_lines())
    }

    #[tracing::instrument(skip(self, source))]
    async fn layout_markdown(&self, source: AnalysisSource) -> Result<String, ExtractionError> {
        let url = format!(
            "{}/documentintelligence/documentModels/prebuilt-layout:analyze?api-version={LAYOUT_API_VERSION}&outputContentFormat=markdown",
            self.endpoint
        );
        let body = match source {
            AnalysisSource::Bytes(bytes) => {
                json!({ "base64Source": general_purpose::STANDARD.encode(&bytes) })
            }
            AnalysisSource::Url(url) => json!({ "urlSource": url }),
        };

        let operation_url = self.submit(self.http.post(url).json(&body)).await?;
        let result = self.poll_until_complete(&operation_url).await?;
        Ok(result.content)
    }
}

fn network(source: reqwest::Error) -> ExtractionError {
    ExtractionError::Network {
        service: SERVICE,
        source,
    }
}

async fn upstream(response: reqwest::Response, context: &str) -> ExtractionError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = ExtractionError::Upstream {
        service: SERVICE,
        status,
        body,
    };
    tracing::error!(error = %error, "{context}");
    error
}

#[derive(Debug, Deserialize)]
struct AnalyzeOperation {
    status: String,
    #[serde(rename = "analyzeResult")]
    analyze_result: Option<AnalyzeResult>,
    error: Option<OperationError>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    content: String,
    #[serde(default)]
    pages: Vec<AnalyzedPage>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzedPage {
    #[serde(default)]
    lines: Vec<AnalyzedLine>,
}

#[derive(Debug, Deserialize)]
struct AnalyzedLine {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    code: Option<String>,
    message: Option<String>,
}

impl OperationError {
    fn describe(self) -> String {
        match (self.code, self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(text), None) | (None, Some(text)) => text,
            (None, None) => "no error details returned".to_string(),
        }
    }
}

impl AnalyzeResult {
    fn page_lines(self) -> String {
        let mut text = String::new();
        for line in self.pages.into_iter().flat_map(|page| page.lines) {
            text.push_str(&line.content);
            text.push('\n');
        }
        text
    }
}

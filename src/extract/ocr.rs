//! Image text extraction through the Computer Vision OCR endpoint (`/vision/v3.1/ocr`).
//!
//! The service returns regions of lines of words. Each line becomes the space-joined text of
//! its words followed by a newline, in region then line order.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, header::CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;

use super::ExtractionError;
use crate::config::ServiceCredentials;

const SERVICE: &str = "Computer Vision";
const OCR_PATH: &str = "vision/v3.1/ocr";
pub(crate) const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Interface implemented by OCR backends.
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// Recognize text in raw image bytes.
    async fn read_bytes(&self, image: Bytes) -> Result<String, ExtractionError>;

    /// Recognize text in an image the service downloads itself.
    async fn read_url(&self, url: &str) -> Result<String, ExtractionError>;
}

/// HTTP client for the Computer Vision OCR API.
pub struct ComputerVisionClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl ComputerVisionClient {
    /// Build a client for the configured Computer Vision resource.
    pub fn new(credentials: &ServiceCredentials) -> Result<Self, ExtractionError> {
        let http = Client::builder()
            .user_agent("docsift/ocr")
            .build()
            .map_err(|source| ExtractionError::Network {
                service: SERVICE,
                source,
            })?;
        Ok(Self {
            http,
            endpoint: credentials.endpoint.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
        })
    }

    fn request(&self) -> RequestBuilder {
        self.http
            .post(format!("{}/{OCR_PATH}", self.endpoint))
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, ExtractionError> {
        let response = request
            .send()
            .await
            .map_err(|source| ExtractionError::Network {
                service: SERVICE,
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = ExtractionError::Upstream {
                service: SERVICE,
                status,
                body,
            };
            tracing::error!(error = %error, "OCR request rejected");
            return Err(error);
        }

        let analysis: OcrResponse =
            response
                .json()
                .await
                .map_err(|error| ExtractionError::InvalidResponse {
                    service: SERVICE,
                    message: error.to_string(),
                })?;
        let text = analysis.into_text();
        tracing::debug!(lines = text.lines().count(), "OCR completed");
        Ok(text)
    }
}

#[async_trait]
impl OcrClient for ComputerVisionClient {
    #[tracing::instrument(skip(self, image), fields(size = image.len()))]
    async fn read_bytes(&self, image: Bytes) -> Result<String, ExtractionError> {
        let request = self
            .request()
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image);
        self.send(request).await
    }

    #[tracing::instrument(skip(self))]
    async fn read_url(&self, url: &str) -> Result<String, ExtractionError> {
        let request = self.request().json(&json!({ "url": url }));
        self.send(request).await
    }
}

#[derive(Debug, Default, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    regions: Vec<OcrRegion>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrRegion {
    #[serde(default)]
    lines: Vec<OcrLine>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrLine {
    #[serde(default)]
    words: Vec<OcrWord>,
}

#[derive(Debug, Deserialize)]
struct OcrWord {
    text: String,
}

impl OcrResponse {
    fn into_text(self) -> String {
        let mut text = String::new();
        for line in self.regions.into_iter().flat_map(|region| region.lines) {
            let words: Vec<String> = line.words.into_iter().map(|word| word.text).collect();
            text.push_str(&words.join(" "));
            text.push('\n');
        }
        text
    }
}

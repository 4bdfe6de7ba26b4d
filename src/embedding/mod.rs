//! Embedding client abstraction and the Azure OpenAI adapter.

use crate::config::OpenAiSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Azure OpenAI caps the number of inputs per embeddings request.
const MAX_INPUTS_PER_REQUEST: usize = 16;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed or did not match the request.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Embedding client for an Azure OpenAI embeddings deployment.
pub struct AzureOpenAiEmbeddingClient {
    http: Client,
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
}

impl AzureOpenAiEmbeddingClient {
    /// Build a client for the configured embedding deployment.
    pub fn new(settings: &OpenAiSettings) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("docsift/embedding")
            .build()
            .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))?;
        Ok(Self {
            http,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            deployment: settings.embedding_deployment.clone(),
            api_version: settings.api_version.clone(),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let response = self
            .http
            .post(self.url())
            .header("api-key", &self.api_key)
            .json(&json!({ "input": batch }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::GenerationFailed(format!(
                    "failed to reach Azure OpenAI at {}: {error}",
                    self.endpoint
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Azure OpenAI returned {status}: {body}"
            )));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!("failed to decode embeddings: {error}"))
        })?;

        let mut data = body.data;
        if data.len() != batch.len() {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {} embeddings, received {}",
                batch.len(),
                data.len()
            )));
        }
        data.sort_by_key(|item| item.index);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for AzureOpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        tracing::debug!(
            deployment = %self.deployment,
            inputs = texts.len(),
            "Generating embeddings"
        );

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_INPUTS_PER_REQUEST) {
            embeddings.extend(self.embed_batch(batch).await?);
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client(server: &MockServer) -> AzureOpenAiEmbeddingClient {
        AzureOpenAiEmbeddingClient::new(&OpenAiSettings {
            endpoint: server.base_url(),
            api_key: "aoai-key".into(),
            api_version: "2023-05-15".into(),
            chat_deployment: "gpt-35-turbo".into(),
            embedding_deployment: "text-embedding-ada-002".into(),
        })
        .expect("client")
    }

    #[tokio::test]
    async fn embeddings_follow_input_order_even_when_response_is_shuffled() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/deployments/text-embedding-ada-002/embeddings")
                    .query_param("api-version", "2023-05-15")
                    .header("api-key", "aoai-key")
                    .json_body(json!({ "input": ["alpha", "beta"] }));
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 1.0] },
                        { "index": 0, "embedding": [1.0, 0.0] }
                    ]
                }));
            })
            .await;

        let vectors = client(&server)
            .generate_embeddings(vec!["alpha".into(), "beta".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn large_inputs_are_sent_in_batches() {
        let server = MockServer::start_async().await;
        let data: Vec<_> = (0..MAX_INPUTS_PER_REQUEST)
            .map(|index| json!({ "index": index, "embedding": [index as f32] }))
            .collect();
        let full = server
            .mock_async(|when, then| {
                when.method(POST).body_contains("\"t0\"");
                then.status(200).json_body(json!({ "data": data }));
            })
            .await;
        let rest = server
            .mock_async(|when, then| {
                when.method(POST).body_contains("\"t16\"");
                then.status(200)
                    .json_body(json!({ "data": [ { "index": 0, "embedding": [99.0] } ] }));
            })
            .await;

        let texts: Vec<String> = (0..=MAX_INPUTS_PER_REQUEST).map(|i| format!("t{i}")).collect();
        let vectors = client(&server)
            .generate_embeddings(texts)
            .await
            .expect("embeddings");

        full.assert_async().await;
        rest.assert_async().await;
        assert_eq!(vectors.len(), MAX_INPUTS_PER_REQUEST + 1);
        assert_eq!(vectors[MAX_INPUTS_PER_REQUEST], vec![99.0]);
    }

    #[tokio::test]
    async fn mismatched_response_length_is_invalid() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({ "data": [] }));
            })
            .await;

        let error = client(&server)
            .generate_embeddings(vec!["alpha".into()])
            .await
            .expect_err("length mismatch");

        assert!(matches!(error, EmbeddingClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let server = MockServer::start_async().await;
        let error = client(&server)
            .generate_embeddings(Vec::new())
            .await
            .expect_err("empty input");
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));
    }
}

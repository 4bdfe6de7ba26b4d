//! HTTP client wrapper for the Azure AI Search REST API.

use crate::config::SearchSettings;
use crate::search::{
    VectorIndex,
    payload::{
        MAX_BATCH_BYTES, MAX_BATCH_DOCUMENTS, VECTOR_FIELD, batch_documents, build_document,
        current_timestamp_rfc3339, index_definition, parse_metadata,
    },
    types::{ChunkInsert, IndexBatchResponse, IndexSummary, ScoredChunk, SearchError, SearchResponse},
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::json;

const API_VERSION: &str = "2023-11-01";

/// Lightweight HTTP client for one Azure AI Search index.
pub struct AzureSearchClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) index_name: String,
}

impl AzureSearchClient {
    /// Construct a client for the configured search service and index.
    pub fn new(settings: &SearchSettings) -> Result<Self, SearchError> {
        let client = Client::builder().user_agent("docsift/0.1").build()?;
        let base_url = normalize_base_url(&settings.endpoint).map_err(SearchError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            index = %settings.index_name,
            "Initialized Azure AI Search client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: settings.admin_key.clone(),
            index_name: settings.index_name.clone(),
        })
    }

    async fn index_exists(&self) -> Result<bool, SearchError> {
        let response = self
            .request(Method::GET, &format!("indexes/{}", self.index_name))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = SearchError::UnexpectedStatus { status, body };
                tracing::error!(index = %self.index_name, error = %error, "Index existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        self.client
            .request(method, url)
            .query(&[("api-version", API_VERSION)])
            .header("api-key", &self.api_key)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<reqwest::Response, SearchError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = SearchError::UnexpectedStatus { status, body };
            tracing::error!(index = %self.index_name, error = %error, "Search request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorIndex for AzureSearchClient {
    async fn ensure_index(&self, dimension: usize) -> Result<(), SearchError> {
        if self.index_exists().await? {
            return Ok(());
        }

        tracing::debug!(index = %self.index_name, dimension, "Creating index");
        let response = self
            .request(Method::PUT, &format!("indexes/{}", self.index_name))
            .json(&index_definition(&self.index_name, dimension))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::info!(index = %self.index_name, dimension, "Index created");
        })
        .await?;
        Ok(())
    }

    async fn upsert(
        &self,
        chunks: Vec<ChunkInsert>,
        source: Option<&str>,
    ) -> Result<IndexSummary, SearchError> {
        if chunks.is_empty() {
            return Ok(IndexSummary::default());
        }

        let now = current_timestamp_rfc3339();
        let documents: Vec<_> = chunks
            .into_iter()
            .map(|chunk| build_document(chunk, source, &now))
            .collect();
        let document_count = documents.len();
        let batches = batch_documents(documents, MAX_BATCH_DOCUMENTS, MAX_BATCH_BYTES);
        let batch_count = batches.len();

        let mut summary = IndexSummary::default();
        for (batch_index, batch) in batches.into_iter().enumerate() {
            tracing::debug!(
                index = %self.index_name,
                batch = batch_index,
                documents = batch.len(),
                "Sending indexing batch"
            );
            let response = self
                .request(
                    Method::POST,
                    &format!("indexes/{}/docs/index", self.index_name),
                )
                .json(&json!({ "value": batch }))
                .send()
                .await?;
            let response = self.ensure_success(response, || {}).await?;

            let results: IndexBatchResponse = response.json().await?;
            for result in results.value {
                match (result.status, result.status_code) {
                    (true, 201) => summary.inserted += 1,
                    (true, _) => summary.updated += 1,
                    (false, status_code) => {
                        summary.failed += 1;
                        tracing::warn!(
                            key = %result.key,
                            status_code,
                            error = result.error_message.as_deref().unwrap_or_default(),
                            "Document rejected by index"
                        );
                    }
                }
            }
        }

        tracing::debug!(
            index = %self.index_name,
            documents = document_count,
            batches = batch_count,
            inserted = summary.inserted,
            updated = summary.updated,
            failed = summary.failed,
            "Documents indexed"
        );
        Ok(summary)
    }

    async fn query(&self, vector: Vec<f32>, k: usize) -> Result<Vec<ScoredChunk>, SearchError> {
        let body = json!({
            "select": "id,content,metadata,source",
            "top": k,
            "vectorQueries": [
                { "kind": "vector", "vector": vector, "fields": VECTOR_FIELD, "k": k }
            ]
        });

        let response = self
            .request(
                Method::POST,
                &format!("indexes/{}/docs/search", self.index_name),
            )
            .json(&body)
            .send()
            .await?;
        let response = self.ensure_success(response, || {}).await?;

        let payload: SearchResponse = response.json().await?;
        let hits = payload
            .value
            .into_iter()
            .map(|document| ScoredChunk {
                id: document.id,
                score: document.score,
                content: document.content.unwrap_or_default(),
                metadata: parse_metadata(document.metadata.as_deref()),
                source: document.source,
            })
            .collect();

        Ok(hits)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::compute_chunk_hash;
    use httpmock::Method::{GET, POST, PUT};
    use httpmock::MockServer;
    use serde_json::{Map, Value};

    fn service(server: &MockServer) -> AzureSearchClient {
        AzureSearchClient::new(&SearchSettings {
            endpoint: server.base_url(),
            admin_key: "search-key".into(),
            index_name: "idx-rag-dev".into(),
            embedding_dimension: 2,
            top_k: 3,
        })
        .expect("client")
    }

    fn chunk(text: &str) -> ChunkInsert {
        ChunkInsert {
            text: text.into(),
            chunk_hash: compute_chunk_hash(text),
            vector: vec![0.1, 0.2],
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn ensure_index_creates_missing_index() {
        let server = MockServer::start_async().await;
        let lookup = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/indexes/idx-rag-dev")
                    .query_param("api-version", "2023-11-01")
                    .header("api-key", "search-key");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/indexes/idx-rag-dev")
                    .body_contains("\"dimensions\":2");
                then.status(201).json_body(json!({ "name": "idx-rag-dev" }));
            })
            .await;

        service(&server).ensure_index(2).await.expect("index ensured");

        lookup.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn ensure_index_leaves_existing_index_alone() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/indexes/idx-rag-dev");
                then.status(200).json_body(json!({ "name": "idx-rag-dev" }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/indexes/idx-rag-dev");
                then.status(201);
            })
            .await;

        service(&server).ensure_index(2).await.expect("index ensured");

        assert_eq!(create.hits_async().await, 0);
    }

    #[tokio::test]
    async fn upsert_counts_created_updated_and_rejected_documents() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes/idx-rag-dev/docs/index")
                    .body_contains("mergeOrUpload")
                    .body_contains("\"source\":\"report.pdf\"");
                then.status(207).json_body(json!({
                    "value": [
                        { "key": "a", "status": true, "errorMessage": null, "statusCode": 201 },
                        { "key": "b", "status": true, "errorMessage": null, "statusCode": 200 },
                        { "key": "c", "status": false, "errorMessage": "too large", "statusCode": 400 }
                    ]
                }));
            })
            .await;

        let summary = service(&server)
            .upsert(vec![chunk("a"), chunk("b"), chunk("c")], Some("report.pdf"))
            .await
            .expect("upsert");

        mock.assert_async().await;
        assert_eq!(
            summary,
            IndexSummary {
                inserted: 1,
                updated: 1,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn upsert_splits_large_uploads_into_batches() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/indexes/idx-rag-dev/docs/index");
                then.status(200).json_body(json!({
                    "value": [
                        { "key": "k", "status": true, "errorMessage": null, "statusCode": 201 }
                    ]
                }));
            })
            .await;

        let chunks: Vec<ChunkInsert> = (0..1001).map(|n| chunk(&format!("chunk {n}"))).collect();
        let summary = service(&server)
            .upsert(chunks, Some("big.pdf"))
            .await
            .expect("upsert");

        mock.assert_hits_async(2).await;
        assert_eq!(summary.inserted, 2);
    }

    #[tokio::test]
    async fn upsert_of_nothing_makes_no_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(500);
            })
            .await;

        let summary = service(&server).upsert(Vec::new(), None).await.expect("noop");

        assert_eq!(summary, IndexSummary::default());
        assert_eq!(mock.hits_async().await, 0);
    }

    #[tokio::test]
    async fn query_emits_vector_query_and_decodes_hits() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/indexes/idx-rag-dev/docs/search")
                    .json_body(json!({
                        "select": "id,content,metadata,source",
                        "top": 3,
                        "vectorQueries": [
                            { "kind": "vector", "vector": [0.5, 0.25], "fields": "content_vector", "k": 3 }
                        ]
                    }));
                then.status(200).json_body(json!({
                    "value": [
                        {
                            "@search.score": 0.42,
                            "id": "abc",
                            "content": "Example",
                            "metadata": "{\"Header 1\":\"Intro\"}",
                            "source": "report.pdf"
                        }
                    ]
                }));
            })
            .await;

        let hits = service(&server)
            .query(vec![0.5, 0.25], 3)
            .await
            .expect("query");

        mock.assert_async().await;
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.id, "abc");
        assert!((hit.score - 0.42).abs() < f32::EPSILON);
        assert_eq!(hit.content, "Example");
        assert_eq!(hit.metadata["Header 1"], Value::String("Intro".into()));
        assert_eq!(hit.source.as_deref(), Some("report.pdf"));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/indexes/idx-rag-dev/docs/search");
                then.status(403).body("Forbidden");
            })
            .await;

        let error = service(&server)
            .query(vec![0.0, 1.0], 3)
            .await
            .expect_err("forbidden");

        assert!(matches!(
            error,
            SearchError::UnexpectedStatus { status, .. } if status == StatusCode::FORBIDDEN
        ));
    }
}

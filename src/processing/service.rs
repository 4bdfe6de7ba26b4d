//! Processing service coordinating download, extraction, correction, and retrieval.

use crate::{
    chat::{AzureOpenAiChatClient, ChatClient, ChatMessage, ChatRequest},
    config::Config,
    correction::TextCorrector,
    dispatch::FileKind,
    embedding::{AzureOpenAiEmbeddingClient, EmbeddingClient, EmbeddingClientError},
    extract::{
        AnalysisSource, ComputerVisionClient, DocumentAnalyzer, DocumentIntelligenceClient,
        OcrClient, extract_office,
    },
    metrics::{ProcessingMetrics, MetricsSnapshot},
    processing::{
        chunking::{chunk_markdown, determine_chunk_size, split_markdown_by_headers},
        mappers::{dedupe_chunks, format_context},
        sanitize::{resolve_top_k, sanitize_source, sanitize_string},
        types::{
            AskOutcome, AskRequest, DocumentSource, ExtractOutcome, ExtractRequest, IndexOutcome,
            IndexRequest, ProcessingError,
        },
    },
    search::{AzureSearchClient, ChunkInsert, IndexSummary, VectorIndex},
    storage::{BlobStore, build_blob_store},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Retrieval-augmented question prompt; both values are inserted verbatim.
fn rag_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise.\n\
Question: {question} \n\
Context: {context} \n\
Answer:"
    )
}

/// Abstraction over the processing pipeline used by the HTTP surface.
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Extract text from a blob or image URL, correcting it when enabled.
    async fn extract(&self, request: ExtractRequest) -> Result<ExtractOutcome, ProcessingError>;

    /// Chunk, embed, and index a document into the vector store.
    async fn index_document(&self, request: IndexRequest)
    -> Result<IndexOutcome, ProcessingError>;

    /// Answer a question from the chunks most similar to it.
    async fn ask(&self, request: AskRequest) -> Result<AskOutcome, ProcessingError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Long-lived collaborators the service delegates to.
pub struct ServiceComponents {
    /// Source of input documents.
    pub blobs: Arc<dyn BlobStore>,
    /// Image OCR backend.
    pub ocr: Arc<dyn OcrClient>,
    /// PDF and layout analysis backend.
    pub analyzer: Arc<dyn DocumentAnalyzer>,
    /// Chat model used for correction and answers.
    pub chat: Arc<dyn ChatClient>,
    /// Embedding model used for indexing and questions.
    pub embeddings: Arc<dyn EmbeddingClient>,
    /// Vector store; `None` disables indexing and questions.
    pub index: Option<Arc<dyn VectorIndex>>,
}

/// Behaviour switches resolved from configuration.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Correct extracted text unless a request opts out.
    pub correction_enabled: bool,
    /// Explicit token budget for oversized sections.
    pub chunk_size_override: Option<usize>,
    /// Embedding model name used to pick a tokenizer and default budget.
    pub embedding_model: String,
    /// Expected length of every embedding vector.
    pub embedding_dimension: usize,
    /// Chunks retrieved per question when the request does not say.
    pub default_top_k: usize,
}

impl ServiceSettings {
    /// Derive settings from the process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            correction_enabled: config.correction_enabled,
            chunk_size_override: config.text_splitter_chunk_size,
            embedding_model: config.openai.embedding_deployment.clone(),
            embedding_dimension: config
                .search
                .as_ref()
                .map_or(1536, |search| search.embedding_dimension),
            default_top_k: config.search.as_ref().map_or(3, |search| search.top_k),
        }
    }
}

/// Coordinates the extraction pipeline and the retrieval pipeline over shared clients.
///
/// Construct the service once near process start and share it through an `Arc`.
pub struct ProcessingService {
    blobs: Arc<dyn BlobStore>,
    ocr: Arc<dyn OcrClient>,
    analyzer: Arc<dyn DocumentAnalyzer>,
    corrector: TextCorrector,
    chat: Arc<dyn ChatClient>,
    embeddings: Arc<dyn EmbeddingClient>,
    index: Option<Arc<dyn VectorIndex>>,
    index_ready: OnceCell<()>,
    settings: ServiceSettings,
    metrics: Arc<ProcessingMetrics>,
}

impl ProcessingService {
    /// Assemble a service from explicit components.
    pub fn new(components: ServiceComponents, settings: ServiceSettings) -> Self {
        let ServiceComponents {
            blobs,
            ocr,
            analyzer,
            chat,
            embeddings,
            index,
        } = components;
        Self {
            blobs,
            ocr,
            analyzer,
            corrector: TextCorrector::new(chat.clone()),
            chat,
            embeddings,
            index,
            index_ready: OnceCell::new(),
            settings,
            metrics: Arc::new(ProcessingMetrics::new()),
        }
    }

    /// Build the Azure-backed clients described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, ProcessingError> {
        tracing::info!("Initializing processing clients");
        let index: Option<Arc<dyn VectorIndex>> = match &config.search {
            Some(search) => Some(Arc::new(AzureSearchClient::new(search)?)),
            None => {
                tracing::info!("Vector search not configured; indexing and questions disabled");
                None
            }
        };
        let components = ServiceComponents {
            blobs: build_blob_store(&config.storage)?,
            ocr: Arc::new(ComputerVisionClient::new(&config.vision)?),
            analyzer: Arc::new(DocumentIntelligenceClient::new(
                &config.document_intelligence,
            )?),
            chat: Arc::new(AzureOpenAiChatClient::new(&config.openai)?),
            embeddings: Arc::new(AzureOpenAiEmbeddingClient::new(&config.openai)?),
            index,
        };
        Ok(Self::new(components, ServiceSettings::from_config(config)))
    }

    /// Extract text from a document and optionally correct it.
    pub async fn extract(&self, request: ExtractRequest) -> Result<ExtractOutcome, ProcessingError> {
        let source = sanitize_source(request.source)?;
        let (text, kind) = match &source {
            DocumentSource::Blob(name) => {
                let kind = classify(name)?;
                let bytes = self.blobs.fetch(name).await?;
                tracing::info!(file_name = %name, %kind, bytes = bytes.len(), "Extracting document");
                let text = match kind {
                    FileKind::Image => self.ocr.read_bytes(bytes).await?,
                    FileKind::Pdf if request.chunked => {
                        self.analyzer
                            .layout_markdown(AnalysisSource::Bytes(bytes))
                            .await?
                    }
                    FileKind::Pdf => self.analyzer.read_lines(bytes).await?,
                    office => parse_office(office, &bytes)?,
                };
                (text, kind)
            }
            DocumentSource::Url(url) => {
                tracing::info!(image_url = %url, "Extracting image by URL");
                (self.ocr.read_url(url).await?, FileKind::Image)
            }
        };
        self.metrics.record_extraction(kind);

        let correct = request.correct.unwrap_or(self.settings.correction_enabled);
        let mut outcome = ExtractOutcome {
            kind: Some(kind),
            ..ExtractOutcome::default()
        };

        if request.chunked {
            let chunks: Vec<String> = split_markdown_by_headers(&text)
                .into_iter()
                .map(|chunk| chunk.content)
                .filter(|content| !content.trim().is_empty())
                .collect();
            outcome.chunks = Some(chunks.len());
            if correct && !chunks.is_empty() {
                let corrected = self.corrector.correct_chunks(&chunks).await;
                self.metrics.record_corrections(
                    corrected.corrected as u64,
                    corrected.skipped.len() as u64,
                );
                outcome.text = corrected.text;
                outcome.corrected = true;
                outcome.skipped_chunks = corrected.skipped;
            } else {
                outcome.text = chunks.join("\n");
            }
        } else if correct && !text.trim().is_empty() {
            outcome.text = self.corrector.correct(&text).await?;
            outcome.corrected = true;
            self.metrics.record_corrections(1, 0);
        } else {
            outcome.text = text;
        }

        tracing::info!(
            source = %source.label(),
            %kind,
            corrected = outcome.corrected,
            chunks = ?outcome.chunks,
            skipped = outcome.skipped_chunks.len(),
            "Extraction finished"
        );
        Ok(outcome)
    }

    /// Run layout analysis on a document, then chunk, embed, and upsert it.
    pub async fn index_document(
        &self,
        request: IndexRequest,
    ) -> Result<IndexOutcome, ProcessingError> {
        let index = self.vector_index()?;
        let source = sanitize_source(request.source)?;
        let markdown = match &source {
            DocumentSource::Blob(name) => {
                let kind = classify(name)?;
                let bytes = self.blobs.fetch(name).await?;
                tracing::info!(file_name = %name, %kind, "Indexing document");
                match kind {
                    FileKind::Pdf => {
                        self.analyzer
                            .layout_markdown(AnalysisSource::Bytes(bytes))
                            .await?
                    }
                    FileKind::Image => self.ocr.read_bytes(bytes).await?,
                    office => parse_office(office, &bytes)?,
                }
            }
            DocumentSource::Url(url) => {
                tracing::info!(url = %url, "Indexing document by URL");
                self.analyzer
                    .layout_markdown(AnalysisSource::Url(url.clone()))
                    .await?
            }
        };

        let model = &self.settings.embedding_model;
        let chunk_size = determine_chunk_size(self.settings.chunk_size_override, model);
        tracing::debug!(
            chunk_size,
            override = ?self.settings.chunk_size_override,
            model = %model,
            "Derived chunk size"
        );
        let chunks = chunk_markdown(&markdown, chunk_size, model)?;
        let (prepared_chunks, skipped_duplicates) = dedupe_chunks(chunks);
        if prepared_chunks.is_empty() {
            tracing::info!(source = %source.label(), "Document produced no chunks");
            return Ok(IndexOutcome {
                chunk_size,
                skipped_duplicates,
                ..IndexOutcome::default()
            });
        }

        self.ensure_index(index.as_ref()).await?;
        let texts: Vec<String> = prepared_chunks
            .iter()
            .map(|chunk| chunk.text.clone())
            .collect();
        let embeddings = self.embeddings.generate_embeddings(texts).await?;
        if embeddings.len() != prepared_chunks.len() {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {} embeddings, received {}",
                prepared_chunks.len(),
                embeddings.len()
            ))
            .into());
        }
        for vector in &embeddings {
            self.check_dimension(vector.len())?;
        }

        let inserts: Vec<ChunkInsert> = prepared_chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| chunk.into_insert(vector))
            .collect();
        let chunk_count = inserts.len();
        let IndexSummary {
            inserted,
            updated,
            failed,
        } = index.upsert(inserts, Some(source.label())).await?;

        self.metrics
            .record_index((inserted + updated) as u64, chunk_size as u64);
        tracing::info!(
            source = %source.label(),
            chunks = chunk_count,
            chunk_size,
            inserted,
            updated,
            failed,
            skipped_duplicates,
            "Document indexed"
        );

        Ok(IndexOutcome {
            chunk_count,
            chunk_size,
            inserted,
            updated,
            failed,
            skipped_duplicates,
        })
    }

    /// Retrieve the chunks closest to `question` and ask the chat model to answer from them.
    pub async fn ask(&self, request: AskRequest) -> Result<AskOutcome, ProcessingError> {
        let index = self.vector_index()?;
        let question = sanitize_string(Some(request.question))
            .ok_or_else(|| ProcessingError::InvalidInput("question must not be empty".into()))?;
        let top_k = resolve_top_k(request.top_k, self.settings.default_top_k);

        let mut vectors = self
            .embeddings
            .generate_embeddings(vec![question.clone()])
            .await?;
        let vector = vectors.pop().ok_or_else(|| {
            EmbeddingClientError::InvalidResponse("no embedding returned for question".into())
        })?;
        self.check_dimension(vector.len())?;

        let sources = index.query(vector, top_k).await?;
        tracing::debug!(top_k, hits = sources.len(), "Retrieved context");
        let prompt = rag_prompt(&question, &format_context(&sources));
        let answer = self
            .chat
            .complete(ChatRequest {
                messages: vec![ChatMessage::user(prompt)],
                max_tokens: None,
                temperature: 0.0,
                top_p: None,
            })
            .await?;

        self.metrics.record_question();
        Ok(AskOutcome {
            answer: answer.trim().to_string(),
            sources,
        })
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn vector_index(&self) -> Result<&Arc<dyn VectorIndex>, ProcessingError> {
        self.index
            .as_ref()
            .ok_or(ProcessingError::NotConfigured("Vector search"))
    }

    async fn ensure_index(&self, index: &dyn VectorIndex) -> Result<(), ProcessingError> {
        let dimension = self.settings.embedding_dimension;
        self.index_ready
            .get_or_try_init(|| async move {
                index.ensure_index(dimension).await?;
                tracing::debug!(dimension, "Vector index ensured");
                Ok::<(), ProcessingError>(())
            })
            .await?;
        Ok(())
    }

    fn check_dimension(&self, actual: usize) -> Result<(), ProcessingError> {
        let expected = self.settings.embedding_dimension;
        if actual != expected {
            return Err(ProcessingError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }
}

fn classify(file_name: &str) -> Result<FileKind, ProcessingError> {
    FileKind::from_file_name(file_name).ok_or_else(|| {
        tracing::warn!(file_name, "Unsupported file type");
        ProcessingError::UnsupportedFileType {
            file_name: file_name.to_string(),
        }
    })
}

fn parse_office(kind: FileKind, bytes: &[u8]) -> Result<String, ProcessingError> {
    match extract_office(kind, bytes) {
        Some(result) => Ok(result?),
        None => Err(ProcessingError::InvalidInput(format!(
            "{kind} documents cannot be parsed locally"
        ))),
    }
}

#[async_trait]
impl ProcessingApi for ProcessingService {
    async fn extract(&self, request: ExtractRequest) -> Result<ExtractOutcome, ProcessingError> {
        ProcessingService::extract(self, request).await
    }

    async fn index_document(
        &self,
        request: IndexRequest,
    ) -> Result<IndexOutcome, ProcessingError> {
        ProcessingService::index_document(self, request).await
    }

    async fn ask(&self, request: AskRequest) -> Result<AskOutcome, ProcessingError> {
        ProcessingService::ask(self, request).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        ProcessingService::metrics_snapshot(self)
    }
}

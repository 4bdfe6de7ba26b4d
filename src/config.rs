use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_OPENAI_API_VERSION: &str = "2023-05-15";
const DEFAULT_CHAT_DEPLOYMENT: &str = "gpt-35-turbo";
const DEFAULT_EMBEDDING_DEPLOYMENT: &str = "text-embedding-ada-002";
const DEFAULT_SEARCH_INDEX: &str = "idx-rag-dev";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_RETRIEVAL_TOP_K: usize = 3;
const DEFAULT_LOCAL_STORAGE_PATH: &str = "./blobs";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Docsift server.
///
/// Loaded once per process and never mutated; each component receives the slice it needs at
/// construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where source documents are downloaded from.
    pub storage: StorageSettings,
    /// Computer Vision OCR endpoint and key.
    pub vision: ServiceCredentials,
    /// Document Intelligence endpoint and key.
    pub document_intelligence: ServiceCredentials,
    /// Azure OpenAI chat and embedding deployments.
    pub openai: OpenAiSettings,
    /// Vector store settings; `None` disables indexing and question answering.
    pub search: Option<SearchSettings>,
    /// Whether extracted text is sent through the correction model by default.
    pub correction_enabled: bool,
    /// Optional token budget for splitting oversized markdown sections.
    pub text_splitter_chunk_size: Option<usize>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Blob storage backend selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageProvider {
    /// Azure Blob Storage addressed through a connection string.
    Azure,
    /// Files under a local directory.
    Local,
}

/// Settings for the blob store that holds input documents.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Backend used to fetch blobs.
    pub provider: StorageProvider,
    /// Azure storage connection string (required for [`StorageProvider::Azure`]).
    pub connection_string: Option<String>,
    /// Container holding the documents (required for [`StorageProvider::Azure`]).
    pub container: Option<String>,
    /// Root directory for [`StorageProvider::Local`].
    pub local_path: PathBuf,
}

/// Endpoint plus subscription key for a Cognitive Services resource.
#[derive(Debug, Clone)]
pub struct ServiceCredentials {
    /// Resource endpoint, e.g. `https://myresource.cognitiveservices.azure.com`.
    pub endpoint: String,
    /// Subscription key sent as `Ocp-Apim-Subscription-Key`.
    pub api_key: String,
}

/// Azure OpenAI resource settings.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    /// Resource endpoint.
    pub endpoint: String,
    /// Key sent in the `api-key` header.
    pub api_key: String,
    /// REST API version query parameter.
    pub api_version: String,
    /// Chat completion deployment name.
    pub chat_deployment: String,
    /// Embedding deployment name.
    pub embedding_deployment: String,
}

/// Azure AI Search settings for the retrieval pipeline.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Search service endpoint.
    pub endpoint: String,
    /// Admin key sent in the `api-key` header.
    pub admin_key: String,
    /// Index that stores document chunks.
    pub index_name: String,
    /// Dimensionality of the embedding vectors.
    pub embedding_dimension: usize,
    /// Default number of chunks retrieved per question.
    pub top_k: usize,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            storage: StorageSettings::from_env()?,
            vision: ServiceCredentials {
                endpoint: load_env("COMPUTER_VISION_ENDPOINT")?,
                api_key: load_env("COMPUTER_VISION_API_KEY")
                    .or_else(|_| load_env("COMPUTER_VISION_SUBSCRIPTION_KEY"))
                    .map_err(|_| {
                        ConfigError::MissingVariable("COMPUTER_VISION_API_KEY".to_string())
                    })?,
            },
            document_intelligence: ServiceCredentials {
                endpoint: load_env("DOCUMENT_INTELLIGENCE_ENDPOINT")?,
                api_key: load_env("DOCUMENT_INTELLIGENCE_API_KEY")?,
            },
            openai: OpenAiSettings {
                endpoint: load_env("AZURE_OPENAI_ENDPOINT")?,
                api_key: load_env("AZURE_OPENAI_API_KEY")?,
                api_version: load_env_optional("AZURE_OPENAI_API_VERSION")
                    .unwrap_or_else(|| DEFAULT_OPENAI_API_VERSION.to_string()),
                chat_deployment: load_env_optional("AZURE_OPENAI_CHAT_DEPLOYMENT")
                    .unwrap_or_else(|| DEFAULT_CHAT_DEPLOYMENT.to_string()),
                embedding_deployment: load_env_optional("AZURE_OPENAI_EMBEDDING_DEPLOYMENT")
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_DEPLOYMENT.to_string()),
            },
            search: SearchSettings::from_env()?,
            correction_enabled: parse_optional::<bool>("CORRECTION_ENABLED")?.unwrap_or(true),
            text_splitter_chunk_size: parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?,
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

impl StorageSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let provider = match load_env_optional("STORAGE_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("STORAGE_PROVIDER".to_string()))?,
            None => StorageProvider::Azure,
        };
        let connection_string = load_env_optional("AZURE_STORAGE_CONNECTION_STRING");
        let container = load_env_optional("BLOB_CONTAINER");

        if provider == StorageProvider::Azure {
            if connection_string.is_none() {
                return Err(ConfigError::MissingVariable(
                    "AZURE_STORAGE_CONNECTION_STRING".to_string(),
                ));
            }
            if container.is_none() {
                return Err(ConfigError::MissingVariable("BLOB_CONTAINER".to_string()));
            }
        }

        Ok(Self {
            provider,
            connection_string,
            container,
            local_path: load_env_optional("LOCAL_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_STORAGE_PATH)),
        })
    }
}

impl SearchSettings {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let (Some(endpoint), Some(admin_key)) = (
            load_env_optional("AZURE_SEARCH_ENDPOINT"),
            load_env_optional("AZURE_SEARCH_ADMIN_KEY"),
        ) else {
            return Ok(None);
        };

        Ok(Some(Self {
            endpoint,
            admin_key,
            index_name: load_env_optional("AZURE_SEARCH_INDEX")
                .unwrap_or_else(|| DEFAULT_SEARCH_INDEX.to_string()),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSION),
            top_k: parse_optional("RETRIEVAL_TOP_K")?.unwrap_or(DEFAULT_RETRIEVAL_TOP_K),
        }))
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for StorageProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "local" => Ok(Self::Local),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> &'static Config {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        storage = ?config.storage.provider,
        container = ?config.storage.container,
        search_enabled = config.search.is_some(),
        correction_enabled = config.correction_enabled,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.get_or_init(|| config)
}

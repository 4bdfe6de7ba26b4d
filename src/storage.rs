//! Blob storage access for source documents.
//!
//! Documents are addressed by blob name inside a single container. Azure Blob Storage is the
//! production backend; a local directory backend exists for development and tests. Both are thin
//! wrappers over `object_store`.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as StorePath;
use object_store::ObjectStore;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StorageProvider, StorageSettings};

/// Errors raised while resolving or downloading blobs.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested blob does not exist in the container.
    #[error("Blob not found: {0}")]
    NotFound(String),
    /// The store rejected the download or was unreachable.
    #[error("Failed to download blob '{name}': {message}")]
    DownloadFailed {
        /// Blob that was requested.
        name: String,
        /// Backend diagnostic.
        message: String,
    },
    /// Connection settings could not be turned into a store.
    #[error("Invalid storage configuration: {0}")]
    InvalidConfiguration(String),
}

/// Read-only access to the container holding input documents.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download the full contents of a blob.
    async fn fetch(&self, name: &str) -> Result<Bytes, StorageError>;
}

/// Blob store backed by any `object_store` implementation.
pub struct ObjectBlobStore {
    inner: Arc<dyn ObjectStore>,
    label: &'static str,
}

impl ObjectBlobStore {
    /// Connect to an Azure container using a storage connection string.
    pub fn azure(connection_string: &str, container: &str) -> Result<Self, StorageError> {
        let parts = ConnectionString::parse(connection_string)?;
        let mut builder = MicrosoftAzureBuilder::new().with_container_name(container);
        if parts.use_emulator {
            builder = builder.with_use_emulator(true);
        } else {
            builder = builder
                .with_account(parts.account_name.as_deref().unwrap_or_default())
                .with_access_key(parts.account_key.as_deref().unwrap_or_default());
        }
        let store = builder
            .build()
            .map_err(|error| StorageError::InvalidConfiguration(error.to_string()))?;
        tracing::debug!(container, emulator = parts.use_emulator, "Initialized Azure blob store");
        Ok(Self {
            inner: Arc::new(store),
            label: "azure",
        })
    }

    /// Serve blobs from files below `root`, creating the directory if needed.
    pub fn local(root: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&root)
            .map_err(|error| StorageError::InvalidConfiguration(error.to_string()))?;
        let store = LocalFileSystem::new_with_prefix(&root)
            .map_err(|error| StorageError::InvalidConfiguration(error.to_string()))?;
        tracing::debug!(root = %root.display(), "Initialized local blob store");
        Ok(Self {
            inner: Arc::new(store),
            label: "local",
        })
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    #[tracing::instrument(skip(self), fields(backend = self.label))]
    async fn fetch(&self, name: &str) -> Result<Bytes, StorageError> {
        let path = StorePath::from(name);
        let result = self.inner.get(&path).await.map_err(|error| match error {
            object_store::Error::NotFound { .. } => StorageError::NotFound(name.to_string()),
            other => StorageError::DownloadFailed {
                name: name.to_string(),
                message: other.to_string(),
            },
        })?;
        let bytes = result
            .bytes()
            .await
            .map_err(|error| StorageError::DownloadFailed {
                name: name.to_string(),
                message: error.to_string(),
            })?;
        tracing::debug!(size = bytes.len(), "Blob downloaded");
        Ok(bytes)
    }
}

/// Build the blob store selected by configuration.
pub fn build_blob_store(settings: &StorageSettings) -> Result<Arc<dyn BlobStore>, StorageError> {
    match settings.provider {
        StorageProvider::Local => Ok(Arc::new(ObjectBlobStore::local(
            settings.local_path.clone(),
        )?)),
        StorageProvider::Azure => {
            let connection_string = settings.connection_string.as_deref().ok_or_else(|| {
                StorageError::InvalidConfiguration("connection string required".into())
            })?;
            let container = settings.container.as_deref().ok_or_else(|| {
                StorageError::InvalidConfiguration("container name required".into())
            })?;
            Ok(Arc::new(ObjectBlobStore::azure(connection_string, container)?))
        }
    }
}

/// Relevant fields of an Azure storage connection string.
#[derive(Debug, Default, PartialEq, Eq)]
struct ConnectionString {
    account_name: Option<String>,
    account_key: Option<String>,
    use_emulator: bool,
}

impl ConnectionString {
    fn parse(raw: &str) -> Result<Self, StorageError> {
        let mut parsed = Self::default();
        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            // Account keys are base64 and may end in '=' padding.
            let Some((key, value)) = segment.split_once('=') else {
                return Err(StorageError::InvalidConfiguration(format!(
                    "malformed connection string segment '{segment}'"
                )));
            };
            match key {
                "AccountName" => parsed.account_name = Some(value.to_string()),
                "AccountKey" => parsed.account_key = Some(value.to_string()),
                "UseDevelopmentStorage" => {
                    parsed.use_emulator = value.eq_ignore_ascii_case("true");
                }
                _ => {}
            }
        }

        if !parsed.use_emulator && (parsed.account_name.is_none() || parsed.account_key.is_none())
        {
            return Err(StorageError::InvalidConfiguration(
                "connection string must contain AccountName and AccountKey".into(),
            ));
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_account_credentials_with_padding() {
        let parsed = ConnectionString::parse(
            "DefaultEndpointsProtocol=https;AccountName=docs;AccountKey=c2VjcmV0==;EndpointSuffix=core.windows.net",
        )
        .expect("valid connection string");
        assert_eq!(parsed.account_name.as_deref(), Some("docs"));
        assert_eq!(parsed.account_key.as_deref(), Some("c2VjcmV0=="));
        assert!(!parsed.use_emulator);
    }

    #[test]
    fn recognizes_development_storage() {
        let parsed =
            ConnectionString::parse("UseDevelopmentStorage=true").expect("emulator string");
        assert!(parsed.use_emulator);
    }

    #[test]
    fn rejects_connection_string_without_key() {
        let error = ConnectionString::parse("AccountName=docs").expect_err("missing key");
        assert!(matches!(error, StorageError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn local_store_distinguishes_missing_blobs() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("scan.png"), b"png-bytes").expect("write fixture");
        let store = ObjectBlobStore::local(dir.path().to_path_buf()).expect("local store");

        let bytes = store.fetch("scan.png").await.expect("existing blob");
        assert_eq!(&bytes[..], b"png-bytes");

        let error = store.fetch("absent.pdf").await.expect_err("missing blob");
        assert!(matches!(error, StorageError::NotFound(name) if name == "absent.pdf"));
    }
}

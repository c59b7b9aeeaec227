//! Azure Blob Storage backend using object_store.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::azure::MicrosoftAzureBuilder;
use tracing::debug;

use super::object::ObjectBackend;
use crate::{
    AzureSettings,
    BlobError,
    BlobMetadata,
    BlobReader,
    BlobResult,
    BlobStore,
    BlobStream,
    EnumerationResult,
};

/// Azure Blob Storage backend.
///
/// The container is fixed when the client is built, so every key is a blob
/// name inside that container. Streaming writes always know their length up
/// front: small ones are sent as a single block with an explicit length,
/// large ones as a block list committed only after every block arrived.
pub struct AzureBlobStore {
    backend: ObjectBackend,
    container: String,
}

impl AzureBlobStore {
    pub fn new(settings: &AzureSettings) -> BlobResult<Self> {
        settings.validate()?;

        let endpoint = settings.endpoint.trim_end_matches('/').to_string();
        let client = MicrosoftAzureBuilder::new()
            .with_account(&settings.account_name)
            .with_access_key(&settings.access_key)
            .with_container_name(&settings.container)
            .with_allow_http(endpoint.starts_with("http://"))
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| BlobError::NetworkError {
                source: anyhow::Error::from(e),
            })?;

        debug!(
            account = %settings.account_name,
            container = %settings.container,
            "Created Azure blob store"
        );

        Ok(Self {
            backend: ObjectBackend::new(Arc::new(client), settings.page_size, "azure"),
            container: settings.container.clone(),
        })
    }

    pub fn container(&self) -> &str {
        &self.container
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn write(&self, key: &str, content_type: Option<&str>, data: Bytes) -> BlobResult<()> {
        self.backend.write(key, content_type, data).await
    }

    async fn write_stream(
        &self,
        key: &str,
        content_type: Option<&str>,
        content_length: u64,
        reader: BlobReader,
    ) -> BlobResult<()> {
        self.backend
            .write_stream(key, content_type, content_length, reader)
            .await
    }

    async fn get(&self, key: &str) -> BlobResult<Option<Bytes>> {
        self.backend.get(key).await
    }

    async fn get_stream(&self, key: &str) -> BlobResult<Option<BlobStream>> {
        self.backend.get_stream(key).await
    }

    async fn delete(&self, key: &str) -> BlobResult<bool> {
        self.backend.delete(key).await
    }

    async fn exists(&self, key: &str) -> BlobResult<bool> {
        self.backend.exists(key).await
    }

    async fn get_metadata(&self, key: &str) -> BlobResult<Option<BlobMetadata>> {
        self.backend.get_metadata(key).await
    }

    async fn enumerate(&self, continuation_token: Option<&str>) -> BlobResult<EnumerationResult> {
        self.backend.enumerate(continuation_token).await
    }
}

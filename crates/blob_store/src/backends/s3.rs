//! S3 blob store backend using object_store.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use tracing::debug;

use super::object::ObjectBackend;
use crate::{
    AwsSettings,
    BlobError,
    BlobMetadata,
    BlobReader,
    BlobResult,
    BlobStore,
    BlobStream,
    EnumerationResult,
};

/// S3 blob store backend.
///
/// Keys map to object names inside the configured bucket. S3 reports a
/// successful delete whether or not the object existed, so `delete` is
/// always `true` here unless the request itself fails.
pub struct S3BlobStore {
    backend: ObjectBackend,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(settings: &AwsSettings) -> BlobResult<Self> {
        settings.validate()?;

        let mut builder = AmazonS3Builder::new()
            .with_access_key_id(&settings.access_key)
            .with_secret_access_key(&settings.secret_key)
            .with_region(settings.region_name())
            .with_bucket_name(&settings.bucket);

        // For supporting localstack/minio
        if let Some(endpoint) = &settings.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let client = builder.build().map_err(|e| BlobError::NetworkError {
            source: anyhow::Error::from(e),
        })?;

        debug!(
            bucket = %settings.bucket,
            region = %settings.region_name(),
            "Created S3 blob store"
        );

        Ok(Self {
            backend: ObjectBackend::new(Arc::new(client), settings.page_size, "s3"),
            bucket: settings.bucket.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_from_settings() {
        let settings = AwsSettings::new("test", "test", "USWest1", "test-bucket")
            .unwrap()
            .with_endpoint("http://localhost:4566");
        let store = S3BlobStore::new(&settings).unwrap();
        assert_eq!(store.bucket(), "test-bucket");
    }

    #[test]
    fn test_rejects_incomplete_settings() {
        let mut settings = AwsSettings::new("test", "test", "USWest1", "test-bucket").unwrap();
        settings.bucket.clear();
        assert!(matches!(
            S3BlobStore::new(&settings),
            Err(BlobError::InvalidSettings { .. })
        ));
    }
}

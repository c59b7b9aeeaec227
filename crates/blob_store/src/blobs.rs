//! The `Blobs` facade: one entry point bound to exactly one backend.

use std::future::Future;

use bytes::Bytes;
use opentelemetry::metrics::Meter;
use tokio::io::AsyncRead;
use tracing::debug;

#[cfg(feature = "azure")]
use crate::backends::azure::AzureBlobStore;
#[cfg(feature = "aws")]
use crate::backends::s3::S3BlobStore;
#[cfg(not(all(feature = "aws", feature = "azure")))]
use crate::BlobError;
use crate::{
    BlobMetadata,
    BlobMetrics,
    BlobResult,
    BlobStore,
    BlobStream,
    EnumerationResult,
    StorageSettings,
    StorageType,
    Timer,
    backends::{disk::DiskBlobStore, kvpbase::KvpBlobStore},
};

/// The adapter selected from the settings variant.
enum Backend {
    #[cfg(feature = "aws")]
    ObjectStore(S3BlobStore),
    #[cfg(feature = "azure")]
    Container(AzureBlobStore),
    Disk(DiskBlobStore),
    Kvp(KvpBlobStore),
}

impl Backend {
    fn new(settings: &StorageSettings) -> BlobResult<Self> {
        match settings {
            #[cfg(feature = "aws")]
            StorageSettings::Aws(s) => Ok(Backend::ObjectStore(S3BlobStore::new(s)?)),
            #[cfg(not(feature = "aws"))]
            StorageSettings::Aws(_) => Err(BlobError::UnsupportedBackend {
                kind: "aws (feature not enabled)".to_string(),
            }),
            #[cfg(feature = "azure")]
            StorageSettings::Azure(s) => Ok(Backend::Container(AzureBlobStore::new(s)?)),
            #[cfg(not(feature = "azure"))]
            StorageSettings::Azure(_) => Err(BlobError::UnsupportedBackend {
                kind: "azure (feature not enabled)".to_string(),
            }),
            StorageSettings::Disk(s) => Ok(Backend::Disk(DiskBlobStore::new(s)?)),
            StorageSettings::Kvpbase(s) => Ok(Backend::Kvp(KvpBlobStore::new(s)?)),
        }
    }

    fn store(&self) -> &dyn BlobStore {
        match self {
            #[cfg(feature = "aws")]
            Backend::ObjectStore(store) => store,
            #[cfg(feature = "azure")]
            Backend::Container(store) => store,
            Backend::Disk(store) => store,
            Backend::Kvp(store) => store,
        }
    }
}

/// Uniform blob client.
///
/// Built from exactly one [`StorageSettings`] variant; every call is forwarded
/// to the matching adapter. Holds no mutable state, so a single instance can
/// serve concurrent callers.
pub struct Blobs {
    backend: Backend,
    storage_type: StorageType,
    metrics: Option<BlobMetrics>,
}

impl Blobs {
    pub fn new(settings: impl Into<StorageSettings>) -> BlobResult<Self> {
        let settings = settings.into();
        settings.validate()?;
        let storage_type = settings.storage_type();
        let backend = Backend::new(&settings)?;
        debug!(storage_type = %storage_type, "Initialized blob client");
        Ok(Self {
            backend,
            storage_type,
            metrics: None,
        })
    }

    /// Same as [`Blobs::new`], recording operation latency and errors on
    /// `meter`.
    pub fn new_with_metrics(settings: impl Into<StorageSettings>, meter: &Meter) -> BlobResult<Self> {
        let mut blobs = Self::new(settings)?;
        blobs.metrics = Some(BlobMetrics::new(meter));
        Ok(blobs)
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    /// Times `fut` and counts its failure. `written` is the payload size
    /// credited on success.
    async fn instrument<T, F>(&self, op: &'static str, written: Option<u64>, fut: F) -> BlobResult<T>
    where
        F: Future<Output = BlobResult<T>>,
    {
        let Some(metrics) = &self.metrics else {
            return fut.await;
        };
        let labels = BlobMetrics::labels(op, self.storage_type.as_str());
        let _timer = Timer::start_with_labels(&metrics.operations, &labels);
        let result = fut.await;
        match &result {
            Ok(_) => {
                if let Some(bytes) = written {
                    metrics.record_written(&labels, bytes);
                }
            }
            Err(err) => {
                debug!(op, error = %err, "blob operation failed");
                metrics.record_error(&labels, err);
            }
        }
        result
    }

    /// Write `data` under `key`, replacing whatever was there.
    pub async fn write(
        &self,
        key: &str,
        content_type: Option<&str>,
        data: impl Into<Bytes>,
    ) -> BlobResult<()> {
        let data = data.into();
        let written = Some(data.len() as u64);
        self.instrument(
            "write",
            written,
            self.backend.store().write(key, content_type, data),
        )
        .await
    }

    /// Write exactly `content_length` bytes from `reader` under `key`.
    pub async fn write_stream(
        &self,
        key: &str,
        content_type: Option<&str>,
        content_length: u64,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> BlobResult<()> {
        self.instrument(
            "write_stream",
            Some(content_length),
            self.backend
                .store()
                .write_stream(key, content_type, content_length, Box::new(reader)),
        )
        .await
    }

    /// Get entire blob data.
    pub async fn get(&self, key: &str) -> BlobResult<Option<Bytes>> {
        self.instrument("get", None, self.backend.store().get(key)).await
    }

    /// Open a blob for streaming. The caller drains the returned stream.
    pub async fn get_stream(&self, key: &str) -> BlobResult<Option<BlobStream>> {
        self.instrument("get_stream", None, self.backend.store().get_stream(key))
            .await
    }

    pub async fn delete(&self, key: &str) -> BlobResult<bool> {
        self.instrument("delete", None, self.backend.store().delete(key))
            .await
    }

    pub async fn exists(&self, key: &str) -> BlobResult<bool> {
        self.instrument("exists", None, self.backend.store().exists(key))
            .await
    }

    pub async fn get_metadata(&self, key: &str) -> BlobResult<Option<BlobMetadata>> {
        self.instrument("get_metadata", None, self.backend.store().get_metadata(key))
            .await
    }

    pub async fn enumerate(&self, continuation_token: Option<&str>) -> BlobResult<EnumerationResult> {
        self.instrument(
            "enumerate",
            None,
            self.backend.store().enumerate(continuation_token),
        )
        .await
    }
}

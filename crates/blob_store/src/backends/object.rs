//! Operation contract on top of an `object_store` client.
//!
//! S3 and Azure differ in how the client is built and scoped; once built,
//! both speak the same `ObjectStore` API and share this implementation.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt, stream::FuturesUnordered};
use object_store::{
    Attribute,
    AttributeValue,
    Attributes,
    GetOptions,
    MultipartUpload,
    ObjectMeta,
    ObjectStore,
    PutMultipartOptions,
    PutOptions,
    PutPayload,
    UploadPart,
    path::Path as ObjectPath,
};
use tracing::{debug, warn};

use crate::{
    BlobError,
    BlobMetadata,
    BlobReader,
    BlobResult,
    BlobStream,
    EnumerationResult,
    streaming::{read_chunks, read_exact_bytes},
    traits::{non_empty_token, validate_key},
};

/// Streaming writes up to this size go out as a single request carrying the
/// exact length; larger ones use multipart / block upload.
pub const SINGLE_PUT_LIMIT: u64 = 8 * 1024 * 1024;

/// Size of every multipart part but the last.
const PART_SIZE: usize = 8 * 1024 * 1024;

/// Parts uploaded concurrently by a multipart write.
const MULTIPART_CONCURRENCY: usize = 4;

pub(crate) struct ObjectBackend {
    store: Arc<dyn ObjectStore>,
    page_size: usize,
    name: &'static str,
}

impl ObjectBackend {
    pub(crate) fn new(store: Arc<dyn ObjectStore>, page_size: usize, name: &'static str) -> Self {
        Self {
            store,
            page_size,
            name,
        }
    }

    fn key_to_path(key: &str) -> BlobResult<ObjectPath> {
        validate_key(key)?;
        ObjectPath::parse(key).map_err(|e| BlobError::InvalidKey {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn attributes(content_type: Option<&str>) -> Attributes {
        let mut attributes = Attributes::new();
        if let Some(content_type) = content_type {
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(content_type.to_string()),
            );
        }
        attributes
    }

    fn metadata(meta: ObjectMeta, content_type: Option<String>) -> BlobMetadata {
        BlobMetadata {
            key: meta.location.to_string(),
            content_length: meta.size,
            content_type,
            created: meta.last_modified,
            etag: meta.e_tag,
        }
    }

    fn encode_token(key: &str) -> String {
        URL_SAFE_NO_PAD.encode(key)
    }

    fn decode_token(token: &str) -> BlobResult<ObjectPath> {
        let invalid = || BlobError::InvalidContinuationToken {
            token: token.to_string(),
        };
        let raw = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
        let key = String::from_utf8(raw).map_err(|_| invalid())?;
        ObjectPath::parse(key).map_err(|_| invalid())
    }

    pub(crate) async fn write(
        &self,
        key: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> BlobResult<()> {
        let path = Self::key_to_path(key)?;
        let options = PutOptions {
            attributes: Self::attributes(content_type),
            ..Default::default()
        };
        debug!(backend = self.name, key, size = data.len(), "writing blob");
        self.store
            .put_opts(&path, PutPayload::from(data), options)
            .await?;
        Ok(())
    }

    pub(crate) async fn write_stream(
        &self,
        key: &str,
        content_type: Option<&str>,
        content_length: u64,
        reader: BlobReader,
    ) -> BlobResult<()> {
        if content_length <= SINGLE_PUT_LIMIT {
            let data = read_exact_bytes(reader, content_length).await?;
            return self.write(key, content_type, data).await;
        }

        let path = Self::key_to_path(key)?;
        let options = PutMultipartOptions {
            attributes: Self::attributes(content_type),
            ..Default::default()
        };
        debug!(backend = self.name, key, content_length, "starting multipart write");
        let upload = self.store.put_multipart_opts(&path, options).await?;
        upload_multipart(upload, reader, content_length, key).await
    }

    pub(crate) async fn get(&self, key: &str) -> BlobResult<Option<Bytes>> {
        let path = Self::key_to_path(key)?;
        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let bytes = result.bytes().await.map_err(|e| BlobError::NetworkError {
            source: anyhow::Error::from(e),
        })?;
        Ok(Some(bytes))
    }

    pub(crate) async fn get_stream(&self, key: &str) -> BlobResult<Option<BlobStream>> {
        let path = Self::key_to_path(key)?;
        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let content_length = result.meta.size;
        Ok(Some(BlobStream::from_stream(
            content_length,
            result.into_stream(),
        )))
    }

    pub(crate) async fn delete(&self, key: &str) -> BlobResult<bool> {
        let path = Self::key_to_path(key)?;
        match self.store.delete(&path).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn exists(&self, key: &str) -> BlobResult<bool> {
        let path = Self::key_to_path(key)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn get_metadata(&self, key: &str) -> BlobResult<Option<BlobMetadata>> {
        let path = Self::key_to_path(key)?;
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let result = match self.store.get_opts(&path, options).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.to_string());
        Ok(Some(Self::metadata(result.meta, content_type)))
    }

    /// Lists in key order starting after the key encoded in the token. One
    /// entry past the page is fetched to learn whether another page exists.
    pub(crate) async fn enumerate(
        &self,
        continuation_token: Option<&str>,
    ) -> BlobResult<EnumerationResult> {
        let listing = match non_empty_token(continuation_token) {
            Some(token) => {
                let offset = Self::decode_token(token)?;
                self.store.list_with_offset(None, &offset)
            }
            None => self.store.list(None),
        };

        let mut entries: Vec<ObjectMeta> = listing
            .take(self.page_size + 1)
            .try_collect()
            .await?;

        let next_token = if entries.len() > self.page_size {
            entries.truncate(self.page_size);
            entries
                .last()
                .map(|meta| Self::encode_token(meta.location.as_ref()))
        } else {
            None
        };

        debug!(
            backend = self.name,
            count = entries.len(),
            more = next_token.is_some(),
            "enumerated blobs"
        );

        Ok(EnumerationResult {
            next_token,
            blobs: entries
                .into_iter()
                .map(|meta| Self::metadata(meta, None))
                .collect(),
        })
    }
}

/// Uploads exactly `content_length` bytes as parts and completes the upload.
/// Any failure, including the final part or the completion itself, aborts the
/// upload so no parts are left behind.
async fn upload_multipart(
    mut upload: Box<dyn MultipartUpload>,
    reader: BlobReader,
    content_length: u64,
    key: &str,
) -> BlobResult<()> {
    let result = upload_parts(upload.as_mut(), reader, content_length).await;
    if result.is_err() {
        if let Err(e) = upload.abort().await {
            warn!(key, "failed to abort multipart upload: {}", e);
        }
    }
    result
}

async fn upload_parts(
    upload: &mut dyn MultipartUpload,
    reader: BlobReader,
    content_length: u64,
) -> BlobResult<()> {
    let mut chunks = read_chunks(reader, content_length);
    let mut in_flight: FuturesUnordered<UploadPart> = FuturesUnordered::new();
    let mut buffer = BytesMut::with_capacity(PART_SIZE);

    while let Some(chunk) = chunks.next().await {
        buffer.extend_from_slice(&chunk?);
        if buffer.len() < PART_SIZE {
            continue;
        }
        while in_flight.len() >= MULTIPART_CONCURRENCY {
            if let Some(part) = in_flight.next().await {
                part?;
            }
        }
        let part = buffer.split_to(PART_SIZE).freeze();
        in_flight.push(upload.put_part(PutPayload::from(part)));
    }
    if !buffer.is_empty() {
        in_flight.push(upload.put_part(PutPayload::from(buffer.freeze())));
    }
    while let Some(part) = in_flight.next().await {
        part?;
    }

    upload.complete().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeSet,
        io::Cursor,
        sync::Mutex,
    };

    use object_store::{PutResult, memory::InMemory};

    use super::*;

    fn backend(page_size: usize) -> ObjectBackend {
        ObjectBackend::new(Arc::new(InMemory::new()), page_size, "memory")
    }

    #[tokio::test]
    async fn test_write_get_delete() {
        let store = backend(10);
        store
            .write("a.txt", Some("text/plain"), Bytes::from("hello"))
            .await
            .unwrap();

        assert_eq!(store.get("a.txt").await.unwrap(), Some(Bytes::from("hello")));
        assert!(store.exists("a.txt").await.unwrap());

        let md = store.get_metadata("a.txt").await.unwrap().unwrap();
        assert_eq!(md.key, "a.txt");
        assert_eq!(md.content_length, 5);
        assert_eq!(md.content_type.as_deref(), Some("text/plain"));

        assert!(store.delete("a.txt").await.unwrap());
        assert!(!store.exists("a.txt").await.unwrap());
        assert_eq!(store.get("a.txt").await.unwrap(), None);
        assert_eq!(store.get_metadata("a.txt").await.unwrap(), None);
        assert!(store.get_stream("a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_an_error() {
        let store = backend(10);
        assert!(store.delete("never-written").await.is_ok());
    }

    #[tokio::test]
    async fn test_stream_round_trip() {
        let store = backend(10);
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 256) as u8).collect();
        store
            .write_stream(
                "big.bin",
                None,
                data.len() as u64,
                Box::new(Cursor::new(data.clone())),
            )
            .await
            .unwrap();

        let stream = store.get_stream("big.bin").await.unwrap().unwrap();
        assert_eq!(stream.content_length(), data.len() as u64);
        assert_eq!(stream.bytes().await.unwrap(), Bytes::from(data));
    }

    #[tokio::test]
    async fn test_multipart_stream_write() {
        let store = backend(10);
        let len = SINGLE_PUT_LIMIT + 1024;
        let data = vec![7u8; len as usize];
        store
            .write_stream(
                "huge.bin",
                Some("application/octet-stream"),
                len,
                Box::new(Cursor::new(data)),
            )
            .await
            .unwrap();

        let md = store.get_metadata("huge.bin").await.unwrap().unwrap();
        assert_eq!(md.content_length, len);
    }

    #[tokio::test]
    async fn test_short_stream_leaves_nothing_behind() {
        let store = backend(10);
        let err = store
            .write_stream("short.bin", None, 10, Box::new(Cursor::new(b"12345".to_vec())))
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::LengthMismatch { .. }));
        assert!(!store.exists("short.bin").await.unwrap());

        let len = SINGLE_PUT_LIMIT + 10;
        let err = store
            .write_stream(
                "short-multipart.bin",
                None,
                len,
                Box::new(Cursor::new(vec![1u8; (len - 20) as usize])),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::LengthMismatch { .. }));
        assert!(!store.exists("short-multipart.bin").await.unwrap());
    }

    #[derive(Debug, Default)]
    struct UploadLog {
        parts: usize,
        completed: bool,
        aborted: bool,
    }

    /// Multipart upload that records what happened to it and can reject one
    /// part by index.
    #[derive(Debug)]
    struct RecordingUpload {
        log: Arc<Mutex<UploadLog>>,
        fail_part: Option<usize>,
    }

    #[async_trait::async_trait]
    impl MultipartUpload for RecordingUpload {
        fn put_part(&mut self, _data: PutPayload) -> UploadPart {
            let mut log = self.log.lock().unwrap();
            let index = log.parts;
            log.parts += 1;
            let result = if Some(index) == self.fail_part {
                Err(object_store::Error::Generic {
                    store: "recording",
                    source: "part rejected".into(),
                })
            } else {
                Ok(())
            };
            Box::pin(futures::future::ready(result))
        }

        async fn complete(&mut self) -> object_store::Result<PutResult> {
            self.log.lock().unwrap().completed = true;
            Ok(PutResult {
                e_tag: None,
                version: None,
            })
        }

        async fn abort(&mut self) -> object_store::Result<()> {
            self.log.lock().unwrap().aborted = true;
            Ok(())
        }
    }

    async fn run_upload(fail_part: Option<usize>) -> (BlobResult<()>, Arc<Mutex<UploadLog>>) {
        let log = Arc::new(Mutex::new(UploadLog::default()));
        let upload = Box::new(RecordingUpload {
            log: log.clone(),
            fail_part,
        });
        let len = 2 * PART_SIZE + 100;
        let result = upload_multipart(
            upload,
            Box::new(Cursor::new(vec![7u8; len])),
            len as u64,
            "parts.bin",
        )
        .await;
        (result, log)
    }

    #[tokio::test]
    async fn test_multipart_completes_all_parts() {
        let (result, log) = run_upload(None).await;
        result.unwrap();
        let log = log.lock().unwrap();
        assert_eq!(log.parts, 3);
        assert!(log.completed);
        assert!(!log.aborted);
    }

    #[tokio::test]
    async fn test_failed_last_part_aborts_upload() {
        let (result, log) = run_upload(Some(2)).await;
        assert!(matches!(result, Err(BlobError::NetworkError { .. })));
        let log = log.lock().unwrap();
        assert!(log.aborted);
        assert!(!log.completed);
    }

    #[tokio::test]
    async fn test_failed_first_part_aborts_upload() {
        let (result, log) = run_upload(Some(0)).await;
        assert!(result.is_err());
        let log = log.lock().unwrap();
        assert!(log.aborted);
        assert!(!log.completed);
    }

    #[tokio::test]
    async fn test_extra_bytes_are_ignored() {
        let store = backend(10);
        store
            .write_stream("trim.txt", None, 5, Box::new(Cursor::new(b"hello world".to_vec())))
            .await
            .unwrap();
        assert_eq!(store.get("trim.txt").await.unwrap(), Some(Bytes::from("hello")));
    }

    #[tokio::test]
    async fn test_enumerate_pages() {
        let store = backend(4);
        for i in 0..10 {
            store
                .write(&format!("key-{:02}", i), None, Bytes::from("x"))
                .await
                .unwrap();
        }

        let mut seen = BTreeSet::new();
        let mut sizes = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = store.enumerate(token.as_deref()).await.unwrap();
            sizes.push(page.blobs.len());
            for blob in page.blobs {
                assert!(seen.insert(blob.key));
            }
            token = page.next_token;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(seen.len(), 10);
    }

    #[tokio::test]
    async fn test_enumerate_empty_and_bad_token() {
        let store = backend(4);
        let page = store.enumerate(None).await.unwrap();
        assert!(page.blobs.is_empty());
        assert!(page.next_token.is_none());

        let page = store.enumerate(Some("")).await.unwrap();
        assert!(page.blobs.is_empty());

        let err = store.enumerate(Some("not base64!")).await.unwrap_err();
        assert!(matches!(err, BlobError::InvalidContinuationToken { .. }));
    }

    #[tokio::test]
    async fn test_invalid_keys() {
        let store = backend(4);
        assert!(matches!(
            store.get("").await,
            Err(BlobError::InvalidKey { .. })
        ));
        assert!(matches!(
            store.exists("/abs").await,
            Err(BlobError::InvalidKey { .. })
        ));
        assert!(matches!(
            store.write("a/../b", None, Bytes::from("x")).await,
            Err(BlobError::InvalidKey { .. })
        ));
    }
}

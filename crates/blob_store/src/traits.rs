//! Core blob store trait.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{BlobError, BlobMetadata, BlobReader, BlobResult, BlobStream, EnumerationResult};

/// The operation contract every backend adapter implements.
///
/// Keys are relative to the container the adapter was built for. An absent
/// key is never an error here: reads report `None`, probes and deletes report
/// `false`. Errors are reserved for faults (auth, network, I/O, malformed
/// input).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a blob from memory, replacing any existing blob under `key`.
    async fn write(&self, key: &str, content_type: Option<&str>, data: Bytes) -> BlobResult<()>;

    /// Write exactly `content_length` bytes read from `reader`.
    ///
    /// Fails with `BlobError::LengthMismatch` if the reader runs dry first;
    /// nothing is left behind under `key` in that case. Bytes past
    /// `content_length` are never read.
    async fn write_stream(
        &self,
        key: &str,
        content_type: Option<&str>,
        content_length: u64,
        reader: BlobReader,
    ) -> BlobResult<()>;

    /// Get entire blob data.
    async fn get(&self, key: &str) -> BlobResult<Option<Bytes>>;

    /// Open a blob for streaming. The stream's length is the size the
    /// backend reports for the blob.
    async fn get_stream(&self, key: &str) -> BlobResult<Option<BlobStream>>;

    /// Delete a blob. Returns `false` when the backend reports it was not
    /// there.
    async fn delete(&self, key: &str) -> BlobResult<bool>;

    /// Check whether a blob exists without transferring content.
    async fn exists(&self, key: &str) -> BlobResult<bool>;

    /// Get blob metadata without downloading content.
    async fn get_metadata(&self, key: &str) -> BlobResult<Option<BlobMetadata>>;

    /// List one page of blobs. `None` or an empty token starts from the
    /// beginning; tokens are only meaningful to the adapter that issued them.
    async fn enumerate(&self, continuation_token: Option<&str>) -> BlobResult<EnumerationResult>;
}

/// Treats an empty token like no token at all.
pub(crate) fn non_empty_token(continuation_token: Option<&str>) -> Option<&str> {
    continuation_token.filter(|token| !token.trim().is_empty())
}

/// Keys shared by the remote backends: non-empty, relative, and made of
/// `/`-separated segments that are neither empty nor `.` / `..`. URL and
/// object paths normalize those segments away.
pub(crate) fn validate_key(key: &str) -> BlobResult<()> {
    let invalid = |reason: &str| BlobError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    if key.trim().is_empty() {
        return Err(invalid("key must not be empty"));
    }
    if key.starts_with('/') {
        return Err(invalid("key must be relative"));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("key must not contain empty, '.' or '..' segments"));
    }
    Ok(())
}

//! Blob metadata structures.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata about a blob, as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobMetadata {
    /// Key of the blob within its container.
    pub key: String,

    /// Size in bytes.
    pub content_length: u64,

    /// Content type / MIME type. Advisory only, not every backend keeps it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Creation time, or the last-modified time where the backend exposes
    /// nothing better.
    pub created: DateTime<Utc>,

    /// ETag from object store (S3/Azure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl fmt::Display for BlobMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<27}{:<18}{:<30}{}",
            self.key,
            format!("{} bytes", self.content_length),
            self.created.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.content_type.as_deref().unwrap_or("-")
        )
    }
}

/// One page of an enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumerationResult {
    /// Token to pass to the next `enumerate` call. `None` once the listing
    /// is exhausted.
    pub next_token: Option<String>,

    pub blobs: Vec<BlobMetadata>,
}

impl EnumerationResult {
    pub fn has_more(&self) -> bool {
        self.next_token.is_some()
    }
}

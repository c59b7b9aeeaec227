//! Error types for blob store operations.

use std::fmt;

/// Result type for blob store operations.
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob store operations.
///
/// Absent keys are not errors at the facade boundary: adapters translate
/// [`BlobError::NotFound`] into `None` / `false`. Everything else is a fault
/// the caller has to deal with.
#[derive(Debug)]
pub enum BlobError {
    /// Blob not found under the given key.
    NotFound { key: String },

    /// Key cannot be mapped onto the backend (empty, absolute, `..`).
    InvalidKey { key: String, reason: String },

    /// A settings record is missing a required value.
    InvalidSettings { reason: String },

    /// Continuation token was not produced by this backend.
    InvalidContinuationToken { token: String },

    /// A stream ended before delivering its declared length.
    LengthMismatch { expected: u64, actual: u64 },

    /// The remote service answered with a non-success status.
    Rejected { status: u16, reason: String },

    /// I/O error during blob operation.
    IoError { source: std::io::Error },

    /// Network error (S3/Azure/KVP).
    NetworkError { source: anyhow::Error },

    /// Backend not compiled in.
    UnsupportedBackend { kind: String },

    /// Generic error.
    Other { source: anyhow::Error },
}

impl BlobError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound { .. })
    }

    /// Short, stable name of the variant, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            BlobError::NotFound { .. } => "not_found",
            BlobError::InvalidKey { .. } => "invalid_key",
            BlobError::InvalidSettings { .. } => "invalid_settings",
            BlobError::InvalidContinuationToken { .. } => "invalid_token",
            BlobError::LengthMismatch { .. } => "length_mismatch",
            BlobError::Rejected { .. } => "rejected",
            BlobError::IoError { .. } => "io",
            BlobError::NetworkError { .. } => "network",
            BlobError::UnsupportedBackend { .. } => "unsupported_backend",
            BlobError::Other { .. } => "other",
        }
    }
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobError::NotFound { key } => write!(f, "Blob not found: {}", key),
            BlobError::InvalidKey { key, reason } => {
                write!(f, "Invalid key '{}': {}", key, reason)
            }
            BlobError::InvalidSettings { reason } => write!(f, "Invalid settings: {}", reason),
            BlobError::InvalidContinuationToken { token } => {
                write!(f, "Invalid continuation token: {}", token)
            }
            BlobError::LengthMismatch { expected, actual } => write!(
                f,
                "Stream ended after {} of {} declared bytes",
                actual, expected
            ),
            BlobError::Rejected { status, reason } => {
                write!(f, "Request rejected with status {}: {}", status, reason)
            }
            BlobError::IoError { source } => write!(f, "I/O error: {}", source),
            BlobError::NetworkError { source } => write!(f, "Network error: {}", source),
            BlobError::UnsupportedBackend { kind } => {
                write!(f, "Unsupported backend: {}", kind)
            }
            BlobError::Other { source } => write!(f, "Blob store error: {}", source),
        }
    }
}

impl std::error::Error for BlobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlobError::IoError { source } => Some(source),
            BlobError::NetworkError { source } => Some(source.as_ref()),
            BlobError::Other { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BlobError {
    fn from(err: std::io::Error) -> Self {
        BlobError::IoError { source: err }
    }
}

impl From<anyhow::Error> for BlobError {
    fn from(err: anyhow::Error) -> Self {
        BlobError::Other { source: err }
    }
}

impl From<object_store::Error> for BlobError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => BlobError::NotFound { key: path },
            _ => BlobError::NetworkError {
                source: anyhow::Error::from(err),
            },
        }
    }
}

impl From<reqwest::Error> for BlobError {
    fn from(err: reqwest::Error) -> Self {
        // A body stream that came up short is reported by its own error,
        // buried under the transport error.
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            if let Some(BlobError::LengthMismatch { expected, actual }) =
                inner.downcast_ref::<BlobError>()
            {
                return BlobError::LengthMismatch {
                    expected: *expected,
                    actual: *actual,
                };
            }
            source = inner.source();
        }
        BlobError::NetworkError {
            source: anyhow::Error::from(err),
        }
    }
}

impl From<url::ParseError> for BlobError {
    fn from(err: url::ParseError) -> Self {
        BlobError::InvalidSettings {
            reason: err.to_string(),
        }
    }
}

//! Blob store backend implementations.

pub mod disk;
pub mod kvpbase;

#[cfg(any(feature = "aws", feature = "azure"))]
pub(crate) mod object;

#[cfg(feature = "aws")]
pub mod s3;

#[cfg(feature = "azure")]
pub mod azure;

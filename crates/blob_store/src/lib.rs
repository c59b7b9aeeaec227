//! Unified blob storage client.
//!
//! One operation contract (write, read, delete, existence check, metadata,
//! paginated enumeration) over four interchangeable backends:
//!
//! - S3-compatible object storage
//! - Azure blob containers
//! - a directory on the local filesystem
//! - the kvpbase REST key/value service
//!
//! # Architecture
//!
//! Every backend implements the [`BlobStore`] trait. The [`Blobs`] facade is
//! built from exactly one [`StorageSettings`] variant and forwards each call
//! to the matching adapter. Absent keys are reported as `None` / `false`;
//! errors are reserved for faults.
//!
//! Large objects move through the helpers in the streaming module: writes
//! consume exactly the declared number of bytes, reads hand back a
//! [`BlobStream`] bounded to the reported length.
//!
//! # Usage
//!
//! ```rust,no_run
//! use blob_store::{Blobs, DiskSettings};
//!
//! # async fn example() -> Result<(), blob_store::BlobError> {
//! let blobs = Blobs::new(DiskSettings::new("./blobs")?)?;
//! blobs.write("a.txt", Some("text/plain"), "hello").await?;
//!
//! let mut token: Option<String> = None;
//! loop {
//!     let page = blobs.enumerate(token.as_deref()).await?;
//!     for md in &page.blobs {
//!         println!("{}", md);
//!     }
//!     token = page.next_token;
//!     if token.is_none() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod backends;
mod blobs;
mod config;
mod error;
mod metadata;
mod metrics;
mod streaming;
mod traits;

#[cfg(test)]
mod testing;

#[cfg(feature = "azure")]
pub use backends::azure::AzureBlobStore;
#[cfg(feature = "aws")]
pub use backends::s3::S3BlobStore;
// Re-export backend types for direct usage
pub use backends::{disk::DiskBlobStore, kvpbase::KvpBlobStore};
pub use blobs::Blobs;
pub use config::{
    AwsSettings,
    AzureSettings,
    DEFAULT_PAGE_SIZE,
    DiskSettings,
    KvpbaseSettings,
    StorageSettings,
    StorageType,
    normalize_region,
};
pub use error::{BlobError, BlobResult};
pub use metadata::{BlobMetadata, EnumerationResult};
pub use metrics::{BlobMetrics, Timer};
pub use streaming::{BlobReader, BlobStream, CHUNK_SIZE, copy_exact, read_chunks, read_exact_bytes};
pub use traits::BlobStore;

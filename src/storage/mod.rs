//! Storage port and built-in adapters.
//!
//! Every adapter exposes the same three operations with the same failure
//! semantics, so the upload pipeline never branches on the backend in use.

use std::{collections::BTreeMap, io, pin::Pin, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::Stream;

use crate::StorageError;

/// Disk-backed storage backend implementation.
pub mod disk;
/// In-memory storage backend implementation.
pub mod memory;
/// Remote object store backend implementation.
#[cfg(feature = "s3")]
pub mod object;

pub use disk::{DiskStorage, DiskStorageBuilder};
pub use memory::MemoryStorage;
#[cfg(feature = "s3")]
pub use object::{ObjectStorage, ObjectStorageBuilder};

/// Boxed stream type handed to storage backends.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Per-file request to persist a byte stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Name to store the file under.
    pub file_name: String,
    /// Free-form metadata forwarded to the backend.
    pub metadata: BTreeMap<String, String>,
    /// Destination bucket or container. Backends may treat empty as default.
    pub bucket: String,
}

impl UploadOptions {
    /// Creates upload options for a file name and bucket.
    pub fn new(file_name: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            metadata: BTreeMap::new(),
            bucket: bucket.into(),
        }
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Result of a successful upload as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMetadata {
    /// Folder, bucket or container the object was written to.
    pub folder_destination: String,
    /// Key that addresses the object within its destination.
    pub key: String,
    /// Number of bytes persisted.
    pub size: u64,
}

/// Request for an access path or URL to a stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathOptions {
    /// Bucket or container holding the object.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Lifetime of a presigned URL. Backends choose a default when unset.
    pub expires_in: Option<Duration>,
    /// Request a signed, time-limited URL instead of a direct one.
    pub secure: bool,
}

impl PathOptions {
    /// Creates path options for a bucket and key.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            ..Self::default()
        }
    }

    /// Requests a presigned URL valid for `expires_in`.
    pub fn secure(mut self, expires_in: Duration) -> Self {
        self.secure = true;
        self.expires_in = Some(expires_in);
        self
    }
}

/// Async persistence contract implemented by every storage backend.
///
/// Implementations are shared across concurrent field workers and requests.
/// An in-flight [`Storage::upload`] future is dropped when its request is
/// cancelled, so adapters must tolerate being stopped at any await point.
#[async_trait::async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Persists the whole stream under `options.file_name`.
    ///
    /// Must consume `body` to completion or fail.
    async fn upload(
        &self,
        body: BoxStream<'_, io::Result<Bytes>>,
        options: UploadOptions,
    ) -> Result<UploadedMetadata, StorageError>;

    /// Returns an access path or URL for a previously uploaded key.
    async fn path(&self, options: PathOptions) -> Result<String, StorageError>;

    /// Releases backend resources. Calling it more than once is harmless.
    async fn close(&self) -> Result<(), StorageError>;
}

#[async_trait::async_trait]
impl<T> Storage for Arc<T>
where
    T: Storage + ?Sized,
{
    async fn upload(
        &self,
        body: BoxStream<'_, io::Result<Bytes>>,
        options: UploadOptions,
    ) -> Result<UploadedMetadata, StorageError> {
        self.as_ref().upload(body, options).await
    }

    async fn path(&self, options: PathOptions) -> Result<String, StorageError> {
        self.as_ref().path(options).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.as_ref().close().await
    }
}

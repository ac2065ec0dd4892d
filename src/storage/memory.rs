use std::{collections::HashMap, io, sync::Arc};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::sync::RwLock;

use super::{BoxStream, PathOptions, Storage, UploadOptions, UploadedMetadata};
use crate::StorageError;

/// Destination reported when an upload names no bucket.
pub const DEFAULT_DESTINATION: &str = "memory";

type ObjectId = (String, String);

/// In-memory storage engine keyed by destination and file name.
///
/// Uploading the same name twice to one destination replaces the payload.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<RwLock<HashMap<ObjectId, Bytes>>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory storage backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns stored bytes for a destination and key.
    pub async fn get(&self, destination: &str, key: &str) -> Option<Bytes> {
        self.files
            .read()
            .await
            .get(&(destination.to_owned(), key.to_owned()))
            .cloned()
    }

    /// Returns the current number of stored objects.
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    /// Returns `true` when no payloads are currently stored.
    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

fn destination_for(bucket: &str) -> String {
    if bucket.trim().is_empty() {
        DEFAULT_DESTINATION.to_owned()
    } else {
        bucket.to_owned()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn upload(
        &self,
        mut body: BoxStream<'_, io::Result<Bytes>>,
        options: UploadOptions,
    ) -> Result<UploadedMetadata, StorageError> {
        if options.file_name.trim().is_empty() {
            return Err(StorageError::MissingFileName);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            file_name = options.file_name.as_str(),
            bucket = options.bucket.as_str(),
            "memory storage: begin streaming store"
        );

        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| StorageError::io("stream read failed", err))?;
            buffer.extend_from_slice(&chunk);
        }
        let payload = buffer.freeze();
        let size = payload.len() as u64;

        let destination = destination_for(&options.bucket);
        self.files
            .write()
            .await
            .insert((destination.clone(), options.file_name.clone()), payload);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            storage_key = options.file_name.as_str(),
            destination = destination.as_str(),
            size = size,
            "memory storage: completed store"
        );

        Ok(UploadedMetadata {
            folder_destination: destination,
            key: options.file_name,
            size,
        })
    }

    async fn path(&self, options: PathOptions) -> Result<String, StorageError> {
        if options.key.trim().is_empty() {
            return Err(StorageError::MissingKey);
        }

        Ok(format!(
            "memory://{}/{}",
            destination_for(&options.bucket),
            options.key
        ))
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

use std::{collections::HashMap, io, time::Duration};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::Method;
use object_store::{
    aws::{AmazonS3, AmazonS3Builder},
    path::Path,
    signer::Signer,
    ObjectStoreExt, PutPayload,
};
use tokio::sync::Mutex;

use super::{BoxStream, PathOptions, Storage, UploadOptions, UploadedMetadata};
use crate::StorageError;

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";
/// Presigned URL lifetime used when [`PathOptions::expires_in`] is unset.
pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(15 * 60);

/// Builder for [`ObjectStorage`].
#[derive(Debug, Clone)]
pub struct ObjectStorageBuilder {
    template: AmazonS3Builder,
    region: String,
    endpoint: Option<String>,
    default_expiry: Duration,
}

impl Default for ObjectStorageBuilder {
    fn default() -> Self {
        Self {
            template: AmazonS3Builder::from_env(),
            region: DEFAULT_REGION.to_owned(),
            endpoint: None,
            default_expiry: DEFAULT_PRESIGN_EXPIRY,
        }
    }
}

impl ObjectStorageBuilder {
    /// Replaces the client template, for explicit credentials or options.
    pub fn template(mut self, template: AmazonS3Builder) -> Self {
        self.template = template;
        self
    }

    /// Sets the region used for clients and direct URLs.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Sets a custom endpoint for S3-compatible providers.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the presigned URL lifetime used when a request names none.
    pub fn default_expiry(mut self, expiry: Duration) -> Self {
        self.default_expiry = expiry;
        self
    }

    /// Builds the storage backend. Clients are created per bucket on first use.
    pub fn build(self) -> Result<ObjectStorage, StorageError> {
        if self.region.trim().is_empty() {
            return Err(StorageError::DestinationUnavailable {
                path: String::new(),
                message: "region cannot be empty".to_owned(),
            });
        }

        let mut template = self.template.with_region(self.region.clone());
        if let Some(endpoint) = &self.endpoint {
            template = template
                .with_endpoint(endpoint.clone())
                .with_allow_http(endpoint.starts_with("http://"));
        }

        Ok(ObjectStorage {
            template,
            region: self.region,
            endpoint: self.endpoint,
            default_expiry: self.default_expiry,
            clients: Mutex::new(HashMap::new()),
        })
    }
}

/// S3-compatible object store backend.
#[derive(Debug)]
pub struct ObjectStorage {
    template: AmazonS3Builder,
    region: String,
    endpoint: Option<String>,
    default_expiry: Duration,
    clients: Mutex<HashMap<String, AmazonS3>>,
}

impl ObjectStorage {
    /// Creates an object storage builder seeded from the environment.
    pub fn builder() -> ObjectStorageBuilder {
        ObjectStorageBuilder::default()
    }

    /// Returns the direct, unsigned URL of an object.
    pub fn direct_url(&self, bucket: &str, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{bucket}/{key}", endpoint.trim_end_matches('/')),
            None => format!("https://{bucket}.s3.{}.amazonaws.com/{key}", self.region),
        }
    }

    async fn client(&self, bucket: &str) -> Result<AmazonS3, StorageError> {
        let bucket = bucket.trim();
        if bucket.is_empty() {
            return Err(StorageError::MissingBucket);
        }

        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(bucket) {
            return Ok(client.clone());
        }

        let client = self
            .template
            .clone()
            .with_bucket_name(bucket)
            .build()
            .map_err(|err| StorageError::DestinationUnavailable {
                path: bucket.to_owned(),
                message: err.to_string(),
            })?;
        clients.insert(bucket.to_owned(), client.clone());
        Ok(client)
    }
}

#[async_trait::async_trait]
impl Storage for ObjectStorage {
    async fn upload(
        &self,
        mut body: BoxStream<'_, io::Result<Bytes>>,
        options: UploadOptions,
    ) -> Result<UploadedMetadata, StorageError> {
        if options.file_name.trim().is_empty() {
            return Err(StorageError::MissingFileName);
        }
        let client = self.client(&options.bucket).await?;

        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| StorageError::io("stream read failed", err))?;
            buffer.extend_from_slice(&chunk);
        }
        let payload = buffer.freeze();
        let size = payload.len() as u64;

        let location = Path::from(options.file_name.as_str());
        client
            .put(&location, PutPayload::from(payload))
            .await
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                tracing::error!(
                    error = %err,
                    bucket = options.bucket.as_str(),
                    key = options.file_name.as_str(),
                    size = size,
                    "object storage: upload failed"
                );
                StorageError::new(err.to_string())
            })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            bucket = options.bucket.as_str(),
            storage_key = options.file_name.as_str(),
            size = size,
            "object storage: completed store"
        );

        Ok(UploadedMetadata {
            folder_destination: options.bucket,
            key: options.file_name,
            size,
        })
    }

    async fn path(&self, options: PathOptions) -> Result<String, StorageError> {
        if options.key.trim().is_empty() {
            return Err(StorageError::MissingKey);
        }
        if options.bucket.trim().is_empty() {
            return Err(StorageError::MissingBucket);
        }

        if !options.secure {
            return Ok(self.direct_url(&options.bucket, &options.key));
        }

        let client = self.client(&options.bucket).await?;
        let location = Path::from(options.key.as_str());
        let expires_in = options.expires_in.unwrap_or(self.default_expiry);
        let url = client
            .signed_url(Method::GET, &location, expires_in)
            .await
            .map_err(|err| StorageError::PathGeneration {
                message: format!("failed to generate presigned URL: {err}"),
            })?;

        Ok(url.to_string())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.clients.lock().await.clear();
        Ok(())
    }
}

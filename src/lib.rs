#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Concurrent multi-field file uploads for `filemux`.
//!
//! A [`FileMux`] reads a `multipart/form-data` request, uploads the files of
//! every requested field concurrently through a [`Storage`] backend, and
//! hands back an [`UploadedFiles`] store only when every field succeeded.

/// Fluent builder API.
pub mod builder;
/// Upload configuration.
pub mod config;
/// Per-request result store.
pub mod context;
/// Error types exposed by this crate.
pub mod error;
/// Uploaded file record.
pub mod file;
/// Parsed multipart form model.
pub mod form;
/// Request body limits.
pub mod limits;
/// Storage name generation.
pub mod naming;
/// Low-level parser components.
pub mod parser;
/// Upload failure rendering.
pub mod responder;
/// Content type sniffing.
pub mod sniff;
/// Storage port and adapters.
pub mod storage;
/// Upload orchestration.
pub mod upload;
/// File validators.
pub mod validator;

/// axum middleware and extractors.
#[cfg(feature = "axum")]
pub mod axum;

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;

pub use builder::FileMuxBuilder;
pub use config::FileMuxConfig;
pub use context::{attach, files_for_field, uploaded_files, UploadedFiles};
pub use error::{
    ConfigError, ContextError, ParseError, StorageError, UploadError, ValidationError,
};
pub use file::UploadedFile;
pub use form::{FilePart, FormValues, MultipartForm, PartReader};
pub use limits::{BodyLimit, Limits};
pub use naming::FilenameStrategy;
pub use responder::{json_error_response, ErrorResponder};
pub use storage::{
    DiskStorage, DiskStorageBuilder, MemoryStorage, PathOptions, Storage, UploadOptions,
    UploadedMetadata,
};
#[cfg(feature = "s3")]
pub use storage::{ObjectStorage, ObjectStorageBuilder};
pub use validator::{AcceptAll, Chain, FileMeta, MaxFileSize, MimeTypeAllowlist, Validator};

pub use upload::UploadRoute;

use upload::Shared;

/// Main `filemux` entry point.
///
/// Cloning is cheap; clones share storage and configuration.
pub struct FileMux<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for FileMux<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> std::fmt::Debug for FileMux<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMux")
            .field("config", &self.shared.config)
            .field("filename", &self.shared.filename)
            .finish_non_exhaustive()
    }
}

impl<S> FileMux<S>
where
    S: Storage,
{
    /// Creates a builder.
    pub fn builder() -> FileMuxBuilder<S> {
        FileMuxBuilder::new()
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &FileMuxConfig {
        &self.shared.config
    }

    /// Returns the storage backend.
    pub fn storage(&self) -> &S {
        &self.shared.storage
    }

    /// Parses a multipart body under the configured limits.
    pub async fn parse_form<B>(&self, content_type: &str, body: B) -> Result<MultipartForm, UploadError>
    where
        B: Stream<Item = Result<Bytes, UploadError>> + Unpin,
    {
        MultipartForm::parse(content_type, body, &self.shared.config.limits).await
    }

    /// Uploads the files of every requested field concurrently.
    ///
    /// Each field runs in its own task and its files are handled in payload
    /// order. The first failure cancels the remaining fields and is returned
    /// once every task has settled; nothing else is returned in that case.
    ///
    /// Field names must be non-empty and unique, otherwise
    /// [`UploadError::InvalidFields`] is returned before any work starts.
    ///
    /// Files stored before the failure stay in the backend. They are not
    /// deleted, and callers needing cleanup must do it themselves.
    pub async fn process<I, T>(
        &self,
        form: &MultipartForm,
        bucket: &str,
        fields: I,
    ) -> Result<UploadedFiles, UploadError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let fields = config::validate_fields(fields)?;
        upload::process(&self.shared, form, bucket, &fields).await
    }

    /// Parses `body` and uploads the requested fields.
    pub async fn upload<I, T, B>(
        &self,
        bucket: &str,
        fields: I,
        content_type: &str,
        body: B,
    ) -> Result<UploadedFiles, UploadError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
        B: Stream<Item = Result<Bytes, UploadError>> + Unpin,
    {
        // The field list is checked before the body is read.
        let fields = config::validate_fields(fields)?;
        let form = self.parse_form(content_type, body).await?;
        upload::process(&self.shared, &form, bucket, &fields).await
    }

    /// Binds a bucket and a field list into a reusable [`UploadRoute`].
    ///
    /// Field names must be non-empty and unique.
    pub fn route<I, T>(&self, bucket: impl Into<String>, fields: I) -> Result<UploadRoute<S>, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let fields = config::validate_fields(fields)?;
        Ok(UploadRoute::new(self.clone(), bucket.into(), fields))
    }

    /// Renders `err` with the configured error responder.
    pub fn respond(&self, err: &UploadError) -> http::Response<Bytes> {
        (self.shared.responder)(err)
    }

    /// Releases resources held by the storage backend.
    pub async fn close(&self) -> Result<(), StorageError> {
        self.shared.storage.close().await
    }
}

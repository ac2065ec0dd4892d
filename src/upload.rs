//! Per-request fan-out: one task per requested field, first error cancels all.

use std::{io, sync::Arc};

use bytes::Bytes;
use tokio::task::JoinSet;
use tokio_util::{io::ReaderStream, sync::CancellationToken};

use crate::{
    config::FileMuxConfig,
    context::UploadedFiles,
    file::UploadedFile,
    form::{FilePart, MultipartForm},
    naming::FilenameStrategy,
    responder::ErrorResponder,
    sniff::detect_content_type,
    storage::{BoxStream, Storage, UploadOptions},
    validator::{FileMeta, Validator},
    FileMux, UploadError,
};

/// Metadata key carrying the detected content type to the backend.
pub const CONTENT_TYPE_METADATA: &str = "content-type";
/// Metadata key carrying the client file name to the backend.
pub const ORIGINAL_NAME_METADATA: &str = "original-name";

/// A [`FileMux`] bound to one bucket and one list of fields.
///
/// Built with [`FileMux::route`]; field names are validated at that point.
pub struct UploadRoute<S> {
    mux: FileMux<S>,
    bucket: Arc<str>,
    fields: Arc<[String]>,
}

impl<S> Clone for UploadRoute<S> {
    fn clone(&self) -> Self {
        Self {
            mux: self.mux.clone(),
            bucket: Arc::clone(&self.bucket),
            fields: Arc::clone(&self.fields),
        }
    }
}

impl<S> std::fmt::Debug for UploadRoute<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRoute")
            .field("bucket", &self.bucket)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl<S> UploadRoute<S>
where
    S: Storage,
{
    pub(crate) fn new(mux: FileMux<S>, bucket: String, fields: Vec<String>) -> Self {
        Self {
            mux,
            bucket: bucket.into(),
            fields: fields.into(),
        }
    }

    /// The pipeline this route runs on.
    pub fn mux(&self) -> &FileMux<S> {
        &self.mux
    }

    /// Destination bucket passed to the storage backend.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Requested field names, in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Parses `body` and uploads the route's fields.
    pub async fn run<B>(&self, content_type: &str, body: B) -> Result<UploadedFiles, UploadError>
    where
        B: futures::Stream<Item = Result<Bytes, UploadError>> + Unpin,
    {
        let form = self.mux.parse_form(content_type, body).await?;
        self.process(&form).await
    }

    /// Uploads the route's fields from an already parsed form.
    pub async fn process(&self, form: &MultipartForm) -> Result<UploadedFiles, UploadError> {
        process(&self.mux.shared, form, &self.bucket, &self.fields).await
    }
}

pub(crate) struct Shared<S> {
    pub(crate) storage: S,
    pub(crate) config: FileMuxConfig,
    pub(crate) validator: Arc<dyn Validator>,
    pub(crate) filename: FilenameStrategy,
    pub(crate) responder: ErrorResponder,
}

pub(crate) async fn process<S>(
    shared: &Arc<Shared<S>>,
    form: &MultipartForm,
    bucket: &str,
    fields: &[String],
) -> Result<UploadedFiles, UploadError>
where
    S: Storage,
{
    let mut results = UploadedFiles::new();
    let mut jobs: Vec<(String, Vec<FilePart>)> = Vec::with_capacity(fields.len());

    // Every field is resolved before any task starts, so a missing field
    // fails the request without a single storage call.
    for field in fields {
        match form.files(field) {
            Some(parts) if !parts.is_empty() => jobs.push((field.clone(), parts.to_vec())),
            _ if shared.config.ignore_missing_fields => {
                #[cfg(feature = "tracing")]
                tracing::debug!(field_name = field.as_str(), "upload: skipping missing field");
                results.insert(field.clone(), Vec::new());
            }
            _ => return Err(UploadError::FieldNotFound { field: field.clone() }),
        }
    }

    let token = CancellationToken::new();
    let mut workers = JoinSet::new();

    #[cfg(feature = "tracing")]
    tracing::debug!(fields = jobs.len(), bucket = bucket, "upload: fan-out");

    for (field, parts) in jobs {
        let shared = Arc::clone(shared);
        let token = token.clone();
        let bucket = bucket.to_owned();
        workers.spawn(async move {
            let outcome = upload_field(&shared, &token, &field, &bucket, parts).await;
            if outcome.is_err() {
                token.cancel();
            }
            (field, outcome)
        });
    }

    let mut first_error: Option<UploadError> = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((field, Ok(files))) => results.insert(field, files),
            Ok((_, Err(UploadError::Cancelled))) => {}
            Ok((_field, Err(err))) => {
                token.cancel();
                if first_error.is_none() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(field_name = _field.as_str(), error = %err, "upload: field failed");
                    first_error = Some(err);
                }
            }
            Err(join_err) => {
                token.cancel();
                if first_error.is_none() {
                    first_error = Some(UploadError::Worker {
                        message: join_err.to_string(),
                    });
                }
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None if token.is_cancelled() => Err(UploadError::Cancelled),
        None => Ok(results),
    }
}

async fn upload_field<S>(
    shared: &Shared<S>,
    token: &CancellationToken,
    field: &str,
    bucket: &str,
    parts: Vec<FilePart>,
) -> Result<Vec<UploadedFile>, UploadError>
where
    S: Storage,
{
    let mut uploaded = Vec::with_capacity(parts.len());
    for part in &parts {
        if token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        uploaded.push(upload_part(shared, token, field, bucket, part).await?);
    }
    Ok(uploaded)
}

async fn upload_part<S>(
    shared: &Shared<S>,
    token: &CancellationToken,
    field: &str,
    bucket: &str,
    part: &FilePart,
) -> Result<UploadedFile, UploadError>
where
    S: Storage,
{
    let mut reader = token
        .run_until_cancelled(part.open())
        .await
        .ok_or(UploadError::Cancelled)?
        .map_err(|source| UploadError::CouldNotOpenFile {
            field: field.to_owned(),
            source,
        })?;

    let uploaded_file_name = shared.filename.generate(part.file_name());

    let mime_type = token
        .run_until_cancelled(detect_content_type(&mut reader))
        .await
        .ok_or(UploadError::Cancelled)?
        .map_err(|source| UploadError::InvalidMimeType {
            field: field.to_owned(),
            source,
        })?;

    let meta = FileMeta {
        field_name: field.to_owned(),
        original_name: part.file_name().to_owned(),
        uploaded_file_name,
        mime_type,
        size: part.size(),
    };

    shared
        .validator
        .validate(&meta)
        .map_err(|source| UploadError::ValidationFailed {
            field: field.to_owned(),
            source,
        })?;

    let options = UploadOptions::new(meta.uploaded_file_name.as_str(), bucket)
        .with_metadata(CONTENT_TYPE_METADATA, meta.mime_type.as_str())
        .with_metadata(ORIGINAL_NAME_METADATA, meta.original_name.as_str());
    let body: BoxStream<'static, io::Result<Bytes>> = Box::pin(ReaderStream::new(reader));

    let stored = token
        .run_until_cancelled(shared.storage.upload(body, options))
        .await
        .ok_or(UploadError::Cancelled)?
        .map_err(|source| UploadError::CouldNotUploadFile {
            field: field.to_owned(),
            source,
        })?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        field_name = field,
        storage_key = stored.key.as_str(),
        mime_type = meta.mime_type.as_str(),
        size = stored.size,
        "upload: stored file"
    );

    Ok(UploadedFile {
        field_name: meta.field_name,
        original_name: meta.original_name,
        uploaded_file_name: meta.uploaded_file_name,
        folder_destination: stored.folder_destination,
        storage_key: stored.key,
        mime_type: meta.mime_type,
        size: stored.size,
    })
}

//! Buffered multipart form: file parts grouped by field plus plain text values.

use std::{
    collections::HashMap,
    io::{self, Cursor, SeekFrom},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWriteExt, ReadBuf};

use crate::{
    limits::{BodyLimit, Limits},
    parser::{extract_multipart_boundary, MultipartStream, ParsedPartHeaders, PartEvent},
    ParseError, UploadError,
};

/// Plain (non-file) form values, in payload order per name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues {
    values: HashMap<String, Vec<String>>,
}

impl FormValues {
    /// Returns the first value submitted under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns every value submitted under `name`.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.values.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Appends a value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Iterates over names and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when no value was submitted.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone)]
enum PartSource {
    Memory(Bytes),
    Disk(Arc<TempPath>),
}

/// One file attached to a form field.
///
/// Small parts are held in memory; parts above
/// [`Limits::max_memory_part_size`] live in a temporary file that is removed
/// when the last clone of the part is dropped.
#[derive(Debug, Clone)]
pub struct FilePart {
    field_name: String,
    file_name: String,
    content_type: mime::Mime,
    size: u64,
    source: PartSource,
}

impl FilePart {
    /// Creates an in-memory part, for hosts that assemble forms themselves.
    pub fn from_bytes(
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: mime::Mime,
        body: impl Into<Bytes>,
    ) -> Self {
        let body = body.into();
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            content_type,
            size: body.len() as u64,
            source: PartSource::Memory(body),
        }
    }

    /// Field the part was submitted under.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// File name supplied by the client.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Content type declared by the client. Not trusted by the pipeline.
    pub fn content_type(&self) -> &mime::Mime {
        &self.content_type
    }

    /// Number of body bytes received for this part.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns `true` when the part was buffered to a temporary file.
    pub fn is_spooled(&self) -> bool {
        matches!(self.source, PartSource::Disk(_))
    }

    /// Opens a fresh, seekable reader positioned at the start of the part.
    pub async fn open(&self) -> io::Result<PartReader> {
        match &self.source {
            PartSource::Memory(bytes) => Ok(PartReader::Memory(Cursor::new(bytes.clone()))),
            PartSource::Disk(path) => {
                let file = tokio::fs::File::open(path.as_ref()).await?;
                Ok(PartReader::File(file))
            }
        }
    }
}

/// Seekable reader over a [`FilePart`].
#[derive(Debug)]
pub enum PartReader {
    /// Part held in memory.
    Memory(Cursor<Bytes>),
    /// Part buffered to a temporary file.
    File(tokio::fs::File),
}

impl AsyncRead for PartReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Memory(cursor) => Pin::new(cursor).poll_read(cx, buf),
            Self::File(file) => Pin::new(file).poll_read(cx, buf),
        }
    }
}

impl AsyncSeek for PartReader {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        match self.get_mut() {
            Self::Memory(cursor) => Pin::new(cursor).start_seek(position),
            Self::File(file) => Pin::new(file).start_seek(position),
        }
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        match self.get_mut() {
            Self::Memory(cursor) => Pin::new(cursor).poll_complete(cx),
            Self::File(file) => Pin::new(file).poll_complete(cx),
        }
    }
}

/// Parsed multipart form.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    files: HashMap<String, Vec<FilePart>>,
    values: FormValues,
}

impl MultipartForm {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a whole `multipart/form-data` body.
    ///
    /// The body is metered against [`Limits::max_body_size`] before it reaches
    /// the parser, so an oversized request fails with
    /// [`UploadError::FileSizeExceeded`] while parsing is still in progress.
    pub async fn parse<S>(content_type: &str, body: S, limits: &Limits) -> Result<Self, UploadError>
    where
        S: Stream<Item = Result<Bytes, UploadError>> + Unpin,
    {
        let boundary = extract_multipart_boundary(content_type)?;
        let body = BodyLimit::new(body, limits.max_body_size);
        let mut events = MultipartStream::new(boundary, body)?;

        let mut form = Self::default();
        let mut current: Option<PartCollector> = None;

        while let Some(event) = events.next().await {
            match event? {
                PartEvent::Headers(headers) => current = Some(PartCollector::new(headers)),
                PartEvent::Chunk(chunk) => {
                    let collector = current
                        .as_mut()
                        .ok_or_else(|| ParseError::new("part body without headers"))?;
                    collector
                        .push(chunk, limits.max_memory_part_size)
                        .await?;
                }
                PartEvent::End => {
                    let collector = current
                        .take()
                        .ok_or_else(|| ParseError::new("part end without headers"))?;
                    collector.finish(&mut form).await?;
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            file_fields = form.files.len(),
            files = form.file_count(),
            values = form.values.len(),
            "form: parsed multipart body"
        );

        Ok(form)
    }

    /// Appends a file part under its field name.
    pub fn push_file(&mut self, part: FilePart) {
        self.files
            .entry(part.field_name.clone())
            .or_default()
            .push(part);
    }

    /// Appends a plain value.
    pub fn push_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name, value);
    }

    /// File parts submitted under `field`, in payload order.
    pub fn files(&self, field: &str) -> Option<&[FilePart]> {
        self.files.get(field).map(Vec::as_slice)
    }

    /// Names of every field that carried at least one file.
    pub fn file_fields(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Total number of file parts.
    pub fn file_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Plain form values.
    pub fn values(&self) -> &FormValues {
        &self.values
    }
}

enum Sink {
    Skip,
    Text(BytesMut),
    Memory(BytesMut),
    Disk {
        path: TempPath,
        file: tokio::fs::File,
    },
}

struct PartCollector {
    field_name: String,
    file_name: Option<String>,
    content_type: mime::Mime,
    size: u64,
    sink: Sink,
}

impl PartCollector {
    fn new(headers: ParsedPartHeaders) -> Self {
        // An empty filename is what browsers send for an untouched file input.
        let file_name = headers.file_name.filter(|name| !name.is_empty());
        let sink = match (&file_name, headers.field_name.is_empty()) {
            // Parts without a form name are ignored.
            (_, true) => Sink::Skip,
            (Some(_), false) => Sink::Memory(BytesMut::new()),
            (None, false) => Sink::Text(BytesMut::new()),
        };

        Self {
            field_name: headers.field_name,
            file_name,
            content_type: headers.content_type,
            size: 0,
            sink,
        }
    }

    async fn push(&mut self, chunk: Bytes, threshold: Option<u64>) -> Result<(), UploadError> {
        self.size = self.size.saturating_add(chunk.len() as u64);

        match &mut self.sink {
            Sink::Skip => {}
            Sink::Text(buffer) => buffer.extend_from_slice(&chunk),
            Sink::Memory(buffer) => {
                buffer.extend_from_slice(&chunk);
                if threshold.is_some_and(|limit| self.size > limit) {
                    let pending = std::mem::take(buffer).freeze();
                    self.sink = spool(&pending).await.map_err(|source| {
                        UploadError::SpoolFailed {
                            field: self.field_name.clone(),
                            source,
                        }
                    })?;
                }
            }
            Sink::Disk { file, .. } => {
                file.write_all(&chunk)
                    .await
                    .map_err(|source| UploadError::SpoolFailed {
                        field: self.field_name.clone(),
                        source,
                    })?;
            }
        }
        Ok(())
    }

    async fn finish(self, form: &mut MultipartForm) -> Result<(), UploadError> {
        let source = match self.sink {
            Sink::Skip => return Ok(()),
            Sink::Text(buffer) => {
                let value = String::from_utf8(buffer.to_vec())
                    .map_err(|_| ParseError::new("form value is not valid UTF-8"))?;
                form.push_value(self.field_name, value);
                return Ok(());
            }
            Sink::Memory(buffer) => PartSource::Memory(buffer.freeze()),
            Sink::Disk { path, mut file } => {
                file.flush()
                    .await
                    .map_err(|source| UploadError::SpoolFailed {
                        field: self.field_name.clone(),
                        source,
                    })?;
                PartSource::Disk(Arc::new(path))
            }
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(
            field_name = self.field_name.as_str(),
            size = self.size,
            spooled = matches!(source, PartSource::Disk(_)),
            "form: collected file part"
        );

        form.push_file(FilePart {
            field_name: self.field_name,
            file_name: self.file_name.unwrap_or_default(),
            content_type: self.content_type,
            size: self.size,
            source,
        });
        Ok(())
    }
}

async fn spool(pending: &[u8]) -> io::Result<Sink> {
    let (file, path) = tokio::task::spawn_blocking(tempfile::NamedTempFile::new)
        .await
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))??
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);
    file.write_all(pending).await?;
    Ok(Sink::Disk { path, file })
}

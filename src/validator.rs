//! File validators run after content sniffing and before storage.

use std::{fmt, sync::Arc};

use crate::ValidationError;

/// Metadata a validator inspects. Validators never see the file body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Multipart field name.
    pub field_name: String,
    /// File name supplied by the client.
    pub original_name: String,
    /// Name generated for storage.
    pub uploaded_file_name: String,
    /// Detected content type, without parameters.
    pub mime_type: String,
    /// Size of the part in bytes as received.
    pub size: u64,
}

/// A predicate over [`FileMeta`] that accepts or rejects a file.
pub trait Validator: Send + Sync {
    /// Returns `Ok(())` to accept the file or the rejection reason.
    fn validate(&self, meta: &FileMeta) -> Result<(), ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(&FileMeta) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, meta: &FileMeta) -> Result<(), ValidationError> {
        self(meta)
    }
}

/// Accepts every file.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _meta: &FileMeta) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Accepts files whose detected MIME type is in a fixed set.
///
/// Comparison is case-insensitive and ignores MIME parameters on the
/// configured entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeTypeAllowlist {
    allowed: Vec<String>,
}

impl MimeTypeAllowlist {
    /// Creates an allowlist from MIME type strings such as `image/png`.
    pub fn new<I, T>(allowed: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|value| normalize_mime(value.as_ref()))
                .collect(),
        }
    }

    /// Returns the normalized allowed types.
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }
}

impl Validator for MimeTypeAllowlist {
    fn validate(&self, meta: &FileMeta) -> Result<(), ValidationError> {
        let detected = normalize_mime(&meta.mime_type);
        if self.allowed.iter().any(|allowed| *allowed == detected) {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            field_name = meta.field_name.as_str(),
            mime = meta.mime_type.as_str(),
            allowed = ?self.allowed,
            "validator: MIME type rejected by allowlist"
        );

        Err(ValidationError::UnsupportedMimeType {
            mime: meta.mime_type.clone(),
        })
    }
}

/// Rejects files larger than a fixed number of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxFileSize(u64);

impl MaxFileSize {
    /// Creates a size validator with an inclusive upper bound.
    pub fn new(max: u64) -> Self {
        Self(max)
    }
}

impl Validator for MaxFileSize {
    fn validate(&self, meta: &FileMeta) -> Result<(), ValidationError> {
        if meta.size > self.0 {
            return Err(ValidationError::FileTooLarge {
                size: meta.size,
                max: self.0,
            });
        }
        Ok(())
    }
}

/// Runs validators in order and stops at the first rejection.
///
/// An empty chain accepts everything.
#[derive(Clone, Default)]
pub struct Chain {
    validators: Vec<Arc<dyn Validator>>,
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl Chain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a validator to the end of the chain.
    pub fn with<V>(mut self, validator: V) -> Self
    where
        V: Validator + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Returns the number of validators in the chain.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Returns `true` when the chain holds no validators.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl Validator for Chain {
    fn validate(&self, meta: &FileMeta) -> Result<(), ValidationError> {
        self.validators
            .iter()
            .try_for_each(|validator| validator.validate(meta))
    }
}

fn normalize_mime(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

use std::io;

use thiserror::Error;

/// Configuration-time validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// No storage backend was supplied to the builder.
    #[error("a storage backend must be provided")]
    MissingStorage,
    /// No maximum upload size was supplied to the builder.
    #[error("a maximum upload size must be provided")]
    MissingMaxSize,
    /// A configured numeric limit must be strictly greater than zero.
    #[error("limit `{limit}` must be greater than 0")]
    InvalidLimitValue {
        /// Name of the limit.
        limit: &'static str,
    },
    /// A requested upload field name was empty.
    #[error("upload field name cannot be empty")]
    EmptyFieldName,
    /// The same field name was requested twice for one upload route.
    #[error("duplicate upload field `{name}`")]
    DuplicateFieldName {
        /// Duplicated field name.
        name: String,
    },
    /// An upload route was configured without any field names.
    #[error("an upload route must name at least one field")]
    NoFields,
}

/// Parser-level multipart failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Generic parser failure with message context.
    #[error("{message}")]
    Message {
        /// Parser failure message.
        message: String,
    },
}

impl ParseError {
    /// Creates a parser error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

/// Storage backend failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Upload options did not carry a destination file name.
    #[error("invalid upload options: file name is required")]
    MissingFileName,
    /// Path options did not carry a storage key.
    #[error("invalid path options: key is required")]
    MissingKey,
    /// The backend requires a bucket and none was supplied.
    #[error("please provide a valid bucket name")]
    MissingBucket,
    /// A storage key would escape the backend's namespace.
    #[error("invalid storage key `{key}`")]
    InvalidKey {
        /// Offending key.
        key: String,
    },
    /// The configured destination root cannot be used.
    #[error("storage destination `{path}` is unavailable: {message}")]
    DestinationUnavailable {
        /// Destination path or identifier.
        path: String,
        /// Underlying failure description.
        message: String,
    },
    /// An I/O failure while reading the upload stream or writing the object.
    #[error("storage I/O failed: {message}")]
    Io {
        /// Failure description.
        message: String,
    },
    /// Access path or URL generation failed.
    #[error("failed to generate access path: {message}")]
    PathGeneration {
        /// Failure description.
        message: String,
    },
    /// Any other backend-specific failure.
    #[error("{message}")]
    Backend {
        /// Failure description.
        message: String,
    },
}

impl StorageError {
    /// Creates a backend error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub(crate) fn io(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Io {
            message: format!("{context}: {err}"),
        }
    }
}

/// Rejection reasons produced by file validators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// The detected MIME type is not in the allowlist.
    #[error("unsupported MIME type uploaded: {mime}")]
    UnsupportedMimeType {
        /// Detected MIME type of the rejected file.
        mime: String,
    },
    /// The file is larger than the validator permits.
    #[error("file of {size} bytes exceeds the limit of {max} bytes")]
    FileTooLarge {
        /// Reported file size in bytes.
        size: u64,
        /// Maximum permitted size in bytes.
        max: u64,
    },
    /// A custom validator rejected the file.
    #[error("{reason}")]
    Rejected {
        /// Human readable rejection reason.
        reason: String,
    },
}

impl ValidationError {
    /// Creates a custom rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Runtime error type reported by the upload pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UploadError {
    /// The requested field list is empty or repeats a name.
    #[error("invalid field list: {0}")]
    InvalidFields(#[from] ConfigError),
    /// The request body exceeded the configured byte budget.
    #[error("file size exceeded the limit of {limit} bytes")]
    FileSizeExceeded {
        /// Configured maximum body size in bytes.
        limit: u64,
    },
    /// The multipart payload or its content type is malformed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Multipart stream ended before a complete terminal boundary.
    #[error("multipart stream ended unexpectedly")]
    IncompleteStream,
    /// A requested field carried no files.
    #[error("files could not be found in key ({field}) from the HTTP request")]
    FieldNotFound {
        /// Requested field name.
        field: String,
    },
    /// A large part could not be buffered to a temporary file.
    #[error("could not buffer file for key ({field}): {source}")]
    SpoolFailed {
        /// Field the part belongs to.
        field: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// A file part could not be opened for reading.
    #[error("could not open file for key ({field}): {source}")]
    CouldNotOpenFile {
        /// Field the part belongs to.
        field: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// Content type detection failed.
    #[error("{field} has an invalid MIME type: {source}")]
    InvalidMimeType {
        /// Field the part belongs to.
        field: String,
        /// Underlying read or seek failure.
        #[source]
        source: io::Error,
    },
    /// A validator rejected the file.
    #[error("validation failed for ({field}): {source}")]
    ValidationFailed {
        /// Field the part belongs to.
        field: String,
        /// Rejection reported by the validator.
        #[source]
        source: ValidationError,
    },
    /// The storage backend failed to persist the file.
    #[error("could not upload file to storage ({field}): {source}")]
    CouldNotUploadFile {
        /// Field the part belongs to.
        field: String,
        /// Backend failure.
        #[source]
        source: StorageError,
    },
    /// Work stopped because a sibling field failed first.
    #[error("upload cancelled")]
    Cancelled,
    /// A field worker terminated abnormally.
    #[error("upload worker failed: {message}")]
    Worker {
        /// Join failure description.
        message: String,
    },
}

impl UploadError {
    /// Returns the field this error is attributed to, when there is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::FieldNotFound { field }
            | Self::SpoolFailed { field, .. }
            | Self::CouldNotOpenFile { field, .. }
            | Self::InvalidMimeType { field, .. }
            | Self::ValidationFailed { field, .. }
            | Self::CouldNotUploadFile { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Failures reading the per-request result store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// No files have been attached to the request.
    #[error("no files were uploaded in the request")]
    NothingUploaded,
    /// The named field was never populated.
    #[error("no files found for field `{field}`")]
    FieldFilesMissing {
        /// Requested field name.
        field: String,
    },
}

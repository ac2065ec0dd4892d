use std::sync::Arc;

use crate::{
    config::FileMuxConfig,
    error::ConfigError,
    limits::Limits,
    naming::FilenameStrategy,
    responder::{default_responder, ErrorResponder},
    storage::Storage,
    upload::Shared,
    validator::{AcceptAll, Validator},
    FileMux, UploadError,
};

/// Builder for configuring a [`FileMux`].
///
/// A storage backend and a maximum body size are required; everything else
/// has a default.
pub struct FileMuxBuilder<S> {
    storage: Option<S>,
    config: FileMuxConfig,
    validator: Arc<dyn Validator>,
    filename: FilenameStrategy,
    responder: ErrorResponder,
}

impl<S> std::fmt::Debug for FileMuxBuilder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMuxBuilder")
            .field("storage", &self.storage.is_some())
            .field("config", &self.config)
            .field("filename", &self.filename)
            .finish_non_exhaustive()
    }
}

impl<S> Default for FileMuxBuilder<S> {
    fn default() -> Self {
        Self {
            storage: None,
            config: FileMuxConfig::default(),
            validator: Arc::new(AcceptAll),
            filename: FilenameStrategy::default(),
            responder: default_responder(),
        }
    }
}

impl<S> FileMuxBuilder<S>
where
    S: Storage,
{
    /// Creates a builder with default settings and no storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current configuration snapshot.
    pub fn config(&self) -> &FileMuxConfig {
        &self.config
    }

    /// Sets the storage backend.
    pub fn storage(mut self, storage: S) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the maximum request body size in bytes.
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.config.limits.max_body_size = Some(bytes);
        self
    }

    /// Sets the size above which file parts are buffered on disk.
    pub fn max_memory_part_size(mut self, bytes: u64) -> Self {
        self.config.limits.max_memory_part_size = Some(bytes);
        self
    }

    /// Replaces all byte limits at once.
    pub fn limits(mut self, limits: Limits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Sets the validator run on every file. Use
    /// [`Chain`](crate::validator::Chain) to combine several.
    pub fn validator<V>(mut self, validator: V) -> Self
    where
        V: Validator + 'static,
    {
        self.validator = Arc::new(validator);
        self
    }

    /// Sets how storage names are derived from client file names.
    pub fn filename(mut self, strategy: FilenameStrategy) -> Self {
        self.filename = strategy;
        self
    }

    /// Sets the function that renders upload failures.
    pub fn error_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&UploadError) -> http::Response<bytes::Bytes> + Send + Sync + 'static,
    {
        self.responder = Arc::new(responder);
        self
    }

    /// Tolerates requested fields that carry no files.
    pub fn ignore_missing_fields(mut self, ignore: bool) -> Self {
        self.config.ignore_missing_fields = ignore;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.is_none() {
            return Err(ConfigError::MissingStorage);
        }
        self.config.validate()
    }

    /// Validates and builds an immutable [`FileMux`].
    pub fn build(self) -> Result<FileMux<S>, ConfigError> {
        self.validate()?;
        let storage = self.storage.ok_or(ConfigError::MissingStorage)?;

        Ok(FileMux {
            shared: Arc::new(Shared {
                storage,
                config: self.config,
                validator: self.validator,
                filename: self.filename,
                responder: self.responder,
            }),
        })
    }
}

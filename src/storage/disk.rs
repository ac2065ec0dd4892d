use std::{
    io,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{BoxStream, PathOptions, Storage, UploadOptions, UploadedMetadata};
use crate::{naming::sanitize_filename, StorageError};

/// Builder for [`DiskStorage`].
#[derive(Debug, Clone)]
pub struct DiskStorageBuilder {
    root: PathBuf,
    create_missing: bool,
}

impl DiskStorageBuilder {
    /// Sets the directory used for persisted files.
    pub fn destination(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Controls whether missing directories are created on first upload.
    ///
    /// When disabled, the root must already exist at build time.
    pub fn create_missing(mut self, create: bool) -> Self {
        self.create_missing = create;
        self
    }

    /// Builds a validated disk storage backend.
    pub fn build(self) -> Result<DiskStorage, StorageError> {
        if self.root.as_os_str().is_empty() || self.root.to_string_lossy().trim().is_empty() {
            return Err(StorageError::DestinationUnavailable {
                path: String::new(),
                message: "directory path is empty or only whitespace".to_owned(),
            });
        }

        match std::fs::metadata(&self.root) {
            Ok(metadata) if !metadata.is_dir() => {
                return Err(StorageError::DestinationUnavailable {
                    path: self.root.display().to_string(),
                    message: "not a directory".to_owned(),
                });
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound && self.create_missing => {}
            Err(err) => {
                return Err(StorageError::DestinationUnavailable {
                    path: self.root.display().to_string(),
                    message: err.to_string(),
                });
            }
        }

        Ok(DiskStorage {
            root: self.root,
            create_missing: self.create_missing,
        })
    }
}

impl Default for DiskStorageBuilder {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("filemux"),
            create_missing: true,
        }
    }
}

/// Disk-backed storage engine writing files under a configured root path.
///
/// Non-empty buckets map to subdirectories of the root.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
    create_missing: bool,
}

impl DiskStorage {
    /// Creates a disk storage builder.
    pub fn builder() -> DiskStorageBuilder {
        DiskStorageBuilder::default()
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn directory_for(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        let bucket = bucket.trim();
        if bucket.is_empty() {
            return Ok(self.root.clone());
        }
        if sanitize_filename(bucket) != bucket {
            return Err(StorageError::InvalidKey {
                key: bucket.to_owned(),
            });
        }
        Ok(self.root.join(bucket))
    }
}

#[async_trait::async_trait]
impl Storage for DiskStorage {
    async fn upload(
        &self,
        mut body: BoxStream<'_, io::Result<Bytes>>,
        options: UploadOptions,
    ) -> Result<UploadedMetadata, StorageError> {
        if options.file_name.trim().is_empty() {
            return Err(StorageError::MissingFileName);
        }

        let directory = self.directory_for(&options.bucket)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            file_name = options.file_name.as_str(),
            directory = %directory.display(),
            "disk storage: begin streaming store"
        );

        if self.create_missing {
            tokio::fs::create_dir_all(&directory)
                .await
                .map_err(|err| StorageError::DestinationUnavailable {
                    path: directory.display().to_string(),
                    message: err.to_string(),
                })?;
        }

        let (output_path, mut file) =
            create_unique(directory.join(sanitize_filename(&options.file_name))).await?;

        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let bytes = chunk.map_err(|err| StorageError::io("stream read failed", err))?;
            file.write_all(&bytes)
                .await
                .map_err(|err| StorageError::io("failed to write output file", err))?;
            written = written.saturating_add(bytes.len() as u64);
        }

        file.flush()
            .await
            .map_err(|err| StorageError::io("failed to flush output file", err))?;

        let key = output_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .ok_or_else(|| StorageError::io("invalid output path", output_path.display()))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            storage_key = key.as_str(),
            size = written,
            path = %output_path.display(),
            "disk storage: completed store"
        );

        Ok(UploadedMetadata {
            folder_destination: directory.display().to_string(),
            key,
            size: written,
        })
    }

    async fn path(&self, options: PathOptions) -> Result<String, StorageError> {
        if options.key.trim().is_empty() {
            return Err(StorageError::MissingKey);
        }
        if sanitize_filename(&options.key) != options.key {
            return Err(StorageError::InvalidKey { key: options.key });
        }

        let directory = self.directory_for(&options.bucket)?;
        Ok(directory.join(&options.key).display().to_string())
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

const MAX_CREATE_ATTEMPTS: usize = 8;

/// Opens `path` with `create_new`, falling back to suffixed names while the
/// name is taken. Concurrent uploads of one name never share a file.
async fn create_unique(path: PathBuf) -> Result<(PathBuf, tokio::fs::File), StorageError> {
    let mut candidate = path.clone();
    for _ in 0..MAX_CREATE_ATTEMPTS {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    path = %candidate.display(),
                    "disk storage: collision detected, adding suffix"
                );
                candidate = with_collision_suffix(&path);
            }
            Err(err) => return Err(StorageError::io("failed to create output file", err)),
        }
    }
    Err(StorageError::io(
        "failed to create output file",
        format!("no free name for {}", candidate.display()),
    ))
}

fn with_collision_suffix(path: &Path) -> PathBuf {
    let suffix = Uuid::new_v4().simple().to_string();
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("file");
    let ext = path.extension().and_then(|value| value.to_str());

    match ext {
        Some(ext) if !ext.is_empty() => path.with_file_name(format!("{stem}-{suffix}.{ext}")),
        _ => path.with_file_name(format!("{stem}-{suffix}")),
    }
}

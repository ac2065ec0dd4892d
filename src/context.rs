//! Per-request store of successfully uploaded files.
//!
//! Results travel in [`http::Extensions`]. Attaching appends to whatever an
//! earlier upload step left there, so stacked upload routes accumulate.

use std::collections::HashMap;

use http::Extensions;

use crate::{file::UploadedFile, ContextError};

/// Uploaded files keyed by field name, each list in payload order.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadedFiles {
    files: HashMap<String, Vec<UploadedFile>>,
}

impl UploadedFiles {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `files` to the list kept for `field`, creating it if needed.
    ///
    /// An empty `files` still records the field as processed.
    pub fn insert(&mut self, field: impl Into<String>, files: Vec<UploadedFile>) {
        self.files.entry(field.into()).or_default().extend(files);
    }

    /// Appends every field of `other`. Existing entries are never replaced.
    pub fn merge(&mut self, other: UploadedFiles) {
        for (field, files) in other.files {
            self.insert(field, files);
        }
    }

    /// Returns the whole mapping, failing when no file was uploaded at all.
    pub fn all(&self) -> Result<&HashMap<String, Vec<UploadedFile>>, ContextError> {
        if self.total_files() == 0 {
            return Err(ContextError::NothingUploaded);
        }
        Ok(&self.files)
    }

    /// Returns the files of one field, failing when the field was never
    /// processed.
    pub fn field(&self, name: &str) -> Result<&[UploadedFile], ContextError> {
        self.files
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ContextError::FieldFilesMissing {
                field: name.to_owned(),
            })
    }

    /// Iterates over fields and their files.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[UploadedFile])> {
        self.files
            .iter()
            .map(|(field, files)| (field.as_str(), files.as_slice()))
    }

    /// Number of fields recorded, including empty ones.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` when no field was recorded.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of files across every field.
    pub fn total_files(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Consumes the store and returns the raw mapping.
    pub fn into_inner(self) -> HashMap<String, Vec<UploadedFile>> {
        self.files
    }
}

impl IntoIterator for UploadedFiles {
    type Item = (String, Vec<UploadedFile>);
    type IntoIter = std::collections::hash_map::IntoIter<String, Vec<UploadedFile>>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// Merges `files` into the store carried by `extensions`.
pub fn attach(extensions: &mut Extensions, files: UploadedFiles) {
    match extensions.get_mut::<UploadedFiles>() {
        Some(existing) => existing.merge(files),
        None => {
            extensions.insert(files);
        }
    }
}

/// Returns every uploaded file of the request.
///
/// Fails with [`ContextError::NothingUploaded`] when no upload step ran or
/// none of them stored a file.
pub fn uploaded_files(extensions: &Extensions) -> Result<&UploadedFiles, ContextError> {
    let files = extensions
        .get::<UploadedFiles>()
        .ok_or(ContextError::NothingUploaded)?;
    files.all()?;
    Ok(files)
}

/// Returns the uploaded files of one field.
pub fn files_for_field<'a>(
    extensions: &'a Extensions,
    field: &str,
) -> Result<&'a [UploadedFile], ContextError> {
    extensions
        .get::<UploadedFiles>()
        .ok_or_else(|| ContextError::FieldFilesMissing {
            field: field.to_owned(),
        })?
        .field(field)
}

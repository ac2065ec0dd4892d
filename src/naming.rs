use std::{fmt, path::Path, sync::Arc};

use uuid::Uuid;

/// Prefix used by [`FilenameStrategy::Timestamp`].
pub const TIMESTAMP_PREFIX: &str = "filemux";

type CustomFilenameFn = dyn Fn(&str) -> String + Send + Sync;

/// Strategy used to derive the storage name from the client file name.
#[derive(Clone, Default)]
pub enum FilenameStrategy {
    /// `filemux-{unix_seconds}-{original}`.
    ///
    /// Two files with the same name uploaded within the same second collide.
    #[default]
    Timestamp,
    /// Random UUID, keeping the original extension.
    Random,
    /// Keep the incoming file name as-is.
    Keep,
    /// Apply a user-provided transform.
    Custom(Arc<CustomFilenameFn>),
}

impl fmt::Debug for FilenameStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp => f.write_str("Timestamp"),
            Self::Random => f.write_str("Random"),
            Self::Keep => f.write_str("Keep"),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

impl FilenameStrategy {
    /// Wraps a closure as a custom strategy.
    pub fn custom<F>(transform: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(transform))
    }

    /// Generates the storage name for `original`.
    pub fn generate(&self, original: &str) -> String {
        match self {
            Self::Timestamp => format!(
                "{TIMESTAMP_PREFIX}-{}-{original}",
                chrono::Utc::now().timestamp()
            ),
            Self::Random => random_name(original),
            Self::Keep => original.to_owned(),
            Self::Custom(transform) => transform(original),
        }
    }
}

fn random_name(original: &str) -> String {
    let stem = Uuid::new_v4().simple().to_string();
    match Path::new(original).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{stem}.{ext}"),
        _ => stem,
    }
}

/// Sanitizes filenames to prevent traversal and unsafe path characters.
pub fn sanitize_filename(input: &str) -> String {
    let normalized = input.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or_default();

    let sanitized: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim_matches(|c: char| c == '.' || c == ' ');
    if sanitized.is_empty() {
        return "file".to_owned();
    }

    sanitized.to_owned()
}

use crate::{error::ConfigError, limits::Limits};

/// Validated, immutable settings of a [`FileMux`](crate::FileMux).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileMuxConfig {
    /// Byte budgets applied while reading a request.
    pub limits: Limits,
    /// When set, a requested field with no files yields an empty list instead
    /// of failing the request.
    pub ignore_missing_fields: bool,
}

impl FileMuxConfig {
    /// Creates a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that a maximum body size is present and every limit is non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_body_size.is_none() {
            return Err(ConfigError::MissingMaxSize);
        }
        self.limits.validate()
    }
}

/// Validates the field list of one upload route and returns it owned.
///
/// Names must be non-empty and unique; at least one is required.
pub fn validate_fields<I, T>(fields: I) -> Result<Vec<String>, ConfigError>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut names: Vec<String> = Vec::new();
    for field in fields {
        let field = field.into();
        if field.trim().is_empty() {
            return Err(ConfigError::EmptyFieldName);
        }
        if names.contains(&field) {
            return Err(ConfigError::DuplicateFieldName { name: field });
        }
        names.push(field);
    }

    if names.is_empty() {
        return Err(ConfigError::NoFields);
    }
    Ok(names)
}

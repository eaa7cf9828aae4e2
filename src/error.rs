//! Pipeline error types for typed error handling.
//!
//! Backends speak `anyhow`; the pipeline converts their failures into
//! [`Error`] at the seam so callers can tell configuration problems apart
//! from transfer failures.

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Re-exported under a descriptive name for use outside the crate.
pub use Error as PipelineError;

/// Pipeline errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration is missing or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Source name cannot be embedded in an object path.
    #[error("invalid source name '{name}': {reason}")]
    InvalidSourceName { name: String, reason: String },

    /// Batch selection hint is malformed.
    #[error("invalid batch hint '{hint}': {reason}")]
    InvalidHint { hint: String, reason: String },

    /// Object storage operation failed.
    #[error("storage error in {context}: {reason}")]
    Storage { context: String, reason: String },

    /// Warehouse operation failed.
    #[error("warehouse error in {context}: {reason}")]
    Warehouse { context: String, reason: String },

    /// HTTP transfer failed.
    #[error("HTTP error for '{source_name}': {reason}")]
    Http { source_name: String, reason: String },
}

impl Error {
    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    /// Create an invalid source name error.
    pub fn invalid_source_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSourceName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid hint error.
    pub fn invalid_hint(hint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHint {
            hint: hint.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a storage backend failure.
    pub fn storage(context: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::Storage {
            context: context.into(),
            reason: format!("{err:#}"),
        }
    }

    /// Wrap a warehouse backend failure.
    pub fn warehouse(context: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::Warehouse {
            context: context.into(),
            reason: format!("{err:#}"),
        }
    }

    /// Wrap an HTTP transfer failure for one source.
    pub fn http(source_name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Http {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for failures that abort a run before any stage executes.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::InvalidSourceName { .. } | Self::InvalidHint { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(Error::config("missing region").is_configuration());
        assert!(Error::invalid_hint("2024-13-01", "bad month").is_configuration());
        assert!(Error::invalid_source_name("a__b", "separator").is_configuration());

        let err = anyhow::anyhow!("connection reset");
        assert!(!Error::storage("listing", &err).is_configuration());
        assert!(!Error::warehouse("query", &err).is_configuration());
    }

    #[test]
    fn test_backend_context_is_preserved() {
        let err = anyhow::anyhow!("disk full").context("Failed to write object");
        let wrapped = Error::storage("upload", &err);
        let msg = wrapped.to_string();
        assert!(msg.contains("upload"));
        assert!(msg.contains("Failed to write object"));
        assert!(msg.contains("disk full"));
    }
}

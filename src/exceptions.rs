//! Error types and result definitions for the extraction engine.
//!
//! Errors are split along the recovery policy: provider and deadline failures
//! are recovered locally by the orchestrator, schema and text-source failures
//! surface to the batch as per-item failures, and repository corruption is
//! downgraded to a cache miss after the entry has been quarantined.

use thiserror::Error;

/// Result type alias for extraction operations
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Base error type for all extraction operations
#[derive(Error, Debug)]
pub enum ExtractError {
    /// LLM call failed with a retryable condition (rate limit, network)
    #[error("Transient provider error: {message}")]
    TransientProvider {
        message: String,
        provider: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The watchdog deadline expired while an LLM call was in flight
    #[error("Deadline exceeded after {elapsed_s:.2}s (budget {budget_s:.2}s)")]
    DeadlineExceeded { elapsed_s: f64, budget_s: f64 },

    /// The LLM returned a payload that could not be parsed into a field record
    #[error("Malformed provider output: {0}")]
    MalformedProviderOutput(String),

    /// Schema empty, duplicate keys, or non-identifier keys
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// PDF unreadable or text conversion failed
    #[error("Text source failure: {0}")]
    TextSourceFailure(String),

    /// An existing knowledge entry failed structural checks on load
    #[error("Repository corruption for label '{label}': {message}")]
    RepositoryCorruption { label: String, message: String },

    /// Configuration-related errors (missing credentials, bad thresholds)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// I/O errors (repository file operations, etc.)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Network-level errors from the HTTP client
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl ExtractError {
    /// Create a new transient provider error
    pub fn transient<S: Into<String>>(message: S, provider: Option<String>) -> Self {
        Self::TransientProvider {
            message: message.into(),
            provider,
            source: None,
        }
    }

    /// Create a transient provider error wrapping a source error
    pub fn transient_with_source<S: Into<String>>(
        message: S,
        provider: Option<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::TransientProvider {
            message: message.into(),
            provider,
            source: Some(source),
        }
    }

    /// Create a new deadline-exceeded error
    pub fn deadline(elapsed_s: f64, budget_s: f64) -> Self {
        Self::DeadlineExceeded {
            elapsed_s,
            budget_s,
        }
    }

    /// Create a new malformed-output error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedProviderOutput(message.into())
    }

    /// Create a new invalid-schema error
    pub fn invalid_schema<S: Into<String>>(message: S) -> Self {
        Self::InvalidSchema(message.into())
    }

    /// Create a new text-source error
    pub fn text_source<S: Into<String>>(message: S) -> Self {
        Self::TextSourceFailure(message.into())
    }

    /// Create a new repository-corruption error
    pub fn corruption<L: Into<String>, S: Into<String>>(label: L, message: S) -> Self {
        Self::RepositoryCorruption {
            label: label.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError(message.into())
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::SerializationError(message.into())
    }

    /// Whether the synchronous path may retry this error within its deadline
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientProvider { .. } | Self::NetworkError(_))
    }

    /// Whether this error is a deadline expiry
    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }

    /// Whether this error must surface to the batch as a per-item failure
    pub fn is_item_fatal(&self) -> bool {
        matches!(self, Self::InvalidSchema(_) | Self::TextSourceFailure(_))
    }

    /// Get the provider name if this is a transient provider error
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::TransientProvider { provider, .. } => provider.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let transient = ExtractError::transient("rate limited", Some("openai".to_string()));
        assert!(transient.is_transient());
        assert!(!transient.is_deadline());
        assert!(!transient.is_item_fatal());
        assert_eq!(transient.provider(), Some("openai"));

        let deadline = ExtractError::deadline(12.0, 10.0);
        assert!(deadline.is_deadline());
        assert!(!deadline.is_transient());

        let schema = ExtractError::invalid_schema("empty schema");
        assert!(schema.is_item_fatal());

        let text = ExtractError::text_source("unreadable PDF");
        assert!(text.is_item_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = ExtractError::corruption("invoice", "truncated parser file");
        let display = format!("{}", err);
        assert!(display.contains("invoice"));
        assert!(display.contains("truncated parser file"));
    }

    #[test]
    fn test_json_error_conversion() {
        let bad = serde_json::from_str::<serde_json::Value>("not json");
        let err: ExtractError = bad.unwrap_err().into();
        assert!(matches!(err, ExtractError::SerializationError(_)));
    }
}

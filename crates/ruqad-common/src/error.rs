//! Error types shared across the RuQaD crates

use thiserror::Error;

/// Result type alias for RuQaD operations
pub type Result<T> = std::result::Result<T, RuqadError>;

/// Main error type for RuQaD
#[derive(Error, Debug)]
pub enum RuqadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Unsafe archive entry path: {0}")]
    UnsafeEntryPath(String),

    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),
}

impl RuqadError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

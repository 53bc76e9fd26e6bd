//! Error types for document parsing and emission.

use thiserror::Error;

/// Result type alias for stackform-yaml operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing or emitting documents.
#[derive(Debug, Error)]
pub enum Error {
    /// YAML syntax error from the underlying scanner.
    #[error("YAML parse error: {0}")]
    Parse(#[from] yaml_rust2::ScanError),

    /// The input contained no document at all.
    #[error("empty document")]
    EmptyDocument,

    /// A mapping key was not a scalar convertible to a string.
    #[error("unsupported mapping key: {0}")]
    UnsupportedKey(String),

    /// Emission failure from the YAML emitter.
    #[error("YAML emit error: {0}")]
    Emit(String),

    /// JSON syntax error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<yaml_rust2::EmitError> for Error {
    fn from(err: yaml_rust2::EmitError) -> Self {
        Error::Emit(err.to_string())
    }
}

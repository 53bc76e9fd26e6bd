//! Error types for configuration loading.

use thiserror::Error;

/// Result type alias for stackform-config operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or merging configuration.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("in {path}: {source}")]
    Document {
        path: String,
        #[source]
        source: stackform_yaml::Error,
    },
}

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading configuration or manifests.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// File is not valid JSON for the expected document.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// An environment override could not be applied.
    #[error("invalid value `{value}` for {var}: {reason}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// A setting is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    /// The manifest parsed but failed validation.
    #[error("invalid manifest {path}: {source}")]
    Manifest {
        /// Manifest file.
        path: PathBuf,
        /// Validation failure.
        #[source]
        source: governor_primitives::Error,
    },
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

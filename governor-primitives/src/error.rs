//! Shared error definitions for governor primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the governor.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing or validating governor primitives.
#[derive(Debug, Error)]
pub enum Error {
    /// A UUID-backed identifier could not be parsed.
    #[error("invalid uuid identifier: {source}")]
    InvalidUuid {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// A rule or budget identifier failed validation.
    #[error("invalid identifier `{id}`: {reason}")]
    InvalidIdentifier {
        /// The offending identifier string.
        id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Manifest structure failed validation.
    #[error("invalid manifest: {reason}")]
    InvalidManifest {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Budget definition failed validation.
    #[error("invalid budget `{budget}`: {reason}")]
    InvalidBudget {
        /// Budget identifier.
        budget: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Reduction would widen permissions or is otherwise malformed.
    #[error("invalid reduction: {reason}")]
    InvalidReduction {
        /// Human-readable reason for rejection.
        reason: String,
    },
}

impl Error {
    /// Helper to construct manifest validation errors.
    #[must_use]
    pub fn manifest(reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            reason: reason.into(),
        }
    }
}

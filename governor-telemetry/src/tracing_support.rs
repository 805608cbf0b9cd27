//! Structured tracing helpers.

use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Filter used when nothing else is configured.
pub const DEFAULT_FILTER: &str = "info";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive could not be parsed.
    #[error("invalid log filter `{filter}`: {reason}")]
    InvalidFilter {
        /// Directive as given.
        filter: String,
        /// Parser message.
        reason: String,
    },
    /// A global subscriber is already installed.
    #[error("tracing subscriber already installed")]
    AlreadyInstalled,
}

/// Builds an [`EnvFilter`] from a directive string.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] when the directive does not parse.
pub fn filter(directive: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directive).map_err(|err| TelemetryError::InvalidFilter {
        filter: directive.to_owned(),
        reason: err.to_string(),
    })
}

/// Installs the global `fmt` subscriber, writing to stderr.
///
/// An explicit `directive` wins over `RUST_LOG`; without either the
/// [`DEFAULT_FILTER`] applies.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for a malformed directive and
/// [`TelemetryError::AlreadyInstalled`] when called twice.
pub fn init(directive: Option<&str>) -> Result<(), TelemetryError> {
    let env_filter = match directive {
        Some(directive) => filter(directive)?,
        None => EnvFilter::try_from_default_env().or_else(|_| filter(DEFAULT_FILTER))?,
    };
    let active = env_filter.to_string();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| TelemetryError::AlreadyInstalled)?;
    debug!(filter = %active, "tracing subscriber installed");
    Ok(())
}

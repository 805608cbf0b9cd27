//! Configuration management for the governor.

#![warn(missing_docs, clippy::pedantic)]

mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_manifest, ENV_LOG, ENV_MANIFEST, ENV_MODE};
pub use schema::{EnforcementConfig, GovernorConfig, HitlConfig, TelemetryConfig};

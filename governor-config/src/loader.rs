//! File and environment loaders.

use std::fs;
use std::path::{Path, PathBuf};

use governor_primitives::{GovernorManifest, GovernorMode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::GovernorConfig;

/// Overrides `manifest_path`.
pub const ENV_MANIFEST: &str = "GOVERNOR_MANIFEST";
/// Overrides `mode`.
pub const ENV_MODE: &str = "GOVERNOR_MODE";
/// Overrides `telemetry.log_filter`.
pub const ENV_LOG: &str = "GOVERNOR_LOG";

fn read_json<T: DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads configuration from an optional file, then applies process
/// environment overrides and validates.
///
/// # Errors
///
/// Returns [`ConfigError`] for unreadable or malformed files, bad overrides,
/// and out-of-range settings.
pub fn load_config(path: Option<&Path>) -> ConfigResult<GovernorConfig> {
    load_config_with(path, |var| std::env::var(var).ok())
}

/// Like [`load_config`] with a caller-supplied environment.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with<E>(path: Option<&Path>, env: E) -> ConfigResult<GovernorConfig>
where
    E: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading governor config");
            read_json(path)?
        }
        None => GovernorConfig::default(),
    };
    apply_overrides(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

/// Applies `GOVERNOR_*` overrides from `env`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnv`] for an unknown mode.
pub fn apply_overrides<E>(config: &mut GovernorConfig, env: E) -> ConfigResult<()>
where
    E: Fn(&str) -> Option<String>,
{
    if let Some(manifest) = env(ENV_MANIFEST).filter(|value| !value.trim().is_empty()) {
        config.manifest_path = Some(PathBuf::from(manifest));
    }
    if let Some(mode) = env(ENV_MODE) {
        config.mode = mode
            .parse::<GovernorMode>()
            .map_err(|err| ConfigError::InvalidEnv {
                var: ENV_MODE,
                value: mode.clone(),
                reason: err.to_string(),
            })?;
    }
    if let Some(filter) = env(ENV_LOG).filter(|value| !value.trim().is_empty()) {
        config.telemetry.log_filter = filter;
    }
    Ok(())
}

/// Reads and validates a manifest document.
///
/// # Errors
///
/// Returns [`ConfigError::Io`], [`ConfigError::Parse`], or
/// [`ConfigError::Manifest`].
pub fn load_manifest(path: &Path) -> ConfigResult<GovernorManifest> {
    let manifest: GovernorManifest = read_json(path)?;
    manifest.validate().map_err(|source| ConfigError::Manifest {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        path = %path.display(),
        version = manifest.version(),
        rules = manifest.rules().len(),
        "manifest loaded"
    );
    Ok(manifest)
}

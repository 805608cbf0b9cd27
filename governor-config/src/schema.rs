//! Strongly typed configuration schema.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use governor_kernel::GovernorOptions;
use governor_primitives::GovernorMode;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Top-level governor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Manifest loaded at startup.
    pub manifest_path: Option<PathBuf>,
    /// Whether decisions block.
    pub mode: GovernorMode,
    /// Enforcement scheduler settings.
    pub enforcement: EnforcementConfig,
    /// Human approval settings.
    pub hitl: HitlConfig,
    /// Logging settings.
    pub telemetry: TelemetryConfig,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            manifest_path: None,
            mode: GovernorMode::Enforce,
            enforcement: EnforcementConfig::default(),
            hitl: HitlConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Enforcement scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcementConfig {
    /// Operations enforced at once.
    pub max_concurrency: usize,
    /// Grace floor for time budgets, in milliseconds.
    pub default_grace_ms: u64,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 32,
            default_grace_ms: 0,
        }
    }
}

/// Human approval settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitlConfig {
    /// Whether escalations wait for a human.
    pub enabled: bool,
    /// How long a waiter waits, in milliseconds.
    pub approval_timeout_ms: u64,
}

impl Default for HitlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            approval_timeout_ms: 300_000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `tracing` filter directive.
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".into(),
        }
    }
}

impl GovernorConfig {
    /// Checks ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero concurrency, a zero approval
    /// timeout with approvals enabled, or an empty log filter.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.enforcement.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "enforcement.max_concurrency must be greater than zero",
            ));
        }
        if self.hitl.enabled && self.hitl.approval_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "hitl.approval_timeout_ms must be greater than zero",
            ));
        }
        if self.telemetry.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("telemetry.log_filter cannot be empty"));
        }
        Ok(())
    }

    /// Converts the configuration into governor options.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::validate`] failures.
    pub fn governor_options(&self) -> ConfigResult<GovernorOptions> {
        self.validate()?;
        let concurrency = NonZeroUsize::new(self.enforcement.max_concurrency).ok_or(
            ConfigError::Invalid("enforcement.max_concurrency must be greater than zero"),
        )?;

        let options = GovernorOptions::default()
            .mode(self.mode)
            .max_concurrency(concurrency)
            .minimum_grace(Duration::from_millis(self.enforcement.default_grace_ms));
        Ok(if self.hitl.enabled {
            options.approvals(Duration::from_millis(self.hitl.approval_timeout_ms))
        } else {
            options
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_fill_defaults() {
        let config: GovernorConfig =
            serde_json::from_str(r#"{"mode":"shadow","hitl":{"enabled":true}}"#).unwrap();

        assert_eq!(config.mode, GovernorMode::Shadow);
        assert!(config.hitl.enabled);
        assert_eq!(config.hitl.approval_timeout_ms, 300_000);
        assert_eq!(config.enforcement.max_concurrency, 32);
        assert_eq!(config.telemetry.log_filter, "info");
        config.validate().unwrap();
    }

    #[test]
    fn zero_values_are_rejected() {
        let mut config = GovernorConfig::default();
        config.enforcement.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = GovernorConfig::default();
        config.hitl.enabled = true;
        config.hitl.approval_timeout_ms = 0;
        assert!(config.governor_options().is_err());
    }
}

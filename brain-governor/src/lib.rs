//! BRAiN governor SDK facade.
//!
//! Bundles the governor crates behind feature flags so embedders can take only
//! the evaluator, or the full runtime with budgets, enforcement, and approvals.

#![warn(missing_docs, clippy::pedantic)]

/// Shared manifest, budget, and identifier types.
pub use governor_primitives as primitives;

/// Decision evaluator and constraint reducer (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use governor_policy as policy;

/// Registry, ledger, enforcer, approvals, and the governor service (enabled by
/// `kernel` feature).
#[cfg(feature = "kernel")]
pub use governor_kernel as kernel;

/// Tracing setup and decision metrics (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use governor_telemetry as telemetry;

/// Configuration schema and loaders (enabled by `config` feature).
#[cfg(feature = "config")]
pub use governor_config as config;

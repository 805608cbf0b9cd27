//! Observability utilities for the governor.

#![warn(missing_docs, clippy::pedantic)]

pub mod metrics;
pub mod tracing_support;

pub use metrics::{DecisionMetrics, MetricsSnapshot};
pub use tracing_support::{init, TelemetryError, DEFAULT_FILTER};

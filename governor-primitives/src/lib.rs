//! Core shared types for the BRAiN governor.

#![warn(missing_docs, clippy::pedantic)]

mod budget;
mod condition;
mod constraints;
mod error;
mod ids;
mod manifest;
mod mode;
mod risk;

/// Budgets and their limits.
pub use budget::{Budget, BudgetLimit};
/// Declarative rule conditions.
pub use condition::{FieldCondition, RuleCondition};
/// Constraint sets and the reductions that narrow them.
pub use constraints::{ConstraintSet, Reduction};
/// Error type and result alias shared across the governor.
pub use error::{Error, Result};
/// Identifiers for requests, approvals, rules, and budgets.
pub use ids::{ApprovalId, BudgetId, RequestId, RuleId};
/// Governor manifests and rules.
pub use manifest::{DefaultAction, GovernorManifest, ManifestBuilder, ManifestRule, RuleAction};
/// Enforcement mode.
pub use mode::GovernorMode;
/// Risk classification.
pub use risk::{RiskClass, RiskTier};

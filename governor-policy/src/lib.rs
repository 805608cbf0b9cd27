//! Governance decision evaluation for BRAiN.
//!
//! The [`DecisionEvaluator`] matches a [`DecisionRequest`] against a compiled
//! [`GovernorManifest`](governor_primitives::GovernorManifest) and produces a
//! [`DecisionResult`] carrying exactly one [`ReasonCode`]. Allowed actions are
//! narrowed by the [`ConstraintReducer`].

#![warn(missing_docs, clippy::pedantic)]

pub mod conditions;
pub mod contracts;
pub mod decision;
pub mod engine;
pub mod error;
pub mod reducer;

pub use conditions::{evaluate_condition, CompiledCondition, ConditionOperator, FieldPath};
pub use contracts::{ActorContext, DecisionRequest, RequestContext};
pub use decision::{DecisionResult, DecisionType, ReasonCode};
pub use engine::{BudgetView, DecisionEvaluator, UnmeteredBudgets};
pub use error::{DecisionError, EvaluationError, ManifestError, PolicyResult};
pub use reducer::{apply_reduction, ConstraintReducer, ReductionOutcome};

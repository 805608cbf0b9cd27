//! Errors surfaced by decision evaluation.

use governor_primitives::{RequestId, RuleId};
use thiserror::Error;

/// Configuration or matching failure.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest failed structural validation.
    #[error(transparent)]
    Invalid(#[from] governor_primitives::Error),
    /// No rule matched and the manifest has no default action.
    #[error("no rule in manifest `{version}` matched request {request_id} and no default action is configured")]
    NoMatchingRule {
        /// Request that fell through.
        request_id: RequestId,
        /// Version of the manifest that was evaluated.
        version: String,
    },
    /// No manifest has been activated yet.
    #[error("no active governor manifest")]
    NoActiveManifest,
    /// A manifest with this version is already registered.
    #[error("manifest version `{version}` is already registered")]
    VersionConflict {
        /// Conflicting version.
        version: String,
    },
    /// No manifest with this version is registered.
    #[error("unknown manifest version `{version}`")]
    UnknownVersion {
        /// Requested version.
        version: String,
    },
}

/// Malformed rule condition or reduction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvaluationError {
    /// Operator is not one of the supported comparisons.
    #[error("unknown operator `{op}`{}", rule_suffix(.rule.as_ref()))]
    UnknownOperator {
        /// Rule containing the condition, when known.
        rule: Option<RuleId>,
        /// Operator as written.
        op: String,
    },
    /// Field path does not name a request field.
    #[error("unknown field `{path}`{}", rule_suffix(.rule.as_ref()))]
    UnknownField {
        /// Rule containing the condition, when known.
        rule: Option<RuleId>,
        /// Path as written.
        path: String,
    },
    /// Comparison value does not fit the operator.
    #[error("malformed condition: {reason}{}", rule_suffix(.rule.as_ref()))]
    MalformedCondition {
        /// Rule containing the condition, when known.
        rule: Option<RuleId>,
        /// Human-readable explanation.
        reason: String,
    },
    /// Reduction would widen permissions or is otherwise malformed.
    #[error("invalid reduction: {reason}{}", rule_suffix(.rule.as_ref()))]
    InvalidReduction {
        /// Rule declaring the reduction, when known.
        rule: Option<RuleId>,
        /// Human-readable explanation.
        reason: String,
    },
}

impl EvaluationError {
    /// Attaches the rule the error originated from.
    #[must_use]
    pub fn in_rule(mut self, id: &RuleId) -> Self {
        match &mut self {
            Self::UnknownOperator { rule, .. }
            | Self::UnknownField { rule, .. }
            | Self::MalformedCondition { rule, .. }
            | Self::InvalidReduction { rule, .. } => *rule = Some(id.clone()),
        }
        self
    }

    /// Returns the rule the error originated from, if known.
    #[must_use]
    pub fn rule(&self) -> Option<&RuleId> {
        match self {
            Self::UnknownOperator { rule, .. }
            | Self::UnknownField { rule, .. }
            | Self::MalformedCondition { rule, .. }
            | Self::InvalidReduction { rule, .. } => rule.as_ref(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedCondition {
            rule: None,
            reason: reason.into(),
        }
    }
}

fn rule_suffix(rule: Option<&RuleId>) -> String {
    rule.map(|id| format!(" in rule `{id}`")).unwrap_or_default()
}

/// Any failure of the decision pipeline.
#[derive(Debug, Error)]
pub enum DecisionError {
    /// Configuration or matching failure.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// Malformed condition or reduction.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl From<governor_primitives::Error> for DecisionError {
    fn from(value: governor_primitives::Error) -> Self {
        Self::Manifest(ManifestError::Invalid(value))
    }
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, DecisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_rule() {
        let err = EvaluationError::UnknownOperator {
            rule: None,
            op: "~=".into(),
        };
        assert_eq!(err.to_string(), "unknown operator `~=`");

        let err = err.in_rule(&RuleId::new("deny-shell").unwrap());
        assert_eq!(err.to_string(), "unknown operator `~=` in rule `deny-shell`");
        assert_eq!(err.rule().map(RuleId::as_str), Some("deny-shell"));
    }
}

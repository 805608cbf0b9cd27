//! Declarative rule conditions.
//!
//! Conditions are stored exactly as written in the manifest. Operators and field
//! paths stay as strings here; the policy crate compiles and checks them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Predicate tree evaluated against a decision request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCondition {
    /// Always matches.
    #[default]
    Always,
    /// Matches when every child matches. Empty `all` matches.
    All(Vec<RuleCondition>),
    /// Matches when at least one child matches. Empty `any` never matches.
    Any(Vec<RuleCondition>),
    /// Inverts the child.
    Not(Box<RuleCondition>),
    /// Compares one request field against a value.
    Field(FieldCondition),
}

impl RuleCondition {
    /// Builds a field comparison.
    #[must_use]
    pub fn field(path: impl Into<String>, op: impl Into<String>, value: Value) -> Self {
        Self::Field(FieldCondition {
            path: path.into(),
            op: op.into(),
            value,
        })
    }

    /// Builds an equality comparison.
    #[must_use]
    pub fn equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(path, "eq", value.into())
    }

    /// Builds a conjunction.
    #[must_use]
    pub fn all(children: impl IntoIterator<Item = Self>) -> Self {
        Self::All(children.into_iter().collect())
    }

    /// Builds a disjunction.
    #[must_use]
    pub fn any(children: impl IntoIterator<Item = Self>) -> Self {
        Self::Any(children.into_iter().collect())
    }

    /// Builds a negation.
    #[must_use]
    pub fn negate(child: Self) -> Self {
        Self::Not(Box::new(child))
    }
}

/// Comparison of a dotted field path against a JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    path: String,
    op: String,
    #[serde(default)]
    value: Value,
}

impl FieldCondition {
    /// Returns the dotted field path (e.g. `actor.role`).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the operator as written in the manifest.
    #[must_use]
    pub fn op(&self) -> &str {
        &self.op
    }

    /// Returns the comparison value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

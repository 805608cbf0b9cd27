//! Compilation and evaluation of rule conditions.
//!
//! Manifests store conditions as written; [`CompiledCondition::compile`] parses
//! every operator and field path once so a malformed manifest is rejected before
//! it serves a request.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use governor_primitives::RuleCondition;
use serde_json::{Number, Value};

use crate::contracts::DecisionRequest;
use crate::error::EvaluationError;

/// Addressable request field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPath {
    /// `action`
    Action,
    /// `actor.id`
    ActorId,
    /// `actor.role`
    ActorRole,
    /// `actor.tenant`
    ActorTenant,
    /// `actor.attributes.<key>...`
    ActorAttribute(Vec<String>),
    /// `request.resource`
    Resource,
    /// `request.metadata.<key>...`
    Metadata(Vec<String>),
}

impl FromStr for FieldPath {
    type Err = EvaluationError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let unknown = || EvaluationError::UnknownField {
            rule: None,
            path: path.to_owned(),
        };
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|segment| segment.trim().is_empty()) {
            return Err(unknown());
        }
        let nested = |rest: &[&str]| -> Vec<String> {
            rest.iter().map(|segment| (*segment).to_owned()).collect()
        };

        match segments.as_slice() {
            ["action"] => Ok(Self::Action),
            ["actor", "id"] => Ok(Self::ActorId),
            ["actor", "role"] => Ok(Self::ActorRole),
            ["actor", "tenant"] => Ok(Self::ActorTenant),
            ["actor", "attributes", rest @ ..] if !rest.is_empty() => {
                Ok(Self::ActorAttribute(nested(rest)))
            }
            ["request", "resource"] => Ok(Self::Resource),
            ["request", "metadata", rest @ ..] if !rest.is_empty() => {
                Ok(Self::Metadata(nested(rest)))
            }
            _ => Err(unknown()),
        }
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action => f.write_str("action"),
            Self::ActorId => f.write_str("actor.id"),
            Self::ActorRole => f.write_str("actor.role"),
            Self::ActorTenant => f.write_str("actor.tenant"),
            Self::ActorAttribute(keys) => write!(f, "actor.attributes.{}", keys.join(".")),
            Self::Resource => f.write_str("request.resource"),
            Self::Metadata(keys) => write!(f, "request.metadata.{}", keys.join(".")),
        }
    }
}

/// Supported comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Numerically greater.
    Gt,
    /// Numerically greater or equal.
    Gte,
    /// Numerically less.
    Lt,
    /// Numerically less or equal.
    Lte,
    /// Member of an array.
    In,
    /// Not a member of an array.
    NotIn,
    /// Substring, or array element.
    Contains,
    /// String prefix.
    StartsWith,
    /// Field is present and not null.
    Exists,
}

impl FromStr for ConditionOperator {
    type Err = EvaluationError;

    fn from_str(op: &str) -> Result<Self, Self::Err> {
        Ok(match op {
            "eq" | "==" => Self::Eq,
            "ne" | "!=" => Self::Ne,
            "gt" | ">" => Self::Gt,
            "gte" | ">=" => Self::Gte,
            "lt" | "<" => Self::Lt,
            "lte" | "<=" => Self::Lte,
            "in" => Self::In,
            "not_in" => Self::NotIn,
            "contains" => Self::Contains,
            "starts_with" => Self::StartsWith,
            "exists" => Self::Exists,
            other => {
                return Err(EvaluationError::UnknownOperator {
                    rule: None,
                    op: other.to_owned(),
                });
            }
        })
    }
}

impl ConditionOperator {
    fn check_operand(self, value: &Value) -> Result<(), EvaluationError> {
        match self {
            Self::Gt | Self::Gte | Self::Lt | Self::Lte if !value.is_number() => Err(
                EvaluationError::malformed(format!("`{self:?}` requires a numeric value, got {value}")),
            ),
            Self::In | Self::NotIn if !value.is_array() => Err(EvaluationError::malformed(
                format!("`{self:?}` requires an array value, got {value}"),
            )),
            Self::StartsWith if !value.is_string() => Err(EvaluationError::malformed(format!(
                "`StartsWith` requires a string value, got {value}"
            ))),
            Self::Eq | Self::Ne | Self::Contains if value.is_null() => Err(
                EvaluationError::malformed(format!("`{self:?}` requires a non-null value")),
            ),
            _ => Ok(()),
        }
    }

    fn apply(self, actual: Option<&Value>, expected: &Value) -> bool {
        let actual = actual.filter(|value| !value.is_null());
        match self {
            Self::Exists => actual.is_some(),
            Self::Eq => actual.is_some_and(|value| values_equal(value, expected)),
            Self::Ne => !actual.is_some_and(|value| values_equal(value, expected)),
            Self::Gt | Self::Gte | Self::Lt | Self::Lte => {
                let ordering = actual.and_then(|value| compare_numbers(value, expected));
                match (self, ordering) {
                    (Self::Gt, Some(Ordering::Greater))
                    | (Self::Gte, Some(Ordering::Greater | Ordering::Equal))
                    | (Self::Lt, Some(Ordering::Less))
                    | (Self::Lte, Some(Ordering::Less | Ordering::Equal)) => true,
                    _ => false,
                }
            }
            Self::In => is_member(actual, expected),
            Self::NotIn => !is_member(actual, expected),
            Self::Contains => match actual {
                Some(Value::String(text)) => expected.as_str().is_some_and(|needle| text.contains(needle)),
                Some(Value::Array(items)) => items.iter().any(|item| values_equal(item, expected)),
                _ => false,
            },
            Self::StartsWith => actual
                .and_then(Value::as_str)
                .zip(expected.as_str())
                .is_some_and(|(text, prefix)| text.starts_with(prefix)),
        }
    }
}

fn is_member(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    expected
        .as_array()
        .is_some_and(|items| items.iter().any(|item| values_equal(actual, item)))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if left.is_number() && right.is_number() {
        compare_numbers(left, right) == Some(Ordering::Equal)
    } else {
        left == right
    }
}

/// Integers compare exactly; `f64` is used only when a float is involved.
fn compare_numbers(left: &Value, right: &Value) -> Option<Ordering> {
    let (Value::Number(left), Value::Number(right)) = (left, right) else {
        return None;
    };
    if left.is_f64() || right.is_f64() {
        return left.as_f64()?.partial_cmp(&right.as_f64()?);
    }
    Some(widen(left)?.cmp(&widen(right)?))
}

fn widen(number: &Number) -> Option<i128> {
    number
        .as_i64()
        .map(i128::from)
        .or_else(|| number.as_u64().map(i128::from))
}

/// Rule condition with parsed operators and field paths.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledCondition {
    /// Always matches.
    Always,
    /// Every child must match.
    All(Vec<CompiledCondition>),
    /// At least one child must match.
    Any(Vec<CompiledCondition>),
    /// Inverts the child.
    Not(Box<CompiledCondition>),
    /// Single field comparison.
    Field {
        /// Resolved field.
        path: FieldPath,
        /// Parsed operator.
        op: ConditionOperator,
        /// Comparison value.
        value: Value,
    },
}

impl CompiledCondition {
    /// Compiles a manifest condition.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::UnknownOperator`], [`EvaluationError::UnknownField`],
    /// or [`EvaluationError::MalformedCondition`] for the first malformed leaf.
    pub fn compile(condition: &RuleCondition) -> Result<Self, EvaluationError> {
        Ok(match condition {
            RuleCondition::Always => Self::Always,
            RuleCondition::All(children) => Self::All(compile_all(children)?),
            RuleCondition::Any(children) => Self::Any(compile_all(children)?),
            RuleCondition::Not(child) => Self::Not(Box::new(Self::compile(child)?)),
            RuleCondition::Field(field) => {
                let path = field.path().parse::<FieldPath>()?;
                let op = field.op().parse::<ConditionOperator>()?;
                op.check_operand(field.value())?;
                Self::Field {
                    path,
                    op,
                    value: field.value().clone(),
                }
            }
        })
    }

    /// Evaluates the condition with short-circuiting combinators.
    #[must_use]
    pub fn matches(&self, request: &DecisionRequest) -> bool {
        match self {
            Self::Always => true,
            Self::All(children) => children.iter().all(|child| child.matches(request)),
            Self::Any(children) => children.iter().any(|child| child.matches(request)),
            Self::Not(child) => !child.matches(request),
            Self::Field { path, op, value } => {
                let actual = request.resolve(path);
                op.apply(actual.as_deref(), value)
            }
        }
    }
}

fn compile_all(children: &[RuleCondition]) -> Result<Vec<CompiledCondition>, EvaluationError> {
    children.iter().map(CompiledCondition::compile).collect()
}

/// Evaluates a single condition against a request without a manifest.
///
/// # Errors
///
/// Returns an [`EvaluationError`] when the condition contains an unknown
/// operator, an unknown field, or a comparison value that does not fit its
/// operator.
pub fn evaluate_condition(
    condition: &RuleCondition,
    request: &DecisionRequest,
) -> Result<bool, EvaluationError> {
    Ok(CompiledCondition::compile(condition)?.matches(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ActorContext;
    use serde_json::json;

    fn request() -> DecisionRequest {
        DecisionRequest::new(ActorContext::new("agent-1", "operator"), "credits.spend")
            .on_resource("/api/credits/transfer")
            .with_metadata("amount", json!(250))
            .with_metadata("labels", json!(["batch", "nightly"]))
    }

    fn eval(condition: &RuleCondition) -> bool {
        evaluate_condition(condition, &request()).unwrap()
    }

    #[test]
    fn numeric_and_string_operators() {
        assert!(eval(&RuleCondition::field("request.metadata.amount", ">", json!(100))));
        assert!(!eval(&RuleCondition::field("request.metadata.amount", "lt", json!(100))));
        assert!(eval(&RuleCondition::field("request.metadata.amount", "eq", json!(250.0))));
        assert!(eval(&RuleCondition::field(
            "request.resource",
            "starts_with",
            json!("/api/credits")
        )));
        assert!(eval(&RuleCondition::field(
            "request.metadata.labels",
            "contains",
            json!("nightly")
        )));
        assert!(eval(&RuleCondition::field(
            "actor.role",
            "in",
            json!(["admin", "operator"])
        )));
    }

    #[test]
    fn large_integers_compare_exactly() {
        let request = request()
            .with_metadata("account", json!(9_007_199_254_740_993_u64))
            .with_metadata("offset", json!(-1));
        let eval = |condition: RuleCondition| evaluate_condition(&condition, &request).unwrap();

        assert!(!eval(RuleCondition::field(
            "request.metadata.account",
            "eq",
            json!(9_007_199_254_740_992_u64)
        )));
        assert!(eval(RuleCondition::field(
            "request.metadata.account",
            "ne",
            json!(9_007_199_254_740_992_u64)
        )));
        assert!(eval(RuleCondition::field(
            "request.metadata.account",
            "gt",
            json!(9_007_199_254_740_992_u64)
        )));
        assert!(!eval(RuleCondition::field(
            "request.metadata.account",
            "in",
            json!([9_007_199_254_740_992_u64, 1])
        )));
        assert!(eval(RuleCondition::field("request.metadata.offset", "lt", json!(u64::MAX))));
        assert!(eval(RuleCondition::field("request.metadata.offset", "eq", json!(-1.0))));
    }

    #[test]
    fn absent_fields() {
        assert!(!eval(&RuleCondition::field("request.metadata.missing", "exists", Value::Null)));
        assert!(eval(&RuleCondition::field("request.metadata.missing", "ne", json!(1))));
        assert!(eval(&RuleCondition::field("actor.tenant", "not_in", json!(["a"]))));
        assert!(!eval(&RuleCondition::field("request.metadata.missing", "gte", json!(0))));
    }

    #[test]
    fn combinators_follow_boolean_identities() {
        assert!(eval(&RuleCondition::all([])));
        assert!(!eval(&RuleCondition::any([])));
        assert!(eval(&RuleCondition::any([
            RuleCondition::equals("action", "other"),
            RuleCondition::equals("action", "credits.spend"),
        ])));
        assert!(!eval(&RuleCondition::negate(RuleCondition::Always)));
    }

    #[test]
    fn unknown_operator_and_field_are_errors() {
        let err = evaluate_condition(
            &RuleCondition::field("action", "matches", json!(".*")),
            &request(),
        )
        .unwrap_err();
        assert!(matches!(err, EvaluationError::UnknownOperator { ref op, .. } if op == "matches"));

        let err = evaluate_condition(&RuleCondition::equals("actor.email", "x"), &request())
            .unwrap_err();
        assert!(matches!(err, EvaluationError::UnknownField { .. }));

        let err = evaluate_condition(&RuleCondition::equals("request.metadata", "x"), &request())
            .unwrap_err();
        assert!(matches!(err, EvaluationError::UnknownField { .. }));
    }

    #[test]
    fn operand_shape_is_checked() {
        let err = evaluate_condition(
            &RuleCondition::field("request.metadata.amount", "gt", json!("100")),
            &request(),
        )
        .unwrap_err();
        assert!(matches!(err, EvaluationError::MalformedCondition { .. }));

        let err = CompiledCondition::compile(&RuleCondition::field("actor.role", "in", json!("admin")))
            .unwrap_err();
        assert!(matches!(err, EvaluationError::MalformedCondition { .. }));
    }

    #[test]
    fn field_paths_round_trip_through_display() {
        for raw in ["action", "actor.attributes.clearance.level", "request.metadata.amount"] {
            let path: FieldPath = raw.parse().unwrap();
            assert_eq!(path.to_string(), raw);
        }
        assert!("actor..role".parse::<FieldPath>().is_err());
    }
}

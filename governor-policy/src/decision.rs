//! Decision types returned by the evaluator.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use governor_primitives::{BudgetId, ConstraintSet, RequestId, RiskTier, RuleAction, RuleId};
use serde::{Deserialize, Serialize};

/// Describes the outcome of a governance evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    /// Action is permitted without further intervention.
    Allow,
    /// Action is rejected outright.
    Deny,
    /// Action requires human approval before proceeding.
    Escalate,
}

impl DecisionType {
    /// Returns the lowercase label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Escalate => "escalate",
        }
    }
}

impl Display for DecisionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a decision came out the way it did. Each code implies one decision type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// A matching rule allowed the action.
    RuleAllow,
    /// A matching rule denied the action.
    RuleDeny,
    /// A matching rule escalated the action.
    RuleEscalate,
    /// A matching rule allowed the action, but its tier requires approval.
    RiskEscalation,
    /// The matching rule's budget is used up for the current window.
    BudgetExhausted,
    /// No rule matched; the default allows.
    DefaultAllow,
    /// No rule matched; the default denies.
    DefaultDeny,
    /// No rule matched; the default escalates.
    DefaultEscalate,
}

impl ReasonCode {
    /// Returns the decision type this reason implies.
    #[must_use]
    pub const fn decision(self) -> DecisionType {
        match self {
            Self::RuleAllow | Self::DefaultAllow => DecisionType::Allow,
            Self::RuleDeny | Self::BudgetExhausted | Self::DefaultDeny => DecisionType::Deny,
            Self::RuleEscalate | Self::RiskEscalation | Self::DefaultEscalate => {
                DecisionType::Escalate
            }
        }
    }

    /// Returns the reason for a rule's own action.
    #[must_use]
    pub const fn for_rule(action: RuleAction) -> Self {
        match action {
            RuleAction::Allow => Self::RuleAllow,
            RuleAction::Deny => Self::RuleDeny,
            RuleAction::Escalate => Self::RuleEscalate,
        }
    }

    /// Returns the reason for a defaulted decision.
    #[must_use]
    pub const fn for_default(action: RuleAction) -> Self {
        match action {
            RuleAction::Allow => Self::DefaultAllow,
            RuleAction::Deny => Self::DefaultDeny,
            RuleAction::Escalate => Self::DefaultEscalate,
        }
    }

    /// Returns the stable wire code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RuleAllow => "RULE_ALLOW",
            Self::RuleDeny => "RULE_DENY",
            Self::RuleEscalate => "RULE_ESCALATE",
            Self::RiskEscalation => "RISK_ESCALATION",
            Self::BudgetExhausted => "BUDGET_EXHAUSTED",
            Self::DefaultAllow => "DEFAULT_ALLOW",
            Self::DefaultDeny => "DEFAULT_DENY",
            Self::DefaultEscalate => "DEFAULT_ESCALATE",
        }
    }
}

impl Display for ReasonCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    request_id: RequestId,
    manifest_version: String,
    decision: DecisionType,
    reason: ReasonCode,
    risk_tier: RiskTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    matched_rule: Option<RuleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    budget: Option<BudgetId>,
    #[serde(default)]
    constraints: ConstraintSet,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    required_approvals: Vec<String>,
    decided_at: DateTime<Utc>,
}

impl DecisionResult {
    /// Creates a result whose decision type is derived from `reason`.
    ///
    /// Denials never grant constraints and never require approvals.
    #[must_use]
    pub fn new(
        request_id: RequestId,
        manifest_version: impl Into<String>,
        reason: ReasonCode,
        risk_tier: RiskTier,
    ) -> Self {
        Self {
            request_id,
            manifest_version: manifest_version.into(),
            decision: reason.decision(),
            reason,
            risk_tier,
            matched_rule: None,
            budget: None,
            constraints: ConstraintSet::empty(),
            required_approvals: Vec::new(),
            decided_at: Utc::now(),
        }
    }

    /// Records the rule that decided.
    #[must_use]
    pub fn with_rule(mut self, rule: RuleId) -> Self {
        self.matched_rule = Some(rule);
        self
    }

    /// Records the budget governing the action.
    #[must_use]
    pub fn with_budget(mut self, budget: Option<BudgetId>) -> Self {
        self.budget = budget;
        self
    }

    /// Sets the granted constraints. Ignored for denials.
    #[must_use]
    pub fn with_constraints(mut self, constraints: ConstraintSet) -> Self {
        if !self.is_deny() {
            self.constraints = constraints;
        }
        self
    }

    /// Sets the approvers required for escalations. Ignored otherwise.
    #[must_use]
    pub fn with_required_approvals(mut self, approvers: Vec<String>) -> Self {
        if self.is_escalate() {
            self.required_approvals = approvers;
        }
        self
    }

    /// Converts the result into a budget denial, keeping rule, tier, and budget.
    #[must_use]
    pub fn into_budget_exhausted(mut self) -> Self {
        self.reason = ReasonCode::BudgetExhausted;
        self.decision = DecisionType::Deny;
        self.constraints = ConstraintSet::empty();
        self.required_approvals.clear();
        self
    }

    /// Returns the request identifier.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the version of the manifest that decided.
    #[must_use]
    pub fn manifest_version(&self) -> &str {
        &self.manifest_version
    }

    /// Returns the decision type.
    #[must_use]
    pub const fn decision(&self) -> DecisionType {
        self.decision
    }

    /// Returns the reason code.
    #[must_use]
    pub const fn reason(&self) -> ReasonCode {
        self.reason
    }

    /// Returns the assigned risk tier.
    #[must_use]
    pub const fn risk_tier(&self) -> RiskTier {
        self.risk_tier
    }

    /// Returns the rule that decided, if any.
    #[must_use]
    pub fn matched_rule(&self) -> Option<&RuleId> {
        self.matched_rule.as_ref()
    }

    /// Returns the budget governing the action, if any.
    #[must_use]
    pub fn budget(&self) -> Option<&BudgetId> {
        self.budget.as_ref()
    }

    /// Returns the granted constraints.
    #[must_use]
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Returns approver identifiers required for escalations.
    #[must_use]
    pub fn required_approvals(&self) -> &[String] {
        &self.required_approvals
    }

    /// Returns when the decision was made.
    #[must_use]
    pub const fn decided_at(&self) -> DateTime<Utc> {
        self.decided_at
    }

    /// Returns true when the decision allows the action to proceed.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        self.decision == DecisionType::Allow
    }

    /// Returns true when the decision denies the action.
    #[must_use]
    pub fn is_deny(&self) -> bool {
        self.decision == DecisionType::Deny
    }

    /// Returns true when human approval is required.
    #[must_use]
    pub fn is_escalate(&self) -> bool {
        self.decision == DecisionType::Escalate
    }
}

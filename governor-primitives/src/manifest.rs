//! Versioned governor manifests: risk classes, budgets, and ordered rules.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{Budget, BudgetId, ConstraintSet, Reduction, RiskClass, RiskTier, RuleCondition, RuleId};

/// Outcome a rule prescribes when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Permit the action.
    Allow,
    /// Reject the action.
    Deny,
    /// Hold the action for human approval.
    Escalate,
}

/// Action applied when no rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultAction {
    action: RuleAction,
    risk_tier: RiskTier,
}

impl DefaultAction {
    /// Creates a default action.
    #[must_use]
    pub const fn new(action: RuleAction, risk_tier: RiskTier) -> Self {
        Self { action, risk_tier }
    }

    /// Returns the prescribed action.
    #[must_use]
    pub const fn action(self) -> RuleAction {
        self.action
    }

    /// Returns the tier reported for defaulted decisions.
    #[must_use]
    pub const fn risk_tier(self) -> RiskTier {
        self.risk_tier
    }
}

const fn enabled_by_default() -> bool {
    true
}

/// One policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRule {
    id: RuleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    when: RuleCondition,
    action: RuleAction,
    risk_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    budget: Option<BudgetId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    reductions: Vec<Reduction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    approvers: Vec<String>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

impl ManifestRule {
    /// Creates an enabled rule that always matches.
    #[must_use]
    pub fn new(id: RuleId, risk_class: impl Into<String>, action: RuleAction) -> Self {
        Self {
            id,
            description: None,
            priority: 0,
            when: RuleCondition::Always,
            action,
            risk_class: risk_class.into(),
            budget: None,
            reductions: Vec::new(),
            approvers: Vec::new(),
            enabled: true,
        }
    }

    /// Sets the match condition.
    #[must_use]
    pub fn when(mut self, condition: RuleCondition) -> Self {
        self.when = condition;
        self
    }

    /// Sets the evaluation priority. Higher values are evaluated first.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// References a budget declared in the manifest.
    #[must_use]
    pub fn with_budget(mut self, budget: BudgetId) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Appends a reduction.
    #[must_use]
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reductions.push(reduction);
        self
    }

    /// Sets the approvers required when the rule escalates.
    #[must_use]
    pub fn with_approvers<I, S>(mut self, approvers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.approvers = approvers.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables the rule.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the rule identifier.
    #[must_use]
    pub fn id(&self) -> &RuleId {
        &self.id
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the evaluation priority.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns the match condition.
    #[must_use]
    pub fn condition(&self) -> &RuleCondition {
        &self.when
    }

    /// Returns the prescribed action.
    #[must_use]
    pub const fn action(&self) -> RuleAction {
        self.action
    }

    /// Returns the risk class name.
    #[must_use]
    pub fn risk_class(&self) -> &str {
        &self.risk_class
    }

    /// Returns the rule's own budget reference.
    #[must_use]
    pub fn budget(&self) -> Option<&BudgetId> {
        self.budget.as_ref()
    }

    /// Returns the reductions in declaration order.
    #[must_use]
    pub fn reductions(&self) -> &[Reduction] {
        &self.reductions
    }

    /// Returns the approvers required on escalation.
    #[must_use]
    pub fn approvers(&self) -> &[String] {
        &self.approvers
    }

    /// Returns `true` when the rule takes part in evaluation.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Versioned set of governance rules. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernorManifest {
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    risk_classes: Vec<RiskClass>,
    #[serde(default)]
    budgets: Vec<Budget>,
    #[serde(default)]
    rules: Vec<ManifestRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<DefaultAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    escalation_tier: Option<RiskTier>,
    #[serde(default)]
    base_constraints: ConstraintSet,
}

impl GovernorManifest {
    /// Starts building a manifest with the given version.
    #[must_use]
    pub fn builder(version: impl Into<String>) -> ManifestBuilder {
        ManifestBuilder {
            manifest: Self {
                version: version.into(),
                description: None,
                risk_classes: Vec::new(),
                budgets: Vec::new(),
                rules: Vec::new(),
                default: None,
                escalation_tier: None,
                base_constraints: ConstraintSet::empty(),
            },
        }
    }

    /// Returns the manifest version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns all rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[ManifestRule] {
        &self.rules
    }

    /// Returns the declared budgets.
    #[must_use]
    pub fn budgets(&self) -> &[Budget] {
        &self.budgets
    }

    /// Returns the declared risk classes.
    #[must_use]
    pub fn risk_classes(&self) -> &[RiskClass] {
        &self.risk_classes
    }

    /// Looks up a budget by identifier.
    #[must_use]
    pub fn budget(&self, id: &BudgetId) -> Option<&Budget> {
        self.budgets.iter().find(|budget| budget.id() == id)
    }

    /// Looks up a risk class by name.
    #[must_use]
    pub fn risk_class(&self, name: &str) -> Option<&RiskClass> {
        self.risk_classes.iter().find(|class| class.name() == name)
    }

    /// Returns the default action, if configured.
    #[must_use]
    pub const fn default_action(&self) -> Option<DefaultAction> {
        self.default
    }

    /// Returns the tier at or above which allowed actions escalate.
    #[must_use]
    pub const fn escalation_tier(&self) -> Option<RiskTier> {
        self.escalation_tier
    }

    /// Returns the permissive base constraint set.
    #[must_use]
    pub fn base_constraints(&self) -> &ConstraintSet {
        &self.base_constraints
    }

    /// Returns enabled rules in evaluation order: descending priority, ties in
    /// declaration order.
    #[must_use]
    pub fn ordered_rules(&self) -> Vec<&ManifestRule> {
        let mut rules: Vec<&ManifestRule> =
            self.rules.iter().filter(|rule| rule.is_enabled()).collect();
        rules.sort_by(|a, b| b.priority().cmp(&a.priority()));
        rules
    }

    /// Returns the tier of the rule's risk class.
    #[must_use]
    pub fn rule_tier(&self, rule: &ManifestRule) -> Option<RiskTier> {
        self.risk_class(rule.risk_class()).map(RiskClass::tier)
    }

    /// Resolves the budget governing a rule: its own reference, else its class's.
    #[must_use]
    pub fn effective_budget(&self, rule: &ManifestRule) -> Option<&Budget> {
        rule.budget()
            .or_else(|| {
                self.risk_class(rule.risk_class())
                    .and_then(RiskClass::budget)
            })
            .and_then(|id| self.budget(id))
    }

    /// Validates structure and cross references.
    ///
    /// Conditions are not checked here; they are compiled by the evaluator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] for an empty version, duplicate
    /// identifiers, or dangling references; [`Error::InvalidBudget`] and
    /// [`Error::InvalidReduction`] for malformed budgets and reductions.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::manifest("manifest version cannot be empty"));
        }

        let mut budget_ids = HashSet::new();
        for budget in &self.budgets {
            budget.validate()?;
            if !budget_ids.insert(budget.id()) {
                return Err(Error::manifest(format!(
                    "duplicate budget id `{}`",
                    budget.id()
                )));
            }
        }

        let mut class_names = HashSet::new();
        for class in &self.risk_classes {
            if class.name().trim().is_empty() {
                return Err(Error::manifest("risk class name cannot be empty"));
            }
            if !class_names.insert(class.name()) {
                return Err(Error::manifest(format!(
                    "duplicate risk class `{}`",
                    class.name()
                )));
            }
            if let Some(budget) = class.budget() {
                if !budget_ids.contains(budget) {
                    return Err(Error::manifest(format!(
                        "risk class `{}` references unknown budget `{budget}`",
                        class.name()
                    )));
                }
            }
        }

        let mut rule_ids = HashSet::new();
        for rule in &self.rules {
            if !rule_ids.insert(rule.id()) {
                return Err(Error::manifest(format!("duplicate rule id `{}`", rule.id())));
            }
            if !class_names.contains(rule.risk_class()) {
                return Err(Error::manifest(format!(
                    "rule `{}` references unknown risk class `{}`",
                    rule.id(),
                    rule.risk_class()
                )));
            }
            if let Some(budget) = rule.budget() {
                if !budget_ids.contains(budget) {
                    return Err(Error::manifest(format!(
                        "rule `{}` references unknown budget `{budget}`",
                        rule.id()
                    )));
                }
            }
            for reduction in rule.reductions() {
                reduction.validate()?;
            }
        }

        Ok(())
    }
}

/// Builder for [`GovernorManifest`].
#[derive(Debug)]
pub struct ManifestBuilder {
    manifest: GovernorManifest,
}

impl ManifestBuilder {
    /// Sets an optional description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.manifest.description = Some(description.into());
        self
    }

    /// Declares a risk class.
    #[must_use]
    pub fn risk_class(mut self, class: RiskClass) -> Self {
        self.manifest.risk_classes.push(class);
        self
    }

    /// Declares a budget.
    #[must_use]
    pub fn budget(mut self, budget: Budget) -> Self {
        self.manifest.budgets.push(budget);
        self
    }

    /// Appends a rule.
    #[must_use]
    pub fn rule(mut self, rule: ManifestRule) -> Self {
        self.manifest.rules.push(rule);
        self
    }

    /// Sets the action applied when no rule matches.
    #[must_use]
    pub fn default_action(mut self, action: RuleAction, risk_tier: RiskTier) -> Self {
        self.manifest.default = Some(DefaultAction::new(action, risk_tier));
        self
    }

    /// Sets the tier at or above which allowed actions escalate.
    #[must_use]
    pub fn escalation_tier(mut self, tier: RiskTier) -> Self {
        self.manifest.escalation_tier = Some(tier);
        self
    }

    /// Sets the permissive base constraint set.
    #[must_use]
    pub fn base_constraints(mut self, constraints: ConstraintSet) -> Self {
        self.manifest.base_constraints = constraints;
        self
    }

    /// Consumes the builder and returns a validated manifest.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`GovernorManifest::validate`].
    pub fn build(self) -> Result<GovernorManifest> {
        self.manifest.validate()?;
        Ok(self.manifest)
    }
}

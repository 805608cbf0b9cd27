//! The decision evaluator.

use std::sync::Arc;

use governor_primitives::{Budget, GovernorManifest, ManifestRule, RiskTier, RuleAction};
use tracing::debug;

use crate::conditions::CompiledCondition;
use crate::contracts::DecisionRequest;
use crate::decision::{DecisionResult, ReasonCode};
use crate::error::{ManifestError, PolicyResult};
use crate::reducer::ConstraintReducer;

/// Read access to budget consumption, resolved before each decision.
pub trait BudgetView {
    /// Returns how much of `budget` has been consumed in its current window.
    fn consumed(&self, budget: &Budget) -> u64;
}

/// Budget view that reports nothing consumed. Useful for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnmeteredBudgets;

impl BudgetView for UnmeteredBudgets {
    fn consumed(&self, _budget: &Budget) -> u64 {
        0
    }
}

#[derive(Debug)]
struct CompiledRule {
    index: usize,
    tier: RiskTier,
    condition: CompiledCondition,
}

/// Evaluates decision requests against one compiled manifest.
///
/// Rules are tried in descending priority, ties in declaration order, and the
/// first match decides. Reductions from every matching rule narrow the granted
/// constraints, in the same order.
#[derive(Debug)]
pub struct DecisionEvaluator {
    manifest: Arc<GovernorManifest>,
    rules: Vec<CompiledRule>,
    reducer: ConstraintReducer,
}

impl DecisionEvaluator {
    /// Validates the manifest and compiles its conditions.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Invalid`] for structural problems, including
    /// widening reductions, and an [`EvaluationError`](crate::EvaluationError)
    /// naming the rule for malformed conditions.
    pub fn new(manifest: Arc<GovernorManifest>) -> PolicyResult<Self> {
        manifest.validate().map_err(ManifestError::from)?;

        let mut order: Vec<(usize, &ManifestRule)> = manifest
            .rules()
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.is_enabled())
            .collect();
        order.sort_by(|(_, a), (_, b)| b.priority().cmp(&a.priority()));

        let mut rules = Vec::with_capacity(order.len());
        for (index, rule) in order {
            let condition = CompiledCondition::compile(rule.condition())
                .map_err(|err| err.in_rule(rule.id()))?;
            let tier = manifest.rule_tier(rule).ok_or_else(|| {
                ManifestError::from(governor_primitives::Error::manifest(format!(
                    "rule `{}` has no risk tier",
                    rule.id()
                )))
            })?;
            rules.push(CompiledRule {
                index,
                tier,
                condition,
            });
        }

        let reducer = ConstraintReducer::new(manifest.base_constraints().clone());
        Ok(Self {
            manifest,
            rules,
            reducer,
        })
    }

    /// Returns the manifest being evaluated.
    #[must_use]
    pub fn manifest(&self) -> &Arc<GovernorManifest> {
        &self.manifest
    }

    /// Returns the manifest version.
    #[must_use]
    pub fn version(&self) -> &str {
        self.manifest.version()
    }

    /// Returns every enabled rule matching the request, in evaluation order.
    pub fn matching_rules<'a>(
        &'a self,
        request: &'a DecisionRequest,
    ) -> impl Iterator<Item = &'a ManifestRule> + 'a {
        self.rules
            .iter()
            .filter(|compiled| compiled.condition.matches(request))
            .map(|compiled| &self.manifest.rules()[compiled.index])
    }

    /// Evaluates the request.
    ///
    /// Budgets are resolved through `budgets` before deciding: an allow or
    /// escalate whose count budget is used up becomes a
    /// [`ReasonCode::BudgetExhausted`] denial.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::NoMatchingRule`] when nothing matches and no
    /// default action is configured.
    pub fn evaluate(
        &self,
        request: &DecisionRequest,
        budgets: &dyn BudgetView,
    ) -> PolicyResult<DecisionResult> {
        let matched: Vec<&CompiledRule> = self
            .rules
            .iter()
            .filter(|compiled| compiled.condition.matches(request))
            .collect();

        let Some(first) = matched.first() else {
            return self.apply_default(request);
        };
        let rule = &self.manifest.rules()[first.index];
        let budget = self.manifest.effective_budget(rule);
        debug!(
            request_id = %request.request_id(),
            rule = %rule.id(),
            action = request.action(),
            matches = matched.len(),
            "governor rule matched"
        );

        let reason = match rule.action() {
            RuleAction::Deny => ReasonCode::RuleDeny,
            _ if budget.is_some_and(|budget| is_exhausted(budget, budgets)) => {
                ReasonCode::BudgetExhausted
            }
            RuleAction::Allow
                if self
                    .manifest
                    .escalation_tier()
                    .is_some_and(|threshold| first.tier >= threshold) =>
            {
                ReasonCode::RiskEscalation
            }
            action => ReasonCode::for_rule(action),
        };

        let mut result = DecisionResult::new(
            request.request_id(),
            self.manifest.version(),
            reason,
            first.tier,
        )
        .with_rule(rule.id().clone())
        .with_budget(budget.map(|budget| budget.id().clone()))
        .with_required_approvals(rule.approvers().to_vec());

        if !result.is_deny() {
            let reductions = matched
                .iter()
                .flat_map(|compiled| self.manifest.rules()[compiled.index].reductions());
            let outcome = self.reducer.reduce(reductions)?;
            debug!(
                request_id = %request.request_id(),
                applied = outcome.applied(),
                unchanged = outcome.unchanged(),
                "constraints reduced"
            );
            result = result.with_constraints(outcome.into_constraints());
        }

        Ok(result)
    }

    fn apply_default(&self, request: &DecisionRequest) -> PolicyResult<DecisionResult> {
        let Some(default) = self.manifest.default_action() else {
            return Err(ManifestError::NoMatchingRule {
                request_id: request.request_id(),
                version: self.manifest.version().to_owned(),
            }
            .into());
        };

        debug!(
            request_id = %request.request_id(),
            action = request.action(),
            "no governor rule matched, applying default"
        );
        Ok(DecisionResult::new(
            request.request_id(),
            self.manifest.version(),
            ReasonCode::for_default(default.action()),
            default.risk_tier(),
        )
        .with_constraints(self.reducer.base().clone()))
    }
}

fn is_exhausted(budget: &Budget, budgets: &dyn BudgetView) -> bool {
    budget
        .max_count()
        .is_some_and(|max| budgets.consumed(budget) >= max)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use governor_primitives::{BudgetId, ConstraintSet, Reduction, RiskClass, RuleCondition, RuleId};
    use serde_json::json;

    use super::*;
    use crate::contracts::ActorContext;
    use crate::decision::DecisionType;
    use crate::error::DecisionError;

    struct FixedBudgets(HashMap<String, u64>);

    impl BudgetView for FixedBudgets {
        fn consumed(&self, budget: &Budget) -> u64 {
            self.0.get(budget.id().as_str()).copied().unwrap_or_default()
        }
    }

    fn rule(id: &str, class: &str, action: RuleAction) -> ManifestRule {
        ManifestRule::new(RuleId::new(id).unwrap(), class, action)
    }

    fn manifest() -> GovernorManifest {
        let missions = BudgetId::new("missions").unwrap();
        GovernorManifest::builder("2026.10")
            .risk_class(RiskClass::new("routine", RiskTier::Low))
            .risk_class(RiskClass::new("fleet", RiskTier::High).with_budget(missions.clone()))
            .risk_class(RiskClass::new("safety", RiskTier::Critical))
            .budget(Budget::count(missions, RiskTier::High, 2))
            .base_constraints(
                ConstraintSet::empty()
                    .with_limit("max_robots", 10)
                    .with_flag("network_access", true),
            )
            .rule(
                rule("deny-guests", "safety", RuleAction::Deny)
                    .with_priority(100)
                    .when(RuleCondition::equals("actor.role", "guest")),
            )
            .rule(
                rule("dispatch", "fleet", RuleAction::Allow)
                    .when(RuleCondition::equals("action", "mission.dispatch"))
                    .with_reduction(Reduction::CapLimit {
                        key: "max_robots".into(),
                        max: 4,
                    }),
            )
            .rule(
                rule("offline-dispatch", "routine", RuleAction::Allow)
                    .when(RuleCondition::field(
                        "request.metadata.offline",
                        "eq",
                        json!(true),
                    ))
                    .with_reduction(Reduction::Disable {
                        flag: "network_access".into(),
                    }),
            )
            .rule(
                rule("override", "safety", RuleAction::Escalate)
                    .when(RuleCondition::equals("action", "safety.override"))
                    .with_approvers(["safety-officer"]),
            )
            .default_action(RuleAction::Deny, RiskTier::Medium)
            .build()
            .unwrap()
    }

    fn evaluator(manifest: GovernorManifest) -> DecisionEvaluator {
        DecisionEvaluator::new(Arc::new(manifest)).unwrap()
    }

    fn request(role: &str, action: &str) -> DecisionRequest {
        DecisionRequest::new(ActorContext::new("agent-1", role), action)
    }

    #[test]
    fn highest_priority_match_decides() {
        let evaluator = evaluator(manifest());
        let result = evaluator
            .evaluate(&request("guest", "mission.dispatch"), &UnmeteredBudgets)
            .unwrap();

        assert_eq!(result.decision(), DecisionType::Deny);
        assert_eq!(result.reason(), ReasonCode::RuleDeny);
        assert_eq!(result.matched_rule().map(RuleId::as_str), Some("deny-guests"));
        assert_eq!(result.risk_tier(), RiskTier::Critical);
        assert!(result.constraints().is_empty());
    }

    #[test]
    fn allowed_decision_carries_reductions_from_all_matches() {
        let evaluator = evaluator(manifest());
        let request = request("operator", "mission.dispatch").with_metadata("offline", json!(true));
        let result = evaluator.evaluate(&request, &UnmeteredBudgets).unwrap();

        assert_eq!(result.reason(), ReasonCode::RuleAllow);
        assert_eq!(result.matched_rule().map(RuleId::as_str), Some("dispatch"));
        assert_eq!(result.budget().map(BudgetId::as_str), Some("missions"));
        assert_eq!(result.constraints().limit("max_robots"), Some(4));
        assert_eq!(result.constraints().flag("network_access"), Some(false));
        assert!(result
            .constraints()
            .is_within(evaluator.manifest().base_constraints()));
        assert_eq!(evaluator.matching_rules(&request).count(), 2);
    }

    #[test]
    fn exhausted_budget_denies() {
        let evaluator = evaluator(manifest());
        let budgets = FixedBudgets(HashMap::from([("missions".to_owned(), 2)]));
        let result = evaluator
            .evaluate(&request("operator", "mission.dispatch"), &budgets)
            .unwrap();

        assert!(result.is_deny());
        assert_eq!(result.reason(), ReasonCode::BudgetExhausted);
        assert_eq!(result.matched_rule().map(RuleId::as_str), Some("dispatch"));
    }

    #[test]
    fn escalation_carries_approvers() {
        let evaluator = evaluator(manifest());
        let result = evaluator
            .evaluate(&request("operator", "safety.override"), &UnmeteredBudgets)
            .unwrap();

        assert!(result.is_escalate());
        assert_eq!(result.reason(), ReasonCode::RuleEscalate);
        assert_eq!(result.required_approvals(), ["safety-officer"]);
    }

    #[test]
    fn risk_tier_threshold_escalates_allows() {
        let manifest = GovernorManifest::builder("tiered")
            .risk_class(RiskClass::new("fleet", RiskTier::High))
            .rule(rule("dispatch", "fleet", RuleAction::Allow))
            .escalation_tier(RiskTier::High)
            .build()
            .unwrap();
        let result = evaluator(manifest)
            .evaluate(&request("operator", "mission.dispatch"), &UnmeteredBudgets)
            .unwrap();

        assert_eq!(result.reason(), ReasonCode::RiskEscalation);
    }

    #[test]
    fn default_applies_when_nothing_matches() {
        let evaluator = evaluator(manifest());
        let result = evaluator
            .evaluate(&request("operator", "credits.read"), &UnmeteredBudgets)
            .unwrap();

        assert_eq!(result.reason(), ReasonCode::DefaultDeny);
        assert_eq!(result.risk_tier(), RiskTier::Medium);
        assert!(result.matched_rule().is_none());
    }

    #[test]
    fn missing_default_is_a_manifest_error() {
        let manifest = GovernorManifest::builder("no-default")
            .risk_class(RiskClass::new("routine", RiskTier::Low))
            .rule(rule("only", "routine", RuleAction::Allow).when(RuleCondition::equals("action", "x")))
            .build()
            .unwrap();
        let err = evaluator(manifest)
            .evaluate(&request("operator", "y"), &UnmeteredBudgets)
            .unwrap_err();

        assert!(matches!(
            err,
            DecisionError::Manifest(ManifestError::NoMatchingRule { .. })
        ));
    }

    #[test]
    fn malformed_condition_fails_compilation() {
        let manifest = GovernorManifest::builder("broken")
            .risk_class(RiskClass::new("routine", RiskTier::Low))
            .rule(
                rule("bad-op", "routine", RuleAction::Allow)
                    .when(RuleCondition::field("action", "like", json!("x"))),
            )
            .build()
            .unwrap();
        let err = DecisionEvaluator::new(Arc::new(manifest)).unwrap_err();

        let DecisionError::Evaluation(err) = err else {
            panic!("expected evaluation error");
        };
        assert_eq!(err.rule().map(RuleId::as_str), Some("bad-op"));
    }

    #[test]
    fn every_request_yields_one_result_with_a_default() {
        let evaluator = evaluator(manifest());
        for (role, action) in [
            ("guest", "anything"),
            ("operator", "mission.dispatch"),
            ("operator", "safety.override"),
            ("viewer", "credits.read"),
        ] {
            let result = evaluator
                .evaluate(&request(role, action), &UnmeteredBudgets)
                .unwrap();
            assert_eq!(result.reason().decision(), result.decision());
        }
    }
}

//! Risk tiers and the named risk classes that map onto them.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::BudgetId;

/// Severity bucket assigned to an action. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Routine actions.
    Low,
    /// Actions with bounded, recoverable impact.
    Medium,
    /// Actions with significant impact.
    High,
    /// Irreversible or safety-relevant actions.
    Critical,
}

impl RiskTier {
    /// Returns the lowercase label used in manifests and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl Display for RiskTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named risk class declared in a manifest.
///
/// Rules reference classes by name; the class supplies the tier and, optionally,
/// a budget that applies to every rule in the class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskClass {
    name: String,
    tier: RiskTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    budget: Option<BudgetId>,
}

impl RiskClass {
    /// Creates a class with the given name and tier.
    #[must_use]
    pub fn new(name: impl Into<String>, tier: RiskTier) -> Self {
        Self {
            name: name.into(),
            tier,
            budget: None,
        }
    }

    /// Attaches a default budget to the class.
    #[must_use]
    pub fn with_budget(mut self, budget: BudgetId) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Returns the class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tier assigned to the class.
    #[must_use]
    pub const fn tier(&self) -> RiskTier {
        self.tier
    }

    /// Returns the class-wide budget, if any.
    #[must_use]
    pub fn budget(&self) -> Option<&BudgetId> {
        self.budget.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_ordered_by_severity() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::High < RiskTier::Critical);
        assert_eq!(
            [RiskTier::High, RiskTier::Low].iter().max(),
            Some(&RiskTier::High)
        );
    }

    #[test]
    fn tier_serializes_snake_case() {
        let json = serde_json::to_string(&RiskTier::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
    }
}

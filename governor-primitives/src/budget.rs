//! Budgets: consumable allowances gating repeated or long-running actions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{BudgetId, RiskTier};

/// What a budget limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BudgetLimit {
    /// Number of allowed decisions per window.
    Count {
        /// Maximum number of consumptions per window.
        max: u64,
    },
    /// Wall-clock allowance for a single monitored operation.
    Time {
        /// Soft limit in milliseconds; the grace period extends it.
        limit_ms: u64,
    },
}

/// Resource or time allowance tied to a risk tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    id: BudgetId,
    tier: RiskTier,
    limit: BudgetLimit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    window_ms: Option<u64>,
    #[serde(default)]
    grace_period_ms: u64,
}

impl Budget {
    /// Creates a count budget allowing `max` consumptions.
    #[must_use]
    pub fn count(id: BudgetId, tier: RiskTier, max: u64) -> Self {
        Self {
            id,
            tier,
            limit: BudgetLimit::Count { max },
            window_ms: None,
            grace_period_ms: 0,
        }
    }

    /// Creates a time budget with the given soft limit.
    #[must_use]
    pub fn time(id: BudgetId, tier: RiskTier, limit: Duration) -> Self {
        Self {
            id,
            tier,
            limit: BudgetLimit::Time {
                limit_ms: duration_ms(limit),
            },
            window_ms: None,
            grace_period_ms: 0,
        }
    }

    /// Sets the window after which count consumption resets.
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window_ms = Some(duration_ms(window));
        self
    }

    /// Sets the grace period applied past a time limit.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace_period_ms = duration_ms(grace);
        self
    }

    /// Returns the budget identifier.
    #[must_use]
    pub fn id(&self) -> &BudgetId {
        &self.id
    }

    /// Returns the tier the budget is tied to.
    #[must_use]
    pub const fn tier(&self) -> RiskTier {
        self.tier
    }

    /// Returns the limit definition.
    #[must_use]
    pub const fn limit(&self) -> BudgetLimit {
        self.limit
    }

    /// Returns the maximum count for count budgets.
    #[must_use]
    pub const fn max_count(&self) -> Option<u64> {
        match self.limit {
            BudgetLimit::Count { max } => Some(max),
            BudgetLimit::Time { .. } => None,
        }
    }

    /// Returns the soft time limit for time budgets.
    #[must_use]
    pub const fn time_limit(&self) -> Option<Duration> {
        match self.limit {
            BudgetLimit::Time { limit_ms } => Some(Duration::from_millis(limit_ms)),
            BudgetLimit::Count { .. } => None,
        }
    }

    /// Returns the consumption window, if the budget resets.
    #[must_use]
    pub fn window(&self) -> Option<Duration> {
        self.window_ms.map(Duration::from_millis)
    }

    /// Returns the grace period.
    #[must_use]
    pub const fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Validates limit and window values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBudget`] for zero limits or zero windows.
    pub fn validate(&self) -> Result<()> {
        let zero_limit = match self.limit {
            BudgetLimit::Count { max } => max == 0,
            BudgetLimit::Time { limit_ms } => limit_ms == 0,
        };
        if zero_limit {
            return Err(self.invalid("limit must be greater than zero"));
        }
        if self.window_ms == Some(0) {
            return Err(self.invalid("window must be greater than zero"));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> Error {
        Error::InvalidBudget {
            budget: self.id.to_string(),
            reason: reason.into(),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

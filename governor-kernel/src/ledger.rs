//! Count budget consumption with fixed windows.

use dashmap::DashMap;
use governor_policy::BudgetView;
use governor_primitives::{Budget, BudgetId};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    consumed: u64,
}

impl Window {
    fn open(now: Instant) -> Self {
        Self {
            started: now,
            consumed: 0,
        }
    }

    fn expired(&self, budget: &Budget, now: Instant) -> bool {
        budget
            .window()
            .is_some_and(|window| now.duration_since(self.started) >= window)
    }
}

/// Per-budget consumption counters.
///
/// Each key is guarded by its shard lock, so a check and its increment happen
/// together. Windows reset once the budget's window has elapsed since the
/// first consumption in it; budgets without a window never reset.
#[derive(Debug, Default)]
pub struct BudgetLedger {
    windows: DashMap<BudgetId, Window>,
}

impl BudgetLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one unit of a count budget and returns what is left.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotCountBudget`] for time budgets and
    /// [`LedgerError::Exhausted`] when the window is used up; nothing is
    /// consumed in either case.
    pub fn try_consume(&self, budget: &Budget) -> LedgerResult<u64> {
        let max = budget
            .max_count()
            .ok_or_else(|| LedgerError::NotCountBudget {
                budget: budget.id().clone(),
            })?;
        let now = Instant::now();

        let mut window = self
            .windows
            .entry(budget.id().clone())
            .or_insert_with(|| Window::open(now));
        if window.expired(budget, now) {
            debug!(budget = %budget.id(), "budget window reset");
            *window = Window::open(now);
        }
        if window.consumed >= max {
            return Err(LedgerError::Exhausted {
                budget: budget.id().clone(),
                max,
            });
        }
        window.consumed += 1;
        let remaining = max - window.consumed;
        trace!(budget = %budget.id(), remaining, "budget consumed");
        Ok(remaining)
    }

    /// Returns the amount consumed in the current window.
    #[must_use]
    pub fn consumed_in_window(&self, budget: &Budget) -> u64 {
        let now = Instant::now();
        self.windows
            .get(budget.id())
            .filter(|window| !window.expired(budget, now))
            .map_or(0, |window| window.consumed)
    }

    /// Returns how many units are left, or `None` for time budgets.
    #[must_use]
    pub fn remaining(&self, budget: &Budget) -> Option<u64> {
        budget
            .max_count()
            .map(|max| max.saturating_sub(self.consumed_in_window(budget)))
    }

    /// Clears the window for one budget.
    pub fn reset(&self, budget: &BudgetId) {
        self.windows.remove(budget);
    }
}

impl BudgetView for BudgetLedger {
    fn consumed(&self, budget: &Budget) -> u64 {
        self.consumed_in_window(budget)
    }
}

/// Errors raised by the ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The budget limits time, not count.
    #[error("budget `{budget}` is not a count budget")]
    NotCountBudget {
        /// Offending budget.
        budget: BudgetId,
    },
    /// The current window is used up.
    #[error("budget `{budget}` exhausted ({max} per window)")]
    Exhausted {
        /// Exhausted budget.
        budget: BudgetId,
        /// Configured maximum.
        max: u64,
    },
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use governor_primitives::RiskTier;

    use super::*;

    fn budget(max: u64) -> Budget {
        Budget::count(BudgetId::new("deploys").unwrap(), RiskTier::Medium, max)
    }

    #[test]
    fn exhausts_after_max() {
        let ledger = BudgetLedger::new();
        let budget = budget(2);

        assert_eq!(ledger.try_consume(&budget).unwrap(), 1);
        assert_eq!(ledger.try_consume(&budget).unwrap(), 0);
        assert_eq!(
            ledger.try_consume(&budget).unwrap_err(),
            LedgerError::Exhausted {
                budget: budget.id().clone(),
                max: 2
            }
        );
        assert_eq!(ledger.consumed(&budget), 2);
        assert_eq!(ledger.remaining(&budget), Some(0));

        ledger.reset(budget.id());
        assert_eq!(ledger.remaining(&budget), Some(2));
    }

    #[test]
    fn time_budgets_are_not_counted() {
        let ledger = BudgetLedger::new();
        let budget = Budget::time(
            BudgetId::new("mission").unwrap(),
            RiskTier::High,
            Duration::from_secs(1),
        );
        assert!(matches!(
            ledger.try_consume(&budget),
            Err(LedgerError::NotCountBudget { .. })
        ));
        assert_eq!(ledger.remaining(&budget), None);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_elapsing() {
        let ledger = BudgetLedger::new();
        let budget = budget(1).with_window(Duration::from_secs(60));

        ledger.try_consume(&budget).unwrap();
        assert!(ledger.try_consume(&budget).is_err());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(ledger.try_consume(&budget).is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(ledger.consumed(&budget), 0);
        assert_eq!(ledger.try_consume(&budget).unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumption_never_over_commits() {
        let ledger = Arc::new(BudgetLedger::new());
        let budget = Arc::new(budget(25));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let ledger = Arc::clone(&ledger);
            let budget = Arc::clone(&budget);
            handles.push(tokio::spawn(async move { ledger.try_consume(&budget).is_ok() }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 25);
        assert_eq!(ledger.consumed(&budget), 25);
    }
}

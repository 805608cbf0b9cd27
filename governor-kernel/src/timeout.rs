//! Time budget enforcement with cooperative cancellation.
//!
//! A monitored operation receives a [`CancellationSignal`] that fires when the
//! budget's limit is reached. The operation may still finish during the grace
//! period; once limit plus grace has passed it is dropped and
//! [`BudgetTimeoutExceededError`] is returned.

use std::future::Future;
use std::time::Duration;

use governor_primitives::{Budget, BudgetId};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::warn;

/// Soft-deadline notification handed to monitored operations.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    /// Returns a signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Returns `true` once the soft deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes when the soft deadline passes. Pending forever for signals
    /// that can no longer fire.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// An operation outlived its budget's limit plus grace period.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "budget `{budget}` exceeded: {elapsed:?} elapsed against a {limit:?} limit with {grace:?} grace"
)]
pub struct BudgetTimeoutExceededError {
    /// Budget that was breached.
    pub budget: BudgetId,
    /// Soft limit.
    pub limit: Duration,
    /// Grace period past the limit.
    pub grace: Duration,
    /// Time elapsed when the operation was cut off.
    pub elapsed: Duration,
}

/// Races operations against their time budgets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutEnforcer {
    minimum_grace: Duration,
}

impl TimeoutEnforcer {
    /// Creates an enforcer that uses each budget's own grace period.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            minimum_grace: Duration::ZERO,
        }
    }

    /// Sets a floor for grace periods shorter than `grace`.
    #[must_use]
    pub const fn with_minimum_grace(mut self, grace: Duration) -> Self {
        self.minimum_grace = grace;
        self
    }

    /// Returns the grace period applied to `budget`.
    #[must_use]
    pub fn grace_for(&self, budget: &Budget) -> Duration {
        budget.grace().max(self.minimum_grace)
    }

    /// Runs `operation` under `budget`.
    ///
    /// Count budgets are not time-enforced: the operation runs to completion
    /// with a signal that never fires.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetTimeoutExceededError`] when the operation is still
    /// running after limit plus grace.
    pub async fn enforce<F, Fut, T>(
        &self,
        budget: &Budget,
        operation: F,
    ) -> Result<T, BudgetTimeoutExceededError>
    where
        F: FnOnce(CancellationSignal) -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(limit) = budget.time_limit() else {
            return Ok(operation(CancellationSignal::never()).await);
        };
        let grace = self.grace_for(budget);
        let started = Instant::now();

        let (tx, rx) = watch::channel(false);
        let operation = operation(CancellationSignal { rx });
        let soft = sleep(limit);
        let hard = sleep_until(started + limit.saturating_add(grace));
        tokio::pin!(operation, soft, hard);

        let mut signalled = false;
        loop {
            tokio::select! {
                biased;
                output = &mut operation => return Ok(output),
                () = &mut soft, if !signalled => {
                    signalled = true;
                    tx.send_replace(true);
                    warn!(budget = %budget.id(), ?limit, ?grace, "time budget reached, signalling cancellation");
                }
                () = &mut hard => {
                    let elapsed = started.elapsed();
                    warn!(budget = %budget.id(), ?elapsed, "grace period expired, dropping operation");
                    return Err(BudgetTimeoutExceededError {
                        budget: budget.id().clone(),
                        limit,
                        grace,
                        elapsed,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use governor_primitives::RiskTier;

    use super::*;

    fn budget(limit_ms: u64, grace_ms: u64) -> Budget {
        Budget::time(
            BudgetId::new("mission").unwrap(),
            RiskTier::High,
            Duration::from_millis(limit_ms),
        )
        .with_grace(Duration::from_millis(grace_ms))
    }

    #[tokio::test(start_paused = true)]
    async fn fast_operation_returns_output() {
        let output = TimeoutEnforcer::new()
            .enforce(&budget(100, 50), |signal| async move {
                sleep(Duration::from_millis(20)).await;
                (signal.is_cancelled(), 7)
            })
            .await
            .unwrap();
        assert_eq!(output, (false, 7));
    }

    #[tokio::test(start_paused = true)]
    async fn finishing_within_grace_succeeds_after_signal() {
        let output = TimeoutEnforcer::new()
            .enforce(&budget(100, 50), |signal| async move {
                signal.cancelled().await;
                sleep(Duration::from_millis(10)).await;
                "wound down"
            })
            .await
            .unwrap();
        assert_eq!(output, "wound down");
    }

    #[tokio::test(start_paused = true)]
    async fn completion_exactly_at_deadline_is_not_a_breach() {
        let result = TimeoutEnforcer::new()
            .enforce(&budget(100, 50), |_| sleep(Duration::from_millis(150)))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn exceeding_grace_fails_with_details() {
        let err = TimeoutEnforcer::new()
            .enforce(&budget(100, 50), |_| sleep(Duration::from_secs(10)))
            .await
            .unwrap_err();

        assert_eq!(err.budget.as_str(), "mission");
        assert_eq!(err.limit, Duration::from_millis(100));
        assert_eq!(err.grace, Duration::from_millis(50));
        assert_eq!(err.elapsed, Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn minimum_grace_extends_short_grace() {
        let enforcer = TimeoutEnforcer::new().with_minimum_grace(Duration::from_millis(500));
        let result = enforcer
            .enforce(&budget(100, 0), |_| sleep(Duration::from_millis(400)))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn count_budgets_are_not_timed() {
        let budget = Budget::count(BudgetId::new("calls").unwrap(), RiskTier::Low, 3);
        let result = TimeoutEnforcer::new()
            .enforce(&budget, |signal| async move {
                sleep(Duration::from_secs(3600)).await;
                signal.is_cancelled()
            })
            .await;
        assert_eq!(result, Ok(false));
    }
}

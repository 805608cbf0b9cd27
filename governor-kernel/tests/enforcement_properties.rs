//! Property tests for time budget enforcement under a paused clock.

use std::time::Duration;

use governor_kernel::TimeoutEnforcer;
use governor_primitives::{Budget, BudgetId, RiskTier};
use proptest::prelude::*;
use tokio::runtime::{Builder, Runtime};
use tokio::time::sleep;

fn paused_runtime() -> Runtime {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn cut_off_exactly_when_run_exceeds_limit_plus_grace(
        limit_ms in 1..500_u64,
        grace_ms in 0..200_u64,
        minimum_grace_ms in 0..200_u64,
        run_ms in 0..1_000_u64,
    ) {
        let budget = Budget::time(
            BudgetId::new("mission").unwrap(),
            RiskTier::High,
            Duration::from_millis(limit_ms),
        )
        .with_grace(Duration::from_millis(grace_ms));
        let enforcer =
            TimeoutEnforcer::new().with_minimum_grace(Duration::from_millis(minimum_grace_ms));
        let allowed = limit_ms + grace_ms.max(minimum_grace_ms);

        let outcome = paused_runtime().block_on(enforcer.enforce(&budget, |signal| async move {
            sleep(Duration::from_millis(run_ms)).await;
            signal.is_cancelled()
        }));

        match outcome {
            Ok(signalled) => {
                prop_assert!(run_ms <= allowed);
                prop_assert_eq!(signalled, run_ms > limit_ms);
            }
            Err(exceeded) => {
                prop_assert!(run_ms > allowed);
                prop_assert_eq!(exceeded.elapsed, Duration::from_millis(allowed));
                prop_assert_eq!(exceeded.limit, Duration::from_millis(limit_ms));
            }
        }
    }
}

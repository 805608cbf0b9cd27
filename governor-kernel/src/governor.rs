//! The governor service: decide, then enforce.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use governor_policy::{
    DecisionError, DecisionEvaluator, DecisionRequest, DecisionResult, ReasonCode,
};
use governor_primitives::{Budget, BudgetId, GovernorManifest, GovernorMode, RequestId, RuleId};
use governor_telemetry::DecisionMetrics;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::hitl::{ApprovalNotifier, ApprovalQueue, ApprovalVerdict, HitlError};
use crate::ledger::{BudgetLedger, LedgerError};
use crate::registry::{ManifestRegistry, RegistryError};
use crate::scheduler::{EnforcementScheduler, SchedulerConfig, SchedulerError};
use crate::timeout::{BudgetTimeoutExceededError, CancellationSignal, TimeoutEnforcer};

/// Runtime options for a [`Governor`].
#[derive(Debug, Clone, Copy)]
pub struct GovernorOptions {
    mode: GovernorMode,
    max_concurrency: NonZeroUsize,
    minimum_grace: Duration,
    approval_timeout: Option<Duration>,
}

impl Default for GovernorOptions {
    fn default() -> Self {
        Self {
            mode: GovernorMode::Enforce,
            max_concurrency: SchedulerConfig::default().max_concurrency(),
            minimum_grace: Duration::ZERO,
            approval_timeout: None,
        }
    }
}

impl GovernorOptions {
    /// Sets the enforcement mode.
    #[must_use]
    pub const fn mode(mut self, mode: GovernorMode) -> Self {
        self.mode = mode;
        self
    }

    /// Bounds concurrently enforced operations.
    #[must_use]
    pub const fn max_concurrency(mut self, limit: NonZeroUsize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Sets the grace floor applied to time budgets.
    #[must_use]
    pub const fn minimum_grace(mut self, grace: Duration) -> Self {
        self.minimum_grace = grace;
        self
    }

    /// Enables human approval of escalations with the given waiter timeout.
    #[must_use]
    pub const fn approvals(mut self, timeout: Duration) -> Self {
        self.approval_timeout = Some(timeout);
        self
    }
}

/// Decides requests against the active manifest and enforces the outcome.
#[derive(Debug)]
pub struct Governor {
    registry: Arc<ManifestRegistry>,
    ledger: Arc<BudgetLedger>,
    metrics: Arc<DecisionMetrics>,
    enforcer: TimeoutEnforcer,
    scheduler: EnforcementScheduler,
    approvals: Option<ApprovalQueue>,
    mode: GovernorMode,
}

impl Governor {
    /// Creates a governor over a registry.
    #[must_use]
    pub fn new(registry: Arc<ManifestRegistry>, options: GovernorOptions) -> Self {
        Self {
            registry,
            ledger: Arc::new(BudgetLedger::new()),
            metrics: Arc::new(DecisionMetrics::new()),
            enforcer: TimeoutEnforcer::new().with_minimum_grace(options.minimum_grace),
            scheduler: EnforcementScheduler::new(SchedulerConfig::new(options.max_concurrency)),
            approvals: options.approval_timeout.map(ApprovalQueue::new),
            mode: options.mode,
        }
    }

    /// Attaches a notifier to the approval queue. No-op when approvals are off.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn ApprovalNotifier>) -> Self {
        self.approvals = self.approvals.map(|queue| queue.with_notifier(notifier));
        self
    }

    /// Returns the manifest registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ManifestRegistry> {
        &self.registry
    }

    /// Returns the budget ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<BudgetLedger> {
        &self.ledger
    }

    /// Returns the decision counters.
    #[must_use]
    pub fn metrics(&self) -> &Arc<DecisionMetrics> {
        &self.metrics
    }

    /// Returns the approval queue, if approvals are enabled.
    #[must_use]
    pub fn approvals(&self) -> Option<&ApprovalQueue> {
        self.approvals.as_ref()
    }

    /// Returns the enforcement mode.
    #[must_use]
    pub const fn mode(&self) -> GovernorMode {
        self.mode
    }

    /// Returns the enforcement scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &EnforcementScheduler {
        &self.scheduler
    }

    /// Evaluates a request against the active manifest.
    ///
    /// In enforce mode an allowed decision consumes one unit of its count
    /// budget; losing a race for the last unit turns it into a
    /// [`ReasonCode::BudgetExhausted`] denial.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::Registry`] without an active manifest and
    /// [`GovernorError::Decision`] when evaluation fails.
    pub fn decide(&self, request: &DecisionRequest) -> GovernorResult<DecisionResult> {
        self.decide_with(request).map(|(_, result)| result)
    }

    fn decide_with(
        &self,
        request: &DecisionRequest,
    ) -> GovernorResult<(Arc<DecisionEvaluator>, DecisionResult)> {
        let evaluator = self.registry.active()?;
        let mut result = evaluator.evaluate(request, self.ledger.as_ref())?;

        if result.is_allow() && !self.mode.is_shadow() {
            let budget = budget_of(evaluator.manifest(), &result)
                .filter(|budget| budget.max_count().is_some());
            if let Some(budget) = budget {
                if let Err(err) = self.ledger.try_consume(budget) {
                    warn!(request_id = %request.request_id(), %err, "budget taken concurrently");
                    result = result.into_budget_exhausted();
                }
            }
        }

        self.metrics.record(&result);
        if result.reason() == ReasonCode::BudgetExhausted {
            warn!(
                request_id = %result.request_id(),
                budget = ?result.budget().map(BudgetId::as_str),
                "budget exhausted"
            );
        }
        info!(
            request_id = %result.request_id(),
            decision = %result.decision(),
            reason = %result.reason(),
            rule = ?result.matched_rule().map(RuleId::as_str),
            tier = %result.risk_tier(),
            mode = %self.mode,
            "governor decision"
        );
        Ok((evaluator, result))
    }

    /// Decides `request` and, if permitted, runs `operation` on the
    /// enforcement scheduler under the decision's time budget.
    ///
    /// Escalations wait for a human when approvals are enabled. In shadow mode
    /// nothing blocks: denials, escalations, and overruns are only logged.
    ///
    /// # Errors
    ///
    /// Returns [`GovernorError::Denied`], [`GovernorError::EscalationRequired`],
    /// [`GovernorError::Rejected`], or [`GovernorError::Approval`] when the
    /// operation may not run; [`GovernorError::Timeout`] when it outlived its
    /// budget; and decision, scheduler, or task failures otherwise.
    pub async fn execute<F, Fut, T>(
        &self,
        request: &DecisionRequest,
        operation: F,
    ) -> GovernorResult<T>
    where
        F: FnOnce(CancellationSignal) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (evaluator, result) = self.decide_with(request)?;
        let manifest = evaluator.manifest();

        if result.is_deny() {
            if !self.mode.is_shadow() {
                return Err(GovernorError::Denied {
                    request_id: result.request_id(),
                    reason: result.reason(),
                    rule: result.matched_rule().cloned(),
                });
            }
            self.shadow_override(&result);
        } else if result.is_escalate() {
            if self.mode.is_shadow() {
                self.shadow_override(&result);
            } else {
                self.await_approval(&result, budget_of(manifest, &result))
                    .await?;
            }
        }

        let budget = budget_of(manifest, &result)
            .filter(|budget| budget.time_limit().is_some())
            .cloned();
        self.run(result.request_id(), budget, operation).await
    }

    async fn await_approval(
        &self,
        result: &DecisionResult,
        budget: Option<&Budget>,
    ) -> GovernorResult<()> {
        let Some(queue) = &self.approvals else {
            return Err(GovernorError::EscalationRequired {
                request_id: result.request_id(),
                approvers: result.required_approvals().to_vec(),
            });
        };

        let (_, waiter) = queue.submit(result).await?;
        let verdict = waiter.wait().await.inspect_err(|_| {
            self.metrics.record_approval(false);
        })?;
        self.metrics.record_approval(verdict.is_approved());

        match verdict {
            ApprovalVerdict::Approved { approver } => {
                info!(request_id = %result.request_id(), %approver, "escalation approved");
                if let Some(budget) = budget.filter(|budget| budget.max_count().is_some()) {
                    self.ledger.try_consume(budget).map_err(|err| {
                        warn!(request_id = %result.request_id(), %err, "budget exhausted while awaiting approval");
                        GovernorError::Denied {
                            request_id: result.request_id(),
                            reason: ReasonCode::BudgetExhausted,
                            rule: result.matched_rule().cloned(),
                        }
                    })?;
                }
                Ok(())
            }
            ApprovalVerdict::Rejected { approver, reason } => Err(GovernorError::Rejected {
                request_id: result.request_id(),
                approver,
                reason,
            }),
        }
    }

    async fn run<F, Fut, T>(
        &self,
        request_id: RequestId,
        budget: Option<Budget>,
        operation: F,
    ) -> GovernorResult<T>
    where
        F: FnOnce(CancellationSignal) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let enforcer = self.enforcer;
        let shadow = self.mode.is_shadow();
        let metrics = Arc::clone(&self.metrics);
        let handle = self.scheduler.spawn(async move {
            match budget {
                Some(budget) if !shadow => enforcer.enforce(&budget, operation).await,
                Some(budget) => {
                    let started = Instant::now();
                    let output = operation(CancellationSignal::never()).await;
                    if overran(&enforcer, &budget, started.elapsed()) {
                        metrics.record_shadow_override();
                    }
                    Ok(output)
                }
                None => Ok(operation(CancellationSignal::never()).await),
            }
        })?;

        let outcome = handle.await.map_err(|err| GovernorError::TaskFailed {
            request_id,
            reason: err.to_string(),
        })??;

        outcome.map_err(|err| {
            self.metrics.record_timeout();
            GovernorError::Timeout(err)
        })
    }

    fn shadow_override(&self, result: &DecisionResult) {
        self.metrics.record_shadow_override();
        warn!(
            request_id = %result.request_id(),
            decision = %result.decision(),
            reason = %result.reason(),
            "shadow mode: proceeding despite decision"
        );
    }
}

fn overran(enforcer: &TimeoutEnforcer, budget: &Budget, elapsed: Duration) -> bool {
    let Some(limit) = budget.time_limit() else {
        return false;
    };
    let grace = enforcer.grace_for(budget);
    let overran = elapsed > limit.saturating_add(grace);
    if overran {
        warn!(budget = %budget.id(), ?elapsed, ?limit, ?grace, "shadow mode: operation overran its budget");
    }
    overran
}

fn budget_of<'m>(manifest: &'m GovernorManifest, result: &DecisionResult) -> Option<&'m Budget> {
    result.budget().and_then(|id| manifest.budget(id))
}

/// Errors surfaced by [`Governor`].
#[derive(Debug, Error)]
pub enum GovernorError {
    /// No usable manifest.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Evaluation failed.
    #[error(transparent)]
    Decision(#[from] DecisionError),
    /// The request was denied.
    #[error("request {request_id} denied ({reason})")]
    Denied {
        /// Denied request.
        request_id: RequestId,
        /// Why.
        reason: ReasonCode,
        /// Deciding rule, if any.
        rule: Option<RuleId>,
    },
    /// The request needs approval and approvals are disabled.
    #[error("request {request_id} requires human approval")]
    EscalationRequired {
        /// Escalated request.
        request_id: RequestId,
        /// Who may approve.
        approvers: Vec<String>,
    },
    /// A human rejected the escalation.
    #[error("request {request_id} rejected by `{approver}`: {reason}")]
    Rejected {
        /// Escalated request.
        request_id: RequestId,
        /// Who rejected.
        approver: String,
        /// Stated reason.
        reason: String,
    },
    /// The approval queue failed or timed out.
    #[error(transparent)]
    Approval(#[from] HitlError),
    /// The operation outlived its time budget.
    #[error(transparent)]
    Timeout(#[from] BudgetTimeoutExceededError),
    /// Budget accounting failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The enforcement scheduler is closed.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// The operation panicked or was cancelled.
    #[error("operation for request {request_id} failed: {reason}")]
    TaskFailed {
        /// Request whose operation failed.
        request_id: RequestId,
        /// Join error message.
        reason: String,
    },
}

/// Result alias for governor operations.
pub type GovernorResult<T> = Result<T, GovernorError>;

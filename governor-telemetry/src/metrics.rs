//! In-process decision counters.

use std::sync::atomic::{AtomicU64, Ordering};

use governor_policy::{DecisionResult, DecisionType, ReasonCode};
use serde::Serialize;

/// Lock-free counters updated on every governed decision.
#[derive(Debug, Default)]
pub struct DecisionMetrics {
    allowed: AtomicU64,
    denied: AtomicU64,
    escalated: AtomicU64,
    budget_exhausted: AtomicU64,
    timeouts: AtomicU64,
    approvals_granted: AtomicU64,
    approvals_rejected: AtomicU64,
    shadow_overrides: AtomicU64,
}

/// Point-in-time copy of [`DecisionMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Allowed decisions.
    pub allowed: u64,
    /// Denied decisions, including budget exhaustion.
    pub denied: u64,
    /// Escalated decisions.
    pub escalated: u64,
    /// Denials caused by an exhausted budget.
    pub budget_exhausted: u64,
    /// Operations cut off after their grace period.
    pub timeouts: u64,
    /// Escalations approved by a human.
    pub approvals_granted: u64,
    /// Escalations rejected or expired.
    pub approvals_rejected: u64,
    /// Blocking decisions ignored in shadow mode.
    pub shadow_overrides: u64,
}

impl MetricsSnapshot {
    /// Total number of decisions recorded.
    #[must_use]
    pub const fn decisions(&self) -> u64 {
        self.allowed + self.denied + self.escalated
    }
}

impl DecisionMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a decision by type and reason.
    pub fn record(&self, result: &DecisionResult) {
        let counter = match result.decision() {
            DecisionType::Allow => &self.allowed,
            DecisionType::Deny => &self.denied,
            DecisionType::Escalate => &self.escalated,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if result.reason() == ReasonCode::BudgetExhausted {
            self.budget_exhausted.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Counts an operation that outlived its grace period.
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a resolved escalation.
    pub fn record_approval(&self, granted: bool) {
        let counter = if granted {
            &self.approvals_granted
        } else {
            &self.approvals_rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a deny or escalate that shadow mode let through.
    pub fn record_shadow_override(&self) {
        self.shadow_overrides.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            escalated: self.escalated.load(Ordering::Relaxed),
            budget_exhausted: self.budget_exhausted.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            approvals_granted: self.approvals_granted.load(Ordering::Relaxed),
            approvals_rejected: self.approvals_rejected.load(Ordering::Relaxed),
            shadow_overrides: self.shadow_overrides.load(Ordering::Relaxed),
        }
    }
}

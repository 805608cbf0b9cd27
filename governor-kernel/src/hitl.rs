//! Human-in-the-loop approval of escalated decisions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use governor_policy::DecisionResult;
use governor_primitives::{ApprovalId, RequestId, RiskTier, RuleId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// An escalated decision waiting for a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalTicket {
    id: ApprovalId,
    request_id: RequestId,
    manifest_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rule: Option<RuleId>,
    risk_tier: RiskTier,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    required_approvers: Vec<String>,
    created_at: DateTime<Utc>,
}

impl ApprovalTicket {
    fn from_result(result: &DecisionResult) -> Self {
        Self {
            id: ApprovalId::random(),
            request_id: result.request_id(),
            manifest_version: result.manifest_version().to_owned(),
            rule: result.matched_rule().cloned(),
            risk_tier: result.risk_tier(),
            required_approvers: result.required_approvals().to_vec(),
            created_at: Utc::now(),
        }
    }

    /// Returns the ticket identifier.
    #[must_use]
    pub const fn id(&self) -> ApprovalId {
        self.id
    }

    /// Returns the escalated request.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the manifest version that escalated.
    #[must_use]
    pub fn manifest_version(&self) -> &str {
        &self.manifest_version
    }

    /// Returns the escalating rule, if any.
    #[must_use]
    pub fn rule(&self) -> Option<&RuleId> {
        self.rule.as_ref()
    }

    /// Returns the risk tier of the escalation.
    #[must_use]
    pub const fn risk_tier(&self) -> RiskTier {
        self.risk_tier
    }

    /// Returns who may resolve the ticket. Empty means anyone.
    #[must_use]
    pub fn required_approvers(&self) -> &[String] {
        &self.required_approvers
    }

    /// Returns when the ticket was opened.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn accepts(&self, approver: &str) -> bool {
        self.required_approvers.is_empty()
            || self.required_approvers.iter().any(|required| required == approver)
    }
}

/// How a human resolved a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ApprovalVerdict {
    /// Proceed.
    Approved {
        /// Who approved.
        approver: String,
    },
    /// Do not proceed.
    Rejected {
        /// Who rejected.
        approver: String,
        /// Stated reason.
        reason: String,
    },
}

impl ApprovalVerdict {
    /// Returns `true` for approvals.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    /// Returns who resolved the ticket.
    #[must_use]
    pub fn approver(&self) -> &str {
        match self {
            Self::Approved { approver } | Self::Rejected { approver, .. } => approver,
        }
    }
}

/// Receives newly opened tickets, e.g. to page an operator.
#[async_trait]
pub trait ApprovalNotifier: Send + Sync {
    /// Called once per submitted ticket.
    async fn notify(&self, ticket: &ApprovalTicket);
}

#[derive(Debug)]
struct Pending {
    ticket: ApprovalTicket,
    tx: oneshot::Sender<ApprovalVerdict>,
}

/// Queue of open approval tickets.
#[derive(Clone)]
pub struct ApprovalQueue {
    pending: Arc<DashMap<ApprovalId, Pending>>,
    notifier: Option<Arc<dyn ApprovalNotifier>>,
    timeout: Duration,
}

impl std::fmt::Debug for ApprovalQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalQueue")
            .field("pending", &self.pending.len())
            .field("notifier", &self.notifier.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ApprovalQueue {
    /// Creates a queue whose waiters give up after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            notifier: None,
            timeout,
        }
    }

    /// Attaches a notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn ApprovalNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Returns the waiter timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Opens a ticket for an escalated decision.
    ///
    /// # Errors
    ///
    /// Returns [`HitlError::NotEscalated`] for allow and deny results.
    pub async fn submit(
        &self,
        result: &DecisionResult,
    ) -> HitlResult<(ApprovalTicket, ApprovalWaiter)> {
        if !result.is_escalate() {
            return Err(HitlError::NotEscalated {
                request_id: result.request_id(),
            });
        }

        let ticket = ApprovalTicket::from_result(result);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            ticket.id(),
            Pending {
                ticket: ticket.clone(),
                tx,
            },
        );
        info!(
            ticket = %ticket.id(),
            request_id = %ticket.request_id(),
            approvers = ?ticket.required_approvers(),
            "approval requested"
        );
        if let Some(notifier) = &self.notifier {
            notifier.notify(&ticket).await;
        }

        let waiter = ApprovalWaiter {
            id: ticket.id(),
            rx,
            pending: Arc::clone(&self.pending),
            timeout: self.timeout,
        };
        Ok((ticket, waiter))
    }

    /// Approves a ticket.
    ///
    /// # Errors
    ///
    /// Returns [`HitlError::UnknownTicket`], [`HitlError::Unauthorized`], or
    /// [`HitlError::Abandoned`] when the waiter is gone.
    pub fn approve(&self, id: ApprovalId, approver: impl Into<String>) -> HitlResult<()> {
        let approver = approver.into();
        self.resolve(id, &approver.clone(), ApprovalVerdict::Approved { approver })
    }

    /// Rejects a ticket.
    ///
    /// # Errors
    ///
    /// See [`Self::approve`].
    pub fn reject(
        &self,
        id: ApprovalId,
        approver: impl Into<String>,
        reason: impl Into<String>,
    ) -> HitlResult<()> {
        let approver = approver.into();
        self.resolve(
            id,
            &approver.clone(),
            ApprovalVerdict::Rejected {
                approver,
                reason: reason.into(),
            },
        )
    }

    /// Returns the open tickets.
    #[must_use]
    pub fn pending(&self) -> Vec<ApprovalTicket> {
        self.pending
            .iter()
            .map(|entry| entry.ticket.clone())
            .collect()
    }

    /// Number of open tickets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` when no tickets are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn resolve(&self, id: ApprovalId, approver: &str, verdict: ApprovalVerdict) -> HitlResult<()> {
        let Some((_, pending)) = self
            .pending
            .remove_if(&id, |_, pending| pending.ticket.accepts(approver))
        else {
            return Err(if self.pending.contains_key(&id) {
                HitlError::Unauthorized {
                    id,
                    approver: approver.to_owned(),
                }
            } else {
                HitlError::UnknownTicket { id }
            });
        };

        if pending.tx.send(verdict).is_err() {
            warn!(ticket = %id, approver, "approval waiter already gone");
            return Err(HitlError::Abandoned { id });
        }
        debug!(ticket = %id, approver, "ticket resolved");
        Ok(())
    }
}

/// Awaits the verdict for one ticket. Dropping the waiter withdraws the ticket.
#[derive(Debug)]
pub struct ApprovalWaiter {
    id: ApprovalId,
    rx: oneshot::Receiver<ApprovalVerdict>,
    pending: Arc<DashMap<ApprovalId, Pending>>,
    timeout: Duration,
}

impl ApprovalWaiter {
    /// Returns the ticket identifier.
    #[must_use]
    pub const fn id(&self) -> ApprovalId {
        self.id
    }

    /// Waits for the verdict. On timeout the ticket is expired.
    ///
    /// # Errors
    ///
    /// Returns [`HitlError::TimedOut`] when nobody resolved the ticket in time
    /// and [`HitlError::Abandoned`] if the queue dropped it.
    pub async fn wait(mut self) -> HitlResult<ApprovalVerdict> {
        match tokio::time::timeout(self.timeout, &mut self.rx).await {
            Ok(Ok(verdict)) => Ok(verdict),
            Ok(Err(_)) => Err(HitlError::Abandoned { id: self.id }),
            Err(_) => {
                self.pending.remove(&self.id);
                warn!(ticket = %self.id, timeout = ?self.timeout, "approval timed out, ticket expired");
                Err(HitlError::TimedOut {
                    id: self.id,
                    after: self.timeout,
                })
            }
        }
    }
}

impl Drop for ApprovalWaiter {
    fn drop(&mut self) {
        if self.pending.remove(&self.id).is_some() {
            debug!(ticket = %self.id, "approval waiter dropped, ticket withdrawn");
        }
    }
}

/// Errors raised by the approval queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HitlError {
    /// Only escalations can be queued.
    #[error("request {request_id} was not escalated")]
    NotEscalated {
        /// Request that was submitted.
        request_id: RequestId,
    },
    /// No open ticket with this identifier.
    #[error("no open approval ticket {id}")]
    UnknownTicket {
        /// Ticket identifier.
        id: ApprovalId,
    },
    /// The approver is not among the required approvers.
    #[error("`{approver}` may not resolve approval ticket {id}")]
    Unauthorized {
        /// Ticket identifier.
        id: ApprovalId,
        /// Rejected approver.
        approver: String,
    },
    /// Nobody resolved the ticket in time.
    #[error("approval ticket {id} expired after {after:?}")]
    TimedOut {
        /// Ticket identifier.
        id: ApprovalId,
        /// Configured timeout.
        after: Duration,
    },
    /// The ticket was dropped without a verdict, or its waiter went away.
    #[error("approval ticket {id} was abandoned")]
    Abandoned {
        /// Ticket identifier.
        id: ApprovalId,
    },
}

/// Result alias for approval operations.
pub type HitlResult<T> = Result<T, HitlError>;

//! Governor runtime: manifest registry, budget accounting, time enforcement,
//! and human approval.
//!
//! [`Governor`] ties the pieces together. Decisions come from the active
//! manifest in the [`ManifestRegistry`]; count budgets are drawn from the
//! [`BudgetLedger`]; permitted operations run on the [`EnforcementScheduler`]
//! under the [`TimeoutEnforcer`]; escalations wait in the [`ApprovalQueue`].

#![warn(missing_docs, clippy::pedantic)]

mod governor;
mod hitl;
mod ledger;
mod registry;
mod scheduler;
mod timeout;

pub use governor::{Governor, GovernorError, GovernorOptions, GovernorResult};
pub use hitl::{
    ApprovalNotifier, ApprovalQueue, ApprovalTicket, ApprovalVerdict, ApprovalWaiter, HitlError,
    HitlResult,
};
pub use ledger::{BudgetLedger, LedgerError, LedgerResult};
pub use registry::{ManifestEvent, ManifestRegistry, ManifestState, RegistryError, RegistryResult};
pub use scheduler::{EnforcementScheduler, SchedulerConfig, SchedulerError, SchedulerResult};
pub use timeout::{BudgetTimeoutExceededError, CancellationSignal, TimeoutEnforcer};

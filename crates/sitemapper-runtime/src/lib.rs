//! Sitemapper runtime — job queue consumption, budget guard, triggers.
//!
//! The scheduler runs queued jobs one at a time under an exclusive
//! dispatch lease, consulting the budget guard before each job. Triggers
//! decide when a full regeneration is warranted and enqueue its plan.

pub mod budget;
pub mod checksum;
pub mod job;
pub mod scheduler;
pub mod trigger;
pub mod types;

pub use budget::{BudgetGuard, BudgetStatus, FixedProbe, ResourceUsage, SystemProbe, UsageProbe};
pub use job::{Job, SyncPayload};
pub use scheduler::{Scheduler, SchedulerConfig, DEFAULT_LEASE_TTL, JOB_REMOVAL_POLICY};
pub use types::*;

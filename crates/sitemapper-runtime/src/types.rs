//! Runtime types.

use serde::Serialize;

use sitemapper_store::Lease;
use sitemapper_sync::TaskOutcome;

use crate::budget::BudgetStatus;

/// What the scheduler does with a job after running it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Remove the job whatever its outcome. Failed chunks are picked up by
    /// the next full regeneration.
    Always,
    /// Remove only succeeded jobs. A failed job stays at the head of the
    /// queue and the tick stops.
    OnSuccess,
}

impl RemovalPolicy {
    pub fn should_remove(&self, outcome: &TaskOutcome) -> bool {
        match self {
            RemovalPolicy::Always => true,
            RemovalPolicy::OnSuccess => outcome.success,
        }
    }
}

/// Result of one dispatch tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    /// Jobs run during the tick.
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// The tick stopped because the budget guard tripped.
    pub deferred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deferral: Option<BudgetStatus>,
    /// Another dispatcher holds the lease; nothing was touched.
    pub lease_denied: bool,
    /// Jobs left in the queue after the tick.
    pub remaining: u64,
    /// This tick drained the queue and finished a pending generation.
    pub completed: bool,
}

/// Snapshot of the queue and resumption state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub queue_length: u64,
    pub generation_pending: bool,
    pub resume_cursor: Option<u64>,
    pub lease: Option<Lease>,
    /// Display form of the jobs at the head of the queue.
    pub next_jobs: Vec<String>,
    pub checksum: Option<String>,
}

/// Result of a trigger call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// The recorded checksum matches current content; nothing enqueued.
    UpToDate,
    Enqueued { jobs: usize },
    /// A run is still queued; resuming would duplicate it.
    AlreadyQueued { remaining: u64 },
}

/// Aggregate of repeated dispatch ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub ticks: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub remaining: u64,
    pub completed: bool,
    pub lease_denied: bool,
}

impl DrainReport {
    pub fn absorb(&mut self, tick: &DispatchReport) {
        self.ticks += 1;
        self.processed += tick.processed;
        self.succeeded += tick.succeeded;
        self.failed += tick.failed;
        self.remaining = tick.remaining;
        self.completed |= tick.completed;
        self.lease_denied = tick.lease_denied;
    }
}

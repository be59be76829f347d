//! Budget Guard: decides whether a dispatch tick may start another job.

use std::time::{Duration, Instant};

use serde::Serialize;

use sitemapper_core::{current_memory_usage, HostLimits};

/// Fraction of each budget a tick may use before it defers.
pub const BUDGET_THRESHOLD: f64 = 0.9;

/// Time budget assumed when the host reports no execution ceiling.
pub const FALLBACK_TIME_BUDGET: Duration = Duration::from_secs(30);

/// Memory budget assumed when the host reports no memory ceiling.
pub const FALLBACK_MEMORY_BUDGET: u64 = 256 * 1024 * 1024;

/// Resource usage of the current tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
    pub elapsed: Duration,
    pub memory_bytes: u64,
}

/// Source of resource usage readings.
pub trait UsageProbe: Send + Sync {
    fn usage(&self) -> ResourceUsage;
}

/// Wall-clock time since construction plus current process RSS.
#[derive(Debug, Clone, Copy)]
pub struct SystemProbe {
    started: Instant,
}

impl SystemProbe {
    /// Start measuring a new tick.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl UsageProbe for SystemProbe {
    fn usage(&self) -> ResourceUsage {
        ResourceUsage {
            elapsed: self.started.elapsed(),
            memory_bytes: current_memory_usage(),
        }
    }
}

/// Probe returning a constant reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedProbe(pub ResourceUsage);

impl FixedProbe {
    pub fn new(elapsed: Duration, memory_bytes: u64) -> Self {
        Self(ResourceUsage {
            elapsed,
            memory_bytes,
        })
    }

    /// A reading that never trips the guard.
    pub fn idle() -> Self {
        Self::default()
    }
}

impl UsageProbe for FixedProbe {
    fn usage(&self) -> ResourceUsage {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Within,
    TimeExceeded,
    MemoryExceeded,
}

impl BudgetStatus {
    pub fn is_within(&self) -> bool {
        matches!(self, BudgetStatus::Within)
    }
}

/// Effective budgets and thresholds for one host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetGuard {
    time_budget: Duration,
    memory_budget: u64,
}

impl BudgetGuard {
    pub fn new(limits: HostLimits) -> Self {
        Self {
            time_budget: limits.max_execution.unwrap_or(FALLBACK_TIME_BUDGET),
            memory_budget: limits.memory_limit.unwrap_or(FALLBACK_MEMORY_BUDGET),
        }
    }

    pub fn time_budget(&self) -> Duration {
        self.time_budget
    }

    pub fn memory_budget(&self) -> u64 {
        self.memory_budget
    }

    pub fn time_threshold(&self) -> Duration {
        self.time_budget.mul_f64(BUDGET_THRESHOLD)
    }

    pub fn memory_threshold(&self) -> u64 {
        (self.memory_budget as f64 * BUDGET_THRESHOLD) as u64
    }

    /// Time is checked first; a reading at the threshold counts as exceeded.
    pub fn check(&self, usage: ResourceUsage) -> BudgetStatus {
        if usage.elapsed >= self.time_threshold() {
            BudgetStatus::TimeExceeded
        } else if usage.memory_bytes >= self.memory_threshold() {
            BudgetStatus::MemoryExceeded
        } else {
            BudgetStatus::Within
        }
    }
}

impl Default for BudgetGuard {
    fn default() -> Self {
        Self::new(HostLimits::unlimited())
    }
}

//! Host-reported execution ceilings and process memory usage.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Execution ceilings reported by the host. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostLimits {
    /// Wall-clock ceiling for one dispatch tick.
    pub max_execution: Option<Duration>,
    /// Memory ceiling for the process, in bytes.
    pub memory_limit: Option<u64>,
}

impl HostLimits {
    /// Explicit limits (for testing and CLI overrides).
    pub fn new(max_execution: Option<Duration>, memory_limit: Option<u64>) -> Self {
        Self {
            max_execution,
            memory_limit,
        }
    }

    /// Host with no reported ceilings.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Discover ceilings from the environment and, on Linux, the cgroup.
    ///
    /// `SITEMAPPER_MAX_EXECUTION_SECS` and `SITEMAPPER_MEMORY_LIMIT_MB` take
    /// precedence; `0` or unset means unlimited.
    pub fn discover() -> Self {
        let max_execution = env_u64("SITEMAPPER_MAX_EXECUTION_SECS")
            .filter(|s| *s > 0)
            .map(Duration::from_secs);

        let memory_limit = env_u64("SITEMAPPER_MEMORY_LIMIT_MB")
            .filter(|mb| *mb > 0)
            .map(|mb| mb * 1024 * 1024)
            .or_else(Self::cgroup_memory_limit);

        debug!(
            "Host limits: max_execution={:?}, memory_limit={:?}",
            max_execution, memory_limit
        );

        Self {
            max_execution,
            memory_limit,
        }
    }

    fn cgroup_memory_limit() -> Option<u64> {
        #[cfg(target_os = "linux")]
        {
            use std::fs;
            // cgroup v2 reports "max" when unlimited
            let raw = fs::read_to_string("/sys/fs/cgroup/memory.max").ok()?;
            raw.trim().parse::<u64>().ok()
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }
}

/// Resident memory of the current process in bytes (0 when unknown).
pub fn current_memory_usage() -> u64 {
    #[cfg(target_os = "linux")]
    {
        use std::fs;
        if let Ok(status) = fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<u64>() {
                            return kb * 1024;
                        }
                    }
                }
            }
        }
        0
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

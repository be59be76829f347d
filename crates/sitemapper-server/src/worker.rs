//! Recurring dispatch, the scheduled trigger.
//!
//! Each tick enqueues a run when the checksum is stale and nothing is
//! queued, then dispatches once on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use sitemapper_core::Result;
use sitemapper_runtime::{trigger, DispatchReport, Scheduler, SystemProbe};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::state::AppState;

/// Start the background dispatch worker task.
pub fn start_dispatch_worker(state: Arc<AppState>) {
    let period = Duration::from_secs(state.config.dispatch_interval_secs.max(1));

    tokio::spawn(async move {
        info!("Background dispatch worker started (every {:?})", period);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let scheduler = state.scheduler.clone();
            match tokio::task::spawn_blocking(move || run_tick(&scheduler)).await {
                Ok(Ok(report)) => debug!("Scheduled tick: {:?}", report),
                Ok(Err(e)) => error!("Scheduled dispatch failed: {}", e),
                Err(e) => error!("Scheduled dispatch panicked: {}", e),
            }
        }
    });
}

/// One scheduled tick. The probe starts before the staleness check so the
/// check counts against the tick's budget.
pub fn run_tick(scheduler: &Scheduler) -> Result<DispatchReport> {
    let probe = SystemProbe::start();
    if let Some(outcome) = trigger::refresh_if_stale(scheduler)? {
        info!("Content changed, regeneration queued: {:?}", outcome);
    }
    scheduler.dispatch(&probe)
}

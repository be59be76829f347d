//! Consumes the durable job queue one budget-checked job at a time.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use sitemapper_core::{Result, SitemapSettings};
use sitemapper_store::{
    CacheStore, SqliteStore, GENERATION_PENDING_OPTION, RESUME_CURSOR_OPTION,
};
use sitemapper_sync::{
    ChunkEncoder, EventBus, Extensions, JsonEncoder, PipelineEvent, TaskContext,
};

use crate::budget::{BudgetGuard, UsageProbe};
use crate::checksum;
use crate::job::Job;
use crate::types::{DispatchReport, RemovalPolicy, SchedulerStatus};

/// Policy applied to every consumed job.
pub const JOB_REMOVAL_POLICY: RemovalPolicy = RemovalPolicy::Always;

/// Default dispatch lease lifetime.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(120);

const STATUS_PREVIEW_JOBS: usize = 10;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub removal_policy: RemovalPolicy,
    pub lease_ttl: Duration,
    /// Process identity; each dispatch leases under `{owner_id}-{uuid}`.
    pub owner_id: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            removal_policy: JOB_REMOVAL_POLICY,
            lease_ttl: DEFAULT_LEASE_TTL,
            owner_id: format!("sitemapper-{}", uuid::Uuid::new_v4()),
        }
    }
}

pub struct Scheduler {
    store: Arc<SqliteStore>,
    cache: Arc<CacheStore>,
    settings: RwLock<SitemapSettings>,
    extensions: Extensions,
    encoder: Box<dyn ChunkEncoder>,
    events: EventBus,
    guard: BudgetGuard,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<SqliteStore>,
        cache: Arc<CacheStore>,
        settings: SitemapSettings,
        guard: BudgetGuard,
    ) -> Self {
        info!(
            "Scheduler initialized: time_budget={:?}, memory_budget={}MB",
            guard.time_budget(),
            guard.memory_budget() / (1024 * 1024)
        );
        Self {
            store,
            cache,
            settings: RwLock::new(settings),
            extensions: Extensions::default(),
            encoder: Box::new(JsonEncoder),
            events: EventBus::new(),
            guard,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_encoder(mut self, encoder: impl ChunkEncoder + 'static) -> Self {
        self.encoder = Box::new(encoder);
        self
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn guard(&self) -> &BudgetGuard {
        &self.guard
    }

    pub fn owner_id(&self) -> &str {
        &self.config.owner_id
    }

    pub fn settings(&self) -> SitemapSettings {
        self.settings.read().clone()
    }

    /// Replace the settings used by subsequent ticks.
    pub fn set_settings(&self, settings: SitemapSettings) {
        *self.settings.write() = settings;
    }

    /// Append a job to the queue and mark a generation as pending.
    pub fn enqueue(&self, job: &Job) -> Result<i64> {
        let id = self.store.push_job(job.kind(), &job.payload_json()?)?;
        self.store.set_option(GENERATION_PENDING_OPTION, "1")?;
        debug!("Enqueued job {} as #{}", job, id);
        Ok(id)
    }

    /// Run queued jobs until the queue drains or the budget guard trips.
    ///
    /// Job failures are logged and counted, never returned. Errors are
    /// reserved for the queue and lease storage itself.
    ///
    /// Every call leases under its own token, so overlapping dispatches on a
    /// shared scheduler exclude each other just like separate processes.
    pub fn dispatch(&self, probe: &dyn UsageProbe) -> Result<DispatchReport> {
        let token = self.lease_token();
        if !self
            .store
            .try_acquire_lease(&token, self.config.lease_ttl, now_millis())?
        {
            info!("Dispatch skipped: lease held by another dispatcher");
            return Ok(DispatchReport {
                lease_denied: true,
                remaining: self.store.queue_len()?,
                ..Default::default()
            });
        }

        debug!("Dispatch lease taken as {}", token);
        let result = self.run_queue(probe, &token);

        if let Err(e) = self.store.release_lease(&token) {
            warn!("Failed to release dispatch lease: {}", e);
        }

        let mut report = result?;
        report.remaining = self.store.queue_len()?;
        if report.remaining == 0 {
            report.completed = self.complete()?;
        }

        info!(
            "Dispatch tick: processed={}, succeeded={}, failed={}, deferred={}, remaining={}",
            report.processed, report.succeeded, report.failed, report.deferred, report.remaining
        );
        Ok(report)
    }

    fn lease_token(&self) -> String {
        format!("{}-{}", self.config.owner_id, uuid::Uuid::new_v4())
    }

    fn run_queue(&self, probe: &dyn UsageProbe, token: &str) -> Result<DispatchReport> {
        let settings = self.settings();
        let ctx = TaskContext {
            store: &self.store,
            cache: &self.cache,
            settings: &settings,
            extensions: &self.extensions,
            encoder: self.encoder.as_ref(),
            events: &self.events,
        };
        let mut report = DispatchReport::default();

        while let Some(row) = self.store.front_job()? {
            let status = self.guard.check(probe.usage());
            if !status.is_within() {
                info!("Budget reached ({:?}), deferring job #{}", status, row.id);
                report.deferred = true;
                report.deferral = Some(status);
                break;
            }

            // Extend the lease; a lapsed one may have been taken over.
            if report.processed > 0
                && !self
                    .store
                    .try_acquire_lease(token, self.config.lease_ttl, now_millis())?
            {
                warn!("Dispatch lease lost, stopping tick");
                break;
            }

            let job = match Job::from_queued(&row) {
                Ok(job) => job,
                Err(e) => {
                    warn!("Dropping unreadable job #{} ({}): {}", row.id, row.kind, e);
                    self.store.remove_job(row.id)?;
                    report.processed += 1;
                    report.failed += 1;
                    continue;
                }
            };

            let outcome = job.run(&ctx);
            report.processed += 1;
            if outcome.success {
                report.succeeded += 1;
                debug!("Job {} succeeded: {}", job, outcome.message);
            } else {
                report.failed += 1;
                warn!("Job {} failed: {}", job, outcome.message);
            }

            if !self.config.removal_policy.should_remove(&outcome) {
                warn!("Job #{} left at the head of the queue", row.id);
                break;
            }
            self.store.remove_job(row.id)?;

            if let Some(sequence) = job.sequence() {
                self.store
                    .set_option(RESUME_CURSOR_OPTION, &(sequence + 1).to_string())?;
            }
        }

        Ok(report)
    }

    /// Finish a pending generation. Returns true if this call finished it.
    pub fn complete(&self) -> Result<bool> {
        if !self.store.delete_option(GENERATION_PENDING_OPTION)? {
            return Ok(false);
        }
        self.events.emit(PipelineEvent::GenerationComplete);
        info!("Sitemap generation complete");
        Ok(true)
    }

    pub fn status(&self) -> Result<SchedulerStatus> {
        let next_jobs = self
            .store
            .list_jobs(STATUS_PREVIEW_JOBS)?
            .iter()
            .map(|row| match Job::from_queued(row) {
                Ok(job) => job.to_string(),
                Err(_) => format!("{} (unreadable)", row.kind),
            })
            .collect();

        Ok(SchedulerStatus {
            queue_length: self.store.queue_len()?,
            generation_pending: self.store.get_option(GENERATION_PENDING_OPTION)?.is_some(),
            resume_cursor: self.resume_cursor()?,
            lease: self.store.current_lease(now_millis())?,
            next_jobs,
            checksum: checksum::stored(&self.store)?,
        })
    }

    /// Plan position a resumed run starts from.
    pub fn resume_cursor(&self) -> Result<Option<u64>> {
        let cursor = self
            .store
            .get_option(RESUME_CURSOR_OPTION)?
            .and_then(|raw| match raw.parse::<u64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("Ignoring unreadable resumption cursor {:?}", raw);
                    None
                }
            });
        Ok(cursor)
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

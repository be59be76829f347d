//! Trigger layer: decides when to enqueue a generation run and drives it.
//!
//! Every entry point reduces to the same contract: one sync job per window of
//! every bucket, then exactly one cleanup job, then dispatch until drained.

use tracing::{info, warn};

use sitemapper_core::{Result, SitemapSettings};
use sitemapper_store::{ContentFamily, ContentQuery, SqliteStore, RESUME_CURSOR_OPTION};
use sitemapper_sync::{Extensions, DEFAULT_CHUNK_SIZE};

use crate::budget::UsageProbe;
use crate::checksum;
use crate::job::{Job, SyncPayload};
use crate::scheduler::Scheduler;
use crate::types::{DrainReport, TriggerOutcome};

/// Full regeneration plan: sync jobs numbered by plan position, cleanup last.
///
/// Post types come before taxonomies, in settings order. Globally no-indexed
/// types and empty buckets contribute no jobs.
pub fn plan(
    store: &SqliteStore,
    settings: &SitemapSettings,
    extensions: &Extensions,
) -> Result<Vec<Job>> {
    let chunk_size = if settings.chunk_size == 0 {
        warn!("chunk_size 0 in settings, using {}", DEFAULT_CHUNK_SIZE);
        DEFAULT_CHUNK_SIZE
    } else {
        settings.chunk_size
    };

    let families = settings
        .post_types
        .iter()
        .map(|t| (ContentFamily::Post, t))
        .chain(settings.taxonomies.iter().map(|t| (ContentFamily::Term, t)));

    let mut jobs = Vec::new();
    let mut sequence = 0u64;
    for (family, object_type) in families {
        if settings.is_noindex_type(object_type) {
            continue;
        }
        let query = extensions.augment_query(
            ContentQuery::new(family, object_type.clone()).excluding(&settings.excluded_ids),
        );
        let total = store.count_indexable(&query)?;

        let mut offset = 0u64;
        while offset < total {
            let payload = SyncPayload::new(offset, object_type.clone(), chunk_size)
                .with_sequence(sequence);
            jobs.push(match family {
                ContentFamily::Post => Job::SyncPosts(payload),
                ContentFamily::Term => Job::SyncTaxonomy(payload),
            });
            sequence += 1;
            offset += u64::from(chunk_size);
        }
    }
    jobs.push(Job::Cleanup);
    Ok(jobs)
}

/// Enqueue a full run unless the recorded checksum says content is unchanged.
///
/// A queued run from an earlier trigger is replaced, so back-to-back
/// triggers leave a single plan in the queue.
pub fn regenerate(scheduler: &Scheduler, force: bool) -> Result<TriggerOutcome> {
    let store = scheduler.store();
    let settings = scheduler.settings();
    let extensions = scheduler.extensions();

    if !force && checksum::is_fresh(store, &settings, extensions)? {
        info!("Sitemap is up to date, nothing to regenerate");
        return Ok(TriggerOutcome::UpToDate);
    }

    let replaced = store.clear_queue()?;
    if replaced > 0 {
        info!("Replacing {} queued jobs from an earlier run", replaced);
    }
    store.delete_option(RESUME_CURSOR_OPTION)?;

    let jobs = plan(store, &settings, extensions)?;
    for job in &jobs {
        scheduler.enqueue(job)?;
    }
    checksum::record(store, &checksum::compute(store, &settings, extensions)?)?;

    info!("Enqueued sitemap regeneration: {} jobs (force={})", jobs.len(), force);
    Ok(TriggerOutcome::Enqueued { jobs: jobs.len() })
}

/// Re-enqueue the part of the plan a previous manual run did not reach.
pub fn resume(scheduler: &Scheduler) -> Result<TriggerOutcome> {
    let store = scheduler.store();
    let remaining = store.queue_len()?;
    if remaining > 0 {
        info!("Run still queued ({} jobs), not resuming", remaining);
        return Ok(TriggerOutcome::AlreadyQueued { remaining });
    }

    let settings = scheduler.settings();
    let cursor = scheduler.resume_cursor()?.unwrap_or(0);
    let jobs: Vec<Job> = plan(store, &settings, scheduler.extensions())?
        .into_iter()
        .filter(|job| job.sequence().map_or(true, |seq| seq >= cursor))
        .collect();
    for job in &jobs {
        scheduler.enqueue(job)?;
    }
    checksum::record(
        store,
        &checksum::compute(store, &settings, scheduler.extensions())?,
    )?;

    info!("Resumed sitemap generation at plan position {}: {} jobs", cursor, jobs.len());
    Ok(TriggerOutcome::Enqueued { jobs: jobs.len() })
}

/// Scheduled entry point: enqueue when content changed and nothing is queued.
pub fn refresh_if_stale(scheduler: &Scheduler) -> Result<Option<TriggerOutcome>> {
    if scheduler.store().queue_len()? > 0 {
        return Ok(None);
    }
    match regenerate(scheduler, false)? {
        TriggerOutcome::UpToDate => Ok(None),
        outcome => Ok(Some(outcome)),
    }
}

/// Forget resumption and version state. Does not stop a tick in flight.
pub fn deactivate(scheduler: &Scheduler) -> Result<()> {
    let store = scheduler.store();
    store.delete_option(RESUME_CURSOR_OPTION)?;
    checksum::clear(store)?;
    info!("Sitemap generation state cleared");
    Ok(())
}

/// Dispatch repeatedly until the queue drains, at most `max_ticks` times.
///
/// Each tick gets a fresh probe. Stops early when the lease is held
/// elsewhere or a tick makes no progress.
pub fn drain<P, F>(scheduler: &Scheduler, mut probe: F, max_ticks: usize) -> Result<DrainReport>
where
    P: UsageProbe,
    F: FnMut() -> P,
{
    let mut report = DrainReport::default();
    for _ in 0..max_ticks {
        let tick = scheduler.dispatch(&probe())?;
        report.absorb(&tick);
        if tick.lease_denied || tick.remaining == 0 || tick.processed == 0 {
            break;
        }
    }
    if report.remaining > 0 {
        warn!(
            "Drain stopped with {} jobs queued after {} ticks",
            report.remaining, report.ticks
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetGuard, FixedProbe};
    use sitemapper_store::{CacheStore, ContentItem, ContentStatus};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn scheduler(settings: SitemapSettings) -> (Scheduler, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("db")).unwrap());
        let cache = Arc::new(CacheStore::new(dir.path().join("cache"), store.clone()));
        cache.init().unwrap();
        (
            Scheduler::new(store, cache, settings, BudgetGuard::default()),
            dir,
        )
    }

    fn add(s: &Scheduler, family: ContentFamily, object_type: &str, count: i64) {
        for id in 1..=count {
            s.store()
                .upsert_content_item(&ContentItem {
                    id,
                    family,
                    object_type: object_type.into(),
                    title: format!("{} {}", object_type, id),
                    path: format!("/{}/{}/", object_type, id),
                    status: ContentStatus::Publish,
                    noindex: false,
                    modified_at: "2024-01-01T00:00:00+00:00".into(),
                    images: Vec::new(),
                })
                .unwrap();
        }
    }

    #[test]
    fn test_plan_windows_and_sequence() {
        let settings = SitemapSettings {
            chunk_size: 10,
            post_types: vec!["post".into(), "page".into()],
            taxonomies: vec!["category".into()],
            noindex_types: vec!["page".into()],
            ..Default::default()
        };
        let (s, _dir) = scheduler(settings.clone());
        add(&s, ContentFamily::Post, "post", 25);
        add(&s, ContentFamily::Post, "page", 5);
        add(&s, ContentFamily::Term, "category", 3);

        let jobs = plan(s.store(), &settings, s.extensions()).unwrap();
        let shown: Vec<String> = jobs.iter().map(|j| j.to_string()).collect();
        assert_eq!(
            shown,
            vec![
                "sync_posts(post, offset=0, chunk_size=10)",
                "sync_posts(post, offset=10, chunk_size=10)",
                "sync_posts(post, offset=20, chunk_size=10)",
                "sync_taxonomy(category, offset=0, chunk_size=10)",
                "cleanup",
            ]
        );
        let sequences: Vec<Option<u64>> = jobs.iter().map(|j| j.sequence()).collect();
        assert_eq!(sequences, vec![Some(0), Some(1), Some(2), Some(3), None]);
    }

    #[test]
    fn test_regenerate_respects_checksum() {
        let (s, _dir) = scheduler(SitemapSettings::default());
        add(&s, ContentFamily::Post, "post", 3);

        assert_eq!(
            regenerate(&s, false).unwrap(),
            TriggerOutcome::Enqueued { jobs: 2 }
        );
        drain(&s, FixedProbe::idle, 5).unwrap();
        assert_eq!(regenerate(&s, false).unwrap(), TriggerOutcome::UpToDate);
        assert_eq!(
            regenerate(&s, true).unwrap(),
            TriggerOutcome::Enqueued { jobs: 2 }
        );
    }

    #[test]
    fn test_regenerate_replaces_queued_run() {
        let (s, _dir) = scheduler(SitemapSettings::default());
        add(&s, ContentFamily::Post, "post", 3);
        regenerate(&s, true).unwrap();
        regenerate(&s, true).unwrap();
        assert_eq!(s.store().queue_len().unwrap(), 2);
    }

    #[test]
    fn test_resume_skips_reached_positions() {
        let settings = SitemapSettings {
            chunk_size: 2,
            ..Default::default()
        };
        let (s, _dir) = scheduler(settings);
        add(&s, ContentFamily::Post, "post", 6);

        s.store().set_option(RESUME_CURSOR_OPTION, "2").unwrap();
        assert_eq!(resume(&s).unwrap(), TriggerOutcome::Enqueued { jobs: 2 });
        assert_eq!(
            resume(&s).unwrap(),
            TriggerOutcome::AlreadyQueued { remaining: 2 }
        );
        assert_eq!(
            s.status().unwrap().next_jobs,
            vec!["sync_posts(post, offset=4, chunk_size=2)", "cleanup"]
        );
    }

    #[test]
    fn test_deactivate_clears_state() {
        let (s, _dir) = scheduler(SitemapSettings::default());
        regenerate(&s, true).unwrap();
        s.store().set_option(RESUME_CURSOR_OPTION, "1").unwrap();

        deactivate(&s).unwrap();
        let status = s.status().unwrap();
        assert_eq!(status.resume_cursor, None);
        assert_eq!(status.checksum, None);
    }

    #[test]
    fn test_drain_stops_without_progress() {
        let (s, _dir) = scheduler(SitemapSettings::default());
        add(&s, ContentFamily::Post, "post", 3);
        regenerate(&s, true).unwrap();

        let exhausted = || FixedProbe::new(std::time::Duration::from_secs(3600), 0);
        let report = drain(&s, exhausted, 10).unwrap();
        assert_eq!(report.ticks, 1);
        assert_eq!(report.remaining, 2);

        let report = drain(&s, FixedProbe::idle, 10).unwrap();
        assert!(report.completed);
        assert_eq!(report.remaining, 0);
    }
}

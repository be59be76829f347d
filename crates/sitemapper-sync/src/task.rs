//! Sync and cleanup tasks: content window → records → chunk artifact → index entry.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use sitemapper_core::SitemapSettings;
use sitemapper_store::{
    bucket_name, chunk_path, CacheStore, ContentFamily, ContentQuery, SqliteStore,
    RESUME_CURSOR_OPTION,
};

use crate::encode::ChunkEncoder;
use crate::events::{EventBus, PipelineEvent};
use crate::extensions::Extensions;
use crate::record::{map_item, parse_timestamp, SitemapRecord};

/// Records per chunk when not configured.
pub const DEFAULT_CHUNK_SIZE: u32 = 20;

/// 1-based chunk index of the window starting at `offset`.
pub fn chunk_index(offset: u64, chunk_size: u32) -> u32 {
    (offset / u64::from(chunk_size.max(1))) as u32 + 1
}

/// Everything a task needs to run. Borrowed for the duration of one job.
pub struct TaskContext<'a> {
    pub store: &'a SqliteStore,
    pub cache: &'a CacheStore,
    pub settings: &'a SitemapSettings,
    pub extensions: &'a Extensions,
    pub encoder: &'a dyn ChunkEncoder,
    pub events: &'a EventBus,
}

/// Result of running a task. Reported for logging only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub success: bool,
    pub message: String,
    pub processed: usize,
}

impl TaskOutcome {
    pub fn success(processed: usize, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            processed,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            processed: 0,
        }
    }
}

/// Writes one chunk of one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    family: ContentFamily,
    offset: u64,
    object_type: String,
    chunk_size: u32,
}

impl SyncTask {
    pub fn new(
        family: ContentFamily,
        offset: u64,
        object_type: impl Into<String>,
        chunk_size: u32,
    ) -> Self {
        Self {
            family,
            offset,
            object_type: object_type.into(),
            chunk_size,
        }
    }

    /// Task over a post type window.
    pub fn posts(offset: u64, object_type: impl Into<String>, chunk_size: u32) -> Self {
        Self::new(ContentFamily::Post, offset, object_type, chunk_size)
    }

    /// Task over a taxonomy window.
    pub fn taxonomy(offset: u64, object_type: impl Into<String>, chunk_size: u32) -> Self {
        Self::new(ContentFamily::Term, offset, object_type, chunk_size)
    }

    pub fn chunk_index(&self) -> u32 {
        chunk_index(self.offset, self.chunk_size)
    }

    /// Bucket this task writes into under the given settings.
    pub fn bucket(&self, settings: &SitemapSettings) -> String {
        let prefix = match self.family {
            ContentFamily::Post => &settings.cpt_prefix,
            ContentFamily::Term => &settings.taxonomy_prefix,
        };
        bucket_name(prefix, &self.object_type)
    }

    /// Base query for this window before augmenters run.
    pub fn query(&self, settings: &SitemapSettings) -> ContentQuery {
        ContentQuery::new(self.family, self.object_type.clone())
            .page(self.offset, u64::from(self.chunk_size))
            .excluding(&settings.excluded_ids)
    }

    /// Fetch the window, write its chunk and index entry. Never panics or
    /// propagates errors; failures are reported in the outcome.
    pub fn run(&self, ctx: &TaskContext<'_>) -> TaskOutcome {
        if self.chunk_size == 0 {
            return TaskOutcome::failure(format!(
                "Invalid chunk size 0 for {}",
                self.object_type
            ));
        }

        if ctx.settings.is_noindex_type(&self.object_type) {
            return TaskOutcome::success(
                0,
                format!("{} is excluded from the sitemap, nothing to process", self.object_type),
            );
        }

        let query = ctx.extensions.augment_query(self.query(ctx.settings));
        let items = match ctx.store.fetch_indexable(&query) {
            Ok(items) => items,
            Err(e) => {
                error!("Fetch failed for {} at offset {}: {}", self.object_type, self.offset, e);
                return TaskOutcome::failure(format!("Failed to fetch {}: {}", self.object_type, e));
            }
        };

        if items.is_empty() {
            debug!("No {} items at offset {}", self.object_type, self.offset);
            return TaskOutcome::success(
                0,
                format!("No {} items to process at offset {}", self.object_type, self.offset),
            );
        }

        let records: Vec<SitemapRecord> = items
            .iter()
            .filter_map(|item| match map_item(item, ctx.settings) {
                Some(record) => Some(ctx.extensions.transform_record(record, item)),
                None => {
                    warn!(
                        "Skipping malformed {} item {} (path={:?}, modified_at={:?})",
                        item.object_type, item.id, item.path, item.modified_at
                    );
                    None
                }
            })
            .collect();

        let chunk_index = self.chunk_index();
        let bucket = self.bucket(ctx.settings);

        let bytes = match ctx.encoder.encode(&records) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Serialization failed for {} chunk {}: {}", bucket, chunk_index, e);
                return TaskOutcome::failure(format!(
                    "Failed to serialize {} chunk {}: {}",
                    bucket, chunk_index, e
                ));
            }
        };

        if let Err(e) = ctx.cache.store(&chunk_path(&bucket, chunk_index), &bytes) {
            error!("Failed to store {} chunk {}: {}", bucket, chunk_index, e);
            return TaskOutcome::failure(format!(
                "Failed to store {} chunk {}: {}",
                bucket, chunk_index, e
            ));
        }

        let item_count = records.len() as u32;
        let last_modified = newest_modification(&records);
        if let Err(e) =
            ctx.cache
                .upsert_index(&bucket, chunk_index, item_count, last_modified.as_deref())
        {
            error!("Failed to index {} chunk {}: {}", bucket, chunk_index, e);
            return TaskOutcome::failure(format!(
                "Failed to index {} chunk {}: {}",
                bucket, chunk_index, e
            ));
        }

        ctx.events.emit(PipelineEvent::ChunkWritten {
            bucket: bucket.clone(),
            chunk_index,
            item_count,
        });

        info!("Wrote {} chunk {} ({} records)", bucket, chunk_index, item_count);
        TaskOutcome::success(
            records.len(),
            format!(
                "Processed {} {} items into chunk {}",
                records.len(),
                self.object_type,
                chunk_index
            ),
        )
    }
}

fn newest_modification(records: &[SitemapRecord]) -> Option<String> {
    records
        .iter()
        .filter_map(|r| parse_timestamp(&r.last_modified).map(|dt| (dt, &r.last_modified)))
        .max_by_key(|(dt, _)| *dt)
        .map(|(_, raw)| raw.clone())
}

/// Terminal job of a generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupTask;

impl CleanupTask {
    /// Clear the resumption cursor and announce completion.
    pub fn run(&self, ctx: &TaskContext<'_>) -> TaskOutcome {
        if let Err(e) = ctx.store.delete_option(RESUME_CURSOR_OPTION) {
            error!("Failed to clear resumption cursor: {}", e);
            return TaskOutcome::failure(format!("Failed to clear resumption cursor: {}", e));
        }
        ctx.events.emit(PipelineEvent::BatchProcessComplete);
        info!("Sitemap batch process complete");
        TaskOutcome::success(0, "Sitemap generation batch complete")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::JsonEncoder;
    use parking_lot::Mutex;
    use sitemapper_store::{ContentItem, ContentStatus, ImageRef};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        store: Arc<SqliteStore>,
        cache: CacheStore,
        settings: SitemapSettings,
        extensions: Extensions,
        events: EventBus,
        _dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(SqliteStore::open(dir.path().join("db")).unwrap());
            let cache = CacheStore::new(dir.path().join("cache"), store.clone());
            cache.init().unwrap();
            Self {
                store,
                cache,
                settings: SitemapSettings::default(),
                extensions: Extensions::default(),
                events: EventBus::new(),
                _dir: dir,
            }
        }

        fn ctx(&self) -> TaskContext<'_> {
            TaskContext {
                store: &self.store,
                cache: &self.cache,
                settings: &self.settings,
                extensions: &self.extensions,
                encoder: &JsonEncoder,
                events: &self.events,
            }
        }

        fn add_posts(&self, object_type: &str, ids: std::ops::RangeInclusive<i64>) {
            for id in ids {
                self.store
                    .upsert_content_item(&ContentItem {
                        id,
                        family: ContentFamily::Post,
                        object_type: object_type.into(),
                        title: format!("Post {}", id),
                        path: format!("/post-{}/", id),
                        status: ContentStatus::Publish,
                        noindex: false,
                        modified_at: "2024-05-01T12:00:00+00:00".into(),
                        images: vec![ImageRef {
                            url: format!("/img/{}.jpg", id),
                            modified_at: None,
                        }],
                    })
                    .unwrap();
            }
        }

        fn chunk(&self, bucket: &str, idx: u32) -> Option<Vec<SitemapRecord>> {
            self.cache
                .read_chunk(bucket, idx)
                .unwrap()
                .map(|b| serde_json::from_slice(&b).unwrap())
        }
    }

    #[test]
    fn test_chunk_index_formula() {
        assert_eq!(chunk_index(0, 20), 1);
        assert_eq!(chunk_index(19, 20), 1);
        assert_eq!(chunk_index(20, 20), 2);
        assert_eq!(chunk_index(45, 20), 3);
        assert_eq!(chunk_index(7, 1), 8);
    }

    #[test]
    fn test_sync_writes_chunk_and_index() {
        let fx = Fixture::new();
        fx.add_posts("post", 1..=25);

        let outcome = SyncTask::posts(20, "post", 20).run(&fx.ctx());
        assert!(outcome.success);
        assert_eq!(outcome.processed, 5);

        let records = fx.chunk("cpt-post", 2).unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 4, 3, 2, 1]);

        let index = fx.store.get_index("cpt-post").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].chunk_index, 2);
        assert_eq!(index[0].item_count, 5);
        assert_eq!(index[0].last_modified.as_deref(), Some("2024-05-01T12:00:00+00:00"));
    }

    #[test]
    fn test_empty_window_writes_nothing() {
        let fx = Fixture::new();
        fx.add_posts("post", 1..=3);

        let outcome = SyncTask::posts(20, "post", 20).run(&fx.ctx());
        assert!(outcome.success);
        assert_eq!(outcome.processed, 0);
        assert!(fx.chunk("cpt-post", 2).is_none());
        assert!(fx.store.get_index("cpt-post").unwrap().is_empty());
    }

    #[test]
    fn test_globally_noindexed_type_is_skipped() {
        let mut fx = Fixture::new();
        fx.add_posts("page", 1..=3);
        fx.settings.noindex_types = vec!["page".into()];

        let outcome = SyncTask::posts(0, "page", 20).run(&fx.ctx());
        assert!(outcome.success);
        assert_eq!(outcome.processed, 0);
        assert!(fx.chunk("cpt-page", 1).is_none());
    }

    #[test]
    fn test_images_follow_flag() {
        let mut fx = Fixture::new();
        fx.add_posts("post", 1..=2);

        SyncTask::posts(0, "post", 20).run(&fx.ctx());
        assert!(fx
            .chunk("cpt-post", 1)
            .unwrap()
            .iter()
            .all(|r| r.image_count == 0 && r.images.is_empty()));

        fx.settings.image_sitemap = true;
        SyncTask::posts(0, "post", 20).run(&fx.ctx());
        assert!(fx
            .chunk("cpt-post", 1)
            .unwrap()
            .iter()
            .all(|r| r.image_count == 1 && r.images.len() == 1));
    }

    #[test]
    fn test_extensions_shape_query_and_records() {
        let mut fx = Fixture::new();
        fx.add_posts("post", 1..=4);
        fx.extensions = Extensions::new()
            .with_query_augmenter(|q| q.excluding(&[4]))
            .with_record_transform(|mut r, item| {
                r.extra
                    .insert("family".into(), serde_json::json!(item.family.as_str()));
                r
            });

        SyncTask::posts(0, "post", 20).run(&fx.ctx());
        let records = fx.chunk("cpt-post", 1).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, 3);
        assert_eq!(records[0].extra["family"], "post");
    }

    #[test]
    fn test_taxonomy_uses_taxonomy_prefix() {
        let fx = Fixture::new();
        fx.store
            .upsert_content_item(&ContentItem {
                id: 9,
                family: ContentFamily::Term,
                object_type: "category".into(),
                title: "News".into(),
                path: "/category/news/".into(),
                status: ContentStatus::Publish,
                noindex: false,
                modified_at: "2024-01-01 00:00:00".into(),
                images: Vec::new(),
            })
            .unwrap();

        let outcome = SyncTask::taxonomy(0, "category", 20).run(&fx.ctx());
        assert!(outcome.success);
        assert_eq!(fx.chunk("tax-category", 1).unwrap()[0].title, "News");
    }

    #[test]
    fn test_zero_chunk_size_fails_without_writing() {
        let fx = Fixture::new();
        fx.add_posts("post", 1..=2);
        let outcome = SyncTask::posts(0, "post", 0).run(&fx.ctx());
        assert!(!outcome.success);
        assert!(fx.store.list_index_buckets().unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_clears_cursor_and_emits() {
        let fx = Fixture::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        fx.events.subscribe(move |e| sink.lock().push(e.clone()));
        fx.store.set_option(RESUME_CURSOR_OPTION, "3").unwrap();

        let outcome = CleanupTask.run(&fx.ctx());
        assert!(outcome.success);
        assert!(fx.store.get_option(RESUME_CURSOR_OPTION).unwrap().is_none());
        assert_eq!(*seen.lock(), vec![PipelineEvent::BatchProcessComplete]);
    }
}

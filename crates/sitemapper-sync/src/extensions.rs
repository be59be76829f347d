//! Extension points: query augmenters run before the content fetch, record
//! transforms run after base mapping. Both are ordered and optional.

use std::sync::Arc;

use sitemapper_store::{ContentItem, ContentQuery};
use tracing::warn;

use crate::record::SitemapRecord;

pub type QueryAugmenter = Arc<dyn Fn(ContentQuery) -> ContentQuery + Send + Sync>;
pub type RecordTransform = Arc<dyn Fn(SitemapRecord, &ContentItem) -> SitemapRecord + Send + Sync>;

#[derive(Clone, Default)]
pub struct Extensions {
    query_augmenters: Vec<QueryAugmenter>,
    record_transforms: Vec<RecordTransform>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_augmenter<F>(mut self, f: F) -> Self
    where
        F: Fn(ContentQuery) -> ContentQuery + Send + Sync + 'static,
    {
        self.query_augmenters.push(Arc::new(f));
        self
    }

    pub fn with_record_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(SitemapRecord, &ContentItem) -> SitemapRecord + Send + Sync + 'static,
    {
        self.record_transforms.push(Arc::new(f));
        self
    }

    /// Apply every augmenter in registration order.
    pub fn augment_query(&self, query: ContentQuery) -> ContentQuery {
        self.query_augmenters
            .iter()
            .fold(query, |q, augment| augment(q))
    }

    /// Apply every record transform in registration order.
    ///
    /// Extra keys that shadow a base field would serialize twice, so they
    /// are dropped with a warning.
    pub fn transform_record(&self, record: SitemapRecord, item: &ContentItem) -> SitemapRecord {
        let mut record = self
            .record_transforms
            .iter()
            .fold(record, |r, transform| transform(r, item));
        let dropped = record.drop_reserved_extras();
        if !dropped.is_empty() {
            warn!(
                "Record transform set reserved fields {:?} on {} #{}, ignoring them",
                dropped, item.object_type, item.id
            );
        }
        record
    }

    pub fn is_empty(&self) -> bool {
        self.query_augmenters.is_empty() && self.record_transforms.is_empty()
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("query_augmenters", &self.query_augmenters.len())
            .field("record_transforms", &self.record_transforms.len())
            .finish()
    }
}

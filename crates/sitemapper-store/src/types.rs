//! Data types for content items, queued jobs, index entries and leases.

use serde::{Deserialize, Serialize};

/// Content family a sitemap bucket is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFamily {
    /// Posts, pages and custom post types.
    Post,
    /// Taxonomy terms.
    Term,
}

impl ContentFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Term => "term",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(Self::Post),
            "term" => Some(Self::Term),
            _ => None,
        }
    }
}

/// Publication state of a content item. Only `Publish` is indexable by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Publish,
    Draft,
    Pending,
    Private,
    Trash,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Private => "private",
            Self::Trash => "trash",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "publish" => Some(Self::Publish),
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "private" => Some(Self::Private),
            "trash" => Some(Self::Trash),
            _ => None,
        }
    }
}

/// An image attached to a content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

/// A content item row from the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    pub family: ContentFamily,
    pub object_type: String,
    #[serde(default)]
    pub title: String,
    /// Site-relative permalink path (e.g. `/hello-world/`).
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_status")]
    pub status: ContentStatus,
    /// Per-item no-index flag.
    #[serde(default)]
    pub noindex: bool,
    /// Last modification time, RFC 3339.
    pub modified_at: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

fn default_status() -> ContentStatus {
    ContentStatus::Publish
}

/// Selector for one page of indexable content.
///
/// `offset`/`limit` only apply to fetches; counts and fingerprints ignore them.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentQuery {
    pub family: ContentFamily,
    pub object_type: String,
    pub offset: u64,
    pub limit: u64,
    pub statuses: Vec<ContentStatus>,
    pub excluded_ids: Vec<i64>,
}

impl ContentQuery {
    /// Query for published, indexable items of one object type.
    pub fn new(family: ContentFamily, object_type: impl Into<String>) -> Self {
        Self {
            family,
            object_type: object_type.into(),
            offset: 0,
            limit: 20,
            statuses: vec![ContentStatus::Publish],
            excluded_ids: Vec::new(),
        }
    }

    pub fn page(mut self, offset: u64, limit: u64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn excluding(mut self, ids: &[i64]) -> Self {
        self.excluded_ids.extend_from_slice(ids);
        self
    }
}

/// Summary of the indexable content behind one bucket, used for change detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BucketFingerprint {
    pub count: u64,
    pub max_id: Option<i64>,
    pub max_modified: Option<String>,
}

/// The record-shaping columns of one indexable row, streamed for checksums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigestRow {
    pub id: i64,
    pub title: String,
    pub path: String,
    pub modified_at: String,
    pub images_json: Option<String>,
}

/// A job row from the durable queue. The payload is opaque to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedJob {
    pub id: i64,
    pub kind: String,
    pub payload: String,
    pub enqueued_at: i64,
}

/// One produced chunk of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk_index: u32,
    pub item_count: u32,
    /// Newest record modification time in the chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// Aggregate view of one bucket's index record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketSummary {
    pub bucket: String,
    pub chunks: u32,
    pub items: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// Holder of the exclusive dispatch lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub owner: String,
    /// Expiry, epoch milliseconds.
    pub expires_at: i64,
}

impl Lease {
    pub fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }
}

//! Sitemapper Sync — content windows to cached sitemap chunks.
//!
//! Maps indexable content to records, serializes one chunk per window,
//! writes it through the cache store and keeps the index in step.

pub mod encode;
pub mod events;
pub mod extensions;
pub mod record;
pub mod task;

pub use encode::{ChunkEncoder, JsonEncoder};
pub use events::{EventBus, PipelineEvent};
pub use extensions::{Extensions, QueryAugmenter, RecordTransform};
pub use record::{map_item, normalize_timestamp, RecordImage, SitemapRecord, RESERVED_FIELDS};
pub use task::{chunk_index, CleanupTask, SyncTask, TaskContext, TaskOutcome, DEFAULT_CHUNK_SIZE};

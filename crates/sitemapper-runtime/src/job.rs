//! Jobs carried by the durable queue.

use serde::{Deserialize, Serialize};

use sitemapper_core::Result;
use sitemapper_store::QueuedJob;
use sitemapper_sync::{CleanupTask, SyncTask, TaskContext, TaskOutcome, DEFAULT_CHUNK_SIZE};

/// Window of one bucket handled by a sync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub offset: u64,
    pub object_type: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    /// Position in the regeneration plan that enqueued this job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

impl SyncPayload {
    pub fn new(offset: u64, object_type: impl Into<String>, chunk_size: u32) -> Self {
        Self {
            offset,
            object_type: object_type.into(),
            chunk_size,
            sequence: None,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Job {
    SyncPosts(SyncPayload),
    SyncTaxonomy(SyncPayload),
    Cleanup,
}

impl Job {
    pub fn sync_posts(offset: u64, object_type: impl Into<String>, chunk_size: u32) -> Self {
        Job::SyncPosts(SyncPayload::new(offset, object_type, chunk_size))
    }

    pub fn sync_taxonomy(offset: u64, object_type: impl Into<String>, chunk_size: u32) -> Self {
        Job::SyncTaxonomy(SyncPayload::new(offset, object_type, chunk_size))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Job::SyncPosts(_) => "sync_posts",
            Job::SyncTaxonomy(_) => "sync_taxonomy",
            Job::Cleanup => "cleanup",
        }
    }

    /// Plan position of a sync job, if it has one.
    pub fn sequence(&self) -> Option<u64> {
        match self {
            Job::SyncPosts(p) | Job::SyncTaxonomy(p) => p.sequence,
            Job::Cleanup => None,
        }
    }

    /// Execute the job. Never fails; problems are reported in the outcome.
    pub fn run(&self, ctx: &TaskContext<'_>) -> TaskOutcome {
        match self {
            Job::SyncPosts(p) => {
                SyncTask::posts(p.offset, p.object_type.clone(), p.chunk_size).run(ctx)
            }
            Job::SyncTaxonomy(p) => {
                SyncTask::taxonomy(p.offset, p.object_type.clone(), p.chunk_size).run(ctx)
            }
            Job::Cleanup => CleanupTask.run(ctx),
        }
    }

    /// Payload text stored alongside the kind in the queue.
    pub fn payload_json(&self) -> Result<String> {
        let payload = match self {
            Job::SyncPosts(p) | Job::SyncTaxonomy(p) => serde_json::to_string(p)?,
            Job::Cleanup => "null".to_string(),
        };
        Ok(payload)
    }

    /// Rebuild a job from its queue row.
    pub fn from_queued(row: &QueuedJob) -> Result<Self> {
        let payload: serde_json::Value = serde_json::from_str(&row.payload)?;
        let job = serde_json::from_value(serde_json::json!({
            "kind": row.kind,
            "payload": payload,
        }))?;
        Ok(job)
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::SyncPosts(p) | Job::SyncTaxonomy(p) => write!(
                f,
                "{}({}, offset={}, chunk_size={})",
                self.kind(),
                p.object_type,
                p.offset,
                p.chunk_size
            ),
            Job::Cleanup => f.write_str("cleanup"),
        }
    }
}

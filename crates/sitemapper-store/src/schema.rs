//! Database schema SQL.

/// Content store read by the sync tasks.
pub const CONTENT_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS content_items (
    family TEXT NOT NULL,
    id INTEGER NOT NULL,
    object_type TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    path TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'publish',
    noindex INTEGER NOT NULL DEFAULT 0,
    modified_at TEXT NOT NULL,
    images_json TEXT,
    PRIMARY KEY (family, id)
);

CREATE INDEX IF NOT EXISTS idx_content_bucket
    ON content_items(family, object_type, status, id);
"#;

/// Pipeline state: durable job queue, sitemap index, named options.
pub const PIPELINE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS job_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    enqueued_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sitemap_index (
    bucket TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    item_count INTEGER NOT NULL,
    last_modified TEXT,
    PRIMARY KEY (bucket, chunk_index)
);

CREATE TABLE IF NOT EXISTS options (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

/// Option holding the dispatch lease.
pub const LEASE_OPTION: &str = "dispatch_lease";

/// Plan position a resumed manual run starts from; absent when no run is in flight.
pub const RESUME_CURSOR_OPTION: &str = "sitemap_resume_cursor";

/// Version token of the content and settings the last full run covered.
pub const CHECKSUM_OPTION: &str = "sitemap_checksum";

/// Set while enqueued work has not yet been reported complete.
pub const GENERATION_PENDING_OPTION: &str = "sitemap_generation_pending";

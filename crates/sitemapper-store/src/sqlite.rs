//! SQLite-backed durable state: content store, job queue, sitemap index,
//! named options and the dispatch lease.
//!
//! One connection behind a mutex; every public method is a short transaction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::schema::{CONTENT_SCHEMA_SQL, LEASE_OPTION, PIPELINE_SCHEMA_SQL};
use crate::types::*;
use sitemapper_core::{Error, Result};

/// SQLite store shared by the pipeline, the triggers and the server.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the SQLite store.
    ///
    /// `db_dir` is the directory (e.g., `data/db/`). The file will be `db_dir/sitemapper.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("sitemapper.db");

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        info!(
            "SqliteStore initialized: {} queued jobs, path={}",
            store.queue_len()?,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;
        // CLI and server may share the file
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_err)?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let full_schema = format!("{}\n{}", CONTENT_SCHEMA_SQL, PIPELINE_SCHEMA_SQL);
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Content store
    // ---------------------------------------------------------------

    /// Insert or replace a content item.
    pub fn upsert_content_item(&self, item: &ContentItem) -> Result<()> {
        let images_json = if item.images.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&item.images)?)
        };

        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO content_items \
             (family, id, object_type, title, path, status, noindex, modified_at, images_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT(family, id) DO UPDATE SET \
             object_type = excluded.object_type, title = excluded.title, path = excluded.path, \
             status = excluded.status, noindex = excluded.noindex, \
             modified_at = excluded.modified_at, images_json = excluded.images_json",
        )
        .map_err(db_err)?
        .execute(params![
            item.family.as_str(),
            item.id,
            item.object_type,
            item.title,
            item.path,
            item.status.as_str(),
            item.noindex,
            item.modified_at,
            images_json,
        ])
        .map_err(db_err)?;
        Ok(())
    }

    /// Delete a content item. Returns true if it existed.
    pub fn delete_content_item(&self, family: ContentFamily, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "DELETE FROM content_items WHERE family = ?1 AND id = ?2",
                params![family.as_str(), id],
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Fetch one page of indexable items, newest id first.
    ///
    /// Rows that cannot be decoded are skipped with a warning rather than
    /// failing the page.
    pub fn fetch_indexable(&self, query: &ContentQuery) -> Result<Vec<ContentItem>> {
        if query.statuses.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }

        let (filter, mut values) = indexable_filter(query);
        let sql = format!(
            "SELECT family, id, object_type, title, path, status, noindex, modified_at, images_json \
             FROM content_items WHERE {} ORDER BY id DESC LIMIT ? OFFSET ?",
            filter
        );
        values.push(Value::Integer(query.limit as i64));
        values.push(Value::Integer(query.offset as i64));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_content_item)
            .map_err(db_err)?;

        let items = rows
            .filter_map(|r| match r {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("Skipping malformed content row ({}): {}", query.object_type, e);
                    None
                }
            })
            .collect();
        Ok(items)
    }

    /// Count indexable items matching a query (offset and limit ignored).
    pub fn count_indexable(&self, query: &ContentQuery) -> Result<u64> {
        Ok(self.bucket_fingerprint(query)?.count)
    }

    /// Count, newest id and newest modification time of the indexable items
    /// matching a query.
    pub fn bucket_fingerprint(&self, query: &ContentQuery) -> Result<BucketFingerprint> {
        if query.statuses.is_empty() {
            return Ok(BucketFingerprint::default());
        }

        let (filter, values) = indexable_filter(query);
        let sql = format!(
            "SELECT COUNT(*), MAX(id), MAX(modified_at) FROM content_items WHERE {}",
            filter
        );

        let conn = self.conn.lock();
        let fingerprint = conn
            .prepare_cached(&sql)
            .map_err(db_err)?
            .query_row(params_from_iter(values.iter()), |row| {
                Ok(BucketFingerprint {
                    count: row.get::<_, i64>(0)? as u64,
                    max_id: row.get(1)?,
                    max_modified: row.get(2)?,
                })
            })
            .map_err(db_err)?;
        Ok(fingerprint)
    }

    /// Visit every indexable row matching a query in ascending id order
    /// (offset and limit ignored), one row at a time.
    pub fn for_each_indexable<F>(&self, query: &ContentQuery, mut visit: F) -> Result<()>
    where
        F: FnMut(&ContentDigestRow),
    {
        if query.statuses.is_empty() {
            return Ok(());
        }

        let (filter, values) = indexable_filter(query);
        let sql = format!(
            "SELECT id, title, path, modified_at, images_json \
             FROM content_items WHERE {} ORDER BY id ASC",
            filter
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
        let mut rows = stmt.query(params_from_iter(values.iter())).map_err(db_err)?;
        while let Some(row) = rows.next().map_err(db_err)? {
            let digest = ContentDigestRow {
                id: row.get(0).map_err(db_err)?,
                title: row.get(1).map_err(db_err)?,
                path: row.get(2).map_err(db_err)?,
                modified_at: row.get(3).map_err(db_err)?,
                images_json: row.get(4).map_err(db_err)?,
            };
            visit(&digest);
        }
        Ok(())
    }

    fn row_to_content_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContentItem> {
        let family: String = row.get(0)?;
        let status: String = row.get(5)?;
        let images_json: Option<String> = row.get(8)?;

        let family = ContentFamily::parse(&family).ok_or_else(|| conversion_err(0, &family))?;
        let status = ContentStatus::parse(&status).ok_or_else(|| conversion_err(5, &status))?;
        let images = match images_json.as_deref() {
            Some(json) if !json.is_empty() => serde_json::from_str(json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
            })?,
            _ => Vec::new(),
        };

        Ok(ContentItem {
            family,
            id: row.get(1)?,
            object_type: row.get(2)?,
            title: row.get(3)?,
            path: row.get(4)?,
            status,
            noindex: row.get(6)?,
            modified_at: row.get(7)?,
            images,
        })
    }

    // ---------------------------------------------------------------
    // Job queue
    // ---------------------------------------------------------------

    /// Append a serialized job. Returns the queue row id.
    pub fn push_job(&self, kind: &str, payload: &str) -> Result<i64> {
        let now = now_millis();
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO job_queue (kind, payload_json, enqueued_at) VALUES (?1, ?2, ?3)",
            )
            .map_err(db_err)?
            .insert(params![kind, payload, now])
            .map_err(db_err)?;
        debug!("Queued job {} ({})", id, kind);
        Ok(id)
    }

    /// The oldest queued job, left in place.
    pub fn front_job(&self) -> Result<Option<QueuedJob>> {
        let conn = self.conn.lock();
        let job = conn
            .prepare_cached(
                "SELECT id, kind, payload_json, enqueued_at FROM job_queue ORDER BY id ASC LIMIT 1",
            )
            .map_err(db_err)?
            .query_row([], Self::row_to_job)
            .optional()
            .map_err(db_err)?;
        Ok(job)
    }

    /// Remove a job by row id. Returns true if it was still queued.
    pub fn remove_job(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM job_queue WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Number of queued jobs.
    pub fn queue_len(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM job_queue", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as u64)
    }

    /// Queued jobs in dispatch order.
    pub fn list_jobs(&self, limit: usize) -> Result<Vec<QueuedJob>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, kind, payload_json, enqueued_at FROM job_queue ORDER BY id ASC LIMIT ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![limit as i64], Self::row_to_job)
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Drop every queued job. Returns how many were removed.
    pub fn clear_queue(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count = conn.execute("DELETE FROM job_queue", []).map_err(db_err)?;
        Ok(count)
    }

    fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueuedJob> {
        Ok(QueuedJob {
            id: row.get(0)?,
            kind: row.get(1)?,
            payload: row.get(2)?,
            enqueued_at: row.get(3)?,
        })
    }

    // ---------------------------------------------------------------
    // Sitemap index
    // ---------------------------------------------------------------

    /// Record that `chunk_index` of `bucket` holds `item_count` records.
    ///
    /// Replaces any prior entry for the same chunk; counts never accumulate.
    pub fn upsert_index(
        &self,
        bucket: &str,
        chunk_index: u32,
        item_count: u32,
        last_modified: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO sitemap_index (bucket, chunk_index, item_count, last_modified) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(bucket, chunk_index) DO UPDATE SET \
             item_count = excluded.item_count, last_modified = excluded.last_modified",
        )
        .map_err(db_err)?
        .execute(params![bucket, chunk_index, item_count, last_modified])
        .map_err(db_err)?;
        Ok(())
    }

    /// Entries of one bucket ordered by chunk index.
    pub fn get_index(&self, bucket: &str) -> Result<Vec<IndexEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT chunk_index, item_count, last_modified FROM sitemap_index \
                 WHERE bucket = ?1 ORDER BY chunk_index ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![bucket], |row| {
                Ok(IndexEntry {
                    chunk_index: row.get(0)?,
                    item_count: row.get(1)?,
                    last_modified: row.get(2)?,
                })
            })
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// One summary row per bucket present in the index.
    pub fn list_index_buckets(&self) -> Result<Vec<BucketSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT bucket, COUNT(*), SUM(item_count), MAX(last_modified) FROM sitemap_index \
                 GROUP BY bucket ORDER BY bucket ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(BucketSummary {
                    bucket: row.get(0)?,
                    chunks: row.get(1)?,
                    items: row.get::<_, i64>(2)? as u64,
                    last_modified: row.get(3)?,
                })
            })
            .map_err(db_err)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ---------------------------------------------------------------
    // Options
    // ---------------------------------------------------------------

    pub fn get_option(&self, name: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .prepare_cached("SELECT value FROM options WHERE name = ?1")
            .map_err(db_err)?
            .query_row(params![name], |row| row.get(0))
            .optional()
            .map_err(db_err)?;
        Ok(value)
    }

    pub fn set_option(&self, name: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO options (name, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .map_err(db_err)?
        .execute(params![name, value, now_millis()])
        .map_err(db_err)?;
        Ok(())
    }

    /// Delete an option. Returns true if it was set.
    pub fn delete_option(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM options WHERE name = ?1", params![name])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    // ---------------------------------------------------------------
    // Dispatch lease
    // ---------------------------------------------------------------

    /// Take the dispatch lease for `owner` unless another owner holds a live one.
    ///
    /// Re-acquiring an owned lease extends it. Runs as an immediate
    /// transaction so two processes sharing the file cannot both win.
    pub fn try_acquire_lease(&self, owner: &str, ttl: Duration, now_ms: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let current: Option<String> = tx
            .query_row(
                "SELECT value FROM options WHERE name = ?1",
                params![LEASE_OPTION],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        if let Some(raw) = current {
            match serde_json::from_str::<Lease>(&raw) {
                Ok(lease) if lease.owner != owner && lease.is_live(now_ms) => {
                    debug!("Dispatch lease held by {} until {}", lease.owner, lease.expires_at);
                    return Ok(false);
                }
                Ok(_) => {}
                Err(e) => warn!("Discarding unreadable dispatch lease: {}", e),
            }
        }

        let lease = Lease {
            owner: owner.to_string(),
            expires_at: now_ms + ttl.as_millis() as i64,
        };
        tx.execute(
            "INSERT INTO options (name, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![LEASE_OPTION, serde_json::to_string(&lease)?, now_ms],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(true)
    }

    /// Release the lease if `owner` holds it. Returns true if released.
    pub fn release_lease(&self, owner: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "DELETE FROM options WHERE name = ?1 AND json_extract(value, '$.owner') = ?2",
                params![LEASE_OPTION, owner],
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// The live lease, if any.
    pub fn current_lease(&self, now_ms: i64) -> Result<Option<Lease>> {
        let lease = self
            .get_option(LEASE_OPTION)?
            .and_then(|raw| serde_json::from_str::<Lease>(&raw).ok())
            .filter(|lease| lease.is_live(now_ms));
        Ok(lease)
    }
}

/// WHERE clause and bound values shared by fetches, counts and fingerprints.
fn indexable_filter(query: &ContentQuery) -> (String, Vec<Value>) {
    let mut clauses = vec![
        "family = ?".to_string(),
        "object_type = ?".to_string(),
        "noindex = 0".to_string(),
    ];
    let mut values = vec![
        Value::Text(query.family.as_str().to_string()),
        Value::Text(query.object_type.clone()),
    ];

    let status_marks = vec!["?"; query.statuses.len()].join(", ");
    clauses.push(format!("status IN ({})", status_marks));
    values.extend(
        query
            .statuses
            .iter()
            .map(|s| Value::Text(s.as_str().to_string())),
    );

    if !query.excluded_ids.is_empty() {
        let id_marks = vec!["?"; query.excluded_ids.len()].join(", ");
        clauses.push(format!("id NOT IN ({})", id_marks));
        values.extend(query.excluded_ids.iter().map(|id| Value::Integer(*id)));
    }

    (clauses.join(" AND "), values)
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

fn conversion_err(column: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        format!("unexpected value '{}'", value).into(),
    )
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

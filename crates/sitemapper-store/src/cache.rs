//! File-based artifact cache for sitemap chunks.
//!
//! Artifacts live under `<root>/sitemap/` as
//! `{namespace_prefix}-{sanitized_object_type}-chunk-{n}.json`. The index of
//! produced chunks is kept in SQLite so readers never rescan the directory.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::sqlite::SqliteStore;
use crate::types::{BucketSummary, IndexEntry};
use sitemapper_core::{Error, Result};

/// Directory (relative to the cache root) holding chunk artifacts.
pub const SITEMAP_DIR: &str = "sitemap";

/// Lowercase a key and drop everything but `a-z`, `0-9`, `_` and `-`.
pub fn sanitize_key(key: &str) -> String {
    key.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

/// Bucket name for a namespace prefix and object type.
pub fn bucket_name(namespace_prefix: &str, object_type: &str) -> String {
    format!("{}-{}", namespace_prefix, sanitize_key(object_type))
}

/// Cache-relative path of one chunk artifact.
pub fn chunk_path(bucket: &str, chunk_index: u32) -> String {
    format!("{}/{}-chunk-{}.json", SITEMAP_DIR, bucket, chunk_index)
}

/// Durable, path-addressed artifact store plus the per-bucket index.
pub struct CacheStore {
    root: PathBuf,
    db: Arc<SqliteStore>,
}

impl CacheStore {
    pub fn new(root: impl AsRef<Path>, db: Arc<SqliteStore>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            db,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensure the artifact directory structure exists. Safe to call repeatedly.
    pub fn init(&self) -> Result<()> {
        std::fs::create_dir_all(self.root.join(SITEMAP_DIR))?;
        Ok(())
    }

    /// Write (overwriting) the artifact at a cache-relative path.
    ///
    /// Bytes go to a temporary sibling first and are renamed into place, so a
    /// reader sees either the old or the new artifact.
    pub fn store(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        let parent = target
            .parent()
            .ok_or_else(|| Error::Storage(format!("artifact path has no parent: {}", path)))?;
        std::fs::create_dir_all(parent)?;

        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Storage(format!("invalid artifact path: {}", path)))?;
        let tmp = parent.join(format!(".{}.tmp", file_name));

        std::fs::write(&tmp, bytes)?;
        if let Err(e) = std::fs::rename(&tmp, &target) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        debug!("Stored {} ({} bytes)", path, bytes.len());
        Ok(())
    }

    /// Read an artifact by cache-relative path. `None` when absent.
    pub fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let target = self.resolve(path)?;
        match std::fs::read(&target) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read contract for renderers: the stored chunk or `None`.
    pub fn read_chunk(&self, bucket: &str, chunk_index: u32) -> Result<Option<Vec<u8>>> {
        self.read(&chunk_path(bucket, chunk_index))
    }

    /// Replace the index entry for one chunk of a bucket.
    pub fn upsert_index(
        &self,
        bucket: &str,
        chunk_index: u32,
        item_count: u32,
        last_modified: Option<&str>,
    ) -> Result<()> {
        self.db
            .upsert_index(bucket, chunk_index, item_count, last_modified)
    }

    /// Produced chunks of a bucket, in chunk order.
    pub fn index(&self, bucket: &str) -> Result<Vec<IndexEntry>> {
        self.db.get_index(bucket)
    }

    /// Every bucket present in the index.
    pub fn buckets(&self) -> Result<Vec<BucketSummary>> {
        self.db.list_index_buckets()
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(Error::Storage(format!(
                "artifact path must stay inside the cache: {}",
                path
            )));
        }
        Ok(self.root.join(rel))
    }
}

//! Sitemapper Store — SQLite durable state (content, queue, index, options)
//! and the file-based chunk cache.

pub mod cache;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use cache::{bucket_name, chunk_path, sanitize_key, CacheStore};
pub use schema::{CHECKSUM_OPTION, GENERATION_PENDING_OPTION, RESUME_CURSOR_OPTION};
pub use sqlite::SqliteStore;
pub use types::*;

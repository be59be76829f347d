//! Configuration, data directory management, and persisted sitemap settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::host::HostLimits;
use crate::{Error, Result};

/// Paths to all Sitemapper data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// SQLite directory holding queue, index, options and content (`data/db/`).
    pub db: PathBuf,
    /// Artifact cache root (`data/cache/`). Chunks live under `sitemap/`.
    pub cache: PathBuf,
    /// Sitemap settings (`data/settings.json`).
    pub settings_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            db: root.join("db"),
            cache: root.join("cache"),
            settings_file: root.join("settings.json"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    /// Create all required directories.
    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.db)?;
        std::fs::create_dir_all(&self.cache)?;
        Ok(())
    }
}

/// Top-level process configuration.
#[derive(Debug, Clone)]
pub struct SitemapperConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Seconds between recurring dispatch ticks.
    pub dispatch_interval_secs: u64,
    /// How long a dispatch lease stays valid without release.
    pub lease_ttl_secs: u64,
    /// Host-reported execution ceilings used to derive the dispatch budget.
    pub host_limits: HostLimits,
}

impl SitemapperConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = env_parse("PORT").unwrap_or(3004);
        let dispatch_interval_secs = env_parse("SITEMAPPER_DISPATCH_INTERVAL_SECS").unwrap_or(60);
        let lease_ttl_secs = env_parse("SITEMAPPER_LEASE_TTL_SECS").unwrap_or(120);

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            port,
            data_paths,
            dispatch_interval_secs,
            lease_ttl_secs,
            host_limits: HostLimits::discover(),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Sitemap-relevant settings, persisted as JSON.
///
/// Every field has a serde default so partial or older files still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitemapSettings {
    /// Public site origin used to build record URLs.
    #[serde(default = "default_site_url")]
    pub site_url: String,
    /// Public path of the sitemap index.
    #[serde(default = "default_sitemap_slug")]
    pub sitemap_slug: String,
    /// Namespace prefix for post-family buckets.
    #[serde(default = "default_cpt_prefix")]
    pub cpt_prefix: String,
    /// Namespace prefix for taxonomy buckets.
    #[serde(default = "default_taxonomy_prefix")]
    pub taxonomy_prefix: String,
    /// Records per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    /// Post types included in a full run, in enqueue order.
    #[serde(default = "default_post_types")]
    pub post_types: Vec<String>,
    /// Taxonomies included in a full run, in enqueue order.
    #[serde(default = "default_taxonomies")]
    pub taxonomies: Vec<String>,
    /// Object types that are globally flagged no-index.
    #[serde(default)]
    pub noindex_types: Vec<String>,
    /// Individual item ids excluded from every bucket.
    #[serde(default)]
    pub excluded_ids: Vec<i64>,
    /// Whether records carry their image lists.
    #[serde(default)]
    pub image_sitemap: bool,
}

fn default_site_url() -> String {
    "http://localhost".into()
}
fn default_sitemap_slug() -> String {
    "sitemap.xml".into()
}
fn default_cpt_prefix() -> String {
    "cpt".into()
}
fn default_taxonomy_prefix() -> String {
    "tax".into()
}
fn default_chunk_size() -> u32 {
    20
}
fn default_post_types() -> Vec<String> {
    vec!["post".into(), "page".into()]
}
fn default_taxonomies() -> Vec<String> {
    vec!["category".into(), "post_tag".into()]
}

impl Default for SitemapSettings {
    fn default() -> Self {
        Self {
            site_url: default_site_url(),
            sitemap_slug: default_sitemap_slug(),
            cpt_prefix: default_cpt_prefix(),
            taxonomy_prefix: default_taxonomy_prefix(),
            chunk_size: default_chunk_size(),
            post_types: default_post_types(),
            taxonomies: default_taxonomies(),
            noindex_types: Vec::new(),
            excluded_ids: Vec::new(),
            image_sitemap: false,
        }
    }
}

impl SitemapSettings {
    /// Load settings from a JSON file, or return defaults when missing or unreadable.
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save settings to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".into()));
        }
        if self.cpt_prefix.is_empty() || self.taxonomy_prefix.is_empty() {
            return Err(Error::Config("namespace prefixes must not be empty".into()));
        }
        if self.cpt_prefix == self.taxonomy_prefix {
            return Err(Error::Config(format!(
                "cpt_prefix and taxonomy_prefix must differ (both '{}')",
                self.cpt_prefix
            )));
        }
        Ok(())
    }

    /// Whether an object type is globally flagged no-index.
    pub fn is_noindex_type(&self, object_type: &str) -> bool {
        self.noindex_types.iter().any(|t| t == object_type)
    }
}

//! Normalized sitemap records and the mapping from content items.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

use sitemapper_core::SitemapSettings;
use sitemapper_store::ContentItem;

/// An image entry of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordImage {
    pub url: String,
    pub last_modified: String,
}

/// One indexable item as written into a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitemapRecord {
    pub id: i64,
    /// Post title or term name.
    pub title: String,
    pub url: String,
    pub object_type: String,
    /// ISO 8601 / RFC 3339.
    pub last_modified: String,
    pub image_count: usize,
    pub images: Vec<RecordImage>,
    /// Fields added by record transforms. Keys naming a base field are
    /// dropped before encoding; transforms edit base fields directly.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Serialized names of the base fields of [`SitemapRecord`].
pub const RESERVED_FIELDS: &[&str] = &[
    "id",
    "title",
    "url",
    "object_type",
    "last_modified",
    "image_count",
    "images",
];

impl SitemapRecord {
    /// Remove `extra` keys that collide with base fields. Returns the removed keys.
    pub fn drop_reserved_extras(&mut self) -> Vec<String> {
        let clashing: Vec<String> = self
            .extra
            .keys()
            .filter(|key| RESERVED_FIELDS.contains(&key.as_str()))
            .cloned()
            .collect();
        for key in &clashing {
            self.extra.remove(key);
        }
        clashing
    }
}

/// Map a content item to its base record.
///
/// Returns `None` for items that cannot be represented (non-positive id,
/// empty path, unparsable modification time). Images are only carried when
/// the image sitemap is enabled.
pub fn map_item(item: &ContentItem, settings: &SitemapSettings) -> Option<SitemapRecord> {
    if item.id <= 0 {
        return None;
    }
    let path = item.path.trim();
    if path.is_empty() {
        return None;
    }
    let last_modified = normalize_timestamp(&item.modified_at)?;

    let images: Vec<RecordImage> = if settings.image_sitemap {
        item.images
            .iter()
            .filter(|img| !img.url.trim().is_empty())
            .map(|img| RecordImage {
                url: absolute_url(&settings.site_url, img.url.trim()),
                last_modified: img
                    .modified_at
                    .as_deref()
                    .and_then(normalize_timestamp)
                    .unwrap_or_else(|| last_modified.clone()),
            })
            .collect()
    } else {
        Vec::new()
    };

    Some(SitemapRecord {
        id: item.id,
        title: item.title.trim().to_string(),
        url: absolute_url(&settings.site_url, path),
        object_type: item.object_type.clone(),
        last_modified,
        image_count: images.len(),
        images,
        extra: serde_json::Map::new(),
    })
}

/// Normalize a stored timestamp to RFC 3339 with second precision.
///
/// Accepts RFC 3339 and `YYYY-MM-DD HH:MM:SS` (taken as UTC).
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, false))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Join a site origin and a path; absolute URLs pass through.
fn absolute_url(site_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        site_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

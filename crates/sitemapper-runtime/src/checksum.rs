//! Version token over indexable content and sitemap settings.
//!
//! Triggers compare it against the stored token to decide whether a full
//! regeneration is warranted. The pipeline itself never reads it.

use sha2::{Digest, Sha256};
use tracing::debug;

use sitemapper_core::{Result, SitemapSettings};
use sitemapper_store::{ContentFamily, ContentQuery, SqliteStore, CHECKSUM_OPTION};
use sitemapper_sync::Extensions;

/// Hex SHA-256 over the settings that shape output and, per bucket, every
/// indexable row's record-shaping columns in id order.
pub fn compute(
    store: &SqliteStore,
    settings: &SitemapSettings,
    extensions: &Extensions,
) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(settings)?);

    let families = settings
        .post_types
        .iter()
        .map(|t| (ContentFamily::Post, t))
        .chain(settings.taxonomies.iter().map(|t| (ContentFamily::Term, t)));

    for (family, object_type) in families {
        let query = extensions.augment_query(
            ContentQuery::new(family, object_type.clone()).excluding(&settings.excluded_ids),
        );
        hasher.update(format!("[{}:{}]\n", family.as_str(), object_type).as_bytes());
        let mut rows = 0u64;
        store.for_each_indexable(&query, |row| {
            rows += 1;
            // Fields are length-prefixed so shifting text between them changes the token.
            for field in [
                row.title.as_str(),
                row.path.as_str(),
                row.modified_at.as_str(),
                row.images_json.as_deref().unwrap_or(""),
            ] {
                hasher.update((field.len() as u64).to_le_bytes());
                hasher.update(field.as_bytes());
            }
            hasher.update(row.id.to_le_bytes());
        })?;
        debug!("Checksum over {} {} rows", rows, object_type);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// The recorded token, if any.
pub fn stored(store: &SqliteStore) -> Result<Option<String>> {
    store.get_option(CHECKSUM_OPTION)
}

/// True when the recorded token matches the current content.
pub fn is_fresh(
    store: &SqliteStore,
    settings: &SitemapSettings,
    extensions: &Extensions,
) -> Result<bool> {
    let Some(recorded) = stored(store)? else {
        return Ok(false);
    };
    let current = compute(store, settings, extensions)?;
    debug!("Checksum recorded={} current={}", recorded, current);
    Ok(recorded == current)
}

pub fn record(store: &SqliteStore, token: &str) -> Result<()> {
    store.set_option(CHECKSUM_OPTION, token)
}

/// Invalidate the token so the next trigger treats every bucket as stale.
pub fn clear(store: &SqliteStore) -> Result<bool> {
    store.delete_option(CHECKSUM_OPTION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitemapper_store::{ContentItem, ContentStatus, ImageRef};

    fn post(id: i64, modified_at: &str) -> ContentItem {
        ContentItem {
            id,
            family: ContentFamily::Post,
            object_type: "post".into(),
            title: format!("Post {}", id),
            path: format!("/p/{}/", id),
            status: ContentStatus::Publish,
            noindex: false,
            modified_at: modified_at.into(),
            images: Vec::new(),
        }
    }

    #[test]
    fn test_token_tracks_content_and_settings() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        let settings = SitemapSettings::default();
        let ext = Extensions::default();

        store.upsert_content_item(&post(1, "2024-01-01T00:00:00+00:00")).unwrap();
        let first = compute(&store, &settings, &ext).unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(first, compute(&store, &settings, &ext).unwrap());

        store.upsert_content_item(&post(1, "2024-02-01T00:00:00+00:00")).unwrap();
        let second = compute(&store, &settings, &ext).unwrap();
        assert_ne!(first, second);

        let renamed = SitemapSettings {
            cpt_prefix: "type".into(),
            ..settings.clone()
        };
        assert_ne!(second, compute(&store, &renamed, &ext).unwrap());
    }

    #[test]
    fn test_token_tracks_record_fields_without_timestamp_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        let settings = SitemapSettings::default();
        let ext = Extensions::default();
        let moved = |path: &str| ContentItem {
            path: path.into(),
            ..post(1, "2024-01-01T00:00:00+00:00")
        };

        store.upsert_content_item(&moved("/old/")).unwrap();
        store.upsert_content_item(&post(2, "2024-01-01T00:00:00+00:00")).unwrap();
        record(&store, &compute(&store, &settings, &ext).unwrap()).unwrap();

        store.upsert_content_item(&moved("/new-url/")).unwrap();
        assert!(!is_fresh(&store, &settings, &ext).unwrap());
        record(&store, &compute(&store, &settings, &ext).unwrap()).unwrap();

        store
            .upsert_content_item(&ContentItem {
                title: "Renamed".into(),
                ..moved("/new-url/")
            })
            .unwrap();
        assert!(!is_fresh(&store, &settings, &ext).unwrap());
        record(&store, &compute(&store, &settings, &ext).unwrap()).unwrap();

        // Swap which of two items is hidden: count and maxima stay the same.
        let hidden = |id: i64| ContentItem {
            noindex: true,
            ..post(id, "2024-01-01T00:00:00+00:00")
        };
        store.upsert_content_item(&post(3, "2024-01-01T00:00:00+00:00")).unwrap();
        store.upsert_content_item(&hidden(2)).unwrap();
        let second_hidden = compute(&store, &settings, &ext).unwrap();
        store.upsert_content_item(&post(2, "2024-01-01T00:00:00+00:00")).unwrap();
        store
            .upsert_content_item(&ContentItem {
                noindex: true,
                ..moved("/new-url/")
            })
            .unwrap();
        assert_ne!(second_hidden, compute(&store, &settings, &ext).unwrap());

        store
            .upsert_content_item(&ContentItem {
                images: vec![ImageRef {
                    url: "https://example.com/a.png".into(),
                    modified_at: None,
                }],
                ..post(2, "2024-01-01T00:00:00+00:00")
            })
            .unwrap();
        let with_image = compute(&store, &settings, &ext).unwrap();
        store.upsert_content_item(&post(2, "2024-01-01T00:00:00+00:00")).unwrap();
        assert_ne!(with_image, compute(&store, &settings, &ext).unwrap());
    }

    #[test]
    fn test_fresh_after_record_and_stale_after_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        let settings = SitemapSettings::default();
        let ext = Extensions::default();

        assert!(!is_fresh(&store, &settings, &ext).unwrap());
        record(&store, &compute(&store, &settings, &ext).unwrap()).unwrap();
        assert!(is_fresh(&store, &settings, &ext).unwrap());

        assert!(clear(&store).unwrap());
        assert!(!is_fresh(&store, &settings, &ext).unwrap());
    }
}

//! Public sitemap URLs, served from the chunk cache.
//!
//! XML rendering belongs to the renderer; this handler hands out the index
//! and cached chunk JSON for whatever the router resolves.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, error};

use sitemapper_core::{Result, SitemapSettings};
use sitemapper_store::{bucket_name, CacheStore};

use crate::routing::{self, listing_url, SitemapRoute};
use crate::state::AppState;

/// Fallback handler for every non-API path.
pub async fn serve_public(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let settings = state.settings();
    let Some(route) = routing::resolve(uri.path(), &settings) else {
        return not_found();
    };
    debug!("{} resolved to {:?}", uri.path(), route);

    let cache = state.scheduler.cache();
    match route {
        SitemapRoute::Index => match index_document(cache, &settings) {
            Ok(doc) => Json(doc).into_response(),
            Err(e) => server_error(e),
        },
        SitemapRoute::Stylesheet { object_type } => (
            StatusCode::NOT_IMPLEMENTED,
            Json(serde_json::json!({
                "error": "Stylesheets are produced by the sitemap renderer",
                "objectType": object_type,
            })),
        )
            .into_response(),
        SitemapRoute::Listing {
            bucket,
            prefix,
            page,
        } => match listing_chunk(cache, &settings, &bucket, prefix.as_deref(), page) {
            Ok(Some(bytes)) => ([(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
            Ok(None) => not_found(),
            Err(e) => server_error(e),
        },
    }
}

/// Every produced chunk, as listing URLs with counts and modification times.
pub fn index_document(cache: &CacheStore, settings: &SitemapSettings) -> Result<serde_json::Value> {
    let mut sitemaps = Vec::new();
    for summary in cache.buckets()? {
        for entry in cache.index(&summary.bucket)? {
            sitemaps.push(serde_json::json!({
                "bucket": summary.bucket,
                "page": entry.chunk_index,
                "items": entry.item_count,
                "url": listing_url(&settings.site_url, &summary.bucket, entry.chunk_index),
                "lastModified": entry.last_modified,
            }));
        }
    }
    Ok(serde_json::json!({
        "total": sitemaps.len(),
        "sitemaps": sitemaps,
    }))
}

/// Cached chunk for a listing. Without a prefix the post bucket is tried
/// before the taxonomy bucket.
pub fn listing_chunk(
    cache: &CacheStore,
    settings: &SitemapSettings,
    bucket: &str,
    prefix: Option<&str>,
    page: u32,
) -> Result<Option<Vec<u8>>> {
    let candidates = match prefix {
        Some(prefix) => vec![bucket_name(prefix, bucket)],
        None => vec![
            bucket_name(&settings.cpt_prefix, bucket),
            bucket_name(&settings.taxonomy_prefix, bucket),
        ],
    };
    for candidate in candidates {
        if let Some(bytes) = cache.read_chunk(&candidate, page)? {
            return Ok(Some(bytes));
        }
    }
    Ok(None)
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not found" })),
    )
        .into_response()
}

fn server_error(e: sitemapper_core::Error) -> Response {
    error!("Failed to serve sitemap: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
        .into_response()
}

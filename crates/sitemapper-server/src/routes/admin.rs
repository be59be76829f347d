//! Sitemap generation admin routes.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, info};

use sitemapper_core::{Error, SitemapSettings};
use sitemapper_runtime::{trigger, Scheduler, SystemProbe};

use crate::state::AppState;

type ApiResult = Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)>;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sitemap/status", get(get_status))
        .route("/sitemap/regenerate", post(regenerate))
        .route("/sitemap/resume", post(resume))
        .route("/sitemap/dispatch", post(dispatch))
        .route("/sitemap/deactivate", post(deactivate))
        .route("/sitemap/settings", get(get_settings).put(put_settings))
}

#[derive(Debug, Default, Deserialize)]
struct RegenerateQuery {
    #[serde(default)]
    force: bool,
}

/// GET /api/sitemap/status — queue, lease and produced buckets.
async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult {
    let scheduler = &state.scheduler;
    let status = scheduler.status().map_err(internal)?;
    let buckets = scheduler.cache().buckets().map_err(internal)?;
    let guard = scheduler.guard();

    Ok(Json(serde_json::json!({
        "queue": status,
        "buckets": buckets,
        "budget": {
            "timeBudgetSecs": guard.time_budget().as_secs_f64(),
            "memoryBudgetMb": guard.memory_budget() / (1024 * 1024),
        },
    })))
}

/// POST /api/sitemap/regenerate?force=bool — enqueue a run and dispatch one tick.
async fn regenerate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RegenerateQuery>,
) -> ApiResult {
    let force = query.force;
    run_blocking(&state, move |scheduler| {
        let probe = SystemProbe::start();
        let outcome = trigger::regenerate(scheduler, force)?;
        let report = scheduler.dispatch(&probe)?;
        info!("Manual regenerate (force={}): {:?}", force, outcome);
        Ok(serde_json::json!({ "outcome": outcome, "dispatch": report }))
    })
    .await
}

/// POST /api/sitemap/resume — continue an interrupted manual run.
async fn resume(State(state): State<Arc<AppState>>) -> ApiResult {
    run_blocking(&state, |scheduler| {
        let probe = SystemProbe::start();
        let outcome = trigger::resume(scheduler)?;
        let report = scheduler.dispatch(&probe)?;
        Ok(serde_json::json!({ "outcome": outcome, "dispatch": report }))
    })
    .await
}

/// POST /api/sitemap/dispatch — run one budget-bounded tick.
async fn dispatch(State(state): State<Arc<AppState>>) -> ApiResult {
    run_blocking(&state, |scheduler| {
        let report = scheduler.dispatch(&SystemProbe::start())?;
        Ok(serde_json::json!(report))
    })
    .await
}

/// POST /api/sitemap/deactivate — forget the cursor and checksum.
async fn deactivate(State(state): State<Arc<AppState>>) -> ApiResult {
    run_blocking(&state, |scheduler| {
        trigger::deactivate(scheduler)?;
        Ok(serde_json::json!({ "deactivated": true }))
    })
    .await
}

/// GET /api/sitemap/settings
async fn get_settings(State(state): State<Arc<AppState>>) -> Json<SitemapSettings> {
    Json(state.settings())
}

/// PUT /api/sitemap/settings — validate, persist and apply.
async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<SitemapSettings>,
) -> ApiResult {
    match state.update_settings(settings) {
        Ok(()) => Ok(Json(serde_json::json!(state.settings()))),
        Err(Error::Config(msg)) => Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": msg })),
        )),
        Err(e) => Err(internal(e)),
    }
}

/// Run scheduler work on the blocking pool.
async fn run_blocking<F>(state: &Arc<AppState>, f: F) -> ApiResult
where
    F: FnOnce(&Scheduler) -> sitemapper_core::Result<serde_json::Value> + Send + 'static,
{
    let scheduler = state.scheduler.clone();
    match tokio::task::spawn_blocking(move || f(&scheduler)).await {
        Ok(Ok(body)) => Ok(Json(body)),
        Ok(Err(e)) => Err(internal(e)),
        Err(e) => {
            error!("Sitemap task panicked: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Sitemap task failed" })),
            ))
        }
    }
}

fn internal(e: Error) -> (StatusCode, Json<serde_json::Value>) {
    error!("Sitemap admin request failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::build_router;
    use axum::body::Body;
    use axum::http::Request;
    use sitemapper_core::SitemapperConfig;
    use sitemapper_store::{ContentFamily, ContentItem, ContentStatus};
    use tower::ServiceExt;

    fn app_state() -> (Arc<AppState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = SitemapperConfig::from_env(dir.path()).unwrap();
        let state = Arc::new(AppState::open(config).unwrap());
        (state, dir)
    }

    async fn call(state: &Arc<AppState>, method: &str, uri: &str, body: Body) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_regenerate_then_status() {
        let (state, _dir) = app_state();
        for id in 1..=3 {
            state
                .scheduler
                .store()
                .upsert_content_item(&ContentItem {
                    id,
                    family: ContentFamily::Post,
                    object_type: "post".into(),
                    title: format!("Post {}", id),
                    path: format!("/p/{}/", id),
                    status: ContentStatus::Publish,
                    noindex: false,
                    modified_at: "2024-01-01T00:00:00+00:00".into(),
                    images: Vec::new(),
                })
                .unwrap();
        }

        let (status, body) = call(&state, "POST", "/api/sitemap/regenerate?force=true", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"]["status"], "enqueued");
        assert_eq!(body["outcome"]["jobs"], 2);
        assert_eq!(body["dispatch"]["remaining"], 0);
        assert_eq!(body["dispatch"]["completed"], true);

        let (status, body) = call(&state, "GET", "/api/sitemap/status", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queue"]["queueLength"], 0);
        assert_eq!(body["buckets"][0]["bucket"], "cpt-post");
        assert_eq!(body["buckets"][0]["items"], 3);
        assert!(body["budget"]["timeBudgetSecs"].is_number());
    }

    #[tokio::test]
    async fn test_regenerate_without_force_is_up_to_date() {
        let (state, _dir) = app_state();
        call(&state, "POST", "/api/sitemap/regenerate", Body::empty()).await;
        let (_, body) = call(&state, "POST", "/api/sitemap/regenerate", Body::empty()).await;
        assert_eq!(body["outcome"]["status"], "up_to_date");
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected() {
        let (state, _dir) = app_state();
        let (status, body) = call(
            &state,
            "PUT",
            "/api/sitemap/settings",
            Body::from(r#"{"chunk_size": 0}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = call(
            &state,
            "PUT",
            "/api/sitemap/settings",
            Body::from(r#"{"chunk_size": 50, "image_sitemap": true}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chunk_size"], 50);
        assert_eq!(state.settings().chunk_size, 50);
        assert!(state.config.data_paths.settings_file.exists());
    }
}

//! API parity tests: the admin UI reads these field names from the
//! `/api/sitemap/*` responses, so the serialized shapes must stay stable.

use sitemapper_runtime::{BudgetStatus, DispatchReport, DrainReport, TriggerOutcome};
use sitemapper_store::{BucketSummary, IndexEntry, Lease};

/// Dispatch report as returned by POST /api/sitemap/dispatch.
#[test]
fn test_dispatch_report_shape() {
    let report = DispatchReport {
        processed: 3,
        succeeded: 2,
        failed: 1,
        deferred: true,
        deferral: Some(BudgetStatus::TimeExceeded),
        lease_denied: false,
        remaining: 4,
        completed: false,
    };
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["processed"], 3);
    assert_eq!(json["succeeded"], 2);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["deferred"], true);
    assert_eq!(json["deferral"], "time_exceeded");
    assert_eq!(json["leaseDenied"], false);
    assert_eq!(json["remaining"], 4);
    assert_eq!(json["completed"], false);
}

#[test]
fn test_deferral_omitted_when_within_budget() {
    let json = serde_json::to_value(DispatchReport::default()).unwrap();
    assert!(json.get("deferral").is_none());
}

/// Trigger outcomes are tagged by `status` for the regenerate button.
#[test]
fn test_trigger_outcome_shape() {
    assert_eq!(
        serde_json::to_value(TriggerOutcome::UpToDate).unwrap(),
        serde_json::json!({ "status": "up_to_date" })
    );
    assert_eq!(
        serde_json::to_value(TriggerOutcome::Enqueued { jobs: 7 }).unwrap(),
        serde_json::json!({ "status": "enqueued", "jobs": 7 })
    );
    assert_eq!(
        serde_json::to_value(TriggerOutcome::AlreadyQueued { remaining: 2 }).unwrap(),
        serde_json::json!({ "status": "already_queued", "remaining": 2 })
    );
}

/// CLI `regenerate` and `resume` print this alongside the outcome.
#[test]
fn test_drain_report_shape() {
    let json = serde_json::to_value(DrainReport::default()).unwrap();
    for key in ["ticks", "processed", "succeeded", "failed", "remaining", "completed", "leaseDenied"] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
}

/// Buckets listed by GET /api/sitemap/status.
#[test]
fn test_bucket_and_index_shapes() {
    let bucket = BucketSummary {
        bucket: "cpt-post".into(),
        chunks: 3,
        items: 45,
        last_modified: None,
    };
    let json = serde_json::to_value(&bucket).unwrap();
    assert_eq!(json["bucket"], "cpt-post");
    assert!(json["chunks"].is_number());
    assert!(json["items"].is_number());
    assert!(json.get("last_modified").is_none());

    let entry = IndexEntry {
        chunk_index: 1,
        item_count: 20,
        last_modified: Some("2024-01-01T00:00:00+00:00".into()),
    };
    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["chunk_index"], 1);
    assert_eq!(json["item_count"], 20);
    assert!(json["last_modified"].is_string());
}

#[test]
fn test_lease_shape() {
    let lease = Lease {
        owner: "sitemapper-1".into(),
        expires_at: 1_700_000_000_000,
    };
    let json = serde_json::to_value(&lease).unwrap();
    assert!(json["owner"].is_string());
    assert!(json["expires_at"].is_i64());
}

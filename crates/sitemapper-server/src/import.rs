//! Content import: loads content items from a JSON export into the store.
//!
//! Accepts either a bare array of items or an object with an `items` array.
//! Items are validated one by one so a bad record does not abort the import.

use std::path::Path;

use sitemapper_store::{ContentItem, SqliteStore};
use sitemapper_sync::normalize_timestamp;
use tracing::{info, warn};

/// Result of an import run.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

pub fn import_file(store: &SqliteStore, path: &Path) -> ImportReport {
    let mut report = ImportReport::default();

    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            report
                .errors
                .push(format!("Failed to read {}: {}", path.display(), e));
            return report;
        }
    };
    let doc: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            report.errors.push(format!("Invalid JSON: {}", e));
            return report;
        }
    };

    let items = match doc {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut obj) => match obj.remove("items") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                report
                    .errors
                    .push("Expected an array or an object with an \"items\" array".into());
                return report;
            }
        },
        _ => {
            report
                .errors
                .push("Expected an array or an object with an \"items\" array".into());
            return report;
        }
    };

    for (pos, value) in items.into_iter().enumerate() {
        let item: ContentItem = match serde_json::from_value(value) {
            Ok(item) => item,
            Err(e) => {
                report.skipped += 1;
                report.warnings.push(format!("Item {}: {}", pos, e));
                continue;
            }
        };
        if normalize_timestamp(&item.modified_at).is_none() {
            report.warnings.push(format!(
                "Item {} ({} {}): unparsable modified_at {:?}, it will be left out of sitemaps",
                pos, item.object_type, item.id, item.modified_at
            ));
        }
        match store.upsert_content_item(&item) {
            Ok(()) => report.imported += 1,
            Err(e) => report.errors.push(format!("Item {}: {}", pos, e)),
        }
    }

    if report.skipped > 0 {
        warn!("Skipped {} unreadable items", report.skipped);
    }
    info!("Imported {} content items from {}", report.imported, path.display());
    report
}

pub fn print_report(report: &ImportReport) {
    println!("=== Sitemapper Content Import ===");
    println!();
    println!("Imported:  {}", report.imported);
    println!("Skipped:   {}", report.skipped);

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &report.warnings {
            println!("  - {}", w);
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &report.errors {
            println!("  - {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitemapper_store::{ContentFamily, ContentQuery};

    #[test]
    fn test_import_skips_bad_items() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("db")).unwrap();
        let file = dir.path().join("content.json");
        std::fs::write(
            &file,
            r#"{"items": [
                {"id": 1, "family": "post", "object_type": "post", "path": "/a/", "modified_at": "2024-01-01 00:00:00"},
                {"id": 2, "family": "widget", "object_type": "post", "modified_at": "2024-01-01 00:00:00"},
                {"id": 3, "family": "term", "object_type": "category", "path": "/c/", "modified_at": "soon"}
            ]}"#,
        )
        .unwrap();

        let report = import_file(&store, &file);
        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.errors.is_empty());
        assert_eq!(
            store
                .count_indexable(&ContentQuery::new(ContentFamily::Post, "post"))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_import_rejects_wrong_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        let file = dir.path().join("content.json");
        std::fs::write(&file, r#"{"posts": []}"#).unwrap();

        let report = import_file(&store, &file);
        assert_eq!(report.imported, 0);
        assert_eq!(report.errors.len(), 1);
    }
}

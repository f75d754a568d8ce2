//! Inbox scanning against the in-memory store.

use std::path::Path;
use std::sync::Arc;

use refinery_common::SourceType;
use refinery_factory::Ingestor;
use refinery_store::{MemoryStore, SignalStore};
use serde_json::json;

fn write(root: &Path, relative: &str, value: serde_json::Value) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();
}

fn seed_inbox(root: &Path) {
    write(
        root,
        "twitter/2026-03-01/batch.json",
        json!([
            {"fullText": "Treasury auction tails badly, long end sells off",
             "user": {"screenName": "rates_desk"}, "tweetUrl": "https://x.com/rates_desk/1",
             "metrics": {"retweets": 40}},
            {"fullText": "Copper inventories at LME fall to multi-year lows",
             "user": {"screenName": "metals"}, "tweetUrl": "https://x.com/metals/2"},
            {"user": {"screenName": "empty"}}
        ]),
    );
    write(
        root,
        "polymarket/sniper_0900.json",
        json!([
            {"eventTitle": "Fed decision in March", "slug": "fed-march",
             "question": "Will the Fed cut rates in March?", "prices": "Yes: 12% | No: 88%",
             "vol24h": "1,200,000", "dayChange": "-3.5", "category": "Finance"}
        ]),
    );
    write(root, "notes.json", json!({"ignored": true}));
    write(root, "misc/other.json", json!([{"whatever": 1}]));
}

#[tokio::test]
async fn ingests_routed_files_and_skips_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    seed_inbox(dir.path());
    let store = Arc::new(MemoryStore::new());

    let report = Ingestor::new(store.clone())
        .ingest_dir(dir.path())
        .await
        .unwrap();

    let posts = &report.per_source[&SourceType::Post];
    assert_eq!(posts.files, 1);
    assert_eq!(posts.items, 3);
    assert_eq!(posts.inserted, 2);
    assert_eq!(posts.invalid, 1);
    assert_eq!(report.per_source[&SourceType::Market].inserted, 1);
    assert_eq!(report.unrouted_files, 2);
    assert_eq!(report.failed_files, 0);
    assert_eq!(store.len(), 3);

    let markets = store
        .query(&refinery_store::SignalQuery::builder().source_type(SourceType::Market).build())
        .await
        .unwrap();
    assert!(markets[0].has_tag("engine:sniper"));
}

#[tokio::test]
async fn rescanning_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    seed_inbox(dir.path());
    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(store.clone()).with_chunk_size(1);

    ingestor.ingest_dir(dir.path()).await.unwrap();
    let again = ingestor.ingest_dir(dir.path()).await.unwrap();

    assert_eq!(again.inserted(), 0);
    assert_eq!(again.per_source[&SourceType::Post].already_processed, 1);
    assert_eq!(store.len(), 3);
    assert_eq!(store.batches().len(), 2);
}

#[tokio::test]
async fn same_content_in_a_new_file_does_not_duplicate_signals() {
    let dir = tempfile::tempdir().unwrap();
    seed_inbox(dir.path());
    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(store.clone());
    ingestor.ingest_dir(dir.path()).await.unwrap();

    // Same post, newer counters, different file.
    write(
        dir.path(),
        "twitter/2026-03-01/batch-late.json",
        json!([{"fullText": "Treasury auction tails badly, long end sells off",
                "user": {"screenName": "rates_desk"}, "tweetUrl": "https://x.com/rates_desk/1",
                "metrics": {"retweets": 900}}]),
    );
    let report = ingestor.ingest_dir(dir.path()).await.unwrap();

    assert_eq!(report.per_source[&SourceType::Post].items, 1);
    assert_eq!(report.inserted(), 0);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn malformed_file_is_counted_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    seed_inbox(dir.path());
    std::fs::write(dir.path().join("twitter/broken.json"), b"[{\"fullText\": ").unwrap();
    let store = Arc::new(MemoryStore::new());

    let report = Ingestor::new(store.clone())
        .ingest_dir(dir.path())
        .await
        .unwrap();

    assert_eq!(report.failed_files, 1);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn missing_inbox_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let result = Ingestor::new(store)
        .ingest_dir(&dir.path().join("nope"))
        .await;
    assert!(result.is_err());
}

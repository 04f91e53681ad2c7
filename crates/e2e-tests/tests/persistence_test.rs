//! End-to-end tests for snapshots and restarts.
//!
//! A restart is simulated by shutting one client down and opening a fresh
//! one over the same data directory.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use e2e_tests::{axis_vector, insert_numbered, random_vectors, TestHarness};
use vectordb_store::{SearchOptions, StoreError};

/// Items saved before a restart are all there afterwards with their payloads.
#[tokio::test]
async fn test_save_then_reload_in_fresh_client() {
    let harness = TestHarness::new();

    let client = harness.client();
    let notes = client.create("notes").await.unwrap();
    let ids = insert_numbered(&notes, 50, 21).await;
    notes.save().await.unwrap();
    client.forget("notes").unwrap();

    let client = harness.client();
    client.load_all().await.unwrap();
    let notes = client.get("notes").expect("collection reloaded");

    assert_eq!(notes.size(), 50);
    for (n, id) in ids.iter().enumerate() {
        let item = notes.get(*id).await.unwrap().unwrap();
        assert_eq!(item.payload, Some(json!({ "n": n })));
    }
}

/// The reloaded index answers searches the same way as before the restart.
#[tokio::test]
async fn test_search_survives_restart() {
    let harness = TestHarness::new();
    let vectors = random_vectors(30, 5);

    let client = harness.client();
    let notes = client.create("notes").await.unwrap();
    insert_numbered(&notes, 30, 5).await;
    let options = SearchOptions::new().with_limit(3);
    let before: Vec<u32> = notes
        .find_by_vector(&vectors[12], &options)
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.item.id)
        .collect();
    client.shutdown().await.unwrap();

    let client = harness.client();
    client.load_all().await.unwrap();
    let notes = client.get("notes").unwrap();
    let after: Vec<u32> = notes
        .find_by_vector(&vectors[12], &options)
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.item.id)
        .collect();

    assert_eq!(before[0], after[0]);
    assert_eq!(before.len(), after.len());
}

/// Saving twice without changes, then loading twice, gives the same state.
#[tokio::test]
async fn test_repeated_save_and_load_are_stable() {
    let harness = TestHarness::new();

    let client = harness.client();
    let notes = client.create("notes").await.unwrap();
    insert_numbered(&notes, 10, 2).await;
    notes.save().await.unwrap();
    let first = std::fs::read(notes.dir().join("index.bin")).unwrap();
    notes.save().await.unwrap();
    let second = std::fs::read(notes.dir().join("index.bin")).unwrap();
    assert_eq!(first.len(), second.len());
    client.forget("notes").unwrap();

    let client = harness.client();
    client.load_all().await.unwrap();
    client.load_all().await.unwrap();
    let notes = client.get("notes").unwrap();
    notes.load().await.unwrap();

    assert_eq!(notes.size(), 10);
    assert_eq!(notes.list(None).await.unwrap().len(), 10);
}

/// Deletes made after the last save are lost by forget, but kept by a
/// shutdown that flushes first.
#[tokio::test]
async fn test_forget_drops_unsaved_changes_shutdown_keeps_them() {
    let harness = TestHarness::new();

    let client = harness.client();
    let notes = client.create("notes").await.unwrap();
    let ids = insert_numbered(&notes, 4, 9).await;
    notes.save().await.unwrap();
    notes.delete_item(ids[0]).await.unwrap();
    client.forget("notes").unwrap();

    let client = harness.client();
    client.load_all().await.unwrap();
    let notes = client.get("notes").unwrap();
    // Registry still says live, but the block was deleted eagerly
    assert_eq!(notes.size(), 4);
    assert!(matches!(
        notes.get(ids[0]).await,
        Err(StoreError::MissingBlock(id)) if id == ids[0]
    ));

    notes.delete_item(ids[0]).await.unwrap();
    client.shutdown().await.unwrap();

    let client = harness.client();
    client.load_all().await.unwrap();
    let notes = client.get("notes").unwrap();
    assert_eq!(notes.size(), 3);
    assert_eq!(notes.get(ids[0]).await.unwrap(), None);
}

/// A debounced save eventually persists writes without an explicit save.
#[tokio::test]
async fn test_scheduled_save_persists_writes() {
    let harness = TestHarness::with_settings(100, Duration::from_millis(50));

    let client = harness.client();
    let notes = client.create("notes").await.unwrap();
    insert_numbered(&notes, 5, 4).await;

    let snapshot = notes.dir().join("index.bin");
    let mut waited = Duration::ZERO;
    while notes.stats().await.unwrap().save_pending || !snapshot.exists() {
        assert!(waited < Duration::from_secs(10), "scheduled save never ran");
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }
    client.forget("notes").unwrap();

    let client = harness.client();
    client.load_all().await.unwrap();
    assert_eq!(client.get("notes").unwrap().size(), 5);
}

/// A damaged snapshot fails the load loudly instead of starting empty.
#[tokio::test]
async fn test_corrupt_snapshot_fails_load_all() {
    let harness = TestHarness::new();

    let client = harness.client();
    let notes = client.create("notes").await.unwrap();
    notes
        .insert_with_vector(Some(json!("x")), &axis_vector(0))
        .await
        .unwrap();
    notes.save().await.unwrap();
    let snapshot = notes.dir().join("index.bin");
    client.forget("notes").unwrap();

    let mut bytes = std::fs::read(&snapshot).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&snapshot, bytes).unwrap();

    let client = harness.client();
    let err = client.load_all().await.unwrap_err();
    assert!(matches!(err, StoreError::CorruptSnapshot(_)), "got {err}");
}

/// An empty collection directory loads as an empty collection.
#[tokio::test]
async fn test_directory_without_snapshot_loads_empty() {
    let harness = TestHarness::new();
    std::fs::create_dir_all(harness.collection_dir("fresh")).unwrap();

    let client = harness.client();
    client.load_all().await.unwrap();
    let fresh = client.get("fresh").unwrap();
    assert_eq!(fresh.size(), 0);
    assert_eq!(fresh.list(None).await.unwrap(), vec![]);
}

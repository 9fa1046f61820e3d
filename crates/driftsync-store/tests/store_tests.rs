//! Integration tests for the state store
//!
//! Uses in-memory SQLite for the bucket contract and temporary files for
//! export/import/compaction. Each test opens a fresh store.

use chrono::{Duration, Utc};

use driftsync_core::domain::{
    ChangeEvent, ChangeKind, FileState, FileSyncStatus, SyncState, SyncTransaction,
    TransactionKind, TransactionStatus,
};
use driftsync_core::ports::strategy::SyncResult;
use driftsync_store::{StateStore, StoreError};

async fn setup() -> StateStore {
    StateStore::in_memory().await.expect("in-memory store")
}

// ============================================================================
// Sync state
// ============================================================================

#[tokio::test]
async fn test_sync_state_round_trip() {
    let store = setup().await;

    let mut state = SyncState::new();
    state.start_operation("full_sync");
    state.total_files = 12;
    state.add_error("one bad thing");
    store.save_sync_state(&state).await.unwrap();

    let loaded = store.load_sync_state().await.unwrap();
    assert_eq!(loaded.current_operation, "full_sync");
    assert_eq!(loaded.total_files, 12);
    assert!(loaded.is_running);
    assert_eq!(loaded.errors, state.errors);
}

#[tokio::test]
async fn test_load_sync_state_defaults_when_missing() {
    let store = setup().await;
    let state = store.load_sync_state().await.unwrap();
    assert!(!state.is_running);
    assert!(state.is_initialized);
}

// ============================================================================
// File state
// ============================================================================

#[tokio::test]
async fn test_file_state_upsert_get_delete() {
    let store = setup().await;

    let mut state = FileState::new("/data/a.txt");
    state.update_local_info("h1", Utc::now(), 10);
    store.upsert_file_state(&state).await.unwrap();

    let loaded = store.get_file_state("/data/a.txt").await.unwrap().unwrap();
    assert_eq!(loaded.local_hash, "h1");
    assert_eq!(loaded.status, FileSyncStatus::Modified);

    store.delete_file_state("/data/a.txt").await.unwrap();
    assert!(store.get_file_state("/data/a.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn test_file_state_upsert_is_idempotent() {
    let store = setup().await;

    let mut state = FileState::new("/data/a.txt");
    state.update_local_info("h1", Utc::now(), 10);
    store.upsert_file_state(&state).await.unwrap();
    store.upsert_file_state(&state).await.unwrap();

    let all = store.list_file_states().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].local_hash, state.local_hash);
    assert_eq!(all[0].local_version, state.local_version);
}

#[tokio::test]
async fn test_list_file_states_by_status() {
    let store = setup().await;

    for (path, status) in [
        ("/a", FileSyncStatus::Pending),
        ("/b", FileSyncStatus::Synced),
        ("/c", FileSyncStatus::Pending),
        ("/d", FileSyncStatus::Error),
    ] {
        let mut state = FileState::new(path);
        state.status = status;
        store.upsert_file_state(&state).await.unwrap();
    }

    let pending = store
        .list_file_states_by_status(FileSyncStatus::Pending)
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
    let errored = store
        .list_file_states_by_status(FileSyncStatus::Error)
        .await
        .unwrap();
    assert_eq!(errored.len(), 1);
}

#[tokio::test]
async fn test_update_file_status_synced_resets_retry() {
    let store = setup().await;

    let mut state = FileState::new("/a");
    state.set_error("boom");
    store.upsert_file_state(&state).await.unwrap();

    store
        .update_file_status("/a", FileSyncStatus::Synced)
        .await
        .unwrap();

    let loaded = store.get_file_state("/a").await.unwrap().unwrap();
    assert_eq!(loaded.status, FileSyncStatus::Synced);
    assert_eq!(loaded.retry_count, 0);
    assert!(loaded.last_sync_time.is_some());
}

#[tokio::test]
async fn test_conflict_helpers() {
    let store = setup().await;

    let mut state = FileState::new("/a");
    state.update_local_info("h1", Utc::now(), 10);
    state.update_remote_info("h1", None, 10, None);
    store.upsert_file_state(&state).await.unwrap();

    store.set_file_conflict("/a", "both_modified").await.unwrap();
    let loaded = store.get_file_state("/a").await.unwrap().unwrap();
    assert!(loaded.has_conflict);
    assert_eq!(loaded.status, FileSyncStatus::Conflict);

    // Hashes agree, so resolving returns the file to Synced
    store.resolve_file_conflict("/a").await.unwrap();
    let loaded = store.get_file_state("/a").await.unwrap().unwrap();
    assert!(!loaded.has_conflict);
    assert_eq!(loaded.status, FileSyncStatus::Synced);

    // With diverged hashes, resolving clears the conflict but the file
    // stays unsynced
    store.set_file_conflict("/b", "both_modified").await.unwrap();
    store.resolve_file_conflict("/b").await.unwrap();
    let loaded = store.get_file_state("/b").await.unwrap().unwrap();
    assert!(!loaded.has_conflict);
    assert_ne!(loaded.status, FileSyncStatus::Synced);
}

#[tokio::test]
async fn test_batch_upsert() {
    let store = setup().await;

    let states: Vec<FileState> = (0..25).map(|i| FileState::new(format!("/f{i}"))).collect();
    store.batch_upsert_file_states(&states).await.unwrap();
    assert_eq!(store.list_file_states().await.unwrap().len(), 25);
}

// ============================================================================
// Transactions
// ============================================================================

#[tokio::test]
async fn test_transaction_round_trip() {
    let store = setup().await;

    let mut txn = SyncTransaction::begin(TransactionKind::FullSync);
    txn.files_affected.push("/a".to_string());
    store.save_transaction(&txn).await.unwrap();

    let loaded = store.get_transaction(&txn.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, txn.id);
    assert_eq!(loaded.status, TransactionStatus::Running);
    assert_eq!(loaded.files_affected, txn.files_affected);
}

#[tokio::test]
async fn test_list_transactions_reverse_insertion_order() {
    let store = setup().await;

    let mut ids = Vec::new();
    for _ in 0..5 {
        let txn = SyncTransaction::begin(TransactionKind::PartialSync);
        ids.push(txn.id.clone());
        store.save_transaction(&txn).await.unwrap();
    }

    let listed = store.list_transactions(0, 10).await.unwrap();
    let listed_ids: Vec<&str> = listed.iter().map(|t| t.id.as_str()).collect();
    let expected: Vec<&str> = ids.iter().rev().map(String::as_str).collect();
    assert_eq!(listed_ids, expected);

    // Offset skips the newest entries
    let page = store.list_transactions(2, 2).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, ids[2]);
    assert_eq!(page[1].id, ids[1]);
}

#[tokio::test]
async fn test_updating_transaction_keeps_insertion_order() {
    let store = setup().await;

    let mut first = SyncTransaction::begin(TransactionKind::FullSync);
    store.save_transaction(&first).await.unwrap();
    let second = SyncTransaction::begin(TransactionKind::FullSync);
    store.save_transaction(&second).await.unwrap();

    // Completing the first transaction must not move it to the front
    let mut result = SyncResult::started();
    result.finish();
    first.complete(result);
    store.save_transaction(&first).await.unwrap();

    let listed = store.list_transactions(0, 10).await.unwrap();
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed[1].id, first.id);
    assert_eq!(listed[1].status, TransactionStatus::Completed);
}

#[tokio::test]
async fn test_cleanup_removes_old_terminal_transactions() {
    let store = setup().await;

    let mut old = SyncTransaction::begin(TransactionKind::FullSync);
    old.fail("ancient failure");
    old.end_time = Some(Utc::now() - Duration::days(60));
    store.save_transaction(&old).await.unwrap();

    let mut recent = SyncTransaction::begin(TransactionKind::FullSync);
    recent.fail("fresh failure");
    store.save_transaction(&recent).await.unwrap();

    let running = SyncTransaction::begin(TransactionKind::FullSync);
    store.save_transaction(&running).await.unwrap();

    let removed = store
        .cleanup(Utc::now() - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(removed, 1);

    assert!(store.get_transaction(&old.id).await.unwrap().is_none());
    assert!(store.get_transaction(&recent.id).await.unwrap().is_some());
    assert!(store.get_transaction(&running.id).await.unwrap().is_some());
}

// ============================================================================
// Queue mirror
// ============================================================================

#[tokio::test]
async fn test_queue_mirror_round_trip() {
    let store = setup().await;

    let events: Vec<ChangeEvent> = (0..50)
        .map(|i| ChangeEvent::new(ChangeKind::Create, format!("/data/f{i:03}.txt")))
        .collect();
    store.replace_queue(&events).await.unwrap();

    let loaded = store.load_queue().await.unwrap();
    assert_eq!(loaded.len(), 50);

    // Rewriting replaces, never appends
    store.replace_queue(&events[..10]).await.unwrap();
    assert_eq!(store.load_queue().await.unwrap().len(), 10);

    store.replace_queue(&[]).await.unwrap();
    assert!(store.load_queue().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_load_queue_drops_malformed_entries() {
    let store = setup().await;

    let event = ChangeEvent::new(ChangeKind::Modify, "/good.txt");
    store.replace_queue(std::slice::from_ref(&event)).await.unwrap();
    store.put("queue", "/bad.txt", &"not an event").await.unwrap();

    let loaded = store.load_queue().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].path, event.path);
}

// ============================================================================
// Generic bucket operations
// ============================================================================

#[tokio::test]
async fn test_generic_put_get_list() {
    let store = setup().await;

    store.put("metadata", "alpha", &1u32).await.unwrap();
    store.put("metadata", "beta", &2u32).await.unwrap();
    store.put("metadata", "beta2", &3u32).await.unwrap();

    assert_eq!(store.get::<u32>("metadata", "alpha").await.unwrap(), Some(1));
    assert_eq!(store.get::<u32>("metadata", "missing").await.unwrap(), None);
    assert_eq!(store.count("metadata").await.unwrap(), 3);

    let keys = store.list_keys("metadata").await.unwrap();
    assert_eq!(keys, vec!["alpha", "beta", "beta2"]);

    let prefixed = store.list_prefix("metadata", "beta").await.unwrap();
    assert_eq!(prefixed, vec!["beta", "beta2"]);

    store.clear("metadata").await.unwrap();
    assert_eq!(store.count("metadata").await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_bucket_is_rejected() {
    let store = setup().await;
    let err = store.put("nope", "k", &1u32).await.unwrap_err();
    assert!(matches!(err, StoreError::UnknownBucket(_)));
}

// ============================================================================
// Reset / export / import / compact
// ============================================================================

#[tokio::test]
async fn test_reset_clears_all_buckets() {
    let store = setup().await;

    store.save_sync_state(&SyncState::new()).await.unwrap();
    store
        .upsert_file_state(&FileState::new("/a"))
        .await
        .unwrap();
    store
        .save_transaction(&SyncTransaction::begin(TransactionKind::FullSync))
        .await
        .unwrap();

    store.reset().await.unwrap();

    assert_eq!(store.count("state").await.unwrap(), 0);
    assert_eq!(store.count("file_state").await.unwrap(), 0);
    assert_eq!(store.count("transactions").await.unwrap(), 0);
    // Buckets still exist and accept writes
    store.put("metadata", "k", &1u32).await.unwrap();
}

#[tokio::test]
async fn test_export_import_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("live.db");
    let snapshot = dir.path().join("snapshot.db");

    let store = StateStore::open(&db_path).await.unwrap();
    let mut state = SyncState::new();
    state.total_files = 7;
    store.save_sync_state(&state).await.unwrap();
    store
        .upsert_file_state(&FileState::new("/keep.txt"))
        .await
        .unwrap();

    store.export(&snapshot).await.unwrap();
    assert!(snapshot.exists());

    // Diverge, then import the snapshot back
    store.clear("file_state").await.unwrap();
    store.save_sync_state(&SyncState::new()).await.unwrap();

    store.import(&snapshot).await.unwrap();
    let restored = store.load_sync_state().await.unwrap();
    assert_eq!(restored.total_files, 7);
    assert!(store.get_file_state("/keep.txt").await.unwrap().is_some());
}

#[tokio::test]
async fn test_compact_preserves_data() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("live.db");

    let store = StateStore::open(&db_path).await.unwrap();
    for i in 0..100 {
        store
            .upsert_file_state(&FileState::new(format!("/f{i}")))
            .await
            .unwrap();
    }

    store.compact().await.unwrap();

    assert_eq!(store.list_file_states().await.unwrap().len(), 100);
    // Store remains writable after the swap
    store
        .upsert_file_state(&FileState::new("/after-compact"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_import_unsupported_in_memory() {
    let store = setup().await;
    let err = store
        .import(std::path::Path::new("/tmp/whatever.db"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unsupported(_)));
}

// ============================================================================
// Statistics
// ============================================================================

#[tokio::test]
async fn test_statistics() {
    let store = setup().await;

    let mut synced = FileState::new("/s");
    synced.status = FileSyncStatus::Synced;
    synced.local_size = 100;
    store.upsert_file_state(&synced).await.unwrap();

    let mut pending = FileState::new("/p");
    pending.local_size = 50;
    store.upsert_file_state(&pending).await.unwrap();

    let mut errored = FileState::new("/e");
    errored.status = FileSyncStatus::Error;
    errored.local_size = 25;
    store.upsert_file_state(&errored).await.unwrap();

    let stats = store.statistics().await.unwrap();
    assert_eq!(stats.total_files, 3);
    assert_eq!(stats.total_synced, 1);
    assert_eq!(stats.total_pending, 1);
    assert_eq!(stats.total_error, 1);
    assert_eq!(stats.total_bytes, 175);
    assert_eq!(stats.synced_bytes, 100);
}

//! Tests for the durable relayer store
//!
//! Each test opens a fresh RocksDB database in a temporary directory.

use tempfile::TempDir;
use zilliqa_relayer::codec::CrossTransfer;
use zilliqa_relayer::storage::{RelayerStore, MAX_PENDING_BATCH};

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::DUMMY_POLY_TX_HASH;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn open_temp_store() -> (TempDir, RelayerStore) {
    let dir = TempDir::new().unwrap();
    let store = RelayerStore::open(dir.path().join("db"), false).unwrap();
    (dir, store)
}

fn create_record(height: u64) -> Vec<u8> {
    CrossTransfer {
        tx_index: format!("{:02x}", height),
        tx_id: vec![height as u8; 32],
        value: vec![0x01, 0x02],
        to_chain: 2,
        height,
    }
    .serialize()
}

// ============================================================================
// RETRY BUCKET TESTS
// ============================================================================

/// What is tested: Deleting a pending key twice, or one never inserted, succeeds
/// Why: Retry removal runs after remote outcomes that may repeat across restarts
#[tokio::test]
async fn test_delete_pending_is_idempotent() {
    let (_dir, store) = open_temp_store();
    let record = create_record(1);

    store.put_pending(&record).await.unwrap();
    store.delete_pending(&record).await.unwrap();
    store.delete_pending(&record).await.unwrap();
    store.delete_pending(&create_record(99)).await.unwrap();

    assert_eq!(store.count_pending().await.unwrap(), 0);
}

/// What is tested: Queuing the same record twice keeps one entry
/// Why: The same block can be scanned again after a restart
#[tokio::test]
async fn test_put_pending_is_idempotent() {
    let (_dir, store) = open_temp_store();
    let record = create_record(1);

    store.put_pending(&record).await.unwrap();
    store.put_pending(&record).await.unwrap();

    assert_eq!(store.list_pending(10).await.unwrap(), vec![record]);
}

/// What is tested: list_pending returns at most `limit` keys, stable across calls
/// Why: Each drain cycle must bound its work
#[tokio::test]
async fn test_list_pending_respects_limit() {
    let (_dir, store) = open_temp_store();
    for h in 1..=5 {
        store.put_pending(&create_record(h)).await.unwrap();
    }

    let first = store.list_pending(3).await.unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(store.list_pending(3).await.unwrap(), first);
    assert_eq!(store.list_pending(100).await.unwrap().len(), 5);
}

/// What is tested: pending_page caps the listing at MAX_PENDING_BATCH and reports
/// how many queued records it left out
/// Why: The store inspector's "more" count must match what was actually printed
#[tokio::test]
async fn test_pending_page_counts_hidden_records() {
    let (_dir, store) = open_temp_store();
    for h in 1..=3 {
        store.put_pending(&create_record(h)).await.unwrap();
    }
    let (records, hidden) = store.pending_page(2).await.unwrap();
    assert_eq!((records.len(), hidden), (2, 1));
    let (records, hidden) = store.pending_page(10).await.unwrap();
    assert_eq!((records.len(), hidden), (3, 0));

    for h in 4..=(MAX_PENDING_BATCH as u64 + 2) {
        store.put_pending(&create_record(h)).await.unwrap();
    }
    let (records, hidden) = store.pending_page(MAX_PENDING_BATCH * 5).await.unwrap();
    assert_eq!(records.len(), MAX_PENDING_BATCH);
    assert_eq!(hidden, 2);
}

// ============================================================================
// CHECK BUCKET TESTS
// ============================================================================

/// What is tested: Checked entries are keyed by the hex-decoded poly tx hash
/// Why: Operators look up which retry record produced a poly transaction
#[tokio::test]
async fn test_checked_records() {
    let (_dir, store) = open_temp_store();
    let record = create_record(3);

    store.put_checked(DUMMY_POLY_TX_HASH, &record).await.unwrap();
    store
        .put_checked(&format!("0x{}", DUMMY_POLY_TX_HASH), &record)
        .await
        .unwrap();

    assert_eq!(store.count_checked().await.unwrap(), 1);
    assert_eq!(store.get_checked(DUMMY_POLY_TX_HASH).await.unwrap(), Some(record));
    assert!(store.put_checked("not-hex", b"x").await.is_err());
}

// ============================================================================
// CURSOR TESTS
// ============================================================================

/// What is tested: Unset cursors read as absent / zero and persist once written
/// Why: Start heights are resolved from these values after a restart
#[tokio::test]
async fn test_cursors_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");
    {
        let store = RelayerStore::open(&path, false).unwrap();
        assert_eq!(store.poly_height().await.unwrap(), 0);
        assert_eq!(store.zil_height().await.unwrap(), None);

        store.set_poly_height(1234).await.unwrap();
        store.set_zil_height(5_000_000_000).await.unwrap();
        store.set_zil_ds_height(77).await.unwrap();
        store.put_pending(&create_record(1)).await.unwrap();
    }

    let store = RelayerStore::open(&path, false).unwrap();
    assert_eq!(store.poly_height().await.unwrap(), 1234);
    assert_eq!(store.zil_height().await.unwrap(), Some(5_000_000_000));
    assert_eq!(store.zil_ds_height().await.unwrap(), Some(77));
    assert_eq!(store.count_pending().await.unwrap(), 1);
}

/// What is tested: Opening with remove_existing starts from an empty database
/// Why: Operators reset a relayer through the remove_db flag
#[tokio::test]
async fn test_open_with_remove_existing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");
    {
        let store = RelayerStore::open(&path, false).unwrap();
        store.set_poly_height(9).await.unwrap();
    }

    let store = RelayerStore::open(&path, true).unwrap();
    assert_eq!(store.poly_height().await.unwrap(), 0);
}

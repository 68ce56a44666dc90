//! Concurrent appends against one ledger.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agrotrace::core::MerkleTree;
use agrotrace::store::{LeafStore, SqliteStore};
use agrotrace::{Ledger, LedgerConfig};
use agrotrace_testkit::fixtures::{memory_ledger, multi_party_fixtures};

const WRITERS: usize = 8;
const PER_WRITER: usize = 25;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_get_distinct_dense_indices() {
    let ledger = Arc::new(memory_ledger().await.unwrap());
    let parties = multi_party_fixtures(WRITERS);

    let mut handles = Vec::new();
    for (w, party) in parties.into_iter().enumerate() {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            let mut receipts = Vec::new();
            for i in 0..PER_WRITER {
                let record = party.make_batch(&format!("B-{w}-{i}"));
                receipts.push(ledger.append(&record).await.unwrap());
            }
            receipts
        }));
    }

    let mut indices = HashSet::new();
    let mut receipts = Vec::new();
    for handle in handles {
        for receipt in handle.await.unwrap() {
            assert!(indices.insert(receipt.index), "index {} reused", receipt.index);
            receipts.push(receipt);
        }
    }

    let total = (WRITERS * PER_WRITER) as u64;
    assert_eq!(ledger.leaf_count(), total);
    assert_eq!(indices, (0..total).collect::<HashSet<_>>());

    // The final root covers every leaf in index order.
    receipts.sort_by_key(|r| r.index);
    let hashes: Vec<_> = receipts.iter().map(|r| r.leaf_hash).collect();
    assert_eq!(ledger.current_root(), MerkleTree::from_leaves(&hashes).unwrap().root());

    for receipt in &receipts {
        let proof = ledger.get_proof(receipt.index).await.unwrap();
        assert_eq!(proof.root, receipt.root);
        assert!(proof.verify());
    }

    assert!(ledger.audit().await.unwrap().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_uncommitted_leaves() {
    let ledger = Arc::new(memory_ledger().await.unwrap());
    let party = multi_party_fixtures(1).remove(0);

    let writer = {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            for i in 0..100 {
                ledger
                    .append(&party.make_batch(&format!("B-{i}")))
                    .await
                    .unwrap();
            }
        })
    };

    while !writer.is_finished() {
        let count = ledger.leaf_count();
        if count > 0 {
            let proof = ledger.get_proof(count - 1).await.unwrap();
            assert!(proof.verify());
            let listed = ledger.leaves_for_batch(&format!("B-{}", count - 1)).await.unwrap();
            assert_eq!(listed.len(), 1);
        }
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
    assert_eq!(ledger.leaf_count(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_on_sqlite() {
    let ledger = Arc::new(
        Ledger::open(SqliteStore::open_memory().unwrap(), LedgerConfig::default())
            .await
            .unwrap(),
    );
    let parties = multi_party_fixtures(4);

    let mut handles = Vec::new();
    for (w, party) in parties.into_iter().enumerate() {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..10 {
                ledger
                    .append(&party.make_batch(&format!("S-{w}-{i}")))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(ledger.leaf_count(), 40);
    let report = ledger.audit().await.unwrap();
    assert!(report.is_ok(), "{report:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dropped_appends_still_commit() {
    const ATTEMPTS: u64 = 200;

    let ledger = Ledger::open(SqliteStore::open_memory().unwrap(), LedgerConfig::default())
        .await
        .unwrap();
    let party = multi_party_fixtures(1).remove(0);

    for i in 0..ATTEMPTS {
        let record = party.make_batch(&format!("C-{i}"));
        let _ = tokio::time::timeout(Duration::from_micros(i * 5), ledger.append(&record)).await;
    }

    let receipt = ledger.append(&party.make_batch("C-final")).await.unwrap();
    assert!(ledger.get_proof(receipt.index).await.unwrap().verify());

    // Abandoned commits may still be finishing.
    let deadline = Instant::now() + Duration::from_secs(10);
    while ledger.leaf_count() < ATTEMPTS + 1 {
        assert!(
            Instant::now() < deadline,
            "commits stalled at {}",
            ledger.leaf_count()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let store = ledger.store();
    assert_eq!(store.leaf_count().await.unwrap(), ledger.leaf_count());
    let latest = store.latest_leaf().await.unwrap().unwrap();
    assert_eq!(ledger.current_root(), Some(latest.root));

    let next = ledger.append(&party.make_batch("C-after")).await.unwrap();
    assert_eq!(next.index, ATTEMPTS + 1);
    assert!(ledger.audit().await.unwrap().is_ok());
}

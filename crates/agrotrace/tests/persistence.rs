//! Ledger state survives a SQLite reopen.

use std::sync::Arc;

use agrotrace::core::EventType;
use agrotrace::{MemoryAnchorOracle, RecordKind, VerificationMode, VerifyRequest};
use agrotrace_testkit::fixtures::{sqlite_ledger, TestFixture};
use tempfile::TempDir;

#[tokio::test]
async fn test_reopen_restores_root_and_proofs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.db");
    let fixture = TestFixture::with_seed([21; 32]);

    let signed = fixture.signed_batch("B-2024-100");
    let (root, count) = {
        let ledger = sqlite_ledger(&path).await.unwrap();
        ledger.append_signed(&signed).await.unwrap();
        let lifecycle = [
            EventType::Harvested,
            EventType::Processed,
            EventType::Shipped,
        ];
        for (i, event_type) in lifecycle.into_iter().enumerate() {
            let record =
                fixture.make_event(&format!("E-{i}"), "B-2024-100", event_type, i as i64 + 1);
            ledger.append(&record).await.unwrap();
        }
        (ledger.current_root(), ledger.leaf_count())
    };

    let ledger = sqlite_ledger(&path).await.unwrap();
    assert_eq!(ledger.current_root(), root);
    assert_eq!(ledger.leaf_count(), count);

    for index in 0..count {
        let proof = ledger.get_proof(index).await.unwrap();
        assert!(proof.verify(), "proof {index} after reopen");
    }

    let leaves = ledger.leaves_for_batch("B-2024-100").await.unwrap();
    assert_eq!(leaves.len() as u64, count);
    assert_eq!(leaves[0].kind, RecordKind::Batch);

    let result = ledger
        .verifier(Arc::new(MemoryAnchorOracle::new()))
        .verify_batch(VerifyRequest::for_signed(signed))
        .await
        .unwrap();
    assert!(result.verified);
    assert_eq!(result.mode, VerificationMode::Merkle);

    let next = ledger
        .append(&fixture.make_batch("B-2024-101"))
        .await
        .unwrap();
    assert_eq!(next.index, count);
    assert!(ledger.audit().await.unwrap().is_ok());
}

#[tokio::test]
async fn test_reopen_keeps_anchor_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("anchored.db");
    let fixture = TestFixture::with_seed([22; 32]);
    let oracle = MemoryAnchorOracle::new();

    let anchored_root = {
        let ledger = sqlite_ledger(&path).await.unwrap();
        let receipt = ledger.append(&fixture.make_batch("B-1")).await.unwrap();
        let outcome = ledger.anchor_current_root(&oracle).await.unwrap();
        assert_eq!(outcome.anchor.root, receipt.root);
        receipt.root
    };

    let ledger = sqlite_ledger(&path).await.unwrap();
    let anchor_leaf = ledger.get_leaf(1).await.unwrap().unwrap();
    assert_eq!(anchor_leaf.kind, RecordKind::Anchor);
    assert_ne!(anchor_leaf.root, anchored_root);
    assert!(anchor_leaf.verify());
}

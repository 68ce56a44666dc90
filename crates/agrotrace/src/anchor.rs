//! External anchoring of ledger roots.
//!
//! An anchor is an independent confirmation that a root existed at some
//! point in time. The ledger only needs two things from the service that
//! provides it: submit a root, and later ask whether a root was submitted.
//! Anchoring is optional; an unanchored root is weaker, never invalid.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use agrotrace_core::Digest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors from anchor oracle calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnchorError {
    /// The oracle could not be reached.
    #[error("anchor oracle unavailable: {0}")]
    Unavailable(String),

    /// The oracle refused the request.
    #[error("anchor rejected: {0}")]
    Rejected(String),

    /// The call did not finish before the deadline.
    #[error("anchor oracle timed out after {0:?}")]
    Timeout(Duration),
}

/// Proof of submission returned by the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub root: Digest,
    /// Oracle-specific reference (transaction id, receipt number).
    pub external_ref: String,
    pub anchored_at: DateTime<Utc>,
}

/// Answer to "was this root anchored?".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnchorStatus {
    pub anchored: bool,
    pub external_ref: Option<String>,
}

impl AnchorStatus {
    pub fn anchored(external_ref: impl Into<String>) -> Self {
        Self {
            anchored: true,
            external_ref: Some(external_ref.into()),
        }
    }

    pub fn not_anchored() -> Self {
        Self::default()
    }
}

/// Interface to an external timestamping service.
///
/// Calls may take unbounded time; callers wrap them in a deadline.
#[async_trait]
pub trait AnchorOracle: Send + Sync {
    /// Submit a root for anchoring.
    async fn submit(&self, root: &Digest) -> Result<AnchorReceipt, AnchorError>;

    /// Ask whether a root was anchored.
    async fn was_anchored(&self, root: &Digest) -> Result<AnchorStatus, AnchorError>;
}

/// In-memory anchor oracle for tests and local deployments.
///
/// Anchors are confirmed immediately with deterministic references. It can
/// simulate an unreachable service and added latency.
///
/// Provides no external finality.
#[derive(Debug)]
pub struct MemoryAnchorOracle {
    anchors: RwLock<HashMap<Digest, String>>,
    next_ref: AtomicU64,
    unreachable: AtomicBool,
    latency_ms: AtomicU64,
}

impl Default for MemoryAnchorOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAnchorOracle {
    pub fn new() -> Self {
        Self {
            anchors: RwLock::new(HashMap::new()),
            next_ref: AtomicU64::new(1),
            unreachable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Make every call fail with [`AnchorError::Unavailable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Record `root` as anchored without going through [`submit`](AnchorOracle::submit).
    pub async fn mark_anchored(&self, root: Digest, external_ref: impl Into<String>) {
        self.anchors.write().await.insert(root, external_ref.into());
    }

    /// Number of anchored roots.
    pub async fn anchored_count(&self) -> usize {
        self.anchors.read().await.len()
    }

    async fn simulate_network(&self) -> Result<(), AnchorError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AnchorError::Unavailable("memory oracle offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AnchorOracle for MemoryAnchorOracle {
    async fn submit(&self, root: &Digest) -> Result<AnchorReceipt, AnchorError> {
        self.simulate_network().await?;

        let mut anchors = self.anchors.write().await;
        let external_ref = match anchors.get(root) {
            Some(existing) => existing.clone(),
            None => {
                let n = self.next_ref.fetch_add(1, Ordering::SeqCst);
                let external_ref = format!("mem-anchor-{n}-{}", &root.to_hex()[..16]);
                anchors.insert(*root, external_ref.clone());
                external_ref
            }
        };

        Ok(AnchorReceipt {
            root: *root,
            external_ref,
            anchored_at: Utc::now(),
        })
    }

    async fn was_anchored(&self, root: &Digest) -> Result<AnchorStatus, AnchorError> {
        self.simulate_network().await?;

        Ok(match self.anchors.read().await.get(root) {
            Some(external_ref) => AnchorStatus::anchored(external_ref.clone()),
            None => AnchorStatus::not_anchored(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_then_query() {
        let oracle = MemoryAnchorOracle::new();
        let root = Digest::hash(b"root");

        assert_eq!(
            oracle.was_anchored(&root).await.unwrap(),
            AnchorStatus::not_anchored()
        );

        let receipt = oracle.submit(&root).await.unwrap();
        assert_eq!(receipt.root, root);
        assert!(receipt.external_ref.starts_with("mem-anchor-1-"));

        let status = oracle.was_anchored(&root).await.unwrap();
        assert!(status.anchored);
        assert_eq!(status.external_ref, Some(receipt.external_ref));
    }

    #[tokio::test]
    async fn test_resubmit_keeps_reference() {
        let oracle = MemoryAnchorOracle::new();
        let root = Digest::hash(b"root");
        let first = oracle.submit(&root).await.unwrap();
        let second = oracle.submit(&root).await.unwrap();
        assert_eq!(first.external_ref, second.external_ref);
        assert_eq!(oracle.anchored_count().await, 1);
    }

    #[tokio::test]
    async fn test_unreachable() {
        let oracle = MemoryAnchorOracle::new();
        oracle.set_unreachable(true);
        assert!(matches!(
            oracle.was_anchored(&Digest::hash(b"r")).await,
            Err(AnchorError::Unavailable(_))
        ));
        assert!(matches!(
            oracle.submit(&Digest::hash(b"r")).await,
            Err(AnchorError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_anchored() {
        let oracle = MemoryAnchorOracle::new();
        let root = Digest::hash(b"root");
        oracle.mark_anchored(root, "tx-0xabc").await;
        assert_eq!(
            oracle.was_anchored(&root).await.unwrap(),
            AnchorStatus::anchored("tx-0xabc")
        );
    }
}

//! Batch verification protocol.
//!
//! Answers "is this batch record authentic and untampered?" by composing
//! the signature check, the ledger inclusion check and an optional anchor
//! check:
//!
//! ```text
//! Start -> SignatureCheck -> InclusionCheck -> AnchorCheck -> Verified(mode)
//!   \             \                \
//!    +-------------+----------------+--------------------> Rejected(reason)
//! ```
//!
//! Each call runs the machine once, with no retries. Rejection is ordinary
//! data; only structurally invalid requests and storage failures are `Err`.

use std::fmt;
use std::sync::Arc;

use agrotrace_core::{Digest, Leaf, Proof, RecordKind, SignedRecord};
use agrotrace_store::LeafStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::anchor::AnchorOracle;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};

/// What to verify: a signed record, a batch id, or both.
#[derive(Debug, Clone, Default)]
pub struct VerifyRequest {
    pub batch_id: Option<String>,
    pub signed: Option<SignedRecord>,
}

impl VerifyRequest {
    /// Verify the creation record of a batch.
    pub fn for_batch(batch_id: impl Into<String>) -> Self {
        Self {
            batch_id: Some(batch_id.into()),
            signed: None,
        }
    }

    /// Verify a signed record.
    pub fn for_signed(signed: SignedRecord) -> Self {
        Self {
            batch_id: None,
            signed: Some(signed),
        }
    }

    /// Additionally require the signed record to belong to `batch_id`.
    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }
}

/// Strength of a positive verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    /// Ledger inclusion only.
    Merkle,
    /// Ledger inclusion plus an external anchor of the insertion root.
    Anchored,
}

/// Why a record was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    RecordNotFound,
    InvalidSignature,
    InclusionProofFailed,
    BatchMismatch,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RecordNotFound => "record not found",
            Self::InvalidSignature => "invalid signature",
            Self::InclusionProofFailed => "inclusion proof failed",
            Self::BatchMismatch => "record does not belong to batch",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Verified(VerificationMode),
    Rejected(RejectReason),
}

impl Verdict {
    pub fn reason(self) -> &'static str {
        match self {
            Verdict::Verified(VerificationMode::Merkle) => "verified via ledger inclusion",
            Verdict::Verified(VerificationMode::Anchored) => "verified and externally anchored",
            Verdict::Rejected(reason) => reason.as_str(),
        }
    }
}

/// Outcome of one verification. Produced fresh per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    /// `Merkle` for every rejection.
    pub mode: VerificationMode,
    pub reason: String,
    /// Set exactly when `verified` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
}

impl VerificationResult {
    fn new(verdict: Verdict, proof: Option<Proof>, external_ref: Option<String>) -> Self {
        let (verified, mode, rejection) = match verdict {
            Verdict::Verified(mode) => (true, mode, None),
            Verdict::Rejected(reason) => (false, VerificationMode::Merkle, Some(reason)),
        };
        Self {
            verified,
            mode,
            reason: verdict.reason().to_string(),
            rejection,
            proof,
            external_ref,
        }
    }

    fn rejected(reason: RejectReason) -> Self {
        Self::new(Verdict::Rejected(reason), None, None)
    }

    /// The verdict this result encodes.
    ///
    /// `None` when the fields disagree, e.g. a deserialized rejection that
    /// carries no reason this version knows.
    pub fn verdict(&self) -> Option<Verdict> {
        match (self.verified, self.rejection) {
            (true, None) => Some(Verdict::Verified(self.mode)),
            (false, Some(reason)) => Some(Verdict::Rejected(reason)),
            _ => None,
        }
    }
}

/// Protocol states, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Start,
    SignatureCheck,
    InclusionCheck,
    AnchorCheck,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Start => "start",
            Step::SignatureCheck => "signature_check",
            Step::InclusionCheck => "inclusion_check",
            Step::AnchorCheck => "anchor_check",
        })
    }
}

/// Runs the verification protocol against a leaf store and an anchor oracle.
pub struct Verifier<S: LeafStore + ?Sized, O: AnchorOracle + ?Sized> {
    store: Arc<S>,
    oracle: Arc<O>,
    config: LedgerConfig,
}

impl<S: LeafStore + ?Sized, O: AnchorOracle + ?Sized> Verifier<S, O> {
    pub fn new(store: Arc<S>, oracle: Arc<O>, config: LedgerConfig) -> Self {
        Self {
            store,
            oracle,
            config,
        }
    }

    /// Verify a batch record.
    ///
    /// A request with neither a batch id nor a signed record is an
    /// [`LedgerError::InvalidInput`]. Every other outcome is a
    /// [`VerificationResult`].
    pub async fn verify_batch(&self, request: VerifyRequest) -> Result<VerificationResult> {
        debug!(step = %Step::Start, batch_id = ?request.batch_id, "verification step");

        let (leaf_hash, signed) = match (&request.batch_id, request.signed) {
            (None, None) => {
                return Err(LedgerError::InvalidInput(
                    "either a batch id or a signed record is required".into(),
                ));
            }
            (Some(batch_id), Some(signed)) => {
                if signed.record.batch_id() != Some(batch_id.as_str()) {
                    return Ok(self.reject(Step::Start, RejectReason::BatchMismatch));
                }
                (signed.record.leaf_hash()?, Some(signed))
            }
            (None, Some(signed)) => (signed.record.leaf_hash()?, Some(signed)),
            (Some(batch_id), None) => match self.batch_creation_leaf(batch_id).await? {
                Some(leaf) => (leaf.hash, None),
                None => return Ok(self.reject(Step::Start, RejectReason::RecordNotFound)),
            },
        };

        if let Some(signed) = &signed {
            debug!(step = %Step::SignatureCheck, "verification step");
            if !signed.verify_signature() {
                return Ok(self.reject(Step::SignatureCheck, RejectReason::InvalidSignature));
            }
        }

        debug!(step = %Step::InclusionCheck, leaf = %leaf_hash, "verification step");
        let Some(leaf) = self.store.get_leaf_by_hash(&leaf_hash).await? else {
            return Ok(self.reject(Step::InclusionCheck, RejectReason::InclusionProofFailed));
        };
        let proof = leaf.inclusion_proof();
        if proof.leaf != leaf_hash || !proof.verify() {
            return Ok(self.reject(Step::InclusionCheck, RejectReason::InclusionProofFailed));
        }

        debug!(step = %Step::AnchorCheck, root = %leaf.root, "verification step");
        let (mode, external_ref) = self.anchor_check(&leaf.root).await;

        let verdict = Verdict::Verified(mode);
        debug!(reason = verdict.reason(), index = leaf.index, "verification complete");
        Ok(VerificationResult::new(verdict, Some(proof), external_ref))
    }

    /// The batch's creation leaf; any leaf of the batch when no creation
    /// record exists.
    async fn batch_creation_leaf(&self, batch_id: &str) -> Result<Option<Leaf>> {
        let leaves = self.store.leaves_for_batch(batch_id).await?;
        let creation = leaves
            .iter()
            .position(|leaf| leaf.kind == RecordKind::Batch)
            .unwrap_or(0);
        Ok(leaves.into_iter().nth(creation))
    }

    /// Ask the oracle about `root` under the configured deadline. Any failure
    /// degrades to ledger-only trust.
    async fn anchor_check(&self, root: &Digest) -> (VerificationMode, Option<String>) {
        let timeout = self.config.anchor_timeout;
        match tokio::time::timeout(timeout, self.oracle.was_anchored(root)).await {
            Ok(Ok(status)) if status.anchored => (VerificationMode::Anchored, status.external_ref),
            Ok(Ok(_)) => (VerificationMode::Merkle, None),
            Ok(Err(e)) => {
                warn!(root = %root, error = %e, "anchor oracle failed, falling back to ledger-only");
                (VerificationMode::Merkle, None)
            }
            Err(_) => {
                warn!(root = %root, ?timeout, "anchor oracle timed out, falling back to ledger-only");
                (VerificationMode::Merkle, None)
            }
        }
    }

    fn reject(&self, step: Step, reason: RejectReason) -> VerificationResult {
        debug!(%step, %reason, "verification rejected");
        VerificationResult::rejected(reason)
    }
}

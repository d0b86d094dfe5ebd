//! Proof verification against ledger data
//!
//! The verifier enumerates every root-to-attestation path of a proof and
//! checks chain attestations against the Merkle root committed in the
//! corresponding ledger block. Ledger access itself is a collaborator
//! supplied by the caller; this module only defines its contract and a
//! memoizing wrapper for the immutable headers it returns.

use chainstamp_types::{Attestation, DetachedProof};
use chrono::DateTime;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Ledgers a chain attestation can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Chain {
    Bitcoin,
    Litecoin,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Bitcoin => write!(f, "bitcoin"),
            Chain::Litecoin => write!(f, "litecoin"),
        }
    }
}

/// The commitment data of one ledger block: its Merkle root and its
/// timestamp (seconds since the UNIX epoch). Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub merkle_root: Vec<u8>,
    pub time: u32,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("No {chain} header available at height {height}")]
    HeaderUnavailable { chain: Chain, height: u64 },

    #[error("Ledger backend error: {0}")]
    Backend(String),
}

/// Contract for the ledger-access collaborator.
///
/// Implementations talk to a node or indexer; the engine never does. The
/// returned data is untrusted input as far as verification is concerned —
/// digests are compared byte-for-byte, never assumed.
pub trait LedgerAccess {
    fn merkle_root_at(&self, chain: Chain, height: u64) -> Result<BlockInfo, LedgerError>;
}

/// Memoizes successful header lookups by `(chain, height)`.
///
/// Block commitments are immutable, so entries never expire. Failed lookups
/// are not cached; a header missing now may exist on the next call.
pub struct CachedLedger<L> {
    inner: L,
    cache: Mutex<HashMap<(Chain, u64), BlockInfo>>,
}

impl<L: LedgerAccess> CachedLedger<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl<L: LedgerAccess> LedgerAccess for CachedLedger<L> {
    fn merkle_root_at(&self, chain: Chain, height: u64) -> Result<BlockInfo, LedgerError> {
        if let Some(hit) = self
            .cache
            .lock()
            .expect("ledger cache lock poisoned")
            .get(&(chain, height))
        {
            return Ok(hit.clone());
        }
        let info = self.inner.merkle_root_at(chain, height)?;
        self.cache
            .lock()
            .expect("ledger cache lock poisoned")
            .insert((chain, height), info.clone());
        Ok(info)
    }
}

/// Outcome of checking one root-to-attestation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum VerificationOutcome {
    /// The derived digest equals the ledger's committed Merkle root.
    Attested {
        chain: Chain,
        height: u64,
        /// Block timestamp, seconds since the UNIX epoch.
        time: u32,
    },
    /// The path ends in a pending attestation; not a failure.
    NotYetAttested,
    /// The ledger collaborator has no header for the claimed height.
    HeaderUnavailable,
    /// Unknown attestation type, or a digest that cannot be derived
    /// (an unrecognized operation sits on the path).
    Inconclusive,
    /// The derived digest disagrees with the ledger. A security-relevant
    /// result, reported distinctly and never downgraded.
    Failed {
        computed: Vec<u8>,
        expected: Vec<u8>,
    },
}

/// One per-path verification result. The attestation is carried verbatim so
/// callers can inspect inconclusive paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub attestation: Attestation,
    /// Digest derived along the path, when computable.
    pub digest: Option<Vec<u8>>,
    pub outcome: VerificationOutcome,
}

impl VerificationResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, VerificationOutcome::Failed { .. })
    }

    pub fn attested_time(&self) -> Option<u32> {
        match self.outcome {
            VerificationOutcome::Attested { time, .. } => Some(time),
            _ => None,
        }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            VerificationOutcome::Attested {
                chain,
                height,
                time,
            } => write!(
                f,
                "{chain} block {height} attests existence as of {}",
                format_day(*time)
            ),
            VerificationOutcome::NotYetAttested => {
                write!(f, "not yet attested: {}", self.attestation)
            }
            VerificationOutcome::HeaderUnavailable => {
                write!(f, "no ledger header for {}", self.attestation)
            }
            VerificationOutcome::Inconclusive => write!(f, "inconclusive: {}", self.attestation),
            VerificationOutcome::Failed { computed, expected } => write!(
                f,
                "VERIFICATION FAILED for {}: computed {} but ledger committed {}",
                self.attestation,
                hex::encode(computed),
                hex::encode(expected)
            ),
        }
    }
}

fn format_day(time: u32) -> String {
    match DateTime::from_timestamp(i64::from(time), 0) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => format!("timestamp {time}"),
    }
}

/// Check every attestation path of `proof` against `ledger`.
///
/// Returns one result per path; the caller owns the aggregate trust policy
/// (for example preferring the earliest attested time). The engine never
/// picks a winner.
pub fn verify(proof: &DetachedProof, ledger: &dyn LedgerAccess) -> Vec<VerificationResult> {
    proof
        .tree
        .attestations()
        .into_iter()
        .map(|(node, attestation)| {
            let digest = proof.tree.digest(node).map(<[u8]>::to_vec);
            let outcome = match (&attestation, digest.as_deref()) {
                (Attestation::Pending { .. }, _) => VerificationOutcome::NotYetAttested,
                (Attestation::Unknown { .. }, _) => VerificationOutcome::Inconclusive,
                // A chain attestation under an unrecognized operation:
                // nothing to compare.
                (_, None) => VerificationOutcome::Inconclusive,
                (Attestation::Bitcoin { height }, Some(d)) => {
                    check_chain(ledger, Chain::Bitcoin, *height, d)
                }
                (Attestation::Litecoin { height }, Some(d)) => {
                    check_chain(ledger, Chain::Litecoin, *height, d)
                }
            };
            debug!(%attestation, ?outcome, "checked attestation path");
            VerificationResult {
                attestation,
                digest,
                outcome,
            }
        })
        .collect()
}

fn check_chain(
    ledger: &dyn LedgerAccess,
    chain: Chain,
    height: u64,
    digest: &[u8],
) -> VerificationOutcome {
    match ledger.merkle_root_at(chain, height) {
        Ok(block) if block.merkle_root == digest => VerificationOutcome::Attested {
            chain,
            height,
            time: block.time,
        },
        Ok(block) => VerificationOutcome::Failed {
            computed: digest.to_vec(),
            expected: block.merkle_root,
        },
        Err(LedgerError::HeaderUnavailable { .. }) => VerificationOutcome::HeaderUnavailable,
        Err(LedgerError::Backend(_)) => VerificationOutcome::Inconclusive,
    }
}

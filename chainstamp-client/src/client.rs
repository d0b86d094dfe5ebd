//! Concurrent submission and upgrade engine
//!
//! Fan-out over calendars is bounded and each request carries its own
//! timeout. Network responses are gathered first; tree mutation happens in a
//! single sequential pass afterwards, so a half-failed round never leaves a
//! half-merged proof.

use crate::calendar::{Calendar, CalendarError};
use crate::{ClientError, Result};
use chainstamp_types::{Attestation, DetachedProof, DigestKind, NodeId, Op, ProofTree};
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Bounds for one submission or upgrade round.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum calendar requests in flight at once.
    pub fan_out: usize,
    /// Per-request deadline.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            fan_out: 4,
            timeout: Duration::from_secs(5),
        }
    }
}

/// A calendar that failed during a round. Partial failure is not fatal, so
/// these are collected and surfaced instead of returned as errors.
#[derive(Debug)]
pub struct CalendarWarning {
    pub url: String,
    pub error: CalendarError,
}

impl fmt::Display for CalendarWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.url, self.error)
    }
}

/// What an upgrade round accomplished.
#[derive(Debug)]
pub struct UpgradeReport {
    /// Whether any merge brought new structure into the proof.
    pub changed: bool,
    pub warnings: Vec<CalendarWarning>,
}

/// Submit `digest` to every calendar and build a proof from the fragments.
///
/// Partial success is success: as long as one calendar accepts, the proof is
/// returned together with a warning per failed calendar. Only when every
/// calendar fails is the round an error.
pub async fn submit(
    kind: DigestKind,
    digest: Vec<u8>,
    calendars: &[Arc<dyn Calendar>],
    config: &ClientConfig,
) -> Result<(DetachedProof, Vec<CalendarWarning>)> {
    let mut proof = DetachedProof::for_digest(kind, digest)?;
    let root = proof.tree.root();
    let warnings = submit_at(&mut proof.tree, root, calendars, config).await?;
    Ok((proof, warnings))
}

/// Like [`submit`], but calendars never see the raw digest: a random 16-byte
/// `Append` salt plus `Sha256` is interposed, and the salted commitment is
/// what gets submitted.
pub async fn stamp(
    kind: DigestKind,
    digest: Vec<u8>,
    calendars: &[Arc<dyn Calendar>],
    config: &ClientConfig,
) -> Result<(DetachedProof, Vec<CalendarWarning>)> {
    let (mut proofs, warnings) = stamp_batch(kind, vec![digest], calendars, config).await?;
    // One digest in, one proof out.
    let proof = proofs.pop().expect("one proof per digest");
    Ok((proof, warnings))
}

/// Stamp a batch of digests under a single calendar submission.
///
/// Every digest gets its own salted commitment; the commitments are then
/// aggregated pairwise into a local Merkle tree and only the tree's tip is
/// sent to the calendars. Each returned proof carries its own Merkle path
/// (an append/prepend + sha256 chain), so the proofs stay independent and
/// the calendar learns nothing about batch membership.
pub async fn stamp_batch(
    kind: DigestKind,
    digests: Vec<Vec<u8>>,
    calendars: &[Arc<dyn Calendar>],
    config: &ClientConfig,
) -> Result<(Vec<DetachedProof>, Vec<CalendarWarning>)> {
    if digests.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let mut proofs = Vec::with_capacity(digests.len());
    let mut nodes = Vec::with_capacity(digests.len());
    let mut level: Vec<(Vec<u8>, Vec<usize>)> = Vec::with_capacity(digests.len());
    for (idx, digest) in digests.into_iter().enumerate() {
        let mut proof = DetachedProof::for_digest(kind, digest)?;
        let nonce: [u8; 16] = rand::random();
        let root = proof.tree.root();
        let salted = proof.tree.add_operation(root, Op::Append(nonce.to_vec()));
        let tip = proof.tree.add_operation(salted, Op::Sha256);
        let commitment = proof
            .tree
            .digest(tip)
            .ok_or(chainstamp_types::Error::UncomputableDigest)?
            .to_vec();
        proofs.push(proof);
        nodes.push(tip);
        level.push((commitment, vec![idx]));
    }

    // Pairwise aggregation; a lone trailing entry is promoted unchanged.
    // Pairing extends every proof under the left entry with append+sha256
    // and every proof under the right with prepend+sha256, which is exactly
    // that proof's Merkle path toward the batch tip.
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / 2 + 1);
        let mut entries = level.into_iter();
        while let Some((left_digest, left_members)) = entries.next() {
            let Some((right_digest, right_members)) = entries.next() else {
                next.push((left_digest, left_members));
                break;
            };
            let mut parent_digest = Vec::new();
            for &idx in &left_members {
                let joined = proofs[idx]
                    .tree
                    .add_operation(nodes[idx], Op::Append(right_digest.clone()));
                nodes[idx] = proofs[idx].tree.add_operation(joined, Op::Sha256);
                parent_digest = proofs[idx]
                    .tree
                    .digest(nodes[idx])
                    .ok_or(chainstamp_types::Error::UncomputableDigest)?
                    .to_vec();
            }
            for &idx in &right_members {
                let joined = proofs[idx]
                    .tree
                    .add_operation(nodes[idx], Op::Prepend(left_digest.clone()));
                nodes[idx] = proofs[idx].tree.add_operation(joined, Op::Sha256);
            }
            let mut members = left_members;
            members.extend(right_members);
            next.push((parent_digest, members));
        }
        level = next;
    }
    // Non-empty input always reduces to a single tip entry.
    let (tip_digest, _) = level.pop().expect("aggregation tip");

    let gathered = gather_submissions(&tip_digest, calendars, config).await;
    let mut warnings = Vec::new();
    let mut accepted = 0usize;
    for (url, result) in gathered {
        match result {
            Ok(fragment) => {
                for (proof, &node) in proofs.iter_mut().zip(&nodes) {
                    proof.tree.merge_at(node, &fragment)?;
                }
                accepted += 1;
                info!(%url, batch = proofs.len(), "calendar accepted submission");
            }
            Err(error) => {
                warn!(%url, %error, "calendar submission failed");
                warnings.push(CalendarWarning { url, error });
            }
        }
    }

    if accepted == 0 {
        return Err(ClientError::NoCalendarAvailable {
            attempted: calendars.len(),
            warnings,
        });
    }
    Ok((proofs, warnings))
}

/// Submit the digest at `at` to every calendar and merge each returned
/// fragment at that node. Idempotent: merging the same fragments again is a
/// no-op.
pub async fn submit_at(
    tree: &mut ProofTree,
    at: NodeId,
    calendars: &[Arc<dyn Calendar>],
    config: &ClientConfig,
) -> Result<Vec<CalendarWarning>> {
    let digest = tree
        .digest(at)
        .ok_or(chainstamp_types::Error::UncomputableDigest)?
        .to_vec();

    let gathered = gather_submissions(&digest, calendars, config).await;
    let mut warnings = Vec::new();
    let mut accepted = 0usize;
    for (url, result) in gathered {
        match result {
            Ok(fragment) => {
                tree.merge_at(at, &fragment)?;
                accepted += 1;
                info!(%url, "calendar accepted submission");
            }
            Err(error) => {
                warn!(%url, %error, "calendar submission failed");
                warnings.push(CalendarWarning { url, error });
            }
        }
    }

    if accepted == 0 {
        return Err(ClientError::NoCalendarAvailable {
            attempted: calendars.len(),
            warnings,
        });
    }
    Ok(warnings)
}

/// Bounded concurrent submission of one digest to every calendar; each
/// request runs under its own timeout.
async fn gather_submissions(
    digest: &[u8],
    calendars: &[Arc<dyn Calendar>],
    config: &ClientConfig,
) -> Vec<(String, std::result::Result<ProofTree, CalendarError>)> {
    let timeout = config.timeout;
    // Collected eagerly to work around rust-lang/rust#102211: a lazy
    // `map` closure here makes the spawned future fail the `Send` check
    // with "implementation of `FnOnce` is not general enough".
    let requests: Vec<_> = calendars
        .iter()
        .cloned()
        .map(|calendar| {
            let digest = digest.to_vec();
            async move {
                let url = calendar.url().to_string();
                let result = match tokio::time::timeout(timeout, calendar.submit(&digest)).await {
                    Ok(result) => result,
                    Err(_) => Err(CalendarError::Timeout),
                };
                (url, result)
            }
        })
        .collect();
    futures::stream::iter(requests)
    .buffer_unordered(config.fan_out.max(1))
    .collect()
    .await
}

/// Poll every pending node against its calendar and merge what came back.
///
/// Queries run concurrently; merging is a sequential pass over the gathered
/// fragments. A merge that brought in new structure replaces the node's
/// pending attestation, unless the calendar's fragment itself still carries
/// it (aggregation not finished). "Not found yet", timeouts and malformed
/// fragments become warnings; a conflicting fragment root aborts the whole
/// upgrade, since it means the calendar answered for a different commitment.
pub async fn upgrade(
    proof: &mut DetachedProof,
    calendars: &[Arc<dyn Calendar>],
    config: &ClientConfig,
) -> Result<UpgradeReport> {
    let mut warnings = Vec::new();
    let mut jobs = Vec::new();
    for (node, uri) in proof.tree.pending() {
        let Some(digest) = proof.tree.digest(node) else {
            warnings.push(CalendarWarning {
                url: uri,
                error: CalendarError::Unreachable(
                    "digest at pending node is not derivable".to_string(),
                ),
            });
            continue;
        };
        let Some(calendar) = calendars.iter().find(|c| c.url() == uri) else {
            warnings.push(CalendarWarning {
                url: uri,
                error: CalendarError::Unreachable("no calendar configured for URI".to_string()),
            });
            continue;
        };
        jobs.push((node, uri, digest.to_vec(), Arc::clone(calendar)));
    }

    let timeout = config.timeout;
    let gathered: Vec<(
        NodeId,
        String,
        std::result::Result<ProofTree, CalendarError>,
    )> = futures::stream::iter(jobs.into_iter().map(|(node, uri, digest, calendar)| {
        async move {
            let result = match tokio::time::timeout(timeout, calendar.query(&digest)).await {
                Ok(result) => result,
                Err(_) => Err(CalendarError::Timeout),
            };
            (node, uri, result)
        }
    }))
    .buffer_unordered(config.fan_out.max(1))
    .collect()
    .await;

    let mut changed = false;
    for (node, uri, result) in gathered {
        match result {
            Ok(fragment) => {
                let root_still_pending = fragment
                    .node(fragment.root())
                    .attestations()
                    .any(|a| matches!(a, Attestation::Pending { uri: u } if *u == uri));
                let merged = proof.tree.merge_at(node, &fragment)?;
                if merged {
                    changed = true;
                    if !root_still_pending {
                        proof
                            .tree
                            .remove_attestation(node, &Attestation::Pending { uri: uri.clone() });
                        info!(url = %uri, "pending attestation upgraded");
                    }
                }
            }
            Err(error) => {
                warn!(url = %uri, %error, "upgrade query failed");
                warnings.push(CalendarWarning { url: uri, error });
            }
        }
    }

    Ok(UpgradeReport { changed, warnings })
}

//! Batch stamping: many digests, one calendar submission.

use chainstamp_client::testutil::StubCalendar;
use chainstamp_client::{stamp_batch, upgrade, Calendar, ClientConfig};
use chainstamp_core::{verify, BlockInfo, Chain, LedgerAccess, LedgerError, VerificationOutcome};
use chainstamp_types::{Attestation, DigestKind, Op, ProofTree};
use std::sync::Arc;
use std::time::Duration;

/// Ledger stub exposing exactly one bitcoin block.
struct OneBlock {
    height: u64,
    merkle_root: Vec<u8>,
    time: u32,
}

impl LedgerAccess for OneBlock {
    fn merkle_root_at(&self, chain: Chain, height: u64) -> Result<BlockInfo, LedgerError> {
        if chain == Chain::Bitcoin && height == self.height {
            Ok(BlockInfo {
                merkle_root: self.merkle_root.clone(),
                time: self.time,
            })
        } else {
            Err(LedgerError::HeaderUnavailable { chain, height })
        }
    }
}

fn config() -> ClientConfig {
    ClientConfig {
        fan_out: 4,
        timeout: Duration::from_millis(500),
    }
}

fn batch_digests(count: u8) -> Vec<Vec<u8>> {
    (1..=count).map(|b| vec![b; 32]).collect()
}

/// The digest every proof in the batch committed to the calendar: each
/// pending node must sit at the same aggregation tip.
fn shared_commitment(proofs: &[chainstamp_types::DetachedProof]) -> Vec<u8> {
    let mut tips = proofs.iter().map(|proof| {
        let pending = proof.tree.pending();
        assert_eq!(pending.len(), 1);
        proof.tree.digest(pending[0].0).unwrap().to_vec()
    });
    let first = tips.next().unwrap();
    for tip in tips {
        assert_eq!(tip, first);
    }
    first
}

#[tokio::test]
async fn batch_submits_once_and_shares_the_tip() {
    let cal = Arc::new(StubCalendar::new("https://cal.example"));
    let calendars: Vec<Arc<dyn Calendar>> = vec![cal.clone()];

    // Odd count, so one leaf gets promoted a level unchanged.
    let (proofs, warnings) = stamp_batch(DigestKind::Sha256, batch_digests(3), &calendars, &config())
        .await
        .unwrap();

    assert!(warnings.is_empty());
    assert_eq!(proofs.len(), 3);
    // One network round for the whole batch.
    assert_eq!(cal.submit_count(), 1);

    // Each proof still speaks for its own file digest, in input order.
    for (proof, digest) in proofs.iter().zip(batch_digests(3)) {
        assert_eq!(proof.file_digest(), &digest[..]);
    }
    shared_commitment(&proofs);
}

#[tokio::test]
async fn batch_proofs_upgrade_and_verify_independently() {
    let cal = Arc::new(StubCalendar::new("https://cal.example"));
    let calendars: Vec<Arc<dyn Calendar>> = vec![cal.clone()];

    let (mut proofs, _) = stamp_batch(DigestKind::Sha256, batch_digests(3), &calendars, &config())
        .await
        .unwrap();
    let tip = shared_commitment(&proofs);

    // The calendar has since aggregated the batch tip into a bitcoin block.
    let mut fragment = ProofTree::new(tip.clone());
    let anchored = fragment.add_operation(fragment.root(), Op::Sha256);
    let merkle_root = fragment.digest(anchored).unwrap().to_vec();
    fragment.add_attestation(anchored, Attestation::Bitcoin { height: 800_000 });
    cal.set_response(tip, fragment);

    let ledger = OneBlock {
        height: 800_000,
        merkle_root,
        time: 1_700_000_000,
    };
    for proof in &mut proofs {
        let report = upgrade(proof, &calendars, &config()).await.unwrap();
        assert!(report.changed);
        assert!(proof.tree.pending().is_empty());

        let results = verify(proof, &ledger);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].outcome,
            VerificationOutcome::Attested {
                chain: Chain::Bitcoin,
                height: 800_000,
                time: 1_700_000_000
            }
        );
    }
}

#[tokio::test]
async fn single_digest_batch_salts_like_stamp() {
    let cal = Arc::new(StubCalendar::new("https://cal.example"));
    let calendars: Vec<Arc<dyn Calendar>> = vec![cal.clone()];

    let (proofs, _) = stamp_batch(DigestKind::Sha256, batch_digests(1), &calendars, &config())
        .await
        .unwrap();

    assert_eq!(proofs.len(), 1);
    assert_eq!(cal.submit_count(), 1);
    // No siblings to pair with: the commitment is just the salted digest.
    let root_edges: Vec<_> = proofs[0].tree.node(proofs[0].tree.root()).edges().collect();
    assert_eq!(root_edges.len(), 1);
    match root_edges[0].0 {
        Op::Append(nonce) => assert_eq!(nonce.len(), 16),
        other => panic!("expected append nonce at root, got {other}"),
    }
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let cal = Arc::new(StubCalendar::new("https://cal.example"));
    let calendars: Vec<Arc<dyn Calendar>> = vec![cal.clone()];

    let (proofs, warnings) = stamp_batch(DigestKind::Sha256, Vec::new(), &calendars, &config())
        .await
        .unwrap();

    assert!(proofs.is_empty());
    assert!(warnings.is_empty());
    assert_eq!(cal.submit_count(), 0);
}

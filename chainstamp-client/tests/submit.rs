//! Submission behavior under partial and total calendar failure.

use chainstamp_client::testutil::{StubCalendar, SubmitMode};
use chainstamp_client::{stamp, submit, submit_at, Calendar, ClientConfig, ClientError};
use chainstamp_core::{parse, serialize};
use chainstamp_types::{DigestKind, Op};
use std::sync::Arc;
use std::time::Duration;

fn config(timeout_ms: u64) -> ClientConfig {
    ClientConfig {
        fan_out: 4,
        timeout: Duration::from_millis(timeout_ms),
    }
}

#[tokio::test]
async fn partial_failure_is_success_with_warnings() {
    let good = Arc::new(StubCalendar::new("https://good.example"));
    let slow = Arc::new(
        StubCalendar::new("https://slow.example").with_delay(Duration::from_millis(500)),
    );
    let calendars: Vec<Arc<dyn Calendar>> = vec![good, slow];

    let (proof, warnings) = submit(DigestKind::Sha256, vec![1u8; 32], &calendars, &config(50))
        .await
        .unwrap();

    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].url, "https://slow.example");

    let pending = proof.tree.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].1, "https://good.example");
}

#[tokio::test]
async fn all_calendars_failing_is_an_error() {
    let calendars: Vec<Arc<dyn Calendar>> = vec![
        Arc::new(
            StubCalendar::new("https://a.example").with_submit_mode(SubmitMode::Unreachable),
        ),
        Arc::new(
            StubCalendar::new("https://b.example").with_submit_mode(SubmitMode::Unreachable),
        ),
    ];

    let err = submit(DigestKind::Sha256, vec![2u8; 32], &calendars, &config(50))
        .await
        .unwrap_err();

    match err {
        ClientError::NoCalendarAvailable {
            attempted,
            warnings,
        } => {
            assert_eq!(attempted, 2);
            assert_eq!(warnings.len(), 2);
        }
        other => panic!("expected NoCalendarAvailable, got {other}"),
    }
}

#[tokio::test]
async fn resubmission_is_idempotent() {
    let cal = Arc::new(StubCalendar::new("https://cal.example"));
    let calendars: Vec<Arc<dyn Calendar>> = vec![cal.clone()];

    let (mut proof, warnings) = submit(DigestKind::Sha256, vec![3u8; 32], &calendars, &config(500))
        .await
        .unwrap();
    assert!(warnings.is_empty());

    let before = proof.tree.clone();
    let root = proof.tree.root();
    submit_at(&mut proof.tree, root, &calendars, &config(500))
        .await
        .unwrap();

    assert_eq!(proof.tree, before);
    assert_eq!(cal.submit_count(), 2);
}

#[tokio::test]
async fn stamp_salts_the_digest_before_submission() {
    let cal = Arc::new(StubCalendar::new("https://cal.example"));
    let calendars: Vec<Arc<dyn Calendar>> = vec![cal];

    let (proof, _) = stamp(DigestKind::Sha256, vec![4u8; 32], &calendars, &config(500))
        .await
        .unwrap();

    // The root keeps the file digest; the calendar only ever saw the salted
    // commitment behind append-nonce + sha256.
    assert_eq!(proof.file_digest(), &[4u8; 32][..]);
    let root_edges: Vec<_> = proof.tree.node(proof.tree.root()).edges().collect();
    assert_eq!(root_edges.len(), 1);
    match root_edges[0].0 {
        Op::Append(nonce) => assert_eq!(nonce.len(), 16),
        other => panic!("expected append nonce at root, got {other}"),
    }

    let pending = proof.tree.pending();
    assert_eq!(pending.len(), 1);
    let commitment = proof.tree.digest(pending[0].0).unwrap();
    assert_ne!(commitment, proof.file_digest());
}

#[tokio::test]
async fn pending_proof_survives_a_disk_round_trip() {
    let cal: Arc<dyn Calendar> = Arc::new(StubCalendar::new("https://cal.example"));
    let (proof, _) = submit(DigestKind::Sha256, vec![5u8; 32], &[cal], &config(500))
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.stamp");
    std::fs::write(&path, serialize(&proof).unwrap()).unwrap();

    let reloaded = parse(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(reloaded, proof);
}

//! Byte-level API for binding layers
//!
//! Every entry point takes and returns serialized proofs, never live tree
//! handles, so callers on the other side of an FFI or IPC boundary only ever
//! exchange bytes. All inputs go through the hardened parser first and are
//! safe on untrusted data.

use crate::calendar::{Calendar, HttpCalendar};
use crate::client::{self, CalendarWarning, ClientConfig, UpgradeReport};
use crate::Result;
use chainstamp_core::{parse, serialize, LedgerAccess, VerificationResult};
use chainstamp_types::DigestKind;
use std::collections::BTreeSet;
use std::sync::Arc;

fn http_calendars(
    urls: impl IntoIterator<Item = String>,
    config: &ClientConfig,
) -> Vec<Arc<dyn Calendar>> {
    urls.into_iter()
        .map(|url| Arc::new(HttpCalendar::new(url, config.timeout)) as Arc<dyn Calendar>)
        .collect()
}

/// Stamp `digest` against the calendars at `urls`; returns the serialized
/// pending proof plus warnings for calendars that failed.
pub async fn stamp(
    kind: DigestKind,
    digest: &[u8],
    urls: &[String],
    config: &ClientConfig,
) -> Result<(Vec<u8>, Vec<CalendarWarning>)> {
    let calendars = http_calendars(urls.iter().cloned(), config);
    let (proof, warnings) = client::stamp(kind, digest.to_vec(), &calendars, config).await?;
    Ok((serialize(&proof)?, warnings))
}

/// Stamp several digests in one round: the digests are aggregated locally
/// and the calendars see a single submission. Returns one serialized proof
/// per digest, in input order.
pub async fn stamp_batch(
    kind: DigestKind,
    digests: &[Vec<u8>],
    urls: &[String],
    config: &ClientConfig,
) -> Result<(Vec<Vec<u8>>, Vec<CalendarWarning>)> {
    let calendars = http_calendars(urls.iter().cloned(), config);
    let (proofs, warnings) =
        client::stamp_batch(kind, digests.to_vec(), &calendars, config).await?;
    let mut encoded = Vec::with_capacity(proofs.len());
    for proof in &proofs {
        encoded.push(serialize(proof)?);
    }
    Ok((encoded, warnings))
}

/// Upgrade a serialized proof by polling the calendars recorded in its
/// pending attestations. Returns the (possibly improved) serialized proof
/// and what the round accomplished.
pub async fn upgrade(
    proof_bytes: &[u8],
    config: &ClientConfig,
) -> Result<(Vec<u8>, UpgradeReport)> {
    let mut proof = parse(proof_bytes)?;
    let urls: BTreeSet<String> = proof
        .tree
        .pending()
        .into_iter()
        .map(|(_, uri)| uri)
        .collect();
    let calendars = http_calendars(urls, config);
    let report = client::upgrade(&mut proof, &calendars, config).await?;
    Ok((serialize(&proof)?, report))
}

/// Parse and verify a serialized proof against `ledger`.
pub fn verify(proof_bytes: &[u8], ledger: &dyn LedgerAccess) -> Result<Vec<VerificationResult>> {
    Ok(chainstamp_core::verify(&parse(proof_bytes)?, ledger))
}

/// Parse a serialized proof and render it as human-readable text.
pub fn info(proof_bytes: &[u8]) -> Result<String> {
    Ok(chainstamp_core::info(&parse(proof_bytes)?))
}

//! Proof engine for chainstamp
//!
//! This crate turns the proof data model of `chainstamp-types` into a usable
//! engine: the versioned binary codec for detached proofs and calendar
//! fragments, the verifier that checks attestation paths against ledger
//! data, and a human-readable rendering of a proof tree.

pub mod info;
pub mod ser;
pub mod verify;

pub use info::info;
pub use ser::{parse, parse_fragment, serialize, serialize_tree, ParseError, SerializeError};
pub use verify::{
    verify, BlockInfo, CachedLedger, Chain, LedgerAccess, LedgerError, VerificationOutcome,
    VerificationResult,
};

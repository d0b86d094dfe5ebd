//! Core proof data model for the chainstamp timestamping engine
//!
//! This crate defines the fundamental data structures shared by the codec,
//! the verifier and the calendar client: byte-transform operations,
//! attestations, and the proof tree they hang off.

pub mod attestation;
pub mod error;
pub mod op;
pub mod tree;

pub use attestation::Attestation;
pub use error::{Error, Result};
pub use op::{DigestKind, Op};
pub use tree::{DetachedProof, NodeId, ProofNode, ProofTree};

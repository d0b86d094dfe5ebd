//! Byte-transform operations
//!
//! An [`Op`] is one deterministic transform applied to a byte buffer on the
//! way from a file digest to an attested commitment. Applying an operation
//! never fails; malformed parameters are rejected when a proof is parsed.

use crate::error::{Error, Result};
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest as _, Sha256};
use sha3::Keccak256;
use std::fmt;

/// Wire tags for operations. Tags with the high bit set carry a
/// length-prefixed parameter on the wire.
pub mod tag {
    pub const SHA1: u8 = 0x02;
    pub const RIPEMD160: u8 = 0x03;
    pub const SHA256: u8 = 0x08;
    pub const REVERSE: u8 = 0x0f;
    pub const KECCAK256: u8 = 0x67;
    pub const APPEND: u8 = 0xf0;
    pub const PREPEND: u8 = 0xf1;

    /// True if an operation with this tag carries a byte-sequence parameter.
    pub fn parameterized(tag: u8) -> bool {
        tag & 0x80 != 0
    }
}

/// A single proof operation.
///
/// `Unknown` preserves operations this implementation does not understand so
/// that re-serializing a proof loses no data. The digest below an unknown
/// operation cannot be computed, which makes attestations under it
/// inconclusive rather than verifiable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Op {
    Sha256,
    Sha1,
    Ripemd160,
    Keccak256,
    Append(Vec<u8>),
    Prepend(Vec<u8>),
    Reverse,
    Unknown { tag: u8, param: Vec<u8> },
}

impl Op {
    /// Apply this operation to `input`.
    ///
    /// Pure and total for every known operation; returns `None` only for
    /// `Unknown`, whose semantics this implementation cannot evaluate.
    pub fn apply(&self, input: &[u8]) -> Option<Vec<u8>> {
        Some(match self {
            Op::Sha256 => Sha256::digest(input).to_vec(),
            Op::Sha1 => Sha1::digest(input).to_vec(),
            Op::Ripemd160 => Ripemd160::digest(input).to_vec(),
            Op::Keccak256 => Keccak256::digest(input).to_vec(),
            Op::Append(param) => {
                let mut out = Vec::with_capacity(input.len() + param.len());
                out.extend_from_slice(input);
                out.extend_from_slice(param);
                out
            }
            Op::Prepend(param) => {
                let mut out = Vec::with_capacity(input.len() + param.len());
                out.extend_from_slice(param);
                out.extend_from_slice(input);
                out
            }
            Op::Reverse => input.iter().rev().copied().collect(),
            Op::Unknown { .. } => return None,
        })
    }

    /// The wire tag for this operation.
    pub fn tag(&self) -> u8 {
        match self {
            Op::Sha256 => tag::SHA256,
            Op::Sha1 => tag::SHA1,
            Op::Ripemd160 => tag::RIPEMD160,
            Op::Keccak256 => tag::KECCAK256,
            Op::Append(_) => tag::APPEND,
            Op::Prepend(_) => tag::PREPEND,
            Op::Reverse => tag::REVERSE,
            Op::Unknown { tag, .. } => *tag,
        }
    }

    /// The byte-sequence parameter, for parameterized operations.
    pub fn param(&self) -> Option<&[u8]> {
        match self {
            Op::Append(p) | Op::Prepend(p) => Some(p),
            Op::Unknown { tag, param } if tag::parameterized(*tag) => Some(param),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Sha256 => write!(f, "sha256"),
            Op::Sha1 => write!(f, "sha1"),
            Op::Ripemd160 => write!(f, "ripemd160"),
            Op::Keccak256 => write!(f, "keccak256"),
            Op::Append(p) => write!(f, "append {}", hex::encode(p)),
            Op::Prepend(p) => write!(f, "prepend {}", hex::encode(p)),
            Op::Reverse => write!(f, "reverse"),
            Op::Unknown { tag, param } => {
                write!(f, "unknown op {:#04x} {}", tag, hex::encode(param))
            }
        }
    }
}

/// The hash algorithm that produced the original file digest.
///
/// Recorded in the detached proof header so a verifier can re-hash the
/// original file and compare against the proof's root digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestKind {
    Sha1,
    Sha256,
    Ripemd160,
    Keccak256,
}

impl DigestKind {
    /// The wire tag (shared with the operation tag space).
    pub fn tag(&self) -> u8 {
        match self {
            DigestKind::Sha1 => tag::SHA1,
            DigestKind::Sha256 => tag::SHA256,
            DigestKind::Ripemd160 => tag::RIPEMD160,
            DigestKind::Keccak256 => tag::KECCAK256,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            tag::SHA1 => Some(DigestKind::Sha1),
            tag::SHA256 => Some(DigestKind::Sha256),
            tag::RIPEMD160 => Some(DigestKind::Ripemd160),
            tag::KECCAK256 => Some(DigestKind::Keccak256),
            _ => None,
        }
    }

    /// Output length in bytes of this hash.
    pub fn digest_len(&self) -> usize {
        match self {
            DigestKind::Sha1 | DigestKind::Ripemd160 => 20,
            DigestKind::Sha256 | DigestKind::Keccak256 => 32,
        }
    }

    /// Hash a buffer with this algorithm.
    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestKind::Sha1 => Sha1::digest(data).to_vec(),
            DigestKind::Sha256 => Sha256::digest(data).to_vec(),
            DigestKind::Ripemd160 => Ripemd160::digest(data).to_vec(),
            DigestKind::Keccak256 => Keccak256::digest(data).to_vec(),
        }
    }

    /// Check that `digest` has the length this algorithm produces.
    pub fn check_digest(&self, digest: &[u8]) -> Result<()> {
        if digest.len() != self.digest_len() {
            return Err(Error::InvalidDigestLength {
                kind: self.name(),
                expected: self.digest_len(),
                actual: digest.len(),
            });
        }
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        match self {
            DigestKind::Sha1 => "sha1",
            DigestKind::Sha256 => "sha256",
            DigestKind::Ripemd160 => "ripemd160",
            DigestKind::Keccak256 => "keccak256",
        }
    }
}

impl fmt::Display for DigestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//! Error types shared across the proof data model

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid digest length for {kind}: expected {expected}, got {actual}")]
    InvalidDigestLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Conflicting digest under the same operation path: expected {expected}, got {found}")]
    ConflictingDigest { expected: String, found: String },

    #[error("Merge point digest is not computable (unknown operation on its path)")]
    UncomputableDigest,
}

impl Error {
    /// Build a `ConflictingDigest` from the raw digests involved.
    pub(crate) fn conflicting(expected: &[u8], found: &[u8]) -> Self {
        Error::ConflictingDigest {
            expected: hex::encode(expected),
            found: hex::encode(found),
        }
    }
}

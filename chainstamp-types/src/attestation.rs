//! Attestations: claims anchoring a digest to a ledger or to a calendar

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire tags for attestations.
pub mod tag {
    pub const PENDING: u8 = 0x01;
    pub const BITCOIN: u8 = 0x02;
    pub const LITECOIN: u8 = 0x03;
}

/// A claim attached to a proof node.
///
/// `Pending` means the node's digest was submitted to the calendar at `uri`
/// and a ledger commitment is not yet available. The chain variants claim
/// the node's digest equals the Merkle root of the block at `height`.
/// `Unknown` preserves attestation types this implementation does not
/// recognize, verbatim, so they survive a re-serialization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Attestation {
    Pending { uri: String },
    Bitcoin { height: u64 },
    Litecoin { height: u64 },
    Unknown { tag: u8, payload: Vec<u8> },
}

impl Attestation {
    /// The wire tag for this attestation.
    pub fn tag(&self) -> u8 {
        match self {
            Attestation::Pending { .. } => tag::PENDING,
            Attestation::Bitcoin { .. } => tag::BITCOIN,
            Attestation::Litecoin { .. } => tag::LITECOIN,
            Attestation::Unknown { tag, .. } => *tag,
        }
    }

    /// True for `Pending` attestations, the ones an upgrade can resolve.
    pub fn is_pending(&self) -> bool {
        matches!(self, Attestation::Pending { .. })
    }
}

impl fmt::Display for Attestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attestation::Pending { uri } => write!(f, "pending attestation at {uri}"),
            Attestation::Bitcoin { height } => write!(f, "bitcoin block {height}"),
            Attestation::Litecoin { height } => write!(f, "litecoin block {height}"),
            Attestation::Unknown { tag, payload } => {
                write!(
                    f,
                    "unknown attestation {:#04x} ({} bytes)",
                    tag,
                    payload.len()
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(
            Attestation::Pending {
                uri: "https://cal.example".into()
            }
            .tag(),
            tag::PENDING
        );
        assert_eq!(Attestation::Bitcoin { height: 700_000 }.tag(), tag::BITCOIN);
        assert_eq!(Attestation::Litecoin { height: 1 }.tag(), tag::LITECOIN);
        assert_eq!(
            Attestation::Unknown {
                tag: 0x7f,
                payload: vec![1]
            }
            .tag(),
            0x7f
        );
    }

    #[test]
    fn test_serde_json_shape() {
        let a = Attestation::Bitcoin { height: 5 };
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, r#"{"Bitcoin":{"height":5}}"#);
        let back: Attestation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn test_display() {
        let a = Attestation::Bitcoin { height: 700_000 };
        assert_eq!(a.to_string(), "bitcoin block 700000");
        let p = Attestation::Pending {
            uri: "https://cal.example".into(),
        };
        assert!(p.to_string().contains("https://cal.example"));
    }
}

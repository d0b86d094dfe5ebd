//! Proptest-based fuzzing for the detached proof codec.
//!
//! These tests feed arbitrary and mutated byte streams to the parser to
//! verify it never panics, only returns errors, and that whatever parses
//! successfully re-serializes to something the parser accepts again.

use chainstamp_core::{parse, parse_fragment, serialize};
use chainstamp_types::{Attestation, DetachedProof, DigestKind, Op};
use proptest::prelude::*;

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Sha256),
        Just(Op::Sha1),
        Just(Op::Ripemd160),
        Just(Op::Keccak256),
        Just(Op::Reverse),
        prop::collection::vec(any::<u8>(), 1..16).prop_map(Op::Append),
        prop::collection::vec(any::<u8>(), 1..16).prop_map(Op::Prepend),
    ]
}

fn arb_attestation() -> impl Strategy<Value = Attestation> {
    prop_oneof![
        (1u64..10_000_000).prop_map(|height| Attestation::Bitcoin { height }),
        (1u64..10_000_000).prop_map(|height| Attestation::Litecoin { height }),
        "[a-z0-9.-]{1,30}".prop_map(|host| Attestation::Pending {
            uri: format!("https://{host}/")
        }),
    ]
}

fn arb_proof() -> impl Strategy<Value = DetachedProof> {
    (
        prop::array::uniform32(any::<u8>()),
        prop::collection::vec(
            (prop::collection::vec(arb_op(), 0..6), arb_attestation()),
            1..6,
        ),
    )
        .prop_map(|(digest, branches)| {
            let mut proof =
                DetachedProof::for_digest(DigestKind::Sha256, digest.to_vec()).unwrap();
            for (path, attestation) in branches {
                let mut at = proof.tree.root();
                for op in path {
                    at = proof.tree.add_operation(at, op);
                }
                proof.tree.add_attestation(at, attestation);
            }
            proof
        })
}

proptest! {
    // === Arbitrary input never panics ===

    #[test]
    fn fuzz_parse_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = parse(&bytes);
    }

    #[test]
    fn fuzz_parse_fragment_arbitrary_bytes(
        bytes in prop::collection::vec(any::<u8>(), 0..512),
        digest in prop::array::uniform32(any::<u8>())
    ) {
        let _ = parse_fragment(&bytes, &digest);
    }

    // === Mutations of a valid proof never panic, and anything that still
    // parses must survive a re-serialization unchanged ===

    #[test]
    fn fuzz_parse_mutated_proof(
        proof in arb_proof(),
        index in any::<prop::sample::Index>(),
        byte in any::<u8>()
    ) {
        let mut bytes = serialize(&proof).unwrap();
        let at = index.index(bytes.len());
        bytes[at] = byte;
        if let Ok(parsed) = parse(&bytes) {
            // The parser only admits trees the serializer can represent;
            // whatever it accepted must mean the same tree on the way back.
            let rewritten = serialize(&parsed).unwrap();
            prop_assert_eq!(parse(&rewritten).unwrap(), parsed);
        }
    }

    #[test]
    fn fuzz_parse_truncated_proof(
        proof in arb_proof(),
        index in any::<prop::sample::Index>()
    ) {
        let bytes = serialize(&proof).unwrap();
        let cut = index.index(bytes.len());
        let _ = parse(&bytes[..cut]);
    }

    // === Whatever serializes must parse back to the same proof ===

    #[test]
    fn fuzz_serialize_parse_identity(proof in arb_proof()) {
        let bytes = serialize(&proof).unwrap();
        let parsed = parse(&bytes).unwrap();
        prop_assert_eq!(parsed, proof);
    }
}

//! Human-readable rendering of a proof tree
//!
//! Linear operation chains render one operation per line at the same
//! indentation; forks render each branch behind a `->` marker one level
//! deeper, so the reader can follow every root-to-attestation path.

use chainstamp_types::{DetachedProof, NodeId, Op};

enum Item<'a> {
    Node(NodeId, usize),
    Branch(&'a Op, NodeId, usize),
}

/// Render `proof` as an indented textual tree.
pub fn info(proof: &DetachedProof) -> String {
    let tree = &proof.tree;
    let mut out = format!(
        "File {} digest: {}\n",
        proof.digest_kind,
        hex::encode(proof.file_digest())
    );

    let mut stack = vec![Item::Node(tree.root(), 0)];
    while let Some(item) = stack.pop() {
        match item {
            Item::Node(id, depth) => {
                let node = tree.node(id);
                for attestation in node.attestations() {
                    push_line(&mut out, depth, &format!("verify {attestation}"));
                }
                let edges: Vec<_> = node.edges().collect();
                if let [(op, child)] = edges[..] {
                    // A single continuation stays at the same depth.
                    push_line(&mut out, depth, &op.to_string());
                    stack.push(Item::Node(child, depth));
                } else {
                    // Reverse push so branches print in ascending op order.
                    for (op, child) in edges.into_iter().rev() {
                        stack.push(Item::Branch(op, child, depth));
                    }
                }
            }
            Item::Branch(op, child, depth) => {
                push_line(&mut out, depth, &format!("-> {op}"));
                stack.push(Item::Node(child, depth + 1));
            }
        }
    }
    out
}

fn push_line(out: &mut String, depth: usize, line: &str) {
    for _ in 0..depth {
        out.push_str("    ");
    }
    out.push_str(line);
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainstamp_types::{Attestation, DigestKind};

    fn proof() -> DetachedProof {
        DetachedProof::for_digest(DigestKind::Sha256, vec![0xabu8; 32]).unwrap()
    }

    #[test]
    fn test_header_names_digest_kind_and_hex() {
        let rendered = info(&proof());
        assert!(rendered.starts_with(&format!("File sha256 digest: {}\n", "ab".repeat(32))));
    }

    #[test]
    fn test_linear_chain_renders_flat() {
        let mut p = proof();
        let a = p.tree.add_operation(p.tree.root(), Op::Append(vec![0x01]));
        let b = p.tree.add_operation(a, Op::Sha256);
        p.tree
            .add_attestation(b, Attestation::Bitcoin { height: 700_000 });

        let rendered = info(&p);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[1], "append 01");
        assert_eq!(lines[2], "sha256");
        assert_eq!(lines[3], "verify bitcoin block 700000");
    }

    #[test]
    fn test_fork_indents_each_branch() {
        let mut p = proof();
        let root = p.tree.root();
        let left = p.tree.add_operation(root, Op::Sha256);
        let right = p.tree.add_operation(root, Op::Reverse);
        p.tree.add_attestation(
            left,
            Attestation::Pending {
                uri: "https://cal.example".into(),
            },
        );
        p.tree
            .add_attestation(right, Attestation::Litecoin { height: 9 });

        let rendered = info(&p);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[1], "-> sha256");
        assert_eq!(lines[2], "    verify pending attestation at https://cal.example");
        assert_eq!(lines[3], "-> reverse");
        assert_eq!(lines[4], "    verify litecoin block 9");
    }

    #[test]
    fn test_attestation_precedes_continuation() {
        let mut p = proof();
        let root = p.tree.root();
        p.tree.add_attestation(
            root,
            Attestation::Pending {
                uri: "https://cal.example".into(),
            },
        );
        let child = p.tree.add_operation(root, Op::Sha256);
        p.tree
            .add_attestation(child, Attestation::Bitcoin { height: 1 });

        let rendered = info(&p);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[1], "verify pending attestation at https://cal.example");
        assert_eq!(lines[2], "sha256");
        assert_eq!(lines[3], "verify bitcoin block 1");
    }
}

//! The proof tree: a DAG of operations and attestations rooted at a digest
//!
//! Nodes live in an arena and are addressed by opaque [`NodeId`] handles so
//! that merging can relink shared sub-structure without ownership gymnastics.
//! A node's digest is derived from the operation path that reaches it; it is
//! computed when the edge is created and never mutated independently.

use crate::attestation::Attestation;
use crate::error::{Error, Result};
use crate::op::{DigestKind, Op};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Opaque handle to a node in one [`ProofTree`]'s arena.
///
/// Handles are only meaningful for the tree that minted them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node of a proof tree.
#[derive(Debug, Clone)]
pub struct ProofNode {
    /// Digest derived from the operation path reaching this node.
    /// `None` below an operation whose semantics are unknown.
    digest: Option<Vec<u8>>,
    /// Child edges, keyed by operation identity. Two edges with the same
    /// operation always reference the same child.
    edges: BTreeMap<Op, NodeId>,
    /// Attestations attached directly at this node.
    attestations: BTreeSet<Attestation>,
}

impl ProofNode {
    fn new(digest: Option<Vec<u8>>) -> Self {
        Self {
            digest,
            edges: BTreeMap::new(),
            attestations: BTreeSet::new(),
        }
    }

    pub fn digest(&self) -> Option<&[u8]> {
        self.digest.as_deref()
    }

    pub fn edges(&self) -> impl Iterator<Item = (&Op, NodeId)> {
        self.edges.iter().map(|(op, id)| (op, *id))
    }

    pub fn attestations(&self) -> impl Iterator<Item = &Attestation> {
        self.attestations.iter()
    }

    /// True when the node carries neither attestations nor child edges.
    pub fn is_bare(&self) -> bool {
        self.edges.is_empty() && self.attestations.is_empty()
    }
}

/// A proof tree rooted at a known digest.
#[derive(Debug, Clone)]
pub struct ProofTree {
    nodes: Vec<ProofNode>,
    root: NodeId,
}

impl ProofTree {
    /// Create a tree whose root carries `digest`.
    pub fn new(digest: Vec<u8>) -> Self {
        Self {
            nodes: vec![ProofNode::new(Some(digest))],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &ProofNode {
        &self.nodes[id.index()]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The digest at the root (present by construction).
    pub fn root_digest(&self) -> &[u8] {
        self.nodes[self.root.index()]
            .digest
            .as_deref()
            .unwrap_or(&[])
    }

    /// Digest at an arbitrary node; `None` below an unknown operation.
    pub fn digest(&self, id: NodeId) -> Option<&[u8]> {
        self.nodes[id.index()].digest.as_deref()
    }

    /// Follow `op` from `id`, creating the child if the edge does not exist.
    ///
    /// Idempotent: an existing edge with an equal operation returns the
    /// existing child. The child's digest is `op` applied to the parent's.
    pub fn add_operation(&mut self, id: NodeId, op: Op) -> NodeId {
        if let Some(child) = self.nodes[id.index()].edges.get(&op) {
            return *child;
        }
        let child_digest = self.nodes[id.index()]
            .digest
            .as_deref()
            .and_then(|d| op.apply(d));
        let child = NodeId(self.nodes.len() as u32);
        self.nodes.push(ProofNode::new(child_digest));
        self.nodes[id.index()].edges.insert(op, child);
        child
    }

    /// Attach an attestation at `id`. Returns `false` if it was already there.
    pub fn add_attestation(&mut self, id: NodeId, attestation: Attestation) -> bool {
        self.nodes[id.index()].attestations.insert(attestation)
    }

    /// Remove an attestation from `id`. Returns `false` if it was absent.
    pub fn remove_attestation(&mut self, id: NodeId, attestation: &Attestation) -> bool {
        self.nodes[id.index()].attestations.remove(attestation)
    }

    /// Structurally union `other` into this tree.
    ///
    /// Both trees must be rooted at the same digest; otherwise this fails
    /// with [`Error::ConflictingDigest`] and the tree is left untouched.
    pub fn merge(&mut self, other: &ProofTree) -> Result<bool> {
        let root = self.root;
        self.merge_at(root, other)
    }

    /// Union a proof fragment rooted at the digest of node `at`.
    ///
    /// This is the one integrity gate of the engine: if the fragment claims
    /// a different root digest than the one derived at the merge point, the
    /// fragment is rejected with [`Error::ConflictingDigest`] before any
    /// mutation happens, so a failed merge never leaves a partial union.
    ///
    /// Returns whether anything new was adopted.
    pub fn merge_at(&mut self, at: NodeId, fragment: &ProofTree) -> Result<bool> {
        let local = self.nodes[at.index()]
            .digest
            .as_deref()
            .ok_or(Error::UncomputableDigest)?;
        if local != fragment.root_digest() {
            return Err(Error::conflicting(local, fragment.root_digest()));
        }

        let mut changed = false;
        let mut stack = vec![(at, fragment.root)];
        while let Some((ours, theirs)) = stack.pop() {
            for attestation in fragment.nodes[theirs.index()].attestations.clone() {
                changed |= self.add_attestation(ours, attestation);
            }
            let edges: Vec<(Op, NodeId)> = fragment.nodes[theirs.index()]
                .edges
                .iter()
                .map(|(op, id)| (op.clone(), *id))
                .collect();
            for (op, their_child) in edges {
                let existed = self.nodes[ours.index()].edges.contains_key(&op);
                let our_child = self.add_operation(ours, op);
                changed |= !existed;
                stack.push((our_child, their_child));
            }
        }
        Ok(changed)
    }

    /// Every attestation in the tree with the node it sits on, in
    /// deterministic preorder.
    pub fn attestations(&self) -> Vec<(NodeId, Attestation)> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.index()];
            for attestation in &node.attestations {
                out.push((id, attestation.clone()));
            }
            // Reverse push so preorder follows ascending op order.
            for child in node.edges.values().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Nodes carrying a pending attestation, paired with the calendar URI.
    pub fn pending(&self) -> Vec<(NodeId, String)> {
        self.attestations()
            .into_iter()
            .filter_map(|(id, attestation)| match attestation {
                Attestation::Pending { uri } => Some((id, uri)),
                _ => None,
            })
            .collect()
    }
}

impl PartialEq for ProofTree {
    /// Structural equality: same digests, attestations and edge structure,
    /// independent of arena layout.
    fn eq(&self, other: &Self) -> bool {
        let mut stack = vec![(self.root, other.root)];
        while let Some((a, b)) = stack.pop() {
            let na = &self.nodes[a.index()];
            let nb = &other.nodes[b.index()];
            if na.digest != nb.digest || na.attestations != nb.attestations {
                return false;
            }
            if na.edges.len() != nb.edges.len() {
                return false;
            }
            for ((op_a, ca), (op_b, cb)) in na.edges.iter().zip(nb.edges.iter()) {
                if op_a != op_b {
                    return false;
                }
                stack.push((*ca, *cb));
            }
        }
        true
    }
}

impl Eq for ProofTree {}

/// The top-level persisted entity: which hash produced the file digest, plus
/// the proof tree rooted at that digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedProof {
    pub digest_kind: DigestKind,
    pub tree: ProofTree,
}

impl DetachedProof {
    /// Build a detached proof for an already computed digest.
    pub fn for_digest(digest_kind: DigestKind, digest: Vec<u8>) -> Result<Self> {
        digest_kind.check_digest(&digest)?;
        Ok(Self {
            digest_kind,
            tree: ProofTree::new(digest),
        })
    }

    /// Hash `data` with `digest_kind` and build a detached proof for it.
    pub fn from_file_data(digest_kind: DigestKind, data: &[u8]) -> Self {
        Self {
            digest_kind,
            tree: ProofTree::new(digest_kind.hash(data)),
        }
    }

    pub fn file_digest(&self) -> &[u8] {
        self.tree.root_digest()
    }
}

impl fmt::Display for DetachedProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "proof for {}:{} ({} attestations)",
            self.digest_kind,
            hex::encode(self.file_digest()),
            self.tree.attestations().len()
        )
    }
}

//! Binary codec for detached proofs and calendar fragments
//!
//! The wire format is version-tagged and deliberately boring:
//!
//! ```text
//! file   := MAGIC version digest_kind_tag root_digest node
//! node   := (0xff entry)* entry
//! entry  := 0x00 attestation_tag varbytes        ; attestation record
//!         | op_tag [varbytes] node               ; operation edge + child
//! ```
//!
//! A node's entries are its attestation records followed by its operation
//! edges, both in sorted order; every entry except the last is prefixed by
//! the fork marker `0xff`, so a linear chain (the common case) costs no
//! marker bytes at all. Operation tags with the high bit set carry a
//! length-prefixed parameter. Lengths and block heights are unsigned LEB128
//! varints.
//!
//! Proof bytes are attacker-controlled input: both directions run on
//! explicit work stacks rather than call recursion, and the parser enforces
//! hard limits on parameter sizes, payload sizes and node counts.

use chainstamp_types::{op, Attestation, DetachedProof, DigestKind, NodeId, Op, ProofTree};
use thiserror::Error;

/// Fixed magic prefix of a detached proof file.
pub const MAGIC: &[u8] = b"\x00chainstamp\x00\x00proof\x00";
/// Current (and only) format version.
pub const VERSION: u8 = 0x01;

const FORK: u8 = 0xff;
const ATTESTATION_MARKER: u8 = 0x00;

const MAX_PARAM_LEN: usize = 4096;
const MAX_PAYLOAD_LEN: usize = 8192;
const MAX_URI_LEN: usize = 1000;
const MAX_NODES: usize = 1 << 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Bad magic bytes, not a chainstamp proof")]
    BadMagic,

    #[error("Unsupported format version {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown file digest tag {0:#04x}")]
    UnknownDigestKind(u8),

    #[error("Unexpected end of input")]
    UnexpectedEof,

    #[error("{0} trailing bytes after the proof")]
    TrailingBytes(usize),

    #[error("Varint does not fit in 64 bits")]
    VarintOverflow,

    #[error("Length {len} exceeds limit {limit}")]
    LengthLimit { len: usize, limit: usize },

    #[error("Proof exceeds the {0}-node limit")]
    TooManyNodes(usize),

    #[error("Invalid calendar URI in pending attestation")]
    InvalidUri,

    #[error("Invalid payload for attestation tag {0:#04x}")]
    InvalidAttestationPayload(u8),

    #[error("Reserved byte {0:#04x} used as an operation tag")]
    ReservedOpTag(u8),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializeError {
    /// A node with neither attestations nor children has no wire
    /// representation; proofs built through submission never contain one.
    #[error("Proof contains a bare node with no attestations or operations")]
    BareNode,

    /// An `Unknown` op or attestation whose tag collides with a grammar
    /// marker or a known tag would decode as something else entirely, so it
    /// cannot be written. The parser never produces such a tree.
    #[error("Unknown entry uses reserved wire tag {0:#04x}")]
    ReservedTag(u8),
}

/// Op tags the grammar claims for itself: the two markers plus every tag
/// that already decodes to a known operation.
fn reserved_op_tag(tag: u8) -> bool {
    matches!(
        tag,
        ATTESTATION_MARKER
            | FORK
            | op::tag::SHA1
            | op::tag::RIPEMD160
            | op::tag::SHA256
            | op::tag::REVERSE
            | op::tag::KECCAK256
            | op::tag::APPEND
            | op::tag::PREPEND
    )
}

fn reserved_attestation_tag(tag: u8) -> bool {
    use chainstamp_types::attestation::tag;
    matches!(tag, tag::PENDING | tag::BITCOIN | tag::LITECOIN)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_u8(&mut self) -> Result<u8, ParseError> {
        let b = *self.buf.get(self.pos).ok_or(ParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        if self.remaining() < n {
            return Err(ParseError::UnexpectedEof);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_varint(&mut self) -> Result<u64, ParseError> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            if shift == 63 && byte > 1 {
                return Err(ParseError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(ParseError::VarintOverflow);
            }
        }
    }

    fn read_varbytes(&mut self, limit: usize) -> Result<&'a [u8], ParseError> {
        let len = self.read_varint()? as usize;
        if len > limit {
            return Err(ParseError::LengthLimit { len, limit });
        }
        self.read_bytes(len)
    }
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn write_u8(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn write_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
    }

    fn write_varbytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.write_bytes(bytes);
    }
}

/// Serialize a detached proof to its portable byte format.
pub fn serialize(proof: &DetachedProof) -> Result<Vec<u8>, SerializeError> {
    let mut w = Writer::new();
    w.write_bytes(MAGIC);
    w.write_u8(VERSION);
    w.write_u8(proof.digest_kind.tag());
    w.write_bytes(proof.file_digest());
    write_tree(&mut w, &proof.tree)?;
    Ok(w.buf)
}

/// Serialize a bare proof tree (a calendar fragment, no file header).
pub fn serialize_tree(tree: &ProofTree) -> Result<Vec<u8>, SerializeError> {
    let mut w = Writer::new();
    write_tree(&mut w, tree)?;
    Ok(w.buf)
}

enum WriteItem<'t> {
    Node(NodeId),
    Fork,
    Attestation(&'t Attestation),
    Edge(&'t Op, NodeId),
}

fn write_tree(w: &mut Writer, tree: &ProofTree) -> Result<(), SerializeError> {
    let mut stack = vec![WriteItem::Node(tree.root())];
    while let Some(item) = stack.pop() {
        match item {
            WriteItem::Node(id) => {
                let node = tree.node(id);
                if node.is_bare() {
                    return Err(SerializeError::BareNode);
                }
                let mut entries: Vec<WriteItem> = node
                    .attestations()
                    .map(WriteItem::Attestation)
                    .chain(node.edges().map(|(op, child)| WriteItem::Edge(op, child)))
                    .collect();
                // Every entry but the last gets a fork prefix; build the
                // interleaved sequence and push it reversed so it pops in
                // order.
                let last = entries.pop().expect("node has at least one entry");
                let mut sequence = Vec::with_capacity(entries.len() * 2 + 1);
                for entry in entries {
                    sequence.push(WriteItem::Fork);
                    sequence.push(entry);
                }
                sequence.push(last);
                stack.extend(sequence.into_iter().rev());
            }
            WriteItem::Fork => w.write_u8(FORK),
            WriteItem::Attestation(attestation) => {
                if let Attestation::Unknown { tag, .. } = attestation {
                    if reserved_attestation_tag(*tag) {
                        return Err(SerializeError::ReservedTag(*tag));
                    }
                }
                write_attestation(w, attestation);
            }
            WriteItem::Edge(op, child) => {
                if let Op::Unknown { tag, .. } = op {
                    if reserved_op_tag(*tag) {
                        return Err(SerializeError::ReservedTag(*tag));
                    }
                }
                w.write_u8(op.tag());
                if let Some(param) = op.param() {
                    w.write_varbytes(param);
                }
                stack.push(WriteItem::Node(child));
            }
        }
    }
    Ok(())
}

fn write_attestation(w: &mut Writer, attestation: &Attestation) {
    w.write_u8(ATTESTATION_MARKER);
    w.write_u8(attestation.tag());
    match attestation {
        Attestation::Pending { uri } => w.write_varbytes(uri.as_bytes()),
        Attestation::Bitcoin { height } | Attestation::Litecoin { height } => {
            let mut payload = Writer::new();
            payload.write_varint(*height);
            w.write_varbytes(&payload.buf);
        }
        Attestation::Unknown { payload, .. } => w.write_varbytes(payload),
    }
}

/// Parse a detached proof from its portable byte format.
///
/// Fatal on any structural problem; never returns a partial tree. Unknown
/// operation and attestation tags are preserved rather than rejected.
pub fn parse(bytes: &[u8]) -> Result<DetachedProof, ParseError> {
    let mut r = Reader::new(bytes);
    if r.read_bytes(MAGIC.len()).map(|m| m != MAGIC).unwrap_or(true) {
        return Err(ParseError::BadMagic);
    }
    let version = r.read_u8()?;
    if version != VERSION {
        return Err(ParseError::UnsupportedVersion(version));
    }
    let kind_tag = r.read_u8()?;
    let digest_kind =
        DigestKind::from_tag(kind_tag).ok_or(ParseError::UnknownDigestKind(kind_tag))?;
    let digest = r.read_bytes(digest_kind.digest_len())?.to_vec();

    let mut tree = ProofTree::new(digest);
    read_tree(&mut r, &mut tree)?;
    if r.remaining() > 0 {
        return Err(ParseError::TrailingBytes(r.remaining()));
    }
    Ok(DetachedProof { digest_kind, tree })
}

/// Parse a calendar fragment known to be rooted at `root_digest`.
pub fn parse_fragment(bytes: &[u8], root_digest: &[u8]) -> Result<ProofTree, ParseError> {
    let mut r = Reader::new(bytes);
    let mut tree = ProofTree::new(root_digest.to_vec());
    read_tree(&mut r, &mut tree)?;
    if r.remaining() > 0 {
        return Err(ParseError::TrailingBytes(r.remaining()));
    }
    Ok(tree)
}

fn read_tree(r: &mut Reader<'_>, tree: &mut ProofTree) -> Result<(), ParseError> {
    // Each stack entry is a node whose next entry is due in the input. A
    // fork prefix re-pushes the node so it resumes after the current entry
    // (and, for an edge, after the whole child subtree).
    let mut stack = vec![tree.root()];
    while let Some(node) = stack.pop() {
        let mut byte = r.read_u8()?;
        if byte == FORK {
            stack.push(node);
            byte = r.read_u8()?;
        }
        if byte == ATTESTATION_MARKER {
            let attestation = read_attestation(r)?;
            tree.add_attestation(node, attestation);
        } else {
            let op = read_op(r, byte)?;
            let child = tree.add_operation(node, op);
            if tree.node_count() > MAX_NODES {
                return Err(ParseError::TooManyNodes(MAX_NODES));
            }
            stack.push(child);
        }
    }
    Ok(())
}

fn read_op(r: &mut Reader<'_>, tag: u8) -> Result<Op, ParseError> {
    // The fork marker is grammar, never an operation; a second 0xff after a
    // fork prefix must not be read as an unknown op.
    if tag == FORK {
        return Err(ParseError::ReservedOpTag(tag));
    }
    Ok(match tag {
        op::tag::SHA256 => Op::Sha256,
        op::tag::SHA1 => Op::Sha1,
        op::tag::RIPEMD160 => Op::Ripemd160,
        op::tag::KECCAK256 => Op::Keccak256,
        op::tag::REVERSE => Op::Reverse,
        op::tag::APPEND => Op::Append(r.read_varbytes(MAX_PARAM_LEN)?.to_vec()),
        op::tag::PREPEND => Op::Prepend(r.read_varbytes(MAX_PARAM_LEN)?.to_vec()),
        _ => {
            let param = if op::tag::parameterized(tag) {
                r.read_varbytes(MAX_PARAM_LEN)?.to_vec()
            } else {
                Vec::new()
            };
            Op::Unknown { tag, param }
        }
    })
}

fn read_attestation(r: &mut Reader<'_>) -> Result<Attestation, ParseError> {
    use chainstamp_types::attestation::tag;

    let att_tag = r.read_u8()?;
    let payload = r.read_varbytes(MAX_PAYLOAD_LEN)?;
    Ok(match att_tag {
        tag::PENDING => Attestation::Pending {
            uri: parse_uri(payload)?,
        },
        tag::BITCOIN => Attestation::Bitcoin {
            height: parse_height(att_tag, payload)?,
        },
        tag::LITECOIN => Attestation::Litecoin {
            height: parse_height(att_tag, payload)?,
        },
        _ => Attestation::Unknown {
            tag: att_tag,
            payload: payload.to_vec(),
        },
    })
}

fn parse_height(att_tag: u8, payload: &[u8]) -> Result<u64, ParseError> {
    let mut r = Reader::new(payload);
    let height = r
        .read_varint()
        .map_err(|_| ParseError::InvalidAttestationPayload(att_tag))?;
    if r.remaining() > 0 {
        return Err(ParseError::InvalidAttestationPayload(att_tag));
    }
    Ok(height)
}

fn parse_uri(payload: &[u8]) -> Result<String, ParseError> {
    if payload.is_empty() || payload.len() > MAX_URI_LEN {
        return Err(ParseError::InvalidUri);
    }
    let ok = payload
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_' | b'/' | b':'));
    if !ok {
        return Err(ParseError::InvalidUri);
    }
    // Charset above is pure ASCII, so this cannot fail.
    String::from_utf8(payload.to_vec()).map_err(|_| ParseError::InvalidUri)
}

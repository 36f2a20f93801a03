//! Chunk merkle tree used for the transaction `data_root`.
//!
//! Data is cut into chunks of at most [`MAX_CHUNK_SIZE`]. When taking a full
//! chunk would leave a tail shorter than [`MIN_CHUNK_SIZE`], the remainder is
//! split in half (rounded up) instead. The trailing rest is always emitted as
//! the last chunk, even when empty.

use crate::encoding::{b64url_encode, sha256};

pub const MAX_CHUNK_SIZE: usize = 256 * 1024;
pub const MIN_CHUNK_SIZE: usize = 32 * 1024;

const NOTE_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data_hash: [u8; 32],
    pub min_byte_range: usize,
    pub max_byte_range: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.max_byte_range - self.min_byte_range
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct Node {
    id: [u8; 32],
    max_byte_range: usize,
}

/// Big-endian offset padded to 32 bytes.
fn note(value: usize) -> [u8; NOTE_SIZE] {
    let mut buf = [0u8; NOTE_SIZE];
    let bytes = (value as u64).to_be_bytes();
    buf[NOTE_SIZE - bytes.len()..].copy_from_slice(&bytes);
    buf
}

fn hash_all(parts: &[[u8; 32]]) -> [u8; 32] {
    sha256(parts.concat())
}

pub fn chunk_data(data: &[u8]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut rest = data;
    let mut cursor = 0;

    while rest.len() >= MAX_CHUNK_SIZE {
        let mut chunk_size = MAX_CHUNK_SIZE;
        let next_chunk_size = rest.len() - MAX_CHUNK_SIZE;
        if next_chunk_size > 0 && next_chunk_size < MIN_CHUNK_SIZE {
            chunk_size = rest.len().div_ceil(2);
        }

        let (chunk, tail) = rest.split_at(chunk_size);
        chunks.push(Chunk {
            data_hash: sha256(chunk),
            min_byte_range: cursor,
            max_byte_range: cursor + chunk.len(),
        });
        cursor += chunk.len();
        rest = tail;
    }

    chunks.push(Chunk {
        data_hash: sha256(rest),
        min_byte_range: cursor,
        max_byte_range: cursor + rest.len(),
    });
    chunks
}

fn leaf(chunk: &Chunk) -> Node {
    Node {
        id: hash_all(&[sha256(chunk.data_hash), sha256(note(chunk.max_byte_range))]),
        max_byte_range: chunk.max_byte_range,
    }
}

fn branch(left: Node, right: Option<Node>) -> Node {
    let Some(right) = right else {
        return left;
    };
    Node {
        id: hash_all(&[
            sha256(left.id),
            sha256(right.id),
            sha256(note(left.max_byte_range)),
        ]),
        max_byte_range: right.max_byte_range,
    }
}

/// Root id of the chunk tree, `None` for empty data.
pub fn compute_root(data: &[u8]) -> Option<[u8; 32]> {
    if data.is_empty() {
        return None;
    }
    let mut layer: Vec<Node> = chunk_data(data).iter().map(leaf).collect();
    while layer.len() > 1 {
        let mut nodes = layer.into_iter();
        let mut next = Vec::with_capacity(nodes.len().div_ceil(2));
        while let Some(left) = nodes.next() {
            next.push(branch(left, nodes.next()));
        }
        layer = next;
    }
    layer.pop().map(|root| root.id)
}

/// `data_root` as sent on the wire: base64url of the root id, or the empty
/// string for an empty payload.
pub fn data_root(data: &[u8]) -> String {
    compute_root(data).map(b64url_encode).unwrap_or_default()
}

//! SHA-384 deep hash over nested byte lists.
//!
//! A blob hashes as `H(H("blob" ++ len) ++ H(bytes))`. A list starts from
//! `H("list" ++ len)` and folds every element in order with
//! `acc = H(acc ++ deep_hash(element))`. Lengths are rendered as decimal
//! ASCII.

use sha2::{Digest, Sha384};

pub type DeepHash = [u8; 48];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepHashItem {
    Blob(Vec<u8>),
    List(Vec<DeepHashItem>),
}

impl DeepHashItem {
    pub fn blob(bytes: impl Into<Vec<u8>>) -> Self {
        DeepHashItem::Blob(bytes.into())
    }

    pub fn text(value: &str) -> Self {
        DeepHashItem::Blob(value.as_bytes().to_vec())
    }
}

fn sha384(parts: &[&[u8]]) -> DeepHash {
    let mut hasher = Sha384::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

pub fn deep_hash(item: &DeepHashItem) -> DeepHash {
    match item {
        DeepHashItem::Blob(bytes) => {
            let tag = sha384(&[b"blob", bytes.len().to_string().as_bytes()]);
            sha384(&[&tag, &sha384(&[bytes])])
        }
        DeepHashItem::List(items) => {
            let tag = sha384(&[b"list", items.len().to_string().as_bytes()]);
            items
                .iter()
                .fold(tag, |acc, element| sha384(&[&acc, &deep_hash(element)]))
        }
    }
}

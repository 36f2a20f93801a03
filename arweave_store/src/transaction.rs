use bytes::Bytes;
use ring::signature::{RsaPublicKeyComponents, RSA_PSS_2048_8192_SHA256};
use serde::Serialize;

use crate::{
    deep_hash::{deep_hash, DeepHash, DeepHashItem},
    encoding::{b64url_decode, b64url_encode, sha256},
    error::{StoreError, StoreResult},
    merkle,
    wallet::TransactionSigner,
    winston::Winston,
};

pub const TRANSACTION_FORMAT: u8 = 2;

/// RSA public exponent used by every storage network wallet.
const PUBLIC_EXPONENT: [u8; 3] = [0x01, 0x00, 0x01];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("transaction id does not match its signature")]
    IdMismatch,
    #[error("data root does not match the payload")]
    DataRootMismatch,
    #[error("data size does not match the payload")]
    DataSizeMismatch,
    #[error("signature is not valid for the owner key")]
    BadSignature,
}

pub struct TransactionBuilder {
    data: Bytes,
    owner: Vec<u8>,
    last_tx: Option<String>,
    reward: Winston,
    tags: Vec<Tag>,
}

impl TransactionBuilder {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            owner: Vec::new(),
            last_tx: None,
            reward: Winston::default(),
            tags: Vec::new(),
        }
    }

    pub fn owner(mut self, owner: &[u8]) -> Self {
        self.owner = owner.to_vec();
        self
    }

    /// Anchor returned by `GET /tx_anchor`, base64url encoded.
    pub fn last_tx(mut self, anchor: impl Into<String>) -> Self {
        self.last_tx = Some(anchor.into());
        self
    }

    pub fn reward(mut self, reward: Winston) -> Self {
        self.reward = reward;
        self
    }

    pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag::new(name, value));
        self
    }

    pub fn build(self) -> StoreResult<Transaction> {
        if self.owner.is_empty() {
            return Err(StoreError::invalid_wallet("transaction owner is not set"));
        }
        let last_tx = match self.last_tx {
            Some(anchor) => b64url_decode(anchor.trim(), "last_tx")?,
            None => Vec::new(),
        };
        let data_root = merkle::compute_root(&self.data);
        Ok(Transaction {
            owner: self.owner,
            target: Vec::new(),
            quantity: Winston(0),
            reward: self.reward,
            last_tx,
            tags: self.tags,
            data_size: self.data.len() as u64,
            data_root,
            data: self.data,
        })
    }
}

/// A format 2 transaction that has not been signed yet. It has no id.
#[derive(Debug, Clone)]
pub struct Transaction {
    owner: Vec<u8>,
    target: Vec<u8>,
    quantity: Winston,
    reward: Winston,
    last_tx: Vec<u8>,
    tags: Vec<Tag>,
    data: Bytes,
    data_size: u64,
    data_root: Option<[u8; 32]>,
}

impl Transaction {
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn reward(&self) -> Winston {
        self.reward
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn data_root(&self) -> String {
        self.data_root.map(b64url_encode).unwrap_or_default()
    }

    /// Deep hash of the format 2 signature fields.
    pub fn signature_data(&self) -> DeepHash {
        let tags = self
            .tags
            .iter()
            .map(|tag| {
                DeepHashItem::List(vec![
                    DeepHashItem::text(&tag.name),
                    DeepHashItem::text(&tag.value),
                ])
            })
            .collect();
        deep_hash(&DeepHashItem::List(vec![
            DeepHashItem::text(&TRANSACTION_FORMAT.to_string()),
            DeepHashItem::blob(self.owner.clone()),
            DeepHashItem::blob(self.target.clone()),
            DeepHashItem::text(&self.quantity.to_string()),
            DeepHashItem::text(&self.reward.to_string()),
            DeepHashItem::blob(self.last_tx.clone()),
            DeepHashItem::List(tags),
            DeepHashItem::text(&self.data_size.to_string()),
            DeepHashItem::blob(self.data_root.map(|r| r.to_vec()).unwrap_or_default()),
        ]))
    }

    pub fn sign(self, signer: &dyn TransactionSigner) -> StoreResult<SignedTransaction> {
        if signer.owner() != self.owner.as_slice() {
            return Err(StoreError::Signing {
                reason: "signer key does not match transaction owner".to_string(),
            });
        }
        let signature = signer.sign(&self.signature_data())?;
        let id = b64url_encode(sha256(&signature));
        Ok(SignedTransaction {
            tx: self,
            signature,
            id,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SignedTransaction {
    tx: Transaction,
    signature: Vec<u8>,
    id: String,
}

#[derive(Debug, Serialize)]
struct TagJson {
    name: String,
    value: String,
}

/// Wire shape of `POST /tx`. Binary fields are base64url, numbers are
/// decimal strings.
#[derive(Debug, Serialize)]
pub struct TransactionJson {
    format: u8,
    id: String,
    last_tx: String,
    owner: String,
    tags: Vec<TagJson>,
    target: String,
    quantity: String,
    data: String,
    data_size: String,
    data_root: String,
    reward: String,
    signature: String,
}

impl SignedTransaction {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Recomputes everything derived from the payload and checks the
    /// signature against the owner key.
    pub fn verify(&self) -> Result<(), VerifyError> {
        if self.id != b64url_encode(sha256(&self.signature)) {
            return Err(VerifyError::IdMismatch);
        }
        if self.tx.data_size != self.tx.data.len() as u64 {
            return Err(VerifyError::DataSizeMismatch);
        }
        if self.tx.data_root != merkle::compute_root(&self.tx.data) {
            return Err(VerifyError::DataRootMismatch);
        }
        let public_key = RsaPublicKeyComponents {
            n: self.tx.owner.as_slice(),
            e: &PUBLIC_EXPONENT[..],
        };
        public_key
            .verify(
                &RSA_PSS_2048_8192_SHA256,
                &self.tx.signature_data(),
                &self.signature,
            )
            .map_err(|_| VerifyError::BadSignature)
    }

    pub fn to_json(&self) -> TransactionJson {
        let tx = &self.tx;
        TransactionJson {
            format: TRANSACTION_FORMAT,
            id: self.id.clone(),
            last_tx: b64url_encode(&tx.last_tx),
            owner: b64url_encode(&tx.owner),
            tags: tx
                .tags
                .iter()
                .map(|tag| TagJson {
                    name: b64url_encode(&tag.name),
                    value: b64url_encode(&tag.value),
                })
                .collect(),
            target: b64url_encode(&tx.target),
            quantity: tx.quantity.to_string(),
            data: b64url_encode(&tx.data),
            data_size: tx.data_size.to_string(),
            data_root: tx.data_root(),
            reward: tx.reward.to_string(),
            signature: b64url_encode(&self.signature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{testing::*, TransactionSigner};

    const ANCHOR: &str = "x4U2m3_x3NYz3XOdhSjGKMqV2w8hZNQeqqyPbzJ0Mck4Q9tJkXfFCJ2t8z_xdPiG";

    fn build(signer: &dyn TransactionSigner, data: &'static [u8]) -> Transaction {
        TransactionBuilder::new(Bytes::from_static(data))
            .owner(signer.owner())
            .last_tx(ANCHOR)
            .reward(Winston(1_234_567))
            .tag("Content-Type", "text/plain")
            .tag("File-Name", "note.txt")
            .build()
            .unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let wallet = test_wallet();
        let signed = build(&wallet, b"hello permaweb").sign(&wallet).unwrap();
        assert_eq!(signed.id(), b64url_encode(sha256(signed.signature())));
        assert_eq!(signed.id().len(), 43);
        signed.verify().unwrap();
    }

    #[test]
    fn test_signature_data_is_deterministic() {
        let wallet = test_wallet();
        let a = build(&wallet, b"same bytes");
        let b = build(&wallet, b"same bytes");
        assert_eq!(a.signature_data(), b.signature_data());

        let c = TransactionBuilder::new(Bytes::from_static(b"same bytes"))
            .owner(wallet.owner())
            .last_tx(ANCHOR)
            .reward(Winston(1_234_567))
            .tag("Content-Type", "text/html")
            .tag("File-Name", "note.txt")
            .build()
            .unwrap();
        assert_ne!(a.signature_data(), c.signature_data());
    }

    #[test]
    fn test_corrupted_signature_fails_verification() {
        let signer = CorruptSigner(test_wallet());
        let signed = build(&signer, b"payload").sign(&signer).unwrap();
        assert_eq!(signed.verify(), Err(VerifyError::BadSignature));
    }

    #[test]
    fn test_tampered_payload_fails_verification() {
        let wallet = test_wallet();
        let mut signed = build(&wallet, b"original").sign(&wallet).unwrap();
        signed.tx.data = Bytes::from_static(b"replaced");
        assert_eq!(signed.verify(), Err(VerifyError::DataRootMismatch));

        let mut signed = build(&wallet, b"original").sign(&wallet).unwrap();
        signed.id = "forged".to_string();
        assert_eq!(signed.verify(), Err(VerifyError::IdMismatch));
    }

    #[test]
    fn test_owner_mismatch_is_rejected() {
        let wallet = test_wallet();
        let tx = TransactionBuilder::new(Bytes::from_static(b"x"))
            .owner(&[1, 2, 3])
            .build()
            .unwrap();
        assert!(matches!(tx.sign(&wallet), Err(StoreError::Signing { .. })));
    }

    #[test]
    fn test_builder_requires_owner_and_valid_anchor() {
        assert!(TransactionBuilder::new(Bytes::new()).build().is_err());
        let wallet = test_wallet();
        let err = TransactionBuilder::new(Bytes::new())
            .owner(wallet.owner())
            .last_tx("not base64 !!")
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidEncoding { field: "last_tx" }));
    }

    #[test]
    fn test_json_body() {
        let wallet = test_wallet();
        let signed = build(&wallet, b"hello").sign(&wallet).unwrap();
        let body = serde_json::to_value(signed.to_json()).unwrap();
        assert_eq!(body["format"], 2);
        assert_eq!(body["id"], signed.id());
        assert_eq!(body["last_tx"], ANCHOR);
        assert_eq!(body["target"], "");
        assert_eq!(body["quantity"], "0");
        assert_eq!(body["reward"], "1234567");
        assert_eq!(body["data_size"], "5");
        assert_eq!(body["data"], b64url_encode(b"hello"));
        assert_eq!(body["data_root"], merkle::data_root(b"hello"));
        assert_eq!(body["tags"][0]["name"], b64url_encode("Content-Type"));
        assert_eq!(body["tags"][1]["value"], b64url_encode("note.txt"));
        assert_eq!(body["owner"].as_str().unwrap().len(), 342);
    }

    #[test]
    fn test_empty_payload() {
        let wallet = test_wallet();
        let signed = build(&wallet, b"").sign(&wallet).unwrap();
        assert_eq!(signed.transaction().data_root(), "");
        assert_eq!(signed.transaction().data_size(), 0);
        signed.verify().unwrap();
    }
}

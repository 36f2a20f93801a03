use std::fmt;

use ring::{
    rand::SystemRandom,
    rsa::{KeyPairComponents, PublicKeyComponents},
    signature::{RsaKeyPair, RSA_PSS_SHA256},
};
use serde::Deserialize;

use crate::{
    encoding::{b64url_decode, b64url_encode, sha256},
    error::{StoreError, StoreResult},
};

/// Anything that can produce RSA-PSS signatures for the storage network on
/// behalf of one account.
pub trait TransactionSigner: Send + Sync {
    /// Raw RSA modulus, sent as the transaction `owner`.
    fn owner(&self) -> &[u8];

    fn sign(&self, message: &[u8]) -> StoreResult<Vec<u8>>;

    fn address(&self) -> String {
        owner_to_address(self.owner())
    }
}

/// The account address is the base64url SHA-256 of the public modulus.
pub fn owner_to_address(owner: &[u8]) -> String {
    b64url_encode(sha256(owner))
}

#[derive(Deserialize)]
struct Jwk {
    kty: String,
    n: String,
    e: String,
    d: Option<String>,
    p: Option<String>,
    q: Option<String>,
    dp: Option<String>,
    dq: Option<String>,
    qi: Option<String>,
}

fn private_part(value: Option<String>, field: &'static str) -> StoreResult<Vec<u8>> {
    let value = value
        .ok_or_else(|| StoreError::invalid_wallet(format!("missing private component {}", field)))?;
    b64url_decode(&value, field)
}

/// RSA wallet loaded from a JSON Web Key.
pub struct JwkWallet {
    key_pair: RsaKeyPair,
    owner: Vec<u8>,
    rng: SystemRandom,
}

impl JwkWallet {
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let jwk: Jwk = serde_json::from_str(json)
            .map_err(|e| StoreError::invalid_wallet(format!("not a JWK document: {}", e)))?;
        if jwk.kty != "RSA" {
            return Err(StoreError::invalid_wallet(format!(
                "unsupported key type {}",
                jwk.kty
            )));
        }

        let n = b64url_decode(&jwk.n, "n")?;
        let e = b64url_decode(&jwk.e, "e")?;
        let components = KeyPairComponents {
            public_key: PublicKeyComponents {
                n: n.clone(),
                e,
            },
            d: private_part(jwk.d, "d")?,
            p: private_part(jwk.p, "p")?,
            q: private_part(jwk.q, "q")?,
            dP: private_part(jwk.dp, "dp")?,
            dQ: private_part(jwk.dq, "dq")?,
            qInv: private_part(jwk.qi, "qi")?,
        };
        let key_pair = RsaKeyPair::from_components(&components)
            .map_err(|e| StoreError::invalid_wallet(e.to_string()))?;

        Ok(Self {
            key_pair,
            owner: n,
            rng: SystemRandom::new(),
        })
    }
}

impl TransactionSigner for JwkWallet {
    fn owner(&self) -> &[u8] {
        &self.owner
    }

    fn sign(&self, message: &[u8]) -> StoreResult<Vec<u8>> {
        let mut signature = vec![0u8; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(&RSA_PSS_SHA256, &self.rng, message, &mut signature)
            .map_err(|_| StoreError::Signing {
                reason: "RSA-PSS signing failed".to_string(),
            })?;
        Ok(signature)
    }
}

impl fmt::Debug for JwkWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwkWallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    pub const TEST_WALLET_JWK: &str = include_str!("../testdata/wallet.json");
    pub const TEST_WALLET_ADDRESS: &str = "qYC9GDrYc5__Q5itBkqhOtAftcHt3SyngYxEkjj8utU";

    pub fn test_wallet() -> JwkWallet {
        JwkWallet::from_json(TEST_WALLET_JWK).unwrap()
    }

    /// Signs with the real key, then flips one bit of the signature.
    pub struct CorruptSigner(pub JwkWallet);

    impl TransactionSigner for CorruptSigner {
        fn owner(&self) -> &[u8] {
            self.0.owner()
        }

        fn sign(&self, message: &[u8]) -> StoreResult<Vec<u8>> {
            let mut signature = self.0.sign(message)?;
            signature[0] ^= 0x01;
            Ok(signature)
        }
    }
}

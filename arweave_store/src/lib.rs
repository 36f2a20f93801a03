//! Client side of the Arweave storage network: JWK wallets, format 2
//! transactions and the gateway HTTP API.

pub mod client;
pub mod deep_hash;
mod encoding;
pub mod error;
pub mod merkle;
pub mod network;
pub mod transaction;
pub mod wallet;
pub mod winston;

pub use client::{ArweaveClient, PostResponse, StorageNetwork};
pub use encoding::{b64url_decode, b64url_encode};
pub use error::{StoreError, StoreResult};
pub use network::{ArweaveNetwork, GatewayConfig};
pub use transaction::{SignedTransaction, Tag, Transaction, TransactionBuilder, VerifyError};
pub use wallet::{owner_to_address, JwkWallet, TransactionSigner};
pub use winston::Winston;

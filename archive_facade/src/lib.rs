pub mod backend;
pub mod bindings;
pub mod cache;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod in_memory;
pub mod reader;
pub mod view;
pub mod writer;

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
pub use backend::{ArchiveBackend, Confirmed, EthersBackend};
use cache::QueryCache;
pub use error::{ChainError, ChainResult};
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Provider},
    signers::{LocalWallet, Signer},
    types::Address,
};
use memoria_utils::retry::RetryPolicy;
pub use reader::ArchiveReader;
use serde::{Deserialize, Serialize};
pub use view::{ArchiveListing, ArchiveView, ArtifactListing, ArtifactSlot, ViewSession, ViewToken};
pub use writer::{ArchiveWriter, WriteOutcome};

/// Donor page loaded by archive views and read back after donations.
pub const DONOR_PAGE_SIZE: u64 = 10;

fn default_stale_after_secs() -> u64 {
    300
}

fn default_cache_max_entries() -> usize {
    cache::DEFAULT_MAX_ENTRIES
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacadeConfig {
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Cached reads older than this are fetched again.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            stale_after_secs: default_stale_after_secs(),
            cache_max_entries: default_cache_max_entries(),
        }
    }
}

/// Entry point for everything archive related: cached reads, composed views
/// and confirmed writes, all sharing one query cache.
pub struct ArchiveFacade {
    reader: ArchiveReader,
    writer: ArchiveWriter,
}

impl ArchiveFacade {
    pub fn new(backend: Arc<dyn ArchiveBackend>, config: &FacadeConfig) -> Self {
        let cache = Arc::new(
            QueryCache::new(Duration::from_secs(config.stale_after_secs))
                .with_max_entries(config.cache_max_entries),
        );
        let reader = ArchiveReader::new(backend.clone(), cache, config.retry);
        let writer = ArchiveWriter::new(backend, reader.clone());
        Self { reader, writer }
    }

    /// Read-only facade over a JSON-RPC endpoint.
    pub fn connect_http(rpc_url: &str, factory: Address, config: &FacadeConfig) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| anyhow!("invalid rpc url {}: {}", rpc_url, e))?;
        let backend = EthersBackend::new(Arc::new(provider), factory);
        Ok(Self::new(Arc::new(backend), config))
    }

    /// Facade that can also write, signing with `private_key` (hex).
    /// Returns the facade and the sending account.
    pub fn connect_signed(
        rpc_url: &str,
        chain_id: u64,
        private_key: &str,
        factory: Address,
        config: &FacadeConfig,
    ) -> Result<(Self, Address)> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| anyhow!("invalid rpc url {}: {}", rpc_url, e))?;
        let wallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| anyhow!("invalid private key: {}", e))?
            .with_chain_id(chain_id);
        let sender = wallet.address();
        let client = SignerMiddleware::new(provider, wallet);
        let backend = EthersBackend::new(Arc::new(client), factory);
        Ok((Self::new(Arc::new(backend), config), sender))
    }

    pub fn reader(&self) -> &ArchiveReader {
        &self.reader
    }

    pub fn writer(&self) -> &ArchiveWriter {
        &self.writer
    }

    pub fn factory_address(&self) -> Address {
        self.reader.factory_address()
    }
}

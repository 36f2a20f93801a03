use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::StoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArweaveNetwork {
    #[default]
    Mainnet,
    Testnet,
    Devnet,
    Local,
}

impl ArweaveNetwork {
    pub fn host(&self) -> &'static str {
        match self {
            ArweaveNetwork::Mainnet => "arweave.net",
            ArweaveNetwork::Testnet => "testnet.arweave.net",
            ArweaveNetwork::Devnet => "testnet.redstone.tools",
            ArweaveNetwork::Local => "localhost",
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            ArweaveNetwork::Local => 1984,
            _ => 443,
        }
    }

    pub fn protocol(&self) -> &'static str {
        match self {
            ArweaveNetwork::Local => "http",
            _ => "https",
        }
    }

    pub fn base_url(&self) -> StoreResult<Url> {
        Ok(Url::parse(&format!(
            "{}://{}:{}/",
            self.protocol(),
            self.host(),
            self.port()
        ))?)
    }
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub network: ArweaveNetwork,
    /// Overrides the preset host of `network` when set.
    #[serde(default)]
    pub gateway_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            network: ArweaveNetwork::default(),
            gateway_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn base_url(&self) -> StoreResult<Url> {
        match &self.gateway_url {
            Some(url) => {
                let mut url = Url::parse(url)?;
                if !url.path().ends_with('/') {
                    let path = format!("{}/", url.path());
                    url.set_path(&path);
                }
                Ok(url)
            }
            None => self.network.base_url(),
        }
    }
}

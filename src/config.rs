use std::{net::SocketAddr, path::Path, time::Duration};

use anyhow::{anyhow, Result};
use archive_facade::FacadeConfig;
use arweave_store::GatewayConfig;
use ethers::types::Address;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const LOCAL_ENV: &str = "local";

/// Environment variables with this prefix override the YAML file,
/// `__` separating nested keys (`MEMORIA_CHAIN__RPC_URL`).
const ENV_PREFIX: &str = "MEMORIA_";

/// Sepolia archive factory the web client was deployed against.
pub const DEFAULT_FACTORY_ADDRESS: &str = "0x371cb38b81ae204a7950ff31b3caa1a5b563b1de";
pub const DEFAULT_CHAIN_ID: u64 = 11155111;

fn default_env() -> String {
    LOCAL_ENV.to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8900".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Request body limit for `POST /api/media-upload`.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub arweave: ArweaveConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            env: default_env(),
            listen_addr: default_listen_addr(),
            max_upload_bytes: default_max_upload_bytes(),
            arweave: Default::default(),
            chain: Default::default(),
            telemetry: Default::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<ServerConfig> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&config_str)
    }

    pub fn from_yaml_str(config_str: &str) -> Result<ServerConfig> {
        let mut config: ServerConfig = Figment::new()
            .merge(Yaml::string(config_str))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        // Resolved once so logs and metrics agree on the id.
        config.telemetry.instance_id = Some(config.instance_id());
        Ok(config)
    }

    /// Defaults plus environment overrides, used when no file is given.
    pub fn from_env() -> Result<ServerConfig> {
        Self::from_yaml_str("{}")
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(anyhow!("invalid listen address: {}", self.listen_addr));
        }
        self.arweave
            .gateway
            .base_url()
            .map_err(|e| anyhow!("invalid arweave gateway: {}", e))?;
        self.chain.factory()?;
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be positive"));
        }
        Ok(())
    }

    pub fn structured_logging(&self) -> bool {
        self.env != LOCAL_ENV
    }

    pub fn instance_id(&self) -> String {
        self.telemetry
            .instance_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.env, Uuid::new_v4()))
    }
}

fn default_app_name() -> String {
    "ArweaveUploader".to_string()
}

fn default_app_version() -> String {
    "1.0.0".to_string()
}

fn default_wallet_env_var() -> String {
    "ARWEAVE_WALLET_KEY".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArweaveConfig {
    #[serde(flatten)]
    pub gateway: GatewayConfig,
    /// Sent as the `App-Name` tag on every upload.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_version")]
    pub app_version: String,
    /// Environment variable holding the JWK used to sign uploads. It is read
    /// once at start-up.
    #[serde(default = "default_wallet_env_var")]
    pub wallet_env_var: String,
}

impl Default for ArweaveConfig {
    fn default() -> Self {
        Self {
            gateway: Default::default(),
            app_name: default_app_name(),
            app_version: default_app_version(),
            wallet_env_var: default_wallet_env_var(),
        }
    }
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_string()
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

fn default_factory_address() -> String {
    DEFAULT_FACTORY_ADDRESS.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_factory_address")]
    pub factory_address: String,
    #[serde(default)]
    pub facade: FacadeConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            factory_address: default_factory_address(),
            facade: Default::default(),
        }
    }
}

impl ChainConfig {
    pub fn factory(&self) -> Result<Address> {
        self.factory_address
            .parse()
            .map_err(|e| anyhow!("invalid factory address {}: {}", self.factory_address, e))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TelemetryConfig {
    // Enable metrics.
    #[serde(default)]
    pub enable_metrics: bool,
    // Export traces over OTLP.
    #[serde(default)]
    pub enable_tracing: bool,
    // OpenTelemetry collector grpc endpoint for both traces and metrics.
    // Defaults to OTEL_EXPORTER_OTLP_ENDPOINT or localhost:4317 when empty.
    #[serde(default)]
    pub endpoint: Option<String>,
    // Metrics export interval in seconds.
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
    // Used as the metric attribute "memoria.instance.id".
    #[serde(default)]
    pub instance_id: Option<String>,
}

fn default_metrics_interval_secs() -> u64 {
    10
}

impl TelemetryConfig {
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            enable_tracing: false,
            endpoint: None,
            metrics_interval_secs: default_metrics_interval_secs(),
            instance_id: None,
        }
    }
}

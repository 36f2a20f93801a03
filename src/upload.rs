//! Upload gateway: one file in, one signed and verified storage
//! transaction out.
//!
//! Every upload walks the same fixed sequence and stops at the first
//! failure:
//! file -> credential -> balance -> anchor -> price -> build -> sign -> verify ->
//! submit. Nothing is retried here; a failed upload is reported to the
//! caller, who can upload again.

use std::{fmt, sync::Arc};

use arweave_store::{
    JwkWallet,
    StorageNetwork,
    StoreError,
    TransactionBuilder,
    TransactionSigner,
    VerifyError,
};
use axum::http::StatusCode;
use data_model::{UploadReceipt, UploadRequest};
use opentelemetry::KeyValue;
use tracing::{error, info, warn};

use crate::{
    config::ArweaveConfig,
    metrics::{upload_stats, Timer},
};

pub const UPLOAD_SUCCESS_MESSAGE: &str = "File uploaded to Arweave successfully!";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),

    /// The request body could not be read as a form.
    #[error("{0}")]
    Request(String),

    #[error("{0}")]
    Configuration(String),

    #[error("Insufficient wallet balance. You need AR tokens to upload files.")]
    InsufficientFunds,

    #[error("Transaction verification failed")]
    Verification(#[source] VerifyError),

    #[error("Transaction failed with status: {status}. {body}")]
    Submission { status: u16, body: String },

    #[error("Storage network request failed: {0}")]
    Network(#[source] StoreError),
}

impl UploadError {
    pub fn no_file() -> Self {
        UploadError::Validation("No file uploaded".to_string())
    }

    /// Label used for the failure counter.
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::Validation(_) => "validation",
            UploadError::Request(_) => "request",
            UploadError::Configuration(_) => "configuration",
            UploadError::InsufficientFunds => "insufficient_funds",
            UploadError::Verification(_) => "verification",
            UploadError::Submission { .. } => "submission",
            UploadError::Network(_) => "network",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            UploadError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for UploadError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidWallet { .. } | StoreError::Signing { .. } => {
                UploadError::Configuration(err.to_string())
            }
            err => UploadError::Network(err),
        }
    }
}

/// Signing key of the gateway, read once at start-up. A missing or broken
/// key does not stop the server; uploads fail with a configuration error
/// until it is fixed.
#[derive(Clone)]
pub enum GatewayCredential {
    Missing { env_var: String },
    Invalid { env_var: String, reason: String },
    Ready(Arc<dyn TransactionSigner>),
}

impl GatewayCredential {
    pub fn from_env(env_var: &str) -> Self {
        match std::env::var(env_var) {
            Ok(value) => Self::from_jwk(env_var, &value),
            Err(_) => GatewayCredential::Missing {
                env_var: env_var.to_string(),
            },
        }
    }

    pub fn from_jwk(env_var: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            return GatewayCredential::Missing {
                env_var: env_var.to_string(),
            };
        }
        match JwkWallet::from_json(value) {
            Ok(wallet) => GatewayCredential::Ready(Arc::new(wallet)),
            Err(err) => GatewayCredential::Invalid {
                env_var: env_var.to_string(),
                reason: err.to_string(),
            },
        }
    }

    pub fn signer(&self) -> Result<&dyn TransactionSigner, UploadError> {
        match self {
            GatewayCredential::Ready(signer) => Ok(signer.as_ref()),
            GatewayCredential::Missing { env_var } => Err(UploadError::Configuration(format!(
                "Arweave wallet not configured. Please set {} environment variable.",
                env_var
            ))),
            GatewayCredential::Invalid { env_var, reason } => {
                Err(UploadError::Configuration(format!(
                    "Arweave wallet not configured. {} does not hold a usable key: {}",
                    env_var, reason
                )))
            }
        }
    }
}

impl fmt::Debug for GatewayCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayCredential::Missing { env_var } => {
                f.debug_struct("Missing").field("env_var", env_var).finish()
            }
            GatewayCredential::Invalid { env_var, reason } => f
                .debug_struct("Invalid")
                .field("env_var", env_var)
                .field("reason", reason)
                .finish(),
            GatewayCredential::Ready(signer) => f
                .debug_struct("Ready")
                .field("address", &signer.address())
                .finish(),
        }
    }
}

pub struct MediaUploader {
    network: Arc<dyn StorageNetwork>,
    credential: GatewayCredential,
    app_name: String,
    app_version: String,
    metrics: Arc<upload_stats::Metrics>,
}

impl MediaUploader {
    pub fn new(
        network: Arc<dyn StorageNetwork>,
        credential: GatewayCredential,
        config: &ArweaveConfig,
        metrics: Arc<upload_stats::Metrics>,
    ) -> Self {
        Self {
            network,
            credential,
            app_name: config.app_name.clone(),
            app_version: config.app_version.clone(),
            metrics,
        }
    }

    /// `file` is `None` when the request carried no file part.
    pub async fn upload(&self, file: Option<UploadRequest>) -> Result<UploadReceipt, UploadError> {
        let result = self.try_upload(file).await;
        match &result {
            Ok(receipt) => {
                self.metrics.uploads.add(1, &[]);
                self.metrics.upload_bytes.add(receipt.data_size, &[]);
            }
            Err(err) => {
                self.metrics
                    .upload_failures
                    .add(1, &[KeyValue::new("kind", err.kind())]);
                match err {
                    UploadError::Validation(_) | UploadError::InsufficientFunds => {
                        warn!(kind = err.kind(), "upload refused: {}", err)
                    }
                    _ => error!(kind = err.kind(), "upload failed: {:?}", err),
                }
            }
        }
        result
    }

    async fn try_upload(&self, file: Option<UploadRequest>) -> Result<UploadReceipt, UploadError> {
        let request = file.ok_or_else(UploadError::no_file)?;
        let signer = self.credential.signer()?;
        let address = signer.address();

        let balance = {
            let labels = [KeyValue::new("op", "balance")];
            let _timer = Timer::start_with_labels(&self.metrics.gateway_latency, &labels);
            self.network.balance(&address).await?
        };
        info!(wallet = %address, balance = %balance.to_ar_string(), "wallet balance");
        if balance.is_zero() {
            return Err(UploadError::InsufficientFunds);
        }

        let data_size = request.size();
        let anchor = {
            let labels = [KeyValue::new("op", "tx_anchor")];
            let _timer = Timer::start_with_labels(&self.metrics.gateway_latency, &labels);
            self.network.tx_anchor().await?
        };
        let reward = {
            let labels = [KeyValue::new("op", "price")];
            let _timer = Timer::start_with_labels(&self.metrics.gateway_latency, &labels);
            self.network.price(data_size).await?
        };

        let transaction = TransactionBuilder::new(request.data)
            .owner(signer.owner())
            .last_tx(anchor)
            .reward(reward)
            .tag("Content-Type", request.content_type.as_str())
            .tag("File-Name", request.file_name.as_str())
            .tag("App-Name", self.app_name.as_str())
            .tag("App-Version", self.app_version.as_str())
            .build()?;
        info!(
            data_size,
            cost = %format!("{} AR", reward.to_ar_string()),
            "transaction created"
        );

        let signed = transaction.sign(signer)?;
        signed.verify().map_err(UploadError::Verification)?;

        let response = {
            let labels = [KeyValue::new("op", "post_tx")];
            let _timer = Timer::start_with_labels(&self.metrics.gateway_latency, &labels);
            self.network.post_transaction(&signed).await?
        };
        if !response.is_accepted() {
            return Err(UploadError::Submission {
                status: response.status,
                body: response.body,
            });
        }
        info!(transaction_id = %signed.id(), status = response.status, "transaction submitted");

        Ok(UploadReceipt::new(
            signed.id().to_string(),
            self.network.permanent_url(signed.id()),
            format!("{} AR", reward.to_ar_string()),
            reward.to_string(),
            data_size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use arweave_store::{
        client::testing::FakeStorageNetwork,
        wallet::testing::{test_wallet, CorruptSigner, TEST_WALLET_ADDRESS, TEST_WALLET_JWK},
        Winston,
    };
    use bytes::Bytes;

    use super::*;

    fn uploader(network: Arc<FakeStorageNetwork>, credential: GatewayCredential) -> MediaUploader {
        MediaUploader::new(
            network,
            credential,
            &ArweaveConfig::default(),
            Arc::new(upload_stats::Metrics::new()),
        )
    }

    fn ready() -> GatewayCredential {
        GatewayCredential::from_jwk("ARWEAVE_WALLET_KEY", TEST_WALLET_JWK)
    }

    fn request() -> UploadRequest {
        UploadRequest::new(
            Bytes::from_static(b"a photograph of the harbor"),
            Some("image/png".to_string()),
            Some("harbor.png".to_string()),
        )
    }

    #[test]
    fn test_credential_states() {
        assert!(matches!(
            GatewayCredential::from_jwk("KEY", "  "),
            GatewayCredential::Missing { .. }
        ));
        assert!(matches!(
            GatewayCredential::from_jwk("KEY", "{\"kty\":\"RSA\"}"),
            GatewayCredential::Invalid { .. }
        ));
        let credential = ready();
        assert_eq!(credential.signer().unwrap().address(), TEST_WALLET_ADDRESS);
        assert!(format!("{:?}", credential).contains(TEST_WALLET_ADDRESS));
    }

    #[tokio::test]
    async fn test_upload_success() {
        let network = Arc::new(FakeStorageNetwork::default());
        let receipt = uploader(network.clone(), ready())
            .upload(Some(request()))
            .await
            .unwrap();

        assert!(!receipt.transaction_id.is_empty());
        assert!(receipt.url.contains(&receipt.transaction_id));
        assert_eq!(receipt.cost, "0.000000000123 AR");
        assert_eq!(receipt.reward_winston, "123");
        assert_eq!(receipt.data_size, 26);
        assert_eq!(network.post_count(), 1);

        let posted = network.last_posted().unwrap();
        assert_eq!(posted["id"], receipt.transaction_id.as_str());
        assert_eq!(posted["reward"], "123");
        assert_eq!(posted["data_size"], "26");
        assert_eq!(posted["tags"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_same_payload_and_anchor_yield_valid_distinct_signatures() {
        let network = Arc::new(FakeStorageNetwork::default());
        let uploader = uploader(network.clone(), ready());
        let first = uploader.upload(Some(request())).await.unwrap();
        let second = uploader.upload(Some(request())).await.unwrap();
        // PSS signatures are salted, so ids differ while both verify.
        assert_ne!(first.transaction_id, second.transaction_id);
        assert_eq!(network.post_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_validation_error() {
        let network = Arc::new(FakeStorageNetwork::default());
        let credential = GatewayCredential::from_jwk("ARWEAVE_WALLET_KEY", "");
        let err = uploader(network.clone(), credential)
            .upload(None)
            .await
            .unwrap_err();

        // The missing file is reported before the missing credential.
        assert!(matches!(err, UploadError::Validation(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "No file uploaded");
        assert_eq!(network.post_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_credential_is_configuration_error() {
        let network = Arc::new(FakeStorageNetwork::default());
        let credential = GatewayCredential::from_jwk("ARWEAVE_WALLET_KEY", "");
        let err = uploader(network.clone(), credential)
            .upload(Some(request()))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Configuration(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "Arweave wallet not configured. Please set ARWEAVE_WALLET_KEY environment variable."
        );
        assert_eq!(network.post_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_balance_is_never_submitted() {
        let network = Arc::new(FakeStorageNetwork::default().with_balance(Winston(0)));
        let err = uploader(network.clone(), ready())
            .upload(Some(request()))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::InsufficientFunds));
        assert!(err.to_string().contains("Insufficient wallet balance"));
        assert_eq!(network.post_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_verification_is_never_submitted() {
        let network = Arc::new(FakeStorageNetwork::default());
        let credential = GatewayCredential::Ready(Arc::new(CorruptSigner(test_wallet())));
        let err = uploader(network.clone(), credential)
            .upload(Some(request()))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Verification(_)));
        assert_eq!(err.to_string(), "Transaction verification failed");
        assert_eq!(network.post_count(), 0);
    }

    #[tokio::test]
    async fn test_submission_statuses() {
        let network = Arc::new(FakeStorageNetwork::default().with_post_status(208));
        assert!(uploader(network, ready()).upload(Some(request())).await.is_ok());

        let network = Arc::new(FakeStorageNetwork::default().with_post_status(400));
        let err = uploader(network.clone(), ready())
            .upload(Some(request()))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Submission { status: 400, .. }));
        assert_eq!(err.to_string(), "Transaction failed with status: 400. OK");
        assert_eq!(network.post_count(), 1);
    }

    #[tokio::test]
    async fn test_price_failure_is_network_error() {
        let network = Arc::new(FakeStorageNetwork::default().with_failing_price());
        let err = uploader(network.clone(), ready())
            .upload(Some(request()))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Network(_)));
        assert_eq!(err.kind(), "network");
        assert_eq!(network.post_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_file_is_uploaded_with_empty_root() {
        let network = Arc::new(FakeStorageNetwork::default());
        let receipt = uploader(network.clone(), ready())
            .upload(Some(UploadRequest::new(Bytes::new(), None, None)))
            .await
            .unwrap();
        assert_eq!(receipt.data_size, 0);
        let posted = network.last_posted().unwrap();
        assert_eq!(posted["data_root"], "");
    }
}

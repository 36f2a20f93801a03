use std::sync::Arc;

use archive_facade::{in_memory::InMemoryArchives, ArchiveFacade, FacadeConfig};
use arweave_store::{client::testing::FakeStorageNetwork, wallet::testing::TEST_WALLET_JWK};
use axum::Router;
use memoria_utils::retry::RetryPolicy;
use tracing::subscriber;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::{
    config::ArweaveConfig,
    metrics::upload_stats,
    middleware::InstanceRequestSpan,
    routes::{create_routes, RouteState},
    upload::{GatewayCredential, MediaUploader},
};

const TEST_MAX_UPLOAD_BYTES: usize = 1024 * 1024;

/// Route state wired to an in-memory storage network and contract
/// simulation.
pub struct TestGateway {
    pub network: Arc<FakeStorageNetwork>,
    pub archives: Arc<InMemoryArchives>,
    pub state: RouteState,
}

impl TestGateway {
    pub fn new(network: FakeStorageNetwork, credential: GatewayCredential) -> Self {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        let _ = subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(env_filter)),
        );

        let network = Arc::new(network);
        let archives = Arc::new(InMemoryArchives::default());
        let facade_config = FacadeConfig {
            retry: RetryPolicy {
                max_retries: 2,
                initial_delay_ms: 1,
                max_delay_ms: 5,
            },
            ..Default::default()
        };
        let uploader = MediaUploader::new(
            network.clone(),
            credential,
            &ArweaveConfig::default(),
            Arc::new(upload_stats::Metrics::new()),
        );
        let state = RouteState {
            uploader: Arc::new(uploader),
            facade: Arc::new(ArchiveFacade::new(archives.clone(), &facade_config)),
        };
        Self {
            network,
            archives,
            state,
        }
    }

    pub fn with_wallet() -> Self {
        Self::new(FakeStorageNetwork::default(), Self::wallet_credential())
    }

    pub fn wallet_credential() -> GatewayCredential {
        GatewayCredential::from_jwk("ARWEAVE_WALLET_KEY", TEST_WALLET_JWK)
    }

    pub fn router(&self) -> Router {
        create_routes(
            self.state.clone(),
            TEST_MAX_UPLOAD_BYTES,
            InstanceRequestSpan::new("test", "test-0"),
        )
    }
}

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use archive_facade::ArchiveFacade;
use arweave_store::ArweaveClient;
use axum_server::Handle;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use tokio::signal;
use tracing::{error, info, warn};

use crate::{
    config::ServerConfig,
    metrics::{self, upload_stats},
    middleware::InstanceRequestSpan,
    routes::{create_routes, RouteState},
    upload::{GatewayCredential, MediaUploader},
};

pub struct Service {
    pub config: ServerConfig,
    pub route_state: RouteState,
    meter_provider: Option<SdkMeterProvider>,
}

impl Service {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let meter_provider = metrics::init_provider(
            config.telemetry.enable_metrics,
            config.telemetry.endpoint.as_ref(),
            config.telemetry.metrics_interval(),
            config.telemetry.instance_id.as_ref(),
            env!("CARGO_PKG_VERSION"),
        )?;

        let credential = GatewayCredential::from_env(&config.arweave.wallet_env_var);
        match &credential {
            GatewayCredential::Ready(signer) => {
                info!(wallet = %signer.address(), "arweave wallet loaded")
            }
            GatewayCredential::Missing { env_var } => {
                warn!("{} is not set, uploads will be refused", env_var)
            }
            GatewayCredential::Invalid { env_var, reason } => {
                error!("{} does not hold a usable key, uploads will be refused: {}", env_var, reason)
            }
        }

        let network = ArweaveClient::new(&config.arweave.gateway)?;
        info!(gateway = %network.base_url(), "using arweave gateway");
        let uploader = MediaUploader::new(
            Arc::new(network),
            credential,
            &config.arweave,
            Arc::new(upload_stats::Metrics::new()),
        );

        let factory = config.chain.factory()?;
        let facade = ArchiveFacade::connect_http(&config.chain.rpc_url, factory, &config.chain.facade)?;
        info!(
            rpc_url = %config.chain.rpc_url,
            chain_id = config.chain.chain_id,
            factory = ?factory,
            "using archive factory"
        );

        let route_state = RouteState {
            uploader: Arc::new(uploader),
            facade: Arc::new(facade),
        };
        Ok(Self {
            config,
            route_state,
            meter_provider,
        })
    }

    pub async fn start(&self) -> Result<()> {
        let handle = Handle::new();
        let handle_sh = handle.clone();
        tokio::spawn(async move {
            shutdown_signal(handle_sh).await;
            info!("graceful shutdown signal received, shutting down server gracefully");
        });

        let addr: SocketAddr = self.config.listen_addr.parse()?;
        info!("server api listening on {}", self.config.listen_addr);
        let routes = create_routes(
            self.route_state.clone(),
            self.config.max_upload_bytes,
            InstanceRequestSpan::new(&self.config.env, &self.config.instance_id()),
        );
        axum_server::bind(addr)
            .handle(handle)
            .serve(routes.into_make_service())
            .await?;

        if let Some(provider) = &self.meter_provider {
            if let Err(err) = provider.shutdown() {
                error!("error shutting down meter provider: {:?}", err);
            }
        }
        Ok(())
    }
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {:?}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {:?}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
        },
        _ = terminate => {
        },
    }
    handle.shutdown();
    info!("signal received, shutting down server gracefully");
}

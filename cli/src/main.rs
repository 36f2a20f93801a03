use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use archive_facade::{ArchiveFacade, FacadeConfig, ViewSession};
use clap::{Parser, Subcommand};
use data_model::Loadable;
use ethers::{
    types::{Address, U256},
    utils::parse_ether,
};
use tracing::{info, warn};

mod gateway;
mod render;

use gateway::GatewayClient;

const DEFAULT_FACTORY_ADDRESS: &str = "0x371cb38b81ae204a7950ff31b3caa1a5b563b1de";

#[derive(Parser, Debug)]
#[command(name = "memoria", version)]
#[command(about = "Publish media to permanent storage and manage archives", long_about = None)]
struct Cli {
    /// Base URL of the upload gateway
    #[arg(long, env = "MEMORIA_GATEWAY_URL", default_value = "http://localhost:8900")]
    gateway_url: String,

    /// JSON-RPC endpoint of the chain holding the archives
    #[arg(long, env = "MEMORIA_RPC_URL", default_value = "http://localhost:8545")]
    rpc_url: String,

    #[arg(long, env = "MEMORIA_CHAIN_ID", default_value_t = 11155111)]
    chain_id: u64,

    #[arg(long, env = "MEMORIA_FACTORY_ADDRESS", default_value = DEFAULT_FACTORY_ADDRESS, value_parser = parse_address)]
    factory: Address,

    /// Hex private key used to sign writes
    #[arg(long, env = "MEMORIA_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file through the gateway
    Upload { file: PathBuf },

    /// Upload a file and submit it to an archive for review
    Publish {
        #[arg(value_parser = parse_address)]
        archive: Address,
        file: PathBuf,
        #[arg(long)]
        title: String,
    },

    /// Create an archive, optionally with an illustration as its base URI
    CreateArchive {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        illustration: Option<PathBuf>,
    },

    /// Donate ether to an archive
    Donate {
        #[arg(value_parser = parse_address)]
        archive: Address,
        /// Amount in ether, e.g. 0.01
        #[arg(long, value_parser = parse_ether_amount)]
        amount: U256,
        #[arg(long, default_value = "")]
        message: String,
    },

    /// Accept a pending artifact, paying its submitter a reward
    Accept {
        #[arg(value_parser = parse_address)]
        archive: Address,
        #[arg(value_parser = parse_u256)]
        id: U256,
        /// Reward in ether
        #[arg(long, default_value = "0", value_parser = parse_ether_amount)]
        reward: U256,
    },

    /// Reject a pending artifact
    Reject {
        #[arg(value_parser = parse_address)]
        archive: Address,
        #[arg(value_parser = parse_u256)]
        id: U256,
    },

    /// Hand the archive over to a new admin
    TransferAdmin {
        #[arg(value_parser = parse_address)]
        archive: Address,
        #[arg(value_parser = parse_address)]
        new_admin: Address,
    },

    /// Show one archive
    Show {
        #[arg(value_parser = parse_address)]
        archive: Address,
        /// Account to check admin rights for
        #[arg(long, value_parser = parse_address)]
        viewer: Option<Address>,
        /// Reload every N seconds until interrupted
        #[arg(long)]
        watch: Option<u64>,
    },

    /// List archives created by the factory
    List {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },

    /// List the artifacts of an archive
    Artifacts {
        #[arg(value_parser = parse_address)]
        archive: Address,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
        /// Only artifacts waiting for review
        #[arg(long)]
        pending: bool,
    },
}

fn parse_address(value: &str) -> Result<Address, String> {
    value
        .parse::<Address>()
        .map_err(|_| format!("invalid address: {}", value))
}

fn parse_u256(value: &str) -> Result<U256, String> {
    U256::from_dec_str(value).map_err(|_| format!("invalid number: {}", value))
}

fn parse_ether_amount(value: &str) -> Result<U256, String> {
    parse_ether(value).map_err(|_| format!("invalid ether amount: {}", value))
}

impl Cli {
    fn facade(&self) -> Result<ArchiveFacade> {
        ArchiveFacade::connect_http(&self.rpc_url, self.factory, &FacadeConfig::default())
    }

    fn signed_facade(&self) -> Result<(ArchiveFacade, Address)> {
        let private_key = self
            .private_key
            .as_deref()
            .ok_or_else(|| anyhow!("MEMORIA_PRIVATE_KEY is required to send transactions"))?;
        ArchiveFacade::connect_signed(
            &self.rpc_url,
            self.chain_id,
            private_key,
            self.factory,
            &FacadeConfig::default(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    run(&cli).await
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Upload { file } => {
            let uploaded = GatewayClient::new(&cli.gateway_url)?.upload_file(file).await?;
            println!("transaction: {}", uploaded.transaction_id);
            println!("url:         {}", uploaded.url);
            println!("cost:        {}", uploaded.cost);
        }
        Command::Publish {
            archive,
            file,
            title,
        } => {
            let (facade, sender) = cli.signed_facade()?;
            let uploaded = GatewayClient::new(&cli.gateway_url)?.upload_file(file).await?;
            info!(url = %uploaded.url, "file stored, submitting artifact");
            let outcome = facade
                .writer()
                .submit_artifact(*archive, title, &uploaded.url, &uploaded.content_type)
                .await?;
            print!("{}", render::render_outcome("submission", &outcome));
            println!("artifact id: {}", outcome.confirmed.value);
            print_view(&facade, *archive, Some(&sender)).await;
        }
        Command::CreateArchive {
            name,
            description,
            illustration,
        } => {
            let (facade, sender) = cli.signed_facade()?;
            let base_uri = match illustration {
                Some(path) => {
                    GatewayClient::new(&cli.gateway_url)?
                        .upload_file(path)
                        .await?
                        .url
                }
                None => String::new(),
            };
            let outcome = facade
                .writer()
                .create_archive(name, description, &base_uri)
                .await?;
            print!("{}", render::render_outcome("archive creation", &outcome));
            println!("archive: {:?}", outcome.confirmed.value);
            print_view(&facade, outcome.confirmed.value, Some(&sender)).await;
        }
        Command::Donate {
            archive,
            amount,
            message,
        } => {
            let (facade, sender) = cli.signed_facade()?;
            let outcome = facade.writer().donate(*archive, message, *amount).await?;
            print!("{}", render::render_outcome("donation", &outcome));
            print_view(&facade, *archive, Some(&sender)).await;
        }
        Command::Accept {
            archive,
            id,
            reward,
        } => {
            let (facade, sender) = cli.signed_facade()?;
            ensure_admin(&facade, *archive, sender).await?;
            let outcome = facade
                .writer()
                .accept_artifact(*archive, *id, *reward)
                .await?;
            print!("{}", render::render_outcome("acceptance", &outcome));
            print_view(&facade, *archive, Some(&sender)).await;
        }
        Command::Reject { archive, id } => {
            let (facade, sender) = cli.signed_facade()?;
            ensure_admin(&facade, *archive, sender).await?;
            let outcome = facade.writer().reject_artifact(*archive, *id).await?;
            print!("{}", render::render_outcome("rejection", &outcome));
            print_view(&facade, *archive, Some(&sender)).await;
        }
        Command::TransferAdmin { archive, new_admin } => {
            let (facade, sender) = cli.signed_facade()?;
            ensure_admin(&facade, *archive, sender).await?;
            let outcome = facade
                .writer()
                .transfer_admin(*archive, *new_admin)
                .await?;
            print!("{}", render::render_outcome("admin transfer", &outcome));
            print_view(&facade, *archive, Some(&sender)).await;
        }
        Command::Show {
            archive,
            viewer,
            watch,
        } => {
            let facade = cli.facade()?;
            show(&facade, *archive, viewer.as_ref(), watch.map(Duration::from_secs)).await;
        }
        Command::List { offset, limit } => {
            let listing = cli.facade()?.archive_listing(*offset, *limit).await?;
            print!("{}", render::render_listing(&listing));
        }
        Command::Artifacts {
            archive,
            offset,
            limit,
            pending,
        } => {
            let listing = cli
                .facade()?
                .artifact_listing(*archive, *offset, *limit)
                .await?;
            print!("{}", render::render_artifacts(&listing, *pending));
        }
    }
    Ok(())
}

/// Admin-only writes are refused up front when the archive names another
/// admin. If the admin cannot be read the contract has the final say.
async fn ensure_admin(facade: &ArchiveFacade, archive: Address, sender: Address) -> Result<()> {
    let view = facade.archive_view(archive).await;
    if view.admin_controls_visible(&sender) {
        return Ok(());
    }
    match &view.admin {
        Loadable::Ready { value: admin } => Err(anyhow!(
            "{:?} is not the admin of archive {:?} (admin is {:?})",
            sender,
            archive,
            admin
        )),
        Loadable::Unavailable { error } => {
            warn!(%error, "could not read the archive admin, sending anyway");
            Ok(())
        }
    }
}

async fn print_view(facade: &ArchiveFacade, archive: Address, viewer: Option<&Address>) {
    let view = facade.archive_view(archive).await;
    print!("{}", render::render_view(&view, viewer));
}

/// Renders the archive, reloading it every `interval` when set. A load
/// still in flight when the user interrupts is discarded.
async fn show(
    facade: &ArchiveFacade,
    archive: Address,
    viewer: Option<&Address>,
    interval: Option<Duration>,
) {
    let session = ViewSession::default();
    loop {
        tokio::select! {
            view = session.run(facade.archive_view(archive)) => {
                if let Some(view) = view {
                    print!("{}", render::render_view(&view, viewer));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                session.end();
                return;
            }
        }
        let Some(interval) = interval else {
            return;
        };
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                session.end();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use archive_facade::{in_memory::InMemoryArchives, ChainError};
    use data_model::test_objects::tests::{test_admin, test_viewer};
    use memoria_utils::retry::RetryPolicy;

    use super::*;

    fn in_memory_facade(backend: Arc<InMemoryArchives>) -> ArchiveFacade {
        ArchiveFacade::new(
            backend,
            &FacadeConfig {
                retry: RetryPolicy::no_retries(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_admin_writes_need_the_admin() {
        let backend = Arc::new(InMemoryArchives::default());
        let archive = backend.seed_archive(test_admin());
        let facade = in_memory_facade(backend.clone());

        ensure_admin(&facade, archive, test_admin()).await.unwrap();
        let err = ensure_admin(&facade, archive, test_viewer())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is not the admin"));
    }

    #[tokio::test]
    async fn test_unreadable_admin_defers_to_contract() {
        let backend = Arc::new(InMemoryArchives::default());
        let archive = backend.seed_archive(test_admin());
        backend.fail_reads(
            "admin",
            ChainError::TransientNetwork {
                function: "admin",
                message: "connection reset".to_string(),
            },
            1,
        );
        let facade = in_memory_facade(backend);
        ensure_admin(&facade, archive, test_viewer()).await.unwrap();
    }

    #[test]
    fn test_parses_write_commands() {
        let cli = Cli::try_parse_from([
            "memoria",
            "--private-key",
            "0x01",
            "donate",
            "0x371cb38b81ae204a7950ff31b3caa1a5b563b1de",
            "--amount",
            "0.01",
        ])
        .unwrap();
        match cli.command {
            Command::Donate { amount, .. } => assert_eq!(amount, U256::exp10(16)),
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.factory, DEFAULT_FACTORY_ADDRESS.parse::<Address>().unwrap());
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["memoria", "show", "harbor"]).is_err());
        assert!(Cli::try_parse_from([
            "memoria",
            "accept",
            "0x371cb38b81ae204a7950ff31b3caa1a5b563b1de",
            "first"
        ])
        .is_err());
    }

    #[test]
    fn test_writes_require_a_key() {
        let cli = Cli::try_parse_from([
            "memoria",
            "reject",
            "0x371cb38b81ae204a7950ff31b3caa1a5b563b1de",
            "3",
        ])
        .unwrap();
        if cli.private_key.is_none() {
            let err = cli.signed_facade().err().unwrap();
            assert!(err.to_string().contains("MEMORIA_PRIVATE_KEY"));
        }
    }
}

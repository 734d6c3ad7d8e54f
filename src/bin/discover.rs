use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use token_discovery::config::Config;
use token_discovery::pipeline::DiscoveryPipeline;
use token_discovery::registry::{RegistryChecker, TokenRegistry, UnlistedRegistry};
use token_discovery::report::commands::{cmd_scan, cmd_watch};
use token_discovery::report::formatters::OutputFormat;
use token_discovery::resolver::MetadataResolver;
use token_discovery::rpc::RpcClient;
use token_discovery::session::DiscoverySession;
use token_discovery::sources::{AssetsTokenList, ChainApprovalSource, EthplorerClient};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "discover")]
#[command(about = "Discover the ERC20 tokens an address holds or has approved", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    /// Hide tokens that are not in the curated registry
    #[arg(long, default_value = "false")]
    registered_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Scan {
        address: String,

        /// Also list every approval event per token
        #[arg(long, default_value = "false")]
        approvals: bool,
    },
    /// Read addresses from stdin, rediscovering on every new line
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!(
        "RPC URLs: {} endpoint(s) configured",
        config.json_rpc_urls.len()
    );

    let client = RpcClient::new(
        &config.json_rpc_urls,
        config.rpc_request_timeout,
        config.rpc_max_retries,
    )?;

    let registry: Arc<dyn RegistryChecker> = match config.token_registry_address {
        Some(address) => {
            info!("Token registry: {}", address);
            Arc::new(TokenRegistry::new(client.clone(), address))
        }
        None => {
            warn!("TOKEN_REGISTRY_ADDRESS not set, every token is reported as unregistered");
            Arc::new(UnlistedRegistry)
        }
    };

    let pipeline = DiscoveryPipeline::new(
        Arc::new(ChainApprovalSource::new(
            client.clone(),
            config.approval_from_block,
        )),
        Arc::new(EthplorerClient::new(
            &config.ethplorer_api_url,
            &config.ethplorer_api_key,
            config.http_timeout,
        )?),
        MetadataResolver::new(Arc::new(AssetsTokenList::new(
            &config.token_list_url,
            config.http_timeout,
        )?)),
        registry,
        Arc::new(client),
    )
    .with_concurrency(config.discovery_concurrency);

    let session = Arc::new(DiscoverySession::new(Arc::new(pipeline)));
    session.set_registered_only(cli.registered_only);

    match cli.command {
        Commands::Scan { address, approvals } => {
            cmd_scan(&session, &address, approvals, &format).await?;
        }
        Commands::Watch => {
            cmd_watch(session, &format).await?;
        }
    }

    Ok(())
}

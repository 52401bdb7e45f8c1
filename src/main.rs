use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use swapquote::application::{Cli, CommandExecutor, QuoteService};
use swapquote::infrastructure::blockchain::SolanaChainReader;
use swapquote::shared::config::ConfigLoader;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    // Priority: CLI args > config file > defaults
    let mut config = ConfigLoader::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(rpc_url) = cli.rpc_url {
        config.rpc.url = rpc_url;
    }

    let reader =
        SolanaChainReader::from_config(&config.rpc).context("failed to create RPC client")?;
    let service = QuoteService::from_config(&config, Arc::new(reader))
        .context("invalid token or pool configuration")?;

    CommandExecutor::execute(cli.command, Arc::new(service)).await
}

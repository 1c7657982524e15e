use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use smsdesk::bootstrap::Server;
use smsdesk::config::Config;
use smsdesk::telemetry::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(name = "smsdesk")]
#[command(author, version, about = "Message history and bulk SMS backend for school dashboards")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log settings)
    let config = Config::load(&args.config)?;

    init_tracing(&TracingConfig::from(&config.telemetry))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting smsdesk"
    );

    info!(
        address = %config.server.address,
        mock_gateway = config.gateway.mock,
        page_size = config.fetch.page_size,
        max_pages = config.fetch.max_pages,
        "configuration loaded"
    );

    // Validate only mode
    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}

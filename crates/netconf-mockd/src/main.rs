//! netconf-mockd - NETCONF device simulator
//!
//! Listens on TCP and answers NETCONF sessions from canned data. Useful for
//! exercising netconf-tool without real hardware (use `--transport tcp`).

use clap::Parser;
use netconf_mockd::{Result, Server, ServerConfig};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mockd.toml")]
    config: PathBuf,

    /// Listen address, overriding the configuration file
    #[arg(short, long)]
    listen: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load or create configuration
    let mut config = if args.config.exists() {
        info!("Loading configuration from {:?}", args.config);
        ServerConfig::load_from_file(&args.config)?
    } else {
        info!("Configuration file not found, creating default configuration");
        let config = ServerConfig::default();
        config.save_to_file(&args.config)?;
        info!("Default configuration saved to {:?}", args.config);
        config
    };

    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let server = Server::new(config)?;
    info!(
        capabilities = server.config().capabilities.len(),
        "Simulated device ready"
    );

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}

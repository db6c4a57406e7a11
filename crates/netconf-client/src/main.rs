//! netconf-tool - NETCONF command-line client
//!
//! Connects to a device, runs one operation and prints the result as XML.

use clap::{Args as ClapArgs, Parser, Subcommand};
use netconf_client::{ClientConfig, DeviceProfile, NetconfError, Result, Session};
use netconf_proto::{unchecked_subtree_filter, Datastore, Filter, SubscriptionOptions};
use netconf_transport::TransportKind;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "netconf-tool.toml")]
    config: PathBuf,

    /// Device address
    #[arg(long)]
    host: Option<String>,

    /// Device port
    #[arg(long)]
    port: Option<u16>,

    /// Username to authenticate with
    #[arg(long, env = "NETCONF_TOOL_USERNAME")]
    username: Option<String>,

    /// Password to authenticate with
    #[arg(long, env = "NETCONF_TOOL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Private key file for public key authentication
    #[arg(long)]
    key: Option<PathBuf>,

    /// Device profile (default, junos, nexus, huawei, alu)
    #[arg(long)]
    device_profile: Option<DeviceProfile>,

    /// Require the device host key to be in known_hosts
    #[arg(long)]
    hostkey_verify: bool,

    /// Transport (ssh or tcp)
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Connection timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the capabilities advertised by the device
    Capabilities,

    /// Retrieve configuration from a datastore
    GetConfig {
        /// Datastore to read (running or candidate)
        #[arg(long, default_value = "running")]
        datastore: Datastore,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Retrieve configuration and state data
    Get {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Export one YANG module
    GetSchema {
        /// Module name
        #[arg(long)]
        name: String,

        /// Directory to write the module to; printed to stdout when absent
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Export every YANG module the device announces
    GetSchemas {
        /// Only export modules whose name matches this pattern (anchored at the start)
        #[arg(long)]
        regex: Option<String>,

        #[arg(long, default_value = "./yang_models")]
        output_dir: PathBuf,
    },

    /// Subscribe and print notifications until interrupted
    Subscribe {
        /// Event stream
        #[arg(long)]
        stream: Option<String>,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(ClapArgs, Debug)]
struct FilterArgs {
    /// Subtree filter as raw XML
    #[arg(long, conflicts_with = "path")]
    filter: Option<String>,

    /// Subtree filter as a path expression, e.g. "interfaces@urn:ietf:params:xml:ns:yang:ietf-interfaces interface name=eth0".
    /// Not validated against any YANG model.
    #[arg(long)]
    path: Option<String>,
}

impl FilterArgs {
    fn build(&self) -> Result<Option<Filter>> {
        if let Some(xml) = &self.filter {
            return Ok(Some(Filter::Raw(xml.clone())));
        }
        match &self.path {
            Some(expression) => Ok(Some(Filter::Subtree(unchecked_subtree_filter(expression)?))),
            None => Ok(None),
        }
    }
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
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;

    info!(
        "Attempting to establish NETCONF session to {}:{}",
        config.host, config.port
    );
    let session = match Session::connect_with_config(&config).await {
        Ok(session) => session,
        Err(e) => {
            error!(kind = ?e.kind(), "{}", e);
            return Err(e);
        }
    };
    info!(
        "Established NETCONF session to {} (Session ID: {})",
        session.peer(),
        session.session_id()
    );

    let result = run(&session, &args.command).await;
    session.close().await?;

    if let Err(e) = &result {
        error!(kind = ?e.kind(), "{}", e);
    }
    result
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = if args.config.exists() {
        info!("Loading configuration from {:?}", args.config);
        ClientConfig::load_from_file(&args.config)?
    } else {
        ClientConfig::default()
    };

    // Command-line values override the file
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(username) = &args.username {
        config.username = Some(username.clone());
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if let Some(key) = &args.key {
        config.key_path = Some(key.clone());
    }
    if let Some(profile) = args.device_profile {
        config.device_profile = profile;
    }
    if let Some(transport) = args.transport {
        config.transport = transport;
    }
    if let Some(timeout) = args.timeout {
        config.connect_timeout = timeout;
    }
    config.verify_host_key |= args.hostkey_verify;

    Ok(config)
}

async fn run(session: &Session, command: &Command) -> Result<()> {
    match command {
        Command::Capabilities => {
            for capability in session.raw_capabilities() {
                println!("{}", capability);
            }
            info!("Device advertised {} capabilities", session.raw_capabilities().len());
        }
        Command::GetConfig { datastore, filter } => {
            let filter = filter.build()?;
            let data = session.get_config(*datastore, filter.as_ref()).await?;
            println!("{}", data);
        }
        Command::Get { filter } => {
            let filter = filter.build()?;
            let data = session.get(filter.as_ref()).await?;
            println!("{}", data);
        }
        Command::GetSchema { name, output_dir } => {
            if !session.schema_modules().contains(name) {
                warn!("{} is not announced by the device, use 'get-schemas' to list modules", name);
            }
            let schema = session.get_schema(name).await?;
            match output_dir {
                Some(dir) => {
                    let path = write_schema(dir, name, &schema)?;
                    info!("Exported module {} ({})", name, path.display());
                }
                None => println!("{}", schema),
            }
        }
        Command::GetSchemas { regex, output_dir } => {
            let pattern = match regex {
                Some(pattern) => Some(
                    Regex::new(&format!("^(?:{})", pattern))
                        .map_err(|e| NetconfError::Config(format!("Invalid regex: {}", e)))?,
                ),
                None => None,
            };

            let mut exported = 0;
            for module in session.schema_modules() {
                if pattern.as_ref().is_some_and(|p| !p.is_match(&module)) {
                    continue;
                }
                match session.get_schema(&module).await {
                    Ok(schema) => {
                        let path = write_schema(output_dir, &module, &schema)?;
                        info!("Exported module {} ({})", module, path.display());
                        exported += 1;
                    }
                    Err(e @ NetconfError::NotFound(_)) | Err(e @ NetconfError::Rpc(_)) => {
                        warn!("Skipping module {}: {}", module, e);
                    }
                    Err(e) => return Err(e),
                }
            }
            info!("Exported a total of {} YANG models", exported);
        }
        Command::Subscribe { stream, filter } => {
            let options = SubscriptionOptions {
                stream: stream.clone(),
                filter: filter.build()?,
                ..Default::default()
            };
            session.create_subscription_with(&options).await?;
            info!("Subscribed, waiting for notifications (Ctrl-C to stop)");

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted");
                        break;
                    }
                    next = session.take_notification(Duration::from_secs(60)) => match next {
                        Ok(notification) => println!("{}", notification.raw),
                        Err(NetconfError::Timeout(_)) => continue,
                        Err(e) => return Err(e),
                    },
                }
            }
        }
    }
    Ok(())
}

fn write_schema(dir: &Path, module: &str, schema: &str) -> Result<PathBuf> {
    if !dir.is_dir() {
        info!("Creating output directory {:?}", dir);
        std::fs::create_dir_all(dir)?;
    }
    let path = dir.join(format!("{}.yang", module));
    std::fs::write(&path, schema)?;
    Ok(path)
}

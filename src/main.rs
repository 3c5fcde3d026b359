/*!
 * Agentlink CLI - inspect and probe agent connections
 */

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use agentlink::{
    config::ClientConfig,
    error::{Result, EXIT_SUCCESS},
    logging, CloudClient,
};
use agentlink_connect::{resolve_endpoint, Transport, AGENT_PORT, AUTH_PORT};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Parser)]
#[command(name = "agentlink")]
#[command(version, about = "Connect to cloud agents and the authentication service", long_about = None)]
struct Cli {
    /// Client configuration file (TOML)
    #[arg(short, long, global = true, env = "AGENTLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the canonical endpoint an address resolves to
    Resolve {
        /// Agent address, with or without a port
        address: String,

        /// Resolve against the authentication service port
        #[arg(long)]
        auth: bool,
    },

    /// Dial an endpoint through the connection cache and report its state
    Probe {
        /// Agent address, with or without a port
        address: String,

        /// Probe the authentication service instead of an agent
        #[arg(long)]
        auth: bool,

        /// Give up after this many seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };

    process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    config.verbose |= cli.verbose;

    match cli.command {
        Command::Resolve { address, auth } => {
            let port = if auth { AUTH_PORT } else { AGENT_PORT };
            println!("{}", resolve_endpoint(&address, port));
            Ok(())
        }
        Command::Probe {
            address,
            auth,
            timeout,
        } => {
            logging::init_logging(&config)?;
            probe(&config, &address, auth, Duration::from_secs(timeout)).await
        }
        Command::Config => {
            let rendered = toml::to_string_pretty(&config.redacted())?;
            print!("{}", rendered);
            Ok(())
        }
    }
}

async fn probe(config: &ClientConfig, address: &str, auth: bool, timeout: Duration) -> Result<()> {
    let client = CloudClient::from_config(config)?;

    let cancel = CancellationToken::new();
    let deadline = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        deadline.cancel();
    });

    let connection = if auth {
        client.auth_connection_cancellable(address, &cancel).await?
    } else {
        client.agent_connection_cancellable(address, &cancel).await?
    };

    debug!("Probe finished: {:?}", connection);
    println!("{} {}", connection.endpoint(), connection.state());
    Ok(())
}

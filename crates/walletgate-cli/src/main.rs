/*
[INPUT]:  CLI arguments, YAML configuration file, OS interrupt signal
[OUTPUT]: Wallet login, session status, or logout against the verifier
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, subcommands, or startup flow
*/

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use walletgate_cli::{CliConfig, build_orchestrator, runner};

#[derive(Parser, Debug)]
#[command(name = "walletgate", version, about = "Wallet login and identity token runner")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    /// Override the storage directory from the config file
    #[arg(long = "storage-dir", value_name = "DIR")]
    storage_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect a wallet and obtain an identity token
    Login {
        /// Connector name; defaults to the first configured one
        #[arg(long)]
        connector: Option<String>,
        /// Hex chain id to switch to after connecting
        #[arg(long = "chain-id")]
        chain_id: Option<String>,
        /// Print the raw identity token
        #[arg(long = "show-token")]
        show_token: bool,
    },
    /// Show the restored session and cached tokens
    Status,
    /// End the active session
    Logout {
        /// Also forget every cached identity token
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(config_path = %args.config_path.display(), "starting walletgate");

    let mut config = CliConfig::from_file(&args.config_path).context("load config")?;
    if let Some(dir) = args.storage_dir {
        config.storage_dir = Some(dir);
    }
    info!(
        connector_count = config.connectors.len(),
        storage_dir = %config.storage_dir().display(),
        "configuration loaded"
    );

    let orchestrator = build_orchestrator(&config)?;

    let run = async {
        match args.command {
            Command::Login {
                connector,
                chain_id,
                show_token,
            } => {
                if let Some(name) = connector.as_deref()
                    && config.connector(name).is_none()
                {
                    bail!("unknown connector {name}");
                }
                runner::login(&orchestrator, connector.as_deref(), chain_id, show_token).await
            }
            Command::Status => runner::status(&orchestrator).await,
            Command::Logout { all } => runner::logout(&orchestrator, all).await,
        }
    };

    tokio::select! {
        result = run => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("install SIGINT handler")?;
            info!("received SIGINT");
            Err(anyhow!("interrupted"))
        }
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

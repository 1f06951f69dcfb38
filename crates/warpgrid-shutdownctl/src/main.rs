//! shutdownctl — operator CLI for the WarpGrid shutdown handshake.
//!
//! # Usage
//!
//! ```text
//! shutdownctl --config /etc/warpgrid/shutdown.toml request i-1 i-2
//! shutdownctl status --all
//! shutdownctl protect i-3 --ttl 15m
//! ```
//!
//! Results go to stdout, logs to stderr.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod store;

use commands::{Context, OutputFormat};

#[derive(Parser)]
#[command(
    name = "shutdownctl",
    about = "WarpGrid — instance shutdown coordination",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to shutdown.toml. Built-in defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Result format: text or json.
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask instances to shut down.
    Request {
        /// Instance ids.
        ids: Vec<String>,
        /// Act on every instance in the configured directory.
        #[arg(long)]
        all: bool,
        /// Status value to store.
        #[arg(long, default_value = warpgrid_shutdown::SHUTDOWN_STATUS)]
        status: String,
    },
    /// Show whether instances have been asked to shut down.
    Status {
        ids: Vec<String>,
        #[arg(long)]
        all: bool,
    },
    /// Confirm shutdown on behalf of instances.
    Confirm {
        ids: Vec<String>,
        #[arg(long)]
        all: bool,
        /// Confirmation value (default: current time, ISO-8601).
        #[arg(long)]
        value: Option<String>,
    },
    /// Show shutdown confirmations.
    Confirmations {
        ids: Vec<String>,
        #[arg(long)]
        all: bool,
    },
    /// Protect an instance from scale-down for a while.
    Protect {
        id: String,
        /// Protection window, e.g. "10m" (default: protection_ttl from config).
        #[arg(long)]
        ttl: Option<String>,
        /// Mode value to store.
        #[arg(long, default_value = warpgrid_shutdown::SCALE_DOWN_PROTECTED)]
        mode: String,
    },
    /// Show whether instances are protected from scale-down.
    Protected {
        ids: Vec<String>,
        #[arg(long)]
        all: bool,
    },
    /// Check connectivity to the configured store.
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = commands::load_config(cli.config.as_deref())?;
    let store = store::open(&config).await?;
    let ctx = Context::new(config, store.kv(), cli.format)?;

    match cli.command {
        Commands::Request { ids, all, status } => commands::request(&ctx, &ids, all, &status).await,
        Commands::Status { ids, all } => commands::status(&ctx, &ids, all).await,
        Commands::Confirm { ids, all, value } => {
            commands::confirm(&ctx, &ids, all, value.as_deref()).await
        }
        Commands::Confirmations { ids, all } => commands::confirmations(&ctx, &ids, all).await,
        Commands::Protect { id, ttl, mode } => {
            commands::protect(&ctx, &id, ttl.as_deref(), &mode).await
        }
        Commands::Protected { ids, all } => commands::protected(&ctx, &ids, all).await,
        Commands::Ping => {
            store.ping().await?;
            println!("ok ({})", store.describe());
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,warpgrid_shutdown=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

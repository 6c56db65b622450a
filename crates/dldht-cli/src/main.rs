//! dldht: command-line client for a dl-dht node.
//!
//! Each invocation resolves one endpoint (flags, config file, or a
//! discovered local node), performs a single operation and exits.

mod cli;
mod cmd;
mod endpoint;
mod ui;

use crate::cli::{Cli, Commands};
use clap::Parser;
use dldht_types::DhtError;

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            ui::error(&format!("Failed to start async runtime: {e}"));
            std::process::exit(1);
        }
    };

    let result = rt.block_on(async {
        match &cli.command {
            Commands::Get { key, raw } => cmd::cmd_get(&cli, key, *raw).await,
            Commands::Put {
                key,
                value,
                ttl,
                file,
            } => cmd::cmd_put(&cli, key, value, *ttl, *file).await,
            Commands::Del { key } => cmd::cmd_del(&cli, key).await,
            Commands::Status => cmd::cmd_status(&cli).await,
            Commands::Discover => cmd::cmd_discover(&cli).await,
        }
    });

    if let Err(e) = result {
        report_error(&e);
        std::process::exit(1);
    }
}

/// Print a failure with a context-aware fix.
fn report_error(e: &DhtError) {
    match e {
        DhtError::Discovery(msg) => ui::error_with_fix(
            msg,
            "Start the node, pass --peer-id and --addr, or point --status-url at its HTTP API",
        ),
        DhtError::KeyShape(_) => {
            ui::error_with_fix(&e.to_string(), "Keys look like /<namespace>/<name>, e.g. /ns/alice")
        }
        DhtError::Config(_) | DhtError::InvalidAddr(_) => ui::error_with_fix(
            &e.to_string(),
            "Check --peer-id/--addr or ~/.dldht/config.toml",
        ),
        DhtError::ValueTooLarge { .. } => {
            ui::error_with_fix(&e.to_string(), "Raise max_value_size in ~/.dldht/config.toml")
        }
        DhtError::NotFound(_) => ui::warn(&e.to_string()),
        e if e.is_connection_error() => {
            ui::error_with_fix(
                &format!("Cannot reach the dl-dht node: {e}"),
                "Is the node running? Check --addr, or try `dldht discover`",
            );
            ui::hint("RUST_LOG=dldht_wire=debug shows every attempt");
        }
        other => ui::error(&other.to_string()),
    }
}

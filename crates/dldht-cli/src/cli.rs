//! Clap CLI definitions for dldht.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  dldht status                          Show the local node's status
  dldht put /ns/alice '{\"v\":1}'         Store a value
  dldht get /ns/alice                   Fetch it back
  dldht put /cert/node-a cert.pem --file --ttl 3600
  dldht --addr /ip4/10.0.0.5/tcp/46345 --peer-id 12D3KooW... get /ns/bob

\x1b[1;36mEndpoint:\x1b[0m
  --peer-id/--addr, then ~/.dldht/config.toml, then auto-discovery
  of a local node (override with --status-url or DLDHT_STATUS_URL).";

/// dldht: talk to a dl-dht node's key/value API.
#[derive(Parser, Debug)]
#[command(name = "dldht", version, about = "Client for a dl-dht node", after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file (default: ~/.dldht/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Remote peer id.
    #[arg(long, global = true)]
    pub peer_id: Option<String>,

    /// Remote multiaddr (repeat for fallbacks, tried in order).
    #[arg(long = "addr", global = true)]
    pub addrs: Vec<String>,

    /// Preferred protocol id.
    #[arg(long, global = true)]
    pub protocol: Option<String>,

    /// Discovery status URL of a local node.
    #[arg(long, global = true)]
    pub status_url: Option<String>,

    /// Print machine-readable JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the value stored under a key.
    Get {
        key: String,
        /// Write the value bytes to stdout unchanged.
        #[arg(long)]
        raw: bool,
    },
    /// Store a value under a key.
    Put {
        key: String,
        /// The value, or a file path with --file.
        value: String,
        /// Time to live in seconds (0 = node default).
        #[arg(long, default_value_t = 0)]
        ttl: u64,
        /// Read the value from the file named by VALUE.
        #[arg(long)]
        file: bool,
    },
    /// Delete a key.
    Del { key: String },
    /// Show the node's status document.
    Status,
    /// Find a local node and print its identity and addresses.
    Discover,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "dldht",
            "get",
            "/ns/alice",
            "--addr",
            "/ip4/127.0.0.1/tcp/1",
            "--addr",
            "/ip4/127.0.0.1/tcp/2",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.addrs.len(), 2);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Get { ref key, raw: false } if key == "/ns/alice"));
    }

    #[test]
    fn test_put_defaults() {
        let cli = Cli::try_parse_from(["dldht", "put", "/ns/a", "hello"]).unwrap();
        match cli.command {
            Commands::Put {
                key,
                value,
                ttl,
                file,
            } => {
                assert_eq!(key, "/ns/a");
                assert_eq!(value, "hello");
                assert_eq!(ttl, 0);
                assert!(!file);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["dldht"]).is_err());
        assert!(Cli::try_parse_from(["dldht", "del"]).is_err());
    }
}

//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use dropline_core::config::Config;
use dropline_core::history::{HistoryStore, MemoryStore, TransferStore};

pub mod config;
pub mod history;
pub mod receive;
pub mod send;

/// Load configuration with graceful fallback to defaults.
///
/// This function should be used by all commands to load the user's configuration.
/// If the config file doesn't exist or can't be parsed, it falls back to defaults
/// (environment overrides still apply).
pub fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!("Ignoring unreadable configuration: {}", e);
        let mut config = Config::default();
        config.apply_env();
        config
    })
}

/// Open the store transfers are recorded into.
///
/// Falls back to an in-memory store when history is disabled or the
/// history file cannot be loaded.
pub fn open_store(config: &Config) -> Arc<dyn TransferStore> {
    if !config.history.enabled {
        return Arc::new(MemoryStore::new());
    }
    match HistoryStore::load(config.history.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!("Failed to load history, not recording: {}", e);
            Arc::new(MemoryStore::new())
        }
    }
}

/// Dropline - Direct peer-to-peer file transfer
#[derive(Parser)]
#[command(name = "dropline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Send a file to a listening peer
    Send(SendArgs),

    /// Listen for incoming files
    Receive(ReceiveArgs),

    /// View transfer history
    History(HistoryArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// File to send
    pub file: PathBuf,

    /// Peer address: HOST, HOST:PORT, [IPv6] or [IPv6]:PORT
    pub peer: String,

    /// Username announced to the receiver
    #[arg(short, long, env = "DROPLINE_USERNAME")]
    pub user: Option<String>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output the result in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the receive command
#[derive(Parser)]
pub struct ReceiveArgs {
    /// Port to listen on (0 picks a free port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory to store received files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum number of simultaneous receptions
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the history command
#[derive(Parser)]
pub struct HistoryArgs {
    /// Number of entries to show
    #[arg(short, long, default_value_t = 20)]
    pub limit: usize,

    /// Clear history
    #[arg(long)]
    pub clear: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

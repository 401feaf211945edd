//! Dropline CLI - Direct peer-to-peer file transfer
//!
//! Dropline moves a file from one machine to another over a single TCP
//! connection.
//!
//! ## Quick Start
//!
//! ```bash
//! # Wait for files (on the receiving machine)
//! dropline receive --output ./inbox
//!
//! # Send a file
//! dropline send ./document.pdf 192.168.1.20
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Command::Send(args) => commands::send::run(args).await,
        Command::Receive(args) => commands::receive::run(args).await,
        Command::History(args) => commands::history::run(args).await,
        Command::Config(args) => commands::config::run(args).await,
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "info,dropline=debug,dropline_core=debug"
    } else {
        "warn,dropline=info,dropline_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

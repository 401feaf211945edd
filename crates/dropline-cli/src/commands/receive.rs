//! Receive command implementation.
//!
//! Listens until interrupted and stores every incoming file.

use std::sync::Arc;

use anyhow::{Context, Result};

use dropline_core::transfer::Receiver;

use super::ReceiveArgs;
use crate::ui::{self, TerminalSink};

/// Run the receive command.
pub async fn run(args: ReceiveArgs) -> Result<()> {
    let mut global_config = super::load_config();
    if let Some(port) = args.port {
        global_config.network.port = port;
    }
    if let Some(output) = args.output.clone() {
        global_config.transfer.storage_dir = output;
    }
    if args.max_concurrent.is_some() {
        global_config.transfer.max_concurrent = args.max_concurrent;
    }
    global_config.validate().context("Invalid configuration")?;

    let store = super::open_store(&global_config);
    let receiver_config = global_config.receiver_config();
    let storage_dir = receiver_config.storage_dir.clone();

    let receiver = Receiver::bind(
        receiver_config,
        Arc::clone(&store),
        Arc::new(TerminalSink::new(args.quiet)),
    )
    .await
    .context("Failed to start receiver")?;

    if !args.quiet {
        ui::print_header();
        println!("  Listening on {}", receiver.local_addr());
        println!("  Saving files to {}", storage_dir.display());
        println!();
        println!("  Press Ctrl+C to stop.");
        println!();
    }

    let handle = receiver.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    tracing::debug!("Interrupt received, stopping receiver");
    handle.stop().await;

    let pending = handle.in_flight();
    if pending > 0 {
        if !args.quiet {
            println!();
            println!("  Waiting for {pending} transfer(s) in progress (Ctrl+C again to abort)...");
        }
        tokio::select! {
            () = handle.drain() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!(pending = handle.in_flight(), "Abandoning transfers in progress");
            }
        }
    }
    handle.wait().await;

    if let Err(e) = store.flush() {
        tracing::warn!(error = %e, "Could not write transfer history");
    }

    if !args.quiet {
        println!();
        println!("  Receiver stopped.");
        println!();
    }

    Ok(())
}

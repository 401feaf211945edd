//! Send command implementation.
//!
//! Streams one file to a peer running `dropline receive`.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use dropline_core::connection::parse_peer_address;
use dropline_core::file::{self, format_size};
use dropline_core::transfer::{Sender, TracingSink, Transfer, TransferSink};

use super::SendArgs;
use crate::ui::{self, TerminalSink};

/// Run the send command.
pub async fn run(args: SendArgs) -> Result<()> {
    let mut global_config = super::load_config();
    if let Some(user) = args.user.clone() {
        global_config.general.username = user;
    }
    global_config.validate().context("Invalid configuration")?;

    let peer = parse_peer_address(&args.peer, global_config.network.port)
        .context("Invalid peer address")?;

    let sender_config = global_config.sender_config();
    let size = file::validate_for_transfer(&args.file, sender_config.max_file_size)
        .await
        .with_context(|| format!("Cannot send {}", args.file.display()))?;

    let store = super::open_store(&global_config);
    let quiet = args.quiet || args.json;
    let sink: Arc<dyn TransferSink> = if quiet {
        Arc::new(TracingSink)
    } else {
        Arc::new(TerminalSink::new(false))
    };
    let sender = Sender::new(sender_config, Arc::clone(&store), sink);

    if !quiet {
        ui::print_header();
        println!(
            "  Sending {} ({}) to {}",
            file::display_name(&args.file),
            format_size(size),
            peer
        );
        println!();
    }

    let mut transfer = Transfer::outbound(global_config.general.user_id, &args.file, size);
    let start_time = Instant::now();
    let success = sender
        .send(&args.file, &peer.host, peer.port, &mut transfer)
        .await;
    let elapsed = start_time.elapsed();

    if let Err(e) = store.flush() {
        tracing::warn!(error = %e, "Could not write transfer history");
    }

    if args.json {
        let output = serde_json::json!({
            "status": if success { "complete" } else { "failed" },
            "file": transfer.file_name(),
            "size": transfer.file_size(),
            "peer": peer.to_string(),
            "elapsed_ms": u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !args.quiet {
        println!();
        if success {
            println!("  Transfer complete in {:.1}s", elapsed.as_secs_f64());
        } else {
            eprintln!("  Transfer failed.");
        }
        println!();
    }

    if success {
        Ok(())
    } else {
        anyhow::bail!("transfer of {} to {} failed", transfer.file_name(), peer)
    }
}

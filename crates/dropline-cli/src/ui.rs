//! UI utilities for Dropline CLI.

use std::io::{self, Write};

use dropline_core::transfer::{Transfer, TransferSink, TransferStatus};

const RULE_WIDTH: usize = 37;

/// Print the banner shown at the top of interactive commands.
pub fn print_header() {
    println!();
    println!("Dropline v{}", dropline_core::VERSION);
    println!("{}", "-".repeat(RULE_WIDTH));
    println!();
}

/// Sink that renders progress on a single terminal line.
#[derive(Debug, Clone, Copy)]
pub struct TerminalSink {
    quiet: bool,
}

impl TerminalSink {
    /// Create a sink; `quiet` suppresses everything but outcomes.
    #[must_use]
    pub const fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl TransferSink for TerminalSink {
    fn on_progress(&self, percent: u8, message: &str) {
        if self.quiet {
            return;
        }
        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, "\r  [{:>3}%] {}    ", percent, message);
        if percent == 100 {
            let _ = writeln!(stdout);
        }
        let _ = stdout.flush();
    }

    fn on_log_line(&self, message: &str) {
        if !self.quiet {
            println!("  {}", message);
        }
    }

    fn on_transfer_complete(&self, _transfer: &Transfer, _success: bool) {}

    fn on_file_received(&self, transfer: &Transfer) {
        let marker = if transfer.status() == TransferStatus::Completed {
            "+"
        } else {
            "!"
        };
        println!(
            "  [{}] {} ({}) from {} -> {}",
            marker,
            transfer.file_name(),
            transfer.formatted_size(),
            transfer.peer_label(),
            transfer.status()
        );
    }
}

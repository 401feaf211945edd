//! Observer interface for transfer progress and lifecycle events.
//!
//! Endpoints report through a [`TransferSink`]. Workers call it from their
//! own tasks, so implementations must be `Send + Sync` and cheap to call;
//! anything slow belongs on the far side of a [`ChannelSink`].

use std::fmt;

use tokio::sync::mpsc;

use super::record::Transfer;

/// Receives progress, log lines and outcomes from an endpoint.
pub trait TransferSink: Send + Sync {
    /// A new whole percentage was reached.
    fn on_progress(&self, percent: u8, message: &str);

    /// A human-readable status line.
    fn on_log_line(&self, message: &str);

    /// A send finished. Called exactly once per send, success or not.
    fn on_transfer_complete(&self, transfer: &Transfer, success: bool);

    /// A reception finished after its record was created.
    fn on_file_received(&self, transfer: &Transfer);
}

/// Owned form of a sink callback.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Progress reached `percent`
    Progress {
        /// Whole percentage
        percent: u8,
        /// Display message
        message: String,
    },
    /// Status line
    Log(String),
    /// A send finished
    TransferComplete {
        /// Final state of the sender's record
        transfer: Transfer,
        /// Whether the receiver acknowledged success
        success: bool,
    },
    /// A reception finished
    FileReceived(Transfer),
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress { percent, message } => write!(f, "progress {percent}%: {message}"),
            Self::Log(line) => write!(f, "{line}"),
            Self::TransferComplete { transfer, success } => {
                write!(f, "transfer_complete success={success} {transfer}")
            }
            Self::FileReceived(transfer) => write!(f, "file_received {transfer}"),
        }
    }
}

/// Sink that forwards every callback into an unbounded channel.
///
/// Sending never blocks the worker. Events are dropped silently once the
/// receiving half is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: TransferEvent) {
        let _ = self.tx.send(event);
    }
}

impl TransferSink for ChannelSink {
    fn on_progress(&self, percent: u8, message: &str) {
        self.send(TransferEvent::Progress {
            percent,
            message: message.to_string(),
        });
    }

    fn on_log_line(&self, message: &str) {
        self.send(TransferEvent::Log(message.to_string()));
    }

    fn on_transfer_complete(&self, transfer: &Transfer, success: bool) {
        self.send(TransferEvent::TransferComplete {
            transfer: transfer.clone(),
            success,
        });
    }

    fn on_file_received(&self, transfer: &Transfer) {
        self.send(TransferEvent::FileReceived(transfer.clone()));
    }
}

/// Sink that writes events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TransferSink for TracingSink {
    fn on_progress(&self, percent: u8, message: &str) {
        tracing::debug!(percent, "{message}");
    }

    fn on_log_line(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn on_transfer_complete(&self, transfer: &Transfer, success: bool) {
        tracing::info!(
            file = transfer.file_name(),
            status = %transfer.status(),
            success,
            "Send finished"
        );
    }

    fn on_file_received(&self, transfer: &Transfer) {
        tracing::info!(
            file = transfer.file_name(),
            status = %transfer.status(),
            peer = %transfer.peer_label(),
            "Reception finished"
        );
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TransferSink for NullSink {
    fn on_progress(&self, _percent: u8, _message: &str) {}

    fn on_log_line(&self, _message: &str) {}

    fn on_transfer_complete(&self, _transfer: &Transfer, _success: bool) {}

    fn on_file_received(&self, _transfer: &Transfer) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::TransferDirection;

    #[tokio::test]
    async fn test_channel_sink_preserves_order() {
        let (sink, mut rx) = ChannelSink::new();
        let transfer = Transfer::new(1, "a.txt", 3, TransferDirection::Sent);

        sink.on_log_line("Connecting");
        sink.on_progress(100, "Sending: 100% (3 B/3 B)");
        sink.on_transfer_complete(&transfer, true);

        assert!(matches!(rx.recv().await, Some(TransferEvent::Log(line)) if line == "Connecting"));
        assert!(matches!(
            rx.recv().await,
            Some(TransferEvent::Progress { percent: 100, .. })
        ));
        assert!(matches!(
            rx.recv().await,
            Some(TransferEvent::TransferComplete { success: true, .. })
        ));
    }

    #[test]
    fn test_channel_sink_after_receiver_dropped() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.on_log_line("nobody listening");
    }
}

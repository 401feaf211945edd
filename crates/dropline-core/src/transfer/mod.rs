//! File transfer engine for Dropline.
//!
//! This module moves one file per TCP connection between two endpoints:
//!
//! - [`Sender`] dials a peer and streams a local file
//! - [`Receiver`] listens, accepts any number of peers and stores their files
//! - [`Transfer`] records what happened on each side
//! - [`TransferSink`] observes progress and outcomes
//!
//! ## Transfer Protocol
//!
//! - Handshake: file name, declared size, sender username
//! - Receiver answers `READY`, then exactly the declared number of bytes follow
//! - Receiver answers `SUCCESS` or `FAILED` once the bytes are stored
//!
//! The declared size is trusted: there is no checksum, so a byte-for-byte
//! substituted body of the right length is stored as a success.

pub mod events;
pub mod progress;
pub mod receiver;
pub mod record;
pub mod sender;

pub use events::{ChannelSink, NullSink, TracingSink, TransferEvent, TransferSink};
pub use progress::{ProgressTracker, ProgressUpdate};
pub use receiver::{Receiver, ReceiverConfig, ReceiverHandle, ReceiverState};
pub use record::{Transfer, TransferDirection, TransferId, TransferStatus};
pub use sender::{ResolvedPeer, SendOutcome, Sender, SenderConfig};

use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::history::TransferStore;

/// Configure TCP keep-alive on a socket.
///
/// Probing starts after 10 seconds of idle time and repeats every 5 seconds,
/// so a peer that vanished mid-transfer is noticed even while no reads are
/// pending.
///
/// # Errors
///
/// Returns an error if the socket option cannot be set.
pub(crate) fn configure_tcp_keepalive(stream: &TcpStream) -> Result<()> {
    let socket_ref = SockRef::from(stream);

    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(10))
        .with_interval(Duration::from_secs(5));

    socket_ref
        .set_tcp_keepalive(&keepalive)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    tracing::debug!("TCP keep-alive enabled on socket");
    Ok(())
}

/// Write a fresh record to the store and keep the id it hands out.
///
/// Store failures never abort a transfer; they are logged and the record
/// simply stays without an id.
pub(crate) fn record_new(store: &dyn TransferStore, transfer: &mut Transfer) {
    match store.record_transfer(transfer) {
        Ok(id) => transfer.assign_id(id),
        Err(e) => tracing::warn!(file = transfer.file_name(), error = %e, "Could not record transfer"),
    }
}

/// Push the current status of a stored record.
pub(crate) fn persist_status(store: &dyn TransferStore, transfer: &Transfer) {
    let Some(id) = transfer.id() else {
        return;
    };
    if let Err(e) = store.update_status(id, transfer.status()) {
        tracing::warn!(%id, status = %transfer.status(), error = %e, "Could not update transfer status");
    }
}

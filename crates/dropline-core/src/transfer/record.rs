//! The transfer record shared by both endpoints.
//!
//! Each side of an exchange owns its own [`Transfer`]; the sender and the
//! receiver never share one. A record moves through
//! `Pending -> InProgress -> {Completed | Failed | Cancelled}` and a terminal
//! status is never left again.

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::file::format_size;

/// Identifier assigned by a transfer store on first write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub u64);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a transfer, from the owning user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// File was sent to a peer
    Sent,
    /// File was received from a peer
    Received,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "Sent"),
            Self::Received => write!(f, "Received"),
        }
    }
}

/// Lifecycle status of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Created, handshake not yet completed
    Pending,
    /// Handshake succeeded, bytes are flowing
    InProgress,
    /// Every declared byte was delivered and acknowledged
    Completed,
    /// Transfer failed
    Failed,
    /// Transfer was cancelled
    Cancelled,
}

impl TransferStatus {
    /// Whether this status can never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a record in this status may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress | Self::Failed | Self::Cancelled)
                | (
                    Self::InProgress,
                    Self::Completed | Self::Failed | Self::Cancelled
                )
        )
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InProgress => write!(f, "In Progress"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// One file movement in one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    id: Option<TransferId>,
    user_id: i64,
    file_name: String,
    file_size: u64,
    direction: TransferDirection,
    peer_username: Option<String>,
    peer_ip: Option<IpAddr>,
    status: TransferStatus,
    file_path: PathBuf,
    created_at: DateTime<Utc>,
}

impl Transfer {
    /// Create a new pending transfer stamped with the current time.
    #[must_use]
    pub fn new(
        user_id: i64,
        file_name: impl Into<String>,
        file_size: u64,
        direction: TransferDirection,
    ) -> Self {
        Self {
            id: None,
            user_id,
            file_name: file_name.into(),
            file_size,
            direction,
            peer_username: None,
            peer_ip: None,
            status: TransferStatus::Pending,
            file_path: PathBuf::new(),
            created_at: Utc::now(),
        }
    }

    /// Create an outbound record for a local file of `file_size` bytes.
    #[must_use]
    pub fn outbound(user_id: i64, path: &Path, file_size: u64) -> Self {
        Self::new(
            user_id,
            crate::file::display_name(path),
            file_size,
            TransferDirection::Sent,
        )
        .with_file_path(path.to_path_buf())
    }

    /// Set the peer username.
    #[must_use]
    pub fn with_peer_username(mut self, username: impl Into<String>) -> Self {
        self.peer_username = Some(username.into());
        self
    }

    /// Set the peer IP address.
    #[must_use]
    pub fn with_peer_ip(mut self, ip: IpAddr) -> Self {
        self.peer_ip = Some(ip);
        self
    }

    /// Set the local file path.
    #[must_use]
    pub fn with_file_path(mut self, path: PathBuf) -> Self {
        self.file_path = path;
        self
    }

    /// Move to `next`, refusing illegal or repeated transitions.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTransition` if the move is not allowed.
    pub fn transition(&mut self, next: TransferStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Record the id handed out by a store.
    pub fn assign_id(&mut self, id: TransferId) {
        self.id = Some(id);
    }

    /// Record the peer address once it is known.
    pub fn set_peer_ip(&mut self, ip: IpAddr) {
        self.peer_ip = Some(ip);
    }

    /// Store-assigned id, if the record has been written.
    #[must_use]
    pub const fn id(&self) -> Option<TransferId> {
        self.id
    }

    /// Owning user.
    #[must_use]
    pub const fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Display file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Declared size in bytes.
    #[must_use]
    pub const fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Transfer direction.
    #[must_use]
    pub const fn direction(&self) -> TransferDirection {
        self.direction
    }

    /// Peer username, if known.
    #[must_use]
    pub fn peer_username(&self) -> Option<&str> {
        self.peer_username.as_deref()
    }

    /// Peer IP address, if known.
    #[must_use]
    pub const fn peer_ip(&self) -> Option<IpAddr> {
        self.peer_ip
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> TransferStatus {
        self.status
    }

    /// Local source or destination path.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Size formatted for display.
    #[must_use]
    pub fn formatted_size(&self) -> String {
        format_size(self.file_size)
    }

    /// Creation time formatted for display.
    #[must_use]
    pub fn formatted_timestamp(&self) -> String {
        self.created_at.format("%Y-%m-%d %H:%M").to_string()
    }

    /// Best available description of the peer.
    #[must_use]
    pub fn peer_label(&self) -> String {
        match (&self.peer_username, self.peer_ip) {
            (Some(name), Some(ip)) => format!("{name} ({ip})"),
            (Some(name), None) => name.clone(),
            (None, Some(ip)) => ip.to_string(),
            (None, None) => "unknown".to_string(),
        }
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' ({}) {} {}",
            self.direction,
            self.file_name,
            self.formatted_size(),
            self.peer_label(),
            self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Transfer {
        Transfer::new(1, "report.pdf", 1024, TransferDirection::Sent)
    }

    #[test]
    fn test_new_transfer_is_pending_without_id() {
        let transfer = pending();
        assert_eq!(transfer.status(), TransferStatus::Pending);
        assert!(transfer.id().is_none());
        assert!(transfer.peer_username().is_none());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut transfer = pending();
        transfer.transition(TransferStatus::InProgress).unwrap();
        transfer.transition(TransferStatus::Completed).unwrap();
        assert_eq!(transfer.status(), TransferStatus::Completed);
    }

    #[test]
    fn test_failure_before_handshake() {
        let mut transfer = pending();
        transfer.transition(TransferStatus::Failed).unwrap();
        assert!(transfer.status().is_terminal());
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut transfer = pending();
        transfer.transition(TransferStatus::InProgress).unwrap();
        transfer.transition(TransferStatus::Failed).unwrap();

        let err = transfer.transition(TransferStatus::Completed).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: TransferStatus::Failed,
                to: TransferStatus::Completed
            }
        ));
        assert!(transfer.transition(TransferStatus::Failed).is_err());
        assert_eq!(transfer.status(), TransferStatus::Failed);
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let mut transfer = pending();
        assert!(transfer.transition(TransferStatus::Completed).is_err());
        assert!(transfer.transition(TransferStatus::Pending).is_err());
    }

    #[test]
    fn test_created_at_survives_mutation() {
        let mut transfer = pending();
        let created = transfer.created_at();
        transfer.assign_id(TransferId(7));
        transfer.transition(TransferStatus::InProgress).unwrap();
        assert_eq!(transfer.created_at(), created);
        assert_eq!(transfer.id(), Some(TransferId(7)));
    }

    #[test]
    fn test_outbound_uses_file_name() {
        let transfer = Transfer::outbound(3, Path::new("/tmp/photos/cat.jpg"), 10);
        assert_eq!(transfer.file_name(), "cat.jpg");
        assert_eq!(transfer.direction(), TransferDirection::Sent);
        assert_eq!(transfer.file_path(), Path::new("/tmp/photos/cat.jpg"));
    }

    #[test]
    fn test_serde_roundtrip_keeps_status() {
        let mut transfer = pending()
            .with_peer_username("alice")
            .with_peer_ip("10.0.0.2".parse().unwrap());
        transfer.transition(TransferStatus::InProgress).unwrap();

        let json = serde_json::to_string(&transfer).unwrap();
        assert!(json.contains("\"in_progress\""));

        let restored: Transfer = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, transfer);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", TransferDirection::Received), "Received");
        assert_eq!(format!("{}", TransferStatus::InProgress), "In Progress");

        let transfer = pending().with_peer_username("alice");
        assert_eq!(transfer.to_string(), "Sent 'report.pdf' (1 KB) alice Pending");
    }
}

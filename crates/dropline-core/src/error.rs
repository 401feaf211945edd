//! Error types for Dropline.
//!
//! This module provides a unified error type for all Dropline operations,
//! with specific error variants for different failure modes.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::transfer::TransferStatus;

/// A specialized `Result` type for Dropline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Dropline.
#[derive(Error, Debug)]
pub enum Error {
    /// Peer refused the connection or could not be reached (E001)
    #[error("cannot connect to {addr}: {source}")]
    ConnectionFailed {
        /// The address that was dialed
        addr: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Peer host name did not resolve to any address (E002)
    #[error("cannot resolve peer address '{0}'")]
    UnresolvedAddress(String),

    /// Operation exceeded its bound (E003)
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// What was being waited on
        operation: &'static str,
        /// The bound that was exceeded
        duration: Duration,
    },

    /// Peer answered the handshake with something other than `READY` (E004)
    #[error("peer not ready to receive file: {0}")]
    HandshakeRejected(String),

    /// Stream ended before the declared size was received (E005)
    #[error("stream ended after {received} of {expected} bytes")]
    Truncated {
        /// Declared size
        expected: u64,
        /// Bytes actually read
        received: u64,
    },

    /// Peer reported that it could not store the file (E006)
    #[error("peer reported transfer failure: {0}")]
    PeerFailed(String),

    /// Invalid protocol message
    #[error("invalid protocol message: {0}")]
    ProtocolError(String),

    /// File not found
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Path exists but is not a regular file
    #[error("not a regular file: {0}")]
    NotAFile(String),

    /// Declared size does not match the file on disk
    #[error("size mismatch for '{file}': declared {declared} bytes, found {actual} bytes")]
    SizeMismatch {
        /// File path
        file: String,
        /// Size recorded in the transfer
        declared: u64,
        /// Size on disk
        actual: u64,
    },

    /// File exceeds the configured maximum size
    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge {
        /// File size
        size: u64,
        /// Configured limit
        limit: u64,
    },

    /// Invalid user input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Illegal status change on a transfer record
    #[error("invalid transfer transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: TransferStatus,
        /// Requested status
        to: TransferStatus,
    },

    /// Transfer store failure
    #[error("transfer store error: {0}")]
    StoreError(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of transfer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Refused, unreachable or unresolvable peer
    Connection,
    /// Connect or read bound exceeded
    Timeout,
    /// Unrecognized acknowledgment or truncated stream
    Protocol,
    /// Local disk or socket read/write failure
    Io,
    /// Socket operation interrupted
    Interrupted,
    /// Everything else (validation, configuration, store)
    Other,
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::ConnectionFailed { .. } => Some("E001"),
            Self::UnresolvedAddress(_) => Some("E002"),
            Self::Timeout { .. } => Some("E003"),
            Self::HandshakeRejected(_) => Some("E004"),
            Self::Truncated { .. } => Some("E005"),
            Self::PeerFailed(_) => Some("E006"),
            _ => None,
        }
    }

    /// Classify this error into the transfer failure taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionFailed { .. } | Self::UnresolvedAddress(_) => ErrorKind::Connection,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::HandshakeRejected(_)
            | Self::Truncated { .. }
            | Self::PeerFailed(_)
            | Self::ProtocolError(_) => ErrorKind::Protocol,
            Self::Io(e) => match e.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::Timeout,
                io::ErrorKind::Interrupted => ErrorKind::Interrupted,
                io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe => ErrorKind::Connection,
                io::ErrorKind::UnexpectedEof => ErrorKind::Protocol,
                _ => ErrorKind::Io,
            },
            _ => ErrorKind::Other,
        }
    }

    /// Build a timeout error for the named operation.
    #[must_use]
    pub const fn timeout(operation: &'static str, duration: Duration) -> Self {
        Self::Timeout {
            operation,
            duration,
        }
    }
}

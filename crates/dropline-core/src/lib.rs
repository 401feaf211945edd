//! # Dropline Core Library
//!
//! `dropline-core` moves single files between two machines over a direct
//! TCP connection.
//!
//! ## Features
//!
//! - **Direct transfers**: one connection per file, no relay or discovery
//! - **Concurrent receiving**: any number of peers can deliver at once
//! - **Collision-free storage**: clashing names become `name_1.ext`, `name_2.ext`, ...
//! - **Progress reporting**: whole-percent events through a pluggable sink
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`connection`] - Peer address parsing
//! - [`error`] - Error type and failure classification
//! - [`mod@file`] - Size formatting, validation and destination files
//! - [`history`] - Transfer record stores
//! - [`protocol`] - Handshake and acknowledgment wire format
//! - [`transfer`] - Sender and receiver endpoints
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dropline_core::history::MemoryStore;
//! use dropline_core::transfer::{Receiver, ReceiverConfig, Sender, SenderConfig, TracingSink, Transfer};
//!
//! let store = Arc::new(MemoryStore::new());
//! let receiver = Receiver::bind(ReceiverConfig::default(), store.clone(), Arc::new(TracingSink)).await?;
//! let handle = receiver.start();
//!
//! let sender = Sender::new(SenderConfig::default(), store, Arc::new(TracingSink));
//! let mut transfer = Transfer::outbound(1, "report.pdf".as_ref(), 2048);
//! let ok = sender.send("report.pdf".as_ref(), "127.0.0.1", 8888, &mut transfer).await;
//! handle.stop().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

use std::time::Duration;

pub mod config;
pub mod connection;
pub mod error;
pub mod file;
pub mod history;
pub mod protocol;
pub mod transfer;

pub use error::{Error, ErrorKind, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default listening port (TCP)
pub const DEFAULT_PORT: u16 = 8888;

/// Default bound on establishing a connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on each read from a peer
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default chunk size for streaming file bytes (8 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Default largest file accepted or sent (1 GiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Default directory for received files
pub const DEFAULT_STORAGE_DIR: &str = "downloads";

/// The sender yields to the runtime after this many buffers
pub const PACING_INTERVAL_BUFFERS: u64 = 10;

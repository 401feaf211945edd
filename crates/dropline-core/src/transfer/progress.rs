//! Percentage tracking for streamed file bytes.

use crate::file::format_size;

use super::record::TransferDirection;

/// A progress value ready to hand to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Whole percentage in `0..=100`
    pub percent: u8,
    /// Human-readable message, e.g. `Sending: 42% (1.2 KB/3 KB)`
    pub message: String,
}

/// Integer percentage of `done` out of `total`, floored and capped at 100.
///
/// An empty transfer is complete by definition.
#[must_use]
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let value = (u128::from(done) * 100) / u128::from(total);
    u8::try_from(value.min(100)).unwrap_or(100)
}

/// Tracks bytes moved and yields an update only when the percentage changes.
#[derive(Debug)]
pub struct ProgressTracker {
    direction: TransferDirection,
    total: u64,
    done: u64,
    last_percent: Option<u8>,
}

impl ProgressTracker {
    /// Start tracking a transfer of `total` bytes.
    #[must_use]
    pub const fn new(direction: TransferDirection, total: u64) -> Self {
        Self {
            direction,
            total,
            done: 0,
            last_percent: None,
        }
    }

    /// Treat `percent` as already reported, so it is not emitted again.
    #[must_use]
    pub const fn with_emitted(mut self, percent: u8) -> Self {
        self.last_percent = Some(percent);
        self
    }

    /// Bytes moved so far.
    #[must_use]
    pub const fn done(&self) -> u64 {
        self.done
    }

    /// Account for `bytes` more bytes.
    pub fn advance(&mut self, bytes: u64) -> Option<ProgressUpdate> {
        self.done = self.done.saturating_add(bytes);
        self.emit(percent(self.done, self.total))
    }

    /// Emit 100% if it has not been emitted yet.
    pub fn finish(&mut self) -> Option<ProgressUpdate> {
        self.emit(100)
    }

    fn emit(&mut self, value: u8) -> Option<ProgressUpdate> {
        if self.last_percent.is_some_and(|last| value <= last) {
            return None;
        }
        self.last_percent = Some(value);
        Some(ProgressUpdate {
            percent: value,
            message: self.message(value),
        })
    }

    fn message(&self, value: u8) -> String {
        let verb = match self.direction {
            TransferDirection::Sent => "Sending",
            TransferDirection::Received => "Receiving",
        };
        format!(
            "{verb}: {value}% ({}/{})",
            format_size(self.done.min(self.total)),
            format_size(self.total)
        )
    }
}

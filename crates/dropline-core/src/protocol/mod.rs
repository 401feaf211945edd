//! Dropline wire protocol implementation.
//!
//! One connection carries exactly one file. There is no protocol version
//! negotiation and no framing around the file bytes themselves.
//!
//! ## Primitives
//!
//! ```text
//! text := length (u16, big-endian) || UTF-8 bytes
//! u64  := 8 bytes, big-endian
//! ```
//!
//! ## Exchange
//!
//! ```text
//! Sender -> Receiver   fileName (text) | fileSize (u64) | senderUsername (text)
//! Receiver -> Sender   "READY" (text)              or close to reject
//! Sender -> Receiver   fileSize raw bytes
//! Receiver -> Sender   "SUCCESS" | "FAILED" (text)
//! ```

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Maximum encoded length of a text field in bytes.
pub const MAX_TEXT_LEN: usize = u16::MAX as usize;

/// Acknowledgment tokens exchanged as text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Receiver accepted the handshake and is ready for file bytes
    Ready,
    /// Receiver stored every declared byte
    Success,
    /// Receiver could not store the file
    Failed,
}

impl Ack {
    /// The literal token sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// Parse a token received from the wire. Matching is exact.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "READY" => Some(Self::Ready),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed three-field preamble sent before the file bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Display name of the file
    pub file_name: String,
    /// Declared size in bytes; the receiver reads exactly this many
    pub file_size: u64,
    /// Username of the sending user
    pub sender_username: String,
}

impl Handshake {
    /// Write the handshake fields in order and flush.
    ///
    /// # Errors
    ///
    /// Returns an error if a text field is too long or writing fails.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWriteExt + Unpin,
    {
        write_text(writer, &self.file_name).await?;
        writer.write_u64(self.file_size).await?;
        write_text(writer, &self.sender_username).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read the handshake fields in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream ends early or a text field is not UTF-8.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncReadExt + Unpin,
    {
        let file_name = read_text(reader).await?;
        let file_size = reader.read_u64().await?;
        let sender_username = read_text(reader).await?;

        Ok(Self {
            file_name,
            file_size,
            sender_username,
        })
    }

    /// Read the handshake, bounded by `duration`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if the peer does not deliver all three fields in time.
    pub async fn read_with_timeout<R>(reader: &mut R, duration: Duration) -> Result<Self>
    where
        R: AsyncReadExt + Unpin,
    {
        timeout(duration, Self::read_from(reader))
            .await
            .map_err(|_| Error::timeout("handshake", duration))?
    }
}

/// Write a length-prefixed text field. Does not flush.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if the text exceeds [`MAX_TEXT_LEN`] bytes.
pub async fn write_text<W>(writer: &mut W, text: &str) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let len = u16::try_from(text.len()).map_err(|_| {
        Error::InvalidInput(format!(
            "text field of {} bytes exceeds {MAX_TEXT_LEN} bytes",
            text.len()
        ))
    })?;

    writer.write_u16(len).await?;
    writer.write_all(text.as_bytes()).await?;
    Ok(())
}

/// Read a length-prefixed text field.
///
/// # Errors
///
/// Returns an error if the stream ends early or the bytes are not UTF-8.
pub async fn read_text<R>(reader: &mut R) -> Result<String>
where
    R: AsyncReadExt + Unpin,
{
    let len = reader.read_u16().await? as usize;
    let mut buf = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut buf).await?;
    }

    String::from_utf8(buf).map_err(|e| Error::ProtocolError(format!("text field is not UTF-8: {e}")))
}

/// Read a text field, bounded by `duration`.
///
/// # Errors
///
/// Returns `Error::Timeout` naming `operation` if nothing arrives in time.
pub async fn read_text_with_timeout<R>(
    reader: &mut R,
    duration: Duration,
    operation: &'static str,
) -> Result<String>
where
    R: AsyncReadExt + Unpin,
{
    timeout(duration, read_text(reader))
        .await
        .map_err(|_| Error::timeout(operation, duration))?
}

/// Write an acknowledgment token and flush.
///
/// # Errors
///
/// Returns an error if writing fails.
pub async fn write_ack<W>(writer: &mut W, ack: Ack) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    write_text(writer, ack.as_str()).await?;
    writer.flush().await?;
    Ok(())
}

//! Transport layer between the host (DTE) and the modem (DCE)
//!
//! The protocol engine only needs two things from a transport:
//! - a way to write command bytes (and to switch the link baud rate)
//! - a channel of received text lines, one entry per modem line
//!
//! Implementations:
//! - [`SerialTransport`] for real hardware
//! - [`crate::core::simulator::SimulatedModem`] for tests and dry runs

mod serial;

pub use serial::{list_ports, SerialConfig, SerialFlowControl, SerialTransport};

use async_trait::async_trait;
use bytes::BytesMut;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// Receiving end of the line-delivery channel
pub type LineReceiver = mpsc::UnboundedReceiver<String>;

/// Sending end of the line-delivery channel
pub type LineSender = mpsc::UnboundedSender<String>;

/// Create a new line-delivery channel
pub fn line_channel() -> (LineSender, LineReceiver) {
    mpsc::unbounded_channel()
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Baud rate could not be applied
    #[error("Failed to set baud rate {rate}: {reason}")]
    BaudRate {
        /// Requested rate
        rate: u32,
        /// Underlying cause
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Link is gone (port closed or line channel dropped)
    #[error("Disconnected")]
    Disconnected,
}

/// Byte-level link to a modem
#[async_trait]
pub trait TransportTrait: Send {
    /// Write raw bytes to the modem
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Switch the host side of the link to a new baud rate
    async fn change_baud_rate(&mut self, rate: u32) -> Result<(), TransportError>;

    /// Human-readable description of the link
    fn connection_info(&self) -> String;

    /// Release the link. Further sends fail with [`TransportError::Disconnected`].
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Longest line kept; anything longer is line noise and gets discarded
pub const MAX_LINE_LENGTH: usize = 1024;

/// Incremental splitter turning raw modem bytes into text lines.
///
/// Empty lines (the blank line a modem emits before most responses) are
/// dropped, as are lines that are not valid UTF-8 and lines longer than
/// [`MAX_LINE_LENGTH`].
#[derive(Debug)]
pub struct LineSplitter {
    codec: LinesCodec,
    buffer: BytesMut,
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self {
            codec: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
            buffer: BytesMut::new(),
        }
    }
}

impl LineSplitter {
    /// Create an empty splitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        loop {
            match self.codec.decode(&mut self.buffer) {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        lines.push(trimmed.to_string());
                    }
                }
                Ok(None) => break,
                // The codec skips ahead to the next newline itself
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    tracing::warn!("Dropping line longer than {} bytes", MAX_LINE_LENGTH);
                }
                Err(e) => {
                    tracing::warn!("Dropping undecodable line: {}", e);
                }
            }
        }
        lines
    }

    /// Bytes buffered without a line terminator yet
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

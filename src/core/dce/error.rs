//! Error types of the command engine

use crate::core::persist::PersistError;
use crate::core::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Failure of a command or high-level operation
#[derive(Error, Debug)]
pub enum DceError {
    /// No terminal line arrived within the bound
    #[error("{command}: no final result within {timeout:?}")]
    Timeout {
        /// Command text
        command: String,
        /// Bound that elapsed
        timeout: Duration,
    },

    /// The modem answered with an error marker
    #[error("{command}: rejected by modem")]
    Rejected {
        /// Command text
        command: String,
    },

    /// The command succeeded but the data line the caller needs never came
    #[error("{command}: completed without a data line")]
    MissingResponse {
        /// Command text
        command: String,
    },

    /// Writing to the link failed, or the link is gone
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The negotiated baud rate could not be read or stored
    #[error("Persistence failure: {0}")]
    Persistence(#[from] PersistError),
}

impl DceError {
    /// Whether the error was a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the modem explicitly rejected the command
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// A recognized response line whose fields could not be extracted.
///
/// Never escapes a dispatcher: the line is ignored and the command is
/// resolved by its terminal marker or by the timeout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Line does not carry the expected response tag
    #[error("expected {expected} in {line:?}")]
    UnexpectedPrefix {
        /// Expected tag
        expected: &'static str,
        /// Offending line
        line: String,
    },

    /// Field at `index` is absent
    #[error("missing field {index} in {line:?}")]
    MissingField {
        /// Zero-based field index
        index: usize,
        /// Offending line
        line: String,
    },

    /// Field is present but unparsable
    #[error("invalid field {field:?} in {line:?}")]
    InvalidField {
        /// Raw field text
        field: String,
        /// Offending line
        line: String,
    },

    /// Line too short to be a data line
    #[error("line too short to carry data: {0:?}")]
    TooShort(String),
}

//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::dce::{DceError, ProvisionError};
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Serial link could not be opened or broke
    pub const TRANSPORT_FAILED: u8 = 3;

    /// Modem did not answer in time
    pub const TIMEOUT: u8 = 4;

    /// Modem answered ERROR
    pub const REJECTED: u8 = 5;

    /// Modem answered but the response was incomplete
    pub const BAD_RESPONSE: u8 = 6;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Bring-up sequence failed
    pub const PROVISIONING_FAILED: u8 = 9;

    /// State file could not be read or written
    pub const STATE_ERROR: u8 = 10;

    /// User cancelled
    pub const CANCELLED: u8 = 11;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message for the user
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Exit code for a transport failure
pub fn transport_exit_code(err: &TransportError) -> u8 {
    match err {
        TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
        TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
        _ => ExitCodes::TRANSPORT_FAILED,
    }
}

/// Exit code for a command failure
pub fn dce_exit_code(err: &DceError) -> u8 {
    match err {
        DceError::Timeout { .. } => ExitCodes::TIMEOUT,
        DceError::Rejected { .. } => ExitCodes::REJECTED,
        DceError::MissingResponse { .. } => ExitCodes::BAD_RESPONSE,
        DceError::Transport(e) => transport_exit_code(e),
        DceError::Persistence(_) => ExitCodes::STATE_ERROR,
    }
}

impl From<&TransportError> for CliResult {
    fn from(err: &TransportError) -> Self {
        Self::Error(transport_exit_code(err), err.to_string())
    }
}

impl From<&DceError> for CliResult {
    fn from(err: &DceError) -> Self {
        Self::Error(dce_exit_code(err), err.to_string())
    }
}

impl From<&ProvisionError> for CliResult {
    fn from(err: &ProvisionError) -> Self {
        let code = match &err.source {
            DceError::Transport(e) => transport_exit_code(e),
            _ => ExitCodes::PROVISIONING_FAILED,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<&ConfigError> for CliResult {
    fn from(err: &ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

impl From<&anyhow::Error> for CliResult {
    /// Map the first recognized error in the chain
    fn from(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            let code = if let Some(e) = cause.downcast_ref::<ProvisionError>() {
                Self::from(e).code()
            } else if let Some(e) = cause.downcast_ref::<DceError>() {
                dce_exit_code(e)
            } else if let Some(e) = cause.downcast_ref::<TransportError>() {
                transport_exit_code(e)
            } else if cause.is::<ConfigError>() {
                ExitCodes::CONFIG_ERROR
            } else {
                continue;
            };
            return Self::Error(code, format!("{err:#}"));
        }
        Self::Error(ExitCodes::ERROR, format!("{err:#}"))
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Serial link failed",
        4 => "Modem timeout",
        5 => "Command rejected by modem",
        6 => "Incomplete modem response",
        7 => "Permission denied",
        8 => "Configuration error",
        9 => "Provisioning failed",
        10 => "State file error",
        11 => "Operation cancelled",
        14 => "Port not found",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 14] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dce::ProvisionStep;
    use std::time::Duration;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success_with_message("done");
        assert!(success.is_success());
        assert_eq!(success.code(), 0);
        assert_eq!(success.message(), Some("done"));

        let error = CliResult::error(ExitCodes::TIMEOUT, "no answer");
        assert!(!error.is_success());
        assert_eq!(error.code(), 4);
    }

    #[test]
    fn test_from_dce_error() {
        let timeout = DceError::Timeout {
            command: "AT+CSQ".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(CliResult::from(&timeout).code(), ExitCodes::TIMEOUT);

        let rejected = DceError::Rejected {
            command: "AT+CSQ".to_string(),
        };
        assert_eq!(CliResult::from(&rejected).code(), ExitCodes::REJECTED);

        let missing = DceError::Transport(TransportError::PortNotFound("/dev/ttyUSB9".to_string()));
        assert_eq!(CliResult::from(&missing).code(), ExitCodes::PORT_NOT_FOUND);
    }

    #[test]
    fn test_from_provision_error() {
        let err = ProvisionError {
            step: ProvisionStep::Sync,
            source: DceError::Timeout {
                command: "AT".to_string(),
                timeout: Duration::from_millis(300),
            },
        };
        assert_eq!(CliResult::from(&err).code(), ExitCodes::PROVISIONING_FAILED);
    }

    #[test]
    fn test_from_anyhow_chain() {
        let err = anyhow::Error::new(DceError::Rejected {
            command: "AT+QCFG=\"band\"".to_string(),
        })
        .context("band query");
        let result = CliResult::from(&err);
        assert_eq!(result.code(), ExitCodes::REJECTED);
        assert!(result.message().is_some_and(|m| m.starts_with("band query")));

        let other = anyhow::anyhow!("something else");
        assert_eq!(CliResult::from(&other).code(), ExitCodes::ERROR);
    }
}

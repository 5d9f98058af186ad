//! # Modemctl Core Library
//!
//! Host-side driver for AT-command cellular modems (Quectel EC2x family)
//! attached over a serial link.
//!
//! ## Features
//!
//! - One-command-at-a-time execution with per-command response dispatchers
//! - Unsolicited result code handling with broadcast notifications
//! - Command/data (PPP) mode transitions with escape and fallback
//! - Vendor queries: signal, battery, SIM, registration, bands, roaming
//! - Bring-up sequence with baud rate renegotiation and persistence
//! - Simulated modem for tests and dry runs
//! - CLI with exit codes and JSON output
//!
//! ## Example
//!
//! ```rust,no_run
//! use modemctl_core::{Dce, SerialConfig, SerialTransport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (transport, lines) = SerialTransport::open(SerialConfig::new("/dev/ttyUSB2", 115_200))?;
//!     let mut dce = Dce::bind(transport, lines);
//!
//!     dce.sync().await?;
//!     let signal = dce.get_signal_quality().await?;
//!     println!("RSSI {:?} dBm", signal.rssi_dbm());
//!
//!     dce.deinit().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError, LoggingConfig};
pub use crate::core::dce::{
    BaudStatus, Dce, DceError, Identity, ProvisionConfig, ProvisionError, ProvisionReport, SimStatus,
    UnsolicitedEvent, WorkingMode,
};
pub use crate::core::logger::{init_tracing, LogFormat};
pub use crate::core::persist::{BaudRateStore, FileBaudRateStore, MemoryBaudRateStore};
pub use crate::core::simulator::SimulatedModem;
pub use crate::core::transport::{SerialConfig, SerialFlowControl, SerialTransport, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

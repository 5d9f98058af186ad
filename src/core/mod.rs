//! Core module containing the modem driver
//!
//! This module provides:
//! - Transport layer delivering modem output as lines (serial port)
//! - The DCE command engine: dispatchers, parsers, mode changes, provisioning
//! - Baud rate persistence
//! - A scriptable simulated modem
//! - Tracing setup

pub mod dce;
pub mod logger;
pub mod persist;
pub mod simulator;
pub mod transport;

pub use dce::{Dce, DceError, UnsolicitedEvent, WorkingMode};
pub use persist::{BaudRateStore, FileBaudRateStore, MemoryBaudRateStore};
pub use simulator::SimulatedModem;
pub use transport::{SerialConfig, SerialTransport, TransportError, TransportTrait};

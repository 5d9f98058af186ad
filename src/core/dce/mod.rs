//! Modem command engine (DCE side of the link)
//!
//! A [`Dce`] owns one transport, the line channel it feeds, and the
//! [`DeviceState`] of the modem behind it. Every operation that talks to the
//! modem takes `&mut self`, so at most one command is ever in flight.
//!
//! Lines received by the transport wait in the channel and are interpreted
//! on the caller's task by whichever [`Dispatcher`] is installed.

mod command;
mod dispatcher;
mod error;
mod executor;
mod mode;
mod operations;
mod parsers;
mod provision;
mod state;
mod unsolicited;

pub use command::{AtCommand, CommandTimeouts, DtrMode};
pub use dispatcher::{Completion, Dispatch, Dispatcher, ResultCode};
pub use error::{DceError, ParseError};
pub use parsers::{
    BandConfig, BatteryStatus, LteBand, NetworkInfo, OperatorSelection, RegistrationStatus, SignalQuality,
    BAND7_LTE_MASK, SUPPORTED_LTE_BANDS,
};
pub use provision::{ProvisionConfig, ProvisionError, ProvisionReport, ProvisionStep};
pub use state::{
    AuxSlot, BaudStatus, CommandOutcome, DeviceState, Identity, SimStatus, WorkingMode, IMEI_LENGTH, IMSI_LENGTH,
    MAX_NAME_LENGTH, MAX_OPERATOR_LENGTH,
};
pub use unsolicited::UnsolicitedEvent;

/// Raw command strings and response parsers, for tooling and benchmarks
pub mod protocol {
    pub use super::command::*;
    pub use super::parsers::*;
}

use crate::core::transport::{LineReceiver, TransportTrait};
use tokio::sync::broadcast;

/// Capacity of the unsolicited event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Handle to one bound modem
pub struct Dce {
    transport: Box<dyn TransportTrait>,
    lines: LineReceiver,
    state: DeviceState,
    timeouts: CommandTimeouts,
    events: broadcast::Sender<UnsolicitedEvent>,
}

impl Dce {
    /// Bind a transport and the line channel it feeds.
    ///
    /// The unsolicited dispatcher is installed before any line is read.
    pub fn bind<T>(transport: T, lines: LineReceiver) -> Self
    where
        T: TransportTrait + 'static,
    {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        tracing::debug!("Bound modem on {}", transport.connection_info());

        Self {
            transport: Box::new(transport),
            lines,
            state: DeviceState::new(),
            timeouts: CommandTimeouts::default(),
            events,
        }
    }

    /// Replace the per-command timeouts
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: CommandTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Per-command timeouts in use
    pub fn timeouts(&self) -> &CommandTimeouts {
        &self.timeouts
    }

    /// Device state
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Module identity collected so far
    pub fn identity(&self) -> &Identity {
        self.state.identity()
    }

    /// Current working mode
    pub fn mode(&self) -> WorkingMode {
        self.state.mode()
    }

    /// Last known SIM state
    pub fn sim_status(&self) -> SimStatus {
        self.state.sim_status()
    }

    /// Baud synchronization state
    pub fn baud_status(&self) -> BaudStatus {
        self.state.baud_status()
    }

    /// Transport description
    pub fn connection_info(&self) -> String {
        self.transport.connection_info()
    }

    /// Subscribe to unsolicited notifications
    pub fn subscribe(&self) -> broadcast::Receiver<UnsolicitedEvent> {
        self.events.subscribe()
    }

    /// Release the modem and close the transport
    pub async fn deinit(mut self) -> Result<(), DceError> {
        tracing::debug!("Releasing modem on {}", self.transport.connection_info());
        self.lines.close();
        self.transport.close().await?;
        Ok(())
    }
}

impl std::fmt::Debug for Dce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dce")
            .field("transport", &self.transport.connection_info())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

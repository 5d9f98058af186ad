//! Device state owned by a bound modem
//!
//! All mutation happens on the task that owns the [`Dce`](super::Dce):
//! response lines are fed through [`DeviceState::dispatch`] by the executor,
//! never from the reader thread.

use super::dispatcher::{Completion, Dispatch, Dispatcher};
use super::parsers::{BandConfig, BatteryStatus, NetworkInfo, OperatorSelection, RegistrationStatus, SignalQuality};
use super::unsolicited::UnsolicitedEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum stored length of the module name
pub const MAX_NAME_LENGTH: usize = 32;
/// Maximum stored length of the operator name
pub const MAX_OPERATOR_LENGTH: usize = 32;
/// IMEI length
pub const IMEI_LENGTH: usize = 15;
/// Maximum IMSI length
pub const IMSI_LENGTH: usize = 15;

/// Whether the link carries AT commands or PPP traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkingMode {
    /// AT command interpreter
    #[default]
    Command,
    /// Transparent data (PPP)
    Data,
}

impl fmt::Display for WorkingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => f.write_str("command"),
            Self::Data => f.write_str("data"),
        }
    }
}

impl std::str::FromStr for WorkingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "command" | "cmd" => Ok(Self::Command),
            "data" | "ppp" => Ok(Self::Data),
            other => Err(format!("unknown working mode: {other}")),
        }
    }
}

/// SIM card state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimStatus {
    /// Not queried yet, or an unrecognized answer
    #[default]
    Unknown,
    /// Ready for use
    Ready,
    /// Waiting for the PIN
    PinRequired,
    /// Waiting for the PUK
    PukRequired,
    /// No SIM present
    NotInserted,
}

impl fmt::Display for SimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unknown => "unknown",
            Self::Ready => "ready",
            Self::PinRequired => "PIN required",
            Self::PukRequired => "PUK required",
            Self::NotInserted => "not inserted",
        };
        f.write_str(text)
    }
}

/// Whether the modem is known to be talking at the host's baud rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaudStatus {
    /// Nothing received yet
    #[default]
    Unknown,
    /// A well-formed line arrived
    Confirmed,
    /// Synchronization was attempted and failed
    Failed,
}

/// Resolution of the command in flight (or the last one)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandOutcome {
    /// Waiting for a terminal line
    #[default]
    Pending,
    /// Terminal success line seen
    Success,
    /// Terminal failure line seen
    Failure,
}

/// Identity of the module and its network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Module model (e.g. `EC21`)
    pub name: String,
    /// IMEI
    pub imei: String,
    /// IMSI of the inserted SIM
    pub imsi: String,
    /// Selected operator, empty when none
    pub operator: String,
}

/// Staging slot for values a dispatcher extracts on behalf of a caller.
///
/// Filled by the dispatcher, read by the caller only after the command
/// completes successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuxSlot {
    /// Nothing staged
    #[default]
    Empty,
    /// `+CSQ`
    Signal(SignalQuality),
    /// `+CBC`
    Battery(BatteryStatus),
    /// Module name, IMEI or IMSI
    Text(String),
    /// `+COPS`
    Operator(OperatorSelection),
    /// `+CREG`
    Registration(RegistrationStatus),
    /// `+QCFG: "band"`
    Band(BandConfig),
    /// `+QCFG: "fast/poweroff"`
    FastPowerOff(bool),
    /// `+QNWINFO`
    Network(NetworkInfo),
}

/// Mutable state of a bound modem
#[derive(Debug, Default)]
pub struct DeviceState {
    identity: Identity,
    mode: WorkingMode,
    sim_status: SimStatus,
    baud_status: BaudStatus,
    outcome: CommandOutcome,
    dispatcher: Dispatcher,
    aux: AuxSlot,
    events: Vec<UnsolicitedEvent>,
}

impl DeviceState {
    /// Fresh state: command mode, unsolicited dispatcher installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Module identity
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Current working mode
    pub fn mode(&self) -> WorkingMode {
        self.mode
    }

    /// SIM state
    pub fn sim_status(&self) -> SimStatus {
        self.sim_status
    }

    /// Baud synchronization state
    pub fn baud_status(&self) -> BaudStatus {
        self.baud_status
    }

    /// Outcome of the command in flight, or of the last one
    pub fn outcome(&self) -> CommandOutcome {
        self.outcome
    }

    /// Dispatcher that receives the next line
    pub fn active_dispatcher(&self) -> Dispatcher {
        self.dispatcher
    }

    /// Route one line to the active dispatcher and record a completion
    pub fn dispatch(&mut self, line: &str) -> Dispatch {
        let dispatcher = self.dispatcher;
        let result = dispatcher.interpret(line, self);
        if let Dispatch::Completed(completion) = result {
            self.outcome = match completion {
                Completion::Success => CommandOutcome::Success,
                Completion::Failure => CommandOutcome::Failure,
            };
        }
        result
    }

    pub(crate) fn begin(&mut self, dispatcher: Dispatcher) {
        self.dispatcher = dispatcher;
        self.outcome = CommandOutcome::Pending;
        self.aux = AuxSlot::Empty;
    }

    pub(crate) fn finish(&mut self) {
        self.dispatcher = Dispatcher::Unsolicited;
    }

    pub(crate) fn set_mode(&mut self, mode: WorkingMode) {
        self.mode = mode;
    }

    pub(crate) fn set_sim_status(&mut self, status: SimStatus) {
        self.sim_status = status;
    }

    pub(crate) fn set_baud_status(&mut self, status: BaudStatus) {
        self.baud_status = status;
    }

    pub(crate) fn stage(&mut self, value: AuxSlot) {
        self.aux = value;
    }

    /// Staged value, only once the command has succeeded
    pub(crate) fn take_aux(&mut self) -> AuxSlot {
        if self.outcome == CommandOutcome::Success {
            std::mem::take(&mut self.aux)
        } else {
            AuxSlot::Empty
        }
    }

    pub(crate) fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }

    pub(crate) fn push_event(&mut self, event: UnsolicitedEvent) {
        self.events.push(event);
    }

    pub(crate) fn drain_events(&mut self) -> Vec<UnsolicitedEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_idle() {
        let state = DeviceState::new();
        assert_eq!(state.mode(), WorkingMode::Command);
        assert_eq!(state.active_dispatcher(), Dispatcher::Unsolicited);
        assert_eq!(state.sim_status(), SimStatus::Unknown);
        assert_eq!(state.baud_status(), BaudStatus::Unknown);
    }

    #[test]
    fn test_aux_withheld_until_success() {
        let mut state = DeviceState::new();
        state.begin(Dispatcher::SignalQuality);
        state.dispatch("+CSQ: 23,99");
        assert_eq!(state.outcome(), CommandOutcome::Pending);
        assert_eq!(state.take_aux(), AuxSlot::Empty);

        state.begin(Dispatcher::SignalQuality);
        state.dispatch("+CSQ: 23,99");
        state.dispatch("OK");
        assert_eq!(state.outcome(), CommandOutcome::Success);
        assert_eq!(
            state.take_aux(),
            AuxSlot::Signal(SignalQuality { rssi: 23, ber: 99 })
        );
    }

    #[test]
    fn test_begin_clears_previous_outcome() {
        let mut state = DeviceState::new();
        state.begin(Dispatcher::Generic);
        state.dispatch("ERROR");
        assert_eq!(state.outcome(), CommandOutcome::Failure);

        state.begin(Dispatcher::Generic);
        assert_eq!(state.outcome(), CommandOutcome::Pending);
        state.finish();
        assert_eq!(state.active_dispatcher(), Dispatcher::Unsolicited);
    }

    #[test]
    fn test_working_mode_from_str() {
        assert_eq!("data".parse::<WorkingMode>(), Ok(WorkingMode::Data));
        assert_eq!("CMD".parse::<WorkingMode>(), Ok(WorkingMode::Command));
        assert!("voice".parse::<WorkingMode>().is_err());
    }
}

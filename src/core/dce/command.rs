//! AT command catalogue and per-command timeouts

use crate::core::transport::SerialFlowControl;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Terminator appended to every non-raw command
pub const COMMAND_TERMINATOR: &str = "\r";

/// Escape sequence leaving data mode
pub const ESCAPE_SEQUENCE: &str = "+++";

/// Liveness check
pub const SYNC: &str = "AT";
/// Restore factory settings
pub const FACTORY_RESET: &str = "AT&F";
/// Store the active profile
pub const STORE_PROFILE: &str = "AT&W";
/// Disable command echo
pub const ECHO_OFF: &str = "ATE0";
/// Enable command echo
pub const ECHO_ON: &str = "ATE1";
/// Hang up the current call
pub const HANG_UP: &str = "ATH";
/// Answer an incoming call
pub const ANSWER: &str = "ATA";
/// Dial the default PDP context for PPP
pub const DIAL_PPP: &str = "ATD*99***1#";
/// Resume a data call that is still up
pub const RESUME_DATA: &str = "ATO";
/// Query signal quality
pub const SIGNAL_QUALITY: &str = "AT+CSQ";
/// Query battery charge
pub const BATTERY_STATUS: &str = "AT+CBC";
/// Query module model
pub const MODULE_NAME: &str = "AT+CGMM";
/// Query IMEI
pub const IMEI: &str = "AT+CGSN";
/// Query IMSI
pub const IMSI: &str = "AT+CIMI";
/// Query SIM PIN state
pub const SIM_STATUS: &str = "AT+CPIN?";
/// Query selected operator
pub const OPERATOR: &str = "AT+COPS?";
/// Query network registration
pub const REGISTRATION: &str = "AT+CREG?";
/// Query serving cell information (Quectel)
pub const NETWORK_INFO: &str = "AT+QNWINFO";
/// Query band configuration (Quectel)
pub const BAND_CONFIG: &str = "AT+QCFG=\"band\"";
/// Enable fast power-off on the power key (Quectel)
pub const FAST_POWEROFF_ON: &str = "AT+QCFG=\"fast/poweroff\",1";
/// Query fast power-off state (Quectel)
pub const FAST_POWEROFF_STATE: &str = "AT+QCFG=\"fast/poweroff\"";
/// Roaming in automatic mode (Quectel)
pub const ROAMING_AUTO: &str = "AT+QCFG=\"roamservice\",255,1";
/// Roaming disabled (Quectel)
pub const ROAMING_OFF: &str = "AT+QCFG=\"roamservice\",1,1";
/// Normal power-down (Quectel)
pub const POWER_DOWN: &str = "AT+QPOWD=1";
/// Immediate power-down (Quectel)
pub const FAST_POWER_DOWN: &str = "AT+QPOWD=0";

/// One command line to write to the modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCommand {
    text: String,
    terminated: bool,
}

impl AtCommand {
    /// Command followed by the line terminator
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            terminated: true,
        }
    }

    /// Command written verbatim, without terminator (escape sequences)
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            terminated: false,
        }
    }

    /// Command text without terminator
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Bytes as written on the wire
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.text.as_bytes().to_vec();
        if self.terminated {
            bytes.extend_from_slice(COMMAND_TERMINATOR.as_bytes());
        }
        bytes
    }

    /// `AT+IPR=<rate>`
    pub fn set_baud_rate(rate: u32) -> Self {
        Self::new(format!("AT+IPR={rate}"))
    }

    /// `AT&D<mode>`
    pub fn set_dtr_mode(mode: DtrMode) -> Self {
        Self::new(format!("AT&D{}", mode as u8))
    }

    /// `AT+IFC=<dce_by_dte>,<dte_by_dce>`
    pub fn set_flow_control(host: SerialFlowControl, modem: SerialFlowControl) -> Self {
        Self::new(format!("AT+IFC={},{}", flow_code(host), flow_code(modem)))
    }

    /// `AT+CGDCONT=<cid>,"<type>","<apn>"`
    pub fn define_pdp_context(cid: u32, pdp_type: &str, apn: &str) -> Self {
        Self::new(format!("AT+CGDCONT={cid},\"{pdp_type}\",\"{apn}\""))
    }

    /// `ATS0=<rings>`
    pub fn set_auto_answer(rings: u32) -> Self {
        Self::new(format!("ATS0={rings}"))
    }

    /// `AT+QCFG="band",0,<lte mask>,0,1`
    pub fn set_lte_bands(lte_mask: u64) -> Self {
        Self::new(format!("AT+QCFG=\"band\",0,{lte_mask:x},0,1"))
    }
}

impl fmt::Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn flow_code(flow: SerialFlowControl) -> u8 {
    match flow {
        SerialFlowControl::None => 0,
        SerialFlowControl::Software => 1,
        SerialFlowControl::Hardware => 2,
    }
}

/// Modem reaction to a DTR drop (`AT&D`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DtrMode {
    /// DTR is ignored
    Ignore = 0,
    /// Switch to command mode, keep the call
    CommandMode = 1,
    /// Hang up the data call and switch to command mode
    #[default]
    CommandModeAndDisconnect = 2,
}

/// Per-command response bounds, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTimeouts {
    /// Most commands
    pub default_ms: u64,
    /// Operator query (network scan can be slow)
    pub operator_ms: u64,
    /// Dial, resume and escape
    pub mode_change_ms: u64,
    /// Hang up
    pub hang_up_ms: u64,
    /// Normal power-down
    pub power_off_ms: u64,
    /// Fast power-down
    pub fast_power_off_ms: u64,
    /// Silence required before the escape sequence
    pub guard_ms: u64,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            default_ms: 500,
            operator_ms: 75_000,
            mode_change_ms: 3_000,
            hang_up_ms: 90_000,
            power_off_ms: 3_000,
            fast_power_off_ms: 2_000,
            guard_ms: 1_000,
        }
    }
}

impl CommandTimeouts {
    /// Bound for most commands
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_ms)
    }

    /// Bound for `AT+COPS?`
    pub fn operator(&self) -> Duration {
        Duration::from_millis(self.operator_ms)
    }

    /// Bound for mode changes
    pub fn mode_change(&self) -> Duration {
        Duration::from_millis(self.mode_change_ms)
    }

    /// Bound for `ATH`
    pub fn hang_up(&self) -> Duration {
        Duration::from_millis(self.hang_up_ms)
    }

    /// Bound for `AT+QPOWD=1`
    pub fn power_off(&self) -> Duration {
        Duration::from_millis(self.power_off_ms)
    }

    /// Bound for `AT+QPOWD=0`
    pub fn fast_power_off(&self) -> Duration {
        Duration::from_millis(self.fast_power_off_ms)
    }

    /// Guard interval before `+++`
    pub fn guard(&self) -> Duration {
        Duration::from_millis(self.guard_ms)
    }
}

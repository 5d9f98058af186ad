//! Response line dispatchers
//!
//! Exactly one [`Dispatcher`] is active at any time. While a command is in
//! flight it is the command's own variant; otherwise it is
//! [`Dispatcher::Unsolicited`]. Each line is interpreted in one of three
//! ways:
//! - ignored (echo, blank, unrelated or malformed lines)
//! - a field was extracted into device state
//! - the command completed, successfully or not

use super::error::ParseError;
use super::parsers;
use super::state::{AuxSlot, DeviceState, SimStatus, IMEI_LENGTH, IMSI_LENGTH, MAX_NAME_LENGTH, MAX_OPERATOR_LENGTH};
use super::unsolicited;
use serde::Serialize;

/// How a command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Terminal success line
    Success,
    /// Terminal failure line
    Failure,
}

/// Result of feeding one line to a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing relevant in the line
    Ignore,
    /// A data field was stored; the command is still pending
    FieldExtracted,
    /// Terminal line
    Completed(Completion),
}

/// Final result codes and call progress lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// `OK`
    Ok,
    /// `ERROR`
    Error,
    /// `+CME ERROR: <n>`, `None` if the code is unreadable
    CmeError(Option<u16>),
    /// `CONNECT [<rate>]`
    Connect,
    /// `NO CARRIER`
    NoCarrier,
    /// `NO DIALTONE`
    NoDialtone,
    /// `BUSY`
    Busy,
    /// `NO ANSWER`
    NoAnswer,
    /// `RING`
    Ring,
    /// `POWERED DOWN`
    PoweredDown,
}

impl ResultCode {
    /// Recognize a result code; markers must match the whole trimmed line
    pub fn classify(line: &str) -> Option<Self> {
        let line = line.trim();
        let code = match line {
            "OK" => Self::Ok,
            "ERROR" => Self::Error,
            "NO CARRIER" => Self::NoCarrier,
            "NO DIALTONE" => Self::NoDialtone,
            "BUSY" => Self::Busy,
            "NO ANSWER" => Self::NoAnswer,
            "RING" => Self::Ring,
            "POWERED DOWN" => Self::PoweredDown,
            "CONNECT" => Self::Connect,
            _ if line.starts_with("CONNECT ") => Self::Connect,
            _ if line.starts_with("+CME ERROR") => Self::CmeError(parsers::parse_cme_error(line).ok()),
            _ => return None,
        };
        Some(code)
    }

    /// Plain error or CME error
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error | Self::CmeError(_))
    }

    /// A dial attempt that did not connect
    pub fn is_call_failure(self) -> bool {
        matches!(
            self,
            Self::Error | Self::CmeError(_) | Self::NoCarrier | Self::NoDialtone | Self::Busy | Self::NoAnswer
        )
    }
}

/// Line interpreter installed for the command in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Dispatcher {
    /// No command in flight
    #[default]
    Unsolicited,
    /// Completes on `OK` / `ERROR` only
    Generic,
    /// `AT+CSQ`
    SignalQuality,
    /// `AT+CBC`
    Battery,
    /// `AT+CGMM`
    ModuleName,
    /// `AT+CGSN`
    Imei,
    /// `AT+CIMI`
    Imsi,
    /// `AT+CPIN?`
    SimStatus,
    /// `AT+COPS?`
    Operator,
    /// `AT+CREG?`
    Registration,
    /// `AT+QCFG="band"`
    BandConfig,
    /// `AT+QCFG="fast/poweroff"`
    FastPowerOff,
    /// `AT+QNWINFO`
    NetworkInfo,
    /// `ATD` / `ATO`, completes on `CONNECT`
    Dial,
    /// `+++`, completes on `OK` or `NO CARRIER`
    ExitDataMode,
    /// `AT+QPOWD`, completes on `POWERED DOWN`
    PowerDown,
}

impl Dispatcher {
    /// Interpret one received line
    pub fn interpret(self, line: &str, state: &mut DeviceState) -> Dispatch {
        let line = line.trim();
        if line.is_empty() {
            return Dispatch::Ignore;
        }

        if self == Self::Unsolicited {
            return unsolicited::interpret(line, state);
        }

        if let Some(code) = ResultCode::classify(line) {
            return self.on_result_code(code, state);
        }

        if is_echo(line) {
            return Dispatch::Ignore;
        }

        self.on_data_line(line, state)
    }

    fn on_result_code(self, code: ResultCode, state: &mut DeviceState) -> Dispatch {
        let completion = match (self, code) {
            (Self::Dial, ResultCode::Connect) => Completion::Success,
            (Self::Dial, c) if c.is_call_failure() => Completion::Failure,
            (Self::Dial, _) => return Dispatch::Ignore,

            (Self::ExitDataMode, ResultCode::Ok | ResultCode::NoCarrier) => Completion::Success,

            (Self::PowerDown, ResultCode::Ok) => return Dispatch::FieldExtracted,
            (Self::PowerDown, ResultCode::PoweredDown) => Completion::Success,

            (Self::SimStatus, ResultCode::CmeError(code)) => {
                let status = code.map_or(SimStatus::Unknown, parsers::sim_status_from_cme);
                tracing::debug!("SIM query answered with CME error {:?}: {}", code, status);
                state.set_sim_status(status);
                Completion::Success
            }

            (_, ResultCode::Ok) => Completion::Success,
            (_, c) if c.is_error() => Completion::Failure,
            _ => return Dispatch::Ignore,
        };
        Dispatch::Completed(completion)
    }

    fn on_data_line(self, line: &str, state: &mut DeviceState) -> Dispatch {
        match self {
            Self::SignalQuality => stage(state, line, parsers::parse_signal_quality(line).map(AuxSlot::Signal)),
            Self::Battery => stage(state, line, parsers::parse_battery(line).map(AuxSlot::Battery)),
            Self::ModuleName => identity(state, line, MAX_NAME_LENGTH),
            Self::Imei => identity(state, line, IMEI_LENGTH),
            Self::Imsi => identity(state, line, IMSI_LENGTH),
            Self::SimStatus if line.starts_with("+CPIN") => match parsers::parse_sim_status(line) {
                Ok(status) => {
                    state.set_sim_status(status);
                    Dispatch::FieldExtracted
                }
                Err(e) => anomaly(&e),
            },
            Self::Operator if line.starts_with("+COPS") => stage(
                state,
                line,
                parsers::parse_operator(line, MAX_OPERATOR_LENGTH).map(AuxSlot::Operator),
            ),
            Self::Registration if line.starts_with("+CREG") => {
                stage(state, line, parsers::parse_registration(line).map(AuxSlot::Registration))
            }
            Self::BandConfig if line.starts_with("+QCFG") => {
                stage(state, line, parsers::parse_band_config(line).map(AuxSlot::Band))
            }
            Self::FastPowerOff if line.starts_with("+QCFG") => {
                stage(state, line, parsers::parse_fast_poweroff(line).map(AuxSlot::FastPowerOff))
            }
            Self::NetworkInfo if line.starts_with("+QNWINFO") => {
                stage(state, line, parsers::parse_network_info(line).map(AuxSlot::Network))
            }
            _ => {
                tracing::debug!("{:?} ignoring line {:?}", self, line);
                Dispatch::Ignore
            }
        }
    }
}

/// Echoed command lines start with `AT`
fn is_echo(line: &str) -> bool {
    line.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("AT"))
}

fn stage(state: &mut DeviceState, line: &str, parsed: Result<AuxSlot, ParseError>) -> Dispatch {
    match parsed {
        Ok(value) => {
            tracing::trace!("Extracted {:?} from {:?}", value, line);
            state.stage(value);
            Dispatch::FieldExtracted
        }
        Err(e) => anomaly(&e),
    }
}

/// Bare identity line. Notifications interleaved with the response go to
/// the unsolicited handler instead.
fn identity(state: &mut DeviceState, line: &str, max_chars: usize) -> Dispatch {
    if unsolicited::is_notification(line) {
        tracing::debug!("Notification {:?} while reading identity", line);
        unsolicited::interpret(line, state);
        return Dispatch::Ignore;
    }
    stage(state, line, parsers::parse_identity_line(line, max_chars).map(AuxSlot::Text))
}

fn anomaly(error: &ParseError) -> Dispatch {
    tracing::warn!("Unparsable response line: {}", error);
    Dispatch::Ignore
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dce::parsers::{BandConfig, OperatorSelection};
    use crate::core::dce::UnsolicitedEvent;

    fn run(dispatcher: Dispatcher, lines: &[&str]) -> (Vec<Dispatch>, DeviceState) {
        let mut state = DeviceState::new();
        state.begin(dispatcher);
        let results = lines.iter().map(|l| state.dispatch(l)).collect();
        (results, state)
    }

    #[test]
    fn test_classify_is_exact() {
        assert_eq!(ResultCode::classify("OK"), Some(ResultCode::Ok));
        assert_eq!(ResultCode::classify(" OK "), Some(ResultCode::Ok));
        assert_eq!(ResultCode::classify("ERROR"), Some(ResultCode::Error));
        assert_eq!(ResultCode::classify("+CME ERROR: 10"), Some(ResultCode::CmeError(Some(10))));
        assert_eq!(ResultCode::classify("+CME ERROR: SIM failure"), Some(ResultCode::CmeError(None)));
        assert_eq!(ResultCode::classify("CONNECT 150000000"), Some(ResultCode::Connect));
        assert_eq!(ResultCode::classify("BOOK"), None);
        assert_eq!(ResultCode::classify("NO ERROR HERE"), None);
        assert_eq!(ResultCode::classify("CONNECTED"), None);
    }

    #[test]
    fn test_generic_completion() {
        let (r, _) = run(Dispatcher::Generic, &["ATE0", "OK"]);
        assert_eq!(r, vec![Dispatch::Ignore, Dispatch::Completed(Completion::Success)]);

        let (r, _) = run(Dispatcher::Generic, &["+CME ERROR: 3"]);
        assert_eq!(r, vec![Dispatch::Completed(Completion::Failure)]);
    }

    #[test]
    fn test_signal_quality_flow() {
        let (r, mut state) = run(Dispatcher::SignalQuality, &["AT+CSQ", "+CSQ: 23,99", "OK"]);
        assert_eq!(
            r,
            vec![
                Dispatch::Ignore,
                Dispatch::FieldExtracted,
                Dispatch::Completed(Completion::Success)
            ]
        );
        assert!(matches!(state.take_aux(), AuxSlot::Signal(q) if q.rssi == 23));
    }

    #[test]
    fn test_malformed_line_is_ignored() {
        let (r, mut state) = run(Dispatcher::SignalQuality, &["+CSQ: garbage", "OK"]);
        assert_eq!(r[0], Dispatch::Ignore);
        assert_eq!(r[1], Dispatch::Completed(Completion::Success));
        assert_eq!(state.take_aux(), AuxSlot::Empty);
    }

    #[test]
    fn test_sim_status_cme_is_success() {
        let (r, state) = run(Dispatcher::SimStatus, &["+CME ERROR: 10"]);
        assert_eq!(r, vec![Dispatch::Completed(Completion::Success)]);
        assert_eq!(state.sim_status(), SimStatus::NotInserted);

        let (_, state) = run(Dispatcher::SimStatus, &["+CME ERROR: 13"]);
        assert_eq!(state.sim_status(), SimStatus::Unknown);

        let (_, state) = run(Dispatcher::SimStatus, &["+CPIN: READY", "OK"]);
        assert_eq!(state.sim_status(), SimStatus::Ready);

        let (r, _) = run(Dispatcher::SimStatus, &["ERROR"]);
        assert_eq!(r, vec![Dispatch::Completed(Completion::Failure)]);
    }

    #[test]
    fn test_identity_rejects_short_and_urc_lines() {
        let (r, mut state) = run(Dispatcher::ModuleName, &["AT+CGMM", "+QIND: SMS DONE", "EC", "EC21", "OK"]);
        assert_eq!(
            r,
            vec![
                Dispatch::Ignore,
                Dispatch::Ignore,
                Dispatch::Ignore,
                Dispatch::FieldExtracted,
                Dispatch::Completed(Completion::Success)
            ]
        );
        assert_eq!(state.take_aux(), AuxSlot::Text("EC21".to_string()));
    }

    #[test]
    fn test_identity_routes_boot_banner() {
        let (r, mut state) = run(Dispatcher::ModuleName, &["RDY", "EC21", "OK"]);
        assert_eq!(
            r,
            vec![
                Dispatch::Ignore,
                Dispatch::FieldExtracted,
                Dispatch::Completed(Completion::Success)
            ]
        );
        assert_eq!(state.take_aux(), AuxSlot::Text("EC21".to_string()));
        assert_eq!(state.drain_events(), vec![UnsolicitedEvent::Ready]);

        let (_, mut state) = run(Dispatcher::Imei, &["+CPIN: READY", "867698041234567", "OK"]);
        assert_eq!(state.take_aux(), AuxSlot::Text("867698041234567".to_string()));
        assert_eq!(state.sim_status(), SimStatus::Ready);
    }

    #[test]
    fn test_operator_and_band() {
        let (_, mut state) = run(Dispatcher::Operator, &["+COPS: 0", "OK"]);
        assert_eq!(state.take_aux(), AuxSlot::Operator(OperatorSelection::NotSelected));

        let (_, mut state) = run(Dispatcher::BandConfig, &["+QCFG: \"band\",1,40,0", "OK"]);
        assert_eq!(
            state.take_aux(),
            AuxSlot::Band(BandConfig { band: 1, lte: 0x40, tds: 0 })
        );
    }

    #[test]
    fn test_dial_outcomes() {
        let (r, _) = run(Dispatcher::Dial, &["ATD*99***1#", "CONNECT 150000000"]);
        assert_eq!(r[1], Dispatch::Completed(Completion::Success));

        for failure in ["NO CARRIER", "BUSY", "NO DIALTONE", "NO ANSWER", "ERROR"] {
            let (r, _) = run(Dispatcher::Dial, &[failure]);
            assert_eq!(r, vec![Dispatch::Completed(Completion::Failure)], "{failure}");
        }

        let (r, _) = run(Dispatcher::Dial, &["OK"]);
        assert_eq!(r, vec![Dispatch::Ignore]);
    }

    #[test]
    fn test_exit_data_mode_outcomes() {
        let (r, _) = run(Dispatcher::ExitDataMode, &["NO CARRIER"]);
        assert_eq!(r, vec![Dispatch::Completed(Completion::Success)]);
        let (r, _) = run(Dispatcher::ExitDataMode, &["ERROR"]);
        assert_eq!(r, vec![Dispatch::Completed(Completion::Failure)]);
    }

    #[test]
    fn test_power_down_needs_final_notice() {
        let (r, _) = run(Dispatcher::PowerDown, &["OK", "POWERED DOWN"]);
        assert_eq!(
            r,
            vec![Dispatch::FieldExtracted, Dispatch::Completed(Completion::Success)]
        );
    }
}

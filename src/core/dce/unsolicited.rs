//! Unsolicited result codes
//!
//! Interprets lines that arrive while no command is in flight: the boot
//! banner, SIM state pushes and generic indications. A recognized line
//! proves the modem talks at the host's baud rate, so it confirms the
//! baud status. Recognized lines are queued as [`UnsolicitedEvent`]s and
//! published to subscribers by the executor.

use super::dispatcher::{Dispatch, ResultCode};
use super::parsers::{self, RegistrationStatus};
use super::state::{BaudStatus, DeviceState, SimStatus};
use serde::Serialize;

/// Notification pushed by the modem on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UnsolicitedEvent {
    /// `RDY`: boot completed
    Ready,
    /// `+CPIN: <code>`
    SimState {
        /// Decoded SIM state
        status: SimStatus,
    },
    /// `+QUSIM: <n>`
    CardType {
        /// `true` for a USIM, `false` for a plain SIM
        usim: bool,
    },
    /// `+CFUN: <n>`
    Functionality {
        /// 0 minimum, 1 full, 4 airplane
        level: u32,
    },
    /// `+CREG: <stat>` with registration reporting enabled
    Registration {
        /// New registration state
        status: RegistrationStatus,
    },
    /// `+QIND: ...` (e.g. `SMS DONE`, `PB DONE`)
    Indication {
        /// Text after the tag
        text: String,
    },
    /// `RING`
    Ring,
    /// `NO CARRIER` outside a command: the data call dropped
    CallEnded,
    /// `POWERED DOWN`
    PoweredDown,
    /// `OK` / `ERROR` with no command in flight
    StrayResult {
        /// The line as received
        line: String,
    },
}

/// Interpret a line with no command in flight. Never completes a command.
pub fn interpret(line: &str, state: &mut DeviceState) -> Dispatch {
    let Some(event) = recognize(line, state) else {
        tracing::info!("Unhandled unsolicited line: {:?}", line);
        return Dispatch::Ignore;
    };

    tracing::debug!("URC {:?}", event);
    state.set_baud_status(BaudStatus::Confirmed);
    state.push_event(event);
    Dispatch::FieldExtracted
}

/// Whether a line has the shape of a notification rather than response data
pub fn is_notification(line: &str) -> bool {
    line.starts_with('+') || line.contains("RDY") || line.contains("+QIND")
}

fn recognize(line: &str, state: &mut DeviceState) -> Option<UnsolicitedEvent> {
    if line.contains("RDY") {
        tracing::info!("Module is ready");
        return Some(UnsolicitedEvent::Ready);
    }

    if let Some(code) = ResultCode::classify(line) {
        return match code {
            ResultCode::Ring => Some(UnsolicitedEvent::Ring),
            ResultCode::NoCarrier => Some(UnsolicitedEvent::CallEnded),
            ResultCode::PoweredDown => Some(UnsolicitedEvent::PoweredDown),
            ResultCode::Ok | ResultCode::Error | ResultCode::CmeError(_) => Some(UnsolicitedEvent::StrayResult {
                line: line.to_string(),
            }),
            _ => None,
        };
    }

    // Indications are sometimes preceded by noise on the line
    if let Some(pos) = line.find("+QIND") {
        let text = tag_value(&line[pos..]).trim_matches('"').to_string();
        return Some(UnsolicitedEvent::Indication { text });
    }

    if line.starts_with("+CPIN") {
        return match parsers::parse_sim_status(line) {
            Ok(status) => {
                state.set_sim_status(status);
                Some(UnsolicitedEvent::SimState { status })
            }
            Err(e) => {
                tracing::warn!("Unparsable SIM notification: {}", e);
                None
            }
        };
    }

    if line.starts_with("+QUSIM") {
        let usim = leading_number(tag_value(line)) == Some(1);
        tracing::info!("Card type: {}", if usim { "USIM" } else { "SIM" });
        return Some(UnsolicitedEvent::CardType { usim });
    }

    if line.starts_with("+CFUN") {
        let level = leading_number(tag_value(line))?;
        tracing::info!("Functionality level {}", level);
        return Some(UnsolicitedEvent::Functionality { level });
    }

    if line.starts_with("+CREG") {
        let stat = registration_stat(tag_value(line))?;
        return Some(UnsolicitedEvent::Registration {
            status: RegistrationStatus::from_code(stat),
        });
    }

    None
}

/// Text after the first `:`
fn tag_value(line: &str) -> &str {
    line.split_once(':').map_or("", |(_, value)| value.trim())
}

/// `<stat>` of a `+CREG` line.
///
/// Pushes are `<stat>[,"lac","ci"]`. A late query answer drained here is
/// `<n>,<stat>[,...]`, recognizable by an unquoted number in second place.
fn registration_stat(value: &str) -> Option<u32> {
    let mut fields = value.split(',').map(str::trim);
    let first = fields.next()?;
    match fields.next() {
        Some(second) if !second.is_empty() && second.bytes().all(|b| b.is_ascii_digit()) => second.parse().ok(),
        _ => leading_number(first),
    }
}

fn leading_number(value: &str) -> Option<u32> {
    let digits: String = value.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dce::state::CommandOutcome;

    fn feed(lines: &[&str]) -> (Vec<Dispatch>, DeviceState) {
        let mut state = DeviceState::new();
        let results = lines.iter().map(|l| state.dispatch(l)).collect();
        (results, state)
    }

    #[test]
    fn test_boot_banner() {
        let (results, mut state) = feed(&["RDY", "+CFUN: 1", "+CPIN: READY", "+QUSIM: 1", "+QIND: SMS DONE"]);
        assert!(results.iter().all(|r| *r == Dispatch::FieldExtracted));
        assert_eq!(state.baud_status(), BaudStatus::Confirmed);
        assert_eq!(state.sim_status(), SimStatus::Ready);
        assert_eq!(
            state.drain_events(),
            vec![
                UnsolicitedEvent::Ready,
                UnsolicitedEvent::Functionality { level: 1 },
                UnsolicitedEvent::SimState { status: SimStatus::Ready },
                UnsolicitedEvent::CardType { usim: true },
                UnsolicitedEvent::Indication {
                    text: "SMS DONE".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_noise_is_ignored() {
        let (results, mut state) = feed(&["\u{fffd}\u{fffd}x", "hello"]);
        assert_eq!(results, vec![Dispatch::Ignore, Dispatch::Ignore]);
        assert_eq!(state.baud_status(), BaudStatus::Unknown);
        assert!(state.drain_events().is_empty());
    }

    #[test]
    fn test_stray_result_never_completes() {
        let (results, mut state) = feed(&["OK", "NO CARRIER"]);
        assert_eq!(results, vec![Dispatch::FieldExtracted, Dispatch::FieldExtracted]);
        assert_eq!(state.outcome(), CommandOutcome::Pending);
        assert_eq!(
            state.drain_events(),
            vec![
                UnsolicitedEvent::StrayResult { line: "OK".to_string() },
                UnsolicitedEvent::CallEnded
            ]
        );
    }

    #[test]
    fn test_registration_push_and_noisy_indication() {
        let (_, mut state) = feed(&["+CREG: 5", "  +QIND: \"PB DONE\""]);
        assert_eq!(
            state.drain_events(),
            vec![
                UnsolicitedEvent::Registration {
                    status: RegistrationStatus::RegisteredRoaming
                },
                UnsolicitedEvent::Indication {
                    text: "PB DONE".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_registration_line_shapes() {
        let (results, mut state) = feed(&[
            "+CREG: 0,1",
            "+CREG: 2,5,\"1A2B\",\"0C3D4E5\",7",
            "+CREG: 1,\"1A2B\",\"0C3D4E5\"",
            "+CREG: 3",
        ]);
        assert!(results.iter().all(|r| *r == Dispatch::FieldExtracted));

        let statuses: Vec<_> = state
            .drain_events()
            .into_iter()
            .map(|e| match e {
                UnsolicitedEvent::Registration { status } => status,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                RegistrationStatus::RegisteredHome,
                RegistrationStatus::RegisteredRoaming,
                RegistrationStatus::RegisteredHome,
                RegistrationStatus::Denied,
            ]
        );
    }

    #[test]
    fn test_sim_removed_push() {
        let (_, state) = feed(&["+CPIN: NOT INSERTED"]);
        assert_eq!(state.sim_status(), SimStatus::NotInserted);
    }
}

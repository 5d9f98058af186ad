//! Output formatting for CLI results

use crate::core::dce::UnsolicitedEvent;
use chrono::{DateTime, Local};
use clap::ValueEnum;
use serde::Serialize;

/// CLI output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON for scripting
    Json,
}

/// Render a command result.
///
/// `text` produces the human-readable form; JSON output serializes `value`.
pub fn format_output<T, F>(value: &T, format: OutputFormat, text: F) -> Result<String, serde_json::Error>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Text => Ok(text(value)),
        OutputFormat::Json => serde_json::to_string_pretty(value),
    }
}

/// Align `key: value` rows
pub fn key_values(rows: &[(&str, String)]) -> String {
    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    rows.iter()
        .map(|(k, v)| format!("{:<width$}  {}", format!("{k}:"), v, width = width + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Serialize)]
struct TimedEvent<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a UnsolicitedEvent,
}

/// Render one unsolicited notification, one line per event
pub fn format_event(
    event: &UnsolicitedEvent,
    at: DateTime<Local>,
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Text => Ok(format!("[{}] {}", at.format("%H:%M:%S%.3f"), describe_event(event))),
        OutputFormat::Json => serde_json::to_string(&TimedEvent {
            timestamp: at.to_rfc3339(),
            event,
        }),
    }
}

fn describe_event(event: &UnsolicitedEvent) -> String {
    match event {
        UnsolicitedEvent::Ready => "modem ready".to_string(),
        UnsolicitedEvent::SimState { status } => format!("SIM {status}"),
        UnsolicitedEvent::CardType { usim } => {
            format!("card type {}", if *usim { "USIM" } else { "SIM" })
        }
        UnsolicitedEvent::Functionality { level } => format!("functionality level {level}"),
        UnsolicitedEvent::Registration { status } => format!("registration {status}"),
        UnsolicitedEvent::Indication { text } => format!("indication {text}"),
        UnsolicitedEvent::Ring => "RING".to_string(),
        UnsolicitedEvent::CallEnded => "call ended".to_string(),
        UnsolicitedEvent::PoweredDown => "powered down".to_string(),
        UnsolicitedEvent::StrayResult { line } => format!("stray result {line}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dce::{RegistrationStatus, SimStatus};
    use chrono::TimeZone;

    #[test]
    fn test_key_values_aligned() {
        let text = key_values(&[("IMEI", "867698041234567".to_string()), ("Operator", "TIM".to_string())]);
        assert_eq!(text, "IMEI:      867698041234567\nOperator:  TIM");
    }

    #[test]
    fn test_format_output_json() {
        let out = format_output(&SimStatus::Ready, OutputFormat::Json, |s| s.to_string()).unwrap();
        assert_eq!(out, "\"ready\"");

        let text = format_output(&SimStatus::Ready, OutputFormat::Text, |_| "ok".to_string()).unwrap();
        assert_eq!(text, "ok");
    }

    #[test]
    fn test_format_event() {
        let at = Local.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        let event = UnsolicitedEvent::Registration {
            status: RegistrationStatus::RegisteredHome,
        };

        let text = format_event(&event, at, OutputFormat::Text).unwrap();
        assert!(text.starts_with("[12:30:05.000] registration"));

        let json = format_event(&UnsolicitedEvent::Ring, at, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "ring");
        assert!(value["timestamp"].as_str().is_some());
    }
}

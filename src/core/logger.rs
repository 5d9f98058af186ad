//! Tracing subscriber setup
//!
//! Supports text and JSON output on stderr, plus an optional daily rolling
//! log file. Line traffic is traced under [`WIRE_TARGET`] at `trace` level.

use crate::config::LoggingConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Target used for TX/RX line tracing
pub const WIRE_TARGET: &str = "modemctl::wire";

/// File name prefix of the rolling log
pub const LOG_FILE_PREFIX: &str = "modemctl.log";

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable text
    #[default]
    Text,
    /// JSON lines
    Json,
}

impl LogFormat {
    /// Get all formats
    pub fn all() -> &'static [LogFormat] {
        &[LogFormat::Text, LogFormat::Json]
    }

    /// Get name
    pub fn name(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogFormat::all()
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown log format: {s}"))
    }
}

/// Logger setup errors
#[derive(Error, Debug)]
pub enum LoggerError {
    /// Level or directive could not be parsed
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    /// Log directory could not be created
    #[error("Failed to create log directory: {0}")]
    Io(#[from] std::io::Error),

    /// A global subscriber is already installed
    #[error("Tracing already initialized: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the level filter: `RUST_LOG` wins, then `level_override`, then
/// the configured level
pub fn build_filter(config: &LoggingConfig, level_override: Option<&str>) -> Result<EnvFilter, LoggerError> {
    let fallback = level_override.unwrap_or(config.level.as_str());
    let mut filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(fallback))?;

    if config.wire_trace {
        let directive: Directive = format!("{WIRE_TARGET}=trace").parse()?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Install the global subscriber.
///
/// The returned guard flushes the file sink on drop and must be held for
/// the life of the process.
pub fn init_tracing(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<Option<WorkerGuard>, LoggerError> {
    let filter = build_filter(config, level_override)?;

    let (file_writer, guard) = match &config.directory {
        Some(dir) if config.to_file => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        _ => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(file_writer.map(|w| fmt::layer().json().with_writer(w)))
            .try_init()?,
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_filter_accepts_configured_level() {
        let config = LoggingConfig {
            wire_trace: true,
            ..LoggingConfig::default()
        };
        assert!(build_filter(&config, Some("debug")).is_ok());
    }
}

//! CLI Module
//!
//! Provides command-line interface functionality including:
//! - Exit codes for automation
//! - Text and JSON output formatting

pub mod exit_codes;
pub mod output;

pub use exit_codes::{dce_exit_code, exit_code_description, print_exit_codes, CliResult, ExitCodes};
pub use output::{format_event, format_output, key_values, OutputFormat};

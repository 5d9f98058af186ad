//! Modemctl CLI
//!
//! Provisions and queries an AT-command cellular modem from the shell.
//! Every subcommand that talks to the modem opens the link, runs, and
//! releases it again.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use modemctl_core::cli::{
    format_event, format_output, key_values, print_exit_codes, CliResult, ExitCodes, OutputFormat,
};
use modemctl_core::config::{default_config_path, AppConfig};
use modemctl_core::core::dce::{Dce, LteBand, OperatorSelection, WorkingMode};
use modemctl_core::core::logger::init_tracing;
use modemctl_core::core::persist::{BaudRateStore, FileBaudRateStore, MemoryBaudRateStore, FACTORY_BAUD_RATE};
use modemctl_core::core::simulator::SimulatedModem;
use modemctl_core::core::transport::{list_ports, SerialConfig, SerialTransport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;

/// Interval between unsolicited polls in `monitor`
const MONITOR_POLL: Duration = Duration::from_millis(200);

/// Modemctl CLI
#[derive(Parser, Debug)]
#[command(
    name = "modemctl",
    author = "Modemctl Team",
    version,
    about = "AT command driver for cellular modems",
    long_about = None
)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "MODEMCTL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Serial port (overrides the config file)
    #[arg(short, long, env = "MODEMCTL_PORT", global = true)]
    port: Option<String>,

    /// Host baud rate (defaults to the last negotiated rate)
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Talk to a simulated EC21 instead of a serial port
    #[arg(long, global = true)]
    simulate: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts {
        /// Show detailed info
        #[arg(short, long)]
        detailed: bool,
    },

    /// Run the bring-up sequence
    Provision {
        /// Baud rate to negotiate (overrides the config file)
        #[arg(long)]
        working_baud: Option<u32>,
    },

    /// Module name, IMEI, IMSI and operator
    Info,

    /// Signal quality
    Signal,

    /// Battery status
    Battery,

    /// SIM state
    Sim,

    /// Network registration state
    Registration,

    /// Serving network details
    Network,

    /// Enable or disable roaming
    Roaming {
        /// New state
        #[arg(value_enum)]
        state: Toggle,
    },

    /// LTE band configuration
    Band {
        #[command(subcommand)]
        action: BandAction,
    },

    /// Switch between command and data mode
    Mode {
        /// Target mode (command, data)
        mode: WorkingMode,
    },

    /// Power the module down
    PowerDown {
        /// Skip the orderly network detach
        #[arg(long)]
        fast: bool,
    },

    /// Print unsolicited notifications until interrupted
    Monitor {
        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Configuration file management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show exit code table
    ExitCodes,
}

#[derive(Subcommand, Debug)]
enum BandAction {
    /// Show the raw band masks
    Show,
    /// Whether one LTE band is enabled
    Get {
        /// LTE band number (1, 3, 5, 7, 8, 20)
        band: u8,
    },
    /// Enable or disable one LTE band
    Set {
        /// LTE band number (1, 3, 5, 7, 8, 20)
        band: u8,
        /// New state
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file path
    Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        self == Self::On
    }
}

/// Bad command-line input detected after parsing
#[derive(Error, Debug)]
#[error("{0}")]
struct UsageError(String);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let result = if err.is::<UsageError>() {
                CliResult::error(ExitCodes::INVALID_ARGS, err.to_string())
            } else {
                CliResult::from(&err)
            };
            if let Some(msg) = result.message() {
                eprintln!("Error: {msg}");
            }
            result.to_exit_code()
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => Some("error"),
        (false, 0) => None,
        (false, 1) => Some("debug"),
        (false, _) => Some("trace"),
    };
    let _guard = init_tracing(&config.logging, level)?;

    match &cli.command {
        Commands::ListPorts { detailed } => return show_ports(cli, *detailed),
        Commands::Config { action } => return handle_config(cli, &config, action),
        Commands::ExitCodes => {
            print_exit_codes();
            return Ok(());
        }
        _ => {}
    }

    let mut store = open_store(cli, &config);
    let mut dce = open_dce(cli, &config, store.as_ref())?;
    let result = run_modem_command(cli, &config, &mut dce, store.as_mut()).await;

    if let Err(e) = dce.deinit().await {
        tracing::warn!("Failed to release modem: {}", e);
    }
    result
}

fn open_store(cli: &Cli, config: &AppConfig) -> Box<dyn BaudRateStore> {
    if cli.simulate {
        Box::new(MemoryBaudRateStore::new(FACTORY_BAUD_RATE))
    } else {
        Box::new(FileBaudRateStore::new(config.state_file_path()))
    }
}

fn open_dce(cli: &Cli, config: &AppConfig, store: &dyn BaudRateStore) -> anyhow::Result<Dce> {
    if cli.simulate {
        let (modem, lines) = SimulatedModem::ec21();
        return Ok(Dce::bind(modem, lines).with_timeouts(config.timeouts.clone()));
    }

    let baud_rate = match cli.baud {
        Some(rate) => rate,
        None => store.load().context("reading the last negotiated baud rate")?,
    };
    let serial = SerialConfig {
        port: cli.port.clone().unwrap_or_else(|| config.serial.port.clone()),
        baud_rate,
        ..config.serial.clone()
    };

    if !cli.quiet {
        eprintln!("Connecting to {} @ {} baud...", serial.port, serial.baud_rate);
    }
    let (transport, lines) = SerialTransport::open(serial)?;
    Ok(Dce::bind(transport, lines).with_timeouts(config.timeouts.clone()))
}

async fn run_modem_command(
    cli: &Cli,
    config: &AppConfig,
    dce: &mut Dce,
    store: &mut dyn BaudRateStore,
) -> anyhow::Result<()> {
    let format = cli.format;

    match &cli.command {
        Commands::Provision { working_baud } => {
            let mut provisioning = config.provisioning.clone();
            if let Some(rate) = working_baud {
                provisioning = provisioning.working_baud_rate(*rate);
            }
            let report = dce.provision(store, &provisioning).await?;
            print(&report, format, |r| {
                key_values(&[
                    ("Baud rate", r.baud_rate.to_string()),
                    ("Renegotiated", r.baud_rate_changed.to_string()),
                    ("SIM", r.sim_status.to_string()),
                    ("Fast shutdown", r.fast_shutdown_enabled.to_string()),
                ])
            })?;
        }
        Commands::Info => {
            let identity = dce.get_module_info().await?;
            print(&identity, format, |id| {
                key_values(&[
                    ("Module", id.name.clone()),
                    ("IMEI", id.imei.clone()),
                    ("IMSI", id.imsi.clone()),
                    ("Operator", id.operator.clone()),
                ])
            })?;
        }
        Commands::Signal => {
            let signal = dce.get_signal_quality().await?;
            print(&signal, format, ToString::to_string)?;
        }
        Commands::Battery => {
            let battery = dce.get_battery_status().await?;
            print(&battery, format, ToString::to_string)?;
        }
        Commands::Sim => {
            let sim = dce.get_sim_status().await?;
            print(&sim, format, ToString::to_string)?;
        }
        Commands::Registration => {
            let status = dce.get_network_status().await?;
            print(&status, format, ToString::to_string)?;
        }
        Commands::Network => {
            let info = dce.get_network_extended_info().await?;
            let operator = dce.get_operator_name().await?;
            let value = serde_json::json!({ "network": info, "operator": operator });
            print(&value, format, |_| {
                let name = match &operator {
                    OperatorSelection::Selected(name) => name.clone(),
                    OperatorSelection::NotSelected => "none".to_string(),
                };
                key_values(&[("Network", info.to_string()), ("Operator", name)])
            })?;
        }
        Commands::Roaming { state } => {
            dce.enable_roaming(state.enabled()).await?;
            status_line(cli, &format!("Roaming {}", if state.enabled() { "enabled" } else { "disabled" }));
        }
        Commands::Band { action } => handle_band(cli, dce, action).await?,
        Commands::Mode { mode } => {
            dce.set_working_mode(*mode).await?;
            print(&dce.mode(), format, |m| format!("{m} mode"))?;
        }
        Commands::PowerDown { fast } => {
            if *fast {
                dce.fast_power_down().await?;
            } else {
                dce.power_down().await?;
            }
            status_line(cli, "Module powered down");
        }
        Commands::Monitor { duration } => monitor(cli, dce, duration.map(Duration::from_secs)).await?,
        Commands::ListPorts { .. } | Commands::Config { .. } | Commands::ExitCodes => {}
    }

    Ok(())
}

async fn handle_band(cli: &Cli, dce: &mut Dce, action: &BandAction) -> anyhow::Result<()> {
    match action {
        BandAction::Show => {
            let bands = dce.get_band_config().await?;
            print(&bands, cli.format, ToString::to_string)?;
        }
        BandAction::Get { band } => {
            let lte = parse_band(*band)?;
            let enabled = dce.get_band_state(lte).await?;
            let value = serde_json::json!({ "band": band, "enabled": enabled });
            print(&value, cli.format, |_| {
                format!("B{band} {}", if enabled { "enabled" } else { "disabled" })
            })?;
        }
        BandAction::Set { band, state } => {
            let lte = parse_band(*band)?;
            dce.set_band_state(lte, state.enabled()).await?;
            status_line(
                cli,
                &format!("B{band} {}", if state.enabled() { "enabled" } else { "disabled" }),
            );
        }
    }
    Ok(())
}

fn parse_band(number: u8) -> Result<LteBand, UsageError> {
    LteBand::from_number(number).ok_or_else(|| UsageError(format!("unsupported LTE band: {number}")))
}

async fn monitor(cli: &Cli, dce: &mut Dce, duration: Option<Duration>) -> anyhow::Result<()> {
    let mut events = dce.subscribe();
    // A duration past the clock's range means no deadline
    let deadline = duration.and_then(|d| Instant::now().checked_add(d));

    if !cli.quiet {
        eprintln!("Monitoring {}. Press Ctrl+C to exit.", dce.connection_info());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            polled = dce.poll_unsolicited(MONITOR_POLL) => {
                polled?;
            }
        }

        loop {
            match events.try_recv() {
                Ok(event) => println!("{}", format_event(&event, chrono::Local::now(), cli.format)?),
                Err(TryRecvError::Lagged(n)) => tracing::warn!("Dropped {} notifications", n),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
    }

    Ok(())
}

fn show_ports(cli: &Cli, detailed: bool) -> anyhow::Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        if !cli.quiet {
            println!("No serial ports found.");
        }
        return Ok(());
    }

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if detailed {
                println!("Available Serial Ports:");
                println!("{:-<60}", "");
                for port in &ports {
                    println!("  {} [{:?}]", port.port_name, port.port_type);
                }
            } else {
                for port in &ports {
                    println!("{}", port.port_name);
                }
            }
        }
    }

    Ok(())
}

fn handle_config(cli: &Cli, config: &AppConfig, action: &ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => match cli.format {
            OutputFormat::Text => print!("{}", config.to_toml()?),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        },
        ConfigAction::Init { force } => {
            let path = cli
                .config
                .clone()
                .or_else(default_config_path)
                .ok_or_else(|| UsageError("no config directory; pass --config".to_string()))?;
            if path.exists() && !force {
                return Err(UsageError(format!("{} exists; use --force to overwrite", path.display())).into());
            }
            let written = AppConfig::default().save(Some(&path))?;
            status_line(cli, &format!("Wrote {}", written.display()));
        }
        ConfigAction::Path => {
            let path = cli.config.clone().or_else(default_config_path);
            match path {
                Some(p) => println!("{}", p.display()),
                None => return Err(UsageError("no config directory".to_string()).into()),
            }
        }
    }
    Ok(())
}

fn print<T, F>(value: &T, format: OutputFormat, text: F) -> anyhow::Result<()>
where
    T: serde::Serialize,
    F: FnOnce(&T) -> String,
{
    println!("{}", format_output(value, format, text)?);
    Ok(())
}

fn status_line(cli: &Cli, message: &str) {
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "status": "ok", "message": message })),
        OutputFormat::Text if !cli.quiet => println!("{message}"),
        OutputFormat::Text => {}
    }
}

//! Serial port transport implementation

use super::{line_channel, LineReceiver, LineSender, LineSplitter, TransportError, TransportTrait};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Serial port flow control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialFlowControl {
    /// No flow control
    #[default]
    None,
    /// Hardware flow control (RTS/CTS)
    Hardware,
    /// Software flow control (XON/XOFF)
    Software,
}

impl std::str::FromStr for SerialFlowControl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "hw" | "hardware" | "rtscts" => Ok(Self::Hardware),
            "sw" | "software" | "xonxoff" => Ok(Self::Software),
            other => Err(format!("unknown flow control: {other}")),
        }
    }
}

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name (e.g., /dev/ttyUSB2, COM3)
    pub port: String,
    /// Baud rate the modem is expected to talk at
    pub baud_rate: u32,
    /// Flow control
    pub flow_control: SerialFlowControl,
    /// Read poll interval in milliseconds
    pub read_timeout_ms: u64,
}

impl SerialConfig {
    /// Create a new serial configuration with 8N1 and no flow control
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            flow_control: SerialFlowControl::None,
            read_timeout_ms: 100,
        }
    }

    /// Set flow control
    #[must_use]
    pub fn flow_control(mut self, flow: SerialFlowControl) -> Self {
        self.flow_control = flow;
        self
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("/dev/ttyUSB2", 115_200)
    }
}

/// Serial port transport.
///
/// Writes happen on the caller's task. A dedicated reader thread owns a
/// cloned handle of the port and pushes every received line into the
/// line channel.
pub struct SerialTransport {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Open the port and start the reader thread
    pub fn open(config: SerialConfig) -> Result<(Self, LineReceiver), TransportError> {
        let flow_control = match config.flow_control {
            SerialFlowControl::Hardware => FlowControl::Hardware,
            SerialFlowControl::Software => FlowControl::Software,
            SerialFlowControl::None => FlowControl::None,
        };

        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(flow_control)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()
            .map_err(|e| map_open_error(&config.port, e))?;

        let reader_port = port
            .try_clone()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (tx, rx) = line_channel();
        let running = Arc::new(AtomicBool::new(true));
        let reader = spawn_reader(reader_port, tx, running.clone())?;

        tracing::info!("Opened {} @ {} baud", config.port, config.baud_rate);

        Ok((
            Self {
                config,
                port: Some(port),
                running,
                reader: Some(reader),
            },
            rx,
        ))
    }

    /// Current configuration (baud rate reflects the last successful change)
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn shutdown_reader(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                tracing::warn!("Serial reader thread panicked");
            }
        }
    }
}

fn map_open_error(port: &str, e: serialport::Error) -> TransportError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => TransportError::PortNotFound(port.to_string()),
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            TransportError::PermissionDenied(port.to_string())
        }
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
            TransportError::PortNotFound(port.to_string())
        }
        _ => TransportError::ConnectionFailed(e.to_string()),
    }
}

fn spawn_reader(
    mut port: Box<dyn SerialPort>,
    tx: LineSender,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, TransportError> {
    std::thread::Builder::new()
        .name("modem-rx".to_string())
        .spawn(move || {
            let mut splitter = LineSplitter::new();
            let mut buf = [0u8; 1024];

            while running.load(Ordering::SeqCst) {
                match port.read(&mut buf) {
                    Ok(0) => {}
                    Ok(n) => {
                        for line in splitter.push(&buf[..n]) {
                            tracing::trace!(target: "modemctl::wire", "RX {}", line);
                            if tx.send(line).is_err() {
                                // Receiver dropped: the DCE has been released.
                                return;
                            }
                        }
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(e) => {
                        tracing::error!("Serial read failed: {}", e);
                        break;
                    }
                }
            }
        })
        .map_err(TransportError::IoError)
}

#[async_trait]
impl TransportTrait for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Disconnected)?;

        port.write_all(data)?;
        port.flush()?;

        Ok(data.len())
    }

    async fn change_baud_rate(&mut self, rate: u32) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Disconnected)?;

        port.set_baud_rate(rate).map_err(|e| TransportError::BaudRate {
            rate,
            reason: e.to_string(),
        })?;
        self.config.baud_rate = rate;

        tracing::info!("Host baud rate switched to {}", rate);
        Ok(())
    }

    fn connection_info(&self) -> String {
        format!(
            "{} @ {} baud (8N1 {})",
            self.config.port,
            self.config.baud_rate,
            match self.config.flow_control {
                SerialFlowControl::None => "No FC",
                SerialFlowControl::Hardware => "HW FC",
                SerialFlowControl::Software => "SW FC",
            }
        )
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.port = None;
        self.shutdown_reader();
        Ok(())
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}

//! Shared types for the serial link crate.
//!
//! Covers link configuration, fixed line settings, port metadata,
//! telemetry readings, and session state / statistics snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Fixed line settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Baud rate the board firmware is built for.
pub const BAUD_RATE: u32 = 9600;

/// Line settings shorthand (8 data bits, no parity, 1 stop bit).
pub const LINE_SETTINGS: &str = "8N1";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Link configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Line ending appended to outgoing commands.
///
/// The board firmware reads one command per `\n`, so anything other than
/// [`LineEnding::Lf`] is only for other firmware built on the same link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LineEnding {
    /// No line ending appended.
    None,
    /// Carriage Return (`\r`).
    Cr,
    /// Line Feed (`\n`).
    Lf,
    /// Carriage Return + Line Feed (`\r\n`).
    CrLf,
}

impl Default for LineEnding {
    fn default() -> Self {
        Self::Lf
    }
}

impl LineEnding {
    /// The byte sequence for this line ending.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::None => b"",
            Self::Cr => b"\r",
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
        }
    }
}

/// Serial link configuration.
///
/// Baud rate and framing are fixed (see [`BAUD_RATE`]).  `line_ending`
/// is the one knob that can break the board's command protocol; leave it
/// at the default `lf` for the stock firmware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialConfig {
    /// Preselected port (e.g. `COM3`, `/dev/ttyACM0`).  When unset the
    /// backend asks the user to pick one on every connect.
    #[serde(default)]
    pub port_name: Option<String>,

    /// Line ending appended to every command token.  The stock firmware
    /// expects exactly one `\n`.
    #[serde(default)]
    pub line_ending: LineEnding,

    /// Upper bound for a single command write.  `None` waits forever.
    #[serde(default)]
    pub write_timeout_ms: Option<u64>,

    /// Size of a single raw read from the port.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Optional traffic capture file.
    #[serde(default)]
    pub capture_path: Option<PathBuf>,
}

fn default_read_buffer_size() -> usize {
    1024
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: None,
            line_ending: LineEnding::default(),
            write_timeout_ms: None,
            read_buffer_size: default_read_buffer_size(),
            capture_path: None,
        }
    }
}

impl SerialConfig {
    /// Shorthand notation (e.g. "9600-8N1").
    pub fn shorthand(&self) -> String {
        format!("{}-{}", BAUD_RATE, LINE_SETTINGS)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Port metadata
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Information about a discovered serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialPortInfo {
    /// OS port name (`COM3`, `/dev/ttyUSB0`).
    pub port_name: String,
    /// Port category.
    pub port_type: PortType,
    /// USB vendor id, if the port is USB-backed.
    pub vid: Option<u16>,
    /// USB product id.
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    /// Human friendly label built from the known-adapter table.
    pub display_name: String,
}

/// Port category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortType {
    Usb,
    Bluetooth,
    Pci,
    Virtual,
    Unknown,
}

impl PortType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Usb => "USB",
            Self::Bluetooth => "Bluetooth",
            Self::Pci => "PCI",
            Self::Virtual => "Virtual",
            Self::Unknown => "Unknown",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Telemetry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single decoded measurement.  `raw` is the text as the board sent it
/// and is what the display shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub raw: String,
    pub value: f64,
}

/// Fields found in one telemetry chunk.  Absent fields were not in the
/// chunk and must not touch the displayed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReading {
    pub temperature: Option<Measurement>,
    pub humidity: Option<Measurement>,
}

impl TelemetryReading {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Session state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection state as seen by front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkStatus {
    Disconnected,
    Connected,
}

/// Traffic counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub bytes_rx: u64,
    pub bytes_tx: u64,
    pub chunks_rx: u64,
    pub commands_tx: u64,
}

/// Live counters shared between the reader task and the command path.
#[derive(Debug, Default)]
pub struct LinkCounters {
    bytes_rx: AtomicU64,
    bytes_tx: AtomicU64,
    chunks_rx: AtomicU64,
    commands_tx: AtomicU64,
}

impl LinkCounters {
    pub fn record_rx(&self, bytes: usize) {
        self.bytes_rx.fetch_add(bytes as u64, Ordering::Relaxed);
        self.chunks_rx.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx(&self, bytes: usize) {
        self.bytes_tx.fetch_add(bytes as u64, Ordering::Relaxed);
        self.commands_tx.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            bytes_rx: self.bytes_rx.load(Ordering::Relaxed),
            bytes_tx: self.bytes_tx.load(Ordering::Relaxed),
            chunks_rx: self.chunks_rx.load(Ordering::Relaxed),
            commands_tx: self.commands_tx.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the controller, returned by `LinkController::info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInfo {
    pub status: LinkStatus,
    pub session_id: Option<String>,
    pub port_name: Option<String>,
    pub config_shorthand: String,
    pub connected_at: Option<DateTime<Utc>>,
    /// Whether the reader task is still consuming the port.
    pub reading: bool,
    pub stats: SessionStats,
}

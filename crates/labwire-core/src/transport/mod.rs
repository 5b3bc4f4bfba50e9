//! Transport links
//!
//! A uniform capability set over three interchangeable variants: USB-serial,
//! dedicated serial, and TCP/IP LAN (client or listening server). Links
//! report data and lifecycle changes as [`TransportEvent`]s over an mpsc
//! channel supplied at construction; the bool-returning operations never
//! panic and never surface errors as return values beyond success/failure.

mod error;
pub mod lan;
mod reader;
pub mod serial;
pub mod usb;

pub use error::TransportError;
pub use lan::LanLink;
pub use serial::{list_ports, PortInfo, SerialLink};
pub use usb::UsbLink;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default serial read/write timeout
pub const DEFAULT_SERIAL_TIMEOUT: Duration = Duration::from_secs(1);

/// Default LAN connect/read/accept timeout
pub const DEFAULT_LAN_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll floor for the background receive loop
pub const RECEIVE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Largest single read handed to the event channel
pub const RECEIVE_BUFFER_SIZE: usize = 4096;

/// Selected transport variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceKind {
    Usb,
    Serial,
    Lan,
}

impl FromStr for InterfaceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "USB" => Ok(InterfaceKind::Usb),
            "Serial" => Ok(InterfaceKind::Serial),
            "LAN" => Ok(InterfaceKind::Lan),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceKind::Usb => write!(f, "USB"),
            InterfaceKind::Serial => write!(f, "Serial"),
            InterfaceKind::Lan => write!(f, "LAN"),
        }
    }
}

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
    Odd,
    Mark,
    Space,
}

impl FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "N" => Ok(Parity::None),
            "E" => Ok(Parity::Even),
            "O" => Ok(Parity::Odd),
            "M" => Ok(Parity::Mark),
            "S" => Ok(Parity::Space),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        };
        write!(f, "{c}")
    }
}

/// LAN operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanMode {
    /// Connect out to a listening peer
    Client,
    /// Bind, listen, and accept exactly one client in the background
    Server,
}

impl FromStr for LanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "client" => Ok(LanMode::Client),
            "server" => Ok(LanMode::Server),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for LanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanMode::Client => write!(f, "client"),
            LanMode::Server => write!(f, "server"),
        }
    }
}

/// Serial/USB connection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialParams {
    /// Port path; `None` auto-selects the first enumerated port
    pub port: Option<String>,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    /// Read/write timeout
    pub timeout: Duration,
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            timeout: DEFAULT_SERIAL_TIMEOUT,
        }
    }
}

/// LAN connection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanParams {
    pub host: String,
    /// Port number; 0 in server mode binds an ephemeral port (exposed via
    /// [`TransportStatus`])
    pub port: u16,
    /// Connect timeout (client) / accept timeout (server) and read bound
    pub timeout: Duration,
    pub mode: LanMode,
}

impl Default for LanParams {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5000,
            timeout: DEFAULT_LAN_TIMEOUT,
            mode: LanMode::Client,
        }
    }
}

/// Transport-specific connection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConnectParams {
    Serial(SerialParams),
    Lan(LanParams),
}

impl ConnectParams {
    /// Short label for error reporting
    pub(crate) fn label(&self) -> &'static str {
        match self {
            ConnectParams::Serial(_) => "serial",
            ConnectParams::Lan(_) => "lan",
        }
    }
}

/// Lifecycle and data events emitted by a link
///
/// Delivered over the mpsc channel handed to the link at construction. The
/// `Disconnected` event fires exactly once per connected-to-disconnected
/// transition, whether caller-initiated or caused by an I/O failure, and
/// never for a link that was never connected.
#[derive(Debug)]
pub enum TransportEvent {
    /// Link became connected; payload describes the endpoint
    Connected(String),
    /// Bytes arrived from the peer
    Data(Vec<u8>),
    /// Link left the connected state
    Disconnected,
    /// An operation failed; the link may also have torn down
    Error(TransportError),
}

/// Snapshot of a link's configuration and state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TransportStatus {
    Serial(SerialStatus),
    Lan(LanStatus),
}

impl TransportStatus {
    pub fn connected(&self) -> bool {
        match self {
            TransportStatus::Serial(s) => s.connected,
            TransportStatus::Lan(s) => s.connected,
        }
    }
}

/// Serial link status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerialStatus {
    pub connected: bool,
    /// Resolved port path (after auto-detection), empty before connect
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    pub timeout_secs: f64,
}

/// LAN link status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanStatus {
    pub connected: bool,
    pub host: String,
    pub port: u16,
    /// Actual bound port in server mode (differs from `port` when 0)
    pub bound_port: Option<u16>,
    /// Remote endpoint once a connection is established
    pub peer: Option<String>,
    pub mode: LanMode,
    pub timeout_secs: f64,
}

/// Uniform capability set implemented by every link variant
///
/// A link is exclusively owned by its orchestrator; only the owner calls the
/// mutating methods. The background receive loop shares only the internal
/// I/O handle, never the link itself.
pub trait Transport: Send {
    /// Which variant this link is
    fn kind(&self) -> InterfaceKind;

    /// Open the link; idempotent (an already-connected link is cleanly
    /// disconnected first). On failure emits an `Error` event and returns
    /// false with no partial connected state.
    fn connect(&mut self, params: &ConnectParams) -> bool;

    /// Close the link: stops the receive loop, closes the handle, and emits
    /// `Disconnected` once if the link was connected
    fn disconnect(&mut self) -> bool;

    fn is_connected(&self) -> bool;

    /// Blocking write bounded by the link's write timeout. On failure the
    /// connection is marked lost (single `Disconnected`) and false returns.
    fn send(&mut self, data: &[u8]) -> bool;

    /// Single bounded poll for inbound bytes
    ///
    /// `None` means no data within the timeout, including on a link that was
    /// never connected; peer-close and I/O errors also return `None` after
    /// emitting the corresponding events.
    fn receive(&mut self, timeout: Duration) -> Option<Vec<u8>>;

    /// Start the dedicated background receive loop (one per link)
    fn start_receiving(&mut self);

    /// Ask the background loop to stop; it observes the flag within one poll
    /// interval and is then joined
    fn stop_receiving(&mut self);

    fn status(&self) -> TransportStatus;
}

//! Serial port handling
//!
//! Port enumeration and the shared serial link core used by both the
//! dedicated-serial and USB-serial variants.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::reader::{LoopStep, ReceiveLoop};
use super::{
    ConnectParams, InterfaceKind, Parity, SerialParams, SerialStatus, Transport, TransportError,
    TransportEvent, TransportStatus, RECEIVE_BUFFER_SIZE, RECEIVE_POLL_INTERVAL,
};

/// How long one lock-holding poll slice may last before the I/O handle is
/// released so the foreground can send
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Device path (e.g. "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Whether the port was enumerated as a USB device
    pub fn is_usb(&self) -> bool {
        self.vid.is_some()
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, manufacturer, product, serial_number) = match info.port_type {
            SerialPortType::UsbPort(usb) => (
                Some(usb.vid),
                Some(usb.pid),
                usb.manufacturer,
                usb.product,
                usb.serial_number,
            ),
            _ => (None, None, None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            manufacturer,
            product,
            serial_number,
        }
    }
}

/// Sort key so ttyACM* ports come first, then ttyUSB*, then the rest,
/// numerically within each group
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        return (0, rest.parse().unwrap_or(usize::MAX), basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        return (1, rest.parse().unwrap_or(usize::MAX), basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// List available serial ports in deterministic order
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// List only USB-enumerated serial ports
pub fn list_usb_ports() -> Vec<PortInfo> {
    list_ports().into_iter().filter(PortInfo::is_usb).collect()
}

fn data_bits(bits: u8) -> Result<serialport::DataBits, TransportError> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(TransportError::Unsupported(format!(
            "data bits {other} (expected 5-8)"
        ))),
    }
}

fn parity(parity: Parity) -> Result<serialport::Parity, TransportError> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Odd => Ok(serialport::Parity::Odd),
        // The serialport crate offers no mark/space parity
        Parity::Mark | Parity::Space => Err(TransportError::Unsupported(format!(
            "parity {parity} is not available on this platform"
        ))),
    }
}

fn stop_bits(bits: u8) -> Result<serialport::StopBits, TransportError> {
    match bits {
        1 => Ok(serialport::StopBits::One),
        2 => Ok(serialport::StopBits::Two),
        other => Err(TransportError::Unsupported(format!(
            "stop bits {other} (expected 1 or 2)"
        ))),
    }
}

/// Open a serial port with the given settings, auto-selecting the first
/// enumerated port (optionally USB-only) when none is named
///
/// Returns the handle together with the resolved port path.
fn open_port(
    params: &SerialParams,
    usb_only: bool,
) -> Result<(Box<dyn SerialPort>, String), TransportError> {
    let port_name = match &params.port {
        Some(name) => name.clone(),
        None => {
            let candidates = if usb_only { list_usb_ports() } else { list_ports() };
            let first = candidates.first().ok_or(TransportError::NoPortsFound)?;
            debug!(port = %first.name, "auto-selected serial port");
            first.name.clone()
        }
    };

    let port = serialport::new(port_name.as_str(), params.baud_rate)
        .data_bits(data_bits(params.data_bits)?)
        .parity(parity(params.parity)?)
        .stop_bits(stop_bits(params.stop_bits)?)
        .timeout(params.timeout)
        .open()
        .map_err(|e| TransportError::Serial(e.to_string()))?;

    Ok((port, port_name))
}

type SharedPort = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

fn lock_port(io: &SharedPort) -> MutexGuard<'_, Option<Box<dyn SerialPort>>> {
    io.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State shared between the owning link and its background receive loop
#[derive(Clone)]
struct SerialShared {
    io: SharedPort,
    connected: Arc<AtomicBool>,
    events: Sender<TransportEvent>,
}

impl SerialShared {
    fn new(events: Sender<TransportEvent>) -> Self {
        Self {
            io: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Tear down after an I/O failure: error event, handle dropped,
    /// `Disconnected` emitted once
    fn mark_lost(&self, error: TransportError) {
        warn!(%error, "serial link lost");
        let _ = self.events.send(TransportEvent::Error(error));
        lock_port(&self.io).take();
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Disconnected);
        }
    }

    fn send(&self, data: &[u8]) -> bool {
        let mut guard = lock_port(&self.io);
        let Some(port) = guard.as_mut() else {
            debug!("serial send refused: not connected");
            return false;
        };
        let result = port.write_all(data).and_then(|()| port.flush());
        drop(guard);

        match result {
            Ok(()) => {
                debug!(bytes = data.len(), "serial sent");
                true
            }
            Err(e) => {
                self.mark_lost(TransportError::SendFailed(e.to_string()));
                false
            }
        }
    }

    /// One bounded receive attempt; the I/O lock is released between poll
    /// slices so a concurrent send never starves
    fn receive(&self, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut guard = lock_port(&self.io);
                let Some(port) = guard.as_mut() else {
                    return None;
                };
                match port.bytes_to_read() {
                    Ok(0) => {}
                    Ok(available) => {
                        let to_read = (available as usize).min(RECEIVE_BUFFER_SIZE);
                        let mut buf = vec![0u8; to_read];
                        match port.read(&mut buf) {
                            Ok(0) => {}
                            Ok(n) => {
                                buf.truncate(n);
                                debug!(bytes = n, "serial received");
                                return Some(buf);
                            }
                            Err(ref e)
                                if e.kind() == std::io::ErrorKind::TimedOut
                                    || e.kind() == std::io::ErrorKind::WouldBlock => {}
                            Err(e) => {
                                drop(guard);
                                self.mark_lost(TransportError::Serial(e.to_string()));
                                return None;
                            }
                        }
                    }
                    Err(e) => {
                        drop(guard);
                        self.mark_lost(TransportError::Serial(e.to_string()));
                        return None;
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            std::thread::sleep(POLL_SLICE.min(deadline - now));
        }
    }
}

/// Shared implementation behind [`SerialLink`] and [`UsbLink`]
///
/// [`UsbLink`]: super::UsbLink
pub(crate) struct SerialCore {
    shared: SerialShared,
    usb_only: bool,
    settings: SerialParams,
    resolved_port: String,
    reader: Option<ReceiveLoop>,
}

impl SerialCore {
    pub(crate) fn new(events: Sender<TransportEvent>, usb_only: bool) -> Self {
        Self {
            shared: SerialShared::new(events),
            usb_only,
            settings: SerialParams::default(),
            resolved_port: String::new(),
            reader: None,
        }
    }

    pub(crate) fn connect(&mut self, params: &ConnectParams) -> bool {
        let ConnectParams::Serial(serial_params) = params else {
            let _ = self
                .shared
                .events
                .send(TransportEvent::Error(TransportError::ParamMismatch {
                    transport: "serial",
                    given: params.label(),
                }));
            return false;
        };

        if self.is_connected() {
            self.disconnect();
        }

        match open_port(serial_params, self.usb_only) {
            Ok((port, name)) => {
                *lock_port(&self.shared.io) = Some(port);
                self.shared.connected.store(true, Ordering::SeqCst);
                self.settings = serial_params.clone();
                self.resolved_port = name.clone();
                info!(
                    port = %name,
                    baud = serial_params.baud_rate,
                    "serial connected"
                );
                let _ = self.shared.events.send(TransportEvent::Connected(name));
                true
            }
            Err(e) => {
                warn!(error = %e, "serial connect failed");
                let _ = self.shared.events.send(TransportEvent::Error(e));
                false
            }
        }
    }

    pub(crate) fn disconnect(&mut self) -> bool {
        self.stop_receiving();
        lock_port(&self.shared.io).take();
        if self.shared.connected.swap(false, Ordering::SeqCst) {
            info!(port = %self.resolved_port, "serial disconnected");
            let _ = self.shared.events.send(TransportEvent::Disconnected);
        }
        true
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    pub(crate) fn send(&mut self, data: &[u8]) -> bool {
        self.shared.send(data)
    }

    pub(crate) fn receive(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        self.shared.receive(timeout)
    }

    pub(crate) fn start_receiving(&mut self) {
        if self.reader.is_some() {
            return;
        }
        let shared = self.shared.clone();
        let mut was_connected = false;
        self.reader = Some(ReceiveLoop::spawn(move || {
            if shared.is_connected() {
                was_connected = true;
                if let Some(data) = shared.receive(RECEIVE_POLL_INTERVAL) {
                    if shared.events.send(TransportEvent::Data(data)).is_err() {
                        return LoopStep::Stop;
                    }
                }
                LoopStep::Continue
            } else if was_connected {
                // Connection went away; the teardown path already reported it
                LoopStep::Stop
            } else {
                std::thread::sleep(RECEIVE_POLL_INTERVAL);
                LoopStep::Continue
            }
        }));
    }

    pub(crate) fn stop_receiving(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.stop();
        }
    }

    pub(crate) fn status(&self) -> TransportStatus {
        TransportStatus::Serial(SerialStatus {
            connected: self.is_connected(),
            port: self.resolved_port.clone(),
            baud_rate: self.settings.baud_rate,
            data_bits: self.settings.data_bits,
            parity: self.settings.parity,
            stop_bits: self.settings.stop_bits,
            timeout_secs: self.settings.timeout.as_secs_f64(),
        })
    }
}

impl Drop for SerialCore {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Dedicated serial (RS232/RS485) link
pub struct SerialLink {
    core: SerialCore,
}

impl SerialLink {
    /// Create a link that reports events on `events`
    pub fn new(events: Sender<TransportEvent>) -> Self {
        Self {
            core: SerialCore::new(events, false),
        }
    }
}

impl Transport for SerialLink {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::Serial
    }

    fn connect(&mut self, params: &ConnectParams) -> bool {
        self.core.connect(params)
    }

    fn disconnect(&mut self) -> bool {
        self.core.disconnect()
    }

    fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    fn send(&mut self, data: &[u8]) -> bool {
        self.core.send(data)
    }

    fn receive(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        self.core.receive(timeout)
    }

    fn start_receiving(&mut self) {
        self.core.start_receiving()
    }

    fn stop_receiving(&mut self) {
        self.core.stop_receiving()
    }

    fn status(&self) -> TransportStatus {
        self.core.status()
    }
}

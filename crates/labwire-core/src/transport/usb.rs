//! USB-serial link
//!
//! Same wire behavior as the dedicated serial link; the difference is port
//! auto-detection, which only considers USB-enumerated devices so a fixed
//! RS232 port never shadows the instrument's USB adapter.

use std::sync::mpsc::Sender;
use std::time::Duration;

use super::serial::{list_usb_ports, SerialCore};
use super::{
    ConnectParams, InterfaceKind, PortInfo, Transport, TransportEvent, TransportStatus,
};

/// USB-serial link
pub struct UsbLink {
    core: SerialCore,
}

impl UsbLink {
    /// Create a link that reports events on `events`
    pub fn new(events: Sender<TransportEvent>) -> Self {
        Self {
            core: SerialCore::new(events, true),
        }
    }

    /// Enumerate candidate USB serial devices
    pub fn list_ports() -> Vec<PortInfo> {
        list_usb_ports()
    }
}

impl Transport for UsbLink {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::Usb
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

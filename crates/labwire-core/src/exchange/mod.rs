//! Communication orchestrator
//!
//! Wires the configured transport to the configured codec: outbound results
//! are generated and sent, inbound byte buffers are logged, parsed with the
//! currently configured protocol, and handed to the application callback.
//! The transport is exclusively owned here; the background receive loop and
//! the dispatch thread communicate only through the event channel.

mod error;
mod log;

pub use error::ExchangeError;
pub use log::{LogDirection, LogRecord, MessageLog, MAX_LOG_RECORDS};

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::astm::{self, AstmGenerator, AstmOptions};
use crate::config::{InterchangeConfig, ProtocolKind};
use crate::hl7::{self, Hl7Generator, Hl7Options};
use crate::message::{ObservationResult, OrderInfo, ParsedMessage, PatientInfo};
use crate::transport::{
    ConnectParams, InterfaceKind, LanLink, SerialLink, Transport, TransportEvent, TransportStatus,
    UsbLink,
};

/// Inbound-message callback: raw bytes plus the parsed structure when the
/// configured codec could make sense of them
pub type MessageCallback = Arc<dyn Fn(&[u8], Option<&ParsedMessage>) + Send + Sync>;

/// Connection-status callback: connected flag plus a short description
pub type StatusCallback = Arc<dyn Fn(bool, &str) + Send + Sync>;

/// Error callback: the error plus the operation it occurred in
pub type ErrorCallback = Arc<dyn Fn(&ExchangeError, &str) + Send + Sync>;

#[derive(Default)]
struct Slots {
    on_message: Option<MessageCallback>,
    on_status: Option<StatusCallback>,
    on_error: Option<ErrorCallback>,
}

/// Callback slots shared with the dispatch thread
#[derive(Clone, Default)]
struct Callbacks {
    slots: Arc<Mutex<Slots>>,
}

impl Callbacks {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn message(&self, raw: &[u8], parsed: Option<&ParsedMessage>) {
        let callback = self.lock().on_message.clone();
        if let Some(callback) = callback {
            callback(raw, parsed);
        }
    }

    fn status(&self, connected: bool, detail: &str) {
        let callback = self.lock().on_status.clone();
        if let Some(callback) = callback {
            callback(connected, detail);
        }
    }

    fn error(&self, error: &ExchangeError, context: &str) {
        let callback = self.lock().on_error.clone();
        if let Some(callback) = callback {
            callback(error, context);
        }
    }
}

/// Orchestrator status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeStatus {
    pub connected: bool,
    pub interface: String,
    pub protocol: String,
    pub communication: String,
    pub id_mode: String,
    pub messages_logged: usize,
    /// Transport details when a link has been constructed
    pub transport: Option<TransportStatus>,
}

/// The communication orchestrator
///
/// One `Exchange` owns at most one live transport. Outbound sends refuse
/// rather than fail loudly when preconditions are unmet; every error reaches
/// the caller through the error callback, never as a panic.
pub struct Exchange {
    config: Arc<Mutex<InterchangeConfig>>,
    config_path: Option<PathBuf>,
    transport: Option<Box<dyn Transport>>,
    events_tx: Option<Sender<TransportEvent>>,
    dispatch: Option<JoinHandle<()>>,
    log: MessageLog,
    callbacks: Callbacks,
    hl7: Hl7Generator,
    astm: AstmGenerator,
}

fn lock_config(config: &Arc<Mutex<InterchangeConfig>>) -> MutexGuard<'_, InterchangeConfig> {
    config.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Exchange {
    /// Create an orchestrator with an explicit configuration
    pub fn new(config: InterchangeConfig) -> Self {
        let config = Arc::new(Mutex::new(config));
        let log = MessageLog::new();
        let callbacks = Callbacks::default();

        let (events_tx, events_rx) = mpsc::channel();
        let dispatch = spawn_dispatch(
            events_rx,
            Arc::clone(&config),
            log.clone(),
            callbacks.clone(),
        );

        Self {
            config,
            config_path: None,
            transport: None,
            events_tx: Some(events_tx),
            dispatch: Some(dispatch),
            log,
            callbacks,
            hl7: Hl7Generator::new(),
            astm: AstmGenerator::new(),
        }
    }

    /// Create an orchestrator that loads (and can reload) its configuration
    /// from a JSON document
    pub fn with_config_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut exchange = Self::new(InterchangeConfig::load(&path));
        exchange.config_path = Some(path);
        exchange
    }

    /// Register the inbound-message callback
    pub fn on_message(&self, callback: impl Fn(&[u8], Option<&ParsedMessage>) + Send + Sync + 'static) {
        self.callbacks.lock().on_message = Some(Arc::new(callback));
    }

    /// Register the connection-status callback
    pub fn on_status(&self, callback: impl Fn(bool, &str) + Send + Sync + 'static) {
        self.callbacks.lock().on_status = Some(Arc::new(callback));
    }

    /// Register the error callback
    pub fn on_error(&self, callback: impl Fn(&ExchangeError, &str) + Send + Sync + 'static) {
        self.callbacks.lock().on_error = Some(Arc::new(callback));
    }

    /// Current configuration (copy)
    pub fn config(&self) -> InterchangeConfig {
        lock_config(&self.config).clone()
    }

    /// Re-read the configuration document
    ///
    /// When the interface value changed, a live transport is disconnected
    /// and dropped so the next connect builds the newly selected kind.
    pub fn reload_config(&mut self) -> bool {
        let Some(path) = self.config_path.clone() else {
            warn!("no configuration path to reload from");
            return false;
        };
        let new_config = InterchangeConfig::load(&path);
        let interface_changed = {
            let current = lock_config(&self.config);
            current.interface != new_config.interface
        };

        if interface_changed {
            info!("interface changed, reconnection required");
            if self.is_connected() {
                self.disconnect();
            }
            self.transport = None;
        }

        *lock_config(&self.config) = new_config;
        true
    }

    /// Connect using the configured interface
    ///
    /// Builds the matching transport lazily, delegates the connect, and on
    /// success starts the background receive loop.
    pub fn connect(&mut self, params: &ConnectParams) -> bool {
        let interface = lock_config(&self.config).interface.clone();
        let kind = match InterfaceKind::from_str(&interface) {
            Ok(kind) => kind,
            Err(value) => {
                let error = ExchangeError::UnknownInterface(value);
                warn!(%error, "cannot connect");
                self.callbacks.error(&error, "connect");
                return false;
            }
        };

        if self.transport.as_ref().map(|t| t.kind()) != Some(kind) {
            let Some(events) = self.events_tx.clone() else {
                return false;
            };
            self.transport = Some(build_transport(kind, events));
            debug!(interface = %kind, "transport initialized");
        }
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };

        let ok = transport.connect(params);
        if ok {
            transport.start_receiving();
            info!(interface = %kind, "connected");
            self.callbacks
                .status(true, &format!("connected via {kind}"));
        } else {
            warn!(interface = %kind, "connection failed");
            self.callbacks.status(false, "connection failed");
        }
        ok
    }

    /// Disconnect the live transport, if any
    pub fn disconnect(&mut self) -> bool {
        match self.transport.as_mut() {
            Some(transport) => transport.disconnect(),
            None => true,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|t| t.is_connected())
    }

    /// Generate an HL7 ORU^R01 message and send it
    ///
    /// Refuses (returns false, no I/O) when disconnected or when the
    /// configured protocol is not HL7.
    pub fn send_hl7(
        &mut self,
        patient: &PatientInfo,
        order: &OrderInfo,
        observations: &[ObservationResult],
        options: &Hl7Options,
    ) -> bool {
        if !self.check_sendable(ProtocolKind::Hl7) {
            return false;
        }
        let message = self.hl7.generate(patient, order, observations, options);
        self.send_generated(message.into_bytes(), "HL7")
    }

    /// Generate an ASTM E1394 message and send it
    ///
    /// Refuses (returns false, no I/O) when disconnected or when the
    /// configured protocol is not ASTM.
    pub fn send_astm(
        &mut self,
        patient: &PatientInfo,
        order: &OrderInfo,
        results: &[ObservationResult],
        options: &AstmOptions,
    ) -> bool {
        if !self.check_sendable(ProtocolKind::Astm) {
            return false;
        }
        let message = self.astm.generate(patient, order, results, options);
        self.send_generated(message.into_bytes(), "ASTM")
    }

    /// Send raw bytes, bypassing the codecs
    pub fn send_raw(&mut self, data: &[u8]) -> bool {
        if !self.is_connected() {
            warn!("not connected - cannot send raw message");
            return false;
        }
        self.log.push(LogDirection::Sent, "RAW", data);
        self.transport_send(data)
    }

    /// Current service status
    pub fn status(&self) -> ExchangeStatus {
        let config = lock_config(&self.config).clone();
        ExchangeStatus {
            connected: self.is_connected(),
            interface: config.interface,
            protocol: config.protocol,
            communication: config.communication,
            id_mode: config.id,
            messages_logged: self.log.len(),
            transport: self.transport.as_ref().map(|t| t.status()),
        }
    }

    /// Snapshot of the most recent log records
    pub fn message_log(&self, limit: Option<usize>) -> Vec<LogRecord> {
        self.log.snapshot(limit)
    }

    pub fn clear_message_log(&self) {
        self.log.clear();
    }

    /// Verify the connection is up and the configured protocol matches the
    /// requested generator; a mismatch is reported, never coerced
    fn check_sendable(&self, requested: ProtocolKind) -> bool {
        if !self.is_connected() {
            warn!("not connected - cannot send message");
            return false;
        }
        let configured = lock_config(&self.config).protocol.clone();
        match configured.parse::<ProtocolKind>() {
            Ok(kind) if kind == requested => true,
            Ok(_) => {
                let error = ExchangeError::ProtocolMismatch {
                    configured,
                    requested: requested.to_string(),
                };
                warn!(%error, "send refused");
                self.callbacks.error(&error, "send");
                false
            }
            Err(value) => {
                let error = ExchangeError::UnknownProtocol(value);
                warn!(%error, "send refused");
                self.callbacks.error(&error, "send");
                false
            }
        }
    }

    fn send_generated(&mut self, bytes: Vec<u8>, protocol: &str) -> bool {
        self.log.push(LogDirection::Sent, protocol, &bytes);
        let ok = self.transport_send(&bytes);
        if ok {
            info!(protocol, bytes = bytes.len(), "message sent");
        } else {
            warn!(protocol, "failed to send message");
        }
        ok
    }

    fn transport_send(&mut self, data: &[u8]) -> bool {
        match self.transport.as_mut() {
            Some(transport) => transport.send(data),
            None => false,
        }
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        self.disconnect();
        // Dropping the transport and our sender closes the event channel,
        // which ends the dispatch thread
        self.transport = None;
        self.events_tx = None;
        if let Some(dispatch) = self.dispatch.take() {
            let _ = dispatch.join();
        }
    }
}

fn build_transport(kind: InterfaceKind, events: Sender<TransportEvent>) -> Box<dyn Transport> {
    match kind {
        InterfaceKind::Usb => Box::new(UsbLink::new(events)),
        InterfaceKind::Serial => Box::new(SerialLink::new(events)),
        InterfaceKind::Lan => Box::new(LanLink::new(events)),
    }
}

/// Spawn the thread that routes transport events to the log, the configured
/// parser, and the application callbacks
fn spawn_dispatch(
    events: Receiver<TransportEvent>,
    config: Arc<Mutex<InterchangeConfig>>,
    log: MessageLog,
    callbacks: Callbacks,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in events {
            match event {
                TransportEvent::Data(bytes) => {
                    let protocol = lock_config(&config).protocol.clone();
                    log.push(LogDirection::Received, &protocol, &bytes);

                    let text = String::from_utf8_lossy(&bytes);
                    let parsed = match protocol.parse::<ProtocolKind>() {
                        Ok(ProtocolKind::Hl7) => hl7::parse_message(&text).ok(),
                        Ok(ProtocolKind::Astm) => astm::parse_message(&text).ok(),
                        Err(_) => None,
                    };
                    if parsed.is_none() {
                        // Raw bytes still reach the caller; dropping
                        // diagnostic traffic silently would be worse
                        debug!(bytes = bytes.len(), %protocol, "inbound message did not parse");
                    }
                    callbacks.message(&bytes, parsed.as_ref());
                }
                TransportEvent::Connected(endpoint) => {
                    callbacks.status(true, &endpoint);
                }
                TransportEvent::Disconnected => {
                    callbacks.status(false, "connection lost");
                }
                TransportEvent::Error(error) => {
                    callbacks.error(&ExchangeError::Transport(error), "transport");
                }
            }
        }
    })
}

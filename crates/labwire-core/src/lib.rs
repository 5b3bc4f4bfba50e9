//! # LabWire Core Library
//!
//! Result-interchange core for IVD instruments.
//!
//! This library provides:
//! - HL7 v2.5 ORU^R01 message generation and parsing
//! - ASTM E1394 record generation and parsing, with optional
//!   STX/ETX/checksum framing
//! - Interchangeable transport links: USB-serial, dedicated serial, and
//!   TCP/IP LAN (client or listening server)
//! - A communication orchestrator that wires the configured transport to the
//!   configured codec, with a bounded message log and callback delivery
//!
//! ## Example
//!
//! ```rust,ignore
//! use labwire_core::prelude::*;
//!
//! let mut exchange = Exchange::with_config_path("config/utilities_config.json");
//! exchange.on_message(|raw, parsed| {
//!     println!("received {} bytes, parsed: {}", raw.len(), parsed.is_some());
//! });
//!
//! exchange.connect(&ConnectParams::Lan(LanParams::default()));
//! exchange.send_hl7(&patient, &order, &observations, &Hl7Options::default());
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod astm;
pub mod config;
pub mod exchange;
pub mod hl7;
pub mod message;
pub mod transport;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::astm::{AstmGenerator, AstmOptions};
    pub use crate::config::{InterchangeConfig, ProtocolKind};
    pub use crate::exchange::{Exchange, ExchangeError, ExchangeStatus, LogRecord};
    pub use crate::hl7::{Hl7Generator, Hl7Options};
    pub use crate::message::{
        CommentRecord, ObservationResult, OrderInfo, ParsedMessage, PatientInfo,
    };
    pub use crate::transport::{
        ConnectParams, InterfaceKind, LanMode, LanParams, SerialParams, Transport,
        TransportStatus,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

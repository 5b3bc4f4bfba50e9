//! Orchestrator errors

use thiserror::Error;

use crate::transport::TransportError;

/// Errors reported through the orchestrator's error callback
///
/// All of these are local and recoverable; nothing in the interchange core
/// is fatal. The worst case is "stay disconnected, report status".
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("unknown interface '{0}'")]
    UnknownInterface(String),

    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),

    #[error("protocol mismatch: configured for {configured}, but sending {requested}")]
    ProtocolMismatch {
        configured: String,
        requested: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

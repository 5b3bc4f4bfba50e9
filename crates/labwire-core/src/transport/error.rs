//! Transport errors

use thiserror::Error;

/// Errors that can occur on a transport link
///
/// These never propagate as panics; the bool-returning [`Transport`] surface
/// reports them through the event channel.
///
/// [`Transport`]: super::Transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("serial port error: {0}")]
    Serial(String),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("no serial ports detected")]
    NoPortsFound,

    #[error("connect timeout to {0}")]
    ConnectTimeout(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("not connected")]
    NotConnected,

    #[error("unsupported parameter: {0}")]
    Unsupported(String),

    #[error("wrong parameter kind for {transport} transport: {given}")]
    ParamMismatch {
        transport: &'static str,
        given: &'static str,
    },
}

use super::handshake::HandshakeError;
use crate::config::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// The error type for establishing a device link.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Device '{device}' not found")]
    DeviceNotFound { device: String },

    #[error("Parameter negotiation failed: {reason}")]
    NegotiationFailed { reason: String },

    #[error("Device is busy with another mirroring session")]
    TransportBusy,

    #[error("Device does not accept connections over {transport}")]
    UnsupportedTransport { transport: super::TransportKind },

    #[error("Invalid link parameters: {0}")]
    InvalidParams(#[from] ConfigError),

    #[error("Operation timed out after {duration:?}: {description}")]
    Timeout {
        duration: Duration,
        description: String,
    },

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ADB server request failed: {0}")]
    Adb(#[from] adb_client::RustADBError),

    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Task failed to complete: {source}")]
    JoinError {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl ConnectError {
    /// Failures that a later, caller-initiated reconnect may resolve.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectError::TransportBusy
                | ConnectError::Timeout { .. }
                | ConnectError::Io(_)
        )
    }
}

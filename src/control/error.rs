use thiserror::Error;

/// The error type for control channel operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Control channel disconnected")]
    Disconnected,

    #[error("Control queue is full ({capacity} messages pending)")]
    ChannelBusy { capacity: usize },

    #[error("All {limit} touch pointers are in use")]
    PointerExhausted { limit: u8 },
}

impl ChannelError {
    /// True when the link is gone and retrying cannot succeed.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ChannelError::Disconnected)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("Unknown control message type {0:#04x}")]
    UnknownType(u8),
}

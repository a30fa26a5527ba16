// Link module - connection lifecycle for one device
// USB goes through an ADB port forward, WiFi connects directly. Both end up
// as two TCP sockets: video first (carries the handshake), then control.

pub mod error;
pub mod handshake;
pub mod session;
pub mod state;

#[cfg(test)]
mod tests;

pub use error::ConnectError;
pub use handshake::{ClientHello, DeviceHello, HandshakeError, HelloStatus};
pub use session::{Device, DeviceLink, Session, TransportKind, VideoParams};
pub use state::{LinkState, LinkStatus};

// Control module - touch and key injection towards the device
// One writer task owns the control socket; every caller enqueues through a
// cloned `ControlChannel` handle.

pub mod channel;
pub mod error;
pub mod keycodes;
pub mod message;
pub mod pointers;


pub use channel::{ControlChannel, SendMode};
pub use error::{ChannelError, MessageError};
pub use keycodes::keycode_for;
pub use message::{ControlMessage, Point};
pub use pointers::{PointerLease, PointerPool};

// ADB module - device discovery and USB port forwarding
// All calls go through the local ADB server (adb_client); the blocking client
// runs on tokio's blocking pool behind a timeout.

pub mod forward;
pub mod types;

#[cfg(test)]
mod tests;

pub use forward::{AdbTunnel, list_devices, query_screen_size};
pub use types::{AdbDevice, forward_specs, parse_screen_size};

// https://crates.io/crates/adb_client
use super::types::{AdbDevice, forward_specs, parse_screen_size};
use crate::link::ConnectError;
use adb_client::{ADBDeviceExt, ADBServer};
use log::{debug, info, warn};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Runs a blocking ADB server request on the blocking pool with a deadline.
async fn with_server<T, F>(timeout: Duration, description: &str, f: F) -> Result<T, ConnectError>
where
    T: Send + 'static,
    F: FnOnce(&mut ADBServer) -> Result<T, ConnectError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || {
        let mut server = ADBServer::default();
        f(&mut server)
    });
    tokio::time::timeout(timeout, task)
        .await
        .map_err(|_| ConnectError::Timeout {
            duration: timeout,
            description: description.to_string(),
        })??
}

pub async fn list_devices(timeout: Duration) -> Result<Vec<AdbDevice>, ConnectError> {
    with_server(timeout, "adb devices", |server| {
        let devices = server.devices()?;
        Ok(devices
            .into_iter()
            .map(|d| AdbDevice {
                serial: d.identifier,
                state: format!("{:?}", d.state).to_lowercase(),
            })
            .collect())
    })
    .await
}

/// Screen size as reported by `wm size`, if the output could be parsed.
pub async fn query_screen_size(
    serial: &str,
    timeout: Duration,
) -> Result<Option<(u32, u32)>, ConnectError> {
    let serial = serial.to_string();
    with_server(timeout, "wm size", move |server| {
        let mut device = server.get_device_by_name(&serial)?;
        let mut out: Vec<u8> = Vec::new();
        device.shell_command(&["wm", "size"], &mut out)?;
        Ok(parse_screen_size(&String::from_utf8_lossy(&out)))
    })
    .await
}

/// A `localabstract` socket on the device forwarded to a local TCP port.
#[derive(Debug)]
pub struct AdbTunnel {
    serial: String,
    local_port: u16,
    timeout: Duration,
}

impl AdbTunnel {
    pub async fn open(
        serial: &str,
        socket_name: &str,
        local_port: u16,
        timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let device_serial = serial.to_string();
        let (remote, local) = forward_specs(socket_name, local_port);
        with_server(timeout, "adb forward", move |server| {
            let known = server.devices()?;
            if !known.iter().any(|d| d.identifier == device_serial) {
                return Err(ConnectError::DeviceNotFound {
                    device: device_serial,
                });
            }
            let mut device = server.get_device_by_name(&device_serial)?;
            debug!("adb -s {} forward {} {}", device_serial, local, remote);
            device.forward(remote, local)?;
            Ok(())
        })
        .await?;

        info!("🔌 Forwarded tcp:{} to {} on {}", local_port, socket_name, serial);
        Ok(Self {
            serial: serial.to_string(),
            local_port,
            timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.local_port))
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Removes the forward. Failures are logged; the device may be gone.
    pub async fn close(self) {
        let serial = self.serial.clone();
        let result = with_server(self.timeout, "adb forward --remove-all", move |server| {
            let mut device = server.get_device_by_name(&serial)?;
            device.forward_remove_all()?;
            Ok(())
        })
        .await;
        if let Err(e) = result {
            warn!("Could not remove forward for {}: {}", self.serial, e);
        }
    }
}

// Core ADB types
use serde::Serialize;

/// A device known to the ADB server.
#[derive(Debug, PartialEq, Serialize, Clone)]
pub struct AdbDevice {
    pub serial: String,
    /// Server-reported state, e.g. "device", "unauthorized", "offline"
    pub state: String,
}

impl AdbDevice {
    pub fn is_ready(&self) -> bool {
        self.state.eq_ignore_ascii_case("device")
    }
}

/// `(remote, local)` arguments for `adb forward` to a device-side abstract socket.
pub fn forward_specs(socket_name: &str, local_port: u16) -> (String, String) {
    (
        format!("localabstract:{socket_name}"),
        format!("tcp:{local_port}"),
    )
}

/// Parses `wm size` output. An override size wins over the physical one.
pub fn parse_screen_size(stdout: &str) -> Option<(u32, u32)> {
    let mut physical = None;
    let mut override_size = None;
    for line in stdout.lines() {
        let (slot, size_str) = if let Some(rest) = line.strip_prefix("Physical size: ") {
            (&mut physical, rest)
        } else if let Some(rest) = line.strip_prefix("Override size: ") {
            (&mut override_size, rest)
        } else {
            continue;
        };
        let parts: Vec<&str> = size_str.trim().split('x').collect();
        if parts.len() == 2
            && let (Ok(x), Ok(y)) = (parts[0].parse::<u32>(), parts[1].parse::<u32>())
        {
            *slot = Some((x, y));
        }
    }
    override_size.or(physical)
}

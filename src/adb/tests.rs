// Tests for ADB helpers that do not need a device

use super::*;

#[test]
fn test_parse_physical_size() {
    let out = "Physical size: 1080x2400\n";
    assert_eq!(parse_screen_size(out), Some((1080, 2400)));
}

#[test]
fn test_override_size_wins() {
    let out = "Physical size: 1440x3200\nOverride size: 1080x2400\n";
    assert_eq!(parse_screen_size(out), Some((1080, 2400)));
}

#[test]
fn test_unparseable_size() {
    assert_eq!(parse_screen_size("error: no devices/emulators found"), None);
    assert_eq!(parse_screen_size("Physical size: 1080 by 2400"), None);
}

#[test]
fn test_forward_specs() {
    let (remote, local) = forward_specs("scrcpy", 27183);
    assert_eq!(remote, "localabstract:scrcpy");
    assert_eq!(local, "tcp:27183");
}

#[test]
fn test_device_ready_state() {
    let dev = AdbDevice {
        serial: "R58M123".into(),
        state: "device".into(),
    };
    assert!(dev.is_ready());
    let dev = AdbDevice {
        state: "unauthorized".into(),
        ..dev
    };
    assert!(!dev.is_ready());
}

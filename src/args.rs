use android_mirror_run::config::{LinkConfig, Resolution, VideoCodec};
use android_mirror_run::link::TransportKind;
use std::env;

#[derive(Debug, Clone)]
pub enum Target {
    /// First ready device reported by the ADB server
    FirstUsb,
    Usb(String),
    Wifi(String),
}

#[derive(Debug)]
pub struct Args {
    pub target: Target,
    pub list_only: bool,
    pub debug_mode: bool,
    pub timeout_secs: Option<u64>,
    pub link: LinkConfig,
}

impl Args {
    pub fn parse() -> Option<Self> {
        Self::parse_from(env::args().skip(1))
    }

    pub fn parse_from(args: impl IntoIterator<Item = String>) -> Option<Self> {
        let mut target = Target::FirstUsb;
        let mut list_only = false;
        let mut debug_mode = false;
        let mut timeout_secs: Option<u64> = None;
        let mut link = LinkConfig::default();

        for arg in args {
            if arg == "--help" || arg == "-h" {
                print_help();
                return None;
            } else if arg == "--version" || arg == "-v" {
                println!(
                    "Android Mirror Run v{} ({})",
                    env!("APP_VERSION_DISPLAY"),
                    env!("APP_BUILD_YEAR")
                );
                return None;
            } else if arg == "--debug" {
                debug_mode = true;
            } else if arg == "--list" || arg == "-l" {
                list_only = true;
            } else if let Some(serial) = arg.strip_prefix("--serial=") {
                target = Target::Usb(serial.to_string());
            } else if let Some(addr) = arg.strip_prefix("--wifi=") {
                target = Target::Wifi(addr.to_string());
            } else if let Some(val) = arg.strip_prefix("--max-fps=") {
                link.max_fps = number("max-fps", val)?;
            } else if let Some(val) = arg.strip_prefix("--bitrate=") {
                link.bitrate_bps = number("bitrate", val)?;
            } else if let Some(val) = arg.strip_prefix("--max-size=") {
                link.resolution = match number::<u16>("max-size", val)? {
                    0 => Resolution::Original,
                    size => Resolution::MaxSize(size),
                };
            } else if let Some(val) = arg.strip_prefix("--touch-points=") {
                link.touch_points = number("touch-points", val)?;
            } else if let Some(val) = arg.strip_prefix("--codec=") {
                match VideoCodec::parse(val) {
                    Some(codec) => link.codec = codec,
                    None => {
                        eprintln!(
                            "❌ Unknown codec '{}', expected mjpeg, rgba, rgb565 or h264",
                            val
                        );
                        return None;
                    }
                }
            } else if let Some(val) = arg.strip_prefix("--timeout=") {
                timeout_secs = Some(number("timeout", val)?);
            } else {
                eprintln!("❌ Unknown argument: {}", arg);
                print_help();
                return None;
            }
        }

        Some(Args {
            target,
            list_only,
            debug_mode,
            timeout_secs,
            link,
        })
    }

    pub fn transport(&self) -> TransportKind {
        match self.target {
            Target::Wifi(_) => TransportKind::Wifi,
            Target::FirstUsb | Target::Usb(_) => TransportKind::Usb,
        }
    }
}

fn number<T: std::str::FromStr>(flag: &str, val: &str) -> Option<T> {
    match val.parse::<T>() {
        Ok(n) => Some(n),
        Err(_) => {
            eprintln!("❌ Invalid {} value: {}", flag, val);
            None
        }
    }
}

fn print_help() {
    println!("📱 Android Mirror Run");
    println!();
    println!("USAGE:");
    println!("    android-mirror-run [FLAGS]");
    println!();
    println!("FLAGS:");
    println!("    (no flags)          Mirror the first ready USB device");
    println!("    --serial=SERIAL     Mirror this ADB device over USB");
    println!("    --wifi=HOST[:PORT]  Mirror a device over WiFi");
    println!("    --list, -l          List devices known to the ADB server and exit");
    println!("    --max-fps=N         Frame-rate cap, 0 = unlimited (default 0)");
    println!("    --bitrate=BPS       Video bitrate in bits per second (default 8000000)");
    println!("    --max-size=N        Longest video side in pixels, 0 = original");
    println!("    --touch-points=N    Simultaneous touch contacts, 1-10 (default 10)");
    println!("    --codec=NAME        mjpeg, rgba, rgb565 or h264 (default mjpeg)");
    println!("    --timeout=N         Disconnect after N seconds");
    println!("    --debug             Enable debug logging");
    println!("    --help, -h          Show this help message");
    println!("    --version, -v       Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    android-mirror-run --list");
    println!("    android-mirror-run --serial=emulator-5554 --max-fps=30");
    println!("    android-mirror-run --wifi=192.168.1.20 --timeout=60 --debug");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Option<Args> {
        Args::parse_from(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_defaults_pick_first_usb_device() {
        let args = parse(&[]).unwrap();
        assert!(matches!(args.target, Target::FirstUsb));
        assert_eq!(args.transport(), TransportKind::Usb);
        assert!(!args.list_only);
        assert_eq!(args.link.max_fps, 0);
    }

    #[test]
    fn test_link_flags_are_applied() {
        let args = parse(&[
            "--wifi=10.0.0.5:27183",
            "--max-fps=30",
            "--max-size=1024",
            "--touch-points=2",
            "--codec=rgba",
            "--timeout=5",
        ])
        .unwrap();
        assert!(matches!(&args.target, Target::Wifi(addr) if addr == "10.0.0.5:27183"));
        assert_eq!(args.transport(), TransportKind::Wifi);
        assert_eq!(args.link.max_fps, 30);
        assert_eq!(args.link.resolution, Resolution::MaxSize(1024));
        assert_eq!(args.link.touch_points, 2);
        assert_eq!(args.link.codec, VideoCodec::RawRgba);
        assert_eq!(args.timeout_secs, Some(5));
    }

    #[test]
    fn test_bad_values_are_rejected() {
        assert!(parse(&["--max-fps=fast"]).is_none());
        assert!(parse(&["--codec=vp9"]).is_none());
        assert!(parse(&["--frobnicate"]).is_none());
    }
}

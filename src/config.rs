//! Configuration for the device link, video pipeline, control channel and
//! automation engine.

use crate::automation::trajectory::CurveParams;
use crate::control::Point;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DEVICE_SOCKET: &str = "scrcpy";
pub const DEFAULT_PORT: u16 = 27183;
pub const MAX_TOUCH_POINTS: u8 = 10;
pub const MAX_FPS_CAP: u16 = 999;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} out of range: {value} (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        expected: &'static str,
    },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

fn check_range(
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            expected,
        });
    }
    Ok(())
}

/// Requested stream resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Native device resolution.
    Original,
    /// Longest side capped at this many pixels.
    MaxSize(u16),
}

impl Resolution {
    pub fn wire_value(self) -> u16 {
        match self {
            Resolution::Original => 0,
            Resolution::MaxSize(size) => size,
        }
    }
}

/// Encoding of the video elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Mjpeg,
    RawRgba,
    RawRgb565,
}

impl VideoCodec {
    pub fn wire_id(self) -> u8 {
        match self {
            VideoCodec::H264 => 0,
            VideoCodec::Mjpeg => 1,
            VideoCodec::RawRgba => 2,
            VideoCodec::RawRgb565 => 3,
        }
    }

    pub fn from_wire(id: u8) -> Option<Self> {
        match id {
            0 => Some(VideoCodec::H264),
            1 => Some(VideoCodec::Mjpeg),
            2 => Some(VideoCodec::RawRgba),
            3 => Some(VideoCodec::RawRgb565),
            _ => None,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "h264" => Some(VideoCodec::H264),
            "mjpeg" | "jpeg" => Some(VideoCodec::Mjpeg),
            "rgba" | "raw" => Some(VideoCodec::RawRgba),
            "rgb565" => Some(VideoCodec::RawRgb565),
            _ => None,
        }
    }
}

/// Parameters negotiated with the device during the handshake.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub resolution: Resolution,
    /// Video bitrate in bits per second
    pub bitrate_bps: u32,
    /// Frame-rate cap, 0 = unlimited
    pub max_fps: u16,
    /// Simultaneous touch contacts (1-10)
    pub touch_points: u8,
    pub codec: VideoCodec,
    /// Abstract socket name the device server listens on
    pub device_socket: String,
    /// Local port used for the USB forward
    pub local_port: u16,
    /// Port assumed for WiFi addresses given without one
    pub wifi_port: u16,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::Original,
            bitrate_bps: 8_000_000,
            max_fps: 0,
            touch_points: MAX_TOUCH_POINTS,
            codec: VideoCodec::Mjpeg,
            device_socket: DEFAULT_DEVICE_SOCKET.to_string(),
            local_port: DEFAULT_PORT,
            wifi_port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl LinkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("bitrate_bps", self.bitrate_bps as i64, 1, u32::MAX as i64, ">= 1")?;
        check_range("max_fps", self.max_fps as i64, 0, MAX_FPS_CAP as i64, "0 or 1-999")?;
        check_range(
            "touch_points",
            self.touch_points as i64,
            1,
            MAX_TOUCH_POINTS as i64,
            "1-10",
        )?;
        if let Resolution::MaxSize(size) = self.resolution {
            check_range("max_size", size as i64, 1, u16::MAX as i64, ">= 1")?;
        }
        if self.device_socket.is_empty() {
            return Err(ConfigError::Empty {
                field: "device_socket",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Frames that may be alive at once (decoder, queue and consumers)
    pub pool_capacity: usize,
    /// Encoded units buffered between receiver and decoder
    pub unit_queue: usize,
    /// Largest access unit accepted before the header is treated as corrupt
    pub max_unit_len: usize,
    pub read_chunk: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 4,
            unit_queue: 8,
            max_unit_len: 8 * 1024 * 1024,
            read_chunk: 64 * 1024,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("pool_capacity", self.pool_capacity as i64, 2, 16, "2-16")?;
        check_range("unit_queue", self.unit_queue as i64, 1, 1024, "1-1024")?;
        check_range("max_unit_len", self.max_unit_len as i64, 1, i64::MAX, ">= 1")?;
        check_range("read_chunk", self.read_chunk as i64, 1, i64::MAX, ">= 1")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Outbound messages buffered ahead of the socket writer
    pub queue_capacity: usize,
    /// Longest a blocking enqueue waits for queue space
    pub send_timeout: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            send_timeout: Duration::from_secs(1),
        }
    }
}

/// Virtual joystick geometry in normalized screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelGeometry {
    pub center: Point,
    pub radius: f64,
}

#[derive(Debug, Clone)]
pub struct AutomationConfig {
    /// Interrupt-flag polling granularity inside `sleep`
    pub poll_interval: Duration,
    /// Interrupt sessions that stop calling primitives for this long
    pub watchdog_timeout: Option<Duration>,
    pub slide_curve: CurveParams,
    pub wheel_curve: CurveParams,
    /// Random offset level (0-100), 0 disables jitter
    pub random_offset: u8,
    pub wheel: WheelGeometry,
    /// Where the camera drag pointer is pressed
    pub camera_anchor: Point,
    /// Normalized distance of a full camera deflection
    pub camera_span: f64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            watchdog_timeout: Some(Duration::from_secs(30)),
            slide_curve: CurveParams::new(0, 30),
            wheel_curve: CurveParams::new(0, 0),
            random_offset: 0,
            wheel: WheelGeometry {
                center: Point::new(0.2, 0.75),
                radius: 0.1,
            },
            camera_anchor: Point::new(0.7, 0.5),
            camera_span: 0.2,
        }
    }
}

impl AutomationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "poll_interval_ms",
            self.poll_interval.as_millis() as i64,
            1,
            1000,
            "1-1000",
        )?;
        check_range("random_offset", self.random_offset as i64, 0, 100, "0-100")?;
        Ok(())
    }
}

/// Lowest-latency link: small pool, uncapped frame rate.
pub fn low_latency_config() -> (LinkConfig, PipelineConfig) {
    (
        LinkConfig {
            max_fps: 0,
            ..LinkConfig::default()
        },
        PipelineConfig {
            pool_capacity: 2,
            unit_queue: 2,
            ..PipelineConfig::default()
        },
    )
}

/// Automation tuned to look like a person: eased, curved, jittered motion.
pub fn humanized_automation_config() -> AutomationConfig {
    AutomationConfig {
        slide_curve: CurveParams::new(60, 30),
        wheel_curve: CurveParams::new(40, 0),
        random_offset: 20,
        ..AutomationConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(LinkConfig::default().validate().is_ok());
        assert!(PipelineConfig::default().validate().is_ok());
        assert!(AutomationConfig::default().validate().is_ok());
        assert!(humanized_automation_config().validate().is_ok());
        let (link, pipeline) = low_latency_config();
        assert!(link.validate().is_ok());
        assert!(pipeline.validate().is_ok());
    }

    #[test]
    fn link_limits_are_enforced() {
        let mut config = LinkConfig {
            touch_points: 11,
            ..LinkConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "touch_points",
                ..
            })
        ));
        config.touch_points = 0;
        assert!(config.validate().is_err());
        config.touch_points = 2;
        config.max_fps = 1000;
        assert!(config.validate().is_err());
        config.max_fps = 999;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn pool_must_hold_more_than_the_current_frame() {
        let config = PipelineConfig {
            pool_capacity: 1,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn codec_names_and_wire_ids() {
        assert_eq!(VideoCodec::parse("MJPEG"), Some(VideoCodec::Mjpeg));
        assert_eq!(VideoCodec::parse("vp9"), None);
        for codec in [
            VideoCodec::H264,
            VideoCodec::Mjpeg,
            VideoCodec::RawRgba,
            VideoCodec::RawRgb565,
        ] {
            assert_eq!(VideoCodec::from_wire(codec.wire_id()), Some(codec));
        }
        assert_eq!(VideoCodec::from_wire(9), None);
    }
}

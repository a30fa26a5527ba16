//! Parameter negotiation on the first (video) socket.
//!
//! ```text
//! client -> device  "AMR1" [max_size u16][bitrate u32][max_fps u16]
//!                   [touch_points u8][codec u8]                      14 bytes
//! device -> client  [status u8][name 64 bytes, NUL padded][codec u8]
//!                   [width u32][height u32]                          74 bytes
//! ```
//!
//! Integers are big-endian. A `max_size` of 0 asks for the native resolution.

use crate::config::{LinkConfig, VideoCodec};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAGIC: &[u8; 4] = b"AMR1";
pub const CLIENT_HELLO_LEN: usize = 14;
pub const DEVICE_HELLO_LEN: usize = 74;
pub const DEVICE_NAME_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("I/O during handshake: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad handshake magic {0:?}")]
    BadMagic([u8; 4]),

    #[error("Unknown codec id {0}")]
    UnknownCodec(u8),

    #[error("Unknown handshake status {0}")]
    UnknownStatus(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub max_size: u16,
    pub bitrate: u32,
    pub max_fps: u16,
    pub touch_points: u8,
    pub codec: VideoCodec,
}

impl ClientHello {
    pub fn from_config(config: &LinkConfig) -> Self {
        Self {
            max_size: config.resolution.wire_value(),
            bitrate: config.bitrate_bps,
            max_fps: config.max_fps,
            touch_points: config.touch_points,
            codec: config.codec,
        }
    }

    pub fn encode(&self) -> [u8; CLIENT_HELLO_LEN] {
        let mut out = [0u8; CLIENT_HELLO_LEN];
        out[..4].copy_from_slice(MAGIC);
        out[4..6].copy_from_slice(&self.max_size.to_be_bytes());
        out[6..10].copy_from_slice(&self.bitrate.to_be_bytes());
        out[10..12].copy_from_slice(&self.max_fps.to_be_bytes());
        out[12] = self.touch_points;
        out[13] = self.codec.wire_id();
        out
    }

    pub fn decode(buf: &[u8; CLIENT_HELLO_LEN]) -> Result<Self, HandshakeError> {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[..4]);
        if &magic != MAGIC {
            return Err(HandshakeError::BadMagic(magic));
        }
        Ok(Self {
            max_size: u16::from_be_bytes([buf[4], buf[5]]),
            bitrate: u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]),
            max_fps: u16::from_be_bytes([buf[10], buf[11]]),
            touch_points: buf[12],
            codec: VideoCodec::from_wire(buf[13]).ok_or(HandshakeError::UnknownCodec(buf[13]))?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloStatus {
    Ok,
    Busy,
    UnsupportedTransport,
    UnsupportedCodec,
    BadParams,
}

impl HelloStatus {
    pub fn wire_id(self) -> u8 {
        match self {
            HelloStatus::Ok => 0,
            HelloStatus::Busy => 1,
            HelloStatus::UnsupportedTransport => 2,
            HelloStatus::UnsupportedCodec => 3,
            HelloStatus::BadParams => 4,
        }
    }

    pub fn from_wire(id: u8) -> Result<Self, HandshakeError> {
        Ok(match id {
            0 => HelloStatus::Ok,
            1 => HelloStatus::Busy,
            2 => HelloStatus::UnsupportedTransport,
            3 => HelloStatus::UnsupportedCodec,
            4 => HelloStatus::BadParams,
            other => return Err(HandshakeError::UnknownStatus(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHello {
    pub status: HelloStatus,
    pub device_name: String,
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
}

impl DeviceHello {
    pub fn encode(&self) -> [u8; DEVICE_HELLO_LEN] {
        let mut out = [0u8; DEVICE_HELLO_LEN];
        out[0] = self.status.wire_id();
        let name = self.device_name.as_bytes();
        let n = name.len().min(DEVICE_NAME_LEN - 1);
        out[1..1 + n].copy_from_slice(&name[..n]);
        out[65] = self.codec.wire_id();
        out[66..70].copy_from_slice(&self.width.to_be_bytes());
        out[70..74].copy_from_slice(&self.height.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8; DEVICE_HELLO_LEN]) -> Result<Self, HandshakeError> {
        let status = HelloStatus::from_wire(buf[0])?;
        let name = &buf[1..1 + DEVICE_NAME_LEN];
        let end = name.iter().position(|b| *b == 0).unwrap_or(DEVICE_NAME_LEN);
        Ok(Self {
            status,
            device_name: String::from_utf8_lossy(&name[..end]).into_owned(),
            codec: VideoCodec::from_wire(buf[65]).ok_or(HandshakeError::UnknownCodec(buf[65]))?,
            width: u32::from_be_bytes([buf[66], buf[67], buf[68], buf[69]]),
            height: u32::from_be_bytes([buf[70], buf[71], buf[72], buf[73]]),
        })
    }
}

/// Client side: send our parameters and read the device's answer.
pub async fn negotiate<S>(
    stream: &mut S,
    hello: &ClientHello,
) -> Result<DeviceHello, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&hello.encode()).await?;
    stream.flush().await?;
    let mut reply = [0u8; DEVICE_HELLO_LEN];
    stream.read_exact(&mut reply).await?;
    DeviceHello::decode(&reply)
}

/// Device side: read a client hello. Used by device simulators.
pub async fn accept<S>(stream: &mut S) -> Result<ClientHello, HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; CLIENT_HELLO_LEN];
    stream.read_exact(&mut buf).await?;
    ClientHello::decode(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;

    #[test]
    fn client_hello_layout() {
        let config = LinkConfig {
            resolution: Resolution::MaxSize(1024),
            bitrate_bps: 4_000_000,
            max_fps: 60,
            touch_points: 5,
            codec: VideoCodec::RawRgba,
            ..LinkConfig::default()
        };
        let bytes = ClientHello::from_config(&config).encode();
        assert_eq!(&bytes[..4], b"AMR1");
        assert_eq!(&bytes[4..6], &1024u16.to_be_bytes());
        assert_eq!(&bytes[6..10], &4_000_000u32.to_be_bytes());
        assert_eq!(&bytes[10..12], &60u16.to_be_bytes());
        assert_eq!(bytes[12], 5);
        assert_eq!(bytes[13], VideoCodec::RawRgba.wire_id());
    }

    #[test]
    fn long_device_names_are_truncated() {
        let hello = DeviceHello {
            status: HelloStatus::Ok,
            device_name: "x".repeat(100),
            codec: VideoCodec::Mjpeg,
            width: 1080,
            height: 2400,
        };
        let decoded = DeviceHello::decode(&hello.encode()).unwrap();
        assert_eq!(decoded.device_name.len(), DEVICE_NAME_LEN - 1);
        assert_eq!((decoded.width, decoded.height), (1080, 2400));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = ClientHello::from_config(&LinkConfig::default()).encode();
        bytes[0] = b'X';
        assert!(matches!(
            ClientHello::decode(&bytes),
            Err(HandshakeError::BadMagic(_))
        ));
    }

    #[tokio::test]
    async fn negotiate_over_duplex() {
        let (mut client, mut device) = tokio::io::duplex(256);
        let server = tokio::spawn(async move {
            let hello = accept(&mut device).await.unwrap();
            let reply = DeviceHello {
                status: HelloStatus::Ok,
                device_name: "Pixel 7".into(),
                codec: hello.codec,
                width: 720,
                height: 1600,
            };
            device.write_all(&reply.encode()).await.unwrap();
            hello
        });

        let request = ClientHello::from_config(&LinkConfig::default());
        let reply = negotiate(&mut client, &request).await.unwrap();
        assert_eq!(reply.device_name, "Pixel 7");
        assert_eq!(server.await.unwrap(), request);
    }
}

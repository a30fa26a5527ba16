//! Compact control protocol.
//!
//! Touch messages carry a one-byte pointer id and coordinates normalized to
//! `0..=65535`, so the device scales them to whatever resolution it renders.
//! All integers are big-endian.
//!
//! ```text
//! touch down/up/move  [10|11|12][pointer u8][x u16][y u16]   6 bytes
//! touch reset         [13]                                   1 byte
//! key down/up         [14|15][keycode u16]                   3 bytes
//! disconnect          [0xFF]                                 1 byte
//! ```

use super::error::MessageError;
use serde::Serialize;

pub const TYPE_TOUCH_DOWN: u8 = 10;
pub const TYPE_TOUCH_UP: u8 = 11;
pub const TYPE_TOUCH_MOVE: u8 = 12;
pub const TYPE_TOUCH_RESET: u8 = 13;
pub const TYPE_KEY_DOWN: u8 = 14;
pub const TYPE_KEY_UP: u8 = 15;
pub const TYPE_DISCONNECT: u8 = 0xFF;

const COORD_SCALE: f64 = 65535.0;

/// A position in normalized `[0, 1]` screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn clamped(self) -> Self {
        Self {
            x: self.x.clamp(0.0, 1.0),
            y: self.y.clamp(0.0, 1.0),
        }
    }

    pub fn distance(self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn is_normalized(self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMessage {
    TouchDown { pointer: u8, at: Point },
    TouchMove { pointer: u8, at: Point },
    TouchUp { pointer: u8, at: Point },
    TouchReset,
    KeyDown { keycode: u16 },
    KeyUp { keycode: u16 },
    Disconnect,
}

fn to_wire(v: f64) -> u16 {
    (v.clamp(0.0, 1.0) * COORD_SCALE).round() as u16
}

fn from_wire(v: u16) -> f64 {
    v as f64 / COORD_SCALE
}

impl ControlMessage {
    pub fn encoded_len(&self) -> usize {
        match self {
            ControlMessage::TouchDown { .. }
            | ControlMessage::TouchMove { .. }
            | ControlMessage::TouchUp { .. } => 6,
            ControlMessage::KeyDown { .. } | ControlMessage::KeyUp { .. } => 3,
            ControlMessage::TouchReset | ControlMessage::Disconnect => 1,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            ControlMessage::TouchDown { pointer, at } => {
                encode_touch(out, TYPE_TOUCH_DOWN, pointer, at)
            }
            ControlMessage::TouchMove { pointer, at } => {
                encode_touch(out, TYPE_TOUCH_MOVE, pointer, at)
            }
            ControlMessage::TouchUp { pointer, at } => {
                encode_touch(out, TYPE_TOUCH_UP, pointer, at)
            }
            ControlMessage::TouchReset => out.push(TYPE_TOUCH_RESET),
            ControlMessage::KeyDown { keycode } => {
                out.push(TYPE_KEY_DOWN);
                out.extend_from_slice(&keycode.to_be_bytes());
            }
            ControlMessage::KeyUp { keycode } => {
                out.push(TYPE_KEY_UP);
                out.extend_from_slice(&keycode.to_be_bytes());
            }
            ControlMessage::Disconnect => out.push(TYPE_DISCONNECT),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out);
        out
    }

    /// Decodes one message from the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` holds only part of a message.
    pub fn decode(buf: &[u8]) -> Result<Option<(ControlMessage, usize)>, MessageError> {
        let Some(&kind) = buf.first() else {
            return Ok(None);
        };
        let needed = match kind {
            TYPE_TOUCH_DOWN | TYPE_TOUCH_UP | TYPE_TOUCH_MOVE => 6,
            TYPE_KEY_DOWN | TYPE_KEY_UP => 3,
            TYPE_TOUCH_RESET | TYPE_DISCONNECT => 1,
            other => return Err(MessageError::UnknownType(other)),
        };
        if buf.len() < needed {
            return Ok(None);
        }
        let msg = match kind {
            TYPE_TOUCH_DOWN | TYPE_TOUCH_UP | TYPE_TOUCH_MOVE => {
                let pointer = buf[1];
                let at = Point::new(
                    from_wire(u16::from_be_bytes([buf[2], buf[3]])),
                    from_wire(u16::from_be_bytes([buf[4], buf[5]])),
                );
                match kind {
                    TYPE_TOUCH_DOWN => ControlMessage::TouchDown { pointer, at },
                    TYPE_TOUCH_UP => ControlMessage::TouchUp { pointer, at },
                    _ => ControlMessage::TouchMove { pointer, at },
                }
            }
            TYPE_KEY_DOWN => ControlMessage::KeyDown {
                keycode: u16::from_be_bytes([buf[1], buf[2]]),
            },
            TYPE_KEY_UP => ControlMessage::KeyUp {
                keycode: u16::from_be_bytes([buf[1], buf[2]]),
            },
            TYPE_TOUCH_RESET => ControlMessage::TouchReset,
            _ => ControlMessage::Disconnect,
        };
        Ok(Some((msg, needed)))
    }

    /// Decodes every complete message in `buf`, ignoring a trailing fragment.
    pub fn decode_all(mut buf: &[u8]) -> Result<Vec<ControlMessage>, MessageError> {
        let mut messages = Vec::new();
        while let Some((msg, used)) = Self::decode(buf)? {
            messages.push(msg);
            buf = &buf[used..];
        }
        Ok(messages)
    }
}

fn encode_touch(out: &mut Vec<u8>, kind: u8, pointer: u8, at: Point) {
    out.push(kind);
    out.push(pointer);
    out.extend_from_slice(&to_wire(at.x).to_be_bytes());
    out.extend_from_slice(&to_wire(at.y).to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_layout_is_six_bytes_big_endian() {
        let bytes = ControlMessage::TouchDown {
            pointer: 3,
            at: Point::new(1.0, 0.0),
        }
        .to_bytes();
        assert_eq!(bytes, vec![TYPE_TOUCH_DOWN, 3, 0xFF, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn coordinates_outside_the_screen_are_clamped() {
        let bytes = ControlMessage::TouchMove {
            pointer: 0,
            at: Point::new(-0.5, 2.0),
        }
        .to_bytes();
        assert_eq!(&bytes[2..], &[0x00, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn key_and_single_byte_messages() {
        assert_eq!(
            ControlMessage::KeyDown { keycode: 0x0104 }.to_bytes(),
            vec![TYPE_KEY_DOWN, 0x01, 0x04]
        );
        assert_eq!(ControlMessage::TouchReset.to_bytes(), vec![TYPE_TOUCH_RESET]);
        assert_eq!(ControlMessage::Disconnect.to_bytes(), vec![TYPE_DISCONNECT]);
    }

    #[test]
    fn decode_waits_for_complete_message() {
        let bytes = ControlMessage::TouchUp {
            pointer: 1,
            at: Point::new(0.5, 0.5),
        }
        .to_bytes();
        assert_eq!(ControlMessage::decode(&bytes[..4]), Ok(None));
        let (msg, used) = ControlMessage::decode(&bytes).unwrap().unwrap();
        assert_eq!(used, 6);
        match msg {
            ControlMessage::TouchUp { pointer, at } => {
                assert_eq!(pointer, 1);
                assert!((at.x - 0.5).abs() < 1e-4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_unknown_type() {
        assert_eq!(
            ControlMessage::decode(&[0x42, 0, 0]),
            Err(MessageError::UnknownType(0x42))
        );
    }
}

//! Splits the video byte stream into access units.
//!
//! Each unit is preceded by a 12-byte header:
//!
//! ```text
//! [pts_flags u64][len u32]
//!  bit 63  config packet (codec parameters, not a picture)
//!  bit 62  key frame
//!  bits 60-61 reserved, must be zero
//!  bits 0-59 presentation timestamp in microseconds
//! ```
//!
//! Bytes arrive in arbitrary chunks; the demuxer buffers partial headers and
//! payloads. A header that cannot be valid makes it drop one byte and scan
//! again, so a corrupted stretch costs some frames but never the connection.

use log::debug;

pub const HEADER_LEN: usize = 12;

pub const FLAG_CONFIG: u64 = 1 << 63;
pub const FLAG_KEY_FRAME: u64 = 1 << 62;
const RESERVED_MASK: u64 = 0b11 << 60;
const PTS_MASK: u64 = (1 << 60) - 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub pts: u64,
    pub config: bool,
    pub key_frame: bool,
    pub payload: Vec<u8>,
}

impl AccessUnit {
    /// Serializes the unit with its header, as the device sends it.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut pts_flags = self.pts & PTS_MASK;
        if self.config {
            pts_flags |= FLAG_CONFIG;
        }
        if self.key_frame {
            pts_flags |= FLAG_KEY_FRAME;
        }
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&pts_flags.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

#[derive(Debug)]
pub struct Demuxer {
    buf: Vec<u8>,
    /// Read offset into `buf`; compacted lazily
    start: usize,
    max_unit_len: usize,
    resyncs: u64,
}

impl Demuxer {
    pub fn new(max_unit_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            start: 0,
            max_unit_len,
            resyncs: 0,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if self.start > 0 && self.start >= self.buf.len() / 2 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet returned as a unit.
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Number of times the stream was resynchronized.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Next complete unit, or `None` until more bytes arrive.
    pub fn next_unit(&mut self) -> Option<AccessUnit> {
        loop {
            let pending = &self.buf[self.start..];
            if pending.len() < HEADER_LEN {
                return None;
            }
            let mut word = [0u8; 8];
            word.copy_from_slice(&pending[..8]);
            let pts_flags = u64::from_be_bytes(word);
            let len =
                u32::from_be_bytes([pending[8], pending[9], pending[10], pending[11]]) as usize;

            if pts_flags & RESERVED_MASK != 0 || len == 0 || len > self.max_unit_len {
                self.resyncs += 1;
                self.start += 1;
                debug!(
                    "Video stream resync: bad header (flags={:#x}, len={})",
                    pts_flags >> 60,
                    len
                );
                continue;
            }
            if pending.len() < HEADER_LEN + len {
                return None;
            }

            let payload = pending[HEADER_LEN..HEADER_LEN + len].to_vec();
            self.start += HEADER_LEN + len;
            return Some(AccessUnit {
                pts: pts_flags & PTS_MASK,
                config: pts_flags & FLAG_CONFIG != 0,
                key_frame: pts_flags & FLAG_KEY_FRAME != 0,
                payload,
            });
        }
    }
}

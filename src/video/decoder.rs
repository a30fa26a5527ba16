//! Access unit decoders.
//!
//! Built-in decoders cover what the `image` crate can do without native
//! codecs: MJPEG/PNG pictures and raw framebuffers (RGBA8888, RGB565). An
//! H.264 stream needs a caller-supplied [`Decoder`].

use super::demuxer::AccessUnit;
use super::error::DecodeError;
use super::frame::FrameBuf;
use crate::config::VideoCodec;

pub trait Decoder: Send {
    /// Called with config packets (codec parameters, size changes).
    fn configure(&mut self, _unit: &AccessUnit) -> Result<(), DecodeError> {
        Ok(())
    }

    /// Writes one picture into `out`.
    fn decode(&mut self, unit: &AccessUnit, out: &mut FrameBuf) -> Result<(), DecodeError>;

    /// True when every unit decodes without reference to earlier ones, so
    /// units may be skipped before decoding. Inter-frame codecs keep the
    /// default and see every unit.
    fn self_contained(&self) -> bool {
        false
    }
}

/// Built-in decoder for `codec`, or `None` if one must be supplied.
pub fn decoder_for(codec: VideoCodec, width: u32, height: u32) -> Option<Box<dyn Decoder>> {
    match codec {
        VideoCodec::Mjpeg => Some(Box::new(ImageDecoder)),
        VideoCodec::RawRgba => {
            Some(Box::new(RawDecoder::new(PixelFormat::Rgba8888, width, height)))
        }
        VideoCodec::RawRgb565 => {
            Some(Box::new(RawDecoder::new(PixelFormat::Rgb565, width, height)))
        }
        VideoCodec::H264 => None,
    }
}

/// Compressed still pictures (JPEG, PNG).
#[derive(Debug, Default)]
pub struct ImageDecoder;

impl Decoder for ImageDecoder {
    fn decode(&mut self, unit: &AccessUnit, out: &mut FrameBuf) -> Result<(), DecodeError> {
        let picture = image::load_from_memory(&unit.payload)?.to_rgba8();
        let (width, height) = picture.dimensions();
        out.prepare(width, height)
            .copy_from_slice(picture.as_raw());
        Ok(())
    }

    fn self_contained(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8888,
    Rgb565,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8888 => 4,
            PixelFormat::Rgb565 => 2,
        }
    }
}

/// Uncompressed framebuffer dumps. Leading header bytes, if any, are skipped
/// by reading the pixels from the tail of the payload.
#[derive(Debug)]
pub struct RawDecoder {
    format: PixelFormat,
    width: u32,
    height: u32,
}

impl RawDecoder {
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Decoder for RawDecoder {
    /// Config payload is `[width u32][height u32]`, sent on rotation.
    fn configure(&mut self, unit: &AccessUnit) -> Result<(), DecodeError> {
        let p = &unit.payload;
        if p.len() != 8 {
            return Err(DecodeError::BadConfig { len: p.len() });
        }
        self.width = u32::from_be_bytes([p[0], p[1], p[2], p[3]]);
        self.height = u32::from_be_bytes([p[4], p[5], p[6], p[7]]);
        log::debug!("Raw decoder resized to {}x{}", self.width, self.height);
        Ok(())
    }

    fn decode(&mut self, unit: &AccessUnit, out: &mut FrameBuf) -> Result<(), DecodeError> {
        if self.width == 0 || self.height == 0 {
            return Err(DecodeError::UnknownSize);
        }
        let pixel_count = self.width as usize * self.height as usize;
        let expected = pixel_count * self.format.bytes_per_pixel();
        let data = &unit.payload;
        if data.len() < expected {
            return Err(DecodeError::RawSizeMismatch {
                expected,
                actual: data.len(),
                width: self.width,
                height: self.height,
            });
        }
        let pixels = &data[data.len() - expected..];
        let dst = out.prepare(self.width, self.height);

        match self.format {
            PixelFormat::Rgba8888 => dst.copy_from_slice(pixels),
            PixelFormat::Rgb565 => {
                for (src, px) in pixels.chunks_exact(2).zip(dst.chunks_exact_mut(4)) {
                    let value = u16::from_le_bytes([src[0], src[1]]);
                    let r = ((value >> 11) & 0x1F) as u8;
                    let g = ((value >> 5) & 0x3F) as u8;
                    let b = (value & 0x1F) as u8;
                    px[0] = (r << 3) | (r >> 2);
                    px[1] = (g << 2) | (g >> 4);
                    px[2] = (b << 3) | (b >> 2);
                    px[3] = 0xFF;
                }
            }
        }
        Ok(())
    }

    fn self_contained(&self) -> bool {
        true
    }
}

/// Drops units after a decode failure until the next key frame or config
/// packet, so a decoder never works from a corrupted reference.
#[derive(Debug, Default)]
pub struct KeyFrameGate {
    waiting: bool,
}

impl KeyFrameGate {
    pub fn admit(&mut self, unit: &AccessUnit) -> bool {
        if unit.key_frame || unit.config {
            self.waiting = false;
        }
        !self.waiting
    }

    pub fn on_error(&mut self) {
        self.waiting = true;
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frame::FramePool;
    use image::{ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    fn picture_unit(payload: Vec<u8>, key_frame: bool) -> AccessUnit {
        AccessUnit {
            pts: 0,
            config: false,
            key_frame,
            payload,
        }
    }

    #[test]
    fn png_unit_decodes_to_rgba() {
        let img = ImageBuffer::from_fn(3, 2, |x, _| Rgba([x as u8 * 10, 0, 0, 255]));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let pool = FramePool::new(1);
        let mut buf = pool.try_acquire().unwrap();
        ImageDecoder
            .decode(&picture_unit(png, true), &mut buf)
            .unwrap();
        let frame = buf.publish(0, 0);
        assert_eq!((frame.width(), frame.height()), (3, 2));
        assert_eq!(frame.pixel(2, 1), Some([20, 0, 0, 255]));
    }

    #[test]
    fn garbage_unit_is_a_decode_error() {
        let pool = FramePool::new(1);
        let mut buf = pool.try_acquire().unwrap();
        let err = ImageDecoder
            .decode(&picture_unit(vec![1, 2, 3], true), &mut buf)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Image { .. }));
    }

    #[test]
    fn rgb565_expands_to_full_range() {
        let mut decoder = RawDecoder::new(PixelFormat::Rgb565, 2, 1);
        // pure red, pure blue (little endian)
        let payload = vec![0x00, 0xF8, 0x1F, 0x00];
        let pool = FramePool::new(1);
        let mut buf = pool.try_acquire().unwrap();
        decoder.decode(&picture_unit(payload, true), &mut buf).unwrap();
        let frame = buf.publish(0, 0);
        assert_eq!(frame.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(frame.pixel(1, 0), Some([0, 0, 255, 255]));
    }

    #[test]
    fn raw_config_packet_resizes() {
        let mut decoder = RawDecoder::new(PixelFormat::Rgba8888, 4, 2);
        let mut payload = 2u32.to_be_bytes().to_vec();
        payload.extend(4u32.to_be_bytes());
        let cfg = AccessUnit {
            pts: 0,
            config: true,
            key_frame: false,
            payload,
        };
        decoder.configure(&cfg).unwrap();
        assert_eq!(decoder.size(), (2, 4));

        let pool = FramePool::new(1);
        let mut buf = pool.try_acquire().unwrap();
        let err = decoder
            .decode(&picture_unit(vec![0; 8], true), &mut buf)
            .unwrap_err();
        assert!(matches!(err, DecodeError::RawSizeMismatch { expected: 32, .. }));
    }

    #[test]
    fn gate_waits_for_key_frame_after_error() {
        let mut gate = KeyFrameGate::default();
        assert!(gate.admit(&picture_unit(vec![], false)));
        gate.on_error();
        assert!(!gate.admit(&picture_unit(vec![], false)));
        assert!(gate.is_waiting());
        assert!(gate.admit(&picture_unit(vec![], true)));
        assert!(gate.admit(&picture_unit(vec![], false)));
    }

    #[test]
    fn h264_needs_external_decoder() {
        assert!(decoder_for(VideoCodec::H264, 0, 0).is_none());
        assert!(decoder_for(VideoCodec::Mjpeg, 0, 0).is_some());
    }
}

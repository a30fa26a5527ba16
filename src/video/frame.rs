//! Decoded frames and the fixed-capacity pool that backs them.
//!
//! A slot moves through `FramePool::try_acquire` (decoder owns a mutable
//! [`FrameBuf`]) to [`FrameBuf::publish`] (an immutable, shareable [`Frame`]).
//! The slot is counted as live until the last `Frame` clone is dropped; its
//! pixel buffer then goes back to the pool for reuse.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug)]
struct PoolShared {
    capacity: usize,
    live: AtomicUsize,
    spare: Mutex<Vec<Vec<u8>>>,
}

impl PoolShared {
    fn recycle(&self, mut pixels: Vec<u8>) {
        pixels.clear();
        let mut spare = self.spare.lock().unwrap_or_else(|e| e.into_inner());
        if spare.len() < self.capacity {
            spare.push(pixels);
        }
        drop(spare);
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone)]
pub struct FramePool {
    shared: Arc<PoolShared>,
}

impl FramePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(PoolShared {
                capacity,
                live: AtomicUsize::new(0),
                spare: Mutex::new(Vec::with_capacity(capacity)),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Slots currently held by the decoder, queued, or held by consumers.
    pub fn live(&self) -> usize {
        self.shared.live.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.capacity().saturating_sub(self.live())
    }

    /// Claims a slot, or `None` when all `capacity` slots are live.
    pub fn try_acquire(&self) -> Option<FrameBuf> {
        let shared = &self.shared;
        shared
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < shared.capacity).then_some(live + 1)
            })
            .ok()?;
        let pixels = shared
            .spare
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .unwrap_or_default();
        Some(FrameBuf {
            pixels: Some(pixels),
            width: 0,
            height: 0,
            pool: Arc::clone(shared),
        })
    }
}

/// A claimed pool slot being filled by the decoder.
#[derive(Debug)]
pub struct FrameBuf {
    pixels: Option<Vec<u8>>,
    width: u32,
    height: u32,
    pool: Arc<PoolShared>,
}

impl FrameBuf {
    /// Sizes the buffer for `width * height` RGBA pixels and returns it.
    pub fn prepare(&mut self, width: u32, height: u32) -> &mut [u8] {
        self.width = width;
        self.height = height;
        let len = width as usize * height as usize * 4;
        let pixels = self.pixels.get_or_insert_with(Vec::new);
        pixels.resize(len, 0);
        pixels.as_mut_slice()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Freezes the buffer into a shareable frame.
    pub fn publish(mut self, pts: u64, seq: u64) -> Frame {
        let pixels = self.pixels.take().unwrap_or_default();
        Frame {
            data: Arc::new(FrameData {
                pixels,
                width: self.width,
                height: self.height,
                pts,
                seq,
                published_at: Instant::now(),
                pool: Arc::clone(&self.pool),
            }),
        }
    }
}

impl Drop for FrameBuf {
    fn drop(&mut self) {
        if let Some(pixels) = self.pixels.take() {
            self.pool.recycle(pixels);
        }
    }
}

#[derive(Debug)]
struct FrameData {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    pts: u64,
    seq: u64,
    published_at: Instant,
    pool: Arc<PoolShared>,
}

impl Drop for FrameData {
    fn drop(&mut self) {
        self.pool.recycle(std::mem::take(&mut self.pixels));
    }
}

/// An immutable decoded frame (RGBA8, row-major).
///
/// Cloning shares the same slot; the slot is released when every clone is
/// gone, or explicitly through [`Frame::release`].
#[derive(Debug, Clone)]
pub struct Frame {
    data: Arc<FrameData>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.data.width
    }

    pub fn height(&self) -> u32 {
        self.data.height
    }

    /// Presentation timestamp in microseconds.
    pub fn pts(&self) -> u64 {
        self.data.pts
    }

    pub fn seq(&self) -> u64 {
        self.data.seq
    }

    pub fn published_at(&self) -> Instant {
        self.data.published_at
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data.pixels
    }

    /// RGBA of one pixel, `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let idx = (y as usize * self.width() as usize + x as usize) * 4;
        let px = self.data.pixels.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn release(self) {
        drop(self);
    }

    /// True while another clone of this frame exists.
    pub(crate) fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }
}

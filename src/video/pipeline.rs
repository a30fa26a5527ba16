//! Receive -> demux -> decode -> publish.
//!
//! The receiver is a tokio task that only reads and splits bytes; it hands
//! units to a blocking decode worker through a bounded queue and drops units
//! when that queue is full instead of waiting. The decode worker fills pool
//! slots, publishes each frame as the "current frame" (a watch channel, so
//! readers always see a whole frame) and appends it to the render queue.

use super::decoder::{Decoder, KeyFrameGate, decoder_for};
use super::demuxer::{AccessUnit, Demuxer};
use super::error::VideoError;
use super::frame::{Frame, FrameBuf, FramePool};
use crate::config::PipelineConfig;
use crate::link::{LinkStatus, Session};
use crate::telemetry::PerformanceTelemetry;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;

/// Enforces a maximum emission rate; a cap of 0 admits everything.
#[derive(Debug)]
pub struct FpsLimiter {
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl FpsLimiter {
    pub fn new(max_fps: u16) -> Self {
        Self {
            interval: (max_fps > 0).then(|| Duration::from_secs_f64(1.0 / max_fps as f64)),
            last: None,
        }
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        let Some(interval) = self.interval else {
            return true;
        };
        match self.last {
            Some(last) if now.saturating_duration_since(last) < interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Frames published but not yet taken by the renderer, oldest first.
#[derive(Debug, Default)]
struct RenderQueue {
    frames: Mutex<VecDeque<Frame>>,
    notify: Notify,
    closed: AtomicBool,
}

impl RenderQueue {
    fn push(&self, frame: Frame) {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(frame);
        self.notify.notify_waiters();
    }

    fn pop_oldest(&self) -> Option<Frame> {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Removes the oldest frame nobody else holds, so dropping it frees its
    /// slot. The frame published as current is always shared and stays.
    fn evict_reclaimable(&self) -> Option<Frame> {
        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        let idx = frames.iter().position(|f| !f.is_shared())?;
        frames.remove(idx)
    }

    fn len(&self) -> usize {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Snapshot access to the most recently published frame.
#[derive(Debug, Clone)]
pub struct FrameReader {
    rx: watch::Receiver<Option<Frame>>,
    link: Arc<LinkStatus>,
}

impl FrameReader {
    /// The current frame, or `None` when nothing has been decoded yet or the
    /// link is no longer streaming.
    pub fn latest(&self) -> Option<Frame> {
        if !self.link.is_streaming() {
            return None;
        }
        self.rx.borrow().clone()
    }

    /// Waits up to `timeout` for a frame newer than the last one seen through
    /// this reader, then returns whatever is current.
    pub async fn wait_newer(&mut self, timeout: Duration) -> Option<Frame> {
        let _ = tokio::time::timeout(timeout, self.rx.changed()).await;
        drop(self.rx.borrow_and_update());
        self.latest()
    }
}

/// The renderer's view of the stream: every frame in publication order,
/// minus those evicted under pool pressure.
#[derive(Debug)]
pub struct FrameProducer {
    queue: Arc<RenderQueue>,
    reader: FrameReader,
    pool: FramePool,
    telemetry: Arc<PerformanceTelemetry>,
}

impl FrameProducer {
    /// Next unconsumed frame; `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Frame> {
        loop {
            let notified = self.queue.notify.notified();
            if let Some(frame) = self.take() {
                return Some(frame);
            }
            if self.queue.is_closed() {
                return self.take();
            }
            notified.await;
        }
    }

    pub fn try_next(&mut self) -> Option<Frame> {
        self.take()
    }

    /// Frames waiting for the renderer.
    pub fn backlog(&self) -> usize {
        self.queue.len()
    }

    pub fn reader(&self) -> FrameReader {
        self.reader.clone()
    }

    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    fn take(&self) -> Option<Frame> {
        let frame = self.queue.pop_oldest()?;
        self.telemetry
            .record_render_latency(frame.published_at().elapsed());
        Some(frame)
    }
}

pub struct VideoPipeline;

impl VideoPipeline {
    /// Starts decoding the session's video socket with the built-in decoder
    /// for the negotiated codec.
    pub fn start(session: &Session) -> Result<FrameProducer, VideoError> {
        let params = &session.device().video;
        let decoder = decoder_for(params.codec, params.width, params.height)
            .ok_or(VideoError::UnsupportedCodec {
                codec: params.codec,
            })?;
        Self::start_with_decoder(session, decoder)
    }

    pub fn start_with_decoder(
        session: &Session,
        decoder: Box<dyn Decoder>,
    ) -> Result<FrameProducer, VideoError> {
        let state = session.status();
        if !state.is_active() {
            return Err(VideoError::NotStreaming { state });
        }
        let stream = session
            .take_video_stream()
            .ok_or(VideoError::AlreadyStarted)?;
        let (producer, receiver) = Self::spawn(
            stream,
            decoder,
            session.pipeline_config(),
            session.device().video.max_fps,
            session.link(),
            session.telemetry(),
        )?;
        session.attach_task(receiver);
        Ok(producer)
    }

    /// Runs the pipeline over any byte source. Must be called on a tokio
    /// runtime; the returned handle is the receiver task.
    pub fn spawn<R>(
        reader: R,
        decoder: Box<dyn Decoder>,
        config: &PipelineConfig,
        max_fps: u16,
        link: Arc<LinkStatus>,
        telemetry: Arc<PerformanceTelemetry>,
    ) -> Result<(FrameProducer, JoinHandle<()>), VideoError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        config.validate()?;
        let pool = FramePool::new(config.pool_capacity);
        let queue = Arc::new(RenderQueue::default());
        let (current_tx, current_rx) = watch::channel(None);
        let (units_tx, units_rx) = mpsc::channel(config.unit_queue);
        let units_lost = Arc::new(AtomicBool::new(false));
        telemetry.set_pool_usage(0, pool.capacity());

        let receiver = tokio::spawn(run_receiver(
            reader,
            units_tx,
            Arc::clone(&units_lost),
            config.max_unit_len,
            config.read_chunk,
            Arc::clone(&link),
            Arc::clone(&telemetry),
        ));

        let worker = DecodeWorker {
            decoder,
            gate: KeyFrameGate::default(),
            limiter: FpsLimiter::new(max_fps),
            pool: pool.clone(),
            queue: Arc::clone(&queue),
            current: current_tx,
            units_lost,
            telemetry: Arc::clone(&telemetry),
            seq: 0,
        };
        tokio::task::spawn_blocking(move || worker.run(units_rx));

        info!(
            "🎬 Video pipeline started (pool={}, fps cap={})",
            pool.capacity(),
            max_fps
        );
        Ok((
            FrameProducer {
                queue,
                reader: FrameReader {
                    rx: current_rx,
                    link,
                },
                pool,
                telemetry,
            },
            receiver,
        ))
    }
}

async fn run_receiver<R>(
    mut reader: R,
    units_tx: mpsc::Sender<AccessUnit>,
    units_lost: Arc<AtomicBool>,
    max_unit_len: usize,
    read_chunk: usize,
    link: Arc<LinkStatus>,
    telemetry: Arc<PerformanceTelemetry>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut demuxer = Demuxer::new(max_unit_len);
    let mut chunk = vec![0u8; read_chunk];
    let mut reported_resyncs = 0;

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                link.fail("video stream closed by device");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                link.fail(format!("video socket read failed: {e}"));
                break;
            }
        };
        telemetry.record_bytes_received(n);
        demuxer.push(&chunk[..n]);

        while let Some(unit) = demuxer.next_unit() {
            telemetry.record_unit();
            match units_tx.try_send(unit) {
                Ok(()) => {}
                Err(TrySendError::Full(unit)) => {
                    if unit.config {
                        // parameters are tiny and required by every later unit
                        if units_tx.send(unit).await.is_err() {
                            return;
                        }
                    } else {
                        units_lost.store(true, Ordering::Release);
                        telemetry.record_frame_dropped();
                        debug!("Decoder behind, dropped unit pts={}", unit.pts);
                    }
                }
                Err(TrySendError::Closed(_)) => return,
            }
        }

        for _ in reported_resyncs..demuxer.resyncs() {
            telemetry.record_resync();
        }
        reported_resyncs = demuxer.resyncs();
    }
    debug!("Video receiver stopped");
}

struct DecodeWorker {
    decoder: Box<dyn Decoder>,
    gate: KeyFrameGate,
    limiter: FpsLimiter,
    pool: FramePool,
    queue: Arc<RenderQueue>,
    current: watch::Sender<Option<Frame>>,
    units_lost: Arc<AtomicBool>,
    telemetry: Arc<PerformanceTelemetry>,
    seq: u64,
}

impl DecodeWorker {
    fn run(mut self, mut units_rx: mpsc::Receiver<AccessUnit>) {
        while let Some(unit) = units_rx.blocking_recv() {
            self.handle(unit);
        }
        self.current.send_replace(None);
        self.queue.close();
        self.telemetry.set_pool_usage(self.pool.live(), self.pool.capacity());
        debug!("Decode worker stopped after {} frames", self.seq);
    }

    fn handle(&mut self, unit: AccessUnit) {
        if self.units_lost.swap(false, Ordering::AcqRel) {
            self.gate.on_error();
        }
        if unit.config {
            match self.decoder.configure(&unit) {
                Ok(()) => {
                    self.gate.admit(&unit);
                }
                Err(e) => {
                    warn!("Video config packet rejected: {}", e);
                    self.telemetry.record_decode_error();
                }
            }
            return;
        }
        if !self.gate.admit(&unit) {
            self.telemetry.record_frame_dropped();
            return;
        }

        // The device enforces the negotiated cap too; this catches bursts.
        // Inter-frame units are decoded regardless and only withheld from
        // publication, so later units keep their references.
        let self_contained = self.decoder.self_contained();
        if self_contained && !self.limiter.admit(Instant::now()) {
            return;
        }

        let Some(mut buf) = self.acquire_slot() else {
            debug!("Frame pool exhausted by consumers, skipping pts={}", unit.pts);
            self.telemetry.record_frame_dropped();
            if !self_contained {
                self.gate.on_error();
            }
            return;
        };

        let started = Instant::now();
        if let Err(e) = self.decoder.decode(&unit, &mut buf) {
            debug!("Decode failed for pts={}: {}", unit.pts, e);
            self.telemetry.record_decode_error();
            self.gate.on_error();
            return;
        }
        self.telemetry.record_decode_latency(started.elapsed());
        if !self_contained && !self.limiter.admit(Instant::now()) {
            return;
        }

        self.seq += 1;
        let frame = buf.publish(unit.pts, self.seq);
        self.current.send_replace(Some(frame.clone()));
        self.queue.push(frame);
        self.telemetry.record_frame_published();
        self.telemetry
            .set_pool_usage(self.pool.live(), self.pool.capacity());
    }

    /// Takes a free slot, evicting the oldest unconsumed frame that frees
    /// one if needed. `None` when every live frame is held elsewhere.
    fn acquire_slot(&self) -> Option<FrameBuf> {
        loop {
            if let Some(buf) = self.pool.try_acquire() {
                return Some(buf);
            }
            let oldest = self.queue.evict_reclaimable()?;
            debug!("Evicting unrendered frame seq={}", oldest.seq());
            drop(oldest);
            self.telemetry.record_frame_dropped();
        }
    }
}

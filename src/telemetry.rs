//! Passive performance counters fed by the video, control and link paths.
//!
//! Every component holds an `Arc<PerformanceTelemetry>` and bumps counters as
//! it works; the presentation layer polls [`PerformanceTelemetry::snapshot`].
//! Nothing in here blocks on I/O, and `reset()` only clears counters: gauges
//! that describe live state (pending bytes, pool usage) are left untouched.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of samples kept by each latency window.
pub const LATENCY_WINDOW: usize = 60;

const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Sliding window of the most recent latency samples.
#[derive(Debug)]
pub struct LatencyTracker {
    samples: Mutex<VecDeque<Duration>>,
    capacity: usize,
}

impl LatencyTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, sample: Duration) {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    pub fn average(&self) -> Duration {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        if samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = samples.iter().sum();
        total / samples.len() as u32
    }

    pub fn len(&self) -> usize {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// Events per second over a trailing one-second window.
#[derive(Debug, Default)]
struct RateMeter {
    events: Mutex<VecDeque<Instant>>,
}

impl RateMeter {
    fn record(&self, now: Instant) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push_back(now);
        Self::prune(&mut events, now);
    }

    fn rate(&self, now: Instant) -> f64 {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        Self::prune(&mut events, now);
        events.len() as f64 / RATE_WINDOW.as_secs_f64()
    }

    fn prune(events: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = events.front() {
            if now.saturating_duration_since(*front) > RATE_WINDOW {
                events.pop_front();
            } else {
                break;
            }
        }
    }

    fn reset(&self) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// Read-only copy of every counter, suitable for a status overlay.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub fps: f64,
    pub decode_latency_ms: f64,
    pub render_latency_ms: f64,
    pub frames_total: u64,
    pub frames_dropped: u64,
    pub units_received: u64,
    pub stream_resyncs: u64,
    pub decode_errors: u64,
    pub frame_pool_used: u64,
    pub frame_pool_total: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub pending_bytes: u64,
    pub pending_messages: u64,
    pub input_rate: f64,
    pub input_processed: u64,
    pub input_dropped: u64,
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fps={:.1} decode={:.1}ms render={:.1}ms frames={} dropped={} pool={}/{} rx={}B tx={}B pending={} input={:.1}/s ({} ok, {} dropped)",
            self.fps,
            self.decode_latency_ms,
            self.render_latency_ms,
            self.frames_total,
            self.frames_dropped,
            self.frame_pool_used,
            self.frame_pool_total,
            self.bytes_received,
            self.bytes_sent,
            self.pending_messages,
            self.input_rate,
            self.input_processed,
            self.input_dropped,
        )
    }
}

#[derive(Debug)]
pub struct PerformanceTelemetry {
    frames_total: AtomicU64,
    frames_dropped: AtomicU64,
    units_received: AtomicU64,
    stream_resyncs: AtomicU64,
    decode_errors: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    input_processed: AtomicU64,
    input_dropped: AtomicU64,
    // gauges
    pending_bytes: AtomicU64,
    pending_messages: AtomicU64,
    frame_pool_used: AtomicU64,
    frame_pool_total: AtomicU64,
    decode_latency: LatencyTracker,
    render_latency: LatencyTracker,
    frame_rate: RateMeter,
    input_rate: RateMeter,
}

impl Default for PerformanceTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceTelemetry {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            units_received: AtomicU64::new(0),
            stream_resyncs: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            input_processed: AtomicU64::new(0),
            input_dropped: AtomicU64::new(0),
            pending_bytes: AtomicU64::new(0),
            pending_messages: AtomicU64::new(0),
            frame_pool_used: AtomicU64::new(0),
            frame_pool_total: AtomicU64::new(0),
            decode_latency: LatencyTracker::new(LATENCY_WINDOW),
            render_latency: LatencyTracker::new(LATENCY_WINDOW),
            frame_rate: RateMeter::default(),
            input_rate: RateMeter::default(),
        }
    }

    // --- video path ---

    pub fn record_bytes_received(&self, bytes: usize) {
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_unit(&self) {
        self.units_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resync(&self) {
        self.stream_resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_latency(&self, latency: Duration) {
        self.decode_latency.record(latency);
    }

    pub fn record_render_latency(&self, latency: Duration) {
        self.render_latency.record(latency);
    }

    pub fn record_frame_published(&self) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frame_rate.record(Instant::now());
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_pool_usage(&self, used: usize, total: usize) {
        self.frame_pool_used.store(used as u64, Ordering::Relaxed);
        self.frame_pool_total.store(total as u64, Ordering::Relaxed);
    }

    // --- control path ---

    pub fn record_message_enqueued(&self, bytes: usize) {
        self.pending_messages.fetch_add(1, Ordering::Relaxed);
        self.pending_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_message_written(&self, bytes: usize) {
        self.release_pending(bytes);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.input_processed.fetch_add(1, Ordering::Relaxed);
        self.input_rate.record(Instant::now());
    }

    /// A queued message that never reached the socket.
    pub fn record_message_discarded(&self, bytes: usize) {
        self.release_pending(bytes);
        self.input_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A message refused before it was queued (busy or disconnected).
    pub fn record_input_rejected(&self) {
        self.input_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn release_pending(&self, bytes: usize) {
        let _ = self
            .pending_messages
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(1))
            });
        let _ = self
            .pending_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(bytes as u64))
            });
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let now = Instant::now();
        TelemetrySnapshot {
            fps: self.frame_rate.rate(now),
            decode_latency_ms: self.decode_latency.average().as_secs_f64() * 1000.0,
            render_latency_ms: self.render_latency.average().as_secs_f64() * 1000.0,
            frames_total: self.frames_total.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            units_received: self.units_received.load(Ordering::Relaxed),
            stream_resyncs: self.stream_resyncs.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            frame_pool_used: self.frame_pool_used.load(Ordering::Relaxed),
            frame_pool_total: self.frame_pool_total.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            pending_bytes: self.pending_bytes.load(Ordering::Relaxed),
            pending_messages: self.pending_messages.load(Ordering::Relaxed),
            input_rate: self.input_rate.rate(now),
            input_processed: self.input_processed.load(Ordering::Relaxed),
            input_dropped: self.input_dropped.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.frames_total,
            &self.frames_dropped,
            &self.units_received,
            &self.stream_resyncs,
            &self.decode_errors,
            &self.bytes_received,
            &self.bytes_sent,
            &self.input_processed,
            &self.input_dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.decode_latency.reset();
        self.render_latency.reset();
        self.frame_rate.reset();
        self.input_rate.reset();
    }
}

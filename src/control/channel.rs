//! Outbound control path: a bounded queue drained by one writer task.

use super::error::ChannelError;
use super::message::{ControlMessage, Point};
use super::pointers::{PointerLease, PointerPool};
use crate::config::ControlConfig;
use crate::link::LinkStatus;
use crate::telemetry::PerformanceTelemetry;
use log::{debug, trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// What a send does when the outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// Wait up to the configured send timeout for space.
    #[default]
    Block,
    /// Fail immediately with `ChannelBusy`.
    NonBlocking,
}

struct ChannelShared {
    tx: mpsc::Sender<ControlMessage>,
    pointers: Arc<PointerPool>,
    link: Arc<LinkStatus>,
    telemetry: Arc<PerformanceTelemetry>,
    pending: Arc<AtomicUsize>,
    runtime: Handle,
    capacity: usize,
    send_timeout: Duration,
}

/// Cheap to clone; every clone feeds the same writer, so messages sent from
/// one thread reach the device in call order.
#[derive(Clone)]
pub struct ControlChannel {
    shared: Arc<ChannelShared>,
    mode: SendMode,
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("mode", &self.mode)
            .field("pending", &self.pending())
            .field("pointers_in_use", &self.shared.pointers.in_use())
            .finish()
    }
}

impl ControlChannel {
    /// Spawns the writer task on the current tokio runtime.
    pub fn bind<W>(
        writer: W,
        link: Arc<LinkStatus>,
        touch_points: u8,
        config: &ControlConfig,
        telemetry: Arc<PerformanceTelemetry>,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let pending = Arc::new(AtomicUsize::new(0));
        let runtime = Handle::current();
        runtime.spawn(run_writer(
            writer,
            rx,
            Arc::clone(&pending),
            Arc::clone(&link),
            Arc::clone(&telemetry),
        ));
        Self {
            shared: Arc::new(ChannelShared {
                tx,
                pointers: PointerPool::new(touch_points),
                link,
                telemetry,
                pending,
                runtime,
                capacity,
                send_timeout: config.send_timeout,
            }),
            mode: SendMode::Block,
        }
    }

    /// A handle to the same channel using a different full-queue policy.
    pub fn with_mode(&self, mode: SendMode) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            mode,
        }
    }

    pub fn mode(&self) -> SendMode {
        self.mode
    }

    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Relaxed)
    }

    pub fn pointers(&self) -> &Arc<PointerPool> {
        &self.shared.pointers
    }

    pub fn is_connected(&self) -> bool {
        self.shared.link.is_streaming() && !self.shared.tx.is_closed()
    }

    /// Allocates a pointer and presses it at `at`.
    pub fn touch_down(&self, at: Point) -> Result<PointerLease, ChannelError> {
        self.ensure_connected()?;
        let at = at.clamped();
        let lease = self.shared.pointers.allocate(at)?;
        self.send(ControlMessage::TouchDown {
            pointer: lease.id(),
            at,
        })?;
        Ok(lease)
    }

    pub fn touch_move(&self, lease: &mut PointerLease, at: Point) -> Result<(), ChannelError> {
        let at = at.clamped();
        self.send(ControlMessage::TouchMove {
            pointer: lease.id(),
            at,
        })?;
        lease.set_position(at);
        Ok(())
    }

    /// Lifts the pointer at its last position and frees its id.
    ///
    /// The id is freed even when the message cannot be sent, since the
    /// device drops every contact when the link goes away.
    pub fn touch_up(&self, lease: PointerLease) -> Result<(), ChannelError> {
        self.send(ControlMessage::TouchUp {
            pointer: lease.id(),
            at: lease.position(),
        })
    }

    /// Lifts every contact on the device side.
    pub fn touch_reset(&self) -> Result<(), ChannelError> {
        self.send(ControlMessage::TouchReset)
    }

    pub fn key_down(&self, keycode: u16) -> Result<(), ChannelError> {
        self.send(ControlMessage::KeyDown { keycode })
    }

    pub fn key_up(&self, keycode: u16) -> Result<(), ChannelError> {
        self.send(ControlMessage::KeyUp { keycode })
    }

    /// Enqueues one message according to this handle's [`SendMode`].
    ///
    /// Blocking only happens off the runtime (script worker threads); on a
    /// runtime thread a full queue always reports `ChannelBusy`.
    pub fn send(&self, msg: ControlMessage) -> Result<(), ChannelError> {
        self.ensure_connected()?;
        let shared = &self.shared;
        let len = msg.encoded_len();
        shared.pending.fetch_add(1, Ordering::Relaxed);
        shared.telemetry.record_message_enqueued(len);

        let result = match shared.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(ChannelError::Disconnected),
            Err(TrySendError::Full(msg)) => {
                if self.mode == SendMode::Block && Handle::try_current().is_err() {
                    let tx = shared.tx.clone();
                    let timeout = shared.send_timeout;
                    match shared
                        .runtime
                        .block_on(async move { tokio::time::timeout(timeout, tx.send(msg)).await })
                    {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(_)) => Err(ChannelError::Disconnected),
                        Err(_) => Err(ChannelError::ChannelBusy {
                            capacity: shared.capacity,
                        }),
                    }
                } else {
                    Err(ChannelError::ChannelBusy {
                        capacity: shared.capacity,
                    })
                }
            }
        };

        if let Err(e) = &result {
            shared.pending.fetch_sub(1, Ordering::Relaxed);
            shared.telemetry.record_message_discarded(len);
            debug!("Control message {:?} rejected: {}", msg, e);
        }
        result
    }

    /// Async variant of [`send`](Self::send) for callers on the runtime.
    pub async fn send_async(&self, msg: ControlMessage) -> Result<(), ChannelError> {
        self.ensure_connected()?;
        let shared = &self.shared;
        let len = msg.encoded_len();
        shared.pending.fetch_add(1, Ordering::Relaxed);
        shared.telemetry.record_message_enqueued(len);
        let result = match self.mode {
            SendMode::Block => {
                match tokio::time::timeout(shared.send_timeout, shared.tx.send(msg)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(ChannelError::Disconnected),
                    Err(_) => Err(ChannelError::ChannelBusy {
                        capacity: shared.capacity,
                    }),
                }
            }
            SendMode::NonBlocking => shared.tx.try_send(msg).map_err(|e| match e {
                TrySendError::Closed(_) => ChannelError::Disconnected,
                TrySendError::Full(_) => ChannelError::ChannelBusy {
                    capacity: shared.capacity,
                },
            }),
        };
        if result.is_err() {
            shared.pending.fetch_sub(1, Ordering::Relaxed);
            shared.telemetry.record_message_discarded(len);
        }
        result
    }

    /// Queues without checking link state; used for the farewell message
    /// while the link is already disconnecting.
    pub(crate) async fn send_raw(&self, msg: ControlMessage) -> Result<(), ChannelError> {
        let shared = &self.shared;
        let len = msg.encoded_len();
        shared.pending.fetch_add(1, Ordering::Relaxed);
        shared.telemetry.record_message_enqueued(len);
        let result = tokio::time::timeout(shared.send_timeout, shared.tx.send(msg))
            .await
            .map_err(|_| ChannelError::ChannelBusy {
                capacity: shared.capacity,
            })
            .and_then(|sent| sent.map_err(|_| ChannelError::Disconnected));
        if result.is_err() {
            shared.pending.fetch_sub(1, Ordering::Relaxed);
            shared.telemetry.record_message_discarded(len);
        }
        result
    }

    fn ensure_connected(&self) -> Result<(), ChannelError> {
        if self.is_connected() {
            Ok(())
        } else {
            self.shared.telemetry.record_input_rejected();
            Err(ChannelError::Disconnected)
        }
    }
}

async fn run_writer<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<ControlMessage>,
    pending: Arc<AtomicUsize>,
    link: Arc<LinkStatus>,
    telemetry: Arc<PerformanceTelemetry>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut buf = Vec::with_capacity(8);
    while let Some(msg) = rx.recv().await {
        pending.fetch_sub(1, Ordering::Relaxed);
        buf.clear();
        msg.encode(&mut buf);
        let written = async {
            writer.write_all(&buf).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            telemetry.record_message_discarded(buf.len());
            link.fail(format!("control socket write failed: {e}"));
            break;
        }
        telemetry.record_message_written(buf.len());
        trace!("➡️ control {:?}", msg);
        if msg == ControlMessage::Disconnect {
            break;
        }
    }

    rx.close();
    while let Ok(msg) = rx.try_recv() {
        pending.fetch_sub(1, Ordering::Relaxed);
        telemetry.record_message_discarded(msg.encoded_len());
    }
    if let Err(e) = writer.shutdown().await {
        warn!("Control socket shutdown failed: {}", e);
    }
    debug!("Control writer stopped");
}

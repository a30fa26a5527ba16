//! Connection state machine shared by the link, video and control workers.

use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Handshaking,
    Streaming,
    Disconnecting,
    Error,
}

impl LinkState {
    /// Success path runs strictly Disconnected -> Connecting -> Handshaking ->
    /// Streaming -> Disconnecting -> Disconnected. Any active state may fail
    /// into `Error`, which can only be torn down.
    pub fn can_transition(self, next: LinkState) -> bool {
        use LinkState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Handshaking)
                | (Handshaking, Streaming)
                | (Streaming, Disconnecting)
                | (Disconnecting, Disconnected)
                | (Connecting | Handshaking | Streaming, Error)
                | (Error, Disconnecting)
                | (Error, Disconnected)
        )
    }

    pub fn is_active(self) -> bool {
        matches!(
            self,
            LinkState::Connecting | LinkState::Handshaking | LinkState::Streaming
        )
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Handshaking => "handshaking",
            LinkState::Streaming => "streaming",
            LinkState::Disconnecting => "disconnecting",
            LinkState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Observable link state. Cloned into every worker as `Arc<LinkStatus>`.
#[derive(Debug)]
pub struct LinkStatus {
    tx: watch::Sender<LinkState>,
    last_error: Mutex<Option<String>>,
}

impl LinkStatus {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(LinkState::Disconnected);
        Arc::new(Self {
            tx,
            last_error: Mutex::new(None),
        })
    }

    pub fn state(&self) -> LinkState {
        *self.tx.borrow()
    }

    pub fn is_streaming(&self) -> bool {
        self.state() == LinkState::Streaming
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.tx.subscribe()
    }

    /// Applies `next` if it is a legal transition from the current state.
    pub fn advance(&self, next: LinkState) -> bool {
        let mut from = LinkState::Disconnected;
        let changed = self.tx.send_if_modified(|state| {
            from = *state;
            if state.can_transition(next) {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            info!("🔗 Link {} -> {}", from, next);
        }
        changed
    }

    /// Moves an active link into `Error`. Returns false when the link was
    /// already shutting down, so teardown races are not reported as faults.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        if self.advance(LinkState::Error) {
            warn!("❌ Link error: {}", reason);
            *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason);
            true
        } else {
            false
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_path_is_strictly_ordered() {
        let status = LinkStatus::new();
        assert!(!status.advance(LinkState::Streaming));
        for next in [
            LinkState::Connecting,
            LinkState::Handshaking,
            LinkState::Streaming,
            LinkState::Disconnecting,
            LinkState::Disconnected,
        ] {
            assert!(status.advance(next), "transition to {next}");
        }
    }

    #[test]
    fn failure_only_from_active_states() {
        let status = LinkStatus::new();
        assert!(!status.fail("not connected yet"));
        status.advance(LinkState::Connecting);
        assert!(status.fail("socket reset"));
        assert_eq!(status.state(), LinkState::Error);
        assert_eq!(status.last_error().as_deref(), Some("socket reset"));
        // no automatic recovery
        assert!(!status.advance(LinkState::Streaming));
        assert!(status.advance(LinkState::Disconnecting));
        assert!(!status.fail("late error"));
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let status = LinkStatus::new();
        let mut rx = status.subscribe();
        status.advance(LinkState::Connecting);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), LinkState::Connecting);
    }
}

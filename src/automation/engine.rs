use super::channels::create_session_channels;
use super::error::ScriptError;
use super::globals::GlobalStateStore;
use super::holds::KeyHolds;
use super::session::{EngineParts, ScriptContext, SessionFlags};
use super::types::{SessionEvent, SessionTrigger};
use super::view::ViewControl;
use crate::config::AutomationConfig;
use crate::control::ControlChannel;
use crate::template_matching::ImageMatcher;
use crate::video::FrameReader;
use log::{debug, info, warn};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

struct SessionEntry {
    name: String,
    flags: Arc<SessionFlags>,
}

type Registry = Arc<Mutex<HashMap<u64, SessionEntry>>>;

/// Runs script sessions against one device.
///
/// Each session gets its own OS thread and [`ScriptContext`]; the control
/// channel, frame reader, template matcher and global store are shared.
pub struct AutomationEngine {
    parts: EngineParts,
    sessions: Registry,
    next_id: AtomicU64,
    events_tx: mpsc::Sender<SessionEvent>,
    shutdown: Arc<AtomicBool>,
}

impl AutomationEngine {
    /// Creates the engine and its event receiver. Starts the watchdog thread
    /// when `config.watchdog_timeout` is set.
    pub fn new(
        control: ControlChannel,
        config: AutomationConfig,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), ScriptError> {
        config.validate()?;
        let (events_tx, events_rx) = create_session_channels();
        let view = Arc::new(ViewControl::new(control.clone(), &config));
        let engine = Self {
            parts: EngineParts {
                control,
                frames: None,
                matcher: Arc::new(ImageMatcher::default()),
                globals: GlobalStateStore::new(),
                holds: KeyHolds::new(),
                view,
                config: Arc::new(config),
            },
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            events_tx,
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        if let Some(timeout) = engine.parts.config.watchdog_timeout {
            spawn_watchdog(
                Arc::downgrade(&engine.sessions),
                Arc::clone(&engine.shutdown),
                engine.events_tx.clone(),
                timeout,
            )?;
        }
        Ok((engine, events_rx))
    }

    pub fn with_matcher(mut self, matcher: Arc<ImageMatcher>) -> Self {
        self.parts.matcher = matcher;
        self
    }

    pub fn with_frames(mut self, frames: FrameReader) -> Self {
        self.parts.frames = Some(frames);
        self
    }

    pub fn with_globals(mut self, globals: GlobalStateStore) -> Self {
        self.parts.globals = globals;
        self
    }

    pub fn globals(&self) -> &GlobalStateStore {
        &self.parts.globals
    }

    pub fn matcher(&self) -> &Arc<ImageMatcher> {
        &self.parts.matcher
    }

    pub fn view(&self) -> &Arc<ViewControl> {
        &self.parts.view
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.parts.config
    }

    /// `holdPress` pointers still down for `key_id`.
    pub fn held_for_key(&self, key_id: u32) -> usize {
        self.parts.holds.count(key_id)
    }

    /// Spawns a session running `body` on a dedicated worker thread.
    ///
    /// The body's result, or a panic turned into [`ScriptError::Panicked`],
    /// is reported through [`SessionHandle::join`] and a
    /// [`SessionEvent::Finished`] event. The session's `touchDown` pointers
    /// are lifted afterwards either way.
    pub fn start<F>(
        &self,
        name: impl Into<String>,
        trigger: SessionTrigger,
        body: F,
    ) -> Result<SessionHandle, ScriptError>
    where
        F: FnOnce(&mut ScriptContext) -> Result<(), ScriptError> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        let flags = SessionFlags::new();
        self.registry().insert(
            id,
            SessionEntry {
                name: name.clone(),
                flags: Arc::clone(&flags),
            },
        );

        let mut ctx = ScriptContext::new(
            id,
            name.clone(),
            trigger,
            self.parts.clone(),
            Arc::clone(&flags),
        );
        let sessions = Arc::clone(&self.sessions);
        let events = self.events_tx.clone();
        let worker_name = name.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("script-{id}"))
            .spawn(move || {
                info!("▶️ Session {} '{}' started", id, worker_name);
                let _ = events.try_send(SessionEvent::Started {
                    id,
                    name: worker_name.clone(),
                });

                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| body(&mut ctx)))
                    .unwrap_or_else(|payload| {
                        Err(ScriptError::Panicked {
                            message: panic_message(payload.as_ref()),
                        })
                    });
                ctx.finish();
                sessions
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&id);

                match &outcome {
                    Ok(()) => info!("⏹️ Session {} '{}' finished", id, worker_name),
                    Err(e) => warn!("❌ Session {} '{}' failed: {}", id, worker_name, e),
                }
                let _ = events.try_send(SessionEvent::Finished {
                    id,
                    name: worker_name,
                    result: outcome.as_ref().map(|_| ()).map_err(|e| e.to_string()),
                });
                outcome
            });

        match spawned {
            Ok(join) => Ok(SessionHandle {
                id,
                name,
                flags,
                join,
            }),
            Err(source) => {
                self.registry().remove(&id);
                Err(ScriptError::Spawn { source })
            }
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<u64, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets the interrupt flag of one session. False if it is not running.
    pub fn stop(&self, id: u64) -> bool {
        match self.registry().get(&id) {
            Some(entry) => {
                entry.flags.interrupted.store(true, Ordering::Release);
                debug!("Session {} '{}' interrupted", id, entry.name);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        for entry in self.registry().values() {
            entry.flags.interrupted.store(true, Ordering::Release);
        }
    }

    /// Running sessions as `(id, name)`, ordered by id.
    pub fn active_sessions(&self) -> Vec<(u64, String)> {
        let mut active: Vec<_> = self
            .registry()
            .iter()
            .map(|(id, entry)| (*id, entry.name.clone()))
            .collect();
        active.sort_unstable_by_key(|(id, _)| *id);
        active
    }

    /// Stops every session and waits up to `timeout` for them to return,
    /// then lifts every pointer the engine still holds down.
    /// Returns true when none is left running.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.stop_all();
        let deadline = Instant::now() + timeout;
        let drained = loop {
            if self.registry().is_empty() {
                break true;
            }
            if Instant::now() >= deadline {
                warn!(
                    "{} script session(s) still running after shutdown",
                    self.registry().len()
                );
                break false;
            }
            std::thread::sleep(self.parts.config.poll_interval);
        };
        self.release_pointers();
        drained
    }

    /// Lifts held keys and the wheel/camera pointers, restoring radial params.
    pub fn release_pointers(&self) {
        let leases = self.parts.holds.take_all();
        if !leases.is_empty() {
            debug!("Lifting {} held pointer(s)", leases.len());
        }
        for lease in leases {
            if let Err(e) = self.parts.control.touch_up(lease) {
                warn!("Could not lift held pointer: {}", e);
            }
        }
        self.parts.view.release_all();
    }
}

impl Drop for AutomationEngine {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.release_pointers();
    }
}

/// Interrupts sessions that have not called a primitive for `timeout`.
fn spawn_watchdog(
    sessions: Weak<Mutex<HashMap<u64, SessionEntry>>>,
    shutdown: Arc<AtomicBool>,
    events: mpsc::Sender<SessionEvent>,
    timeout: Duration,
) -> Result<(), ScriptError> {
    let period = (timeout / 4).clamp(Duration::from_millis(10), Duration::from_millis(250));
    std::thread::Builder::new()
        .name("script-watchdog".to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::Acquire) {
                std::thread::sleep(period);
                let Some(sessions) = sessions.upgrade() else {
                    break;
                };
                let sessions = sessions.lock().unwrap_or_else(|e| e.into_inner());
                for (id, entry) in sessions.iter() {
                    if entry.flags.interrupted.load(Ordering::Acquire)
                        || entry.flags.idle_for() < timeout
                    {
                        continue;
                    }
                    entry.flags.interrupted.store(true, Ordering::Release);
                    warn!(
                        "⏰ Session {} '{}' idle for over {:?}, interrupting",
                        id, entry.name, timeout
                    );
                    let _ = events.try_send(SessionEvent::Error {
                        id: *id,
                        message: format!("watchdog: no primitive called for {timeout:?}"),
                    });
                }
            }
            debug!("Script watchdog stopped");
        })
        .map(|_| ())
        .map_err(|source| ScriptError::Spawn { source })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to one running session.
#[derive(Debug)]
pub struct SessionHandle {
    id: u64,
    name: String,
    flags: Arc<SessionFlags>,
    join: JoinHandle<Result<(), ScriptError>>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cooperative: the script observes it at its next `sleep` or
    /// `isInterrupted` check.
    pub fn stop(&self) {
        self.flags.interrupted.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flags.interrupted.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Blocks until the worker returns.
    pub fn join(self) -> Result<(), ScriptError> {
        self.join.join().unwrap_or_else(|payload| {
            Err(ScriptError::Panicked {
                message: panic_message(payload.as_ref()),
            })
        })
    }
}

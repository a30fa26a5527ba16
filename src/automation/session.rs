//! Per-session primitive implementations.
//!
//! A [`ScriptContext`] is handed to the script body running on the session's
//! worker thread. Every primitive takes `&mut self`, so calls from one
//! session are naturally serialized and reach the control channel in call
//! order.

use super::error::ScriptError;
use super::globals::GlobalStateStore;
use super::holds::KeyHolds;
use super::trajectory::{self, CurveParams, MAX_DURATION_MS, Waypoint};
use super::types::{Primitive, PrimitiveOutput, ScriptValue, SessionTrigger};
use super::view::{RadialParams, ViewControl};
use crate::config::AutomationConfig;
use crate::control::{ControlChannel, Point, PointerLease, keycode_for};
use crate::template_matching::{ImageMatcher, MatchOutcome, NormRect};
use crate::video::FrameReader;
use log::{debug, trace};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Half distance between the two pinch fingers at scale 1.
const PINCH_BASE: f64 = 0.1;
/// One wheel/camera waypoint per this many milliseconds of motion.
const MOVE_STEP_MS: u64 = 10;
const MAX_MOVE_STEPS: u64 = 50;

/// Everything an engine shares with its sessions.
#[derive(Clone)]
pub(crate) struct EngineParts {
    pub control: ControlChannel,
    pub frames: Option<FrameReader>,
    pub matcher: Arc<ImageMatcher>,
    pub globals: GlobalStateStore,
    pub holds: KeyHolds,
    pub view: Arc<ViewControl>,
    pub config: Arc<AutomationConfig>,
}

/// Flags the engine and watchdog observe from outside the worker.
#[derive(Debug)]
pub(crate) struct SessionFlags {
    pub interrupted: AtomicBool,
    pub last_activity: Mutex<Instant>,
}

impl SessionFlags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            interrupted: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
        })
    }

    pub fn feed(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }
}

pub struct ScriptContext {
    id: u64,
    name: String,
    trigger: SessionTrigger,
    parts: EngineParts,
    flags: Arc<SessionFlags>,
    /// Script-chosen pointer numbers of `touchDown`
    touches: HashMap<u32, PointerLease>,
    rng: StdRng,
}

impl ScriptContext {
    pub(crate) fn new(
        id: u64,
        name: String,
        trigger: SessionTrigger,
        parts: EngineParts,
        flags: Arc<SessionFlags>,
    ) -> Self {
        Self {
            id,
            name,
            trigger,
            parts,
            flags,
            touches: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger(&self) -> SessionTrigger {
        self.trigger
    }

    /// `holdPress` pointers of the trigger key plus this session's
    /// `touchDown` pointers.
    pub fn pointers_held(&self) -> usize {
        self.parts.holds.count(self.trigger.key_id) + self.touches.len()
    }

    // ============================================================
    // Interrupt handling
    // ============================================================

    pub fn is_pressed(&mut self) -> bool {
        self.flags.feed();
        self.trigger.is_press
    }

    pub fn is_interrupted(&self) -> bool {
        self.flags.interrupted.load(Ordering::Acquire)
    }

    /// Sets the interrupt flag. The script keeps running until it checks.
    pub fn stop(&mut self) {
        self.flags.feed();
        if !self.flags.interrupted.swap(true, Ordering::AcqRel) {
            debug!("Session {} '{}' stopped itself", self.id, self.name);
        }
    }

    /// Sleeps in `poll_interval` slices. Returns false when the interrupt
    /// flag cut the sleep short.
    pub fn sleep(&mut self, ms: u64) -> bool {
        self.flags.feed();
        self.wait_until(deadline_after(Instant::now(), ms))
    }

    fn wait_until(&self, deadline: Instant) -> bool {
        let poll = self.parts.config.poll_interval;
        loop {
            if self.is_interrupted() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(poll.min(deadline - now));
            self.flags.feed();
        }
    }

    /// Input primitives turn into no-ops once the session was stopped.
    fn input_allowed(&self) -> bool {
        !self.is_interrupted()
    }

    // ============================================================
    // Tap, hold and gestures
    // ============================================================

    fn jittered(&mut self, at: Point) -> Point {
        trajectory::random_offset(at, self.parts.config.random_offset, &mut self.rng)
    }

    /// Taps at `at`, or at the trigger anchor when `None`.
    pub fn click(&mut self, at: Option<Point>) -> Result<(), ScriptError> {
        self.flags.feed();
        if !self.input_allowed() || !self.trigger.is_press {
            return Ok(());
        }
        let at = self.jittered(at.unwrap_or(self.trigger.anchor));
        let lease = self.parts.control.touch_down(at)?;
        self.parts.control.touch_up(lease)?;
        Ok(())
    }

    /// Presses and leaves the pointer down until `release` or until the
    /// release script of the same key runs. On a release trigger it lifts
    /// what the key's press scripts left down instead.
    pub fn hold_press(&mut self, at: Option<Point>) -> Result<(), ScriptError> {
        self.flags.feed();
        if !self.trigger.is_press {
            return self.lift_held();
        }
        if !self.input_allowed() {
            return Ok(());
        }
        let at = self.jittered(at.unwrap_or(self.trigger.anchor));
        let lease = self.parts.control.touch_down(at)?;
        self.parts.holds.push(self.trigger.key_id, lease);
        Ok(())
    }

    /// Lifts the most recent `holdPress` pointer of the trigger key.
    pub fn release(&mut self) -> Result<(), ScriptError> {
        self.flags.feed();
        match self.parts.holds.pop(self.trigger.key_id) {
            Some(lease) => Ok(self.parts.control.touch_up(lease)?),
            None => Ok(()),
        }
    }

    /// Lifts the key's `holdPress` pointers and this session's touches.
    pub fn release_all(&mut self) -> Result<(), ScriptError> {
        self.flags.feed();
        let held = self.lift_held();
        let touches = self.lift_touches();
        held.and(touches)
    }

    fn lift_held(&mut self) -> Result<(), ScriptError> {
        let leases = self.parts.holds.take(self.trigger.key_id);
        lift(&self.parts.control, leases)
    }

    fn lift_touches(&mut self) -> Result<(), ScriptError> {
        let leases: Vec<_> = self.touches.drain().map(|(_, lease)| lease).collect();
        lift(&self.parts.control, leases)
    }

    pub fn slide(
        &mut self,
        from: Point,
        to: Point,
        duration_ms: u64,
        steps: u32,
    ) -> Result<(), ScriptError> {
        self.flags.feed();
        if !self.input_allowed() || !self.trigger.is_press {
            return Ok(());
        }
        let level = self.parts.config.random_offset;
        let from = self.jittered(from);
        let mut path = trajectory::synthesize(
            from,
            to,
            duration_ms,
            steps,
            self.parts.config.slide_curve,
        );
        trajectory::jitter(&mut path, level, &mut self.rng);
        self.run_gesture(vec![(from, path)])
    }

    /// Two-finger pinch around `center`; `scale > 1` spreads the fingers.
    pub fn pinch(
        &mut self,
        center: Point,
        scale: f64,
        duration_ms: u64,
        steps: u32,
    ) -> Result<(), ScriptError> {
        self.flags.feed();
        if !self.input_allowed() || !self.trigger.is_press {
            return Ok(());
        }
        let scale = if scale > 0.0 && scale.is_finite() { scale } else { 1.0 };
        let (start, end) = if scale > 1.0 {
            (PINCH_BASE, PINCH_BASE * scale)
        } else {
            (PINCH_BASE / scale, PINCH_BASE)
        };
        let finger = |sign: f64, d: f64| Point::new(center.x + sign * d, center.y).clamped();

        let paths = [-1.0, 1.0]
            .into_iter()
            .map(|sign| {
                let from = finger(sign, start);
                let path = trajectory::synthesize(
                    from,
                    finger(sign, end),
                    duration_ms,
                    steps,
                    self.parts.config.slide_curve.with_curvature(0),
                );
                (from, path)
            })
            .collect();
        self.run_gesture(paths)
    }

    /// Presses one pointer per path, walks all paths in lockstep and lifts
    /// every pointer, also when the walk fails or is interrupted.
    fn run_gesture(&mut self, paths: Vec<(Point, Vec<Waypoint>)>) -> Result<(), ScriptError> {
        let mut fingers = Vec::with_capacity(paths.len());
        for (from, path) in paths {
            match self.parts.control.touch_down(from) {
                Ok(lease) => fingers.push((lease, path)),
                Err(e) => {
                    let _ = lift(&self.parts.control, fingers.into_iter().map(|(l, _)| l));
                    return Err(e.into());
                }
            }
        }

        let walked = self.walk(&mut fingers);
        let lifted = lift(&self.parts.control, fingers.into_iter().map(|(l, _)| l));
        walked.and(lifted)
    }

    fn walk(&self, fingers: &mut [(PointerLease, Vec<Waypoint>)]) -> Result<(), ScriptError> {
        let started = Instant::now();
        let steps = fingers.iter().map(|(_, p)| p.len()).max().unwrap_or(0);
        for i in 0..steps {
            // All paths share the same timestamps
            if let Some(t_ms) = fingers.first().and_then(|(_, p)| p.get(i)).map(|w| w.t_ms)
                && !self.wait_until(deadline_after(started, t_ms))
            {
                trace!("Session {} gesture interrupted at step {}", self.id, i);
                return Ok(());
            }
            for (lease, path) in fingers.iter_mut() {
                if let Some(waypoint) = path.get(i) {
                    self.parts.control.touch_move(lease, waypoint.at)?;
                }
            }
        }
        Ok(())
    }

    // ============================================================
    // Keys
    // ============================================================

    /// Presses the named key for `duration_ms`. Key up is sent even when the
    /// hold is interrupted.
    pub fn key(&mut self, name: &str, duration_ms: u64) -> Result<(), ScriptError> {
        self.flags.feed();
        let keycode = keycode_for(name).ok_or_else(|| ScriptError::UnknownKey {
            name: name.to_string(),
        })?;
        if !self.input_allowed() || !self.trigger.is_press {
            return Ok(());
        }
        self.parts.control.key_down(keycode)?;
        self.wait_until(deadline_after(Instant::now(), duration_ms));
        self.parts.control.key_up(keycode)?;
        Ok(())
    }

    // ============================================================
    // Steer wheel and camera
    // ============================================================

    pub fn set_radial_param(&mut self, params: RadialParams) {
        self.flags.feed();
        self.parts.view.set_radial(self.trigger.key_id, params);
    }

    pub fn reset_wheel(&mut self) -> Result<(), ScriptError> {
        self.flags.feed();
        self.parts.view.reset_wheel()
    }

    pub fn reset_view(&mut self) -> Result<(), ScriptError> {
        self.flags.feed();
        self.parts.view.reset_view()
    }

    /// Drives the wheel towards deflection (`dx`, `dy`) and leaves it there.
    pub fn wheel_move(&mut self, dx: f64, dy: f64, duration_ms: u64) -> Result<(), ScriptError> {
        self.flags.feed();
        if !self.input_allowed() {
            return Ok(());
        }
        let view = Arc::clone(&self.parts.view);
        let from = view.grab_wheel(self.id)?;
        let to = view.wheel_target(dx, dy);
        let curve = self.parts.config.wheel_curve;
        let id = self.id;
        self.drive(from, to, duration_ms, curve, |at| view.move_wheel(id, at))
    }

    /// Drags the camera pointer by (`dx`, `dy`) full deflections.
    pub fn camera_move(&mut self, dx: f64, dy: f64, duration_ms: u64) -> Result<(), ScriptError> {
        self.flags.feed();
        if !self.input_allowed() {
            return Ok(());
        }
        let view = Arc::clone(&self.parts.view);
        let from = view.grab_camera(self.id)?;
        let to = view.camera_target(from, dx, dy);
        let curve = self.parts.config.wheel_curve;
        let id = self.id;
        self.drive(from, to, duration_ms, curve, |at| view.move_camera(id, at))
    }

    fn drive(
        &mut self,
        from: Point,
        to: Point,
        duration_ms: u64,
        curve: CurveParams,
        mut step: impl FnMut(Point) -> Result<(), ScriptError>,
    ) -> Result<(), ScriptError> {
        let steps = (duration_ms / MOVE_STEP_MS).clamp(1, MAX_MOVE_STEPS) as u32;
        let mut path = trajectory::synthesize(from, to, duration_ms, steps, curve);
        trajectory::jitter(&mut path, self.parts.config.random_offset, &mut self.rng);
        let started = Instant::now();
        for waypoint in path {
            if !self.wait_until(deadline_after(started, waypoint.t_ms)) {
                break;
            }
            step(waypoint.at)?;
        }
        Ok(())
    }

    // ============================================================
    // Low-level touch
    // ============================================================

    pub fn touch_down(&mut self, logical: u32, at: Point) -> Result<(), ScriptError> {
        self.flags.feed();
        if !self.input_allowed() {
            return Ok(());
        }
        if self.touches.contains_key(&logical) {
            return Err(ScriptError::invalid(
                "touchDown",
                format!("pointer {logical} is already down"),
            ));
        }
        let at = self.jittered(at);
        let lease = self.parts.control.touch_down(at)?;
        self.touches.insert(logical, lease);
        Ok(())
    }

    pub fn touch_move(&mut self, logical: u32, at: Point) -> Result<(), ScriptError> {
        self.flags.feed();
        if !self.input_allowed() {
            return Ok(());
        }
        let lease = self.touches.get_mut(&logical).ok_or_else(|| {
            ScriptError::invalid("touchMove", format!("pointer {logical} is not down"))
        })?;
        Ok(self.parts.control.touch_move(lease, at)?)
    }

    pub fn touch_up(&mut self, logical: u32) -> Result<(), ScriptError> {
        self.flags.feed();
        let lease = self.touches.remove(&logical).ok_or_else(|| {
            ScriptError::invalid("touchUp", format!("pointer {logical} is not down"))
        })?;
        Ok(self.parts.control.touch_up(lease)?)
    }

    // ============================================================
    // Globals and image matching
    // ============================================================

    pub fn get_global(&mut self, key: &str) -> Result<ScriptValue, ScriptError> {
        self.flags.feed();
        self.parts
            .globals
            .get(key)
            .ok_or_else(|| ScriptError::GlobalNotFound {
                key: key.to_string(),
            })
    }

    pub fn set_global(&mut self, key: &str, value: ScriptValue) {
        self.flags.feed();
        self.parts.globals.set(key, value);
    }

    pub fn find_image(
        &mut self,
        template: &str,
        region: Option<NormRect>,
        threshold: f32,
    ) -> Result<MatchOutcome, ScriptError> {
        self.flags.feed();
        let frame = self.parts.frames.as_ref().and_then(|r| r.latest());
        Ok(self
            .parts
            .matcher
            .find(frame.as_ref(), template, region, threshold)?)
    }

    pub fn find_image_by_region(
        &mut self,
        template: Option<&str>,
        region: &str,
        threshold: f32,
    ) -> Result<MatchOutcome, ScriptError> {
        self.flags.feed();
        let frame = self.parts.frames.as_ref().and_then(|r| r.latest());
        Ok(self
            .parts
            .matcher
            .find_in_region(frame.as_ref(), template, region, threshold)?)
    }

    // ============================================================
    // Dispatch
    // ============================================================

    pub fn dispatch(&mut self, primitive: Primitive) -> Result<PrimitiveOutput, ScriptError> {
        trace!("Session {} -> {}", self.id, primitive.name());
        let unit = |r: Result<(), ScriptError>| r.map(|_| PrimitiveOutput::Unit);
        match primitive {
            Primitive::Click { at } => unit(self.click(at)),
            Primitive::HoldPress { at } => unit(self.hold_press(at)),
            Primitive::Release => unit(self.release()),
            Primitive::ReleaseAll => unit(self.release_all()),
            Primitive::Slide {
                from,
                to,
                duration_ms,
                steps,
            } => unit(self.slide(from, to, duration_ms, steps)),
            Primitive::Pinch {
                center,
                scale,
                duration_ms,
                steps,
            } => unit(self.pinch(center, scale, duration_ms, steps)),
            Primitive::Key { name, duration_ms } => unit(self.key(&name, duration_ms)),
            Primitive::Sleep { ms } => Ok(PrimitiveOutput::Bool(self.sleep(ms))),
            Primitive::IsPressed => Ok(PrimitiveOutput::Bool(self.is_pressed())),
            Primitive::IsInterrupted => Ok(PrimitiveOutput::Bool(self.is_interrupted())),
            Primitive::Stop => {
                self.stop();
                Ok(PrimitiveOutput::Unit)
            }
            Primitive::ResetView => unit(self.reset_view()),
            Primitive::ResetWheel => unit(self.reset_wheel()),
            Primitive::SetRadialParam(params) => {
                self.set_radial_param(params);
                Ok(PrimitiveOutput::Unit)
            }
            Primitive::WheelMove {
                dx,
                dy,
                duration_ms,
            } => unit(self.wheel_move(dx, dy, duration_ms)),
            Primitive::CameraMove {
                dx,
                dy,
                duration_ms,
            } => unit(self.camera_move(dx, dy, duration_ms)),
            Primitive::GetGlobal { key } => self.get_global(&key).map(PrimitiveOutput::Value),
            Primitive::SetGlobal { key, value } => {
                self.set_global(&key, value);
                Ok(PrimitiveOutput::Unit)
            }
            Primitive::FindImage {
                template,
                region,
                threshold,
            } => self
                .find_image(&template, region, threshold)
                .map(PrimitiveOutput::Match),
            Primitive::FindImageByRegion {
                template,
                region,
                threshold,
            } => self
                .find_image_by_region(template.as_deref(), &region, threshold)
                .map(PrimitiveOutput::Match),
            Primitive::TouchDown { logical, at } => unit(self.touch_down(logical, at)),
            Primitive::TouchMove { logical, at } => unit(self.touch_move(logical, at)),
            Primitive::TouchUp { logical } => unit(self.touch_up(logical)),
        }
    }

    /// Entry point for a script host: parses the call and runs it.
    pub fn call(&mut self, name: &str, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
        let primitive = Primitive::from_call(name, args)?;
        self.dispatch(primitive).map(PrimitiveOutput::into_value)
    }

    /// Runs when the body returns. Lifts the session's `touchDown`
    /// pointers; `holdPress` pointers belong to the key and stay down until
    /// its release script. The release script of a key also restores the
    /// radial params that key set.
    pub(crate) fn finish(&mut self) {
        if let Err(e) = self.lift_touches() {
            debug!("Session {} pointers lifted with error: {}", self.id, e);
        }
        self.parts.view.disown(self.id);
        if !self.trigger.is_press {
            self.parts.view.restore_radial(self.trigger.key_id);
        }
    }
}

/// `base + ms`, with `ms` capped at `MAX_DURATION_MS`.
fn deadline_after(base: Instant, ms: u64) -> Instant {
    base + Duration::from_millis(ms.min(MAX_DURATION_MS))
}

/// Lifts every lease; all ids are freed even if a message cannot be sent.
/// Returns the first send error.
fn lift(
    control: &ControlChannel,
    leases: impl IntoIterator<Item = PointerLease>,
) -> Result<(), ScriptError> {
    let mut first = Ok(());
    for lease in leases {
        if let Err(e) = control.touch_up(lease)
            && first.is_ok()
        {
            first = Err(e.into());
        }
    }
    first
}

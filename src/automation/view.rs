//! Steer wheel (virtual joystick) and camera drag pointers.
//!
//! Both are long-lived touches shared by all sessions of an engine: a
//! session grabs one, moves it along synthesized paths across several
//! primitive calls, and `resetWheel`/`resetView` lift it. While its session
//! runs nobody else may drive it; once that session ends the pointer stays
//! down and the next session to move it takes it over.

use super::error::ScriptError;
use crate::config::{AutomationConfig, WheelGeometry};
use crate::control::{ControlChannel, Point, PointerLease};
use log::{debug, warn};
use std::sync::Mutex;

/// Per-direction scale of the wheel radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadialParams {
    pub up: f64,
    pub down: f64,
    pub left: f64,
    pub right: f64,
}

impl Default for RadialParams {
    fn default() -> Self {
        Self {
            up: 1.0,
            down: 1.0,
            left: 1.0,
            right: 1.0,
        }
    }
}

impl RadialParams {
    fn sanitized(self) -> Self {
        let fix = |v: f64| if v.is_finite() { v.clamp(0.0, 4.0) } else { 1.0 };
        Self {
            up: fix(self.up),
            down: fix(self.down),
            left: fix(self.left),
            right: fix(self.right),
        }
    }
}

struct Held {
    /// Running session driving the pointer, `None` once it ended
    owner: Option<u64>,
    lease: PointerLease,
}

#[derive(Default)]
struct ViewState {
    radial: RadialParams,
    /// Key whose scripts last changed `radial`
    radial_owner: Option<u32>,
    wheel: Option<Held>,
    camera: Option<Held>,
}

pub struct ViewControl {
    control: ControlChannel,
    wheel: WheelGeometry,
    camera_anchor: Point,
    camera_span: f64,
    state: Mutex<ViewState>,
}

impl ViewControl {
    pub fn new(control: ControlChannel, config: &AutomationConfig) -> Self {
        Self {
            control,
            wheel: config.wheel,
            camera_anchor: config.camera_anchor,
            camera_span: config.camera_span,
            state: Mutex::default(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn radial(&self) -> RadialParams {
        self.state().radial
    }

    pub fn set_radial(&self, key_id: u32, params: RadialParams) {
        let mut state = self.state();
        state.radial = params.sanitized();
        state.radial_owner = Some(key_id);
        debug!("Key {} set radial params {:?}", key_id, state.radial);
    }

    /// Back to 1.0 in every direction if `key_id` made the last change.
    pub fn restore_radial(&self, key_id: u32) -> bool {
        let mut state = self.state();
        if state.radial_owner != Some(key_id) {
            return false;
        }
        state.radial = RadialParams::default();
        state.radial_owner = None;
        debug!("Key {} released, radial params restored", key_id);
        true
    }

    /// Screen position for a joystick deflection; `dx`/`dy` are clamped to
    /// `[-1, 1]` and scaled by the radial parameter of their direction.
    pub fn wheel_target(&self, dx: f64, dy: f64) -> Point {
        let r = self.radial();
        let dx = dx.clamp(-1.0, 1.0);
        let dy = dy.clamp(-1.0, 1.0);
        let sx = if dx < 0.0 { r.left } else { r.right };
        let sy = if dy < 0.0 { r.up } else { r.down };
        Point::new(
            self.wheel.center.x + dx * self.wheel.radius * sx,
            self.wheel.center.y + dy * self.wheel.radius * sy,
        )
        .clamped()
    }

    /// Camera drag target `dx`/`dy` full deflections away from `from`.
    pub fn camera_target(&self, from: Point, dx: f64, dy: f64) -> Point {
        Point::new(
            from.x + dx * self.camera_span,
            from.y + dy * self.camera_span,
        )
        .clamped()
    }

    /// Presses the wheel at its center unless it is already down.
    /// Returns the current wheel position.
    pub fn grab_wheel(&self, session: u64) -> Result<Point, ScriptError> {
        let mut state = self.state();
        grab(&self.control, &mut state.wheel, session, self.wheel.center)
            .map_err(|e| e.within("wheelMove", "wheel"))
    }

    pub fn grab_camera(&self, session: u64) -> Result<Point, ScriptError> {
        let mut state = self.state();
        grab(&self.control, &mut state.camera, session, self.camera_anchor)
            .map_err(|e| e.within("cameraMove", "camera pointer"))
    }

    pub fn move_wheel(&self, session: u64, at: Point) -> Result<(), ScriptError> {
        let mut state = self.state();
        step(&self.control, &mut state.wheel, session, at)
    }

    pub fn move_camera(&self, session: u64, at: Point) -> Result<(), ScriptError> {
        let mut state = self.state();
        step(&self.control, &mut state.camera, session, at)
    }

    pub fn reset_wheel(&self) -> Result<(), ScriptError> {
        let held = self.state().wheel.take();
        lift(&self.control, held)
    }

    pub fn reset_view(&self) -> Result<(), ScriptError> {
        let held = self.state().camera.take();
        lift(&self.control, held)
    }

    pub fn wheel_held(&self) -> bool {
        self.state().wheel.is_some()
    }

    pub fn camera_held(&self) -> bool {
        self.state().camera.is_some()
    }

    /// Hands the pointers `session` was driving over to whoever moves
    /// them next. They stay down.
    pub fn disown(&self, session: u64) {
        let mut guard = self.state();
        let state = &mut *guard;
        for held in [&mut state.wheel, &mut state.camera].into_iter().flatten() {
            if held.owner == Some(session) {
                held.owner = None;
            }
        }
    }

    /// Lifts both pointers and restores radial params. Engine teardown.
    pub fn release_all(&self) {
        let (wheel, camera) = {
            let mut state = self.state();
            state.radial = RadialParams::default();
            state.radial_owner = None;
            (state.wheel.take(), state.camera.take())
        };
        for held in [wheel, camera] {
            if let Err(e) = lift(&self.control, held) {
                warn!("Could not lift view pointer: {}", e);
            }
        }
    }
}

enum GrabError {
    Busy(u64),
    Send(ScriptError),
}

impl GrabError {
    fn within(self, primitive: &str, what: &str) -> ScriptError {
        match self {
            GrabError::Busy(owner) => {
                ScriptError::invalid(primitive, format!("{what} is driven by session {owner}"))
            }
            GrabError::Send(e) => e,
        }
    }
}

fn grab(
    control: &ControlChannel,
    slot: &mut Option<Held>,
    session: u64,
    origin: Point,
) -> Result<Point, GrabError> {
    if let Some(held) = slot {
        if let Some(owner) = held.owner
            && owner != session
        {
            return Err(GrabError::Busy(owner));
        }
        held.owner = Some(session);
        return Ok(held.lease.position());
    }
    let lease = control
        .touch_down(origin)
        .map_err(|e| GrabError::Send(e.into()))?;
    let at = lease.position();
    *slot = Some(Held {
        owner: Some(session),
        lease,
    });
    Ok(at)
}

fn step(
    control: &ControlChannel,
    slot: &mut Option<Held>,
    session: u64,
    at: Point,
) -> Result<(), ScriptError> {
    match slot {
        Some(held) if held.owner == Some(session) => {
            Ok(control.touch_move(&mut held.lease, at)?)
        }
        // Reset mid-gesture, possibly re-grabbed by another session
        _ => Ok(()),
    }
}

fn lift(control: &ControlChannel, held: Option<Held>) -> Result<(), ScriptError> {
    match held {
        Some(held) => Ok(control.touch_up(held.lease)?),
        None => Ok(()),
    }
}

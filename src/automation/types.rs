// Types and enums for script automation
use super::error::ScriptError;
use super::trajectory::{MAX_DURATION_MS, MAX_STEPS};
use super::view::RadialParams;
use crate::control::Point;
use crate::template_matching::{MatchOutcome, NormRect};
use serde_json::json;

/// Values exchanged with the script host.
pub type ScriptValue = serde_json::Value;

const DEFAULT_SLIDE_MS: f64 = 200.0;
const DEFAULT_PINCH_MS: f64 = 300.0;
const DEFAULT_KEY_MS: f64 = 50.0;
const DEFAULT_MOVE_MS: f64 = 100.0;
const DEFAULT_STEPS: f64 = 10.0;
const DEFAULT_THRESHOLD: f64 = 0.8;

/// The fixed primitive set a script host can call.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Tap; `None` taps the trigger anchor
    Click { at: Option<Point> },
    HoldPress { at: Option<Point> },
    Release,
    ReleaseAll,
    Slide {
        from: Point,
        to: Point,
        duration_ms: u64,
        steps: u32,
    },
    Pinch {
        center: Point,
        scale: f64,
        duration_ms: u64,
        steps: u32,
    },
    Key { name: String, duration_ms: u64 },
    Sleep { ms: u64 },
    IsPressed,
    IsInterrupted,
    Stop,
    ResetView,
    ResetWheel,
    SetRadialParam(RadialParams),
    WheelMove { dx: f64, dy: f64, duration_ms: u64 },
    CameraMove { dx: f64, dy: f64, duration_ms: u64 },
    GetGlobal { key: String },
    SetGlobal { key: String, value: ScriptValue },
    FindImage {
        template: String,
        region: Option<NormRect>,
        threshold: f32,
    },
    FindImageByRegion {
        template: Option<String>,
        region: String,
        threshold: f32,
    },
    TouchDown { logical: u32, at: Point },
    TouchMove { logical: u32, at: Point },
    TouchUp { logical: u32 },
}

impl Primitive {
    /// Builds a primitive from a host call. Names are matched ignoring case
    /// and underscores, so `holdPress`, `holdpress` and `hold_press` agree.
    pub fn from_call(name: &str, args: &[ScriptValue]) -> Result<Self, ScriptError> {
        let key: String = name
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let a = Args { name, args };

        Ok(match key.as_str() {
            "click" => Primitive::Click { at: a.anchor_or_point(0)? },
            "holdpress" => Primitive::HoldPress { at: a.anchor_or_point(0)? },
            "release" => Primitive::Release,
            "releaseall" => Primitive::ReleaseAll,
            "slide" => Primitive::Slide {
                from: a.point(0)?,
                to: a.point(2)?,
                duration_ms: a.millis_or(4, DEFAULT_SLIDE_MS)?,
                steps: a.steps_or(5)?,
            },
            "pinch" => Primitive::Pinch {
                center: a.point(0)?,
                scale: a.number_or(2, 1.0)?,
                duration_ms: a.millis_or(3, DEFAULT_PINCH_MS)?,
                steps: a.steps_or(4)?,
            },
            "key" => Primitive::Key {
                name: a.text(0)?,
                duration_ms: a.millis_or(1, DEFAULT_KEY_MS)?,
            },
            "sleep" | "delay" => Primitive::Sleep {
                ms: a.millis_or(0, 0.0)?,
            },
            "ispressed" => Primitive::IsPressed,
            "isinterrupted" => Primitive::IsInterrupted,
            "stop" => Primitive::Stop,
            "resetview" => Primitive::ResetView,
            "resetwheel" | "directionreset" => Primitive::ResetWheel,
            "setradialparam" => Primitive::SetRadialParam(RadialParams {
                up: a.number(0)?,
                down: a.number(1)?,
                left: a.number(2)?,
                right: a.number(3)?,
            }),
            "wheelmove" => Primitive::WheelMove {
                dx: a.number(0)?,
                dy: a.number(1)?,
                duration_ms: a.millis_or(2, DEFAULT_MOVE_MS)?,
            },
            "cameramove" => Primitive::CameraMove {
                dx: a.number(0)?,
                dy: a.number(1)?,
                duration_ms: a.millis_or(2, DEFAULT_MOVE_MS)?,
            },
            "getglobal" => Primitive::GetGlobal { key: a.text(0)? },
            "setglobal" => Primitive::SetGlobal {
                key: a.text(0)?,
                value: args.get(1).cloned().unwrap_or(ScriptValue::Null),
            },
            "findimage" => {
                // findImage(name[, threshold]) or findImage(name, x1, y1, x2, y2[, threshold])
                let template = a.text(0)?;
                if args.len() >= 5 {
                    Primitive::FindImage {
                        template,
                        region: Some(NormRect::new(
                            a.number(1)?,
                            a.number(2)?,
                            a.number(3)?,
                            a.number(4)?,
                        )),
                        threshold: a.number_or(5, DEFAULT_THRESHOLD)? as f32,
                    }
                } else {
                    Primitive::FindImage {
                        template,
                        region: None,
                        threshold: a.number_or(1, DEFAULT_THRESHOLD)? as f32,
                    }
                }
            }
            "findimagebyregion" => Primitive::FindImageByRegion {
                template: a.optional_text(0),
                region: a.text(1)?,
                threshold: a.number_or(2, DEFAULT_THRESHOLD)? as f32,
            },
            "touchdown" => Primitive::TouchDown {
                logical: a.logical(0)?,
                at: a.point(1)?,
            },
            "touchmove" => Primitive::TouchMove {
                logical: a.logical(0)?,
                at: a.point(1)?,
            },
            "touchup" => Primitive::TouchUp {
                logical: a.logical(0)?,
            },
            _ => {
                return Err(ScriptError::UnknownPrimitive {
                    name: name.to_string(),
                });
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Click { .. } => "click",
            Primitive::HoldPress { .. } => "holdPress",
            Primitive::Release => "release",
            Primitive::ReleaseAll => "releaseAll",
            Primitive::Slide { .. } => "slide",
            Primitive::Pinch { .. } => "pinch",
            Primitive::Key { .. } => "key",
            Primitive::Sleep { .. } => "sleep",
            Primitive::IsPressed => "isPressed",
            Primitive::IsInterrupted => "isInterrupted",
            Primitive::Stop => "stop",
            Primitive::ResetView => "resetView",
            Primitive::ResetWheel => "resetWheel",
            Primitive::SetRadialParam(_) => "setRadialParam",
            Primitive::WheelMove { .. } => "wheelMove",
            Primitive::CameraMove { .. } => "cameraMove",
            Primitive::GetGlobal { .. } => "getGlobal",
            Primitive::SetGlobal { .. } => "setGlobal",
            Primitive::FindImage { .. } => "findImage",
            Primitive::FindImageByRegion { .. } => "findImageByRegion",
            Primitive::TouchDown { .. } => "touchDown",
            Primitive::TouchMove { .. } => "touchMove",
            Primitive::TouchUp { .. } => "touchUp",
        }
    }
}

/// Positional argument access with typed errors.
struct Args<'a> {
    name: &'a str,
    args: &'a [ScriptValue],
}

impl Args<'_> {
    fn present(&self, i: usize) -> Option<&ScriptValue> {
        self.args.get(i).filter(|v| !v.is_null())
    }

    fn number(&self, i: usize) -> Result<f64, ScriptError> {
        self.present(i)
            .and_then(ScriptValue::as_f64)
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                ScriptError::invalid(self.name, format!("argument {} must be a number", i + 1))
            })
    }

    fn number_or(&self, i: usize, default: f64) -> Result<f64, ScriptError> {
        match self.present(i) {
            None => Ok(default),
            Some(_) => self.number(i),
        }
    }

    /// Negative durations count as 0, long ones are capped at a day.
    fn millis_or(&self, i: usize, default: f64) -> Result<u64, ScriptError> {
        let ms = self.number_or(i, default)?;
        Ok((ms.max(0.0) as u64).min(MAX_DURATION_MS))
    }

    /// Non-positive step counts fall back to the default.
    fn steps_or(&self, i: usize) -> Result<u32, ScriptError> {
        let steps = self.number_or(i, DEFAULT_STEPS)?;
        Ok(if steps < 1.0 {
            DEFAULT_STEPS as u32
        } else {
            steps.min(MAX_STEPS as f64) as u32
        })
    }

    fn point(&self, i: usize) -> Result<Point, ScriptError> {
        Ok(Point::new(self.number(i)?, self.number(i + 1)?))
    }

    /// Missing or negative coordinates select the trigger anchor.
    fn anchor_or_point(&self, i: usize) -> Result<Option<Point>, ScriptError> {
        if self.present(i).is_none() || self.present(i + 1).is_none() {
            return Ok(None);
        }
        let at = self.point(i)?;
        Ok((at.x >= 0.0 && at.y >= 0.0).then_some(at))
    }

    fn text(&self, i: usize) -> Result<String, ScriptError> {
        self.optional_text(i)
            .ok_or_else(|| {
                ScriptError::invalid(self.name, format!("argument {} must be a string", i + 1))
            })
    }

    fn optional_text(&self, i: usize) -> Option<String> {
        match self.present(i)? {
            ScriptValue::String(s) if !s.is_empty() => Some(s.clone()),
            ScriptValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn logical(&self, i: usize) -> Result<u32, ScriptError> {
        let n = self.number(i)?;
        if n < 0.0 || n.fract() != 0.0 || n > u32::MAX as f64 {
            return Err(ScriptError::invalid(
                self.name,
                "pointer number must be a non-negative integer",
            ));
        }
        Ok(n as u32)
    }
}

/// What a primitive hands back to the script.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveOutput {
    Unit,
    Bool(bool),
    Value(ScriptValue),
    Match(MatchOutcome),
}

impl PrimitiveOutput {
    pub fn into_value(self) -> ScriptValue {
        match self {
            PrimitiveOutput::Unit => ScriptValue::Null,
            PrimitiveOutput::Bool(b) => ScriptValue::Bool(b),
            PrimitiveOutput::Value(v) => v,
            PrimitiveOutput::Match(m) => json!({
                "found": m.found,
                "x": m.x,
                "y": m.y,
                "confidence": m.confidence,
            }),
        }
    }
}

/// The input event that started a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionTrigger {
    /// Id of the mapped key that fired the script
    pub key_id: u32,
    /// Default position for `click()`/`holdPress()` without coordinates
    pub anchor: Point,
    /// false when the script runs for the key's release
    pub is_press: bool,
}

impl Default for SessionTrigger {
    fn default() -> Self {
        Self {
            key_id: 0,
            anchor: Point::new(0.5, 0.5),
            is_press: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started { id: u64, name: String },
    Finished {
        id: u64,
        name: String,
        result: Result<(), String>,
    },
    Error { id: u64, message: String },
}

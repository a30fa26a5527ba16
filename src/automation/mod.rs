// Automation module - script sessions driving the device
// Each session runs on its own worker thread with a `ScriptContext` that
// exposes the primitive set (taps, gestures, keys, waits, image search,
// shared globals). Motion paths come from the trajectory synthesizer.

pub mod channels;
pub mod engine;
pub mod error;
pub mod globals;
pub mod holds;
pub mod session;
pub mod trajectory;
pub mod types;
pub mod view;


pub use channels::create_session_channels;
pub use engine::{AutomationEngine, SessionHandle};
pub use error::ScriptError;
pub use globals::GlobalStateStore;
pub use holds::KeyHolds;
pub use session::ScriptContext;
pub use trajectory::{CurveParams, Waypoint, jitter, random_offset, synthesize};
pub use types::{Primitive, PrimitiveOutput, ScriptValue, SessionEvent, SessionTrigger};
pub use view::{RadialParams, ViewControl};

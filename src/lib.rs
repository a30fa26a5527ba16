pub mod adb;
pub mod automation;
pub mod config;
pub mod control;
pub mod link;
pub mod telemetry;
pub mod template_matching;
pub mod video;

pub use automation::{AutomationEngine, GlobalStateStore, ScriptContext};
pub use control::ControlChannel;
pub use link::{DeviceLink, LinkState, Session};
pub use telemetry::PerformanceTelemetry;
pub use template_matching::ImageMatcher;
pub use video::{FrameProducer, VideoPipeline};

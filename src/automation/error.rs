use crate::config::ConfigError;
use crate::control::ChannelError;
use crate::template_matching::MatchError;
use thiserror::Error;

/// The error type returned to scripts by automation primitives.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Unknown key name '{name}'")]
    UnknownKey { name: String },

    #[error("Unknown primitive '{name}'")]
    UnknownPrimitive { name: String },

    #[error("Invalid argument for {primitive}: {reason}")]
    InvalidArgument { primitive: String, reason: String },

    #[error("Global '{key}' is not set")]
    GlobalNotFound { key: String },

    #[error("Script panicked: {message}")]
    Panicked { message: String },

    #[error("Failed to spawn script worker: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid automation config: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Match(#[from] MatchError),
}

impl ScriptError {
    pub(crate) fn invalid(primitive: &str, reason: impl Into<String>) -> Self {
        ScriptError::InvalidArgument {
            primitive: primitive.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the device link is gone; every later input call will fail
    /// the same way.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ScriptError::Channel(e) if e.is_disconnect())
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("Video pipeline already started for this session")]
    AlreadyStarted,

    #[error("Session is not streaming (state: {state})")]
    NotStreaming { state: crate::link::LinkState },

    #[error("No built-in decoder for {codec:?}; supply one with VideoPipeline::start_with_decoder")]
    UnsupportedCodec { codec: crate::config::VideoCodec },

    #[error("Invalid pipeline configuration: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Failure to turn one access unit into pixels. Never fatal for the stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Image decode failed: {source}")]
    Image {
        #[from]
        source: image::ImageError,
    },

    #[error("Raw frame has {actual} bytes, expected at least {expected} for {width}x{height}")]
    RawSizeMismatch {
        expected: usize,
        actual: usize,
        width: u32,
        height: u32,
    },

    #[error("Frame size not known yet")]
    UnknownSize,

    #[error("Malformed config packet ({len} bytes)")]
    BadConfig { len: usize },
}

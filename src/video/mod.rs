// Video module - elementary stream to decoded frames
// Receiver task -> bounded unit queue -> blocking decode worker -> frame pool
// -> current-frame watch + render queue.

pub mod decoder;
pub mod demuxer;
pub mod error;
pub mod frame;
pub mod pipeline;


pub use decoder::{Decoder, ImageDecoder, PixelFormat, RawDecoder, decoder_for};
pub use demuxer::{AccessUnit, Demuxer};
pub use error::{DecodeError, VideoError};
pub use frame::{Frame, FrameBuf, FramePool};
pub use pipeline::{FpsLimiter, FrameProducer, FrameReader, VideoPipeline};

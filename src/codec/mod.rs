//! Frame codec
//!
//! Text framing for captured sample windows: the encoder runs on the
//! streamer, the decoder on the receiver.

pub mod decoder;
pub mod encoder;

pub use decoder::{DecodedFrame, FrameDecoder, FrameSummary};
pub use encoder::FrameEncoder;

//! Frame encoder
//!
//! Serializes one full capture buffer into a newline-terminated wire message.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt::Write;

use crate::constants::FRAME_SAMPLES;
use crate::error::CodecError;
use crate::protocol::{AudioDataRef, FrameFormat, FRAME_DELIMITER, PLAIN_SEPARATOR};

/// Worst-case rendered width of one sample plus separator ("-32768,")
const MAX_SAMPLE_WIDTH: usize = 7;

/// Frame encoder for a fixed frame size
pub struct FrameEncoder {
    format: FrameFormat,
    frame_size: usize,
    /// Scratch text for the plain format (reused to avoid allocations)
    text: String,
    frames_encoded: u64,
    bytes_produced: u64,
}

impl FrameEncoder {
    pub fn new(format: FrameFormat) -> Self {
        Self::with_frame_size(format, FRAME_SAMPLES)
    }

    pub fn with_frame_size(format: FrameFormat, frame_size: usize) -> Self {
        Self {
            format,
            frame_size,
            text: String::with_capacity(frame_size * MAX_SAMPLE_WIDTH + 1),
            frames_encoded: 0,
            bytes_produced: 0,
        }
    }

    /// Encode one frame in the configured format.
    ///
    /// `samples` must hold exactly one frame; any i16 values are accepted.
    pub fn encode(&mut self, samples: &[i16]) -> Result<Bytes, CodecError> {
        if samples.len() != self.frame_size {
            return Err(CodecError::InvalidFrameSize(samples.len()));
        }

        let message = match self.format {
            FrameFormat::Structured => Self::encode_structured(samples)?,
            FrameFormat::Plain => self.encode_plain(samples),
        };

        self.frames_encoded += 1;
        self.bytes_produced += message.len() as u64;

        Ok(message)
    }

    /// `{"audio_data":[s0,...]}\n`
    fn encode_structured(samples: &[i16]) -> Result<Bytes, CodecError> {
        let mut writer = BytesMut::with_capacity(samples.len() * MAX_SAMPLE_WIDTH + 32).writer();

        serde_json::to_writer(&mut writer, &AudioDataRef { audio_data: samples })
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        let mut buf = writer.into_inner();
        buf.put_u8(FRAME_DELIMITER);
        Ok(buf.freeze())
    }

    /// `s0,s1,...\n`
    fn encode_plain(&mut self, samples: &[i16]) -> Bytes {
        self.text.clear();

        for (i, sample) in samples.iter().enumerate() {
            if i > 0 {
                self.text.push(PLAIN_SEPARATOR);
            }
            // Writing into a String cannot fail
            let _ = write!(self.text, "{}", sample);
        }
        self.text.push(FRAME_DELIMITER as char);

        Bytes::copy_from_slice(self.text.as_bytes())
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
            average_frame_size: if self.frames_encoded > 0 {
                self.bytes_produced as f32 / self.frames_encoded as f32
            } else {
                0.0
            },
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    pub average_frame_size: f32,
}

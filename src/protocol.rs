//! Wire protocol definitions
//!
//! One frame of samples travels as a single line terminated by `\n`:
//!
//! ```text
//! structured:  {"audio_data":[s0,s1,...,s1023]}\n
//! plain:       s0,s1,...,s1023\n
//! ```
//!
//! The trailing newline is the only framing; receivers split on it.

use serde::{Deserialize, Serialize};

/// Name of the array field in structured frames
pub const AUDIO_DATA_FIELD: &str = "audio_data";

/// Message delimiter
pub const FRAME_DELIMITER: u8 = b'\n';

/// Plain-format sample separator
pub const PLAIN_SEPARATOR: char = ',';

/// Frame serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    /// JSON object with one sample array field (main send path)
    #[default]
    Structured,
    /// Comma-joined decimal samples (alternate encoder)
    Plain,
}

impl std::fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameFormat::Structured => write!(f, "structured"),
            FrameFormat::Plain => write!(f, "plain"),
        }
    }
}

/// Borrowed structured frame, serialized by the encoder
#[derive(Debug, Serialize)]
pub struct AudioDataRef<'a> {
    pub audio_data: &'a [i16],
}

/// Owned structured frame, deserialized by the receiver
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AudioData {
    pub audio_data: Vec<i16>,
}

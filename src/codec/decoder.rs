//! Frame decoder
//!
//! Receiver side of the wire format. Each line is tried as a structured
//! frame first and as a plain comma-separated frame second.

use crate::error::CodecError;
use crate::protocol::{AudioData, FrameFormat, PLAIN_SEPARATOR};

/// One decoded line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub format: FrameFormat,
    pub samples: Vec<i16>,
}

/// Line decoder with statistics
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Reject frames whose length differs, when set
    expected_len: Option<usize>,
    frames_decoded: u64,
    lines_rejected: u64,
    samples_produced: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept frames of exactly `len` samples
    pub fn with_expected_len(len: usize) -> Self {
        Self {
            expected_len: Some(len),
            ..Self::default()
        }
    }

    /// Decode one line, with or without its trailing newline
    pub fn decode_line(&mut self, line: &str) -> Result<DecodedFrame, CodecError> {
        let result = Self::parse(line.trim()).and_then(|frame| match self.expected_len {
            Some(len) if frame.samples.len() != len => {
                Err(CodecError::InvalidFrameSize(frame.samples.len()))
            }
            _ => Ok(frame),
        });

        match &result {
            Ok(frame) => {
                self.frames_decoded += 1;
                self.samples_produced += frame.samples.len() as u64;
            }
            Err(_) => self.lines_rejected += 1,
        }

        result
    }

    fn parse(line: &str) -> Result<DecodedFrame, CodecError> {
        if line.is_empty() {
            return Err(CodecError::DecodingFailed("empty line".to_string()));
        }

        if line.starts_with('{') {
            let data: AudioData = serde_json::from_str(line)
                .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;
            return Ok(DecodedFrame {
                format: FrameFormat::Structured,
                samples: data.audio_data,
            });
        }

        let samples = line
            .split(PLAIN_SEPARATOR)
            .map(|token| token.trim().parse::<i16>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        Ok(DecodedFrame {
            format: FrameFormat::Plain,
            samples,
        })
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn lines_rejected(&self) -> u64 {
        self.lines_rejected
    }

    pub fn samples_produced(&self) -> u64 {
        self.samples_produced
    }
}

/// Level summary of one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSummary {
    pub min: i16,
    pub max: i16,
    /// Largest absolute value
    pub peak: u16,
    pub rms: f32,
}

impl FrameSummary {
    /// Summarize `samples`; `None` for an empty frame
    pub fn of(samples: &[i16]) -> Option<Self> {
        let min = *samples.iter().min()?;
        let max = *samples.iter().max()?;
        let peak = samples.iter().map(|s| s.unsigned_abs()).max()?;
        let energy: f64 = samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
        let rms = (energy / samples.len() as f64).sqrt() as f32;

        Some(Self { min, max, peak, rms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameEncoder;
    use crate::constants::FRAME_SAMPLES;

    #[test]
    fn test_structured_round_trip() {
        let samples: Vec<i16> = (0..FRAME_SAMPLES).map(|i| (i as i16).wrapping_mul(97)).collect();
        let mut encoder = FrameEncoder::new(FrameFormat::Structured);
        let message = encoder.encode(&samples).unwrap();

        let text = std::str::from_utf8(&message).unwrap();
        let mut lines = text.split('\n');
        let line = lines.next().unwrap();
        assert_eq!(lines.next(), Some(""));

        let mut decoder = FrameDecoder::with_expected_len(FRAME_SAMPLES);
        let frame = decoder.decode_line(line).unwrap();
        assert_eq!(frame.format, FrameFormat::Structured);
        assert_eq!(frame.samples, samples);
    }

    #[test]
    fn test_plain_fallback() {
        let mut decoder = FrameDecoder::new();
        let frame = decoder.decode_line("3, -4,5\r\n").unwrap();
        assert_eq!(frame.format, FrameFormat::Plain);
        assert_eq!(frame.samples, vec![3, -4, 5]);
        assert_eq!(decoder.samples_produced(), 3);
    }

    #[test]
    fn test_rejections_are_counted() {
        let mut decoder = FrameDecoder::with_expected_len(2);
        assert!(decoder.decode_line("").is_err());
        assert!(decoder.decode_line("{\"audio_data\":[1,2").is_err());
        assert!(decoder.decode_line("1,2,40000").is_err());
        assert!(matches!(
            decoder.decode_line("1,2,3"),
            Err(CodecError::InvalidFrameSize(3))
        ));
        assert!(decoder.decode_line("{\"audio_data\":[1,2]}").is_ok());

        assert_eq!(decoder.lines_rejected(), 4);
        assert_eq!(decoder.frames_decoded(), 1);
    }

    #[test]
    fn test_summary() {
        let summary = FrameSummary::of(&[-300, 100, 200, 0]).unwrap();
        assert_eq!(summary.min, -300);
        assert_eq!(summary.max, 200);
        assert_eq!(summary.peak, 300);
        assert!((summary.rms - 187.08).abs() < 0.01);

        assert!(FrameSummary::of(&[]).is_none());
    }
}

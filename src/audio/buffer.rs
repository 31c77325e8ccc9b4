//! Fixed-capacity capture buffer
//!
//! Accumulates samples for one frame. The buffer has a single writer and is
//! only read once full, so no synchronization is involved: the driver writes,
//! observes `is_full`, encodes the frame, then resets.

use crate::constants::FRAME_SAMPLES;
use crate::error::AudioError;

/// One microphone reading
pub type Sample = i16;

/// Ring of exactly `capacity` samples with a write cursor
pub struct CaptureBuffer {
    samples: Box<[Sample]>,
    /// Next free slot, always in `[0, capacity)`
    cursor: usize,
    /// Set when the cursor wrapped; cleared by `reset`
    full: bool,
}

impl CaptureBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be non-zero");

        Self {
            samples: vec![0; capacity].into_boxed_slice(),
            cursor: 0,
            full: false,
        }
    }

    /// Append a sample at the cursor.
    ///
    /// Returns `Ok(true)` when this write completed the frame. Writing into a
    /// full buffer is rejected until `reset` is called.
    pub fn write(&mut self, sample: Sample) -> Result<bool, AudioError> {
        if self.full {
            return Err(AudioError::BufferOverflow);
        }

        self.samples[self.cursor] = sample;
        self.cursor += 1;

        if self.cursor == self.samples.len() {
            self.cursor = 0;
            self.full = true;
        }

        Ok(self.full)
    }

    /// Whether `capacity` samples were written since the last reset
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Start a new cycle. Old contents are left in place and overwritten by
    /// the next cycle before they can be read again.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.full = false;
    }

    /// The completed frame in capture order, or `None` while filling
    pub fn frame(&self) -> Option<&[Sample]> {
        self.full.then_some(&self.samples[..])
    }

    /// Samples written in the current cycle
    pub fn len(&self) -> usize {
        if self.full {
            self.samples.len()
        } else {
            self.cursor
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Writes left before the frame completes
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len()
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new(FRAME_SAMPLES)
    }
}

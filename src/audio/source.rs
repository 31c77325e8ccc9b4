//! Sample sources
//!
//! A capture thread (microphone or tone) plays the role of the peripheral's
//! DMA: it pushes samples into a bounded queue through a [`SampleSink`]. The
//! driver pulls them back out one at a time through [`SampleSource`].

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::buffer::Sample;
use crate::error::AudioError;

/// Pull side of the microphone peripheral
pub trait SampleSource {
    /// Read exactly one sample, waiting at most `timeout` for one to arrive.
    ///
    /// `AudioError::Timeout` means nothing was pending; retry later.
    /// `AudioError::DeviceError` reports a peripheral failure; the source
    /// stays usable.
    fn try_read_one(&mut self, timeout: Duration) -> Result<Sample, AudioError>;
}

/// Create a peripheral queue holding at most `capacity` pending samples
pub fn sample_queue(capacity: usize) -> (SampleSink, QueueSource) {
    let (sample_tx, sample_rx) = bounded(capacity);
    // Errors are rare; a short queue is enough and extras are dropped
    let (error_tx, error_rx) = bounded(16);
    let overflow_count = Arc::new(AtomicU64::new(0));

    let sink = SampleSink {
        samples: sample_tx,
        errors: error_tx,
        overflow_count: overflow_count.clone(),
    };
    let source = QueueSource {
        samples: sample_rx,
        errors: error_rx,
        overflow_count,
    };
    (sink, source)
}

/// Push side of the peripheral queue, owned by a capture thread
#[derive(Clone)]
pub struct SampleSink {
    samples: Sender<Sample>,
    errors: Sender<AudioError>,
    overflow_count: Arc<AtomicU64>,
}

impl SampleSink {
    /// Queue one sample. Returns false if it was dropped because the queue
    /// was full or the reader is gone.
    pub fn push(&self, sample: Sample) -> bool {
        match self.samples.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Queue a burst of samples; returns how many were accepted
    pub fn push_slice(&self, samples: &[Sample]) -> usize {
        samples.iter().filter(|s| self.push(**s)).count()
    }

    /// Report a peripheral error to the reader
    /// Queue bound in samples
    pub fn capacity(&self) -> usize {
        self.samples.capacity().unwrap_or(usize::MAX)
    }

    pub fn report_error(&self, error: AudioError) {
        let _ = self.errors.try_send(error);
    }
}

/// Pull side of the peripheral queue
pub struct QueueSource {
    samples: Receiver<Sample>,
    errors: Receiver<AudioError>,
    overflow_count: Arc<AtomicU64>,
}

impl QueueSource {
    /// Samples currently pending
    pub fn pending(&self) -> usize {
        self.samples.len()
    }

    /// Samples dropped because the queue was full
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }
}

impl SampleSource for QueueSource {
    fn try_read_one(&mut self, timeout: Duration) -> Result<Sample, AudioError> {
        if let Ok(error) = self.errors.try_recv() {
            return Err(error);
        }

        if timeout.is_zero() {
            self.samples.try_recv().map_err(|e| match e {
                TryRecvError::Empty => AudioError::Timeout,
                TryRecvError::Disconnected => {
                    AudioError::DeviceError("capture stopped".to_string())
                }
            })
        } else {
            self.samples.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => AudioError::Timeout,
                RecvTimeoutError::Disconnected => {
                    AudioError::DeviceError("capture stopped".to_string())
                }
            })
        }
    }
}

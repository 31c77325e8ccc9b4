//! Synthetic tone peripheral
//!
//! Generates a phase-continuous sine wave at the configured sample rate and
//! feeds it into the peripheral queue in 10 ms bursts. Useful on hosts
//! without a microphone and for exercising a receiver end to end.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::buffer::Sample;
use crate::audio::source::SampleSink;
use crate::error::AudioError;

/// Interval between generated bursts
const BURST_INTERVAL: Duration = Duration::from_millis(10);

/// Sine oscillator producing i16 samples
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    phase: f32,
    step: f32,
    amplitude: f32,
}

impl ToneGenerator {
    pub fn new(frequency_hz: f32, sample_rate: u32, amplitude: i16) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency_hz / sample_rate as f32,
            amplitude: amplitude.unsigned_abs() as f32,
        }
    }

    pub fn next_sample(&mut self) -> Sample {
        let value = self.amplitude * self.phase.sin();
        self.phase = (self.phase + self.step) % TAU;
        value.round().clamp(i16::MIN as f32, i16::MAX as f32) as Sample
    }

    /// Fill `out` with consecutive samples
    pub fn fill(&mut self, out: &mut [Sample]) {
        for sample in out.iter_mut() {
            *sample = self.next_sample();
        }
    }
}

/// Samples to generate for a burst: never more than the queue can hold, so a
/// stalled thread skips ahead instead of allocating the whole backlog
fn burst_len(behind: u64, capacity: usize) -> usize {
    usize::try_from(behind).unwrap_or(usize::MAX).min(capacity)
}

/// Background thread pacing a [`ToneGenerator`] in real time
pub struct ToneCapture {
    running: Arc<AtomicBool>,
    samples_generated: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ToneCapture {
    /// Start generating into `sink`
    pub fn start(
        generator: ToneGenerator,
        sample_rate: u32,
        sink: SampleSink,
    ) -> Result<Self, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let samples_generated = Arc::new(AtomicU64::new(0));

        let running_for_loop = running.clone();
        let generated = samples_generated.clone();
        let mut generator = generator;

        let handle = thread::Builder::new()
            .name("capture-tone".to_string())
            .spawn(move || {
                let start = Instant::now();
                let capacity = sink.capacity();
                let mut scheduled: u64 = 0;
                let mut burst = Vec::new();

                while running_for_loop.load(Ordering::Relaxed) {
                    // Catch up to wall clock so the long-run rate stays exact
                    let due = (start.elapsed().as_secs_f64() * sample_rate as f64) as u64;
                    let behind = due.saturating_sub(scheduled);
                    let len = burst_len(behind, capacity);

                    if (len as u64) < behind {
                        tracing::debug!(
                            "Tone thread stalled; skipping {} samples",
                            behind - len as u64
                        );
                    }
                    if len > 0 {
                        burst.resize(len, 0);
                        generator.fill(&mut burst);
                        sink.push_slice(&burst);
                        generated.fetch_add(len as u64, Ordering::Relaxed);
                    }
                    scheduled = due;

                    thread::sleep(BURST_INTERVAL);
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        tracing::info!("Tone capture started at {} Hz", sample_rate);

        Ok(Self {
            running,
            samples_generated,
            thread_handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn samples_generated(&self) -> u64 {
        self.samples_generated.load(Ordering::Relaxed)
    }
}

impl Drop for ToneCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

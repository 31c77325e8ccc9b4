//! Microphone capture
//!
//! Runs the cpal input stream on a dedicated thread. The stream callback
//! reduces each callback buffer to mono i16 at the nominal rate and pushes
//! it into the peripheral queue.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::Sample;
use crate::audio::device::{find_input_device, select_input_config};
use crate::audio::source::SampleSink;
use crate::error::AudioError;

/// Reduces interleaved device frames to mono samples at the target rate
#[derive(Debug, Clone)]
pub struct Downmixer {
    channels: usize,
    /// Keep one device frame out of every `decimation`
    decimation: usize,
    /// Device frames seen modulo `decimation`
    phase: usize,
}

impl Downmixer {
    pub fn new(channels: u16, device_rate: u32, target_rate: u32) -> Self {
        let ratio = (device_rate as f64 / target_rate as f64).round() as usize;

        Self {
            channels: channels.max(1) as usize,
            decimation: ratio.max(1),
            phase: 0,
        }
    }

    pub fn decimation(&self) -> usize {
        self.decimation
    }

    /// Append the first channel of every kept frame in `data` to `out`
    pub fn process<T>(&mut self, data: &[T], out: &mut Vec<Sample>)
    where
        T: Copy,
        Sample: FromSample<T>,
    {
        for frame in data.chunks(self.channels) {
            if self.phase == 0 {
                out.push(Sample::from_sample_(frame[0]));
            }
            self.phase = (self.phase + 1) % self.decimation;
        }
    }
}

/// Microphone capture bound to one input device
pub struct MicCapture {
    device_name: String,
    running: Arc<AtomicBool>,
    samples_captured: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<()>>,
}

impl MicCapture {
    /// Open `device` (or the default input) and start streaming into `sink`
    pub fn start(
        device: Option<&str>,
        sample_rate: u32,
        sink: SampleSink,
    ) -> Result<Self, AudioError> {
        let cpal_device = find_input_device(device)?;
        let device_name = cpal_device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = select_input_config(&cpal_device, sample_rate)?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let downmixer = Downmixer::new(config.channels, config.sample_rate.0, sample_rate);

        if config.sample_rate.0 != sample_rate {
            tracing::warn!(
                "{} does not support {} Hz; capturing at {} Hz and keeping 1 of every {} frames",
                device_name,
                sample_rate,
                config.sample_rate.0,
                downmixer.decimation()
            );
        }

        let running = Arc::new(AtomicBool::new(true));
        let samples_captured = Arc::new(AtomicU64::new(0));
        let running_for_loop = running.clone();
        let captured = samples_captured.clone();

        // Stream construction happens on the capture thread; report the
        // outcome back so start() fails when the device cannot be opened
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let handle = thread::Builder::new()
            .name("capture-mic".to_string())
            .spawn(move || {
                let stream = match sample_format {
                    SampleFormat::I16 => build_stream::<i16>(&cpal_device, &config, downmixer, sink, captured),
                    SampleFormat::U16 => build_stream::<u16>(&cpal_device, &config, downmixer, sink, captured),
                    SampleFormat::F32 => build_stream::<f32>(&cpal_device, &config, downmixer, sink, captured),
                    other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
                };

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep thread alive while running
                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }

                // Stream is dropped here, stopping capture
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::StreamError("capture thread exited".to_string())));

        let mut capture = Self {
            device_name,
            running,
            samples_captured,
            thread_handle: Some(handle),
        };

        if let Err(e) = ready {
            capture.stop();
            return Err(e);
        }

        tracing::info!("Microphone capture started on {}", capture.device_name);
        Ok(capture)
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

    /// Mono samples handed to the peripheral queue so far
    pub fn samples_captured(&self) -> u64 {
        self.samples_captured.load(Ordering::Relaxed)
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut downmixer: Downmixer,
    sink: SampleSink,
    captured: Arc<AtomicU64>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    Sample: FromSample<T>,
{
    let error_sink = sink.clone();
    let mut mono = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                downmixer.process(data, &mut mono);
                let accepted = sink.push_slice(&mono);
                captured.fetch_add(accepted as u64, Ordering::Relaxed);
            },
            move |err| {
                error_sink.report_error(AudioError::DeviceError(err.to_string()));
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))
}

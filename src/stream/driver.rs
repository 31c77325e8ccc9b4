//! Stream driver
//!
//! The single polling loop of the streamer. Each tick:
//!
//! 1. poll the listener, possibly replacing the held client
//! 2. capture samples from the source (one, or all pending, per policy)
//! 3. when the buffer fills, encode and send it if a client is usable, then
//!    reset the buffer whatever the send outcome
//!
//! The driver owns the buffer, the connection slot and the encoder; nothing
//! else touches them, so no locking is involved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::audio::buffer::CaptureBuffer;
use crate::audio::source::SampleSource;
use crate::codec::FrameEncoder;
use crate::config::{AppConfig, CapturePolicy};
use crate::constants::STATS_LOG_INTERVAL;
use crate::error::{AudioError, NetworkError};
use crate::network::slot::{ConnectionSlot, Listener, SlotEvent};
use crate::protocol::FrameFormat;

/// Whether a client is being streamed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Streaming,
}

/// Fate of one completed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Sent { bytes: usize },
    /// No usable client when the buffer filled
    DroppedNoClient,
    /// The send failed; the frame is not retried
    DroppedWriteError,
    DroppedEncodeError,
}

/// Driver tuning
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub format: FrameFormat,
    pub policy: CapturePolicy,
    /// Bounded wait for the first read of a tick
    pub read_timeout: Duration,
}

impl DriverConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            format: config.stream.format,
            policy: config.capture.policy,
            read_timeout: config.capture.read_timeout(),
        }
    }
}

/// Counters accumulated over the driver's life
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub ticks: u64,
    pub samples_captured: u64,
    pub read_timeouts: u64,
    pub device_errors: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub frames_dropped_no_client: u64,
    pub frames_dropped_write: u64,
    pub frames_dropped_encode: u64,
    pub clients_accepted: u64,
    pub clients_replaced: u64,
    pub clients_lost: u64,
}

impl DriverStats {
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped_no_client + self.frames_dropped_write + self.frames_dropped_encode
    }
}

pub struct StreamDriver<S: SampleSource, L: Listener> {
    source: S,
    buffer: CaptureBuffer,
    slot: ConnectionSlot<L>,
    encoder: FrameEncoder,
    policy: CapturePolicy,
    read_timeout: Duration,
    state: DriverState,
    stats: DriverStats,
}

impl<S: SampleSource, L: Listener> StreamDriver<S, L> {
    pub fn new(source: S, listener: L, config: DriverConfig) -> Self {
        Self {
            source,
            buffer: CaptureBuffer::default(),
            slot: ConnectionSlot::new(listener),
            encoder: FrameEncoder::new(config.format),
            policy: config.policy,
            read_timeout: config.read_timeout,
            state: DriverState::Idle,
            stats: DriverStats::default(),
        }
    }

    /// Run one loop iteration. Returns the outcome of the frame completed
    /// during this tick, if any.
    pub fn tick(&mut self) -> Option<FrameOutcome> {
        self.stats.ticks += 1;
        self.poll_link();
        self.capture()
    }

    /// Tick every `interval` until `running` is cleared
    pub fn run(&mut self, running: &AtomicBool, interval: Duration) {
        tracing::info!(
            "Stream driver running: {} frames, {:?} capture, {:?} tick",
            self.encoder.format(),
            self.policy,
            interval
        );

        while running.load(Ordering::Relaxed) {
            self.tick();
            thread::sleep(interval);
        }

        if let Some(peer) = self.slot.release() {
            tracing::info!("Closing connection to {}", peer);
        }
        self.state = DriverState::Idle;
    }

    fn poll_link(&mut self) {
        match self.slot.poll_incoming() {
            Ok(SlotEvent::Unchanged) => {}
            Ok(SlotEvent::Accepted { peer }) => {
                self.stats.clients_accepted += 1;
                tracing::info!("Client connected: {}", peer);
            }
            Ok(SlotEvent::Replaced { old_peer, peer }) => {
                self.stats.clients_accepted += 1;
                self.stats.clients_replaced += 1;
                tracing::info!("Client {} replaced by {}", old_peer, peer);
            }
            Err(e) => tracing::warn!("Failed to accept client: {}", e),
        }

        self.refresh_state();
    }

    fn refresh_state(&mut self) {
        let usable = self.slot.is_usable();

        if !usable && !self.slot.is_empty() {
            if let Some(peer) = self.slot.release() {
                self.stats.clients_lost += 1;
                tracing::info!("{}: {}", NetworkError::LinkLost, peer);
            }
        }

        match (self.state, usable) {
            (DriverState::Idle, true) => {
                self.state = DriverState::Streaming;
                tracing::debug!("Idle -> Streaming");
            }
            (DriverState::Streaming, false) => {
                self.state = DriverState::Idle;
                tracing::debug!("Streaming -> Idle");
            }
            _ => {}
        }
    }

    fn capture(&mut self) -> Option<FrameOutcome> {
        let budget = match self.policy {
            CapturePolicy::Single => 1,
            CapturePolicy::Drain => self.buffer.remaining(),
        };

        for attempt in 0..budget {
            // Only the first read of a tick waits
            let timeout = if attempt == 0 { self.read_timeout } else { Duration::ZERO };

            match self.source.try_read_one(timeout) {
                Ok(sample) => {
                    self.stats.samples_captured += 1;
                    match self.buffer.write(sample) {
                        Ok(true) => return Some(self.flush_frame()),
                        Ok(false) => {}
                        Err(e) => {
                            tracing::error!("Capture buffer rejected sample: {}", e);
                            self.buffer.reset();
                        }
                    }
                }
                Err(AudioError::Timeout) => {
                    if attempt == 0 {
                        self.stats.read_timeouts += 1;
                        tracing::trace!("No sample within {:?}", timeout);
                    }
                    break;
                }
                Err(e) => {
                    self.stats.device_errors += 1;
                    tracing::warn!("Sample read failed: {}", e);
                    break;
                }
            }
        }

        None
    }

    /// Hand the full buffer to the client, then start a new cycle
    fn flush_frame(&mut self) -> FrameOutcome {
        let outcome = match self.buffer.frame() {
            Some(samples) if self.state == DriverState::Streaming && self.slot.is_usable() => {
                match self.encoder.encode(samples) {
                    Ok(message) => match self.slot.send(&message) {
                        Ok(()) => FrameOutcome::Sent {
                            bytes: message.len(),
                        },
                        Err(e) => {
                            tracing::warn!("Dropping frame: {}", e);
                            FrameOutcome::DroppedWriteError
                        }
                    },
                    Err(e) => {
                        tracing::error!("Dropping frame: {}", e);
                        FrameOutcome::DroppedEncodeError
                    }
                }
            }
            _ => {
                tracing::trace!("Frame complete with no client");
                FrameOutcome::DroppedNoClient
            }
        };

        self.buffer.reset();
        self.record(outcome);
        outcome
    }

    fn record(&mut self, outcome: FrameOutcome) {
        match outcome {
            FrameOutcome::Sent { bytes } => {
                self.stats.frames_sent += 1;
                self.stats.bytes_sent += bytes as u64;

                if self.stats.frames_sent % STATS_LOG_INTERVAL == 0 {
                    tracing::info!(
                        "Stats: {} frames sent, {:.1} KB sent, {} dropped, {} read timeouts",
                        self.stats.frames_sent,
                        self.stats.bytes_sent as f64 / 1024.0,
                        self.stats.frames_dropped(),
                        self.stats.read_timeouts
                    );
                }
            }
            FrameOutcome::DroppedNoClient => self.stats.frames_dropped_no_client += 1,
            FrameOutcome::DroppedWriteError => self.stats.frames_dropped_write += 1,
            FrameOutcome::DroppedEncodeError => self.stats.frames_dropped_encode += 1,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Samples in the current, incomplete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn slot(&self) -> &ConnectionSlot<L> {
        &self.slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::Sample;
    use crate::constants::FRAME_SAMPLES;
    use crate::network::slot::testing::{MockListener, MockPeer};
    use std::collections::VecDeque;

    /// Scripted peripheral; an empty script reads as a timeout
    #[derive(Default)]
    struct ScriptedSource {
        script: VecDeque<Result<Sample, AudioError>>,
        timeouts_seen: Vec<Duration>,
    }

    impl ScriptedSource {
        fn ramp(&mut self, range: std::ops::Range<i32>) {
            self.script.extend(range.map(|v| Ok(v as Sample)));
        }
    }

    impl SampleSource for ScriptedSource {
        fn try_read_one(&mut self, timeout: Duration) -> Result<Sample, AudioError> {
            self.timeouts_seen.push(timeout);
            self.script.pop_front().unwrap_or(Err(AudioError::Timeout))
        }
    }

    fn driver(
        policy: CapturePolicy,
    ) -> (StreamDriver<ScriptedSource, MockListener>, MockListener) {
        let listener = MockListener::default();
        let config = DriverConfig {
            format: FrameFormat::Structured,
            policy,
            read_timeout: Duration::from_millis(100),
        };
        let driver = StreamDriver::new(ScriptedSource::default(), listener.clone(), config);
        (driver, listener)
    }

    fn expected_ramp_message() -> Vec<u8> {
        let values: Vec<String> = (0..FRAME_SAMPLES).map(|i| i.to_string()).collect();
        format!("{{\"audio_data\":[{}]}}\n", values.join(",")).into_bytes()
    }

    fn connect(
        driver: &mut StreamDriver<ScriptedSource, MockListener>,
        listener: &MockListener,
        name: &str,
    ) -> MockPeer {
        let peer = listener.connect(name);
        driver.tick();
        peer
    }

    #[test]
    fn test_ramp_frame_sent_to_client() {
        let (mut driver, listener) = driver(CapturePolicy::Drain);
        let peer = connect(&mut driver, &listener, "client");
        assert_eq!(driver.state(), DriverState::Streaming);

        driver.source.ramp(0..FRAME_SAMPLES as i32);
        let outcome = driver.tick();

        assert!(matches!(outcome, Some(FrameOutcome::Sent { .. })));
        assert_eq!(peer.messages(), vec![expected_ramp_message()]);
        assert_eq!(driver.buffered(), 0);
        assert_eq!(driver.stats().frames_sent, 1);
    }

    #[test]
    fn test_idle_frame_resets_silently() {
        let (mut driver, _listener) = driver(CapturePolicy::Drain);
        driver.source.ramp(0..FRAME_SAMPLES as i32 + 3);

        assert_eq!(driver.tick(), Some(FrameOutcome::DroppedNoClient));
        assert_eq!(driver.state(), DriverState::Idle);
        assert_eq!(driver.buffered(), 0);

        // Remaining samples start the next cycle
        assert_eq!(driver.tick(), None);
        assert_eq!(driver.buffered(), 3);
        assert_eq!(driver.stats().frames_dropped_no_client, 1);
        assert_eq!(driver.stats().frames_sent, 0);
    }

    #[test]
    fn test_drain_stops_at_frame_boundary() {
        let (mut driver, _listener) = driver(CapturePolicy::Drain);
        driver.source.ramp(0..10);

        assert_eq!(driver.tick(), None);
        assert_eq!(driver.buffered(), 10);

        let waits = &driver.source.timeouts_seen;
        assert_eq!(waits[0], Duration::from_millis(100));
        assert!(waits[1..].iter().all(|t| t.is_zero()));
        // The zero-wait miss that ended the drain is not a timeout
        assert_eq!(driver.stats().read_timeouts, 0);
    }

    #[test]
    fn test_single_policy_reads_once_per_tick() {
        let (mut driver, listener) = driver(CapturePolicy::Single);
        let peer = connect(&mut driver, &listener, "client");
        driver.source.ramp(0..FRAME_SAMPLES as i32);
        // The connect tick consumed nothing: the script was empty
        assert_eq!(driver.buffered(), 0);

        for _ in 0..FRAME_SAMPLES - 1 {
            assert_eq!(driver.tick(), None);
        }
        assert_eq!(driver.buffered(), FRAME_SAMPLES - 1);
        assert!(peer.messages().is_empty());

        assert!(matches!(driver.tick(), Some(FrameOutcome::Sent { .. })));
        assert_eq!(peer.messages(), vec![expected_ramp_message()]);
    }

    #[test]
    fn test_replaced_client_gets_no_more_frames() {
        let (mut driver, listener) = driver(CapturePolicy::Drain);
        let old = connect(&mut driver, &listener, "old");

        driver.source.ramp(0..FRAME_SAMPLES as i32);
        driver.tick();
        assert_eq!(old.messages().len(), 1);

        let new = listener.connect("new");
        driver.source.ramp(0..FRAME_SAMPLES as i32);
        driver.tick();

        assert_eq!(old.messages().len(), 1);
        assert_eq!(new.messages(), vec![expected_ramp_message()]);
        assert_eq!(driver.state(), DriverState::Streaming);
        assert_eq!(driver.stats().clients_replaced, 1);
        assert_eq!(driver.slot().peer().as_deref(), Some("new"));
    }

    #[test]
    fn test_write_error_drops_frame_without_retry() {
        let (mut driver, listener) = driver(CapturePolicy::Drain);
        let peer = connect(&mut driver, &listener, "client");

        peer.set_failing(true);
        driver.source.ramp(0..FRAME_SAMPLES as i32);
        assert_eq!(driver.tick(), Some(FrameOutcome::DroppedWriteError));
        assert_eq!(driver.buffered(), 0);

        // Link still reports connected: stay Streaming, deliver the next frame only
        peer.set_failing(false);
        driver.source.ramp(0..FRAME_SAMPLES as i32);
        assert!(matches!(driver.tick(), Some(FrameOutcome::Sent { .. })));
        assert_eq!(driver.state(), DriverState::Streaming);
        assert_eq!(peer.messages().len(), 1);
        assert_eq!(driver.stats().frames_dropped_write, 1);
    }

    #[test]
    fn test_write_error_then_disconnect_goes_idle() {
        let (mut driver, listener) = driver(CapturePolicy::Drain);
        let peer = connect(&mut driver, &listener, "client");

        peer.set_failing(true);
        driver.source.ramp(0..FRAME_SAMPLES as i32);
        assert_eq!(driver.tick(), Some(FrameOutcome::DroppedWriteError));

        peer.disconnect();
        driver.tick();

        assert_eq!(driver.state(), DriverState::Idle);
        assert!(driver.slot().is_empty());
        assert_eq!(driver.stats().clients_lost, 1);
    }

    #[test]
    fn test_reconnect_after_loss() {
        let (mut driver, listener) = driver(CapturePolicy::Drain);
        let first = connect(&mut driver, &listener, "first");
        first.disconnect();
        driver.tick();
        assert_eq!(driver.state(), DriverState::Idle);

        let second = connect(&mut driver, &listener, "second");
        assert_eq!(driver.state(), DriverState::Streaming);
        driver.source.ramp(0..FRAME_SAMPLES as i32);
        driver.tick();
        assert_eq!(second.messages().len(), 1);
        assert!(first.messages().is_empty());
    }

    #[test]
    fn test_device_error_is_not_fatal() {
        let (mut driver, _listener) = driver(CapturePolicy::Drain);
        driver.source.script.push_back(Ok(1));
        driver
            .source
            .script
            .push_back(Err(AudioError::DeviceError("i2s read failed".into())));
        driver.source.script.push_back(Ok(2));

        driver.tick();
        assert_eq!(driver.buffered(), 1);
        assert_eq!(driver.stats().device_errors, 1);

        driver.tick();
        assert_eq!(driver.buffered(), 2);
    }

    #[test]
    fn test_timeout_counted_once_per_tick() {
        let (mut driver, _listener) = driver(CapturePolicy::Drain);
        driver.tick();
        driver.tick();
        assert_eq!(driver.stats().read_timeouts, 2);
        assert_eq!(driver.stats().ticks, 2);
    }

    #[test]
    fn test_run_stops_when_flag_cleared() {
        let (mut driver, _listener) = driver(CapturePolicy::Drain);
        let running = AtomicBool::new(false);
        driver.run(&running, Duration::from_millis(1));
        assert_eq!(driver.stats().ticks, 0);
        assert_eq!(driver.state(), DriverState::Idle);
    }
}

//! # Mic Relay
//!
//! Streams raw 16-bit mono microphone samples to one TCP client as
//! newline-delimited frames.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               DEVICE                                 │
//! │  ┌──────────────┐     ┌──────────────────────────┐                   │
//! │  │  Microphone  │ ──▶ │ Peripheral queue (bounded│                   │
//! │  │ capture thd  │     │ crossbeam channel)       │                   │
//! │  └──────────────┘     └────────────┬─────────────┘                   │
//! │                                    │ try_read_one(timeout)           │
//! │  ┌─────────────────────────────────▼──────────────────────────────┐  │
//! │  │                 StreamDriver (single polling loop)             │  │
//! │  │                                                                │  │
//! │  │  tick:  poll listener ─▶ capture ─▶ CaptureBuffer[1024]        │  │
//! │  │                                         │ full                 │  │
//! │  │                                         ▼                      │  │
//! │  │               FrameEncoder ─▶ ConnectionSlot (0..1 link) ─▶ TCP │  │
//! │  │                                         │                      │  │
//! │  │                                         ▼                      │  │
//! │  │                                  reset buffer                  │  │
//! │  └────────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────┬───────────────────────────────┘
//!                                        │ {"audio_data":[...]}\n
//!                                        ▼
//!                               ┌──────────────────┐
//!                               │     Receiver     │
//!                               └──────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod stream;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Samples per wire frame
    pub const FRAME_SAMPLES: usize = 1024;

    /// Nominal microphone sample rate
    pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

    /// Capture is mono
    pub const CHANNELS: u16 = 1;

    /// Default TCP port the streamer listens on
    pub const DEFAULT_PORT: u16 = 8080;

    /// Bounded wait for one sample from the peripheral
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

    /// Delay between driver ticks
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 10;

    /// Peripheral queue depth in samples (8 DMA buffers of 1024)
    pub const DEFAULT_QUEUE_CAPACITY: usize = 8 * 1024;

    /// Frames between periodic stats log lines
    pub const STATS_LOG_INTERVAL: u64 = 100;
}

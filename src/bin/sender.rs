//! Microphone Sender Application
//!
//! Captures mono 16-bit audio and streams 1024-sample frames to one TCP
//! client.
//!
//! Usage: `sender [--config PATH] [--tone] [--plain] [--list-devices]`

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mic_relay::{
    audio::{sample_queue, SampleSink, ToneCapture, ToneGenerator},
    config::{AppConfig, CaptureConfig, SourceKind},
    constants::FRAME_SAMPLES,
    network::TcpStreamListener,
    protocol::FrameFormat,
    stream::{DriverConfig, StreamDriver},
};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    tone: bool,
    plain: bool,
    list_devices: bool,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = Args::default();
        let mut iter = std::env::args().skip(1);

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => {
                    let path = iter.next().context("--config needs a path")?;
                    args.config = Some(PathBuf::from(path));
                }
                "--tone" => args.tone = true,
                "--plain" => args.plain = true,
                "--list-devices" => args.list_devices = true,
                other => bail!("Unknown argument: {}", other),
            }
        }

        Ok(args)
    }
}

/// Running capture thread, kept alive for the driver's lifetime
enum Capture {
    #[cfg(feature = "microphone")]
    Mic(mic_relay::audio::MicCapture),
    Tone(ToneCapture),
}

impl Capture {
    fn start(config: &CaptureConfig, sink: SampleSink) -> Result<Self> {
        match config.source {
            SourceKind::Tone => {
                let generator = ToneGenerator::new(
                    config.tone_frequency_hz,
                    config.sample_rate,
                    config.tone_amplitude,
                );
                Ok(Capture::Tone(ToneCapture::start(generator, config.sample_rate, sink)?))
            }
            #[cfg(feature = "microphone")]
            SourceKind::Microphone => Ok(Capture::Mic(mic_relay::audio::MicCapture::start(
                config.device.as_deref(),
                config.sample_rate,
                sink,
            )?)),
            #[cfg(not(feature = "microphone"))]
            SourceKind::Microphone => {
                bail!("Built without microphone support; set capture.source = \"tone\"")
            }
        }
    }

    fn samples_produced(&self) -> u64 {
        match self {
            #[cfg(feature = "microphone")]
            Capture::Mic(mic) => mic.samples_captured(),
            Capture::Tone(tone) => tone.samples_generated(),
        }
    }
}

#[cfg(feature = "microphone")]
fn print_devices() {
    println!("\n=== Available Input Devices ===");
    for device in mic_relay::audio::list_input_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

#[cfg(not(feature = "microphone"))]
fn print_devices() {
    println!("Built without microphone support");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse()?;

    if args.list_devices {
        print_devices();
        return Ok(());
    }

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load config")?;
    if args.tone {
        config.capture.source = SourceKind::Tone;
    }
    if args.plain {
        config.stream.format = FrameFormat::Plain;
    }

    tracing::info!("Starting microphone relay");
    tracing::info!(
        "Capture: {:?} source, {} Hz mono, {} samples/frame, {:?} policy",
        config.capture.source,
        config.capture.sample_rate,
        FRAME_SAMPLES,
        config.capture.policy
    );

    let (sink, source) = sample_queue(config.capture.queue_capacity);
    let capture = Capture::start(&config.capture, sink)?;

    let listener = TcpStreamListener::bind(
        config.network.listen_addr()?,
        config.network.send_timeout(),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let driver_running = running.clone();
    let tick_interval = config.capture.tick_interval();
    let driver_config = DriverConfig::from_app(&config);

    // The driver is a blocking single-threaded loop
    let driver_task = tokio::task::spawn_blocking(move || {
        let mut driver = StreamDriver::new(source, listener, driver_config);
        driver.run(&driver_running, tick_interval);
        driver
    });

    tracing::info!("Streaming - press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    running.store(false, Ordering::Relaxed);
    let driver = driver_task.await.context("Driver task panicked")?;

    let stats = driver.stats();
    tracing::info!(
        "Final stats: {} samples captured of {} produced, {} queue overflows, {} frames sent ({:.1} KB), {} dropped",
        stats.samples_captured,
        capture.samples_produced(),
        driver.source().overflow_count(),
        stats.frames_sent,
        stats.bytes_sent as f64 / 1024.0,
        stats.frames_dropped()
    );
    tracing::info!(
        "Clients: {} accepted, {} replaced, {} lost; {} device errors",
        stats.clients_accepted,
        stats.clients_replaced,
        stats.clients_lost,
        stats.device_errors
    );

    drop(capture);
    Ok(())
}

//! Audio Receiver Application
//!
//! Connects to a sender, splits the stream on newlines and decodes each
//! frame, logging level summaries.
//!
//! Usage: `receiver [HOST:PORT]`

use anyhow::{Context, Result};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mic_relay::{
    codec::{FrameDecoder, FrameSummary},
    constants::{DEFAULT_PORT, DEFAULT_SAMPLE_RATE, FRAME_SAMPLES, STATS_LOG_INTERVAL},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_PORT));

    tracing::info!("Connecting to {}", target);
    let stream = TcpStream::connect(&target)
        .await
        .with_context(|| format!("Failed to connect to {}", target))?;
    tracing::info!("Connected");

    let mut lines = BufReader::new(stream).lines();
    let mut decoder = FrameDecoder::with_expected_len(FRAME_SAMPLES);
    let start = Instant::now();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from sender")? else {
                    tracing::info!("Sender closed the connection");
                    break;
                };

                match decoder.decode_line(&line) {
                    Ok(frame) => {
                        let Some(summary) = FrameSummary::of(&frame.samples) else {
                            continue;
                        };
                        tracing::debug!(
                            "{} frame: min {} max {} peak {} rms {:.1}",
                            frame.format,
                            summary.min,
                            summary.max,
                            summary.peak,
                            summary.rms
                        );
                        if decoder.frames_decoded() % STATS_LOG_INTERVAL == 0 {
                            tracing::info!(
                                "{} frames received, latest peak {} rms {:.1}",
                                decoder.frames_decoded(),
                                summary.peak,
                                summary.rms
                            );
                        }
                    }
                    Err(e) => tracing::warn!("Skipping line: {}", e),
                }
            }
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    let effective_rate = if elapsed > 0.0 {
        decoder.samples_produced() as f64 / elapsed
    } else {
        0.0
    };

    tracing::info!(
        "Received {} frames ({} rejected) in {:.1}s: {:.0} samples/s of nominal {}",
        decoder.frames_decoded(),
        decoder.lines_rejected(),
        elapsed,
        effective_rate,
        DEFAULT_SAMPLE_RATE
    );

    Ok(())
}

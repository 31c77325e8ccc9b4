//! Application configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no
//! file at all) yields a working streamer on port 8080.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::protocol::FrameFormat;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub capture: CaptureConfig,
    pub stream: StreamConfig,
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub port: u16,
    /// Write timeout for frame sends. Unset means sends block until the
    /// transport gives up.
    pub send_timeout_ms: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            send_timeout_ms: None,
        }
    }
}

impl NetworkConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address {}: {}", self.bind_address, e)))
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }
}

/// Where samples come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Microphone,
    /// Synthetic sine tone
    Tone,
}

/// How many samples one driver tick pulls from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePolicy {
    /// Drain every available sample, up to the end of the current frame
    #[default]
    Drain,
    /// Exactly one read per tick
    Single,
}

/// Capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: SourceKind,
    /// Input device name; default input device when unset
    pub device: Option<String>,
    pub sample_rate: u32,
    pub read_timeout_ms: u64,
    pub tick_interval_ms: u64,
    pub policy: CapturePolicy,
    pub queue_capacity: usize,
    pub tone_frequency_hz: f32,
    pub tone_amplitude: i16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            device: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            policy: CapturePolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            tone_frequency_hz: 440.0,
            tone_amplitude: 1000,
        }
    }
}

impl CaptureConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Output stream settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub format: FrameFormat,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the per-user config file is
    /// read if present, otherwise defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        tracing::debug!("Loading config from {}", path.display());
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// `<config dir>/mic-relay/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "mic-relay").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;
        if capture.sample_rate == 0 {
            return Err(Error::Config("capture.sample_rate must be non-zero".into()));
        }
        if capture.tick_interval_ms == 0 {
            return Err(Error::Config("capture.tick_interval_ms must be non-zero".into()));
        }
        if capture.queue_capacity == 0 {
            return Err(Error::Config("capture.queue_capacity must be non-zero".into()));
        }
        if !(capture.tone_frequency_hz > 0.0) {
            return Err(Error::Config("capture.tone_frequency_hz must be positive".into()));
        }
        self.network.listen_addr()?;
        Ok(())
    }
}

//! Error types for the microphone relay

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// No sample became available within the bounded wait
    #[error("Timed out waiting for a sample")]
    Timeout,

    /// The peripheral failed a read; later reads may still succeed
    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Buffer overflow")]
    BufferOverflow,
}

/// Frame codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Accept failed: {0}")]
    AcceptFailed(String),

    /// Sending a frame to the held link failed; the frame is lost
    #[error("Write failed: {0}")]
    WriteError(String),

    /// The held link stopped reporting itself connected
    #[error("Client link lost")]
    LinkLost,

    #[error("No client connected")]
    NoClient,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

//! Audio driver error types

use thiserror::Error;

/// Errors that can occur during audio operations
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio devices found")]
    NoDevices,

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Stream not found on a device
    #[error("Stream {stream} not found on device {device}")]
    StreamNotFound { device: String, stream: u32 },

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Stream is not open
    #[error("Audio stream is not open: {0}")]
    StreamClosed(String),

    /// Unsupported sample format
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Buffer was used before being allocated, or with a mismatched layout
    #[error("Audio buffer error: {0}")]
    BufferError(String),

    /// Read or write failure while streaming
    #[error("Audio I/O error: {0}")]
    Io(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

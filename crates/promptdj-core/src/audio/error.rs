//! Audio error types

use thiserror::Error;

/// Errors from the audio output
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio output devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Device not found
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Device cannot play the stream format
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Command queue to the audio thread is full
    #[error("Audio command queue full")]
    QueueFull,
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

/// A received frame could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Empty audio frame")]
    Empty,

    /// Byte count is not a whole number of sample frames
    #[error("Audio frame of {len} bytes is not a multiple of {frame_bytes}-byte sample frames")]
    Misaligned { len: usize, frame_bytes: usize },

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),
}

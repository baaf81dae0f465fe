//! Audio backend error types

use thiserror::Error;

/// Errors that can occur while opening the output device
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

    /// The device can't run at the pipeline's sample rate
    #[error("Device does not support {requested}Hz (supports up to {max}Hz)")]
    UnsupportedSampleRate { requested: u32, max: u32 },

    /// Failed to build audio stream
    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/play stream
    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Failed to pause stream
    #[error("Failed to pause audio stream: {0}")]
    StreamPauseError(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

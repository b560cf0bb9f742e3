//! Error types for the analysis engine.

use thiserror::Error;

/// Invalid analyzer configuration. Always raised before an analyzer exists.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("FFT size must be a power of two >= 2, got {0}")]
    InvalidFftSize(usize),

    #[error("sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f32),

    #[error("{band} range must satisfy 0 <= low < high and low < Nyquist, got ({low}, {high}) Hz")]
    InvalidBand {
        band: &'static str,
        low: f32,
        high: f32,
    },

    #[error("smoothing must be in (0, 1), got {0}")]
    InvalidSmoothing(f32),

    #[error("beat sensitivity must be > 1, got {0}")]
    InvalidSensitivity(f32),

    #[error("beat decay must be in (0, 1), got {0}")]
    InvalidDecay(f32),

    #[error("beat floor must be >= 0, got {0}")]
    InvalidFloor(f32),

    #[error("ring capacity must be a power of two >= FFT size {fft_size}, got {capacity}")]
    InvalidRingCapacity { capacity: usize, fft_size: usize },

    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("FFT size must be a power of two >= 2, got {0}")]
    InvalidSize(usize),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Failure reported by a [`SampleSource`](crate::capture::SampleSource) read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture device disconnected")]
    Disconnected,

    #[error("capture stream error: {0}")]
    Stream(String),
}

impl From<cpal::DevicesError> for Error {
    fn from(e: cpal::DevicesError) -> Self {
        Error::DeviceUnavailable(e.to_string())
    }
}

impl From<cpal::SupportedStreamConfigsError> for Error {
    fn from(e: cpal::SupportedStreamConfigsError) -> Self {
        Error::DeviceUnavailable(e.to_string())
    }
}

impl From<cpal::BuildStreamError> for Error {
    fn from(e: cpal::BuildStreamError) -> Self {
        Error::DeviceUnavailable(e.to_string())
    }
}

impl From<cpal::PlayStreamError> for Error {
    fn from(e: cpal::PlayStreamError) -> Self {
        Error::DeviceUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

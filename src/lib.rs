//! Live microphone analysis for audio-reactive visuals.
//!
//! A capture thread writes mono samples into a lock-free ring; the render
//! loop calls [`SpectralAnalyzer::update`] once per frame and reads smoothed
//! bass / mids / highs / amplitude values and a beat flag.

pub mod analyzer;
pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod fft;
pub mod metrics;
pub mod ring;
pub mod types;

pub use analyzer::SpectralAnalyzer;
pub use audio::{CpalBackend, list_input_devices};
pub use capture::{CaptureBackend, SampleSource, ToneBackend};
pub use config::{AnalyzerConfig, CaptureConfig, Config, load_config};
pub use error::{CaptureError, ConfigError, Error, Result};
pub use fft::Fft;
pub use ring::RingBuffer;
pub use types::{AnalyzerState, BandBins, BandLayout, Metrics};

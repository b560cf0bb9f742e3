use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Immutable analysis parameters, fixed when the analyzer is built.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AnalyzerConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f32,
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_bass_range")]
    pub bass_range_hz: (f32, f32),
    #[serde(default = "default_mids_range")]
    pub mids_range_hz: (f32, f32),
    #[serde(default = "default_highs_range")]
    pub highs_range_hz: (f32, f32),
    /// Blend coefficient; each tick moves a metric `1 - smoothing` of the way
    /// toward its raw value.
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    /// Raw bass must exceed `running_average * beat_sensitivity` to count as a beat.
    #[serde(default = "default_beat_sensitivity")]
    pub beat_sensitivity: f32,
    #[serde(default = "default_beat_decay")]
    pub beat_decay: f32,
    /// Raw bass below this never triggers a beat.
    #[serde(default = "default_beat_floor")]
    pub beat_floor: f32,
    /// Sample ring size; `4 * fft_size` when unset.
    #[serde(default)]
    pub ring_capacity: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CaptureConfig {
    /// Input device name; the host default when unset.
    #[serde(default)]
    pub device: Option<String>,
    /// Analyze a generated sine at this frequency instead of a device.
    #[serde(default)]
    pub tone_hz: Option<f32>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            fft_size: default_fft_size(),
            bass_range_hz: default_bass_range(),
            mids_range_hz: default_mids_range(),
            highs_range_hz: default_highs_range(),
            smoothing: default_smoothing(),
            beat_sensitivity: default_beat_sensitivity(),
            beat_decay: default_beat_decay(),
            beat_floor: default_beat_floor(),
            ring_capacity: None,
        }
    }
}

fn default_sample_rate() -> f32 {
    44100.0
}

fn default_fft_size() -> usize {
    1024
}

fn default_bass_range() -> (f32, f32) {
    (20.0, 250.0)
}

fn default_mids_range() -> (f32, f32) {
    (250.0, 2000.0)
}

fn default_highs_range() -> (f32, f32) {
    (2000.0, 16000.0)
}

fn default_smoothing() -> f32 {
    0.82
}

fn default_beat_sensitivity() -> f32 {
    1.4
}

fn default_beat_decay() -> f32 {
    0.98
}

fn default_beat_floor() -> f32 {
    0.005
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fft_size.is_power_of_two() || self.fft_size < 2 {
            return Err(ConfigError::InvalidFftSize(self.fft_size));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }

        let nyquist = self.sample_rate / 2.0;
        for (band, (low, high)) in [
            ("bass", self.bass_range_hz),
            ("mids", self.mids_range_hz),
            ("highs", self.highs_range_hz),
        ] {
            // Written so NaN bounds fail too.
            if !(low >= 0.0 && low < high && low < nyquist) {
                return Err(ConfigError::InvalidBand { band, low, high });
            }
        }

        if !(self.smoothing > 0.0 && self.smoothing < 1.0) {
            return Err(ConfigError::InvalidSmoothing(self.smoothing));
        }
        if !(self.beat_sensitivity > 1.0 && self.beat_sensitivity.is_finite()) {
            return Err(ConfigError::InvalidSensitivity(self.beat_sensitivity));
        }
        if !(self.beat_decay > 0.0 && self.beat_decay < 1.0) {
            return Err(ConfigError::InvalidDecay(self.beat_decay));
        }
        if !(self.beat_floor >= 0.0 && self.beat_floor.is_finite()) {
            return Err(ConfigError::InvalidFloor(self.beat_floor));
        }

        let capacity = self.ring_capacity();
        if !capacity.is_power_of_two() || capacity < self.fft_size {
            return Err(ConfigError::InvalidRingCapacity {
                capacity,
                fft_size: self.fft_size,
            });
        }
        Ok(())
    }

    pub fn ring_capacity(&self) -> usize {
        self.ring_capacity
            .unwrap_or_else(|| self.fft_size.saturating_mul(4))
    }

    /// Per-tick blend factor derived from `smoothing`.
    pub fn alpha(&self) -> f32 {
        1.0 - self.smoothing
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.analyzer.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalyzerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ring_capacity(), 4096);
        assert!((config.alpha() - 0.18).abs() < 1e-6);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [analyzer]
            fft_size = 2048
            bass_range_hz = [30.0, 200.0]
            beat_sensitivity = 1.6

            [capture]
            device = "USB Mic"
            "#,
        )
        .unwrap();

        assert_eq!(config.analyzer.fft_size, 2048);
        assert_eq!(config.analyzer.bass_range_hz, (30.0, 200.0));
        assert_eq!(config.analyzer.beat_sensitivity, 1.6);
        assert_eq!(config.analyzer.sample_rate, 44100.0);
        assert_eq!(config.capture.device.as_deref(), Some("USB Mic"));
        assert!(config.capture.tone_hz.is_none());
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let config: Config = toml::from_str(include_str!("../pulsefield.example.toml")).unwrap();
        assert_eq!(config.analyzer, AnalyzerConfig::default());
        assert!(config.capture.device.is_none());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.analyzer, AnalyzerConfig::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad = [
            AnalyzerConfig { fft_size: 1000, ..Default::default() },
            AnalyzerConfig { fft_size: 1, ..Default::default() },
            AnalyzerConfig { sample_rate: 0.0, ..Default::default() },
            AnalyzerConfig { bass_range_hz: (250.0, 20.0), ..Default::default() },
            AnalyzerConfig { mids_range_hz: (500.0, 500.0), ..Default::default() },
            AnalyzerConfig { highs_range_hz: (30000.0, 40000.0), ..Default::default() },
            AnalyzerConfig { highs_range_hz: (f32::NAN, 100.0), ..Default::default() },
            AnalyzerConfig { smoothing: 1.0, ..Default::default() },
            AnalyzerConfig { smoothing: 0.0, ..Default::default() },
            AnalyzerConfig { beat_sensitivity: 1.0, ..Default::default() },
            AnalyzerConfig { beat_decay: 0.0, ..Default::default() },
            AnalyzerConfig { beat_floor: -0.1, ..Default::default() },
            AnalyzerConfig { ring_capacity: Some(512), ..Default::default() },
            AnalyzerConfig { ring_capacity: Some(3000), ..Default::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn test_band_error_names_band() {
        let config = AnalyzerConfig {
            mids_range_hz: (900.0, 100.0),
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidBand { band, .. }) => assert_eq!(band, "mids"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_load_config_reports_parse_errors() {
        let path = std::env::temp_dir().join(format!("pulsefield-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[analyzer]\nfft_size = \"big\"\n").unwrap();
        let result = load_config(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        let missing = std::env::temp_dir().join("pulsefield-does-not-exist.toml");
        assert!(matches!(load_config(&missing), Err(ConfigError::Read(_))));
    }
}

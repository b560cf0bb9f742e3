//! Per-frame spectral analysis of a live capture stream.
//!
//! The capture thread keeps the ring filled at hardware cadence. The consumer
//! (a render loop) calls [`SpectralAnalyzer::update`] once per frame, which
//! snapshots the most recent `fft_size` samples and refreshes the smoothed
//! metrics. Nothing on the consumer side blocks on the capture thread.

use std::sync::Arc;

use crate::audio::CpalBackend;
use crate::capture::{CaptureBackend, CaptureWorker};
use crate::config::AnalyzerConfig;
use crate::error::Result;
use crate::fft::Fft;
use crate::metrics::{BeatDetector, smooth};
use crate::ring::RingBuffer;
use crate::types::{AnalyzerState, BandBins, BandLayout, Metrics};

pub struct SpectralAnalyzer {
    config: AnalyzerConfig,
    backend: Arc<dyn CaptureBackend>,
    fft: Fft,
    bands: BandLayout,
    ring: Arc<RingBuffer>,
    window: Vec<f32>,
    metrics: Metrics,
    beat: BeatDetector,
    /// Ring cursor when capture last started.
    start_cursor: usize,
    worker: Option<CaptureWorker>,
    state: AnalyzerState,
}

impl SpectralAnalyzer {
    /// Analyzer on the default cpal input device.
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        Self::with_backend(config, Arc::new(CpalBackend::default()))
    }

    pub fn with_backend(config: AnalyzerConfig, backend: Arc<dyn CaptureBackend>) -> Result<Self> {
        config.validate()?;

        let fft = Fft::new(config.fft_size)?;
        let band = |(low, high): (f32, f32)| BandBins {
            low: fft.frequency_to_bin(low, config.sample_rate),
            high: fft.frequency_to_bin(high, config.sample_rate),
        };
        let bands = BandLayout {
            bass: band(config.bass_range_hz),
            mids: band(config.mids_range_hz),
            highs: band(config.highs_range_hz),
        };

        let ring = Arc::new(RingBuffer::new(config.ring_capacity())?);
        let beat = BeatDetector::new(config.beat_sensitivity, config.beat_decay, config.beat_floor);

        log::debug!(
            "analyzer: fft_size={} ring={} bands={:?}",
            config.fft_size,
            ring.capacity(),
            bands
        );

        Ok(Self {
            window: vec![0.0; config.fft_size],
            config,
            backend,
            fft,
            bands,
            ring,
            metrics: Metrics::default(),
            beat,
            start_cursor: 0,
            worker: None,
            state: AnalyzerState::Stopped,
        })
    }

    /// Open the capture device and start the capture thread.
    ///
    /// A `DeviceUnavailable` error leaves the analyzer stopped; `start` may be
    /// retried. Calling it while already running is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.state != AnalyzerState::Stopped {
            return Ok(());
        }

        // No producer is attached while stopped; drop audio from a previous run.
        self.ring.clear();
        self.start_cursor = self.ring.written();

        let worker = CaptureWorker::spawn(
            Arc::clone(&self.backend),
            Arc::clone(&self.ring),
            self.config.sample_rate.round() as u32,
            self.config.fft_size,
        )
        .inspect_err(|e| log::warn!("audio capture unavailable: {e}"))?;

        log::info!(
            "capture started on {} at {} Hz",
            self.backend.name(),
            self.config.sample_rate
        );
        self.beat.reset();
        self.worker = Some(worker);
        self.state = AnalyzerState::Running;
        Ok(())
    }

    /// Stop capture. Waits a bounded time for the capture thread to exit.
    ///
    /// If the wait times out the thread is detached and still holds the
    /// capture source until its current read returns. The analyzer moves to a
    /// fresh ring so that thread can no longer reach it.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            if !worker.stop() {
                // The old thread may still write; never share a ring with it.
                match RingBuffer::new(self.config.ring_capacity()) {
                    Ok(ring) => self.ring = Arc::new(ring),
                    Err(e) => log::error!("failed to reallocate sample ring: {e}"),
                }
            }
            log::info!("capture stopped");
        }
        self.state = AnalyzerState::Stopped;
    }

    /// Switch between running and paused. Has no effect while stopped.
    pub fn toggle_pause(&mut self) {
        self.state = match self.state {
            AnalyzerState::Running => AnalyzerState::Paused,
            AnalyzerState::Paused => AnalyzerState::Running,
            AnalyzerState::Stopped => AnalyzerState::Stopped,
        };
    }

    pub fn is_paused(&self) -> bool {
        self.state == AnalyzerState::Paused
    }

    pub fn state(&self) -> AnalyzerState {
        self.state
    }

    /// Whether the capture thread is still delivering samples.
    pub fn is_capturing(&self) -> bool {
        self.worker.as_ref().is_some_and(CaptureWorker::is_alive)
    }

    /// Refresh the metrics from the latest samples. Call once per frame.
    pub fn update(&mut self) {
        if self.state != AnalyzerState::Running {
            return;
        }
        // Until a full window of new audio has arrived the snapshot is partly
        // the cleared ring, and its rising energy is not a beat.
        let filled = self.ring.written().wrapping_sub(self.start_cursor) >= self.window.len();
        self.ring.snapshot_into(&mut self.window);
        self.process_window(filled);
    }

    fn process_window(&mut self, detect_beats: bool) {
        if let Err(e) = self.fft.forward(&self.window) {
            log::error!("spectrum update skipped: {e}");
            return;
        }

        let BandLayout { bass, mids, highs } = self.bands;
        let raw_bass = self.fft.band_rms(bass.low, bass.high);
        let raw_mids = self.fft.band_rms(mids.low, mids.high);
        let raw_highs = self.fft.band_rms(highs.low, highs.high);

        let sum_sq: f32 = self.window.iter().map(|s| s * s).sum();
        let raw_amp = (sum_sq / self.window.len() as f32).sqrt();

        let alpha = self.config.alpha();
        let m = &mut self.metrics;
        m.bass = smooth(m.bass, raw_bass, alpha);
        m.mids = smooth(m.mids, raw_mids, alpha);
        m.highs = smooth(m.highs, raw_highs, alpha);
        m.amplitude = smooth(m.amplitude, raw_amp, alpha);

        m.beat = detect_beats && self.beat.process(raw_bass);
        m.beat_average = self.beat.average();
    }

    pub fn bass(&self) -> f32 {
        self.metrics.bass
    }

    pub fn mids(&self) -> f32 {
        self.metrics.mids
    }

    pub fn highs(&self) -> f32 {
        self.metrics.highs
    }

    pub fn amplitude(&self) -> f32 {
        self.metrics.amplitude
    }

    pub fn is_beat(&self) -> bool {
        self.metrics.beat
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    /// Copy of the most recent magnitude spectrum (`fft_size / 2` bins).
    pub fn spectrum(&self) -> Vec<f32> {
        self.fft.spectrum().to_vec()
    }

    pub fn fft_size(&self) -> usize {
        self.fft.size()
    }

    pub fn sample_rate(&self) -> f32 {
        self.config.sample_rate
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn band_layout(&self) -> BandLayout {
        self.bands
    }

    pub fn device_name(&self) -> String {
        self.backend.name()
    }
}

impl Drop for SpectralAnalyzer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("state", &self.state)
            .field("fft_size", &self.fft.size())
            .field("metrics", &self.metrics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SampleSource;
    use crate::error::{CaptureError, Error};

    struct NoDevice;

    impl CaptureBackend for NoDevice {
        fn open(&self, _sample_rate: u32) -> Result<Box<dyn SampleSource>> {
            Err(Error::DeviceUnavailable("unplugged".into()))
        }

        fn name(&self) -> String {
            "none".into()
        }
    }

    struct Silence;

    impl SampleSource for Silence {
        fn read(&mut self, _out: &mut Vec<f32>) -> std::result::Result<usize, CaptureError> {
            std::thread::sleep(std::time::Duration::from_millis(1));
            Ok(0)
        }
    }

    struct SilentDevice;

    impl CaptureBackend for SilentDevice {
        fn open(&self, _sample_rate: u32) -> Result<Box<dyn SampleSource>> {
            Ok(Box::new(Silence))
        }

        fn name(&self) -> String {
            "silent".into()
        }
    }

    fn analyzer() -> SpectralAnalyzer {
        SpectralAnalyzer::with_backend(AnalyzerConfig::default(), Arc::new(SilentDevice)).unwrap()
    }

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / 44100.0).sin())
            .collect()
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let config = AnalyzerConfig {
            fft_size: 1000,
            ..Default::default()
        };
        let result = SpectralAnalyzer::with_backend(config, Arc::new(SilentDevice));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_band_layout_from_default_config() {
        let a = analyzer();
        assert_eq!(a.config(), &AnalyzerConfig::default());
        let bands = a.band_layout();
        // 44100 / 1024 ~ 43.07 Hz per bin
        assert_eq!(bands.bass, BandBins { low: 0, high: 6 });
        assert_eq!(bands.mids, BandBins { low: 6, high: 46 });
        assert_eq!(bands.highs, BandBins { low: 46, high: 372 });
        for b in [bands.bass, bands.mids, bands.highs] {
            assert!(b.low <= b.high && b.high < 512);
        }
    }

    #[test]
    fn test_zero_window() {
        let mut a = analyzer();
        a.window.fill(0.0);
        a.process_window(true);

        assert!(a.spectrum().iter().all(|&m| m == 0.0));
        assert_eq!(a.amplitude(), 0.0);
        assert!(!a.is_beat());
    }

    #[test]
    fn test_amplitude_uses_unwindowed_samples() {
        let mut a = analyzer();
        a.window.fill(0.5);
        for _ in 0..200 {
            a.process_window(true);
        }
        assert!((a.amplitude() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_sine_energy_lands_in_matching_band() {
        let mut a = analyzer();
        a.window = sine(100.0, 1.0, 1024);
        for _ in 0..100 {
            a.process_window(true);
        }
        assert!(a.bass() > 5.0 * a.mids());
        assert!(a.bass() > 5.0 * a.highs());

        let mut b = analyzer();
        b.window = sine(5000.0, 1.0, 1024);
        for _ in 0..100 {
            b.process_window(true);
        }
        assert!(b.highs() > 5.0 * b.bass());
    }

    #[test]
    fn test_bass_hit_after_quiet_passage_is_a_beat() {
        let mut a = analyzer();
        a.window = sine(80.0, 0.1, 1024);
        for _ in 0..60 {
            a.process_window(true);
            assert!(!a.is_beat());
        }
        a.window = sine(80.0, 0.5, 1024);
        a.process_window(true);
        assert!(a.is_beat());
        assert!(a.metrics().beat_average > 0.0);
    }

    #[test]
    fn test_partial_window_after_start_is_not_a_beat() {
        let mut a = analyzer();
        a.start().unwrap();
        let tone = sine(80.0, 0.5, 4096);

        a.ring.write_slice(&tone[..256]);
        a.update();
        assert!(!a.is_beat());
        assert_eq!(a.metrics().beat_average, 0.0);

        a.ring.write_slice(&tone[256..]);
        for _ in 0..50 {
            a.update();
            assert!(!a.is_beat());
        }
        assert!(a.metrics().beat_average > 0.0);
        a.stop();
    }

    #[test]
    fn test_update_is_noop_unless_running() {
        let mut a = analyzer();
        a.ring.write_slice(&sine(440.0, 1.0, 4096));
        a.update();
        assert_eq!(a.metrics(), Metrics::default());

        a.toggle_pause();
        assert_eq!(a.state(), AnalyzerState::Stopped);
    }

    #[test]
    fn test_pause_preserves_metrics() {
        let mut a = analyzer();
        a.start().unwrap();
        a.ring.write_slice(&sine(440.0, 1.0, 4096));
        a.update();
        let before = a.metrics();
        assert!(before.amplitude > 0.0);

        a.toggle_pause();
        assert!(a.is_paused());
        a.ring.write_slice(&[0.0; 4096]);
        a.update();
        assert_eq!(a.metrics(), before);

        a.toggle_pause();
        assert_eq!(a.state(), AnalyzerState::Running);
        a.stop();
        assert_eq!(a.state(), AnalyzerState::Stopped);
    }

    #[test]
    fn test_device_unavailable_is_recoverable() {
        let mut a =
            SpectralAnalyzer::with_backend(AnalyzerConfig::default(), Arc::new(NoDevice)).unwrap();
        assert!(matches!(a.start(), Err(Error::DeviceUnavailable(_))));
        assert_eq!(a.state(), AnalyzerState::Stopped);
        assert!(a.start().is_err());

        a.update();
        assert_eq!(a.metrics(), Metrics::default());
        // stop on a never-started analyzer is harmless
        a.stop();
    }

    #[test]
    fn test_spectrum_is_a_copy() {
        let mut a = analyzer();
        a.window = sine(440.0, 1.0, 1024);
        a.process_window(true);
        let first = a.spectrum();
        assert_eq!(first.len(), 512);

        a.window.fill(0.0);
        a.process_window(true);
        assert!(first[10] > 0.1);
        assert_eq!(a.spectrum()[10], 0.0);
    }
}

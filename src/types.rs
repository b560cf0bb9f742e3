/// Smoothed per-frame descriptors consumed by the render loop.
///
/// Values are unit-less energies, roughly in `[0, 1]` but not clamped.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Metrics {
    pub bass: f32,
    pub mids: f32,
    pub highs: f32,
    pub amplitude: f32,
    /// Running average of raw bass energy used for beat detection.
    pub beat_average: f32,
    /// True only on the tick the beat condition held.
    pub beat: bool,
}

/// Inclusive FFT bin range of one analysis band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandBins {
    pub low: usize,
    pub high: usize,
}

/// Bin ranges for the three analysis bands, derived once from the config.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandLayout {
    pub bass: BandBins,
    pub mids: BandBins,
    pub highs: BandBins,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalyzerState {
    Stopped,
    Running,
    Paused,
}

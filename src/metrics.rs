//! Per-tick smoothing and beat decision.

/// One step of the exponential low-pass `s += alpha * (raw - s)`.
#[inline]
pub fn smooth(current: f32, raw: f32, alpha: f32) -> f32 {
    current + alpha * (raw - current)
}

/// Energy-spike beat detector over raw bass energy.
///
/// The spike test runs against the running average from previous ticks; the
/// current value is blended in afterwards. The first value above the floor
/// seeds the average, so neither leading silence nor a steady signal triggers
/// on start-up.
#[derive(Clone, Debug)]
pub struct BeatDetector {
    sensitivity: f32,
    decay: f32,
    floor: f32,
    average: f32,
    primed: bool,
}

impl BeatDetector {
    pub fn new(sensitivity: f32, decay: f32, floor: f32) -> Self {
        Self {
            sensitivity,
            decay,
            floor,
            average: 0.0,
            primed: false,
        }
    }

    /// Feed one raw bass value; returns whether this tick is a beat.
    pub fn process(&mut self, raw_bass: f32) -> bool {
        if !self.primed {
            if raw_bass > self.floor {
                self.average = raw_bass;
                self.primed = true;
            }
            return false;
        }

        let beat = raw_bass > self.average * self.sensitivity && raw_bass > self.floor;
        self.average = self.average * self.decay + raw_bass * (1.0 - self.decay);
        beat
    }

    pub fn average(&self) -> f32 {
        self.average
    }

    pub fn reset(&mut self) {
        self.average = 0.0;
        self.primed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoothing_converges_monotonically() {
        let alpha = 1.0 - 0.82;
        for (start, target) in [(0.0f32, 0.6f32), (2.0, 0.6), (-1.0, 0.0), (0.3, 0.3)] {
            let mut s = start;
            let mut prev_err = (s - target).abs();
            for _ in 0..200 {
                s = smooth(s, target, alpha);
                let err = (s - target).abs();
                assert!(err <= prev_err);
                prev_err = err;
            }
            assert!(prev_err < 1e-5, "start={start} target={target} s={s}");
        }
    }

    #[test]
    fn test_flat_signal_never_beats() {
        let mut det = BeatDetector::new(1.4, 0.98, 0.005);
        for _ in 0..500 {
            assert!(!det.process(0.2));
        }

        let mut quiet = BeatDetector::new(1.4, 0.98, 0.005);
        for _ in 0..500 {
            assert!(!quiet.process(0.001));
        }
    }

    #[test]
    fn test_spike_beats_on_that_tick_only() {
        let (sensitivity, v) = (1.4, 0.2);
        let mut det = BeatDetector::new(sensitivity, 0.98, 0.005);
        for _ in 0..100 {
            assert!(!det.process(v));
        }
        assert!(det.process(v * sensitivity * 1.5));
        assert!(!det.process(v));
    }

    #[test]
    fn test_spike_below_floor_is_ignored() {
        let mut det = BeatDetector::new(1.4, 0.98, 0.5);
        for _ in 0..100 {
            det.process(0.01);
        }
        assert!(!det.process(0.1));
    }

    #[test]
    fn test_compares_before_blending_current_value() {
        // With decay 0.5 the two orders disagree on a 1.5x spike:
        // before-update threshold = 1.0 * 1.4 = 1.4 -> beat
        // after-update threshold  = 1.25 * 1.4 = 1.75 -> no beat
        let mut det = BeatDetector::new(1.4, 0.5, 0.0);
        det.process(1.0);
        assert!((det.average() - 1.0).abs() < 1e-6);
        assert!(det.process(1.5));
        assert!((det.average() - 1.25).abs() < 1e-6);
    }

    #[test]
    fn test_leading_silence_does_not_seed() {
        let mut det = BeatDetector::new(1.4, 0.98, 0.005);
        for _ in 0..30 {
            assert!(!det.process(0.0));
        }
        assert_eq!(det.average(), 0.0);
        for _ in 0..200 {
            assert!(!det.process(0.2));
        }
        assert!((det.average() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_reset_reseeds() {
        let mut det = BeatDetector::new(1.4, 0.9, 0.0);
        det.process(1.0);
        det.reset();
        assert!(!det.process(10.0));
        assert_eq!(det.average(), 10.0);
    }
}

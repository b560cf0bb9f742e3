//! Fixed-size radix-2 FFT for per-frame spectrum analysis.
//!
//! Everything that depends only on the transform size (bit-reversal
//! permutation, Hann window, twiddle factors) is computed once in
//! [`Fft::new`]. A call to [`Fft::forward`] touches only preallocated scratch
//! buffers, so it is safe to run once per display frame.

use std::f64::consts::PI;

use crate::error::{Error, Result};

pub struct Fft {
    size: usize,
    half_size: usize,
    log2_size: u32,

    bit_reversed: Vec<usize>,
    window: Vec<f32>,
    cos: Vec<f32>,
    sin: Vec<f32>,

    real: Vec<f32>,
    imag: Vec<f32>,
    spectrum: Vec<f32>,
}

impl Fft {
    pub fn new(size: usize) -> Result<Self> {
        if size < 2 || !size.is_power_of_two() {
            return Err(Error::InvalidSize(size));
        }

        let half_size = size / 2;
        let log2_size = size.trailing_zeros();

        let bit_reversed = (0..size)
            .map(|i| i.reverse_bits() >> (usize::BITS - log2_size))
            .collect();

        // Tables are computed in f64 and narrowed.
        let step = 2.0 * PI / (size - 1) as f64;
        let window = (0..size)
            .map(|i| (0.5 * (1.0 - (step * i as f64).cos())) as f32)
            .collect();

        let (cos, sin) = (0..half_size)
            .map(|i| {
                let angle = -2.0 * PI * i as f64 / size as f64;
                (angle.cos() as f32, angle.sin() as f32)
            })
            .unzip();

        Ok(Self {
            size,
            half_size,
            log2_size,
            bit_reversed,
            window,
            cos,
            sin,
            real: vec![0.0; size],
            imag: vec![0.0; size],
            spectrum: vec![0.0; half_size],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn half_size(&self) -> usize {
        self.half_size
    }

    /// Hann-window `samples[..size]`, transform, and store the magnitude
    /// spectrum (bins `0..size/2`, normalized by `size`).
    ///
    /// The result stays valid until the next call.
    pub fn forward(&mut self, samples: &[f32]) -> Result<&[f32]> {
        if samples.len() < self.size {
            return Err(Error::InvalidRequest(format!(
                "input length {} is less than FFT size {}",
                samples.len(),
                self.size
            )));
        }

        for i in 0..self.size {
            let j = self.bit_reversed[i];
            self.real[j] = samples[i] * self.window[i];
            self.imag[j] = 0.0;
        }

        for stage in 0..self.log2_size {
            let half_block = 1usize << stage;
            let stride = self.half_size >> stage;

            for block in (0..self.size).step_by(half_block << 1) {
                let mut tw = 0;
                for j in 0..half_block {
                    let even = block + j;
                    let odd = even + half_block;

                    let (c, s) = (self.cos[tw], self.sin[tw]);
                    let t_re = c * self.real[odd] - s * self.imag[odd];
                    let t_im = c * self.imag[odd] + s * self.real[odd];

                    self.real[odd] = self.real[even] - t_re;
                    self.imag[odd] = self.imag[even] - t_im;
                    self.real[even] += t_re;
                    self.imag[even] += t_im;

                    tw += stride;
                }
            }
        }

        let inv_size = 1.0 / self.size as f32;
        for (i, mag) in self.spectrum.iter_mut().enumerate() {
            *mag = (self.real[i] * self.real[i] + self.imag[i] * self.imag[i]).sqrt() * inv_size;
        }

        Ok(&self.spectrum)
    }

    /// Magnitude spectrum from the last [`forward`](Self::forward) call.
    pub fn spectrum(&self) -> &[f32] {
        &self.spectrum
    }

    pub fn magnitude(&self, bin: usize) -> Option<f32> {
        self.spectrum.get(bin).copied()
    }

    /// RMS of the magnitudes in the inclusive bin range `low..=high`.
    ///
    /// Both bounds are clamped to the spectrum; an empty range yields 0.
    pub fn band_rms(&self, low: usize, high: usize) -> f32 {
        let high = high.min(self.half_size - 1);
        if low > high {
            return 0.0;
        }
        let bins = &self.spectrum[low..=high];
        let sum: f32 = bins.iter().map(|m| m * m).sum();
        (sum / bins.len() as f32).sqrt()
    }

    /// Nearest bin for `freq_hz`, clamped to `0..size/2`.
    pub fn frequency_to_bin(&self, freq_hz: f32, sample_rate: f32) -> usize {
        let bin = (freq_hz * self.size as f32 / sample_rate).round();
        if bin.is_nan() || bin <= 0.0 {
            return 0;
        }
        (bin as usize).min(self.half_size - 1)
    }

    /// Centre frequency of `bin` in Hz.
    pub fn bin_to_frequency(&self, bin: usize, sample_rate: f32) -> f32 {
        bin as f32 * sample_rate / self.size as f32
    }
}

impl std::fmt::Debug for Fft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft").field("size", &self.size).finish()
    }
}

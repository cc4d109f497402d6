//! # Spectral Estimator
//!
//! Turns an analysis window into a cleaned magnitude spectrum:
//! 1. Hann taper to reduce spectral leakage
//! 2. Forward FFT (RustFFT), keeping the non-negative frequencies
//! 3. Mains hum suppression below 62 Hz
//! 4. Octave-band noise gating, relative to each band's own RMS
//! 5. A leakage floor relative to the spectrum peak
//!
//! The FFT is planned once and all buffers are reused, so `analyze` does not
//! allocate on the audio thread.

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

use crate::config::Config;

/// Octave band boundaries in Hz used for adaptive noise gating.
pub const OCTAVE_BANDS: [f32; 10] = [
    50.0, 100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0, 6400.0, 12800.0, 25600.0,
];

/// Builds a symmetric Hann window of length `n`.
pub fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}

pub struct SpectralEstimator {
    hann: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    spectrum: Vec<f32>,
    hum_cutoff_bin: usize,
    /// Half-open bin ranges of the octave bands that fall inside the spectrum.
    bands: Vec<(usize, usize)>,
    gate_fraction: f32,
    leakage_floor: f32,
}

impl SpectralEstimator {
    /// Plans the FFT and precomputes the taper and band layout for `config`.
    /// The config is expected to be validated.
    pub fn new(config: &Config) -> Self {
        let window_size = config.window_size;
        let spectrum_len = config.spectrum_len();
        let bin_width = config.bin_width();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window_size);
        let scratch = vec![Complex { re: 0.0, im: 0.0 }; fft.get_inplace_scratch_len()];

        let bands = OCTAVE_BANDS
            .windows(2)
            .map(|edges| {
                let start = (edges[0] / bin_width) as usize;
                let end = ((edges[1] / bin_width) as usize).min(spectrum_len);
                (start, end)
            })
            .filter(|(start, end)| start < end)
            .collect();

        Self {
            hann: hann_window(window_size),
            fft,
            buffer: vec![Complex { re: 0.0, im: 0.0 }; window_size],
            scratch,
            spectrum: vec![0.0; spectrum_len],
            hum_cutoff_bin: config.hum_cutoff_bin(),
            bands,
            gate_fraction: config.noise_gate_fraction,
            leakage_floor: config.leakage_floor,
        }
    }

    /// Computes the cleaned magnitude spectrum of `window`.
    ///
    /// # Arguments
    /// * `window` - Exactly `window_size` samples
    ///
    /// # Returns
    /// * `window_size / 2` non-negative magnitudes, one per bin
    pub fn analyze(&mut self, window: &[f32]) -> &[f32] {
        assert_eq!(window.len(), self.hann.len(), "Window length must equal the configured window size");

        for ((slot, &sample), &taper) in self.buffer.iter_mut().zip(window).zip(&self.hann) {
            *slot = Complex { re: sample * taper, im: 0.0 };
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        // Real input: the upper half mirrors the lower half.
        for (magnitude, bin) in self.spectrum.iter_mut().zip(&self.buffer) {
            *magnitude = bin.norm();
        }

        let hum_end = self.hum_cutoff_bin.min(self.spectrum.len());
        self.spectrum[..hum_end].fill(0.0);

        for &(start, end) in &self.bands {
            gate_band(&mut self.spectrum[start..end], self.gate_fraction);
        }

        let peak = self.spectrum.iter().copied().fold(0.0, f32::max);
        if peak > 0.0 {
            let floor = peak * self.leakage_floor;
            for magnitude in self.spectrum.iter_mut() {
                if *magnitude < floor {
                    *magnitude = 0.0;
                }
            }
        }

        &self.spectrum
    }

    /// The spectrum produced by the last call to `analyze`.
    pub fn spectrum(&self) -> &[f32] {
        &self.spectrum
    }

    pub fn hum_cutoff_bin(&self) -> usize {
        self.hum_cutoff_bin
    }
}

/// Zeroes every bin that does not exceed `fraction` of the band's RMS magnitude.
fn gate_band(band: &mut [f32], fraction: f32) {
    if band.is_empty() {
        return;
    }
    let rms = (band.iter().map(|m| m * m).sum::<f32>() / band.len() as f32).sqrt();
    let threshold = fraction * rms;
    for magnitude in band.iter_mut() {
        if *magnitude <= threshold {
            *magnitude = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, config: &Config) -> Vec<f32> {
        (0..config.window_size)
            .map(|i| {
                0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / config.sample_rate as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_hann_window_shape() {
        let w = hann_window(5);
        assert!(w[0].abs() < 1e-6);
        assert!(w[4].abs() < 1e-6);
        assert!((w[2] - 1.0).abs() < 1e-6);
        assert!((w[1] - w[3]).abs() < 1e-6);
    }

    #[test]
    fn test_spectrum_length_and_sign() {
        let config = Config::default();
        let mut estimator = SpectralEstimator::new(&config);
        let spectrum = estimator.analyze(&sine(440.0, &config));
        assert_eq!(spectrum.len(), config.window_size / 2);
        assert!(spectrum.iter().all(|&m| m >= 0.0));
    }

    #[test]
    fn test_peak_at_sine_bin() {
        let config = Config::default();
        let mut estimator = SpectralEstimator::new(&config);
        // 1000 Hz sits exactly on bin 30 at 33.3 Hz spacing.
        let spectrum = estimator.analyze(&sine(1000.0, &config));
        let peak_bin = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak_bin, 30);
    }

    #[test]
    fn test_hum_is_removed() {
        let config = Config::default();
        let mut estimator = SpectralEstimator::new(&config);
        let dc = vec![0.3; config.window_size];
        let spectrum = estimator.analyze(&dc).to_vec();
        assert!(estimator.hum_cutoff_bin() >= 1);
        assert_eq!(spectrum[0], 0.0);
    }

    #[test]
    fn test_far_leakage_is_gated() {
        let config = Config::default();
        let mut estimator = SpectralEstimator::new(&config);
        let spectrum = estimator.analyze(&sine(1000.0, &config));
        // Nothing survives an octave away from a pure tone.
        assert!(spectrum[..15].iter().all(|&m| m == 0.0));
        assert!(spectrum[60..].iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_gate_band_keeps_strong_bins() {
        let mut band = [0.1, 0.1, 4.0, 0.1];
        gate_band(&mut band, 0.2);
        assert_eq!(band, [0.0, 0.0, 4.0, 0.0]);
    }

    #[test]
    fn test_silence_stays_zero() {
        let config = Config::default();
        let mut estimator = SpectralEstimator::new(&config);
        let spectrum = estimator.analyze(&vec![0.0; config.window_size]);
        assert!(spectrum.iter().all(|&m| m == 0.0));
    }
}

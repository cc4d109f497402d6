//! # Pitch Detection Module
//!
//! Fundamental frequency estimation with the Harmonic Product Spectrum (HPS).
//! HPS multiplies the magnitude spectrum with copies of itself compressed by
//! 2, 3, ... K, so a frequency whose harmonics are all present is reinforced
//! even when the fundamental itself is weak. That suits reedy, buzzy sources
//! like the otamatone far better than a plain peak pick.
//!
//! ## Features
//! - Signal power gate to skip silent windows cheaply
//! - Linear spectrum upsampling for finer frequency resolution
//! - Early stop once the product runs out of harmonic support
//! - Rejection of implausibly low candidates

use tracing::trace;

use crate::config::{Config, HUM_CUTOFF_HZ};

/// Mean squared amplitude of `signal`.
pub fn signal_power(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32
}

pub struct HarmonicPitchDetector {
    harmonics: usize,
    bin_width: f32,
    power_threshold: f32,
    min_frequency: f32,
    /// First upsampled index searched for a peak (the hum cutoff).
    search_start: usize,
    interpolated: Vec<f32>,
    product: Vec<f32>,
    next: Vec<f32>,
}

impl HarmonicPitchDetector {
    /// Preallocates the upsampled buffers for `config` (expected validated).
    pub fn new(config: &Config) -> Self {
        let harmonics = config.harmonic_count;
        let upsampled_len = config.spectrum_len() * harmonics;
        let bin_width = config.bin_width();
        Self {
            harmonics,
            bin_width,
            power_threshold: config.power_threshold,
            min_frequency: config.min_plausible_frequency,
            search_start: (HUM_CUTOFF_HZ / bin_width * harmonics as f32).ceil() as usize,
            interpolated: vec![0.0; upsampled_len],
            product: vec![0.0; upsampled_len],
            next: vec![0.0; upsampled_len],
        }
    }

    /// Returns `true` when the window carries enough energy to analyze.
    /// Windows failing the gate are silence and skip the spectral stages.
    pub fn passes_power_gate(&self, window: &[f32]) -> bool {
        signal_power(window) >= self.power_threshold
    }

    /// Estimates the fundamental frequency of a cleaned magnitude spectrum.
    ///
    /// # Arguments
    /// * `spectrum` - `window_size / 2` magnitudes from the spectral estimator
    ///
    /// # Returns
    /// * The fundamental in Hz, or `0.0` when nothing usable survived gating
    ///   or the candidate is below the plausible minimum
    pub fn detect(&mut self, spectrum: &[f32]) -> f32 {
        let k = self.harmonics;
        let len = self.interpolated.len();
        assert_eq!(spectrum.len() * k, len, "Spectrum length does not match the configured window size");

        // --- Step 1: Upsample by linear interpolation and L2-normalize ---
        let last = spectrum.len() - 1;
        for (t, value) in self.interpolated.iter_mut().enumerate() {
            let bin = t / k;
            *value = if bin < last {
                let frac = (t % k) as f32 / k as f32;
                spectrum[bin] * (1.0 - frac) + spectrum[bin + 1] * frac
            } else {
                spectrum[last]
            };
        }
        let norm = self.interpolated.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            return 0.0;
        }
        for value in self.interpolated.iter_mut() {
            *value /= norm;
        }

        // --- Step 2: Harmonic products, stopping when support runs out ---
        self.product.copy_from_slice(&self.interpolated);
        let mut product_len = len;
        let mut stages = 0;
        for h in 1..=k {
            let next_len = len.div_ceil(h);
            for i in 0..next_len {
                self.next[i] = self.product[i] * self.interpolated[i * h];
            }
            let start = self.search_start.min(next_len);
            if self.next[start..next_len].iter().all(|&v| v == 0.0) {
                break;
            }
            std::mem::swap(&mut self.product, &mut self.next);
            product_len = next_len;
            stages = h;
        }

        // --- Step 3: Peak pick, first maximum wins ---
        let mut best_index = 0;
        let mut best_value = 0.0;
        for i in self.search_start..product_len {
            if self.product[i] > best_value {
                best_value = self.product[i];
                best_index = i;
            }
        }
        if best_value == 0.0 {
            return 0.0;
        }

        let frequency = best_index as f32 * self.bin_width / k as f32;
        trace!(frequency, stages, "HPS candidate");

        // --- Step 4: Reject detector artifacts ---
        if frequency < self.min_frequency {
            return 0.0;
        }
        frequency
    }
}

//! # Session Configuration
//!
//! All tunables of the pitch pipeline live in one serde-friendly struct so a
//! front end can load a partial JSON file and fall back to defaults for the
//! rest. The defaults are tuned for an otamatone played into a laptop
//! microphone: 20 kHz sampling, 600-sample windows advanced by 300 samples
//! (15 ms per tick) and ten harmonic products.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationBounds;
use crate::error::ConfigError;

/// Mains hum cutoff in Hz. Every bin below it is zeroed before detection.
pub const HUM_CUTOFF_HZ: f32 = 62.0;

/// Which kind of control value the mapper produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputPolicy {
    /// Quantize to the nearest equal-tempered note.
    Note,
    /// Normalized position between the calibration bounds.
    Position,
}

/// What the stabilizer reports when recent estimates disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterPolicy {
    /// Highest value in the history. Downward dropouts are suppressed.
    Max,
    /// Median of the history.
    Median,
}

/// How positions outside the calibrated range are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangePolicy {
    /// Clamp to 0 or 1 and flag the value as out of range.
    Clamp,
    /// Emit `ControlValue::OutOfRange` so the adapter can release its actuator.
    Suppress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input sample rate in Hz.
    pub sample_rate: u32,
    /// Analysis window length in samples.
    ///
    /// Detection needs about nine bins below the fundamental, so the lowest
    /// reliably resolved pitch is `9 * sample_rate / window_size`: 300 Hz
    /// with the defaults. Lower instruments need a longer window (2000
    /// samples reach the 120 Hz plausibility floor at 20 kHz). See
    /// [`Config::lowest_resolvable_frequency`].
    pub window_size: usize,
    /// Samples per incoming block; the window advances by this much each tick.
    pub step_size: usize,
    /// Number of harmonic products (also the spectrum upsampling factor).
    pub harmonic_count: usize,
    /// Mean squared amplitude below which a window counts as silence.
    pub power_threshold: f32,
    /// Fraction of an octave band's RMS under which bins are zeroed.
    pub noise_gate_fraction: f32,
    /// Fraction of the spectrum peak under which bins are zeroed.
    pub leakage_floor: f32,
    /// Candidates below this frequency are treated as detector artifacts.
    pub min_plausible_frequency: f32,
    pub reference_pitch_hz: f32,
    pub output_policy: OutputPolicy,
    /// Learn the bounds from the player instead of using `default_bounds`.
    pub calibration_enabled: bool,
    pub middle_tone_enabled: bool,
    pub stabilizer_tolerance_hz: f32,
    pub history_capacity: usize,
    /// Ticks discarded after every silence-to-sound transition.
    pub warmup_ticks: usize,
    pub jitter_policy: JitterPolicy,
    pub calibration_tolerance_hz: f32,
    pub calibration_sample_count: usize,
    /// Bounds used when calibration is disabled. The middle is ignored when
    /// `middle_tone_enabled` is off.
    pub default_bounds: CalibrationBounds,
    pub range_policy: RangePolicy,
    /// Slack around the bounds before a pitch counts as out of range.
    pub range_margin_hz: f32,
    pub invert_position: bool,
    /// Velocity attached to note-on events.
    pub note_velocity: u8,
    /// Capacity of the queue carrying tick outputs off the processing thread.
    pub output_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: 20_000,
            window_size: 600,
            step_size: 300,
            harmonic_count: 10,
            power_threshold: 1e-6,
            noise_gate_fraction: 0.2,
            leakage_floor: 0.02,
            min_plausible_frequency: 120.0,
            reference_pitch_hz: 440.0,
            output_policy: OutputPolicy::Position,
            calibration_enabled: true,
            middle_tone_enabled: true,
            stabilizer_tolerance_hz: 2.0,
            history_capacity: 3,
            warmup_ticks: 0,
            jitter_policy: JitterPolicy::Max,
            calibration_tolerance_hz: 5.0,
            calibration_sample_count: 6,
            default_bounds: CalibrationBounds {
                bottom: 170.0,
                top: 860.0,
                middle: Some(290.0),
            },
            range_policy: RangePolicy::Clamp,
            range_margin_hz: 20.0,
            invert_position: false,
            note_velocity: 127,
            output_queue_capacity: 64,
        }
    }
}

impl Config {
    /// Parses a (possibly partial) JSON config and validates it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Frequency spacing of the spectrum bins in Hz.
    pub fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.window_size as f32
    }

    /// Number of bins in the magnitude spectrum.
    pub fn spectrum_len(&self) -> usize {
        self.window_size / 2
    }

    /// Index of the first bin at or above the hum cutoff.
    pub fn hum_cutoff_bin(&self) -> usize {
        (HUM_CUTOFF_HZ / self.bin_width()) as usize
    }

    /// Lowest pitch the detector resolves reliably with this window.
    pub fn lowest_resolvable_frequency(&self) -> f32 {
        (9.0 * self.bin_width()).max(self.min_plausible_frequency)
    }

    /// Wall-clock time between two ticks.
    pub fn block_period(&self) -> Duration {
        Duration::from_nanos(self.step_size as u64 * 1_000_000_000 / self.sample_rate as u64)
    }

    /// Checks every parameter. A config that passes can be handed to any
    /// pipeline stage without further checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindowSize);
        }
        if self.step_size == 0 {
            return Err(ConfigError::ZeroStepSize);
        }
        if self.step_size > self.window_size {
            return Err(ConfigError::StepExceedsWindow {
                step: self.step_size,
                window: self.window_size,
            });
        }
        if self.spectrum_len() < 2 || self.hum_cutoff_bin() >= self.spectrum_len() {
            return Err(ConfigError::WindowTooSmall {
                window: self.window_size,
                sample_rate: self.sample_rate,
            });
        }
        if self.harmonic_count == 0 {
            return Err(ConfigError::ZeroHarmonics);
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroCapacity { name: "history_capacity" });
        }
        if self.calibration_sample_count == 0 {
            return Err(ConfigError::ZeroCapacity { name: "calibration_sample_count" });
        }
        if self.output_queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity { name: "output_queue_capacity" });
        }

        check_non_negative("power_threshold", self.power_threshold)?;
        check_non_negative("min_plausible_frequency", self.min_plausible_frequency)?;
        check_non_negative("stabilizer_tolerance_hz", self.stabilizer_tolerance_hz)?;
        check_non_negative("calibration_tolerance_hz", self.calibration_tolerance_hz)?;
        check_non_negative("range_margin_hz", self.range_margin_hz)?;
        check_fraction("noise_gate_fraction", self.noise_gate_fraction)?;
        check_fraction("leakage_floor", self.leakage_floor)?;
        if !(self.reference_pitch_hz.is_finite() && self.reference_pitch_hz > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "reference_pitch_hz",
                value: self.reference_pitch_hz,
                expected: "a positive frequency",
            });
        }

        if !self.default_bounds.is_valid() {
            let b = &self.default_bounds;
            return Err(ConfigError::InvalidBounds {
                bottom: b.bottom,
                middle: b.middle,
                top: b.top,
            });
        }
        Ok(())
    }
}

fn check_non_negative(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value, expected: "a finite value >= 0" })
    }
}

fn check_fraction(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value, expected: "a fraction in [0, 1]" })
    }
}

//! # Block Processor
//!
//! Runs the whole per-tick pipeline for one session:
//!
//! ```text
//! block -> FrameBuffer -> power gate -> SpectralEstimator -> HarmonicPitchDetector
//!       -> Stabilizer -> CalibrationState (while calibrating) + ControlMapper
//! ```
//!
//! All state lives in this struct and is owned by whichever thread calls
//! `process_block`, so nothing here locks or allocates per tick apart from the
//! returned output.

use tracing::{debug, trace, warn};

use crate::calibration::{CalibrationEvent, CalibrationPhase, CalibrationState};
use crate::config::{Config, OutputPolicy};
use crate::error::ConfigError;
use crate::fft::SpectralEstimator;
use crate::frame::FrameBuffer;
use crate::mapper::{ControlMapper, ControlValue};
use crate::pitch::HarmonicPitchDetector;
use crate::stabilizer::Stabilizer;

/// Everything a single tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    /// Detector estimate in Hz, `0.0` for silence.
    pub raw_pitch: f32,
    /// Stabilized pitch in Hz, `0.0` for silence.
    pub pitch: f32,
    /// Calibration phase after this tick.
    pub phase: CalibrationPhase,
    pub calibration: CalibrationEvent,
    pub control: ControlValue,
}

pub struct PitchProcessor {
    config: Config,
    frames: FrameBuffer,
    estimator: SpectralEstimator,
    detector: HarmonicPitchDetector,
    stabilizer: Stabilizer,
    calibration: CalibrationState,
    mapper: ControlMapper,
    ticks: u64,
    dropped_ticks: u64,
}

impl PitchProcessor {
    /// Validates `config` and builds every stage for it.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let lowest = config.lowest_resolvable_frequency();
        if config.output_policy == OutputPolicy::Position
            && !config.calibration_enabled
            && config.default_bounds.bottom < lowest
        {
            warn!(
                bottom = config.default_bounds.bottom,
                lowest,
                "Bottom bound is below the lowest pitch this window resolves; increase window_size"
            );
        }
        Ok(Self {
            frames: FrameBuffer::from_config(&config),
            estimator: SpectralEstimator::new(&config),
            detector: HarmonicPitchDetector::new(&config),
            stabilizer: Stabilizer::new(&config),
            calibration: CalibrationState::new(&config),
            mapper: ControlMapper::new(&config),
            config,
            ticks: 0,
            dropped_ticks: 0,
        })
    }

    /// Processes one block of `step_size` samples.
    ///
    /// # Returns
    /// * `Some(output)` - The result of the tick
    /// * `None` - The block had the wrong length and the tick was dropped
    ///   with the window left untouched
    pub fn process_block(&mut self, block: &[f32]) -> Option<TickOutput> {
        if block.len() != self.frames.step_size() {
            warn!(
                expected = self.frames.step_size(),
                got = block.len(),
                "Dropping block of unexpected length"
            );
            self.dropped_ticks += 1;
            return None;
        }
        self.ticks += 1;

        let window = self.frames.push(block);
        let raw_pitch = if self.detector.passes_power_gate(window) {
            let spectrum = self.estimator.analyze(window);
            self.detector.detect(spectrum)
        } else {
            0.0
        };
        let pitch = self.stabilizer.stabilize(raw_pitch);

        let calibration = if self.calibration.is_done() {
            CalibrationEvent::Idle
        } else {
            self.calibration.observe(pitch)
        };
        let control = self.mapper.map(pitch, &self.calibration);
        trace!(tick = self.ticks, raw_pitch, pitch, ?control, "Processed block");

        Some(TickOutput {
            raw_pitch,
            pitch,
            phase: self.calibration.phase(),
            calibration,
            control,
        })
    }

    /// Records an acquisition fault. The tick is a no-op: the window, history
    /// and calibration are left as they were.
    pub fn skip_tick(&mut self, status: &str) {
        self.dropped_ticks += 1;
        warn!(status, "Audio input fault, skipping tick");
    }

    /// Clears the per-stream state (window and pitch history). Calibration
    /// survives so a stopped session can resume without recalibrating.
    pub fn reset(&mut self) {
        self.frames.reset();
        self.stabilizer.reset();
        debug!(ticks = self.ticks, dropped = self.dropped_ticks, "Processor reset");
    }

    pub fn restart_calibration(&mut self) {
        self.calibration.restart();
        debug!(phase = ?self.calibration.phase(), "Calibration restarted");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn calibration(&self) -> &CalibrationState {
        &self.calibration
    }

    pub fn window(&self) -> &[f32] {
        self.frames.window()
    }

    pub fn stabilizer(&self) -> &Stabilizer {
        &self.stabilizer
    }

    /// Ticks processed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks dropped because of faults or malformed blocks.
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config { step_size: 0, ..Config::default() };
        assert!(matches!(PitchProcessor::new(config), Err(ConfigError::ZeroStepSize)));
    }

    #[test]
    fn test_silent_blocks() {
        let mut processor = PitchProcessor::new(Config::default()).unwrap();
        for _ in 0..4 {
            let out = processor.process_block(&[0.0; 300]).unwrap();
            assert_eq!(out.raw_pitch, 0.0);
            assert_eq!(out.pitch, 0.0);
            assert_eq!(out.control, ControlValue::Silence);
            assert!(processor.stabilizer().is_empty());
        }
        assert_eq!(processor.ticks(), 4);
    }

    #[test]
    fn test_wrong_block_length_is_dropped() {
        let mut processor = PitchProcessor::new(Config::default()).unwrap();
        processor.process_block(&[0.25; 300]);
        let before = processor.window().to_vec();
        assert!(processor.process_block(&[0.5; 128]).is_none());
        assert_eq!(processor.window(), before.as_slice());
        assert_eq!(processor.dropped_ticks(), 1);
        assert_eq!(processor.ticks(), 1);
    }

    #[test]
    fn test_fault_keeps_window() {
        let mut processor = PitchProcessor::new(Config::default()).unwrap();
        processor.process_block(&[0.25; 300]);
        let before = processor.window().to_vec();
        processor.skip_tick("input overflow");
        assert_eq!(processor.window(), before.as_slice());
        assert_eq!(processor.dropped_ticks(), 1);
    }

    #[test]
    fn test_reset_zeroes_window() {
        let config = Config { output_policy: OutputPolicy::Note, ..Config::default() };
        let mut processor = PitchProcessor::new(config).unwrap();
        processor.process_block(&[0.25; 300]);
        processor.reset();
        assert!(processor.window().iter().all(|&s| s == 0.0));
        assert!(processor.stabilizer().is_empty());
    }

    #[test]
    fn test_note_policy_does_not_calibrate() {
        let config = Config { output_policy: OutputPolicy::Note, ..Config::default() };
        let mut processor = PitchProcessor::new(config).unwrap();
        let out = processor.process_block(&[0.0; 300]).unwrap();
        assert_eq!(out.phase, CalibrationPhase::Done);
        assert_eq!(out.calibration, CalibrationEvent::Idle);
    }
}

//! # Calibration State Machine
//!
//! Learns the player's pitch range from held notes: first the highest note,
//! then the lowest, then (optionally) a middle reference. Each reference is
//! the mean of a run of stabilized pitches whose neighbours all agree within
//! the calibration tolerance. Inconsistent runs are discarded silently and
//! accumulation starts over. After each learned reference the player has to
//! release the note before the next one is measured.
//!
//! ```text
//! MeasuringTop -> MeasuringBottom -> [MeasuringMiddle] -> Done
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Config, OutputPolicy};
use crate::ring::HistoryRing;

/// Reference frequencies spanning the usable range of the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBounds {
    pub bottom: f32,
    pub top: f32,
    #[serde(default)]
    pub middle: Option<f32>,
}

impl CalibrationBounds {
    /// `0 < bottom < middle < top`, with the middle optional.
    pub fn is_valid(&self) -> bool {
        let ordered = match self.middle {
            Some(middle) => self.bottom < middle && middle < self.top,
            None => self.bottom < self.top,
        };
        self.bottom > 0.0 && self.top.is_finite() && ordered
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    MeasuringTop,
    MeasuringBottom,
    MeasuringMiddle,
    Done,
}

impl CalibrationPhase {
    /// What the player should do in this phase.
    pub fn prompt(&self) -> &'static str {
        match self {
            CalibrationPhase::MeasuringTop => "Play and hold the highest note",
            CalibrationPhase::MeasuringBottom => "Play and hold the lowest note",
            CalibrationPhase::MeasuringMiddle => "Play and hold the middle note",
            CalibrationPhase::Done => "Calibration complete",
        }
    }
}

/// Outcome of feeding one stabilized pitch to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    /// Nothing happened (silence while nothing was sounding, or already done).
    Idle,
    /// The note that was being measured stopped.
    Released,
    /// A reference was just learned and the note is still held; pitches are
    /// ignored until it is released.
    AwaitingRelease { phase: CalibrationPhase },
    Accumulating { phase: CalibrationPhase, collected: usize },
    /// A full run was too unsteady, or produced a reference out of order.
    Rejected { phase: CalibrationPhase },
    /// A reference frequency was learned and the machine moved on.
    Learned { phase: CalibrationPhase, frequency: f32 },
    /// The last reference was learned.
    Completed(CalibrationBounds),
}

#[derive(Debug, Clone)]
pub struct CalibrationState {
    phase: CalibrationPhase,
    samples: HistoryRing<f32>,
    tolerance: f32,
    enabled: bool,
    middle_enabled: bool,
    default_bounds: CalibrationBounds,
    bottom: f32,
    top: f32,
    middle: Option<f32>,
    sounding: bool,
    awaiting_release: bool,
}

impl CalibrationState {
    /// Starts measuring the top note, or starts `Done` with the configured
    /// default bounds when calibration is disabled. Only the position policy
    /// uses the bounds, so the note policy never calibrates.
    pub fn new(config: &Config) -> Self {
        let mut state = Self {
            phase: CalibrationPhase::MeasuringTop,
            samples: HistoryRing::new(config.calibration_sample_count),
            tolerance: config.calibration_tolerance_hz,
            enabled: config.calibration_enabled && config.output_policy == OutputPolicy::Position,
            middle_enabled: config.middle_tone_enabled,
            default_bounds: config.default_bounds,
            bottom: 0.0,
            top: 0.0,
            middle: None,
            sounding: false,
            awaiting_release: false,
        };
        state.restart();
        state
    }

    /// Discards everything learned and starts over.
    pub fn restart(&mut self) {
        self.samples.clear();
        self.sounding = false;
        self.awaiting_release = false;
        if self.enabled {
            self.phase = CalibrationPhase::MeasuringTop;
            self.bottom = 0.0;
            self.top = 0.0;
            self.middle = None;
        } else {
            self.phase = CalibrationPhase::Done;
            self.bottom = self.default_bounds.bottom;
            self.top = self.default_bounds.top;
            self.middle = self.default_bounds.middle.filter(|_| self.middle_enabled);
        }
    }

    /// Feeds one stabilized pitch (`0.0` for silence).
    pub fn observe(&mut self, pitch: f32) -> CalibrationEvent {
        if self.phase == CalibrationPhase::Done {
            return CalibrationEvent::Idle;
        }

        if pitch <= 0.0 {
            // Silence keeps the run; it only marks the end of a held note.
            self.awaiting_release = false;
            return if std::mem::take(&mut self.sounding) {
                CalibrationEvent::Released
            } else {
                CalibrationEvent::Idle
            };
        }
        self.sounding = true;
        if self.awaiting_release {
            return CalibrationEvent::AwaitingRelease { phase: self.phase };
        }

        self.samples.push(pitch);
        if !self.samples.is_full() {
            return CalibrationEvent::Accumulating {
                phase: self.phase,
                collected: self.samples.len(),
            };
        }

        let phase = self.phase;
        let consistent = self.samples.is_consistent(self.tolerance);
        let mean = self.samples.mean().unwrap_or(0.0);
        self.samples.clear();

        if !consistent {
            debug!(?phase, "Calibration run too unsteady, starting over");
            return CalibrationEvent::Rejected { phase };
        }
        if !self.fits_learned(phase, mean) {
            debug!(?phase, frequency = mean, "Calibration reference out of order, starting over");
            return CalibrationEvent::Rejected { phase };
        }

        match phase {
            CalibrationPhase::MeasuringTop => {
                self.top = mean;
                self.phase = CalibrationPhase::MeasuringBottom;
            }
            CalibrationPhase::MeasuringBottom => {
                self.bottom = mean;
                self.phase = if self.middle_enabled {
                    CalibrationPhase::MeasuringMiddle
                } else {
                    CalibrationPhase::Done
                };
            }
            CalibrationPhase::MeasuringMiddle => {
                self.middle = Some(mean);
                self.phase = CalibrationPhase::Done;
            }
            CalibrationPhase::Done => unreachable!("Done returns early"),
        }
        info!(?phase, frequency = mean, "Calibration reference learned");
        self.awaiting_release = true;

        match self.bounds() {
            Some(bounds) => {
                info!(bottom = bounds.bottom, top = bounds.top, middle = ?bounds.middle, "Calibration complete");
                CalibrationEvent::Completed(bounds)
            }
            None => CalibrationEvent::Learned { phase, frequency: mean },
        }
    }

    /// A new reference must keep `bottom < middle < top`.
    fn fits_learned(&self, phase: CalibrationPhase, frequency: f32) -> bool {
        match phase {
            CalibrationPhase::MeasuringTop => true,
            CalibrationPhase::MeasuringBottom => frequency < self.top,
            CalibrationPhase::MeasuringMiddle => self.bottom < frequency && frequency < self.top,
            CalibrationPhase::Done => false,
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == CalibrationPhase::Done
    }

    /// The frozen bounds once calibration is done.
    pub fn bounds(&self) -> Option<CalibrationBounds> {
        self.is_done().then_some(CalibrationBounds {
            bottom: self.bottom,
            top: self.top,
            middle: self.middle,
        })
    }

    /// Number of pitches collected in the current run.
    pub fn collected(&self) -> usize {
        self.samples.len()
    }
}

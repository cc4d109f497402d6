//! # Control Mapper
//!
//! Converts a stabilized pitch into the value an output adapter consumes:
//! either the nearest equal-tempered note, or a normalized position between
//! the calibration bounds. Positions are interpolated on a log-frequency axis
//! (optionally in two segments around a middle reference) so equal musical
//! intervals move the axis by equal amounts.

use crate::calibration::{CalibrationBounds, CalibrationState};
use crate::config::{Config, OutputPolicy, RangePolicy};
use crate::tuning::{self, Note};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlValue {
    /// No pitch this tick; adapters release whatever is active.
    Silence,
    /// Position policy before calibration is done: the stabilized pitch in Hz.
    Frequency(f32),
    /// Nearest note plus how far the pitch is from it.
    Note { note: Note, cents: f32 },
    /// Normalized position in [0, 1].
    Position { value: f32, in_range: bool },
    /// Outside the calibrated range with the `Suppress` range policy.
    OutOfRange,
}

#[derive(Debug, Clone)]
pub struct ControlMapper {
    policy: OutputPolicy,
    reference_hz: f32,
    range_policy: RangePolicy,
    margin_hz: f32,
    invert: bool,
}

impl ControlMapper {
    pub fn new(config: &Config) -> Self {
        Self {
            policy: config.output_policy,
            reference_hz: config.reference_pitch_hz,
            range_policy: config.range_policy,
            margin_hz: config.range_margin_hz,
            invert: config.invert_position,
        }
    }

    pub fn policy(&self) -> OutputPolicy {
        self.policy
    }

    /// Maps one stabilized pitch according to the configured policy.
    pub fn map(&self, pitch: f32, calibration: &CalibrationState) -> ControlValue {
        if !(pitch > 0.0) {
            return ControlValue::Silence;
        }
        match self.policy {
            OutputPolicy::Note => self.note(pitch),
            OutputPolicy::Position => match calibration.bounds() {
                Some(bounds) => self.position(pitch, &bounds),
                None => ControlValue::Frequency(pitch),
            },
        }
    }

    fn note(&self, pitch: f32) -> ControlValue {
        match tuning::find_nearest_note(pitch, self.reference_hz) {
            Some(note) => ControlValue::Note {
                note,
                cents: tuning::calculate_cents_deviation(pitch, note.frequency),
            },
            None => ControlValue::Silence,
        }
    }

    /// Position of `pitch` within `bounds`, honouring the range policy.
    pub fn position(&self, pitch: f32, bounds: &CalibrationBounds) -> ControlValue {
        let in_range =
            pitch >= bounds.bottom - self.margin_hz && pitch <= bounds.top + self.margin_hz;
        if !in_range && self.range_policy == RangePolicy::Suppress {
            return ControlValue::OutOfRange;
        }
        let mut value = normalized_position(pitch, bounds).clamp(0.0, 1.0);
        if self.invert {
            value = 1.0 - value;
        }
        ControlValue::Position { value, in_range }
    }
}

/// Unclamped log-frequency position of `pitch`: 0 at the bottom, 1 at the
/// top and 0.5 at the middle reference when there is one.
pub fn normalized_position(pitch: f32, bounds: &CalibrationBounds) -> f32 {
    let ln_pitch = pitch.ln();
    let ln_bottom = bounds.bottom.ln();
    let ln_top = bounds.top.ln();
    match bounds.middle {
        Some(middle) => {
            let ln_middle = middle.ln();
            if pitch < middle {
                0.5 * (ln_pitch - ln_bottom) / (ln_middle - ln_bottom)
            } else {
                0.5 + 0.5 * (ln_pitch - ln_middle) / (ln_top - ln_middle)
            }
        }
        None => (ln_pitch - ln_bottom) / (ln_top - ln_bottom),
    }
}

/// Note on/off messages derived from the per-tick control stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    On { note: u8, velocity: u8 },
    Off { note: u8 },
}

/// Turns a stream of per-tick note values into on/off transitions, so a held
/// note is sent once and a change of note releases the previous one first.
#[derive(Debug, Clone)]
pub struct NoteTracker {
    sounding: Option<u8>,
    velocity: u8,
}

impl NoteTracker {
    pub fn new(velocity: u8) -> Self {
        Self { sounding: None, velocity }
    }

    /// The note currently held, if any.
    pub fn sounding(&self) -> Option<u8> {
        self.sounding
    }

    pub fn update(&mut self, value: &ControlValue) -> Vec<NoteEvent> {
        let target = match value {
            ControlValue::Note { note, .. } => u8::try_from(note.midi()).ok().filter(|&n| n < 128),
            ControlValue::Silence | ControlValue::OutOfRange => None,
            ControlValue::Frequency(_) | ControlValue::Position { .. } => return Vec::new(),
        };
        if target == self.sounding {
            return Vec::new();
        }

        let mut events = Vec::with_capacity(2);
        if let Some(previous) = self.sounding {
            events.push(NoteEvent::Off { note: previous });
        }
        if let Some(note) = target {
            events.push(NoteEvent::On { note, velocity: self.velocity });
        }
        self.sounding = target;
        events
    }

    /// Releases the held note, e.g. when the stream stops.
    pub fn release(&mut self) -> Option<NoteEvent> {
        self.sounding.take().map(|note| NoteEvent::Off { note })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibrated(config: &Config) -> CalibrationState {
        CalibrationState::new(&Config { calibration_enabled: false, ..config.clone() })
    }

    fn position_value(value: ControlValue) -> f32 {
        match value {
            ControlValue::Position { value, .. } => value,
            other => panic!("expected a position, got {:?}", other),
        }
    }

    #[test]
    fn test_note_policy_round_trip() {
        let config = Config { output_policy: OutputPolicy::Note, ..Config::default() };
        let mapper = ControlMapper::new(&config);
        let calibration = CalibrationState::new(&config);
        for n in -24..=24 {
            let pitch = 440.0 * 2.0_f32.powf(n as f32 / 12.0);
            match mapper.map(pitch, &calibration) {
                ControlValue::Note { note, cents } => {
                    assert_eq!(note.midi(), n + 69);
                    assert!(cents.abs() < 0.1);
                }
                other => panic!("expected a note, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_silence() {
        let config = Config::default();
        let mapper = ControlMapper::new(&config);
        assert_eq!(mapper.map(0.0, &calibrated(&config)), ControlValue::Silence);
    }

    #[test]
    fn test_bypass_until_calibrated() {
        let config = Config::default();
        let mapper = ControlMapper::new(&config);
        let calibration = CalibrationState::new(&config);
        assert_eq!(mapper.map(500.0, &calibration), ControlValue::Frequency(500.0));
    }

    #[test]
    fn test_position_at_references() {
        let config = Config::default();
        let mapper = ControlMapper::new(&config);
        let calibration = calibrated(&config);
        assert!(position_value(mapper.map(170.0, &calibration)).abs() < 1e-6);
        assert!((position_value(mapper.map(290.0, &calibration)) - 0.5).abs() < 1e-6);
        assert!((position_value(mapper.map(860.0, &calibration)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_position_is_monotonic() {
        let config = Config::default();
        let mapper = ControlMapper::new(&config);
        let calibration = calibrated(&config);
        let mut previous = -1.0;
        for pitch in (170..=860).step_by(10) {
            let value = position_value(mapper.map(pitch as f32, &calibration));
            assert!(value > previous);
            previous = value;
        }
    }

    #[test]
    fn test_single_segment() {
        let bounds = CalibrationBounds { bottom: 200.0, top: 800.0, middle: None };
        // One octave up from the bottom of a two-octave range.
        assert!((normalized_position(400.0, &bounds) - 0.5).abs() < 1e-5);
        assert!(normalized_position(200.0, &bounds).abs() < 1e-6);
        assert!((normalized_position(800.0, &bounds) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_default_bounds_single_segment_without_middle() {
        let config = Config { middle_tone_enabled: false, ..Config::default() };
        let mapper = ControlMapper::new(&config);
        let calibration = calibrated(&config);
        // ln(290 / 170) / ln(860 / 170)
        let value = position_value(mapper.map(290.0, &calibration));
        assert!((value - 0.3295).abs() < 1e-3, "position {}", value);
    }

    #[test]
    fn test_out_of_range_clamps() {
        let config = Config::default();
        let mapper = ControlMapper::new(&config);
        let calibration = calibrated(&config);
        assert_eq!(
            mapper.map(100.0, &calibration),
            ControlValue::Position { value: 0.0, in_range: false }
        );
        assert_eq!(
            mapper.map(1200.0, &calibration),
            ControlValue::Position { value: 1.0, in_range: false }
        );
        // Inside the margin: clamped but still in range.
        assert_eq!(
            mapper.map(160.0, &calibration),
            ControlValue::Position { value: 0.0, in_range: true }
        );
    }

    #[test]
    fn test_out_of_range_suppressed() {
        let config = Config { range_policy: RangePolicy::Suppress, ..Config::default() };
        let mapper = ControlMapper::new(&config);
        let calibration = calibrated(&config);
        assert_eq!(mapper.map(100.0, &calibration), ControlValue::OutOfRange);
        assert!(matches!(mapper.map(500.0, &calibration), ControlValue::Position { in_range: true, .. }));
    }

    #[test]
    fn test_inverted_axis() {
        let config = Config { invert_position: true, ..Config::default() };
        let mapper = ControlMapper::new(&config);
        let calibration = calibrated(&config);
        assert!((position_value(mapper.map(170.0, &calibration)) - 1.0).abs() < 1e-6);
        assert!(position_value(mapper.map(860.0, &calibration)).abs() < 1e-6);
    }

    fn note_value(midi: i32) -> ControlValue {
        ControlValue::Note {
            note: Note { index: midi - 69, frequency: 0.0 },
            cents: 0.0,
        }
    }

    #[test]
    fn test_note_tracker_transitions() {
        let mut tracker = NoteTracker::new(127);
        assert_eq!(tracker.update(&note_value(69)), vec![NoteEvent::On { note: 69, velocity: 127 }]);
        assert!(tracker.update(&note_value(69)).is_empty());
        assert_eq!(
            tracker.update(&note_value(71)),
            vec![NoteEvent::Off { note: 69 }, NoteEvent::On { note: 71, velocity: 127 }]
        );
        assert_eq!(tracker.update(&ControlValue::Silence), vec![NoteEvent::Off { note: 71 }]);
        assert!(tracker.update(&ControlValue::Silence).is_empty());
        assert_eq!(tracker.sounding(), None);
    }

    #[test]
    fn test_note_tracker_release() {
        let mut tracker = NoteTracker::new(100);
        tracker.update(&note_value(60));
        assert_eq!(tracker.release(), Some(NoteEvent::Off { note: 60 }));
        assert_eq!(tracker.release(), None);
    }

    #[test]
    fn test_note_tracker_ignores_out_of_midi_range() {
        let mut tracker = NoteTracker::new(127);
        assert!(tracker.update(&note_value(200)).is_empty());
        assert_eq!(tracker.sounding(), None);
    }
}

//! Logging output adapter.
//!
//! Stands in for a MIDI or motor backend: note policy ticks become note
//! on/off messages, position ticks are reported when they move, and the
//! calibration prompts are shown once the previous note is released.

use otama_core::tuning::Note;
use otama_core::{CalibrationEvent, CalibrationPhase, ControlValue, NoteEvent, NoteTracker, TickOutput};
use tracing::{debug, info};

/// Smallest position change worth reporting.
const POSITION_STEP: f32 = 0.01;

pub(crate) struct LogSink {
    tracker: NoteTracker,
    prompted: bool,
    last_position: Option<f32>,
}

impl LogSink {
    pub fn new(velocity: u8) -> Self {
        Self {
            tracker: NoteTracker::new(velocity),
            prompted: false,
            last_position: None,
        }
    }

    pub fn handle(&mut self, tick: &TickOutput) {
        self.calibration(tick);

        match tick.control {
            ControlValue::Note { note, cents } => {
                for event in self.tracker.update(&tick.control) {
                    log_note_event(event, Some((note, cents)));
                }
            }
            ControlValue::Position { value, in_range } => {
                let moved = self
                    .last_position
                    .is_none_or(|last| (last - value).abs() >= POSITION_STEP);
                if moved {
                    info!(position = value, in_range, pitch = tick.pitch, "Position");
                    self.last_position = Some(value);
                }
            }
            ControlValue::Frequency(hz) => debug!(pitch = hz, "Calibrating"),
            ControlValue::Silence | ControlValue::OutOfRange => {
                for event in self.tracker.update(&tick.control) {
                    log_note_event(event, None);
                }
                if self.last_position.take().is_some() {
                    info!("Released");
                }
            }
        }
    }

    fn calibration(&mut self, tick: &TickOutput) {
        if !std::mem::replace(&mut self.prompted, true) && tick.phase != CalibrationPhase::Done {
            info!("{}", tick.phase.prompt());
        }

        match &tick.calibration {
            CalibrationEvent::Learned { phase, frequency } => {
                info!(?phase, frequency, "Reference learned, release the note");
            }
            CalibrationEvent::Released if tick.phase != CalibrationPhase::Done => {
                info!("{}", tick.phase.prompt());
            }
            CalibrationEvent::Completed(bounds) => {
                info!(bottom = bounds.bottom, top = bounds.top, middle = ?bounds.middle, "Calibrated");
            }
            CalibrationEvent::Rejected { phase } => {
                info!(?phase, "Note too unsteady, hold it again");
            }
            CalibrationEvent::Accumulating { collected, .. } => debug!(collected, "Measuring"),
            CalibrationEvent::AwaitingRelease { .. } => debug!("Waiting for release"),
            CalibrationEvent::Idle | CalibrationEvent::Released => {}
        }
    }

    /// Releases whatever note is still held.
    pub fn finish(&mut self) {
        if let Some(event) = self.tracker.release() {
            log_note_event(event, None);
        }
    }
}

fn log_note_event(event: NoteEvent, current: Option<(Note, f32)>) {
    match event {
        NoteEvent::On { note, velocity } => {
            let (name, cents) = current
                .map(|(n, c)| (n.name().unwrap_or("?"), c))
                .unwrap_or(("?", 0.0));
            info!(note, name, velocity, cents, "Note on");
        }
        NoteEvent::Off { note } => info!(note, "Note off"),
    }
}

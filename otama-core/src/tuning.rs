//! # Musical Tuning Module
//!
//! Equal-temperament helpers for the note output policy: nearest note for a
//! frequency, MIDI numbering, note names with octave, and cent deviation.
//!
//! ## Conventions
//! - Note index 0 is the reference pitch (A4, 440 Hz by default)
//! - MIDI number = index + 69
//! - The name cycles every 12 semitones starting at A; the octave changes at C

use once_cell::sync::Lazy;

/// Pitch class names, starting at the reference pitch class A.
pub const NOTE_NAMES: [&str; 12] = [
    "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
];

/// MIDI note number of the reference pitch.
pub const REFERENCE_MIDI_NOTE: i32 = 69;

/// Names with octave for the full MIDI range (0 = C-1 ... 127 = G9).
///
/// Precomputed once so naming a note on the audio thread never allocates.
static MIDI_NOTE_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
    (0..128)
        .map(|midi| {
            let index = midi - REFERENCE_MIDI_NOTE;
            format!("{}{}", pitch_class_name(index), octave_of(index))
        })
        .collect()
});

/// A note of the 12-tone equal-tempered scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    /// Semitones above (or below) the reference pitch.
    pub index: i32,
    /// Equal-tempered frequency of the note in Hz.
    pub frequency: f32,
}

impl Note {
    pub fn midi(&self) -> i32 {
        self.index + REFERENCE_MIDI_NOTE
    }

    /// Pitch class without octave, e.g. "C#".
    pub fn pitch_class(&self) -> &'static str {
        pitch_class_name(self.index)
    }

    pub fn octave(&self) -> i32 {
        octave_of(self.index)
    }

    /// Full name such as "A4", available for notes inside the MIDI range.
    pub fn name(&self) -> Option<&'static str> {
        usize::try_from(self.midi())
            .ok()
            .and_then(|midi| MIDI_NOTE_NAMES.get(midi))
            .map(String::as_str)
    }
}

fn pitch_class_name(index: i32) -> &'static str {
    NOTE_NAMES[index.rem_euclid(12) as usize]
}

fn octave_of(index: i32) -> i32 {
    4 + (index + 9).div_euclid(12)
}

/// Frequency of the note `index` semitones away from `reference_hz`.
pub fn note_frequency(index: i32, reference_hz: f32) -> f32 {
    reference_hz * 2.0_f32.powf(index as f32 / 12.0)
}

/// Finds the equal-tempered note closest to `freq`.
///
/// # Arguments
/// * `freq` - Frequency in Hz
/// * `reference_hz` - Frequency of note index 0
///
/// # Returns
/// * `Some(note)` - The closest note
/// * `None` - For silence (`freq <= 0`) or non-finite input
pub fn find_nearest_note(freq: f32, reference_hz: f32) -> Option<Note> {
    if !(freq.is_finite() && freq > 0.0) {
        return None;
    }
    let index = (12.0 * (freq / reference_hz).log2()).round() as i32;
    Some(Note {
        index,
        frequency: note_frequency(index, reference_hz),
    })
}

/// Calculates the deviation from a target frequency in cents.
///
/// 100 cents make a semitone; positive values are sharp, negative flat.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

// otama-core/src/lib.rs

//! The core logic for turning a monophonic instrument into a controller.
//! This crate is responsible for framing the audio, harmonic pitch
//! detection, calibration of the playable range and mapping pitch to note
//! or position control values. It is completely headless; output adapters
//! live in the binary.

pub mod audio;
pub mod calibration;
pub mod config;
pub mod error;
pub mod fft;
pub mod frame;
pub mod mapper;
pub mod pitch;
pub mod processor;
pub mod ring;
pub mod session;
pub mod stabilizer;
pub mod tuning;

pub use audio::AudioEvent;
pub use calibration::{CalibrationBounds, CalibrationEvent, CalibrationPhase, CalibrationState};
pub use config::{Config, JitterPolicy, OutputPolicy, RangePolicy};
pub use error::{ConfigError, SessionError};
pub use mapper::{ControlMapper, ControlValue, NoteEvent, NoteTracker};
pub use processor::{PitchProcessor, TickOutput};
pub use session::Session;

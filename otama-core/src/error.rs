//! # Error Types
//!
//! Configuration problems are fatal and surface at startup. Everything that can
//! go wrong while audio is flowing is handled locally by the stage that sees it
//! (a silent pitch, a dropped tick, a discarded calibration run), so the only
//! runtime error type belongs to the session supervisor.

use thiserror::Error;

/// Errors raised while loading or validating a [`crate::config::Config`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Sample rate must be greater than 0")]
    ZeroSampleRate,
    #[error("Window size must be greater than 0")]
    ZeroWindowSize,
    #[error("Step size must be greater than 0")]
    ZeroStepSize,
    #[error("Step size {step} must not exceed window size {window}")]
    StepExceedsWindow { step: usize, window: usize },
    #[error("Window size {window} leaves no spectrum above the hum cutoff at {sample_rate} Hz")]
    WindowTooSmall { window: usize, sample_rate: u32 },
    #[error("Harmonic count must be greater than 0")]
    ZeroHarmonics,
    #[error("{name} must be greater than 0")]
    ZeroCapacity { name: &'static str },
    #[error("{name} = {value} is invalid, expected {expected}")]
    InvalidParameter {
        name: &'static str,
        value: f32,
        expected: &'static str,
    },
    #[error("Default bounds must satisfy 0 < bottom < middle < top (got {bottom}/{middle:?}/{top})")]
    InvalidBounds {
        bottom: f32,
        middle: Option<f32>,
        top: f32,
    },
}

/// Errors raised by [`crate::session::Session`].
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Session is already running")]
    AlreadyRunning,
    #[error("Session is not running")]
    NotRunning,
    #[error("Processing thread panicked")]
    WorkerPanicked,
}

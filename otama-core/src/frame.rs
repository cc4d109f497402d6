//! # Frame Buffer
//!
//! Keeps the sliding analysis window. Every tick the oldest `step` samples are
//! dropped and the incoming block is appended, so the window always holds
//! exactly `window_size` samples and consecutive windows overlap by
//! `window_size - step` samples.

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct FrameBuffer {
    window: Vec<f32>,
    step: usize,
}

impl FrameBuffer {
    /// Creates a zero-filled window.
    ///
    /// # Panics
    /// * If `window_size` or `step` is 0
    /// * If `step` is greater than `window_size`
    pub fn new(window_size: usize, step: usize) -> Self {
        if window_size == 0 {
            panic!("Window size must be greater than 0")
        }
        if step == 0 {
            panic!("Step size must be greater than 0")
        }
        if step > window_size {
            panic!("Step size must not be greater than window size")
        }
        Self {
            window: vec![0.0; window_size],
            step,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.window_size, config.step_size)
    }

    /// Shifts the window left by one block and appends `block`.
    ///
    /// # Arguments
    /// * `block` - Exactly `step_size` new samples
    ///
    /// # Returns
    /// * The updated window, oldest sample first
    ///
    /// # Panics
    /// * If the block length differs from the step size. Callers feeding
    ///   blocks from an audio device check the length first.
    pub fn push(&mut self, block: &[f32]) -> &[f32] {
        assert_eq!(block.len(), self.step, "Block length must equal the step size");
        let keep = self.window.len() - self.step;
        self.window.copy_within(self.step.., 0);
        self.window[keep..].copy_from_slice(block);
        &self.window
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    pub fn step_size(&self) -> usize {
        self.step
    }

    /// Zeroes the window so a restarted stream does not see stale audio.
    pub fn reset(&mut self) {
        self.window.fill(0.0);
    }
}

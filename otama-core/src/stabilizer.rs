//! # Pitch Stabilizer
//!
//! Single-frame HPS estimates jitter from tick to tick. The stabilizer keeps
//! the last few non-silent estimates and only passes the newest one through
//! when its neighbours agree within a tolerance; otherwise it falls back to
//! the configured jitter policy.

use crate::config::{Config, JitterPolicy};
use crate::ring::HistoryRing;

#[derive(Debug, Clone)]
pub struct Stabilizer {
    history: HistoryRing<f32>,
    tolerance: f32,
    policy: JitterPolicy,
    warmup_ticks: usize,
    /// Onset ticks discarded since the last silence.
    warmup_count: usize,
}

impl Stabilizer {
    pub fn new(config: &Config) -> Self {
        Self {
            history: HistoryRing::new(config.history_capacity),
            tolerance: config.stabilizer_tolerance_hz,
            policy: config.jitter_policy,
            warmup_ticks: config.warmup_ticks,
            warmup_count: 0,
        }
    }

    /// Folds one raw estimate into the history and returns the stabilized pitch.
    ///
    /// # Arguments
    /// * `raw` - Detector output in Hz, `0.0` for silence
    ///
    /// # Returns
    /// * `0.0` on silence or during the onset warm-up
    /// * The newest estimate when the history is consistent
    /// * Otherwise the maximum (or median) of the history
    pub fn stabilize(&mut self, raw: f32) -> f32 {
        if raw <= 0.0 {
            self.reset();
            return 0.0;
        }

        if self.history.is_empty() && self.warmup_count < self.warmup_ticks {
            self.warmup_count += 1;
            return 0.0;
        }

        self.history.push(raw);
        if self.history.is_consistent(self.tolerance) {
            return raw;
        }
        let fallback = match self.policy {
            JitterPolicy::Max => self.history.max(),
            JitterPolicy::Median => self.history.median(),
        };
        fallback.unwrap_or(raw)
    }

    /// Recent raw estimates, oldest first.
    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Forgets the history and restarts the warm-up.
    pub fn reset(&mut self) {
        self.history.clear();
        self.warmup_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(stabilizer: &mut Stabilizer, raw: &[f32]) -> Vec<f32> {
        raw.iter().map(|&r| stabilizer.stabilize(r)).collect()
    }

    #[test]
    fn test_steady_pitch_passes_through() {
        let mut stabilizer = Stabilizer::new(&Config::default());
        assert_eq!(feed(&mut stabilizer, &[440.0; 5]), vec![440.0; 5]);
    }

    #[test]
    fn test_small_drift_follows_newest() {
        let mut stabilizer = Stabilizer::new(&Config::default());
        assert_eq!(feed(&mut stabilizer, &[440.0, 441.0, 442.5]), vec![440.0, 441.0, 442.5]);
    }

    #[test]
    fn test_jump_reports_history_max() {
        let mut stabilizer = Stabilizer::new(&Config::default());
        let out = feed(&mut stabilizer, &[440.0, 441.0, 500.0]);
        assert_eq!(out[2], 500.0);

        // A momentary drop is suppressed in favour of the higher neighbours.
        let out = feed(&mut stabilizer, &[300.0]);
        assert_eq!(out[0], 500.0);
        assert_eq!(stabilizer.history().collect::<Vec<f32>>(), vec![441.0, 500.0, 300.0]);
    }

    #[test]
    fn test_median_policy() {
        let config = Config { jitter_policy: JitterPolicy::Median, ..Config::default() };
        let mut stabilizer = Stabilizer::new(&config);
        let out = feed(&mut stabilizer, &[440.0, 441.0, 500.0]);
        assert_eq!(out[2], 441.0);
    }

    #[test]
    fn test_silence_clears_history() {
        let mut stabilizer = Stabilizer::new(&Config::default());
        feed(&mut stabilizer, &[440.0, 441.0]);
        assert_eq!(stabilizer.stabilize(0.0), 0.0);
        assert!(stabilizer.is_empty());
        // The old history no longer drags the output up.
        assert_eq!(stabilizer.stabilize(300.0), 300.0);
    }

    #[test]
    fn test_warmup_discards_onset() {
        let config = Config { warmup_ticks: 2, ..Config::default() };
        let mut stabilizer = Stabilizer::new(&config);
        assert_eq!(feed(&mut stabilizer, &[440.0, 440.0, 440.0, 440.0]), vec![0.0, 0.0, 440.0, 440.0]);

        // Silence restarts the warm-up.
        stabilizer.stabilize(0.0);
        assert_eq!(feed(&mut stabilizer, &[440.0, 440.0, 440.0]), vec![0.0, 0.0, 440.0]);
    }
}

//! Synthetic multi-row board with bounded sample history

use crate::patterns::RowPattern;
use eeg_core::{config_error, EegError, EegResult, SampleSource};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::debug;

/// Configuration for the synthetic board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// History kept per row, in seconds
    pub history_seconds: f64,
    /// Mains frequency injected into EEG rows, `None` for a clean board
    pub line_frequency: Option<f64>,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
    /// One pattern per board row
    pub rows: Vec<RowPattern>,
}

impl SyntheticConfig {
    /// Samples kept per row
    pub fn capacity(&self) -> usize {
        (self.sampling_rate * self.history_seconds).ceil() as usize
    }

    pub fn validate(&self) -> EegResult<()> {
        if !self.sampling_rate.is_finite() || self.sampling_rate <= 0.0 {
            return Err(EegError::InvalidSamplingRate {
                rate: self.sampling_rate,
                valid_range: ">0Hz",
            });
        }
        if self.rows.is_empty() {
            return Err(config_error!("synthetic board needs at least one row"));
        }
        if self.capacity() == 0 {
            return Err(config_error!("history of {}s holds no samples", self.history_seconds));
        }
        Ok(())
    }
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 512.0,
            history_seconds: 10.0,
            line_frequency: Some(50.0),
            seed: None,
            rows: RowPattern::standard_rows(),
        }
    }
}

/// In-memory board generating samples on demand
pub struct SyntheticBoard {
    config: SyntheticConfig,
    rng: StdRng,
    white: Normal<f64>,
    history: Vec<VecDeque<f64>>,
    /// Leaky integrator state per row
    background: Vec<f64>,
    samples_generated: u64,
    last_tick: Option<Instant>,
    /// Fractional sample carried between ticks
    pending: f64,
}

impl SyntheticBoard {
    const BACKGROUND_LEAK: f64 = 0.98;

    pub fn new(config: SyntheticConfig) -> EegResult<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let white = Normal::new(0.0, 1.0).map_err(|e| EegError::ConfigurationError {
            message: format!("Failed to create normal distribution: {}", e),
        })?;

        let capacity = config.capacity();
        let rows = config.rows.len();

        Ok(SyntheticBoard {
            history: (0..rows).map(|_| VecDeque::with_capacity(capacity)).collect(),
            background: vec![0.0; rows],
            config,
            rng,
            white,
            samples_generated: 0,
            last_tick: None,
            pending: 0.0,
        })
    }

    /// Generate `samples` new samples on every row
    pub fn advance(&mut self, samples: usize) {
        let capacity = self.config.capacity();
        let dt = 1.0 / self.config.sampling_rate;

        for _ in 0..samples {
            let index = self.samples_generated;
            let time = index as f64 * dt;

            for (row, pattern) in self.config.rows.iter().enumerate() {
                let mut value = pattern.deterministic_at(time, index, self.config.line_frequency);

                if let RowPattern::Eeg(profile) = pattern {
                    let white = self.white.sample(&mut self.rng);
                    let state = &mut self.background[row];
                    *state = Self::BACKGROUND_LEAK * *state + white;
                    value += profile.background_gain * *state
                        + profile.noise_std * self.white.sample(&mut self.rng);
                }

                let history = &mut self.history[row];
                if history.len() == capacity {
                    history.pop_front();
                }
                history.push_back(value);
            }

            self.samples_generated += 1;
        }
    }

    /// Generate samples for the wall-clock time since the previous call
    pub fn advance_to(&mut self, now: Instant) {
        let Some(last) = self.last_tick.replace(now) else {
            return;
        };

        let due = now.saturating_duration_since(last).as_secs_f64() * self.config.sampling_rate
            + self.pending;
        let whole = due.floor();
        self.pending = due - whole;

        let capacity = self.config.capacity();
        let mut samples = whole as usize;
        if samples > capacity {
            debug!(samples, capacity, "tick gap exceeds history, older samples dropped");
            samples = capacity;
        }
        self.advance(samples);
    }

    /// Samples currently held for `row`
    pub fn available(&self, row: usize) -> usize {
        self.history.get(row).map_or(0, VecDeque::len)
    }

    pub fn row_count(&self) -> usize {
        self.history.len()
    }

    pub fn samples_generated(&self) -> u64 {
        self.samples_generated
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }
}

impl SampleSource for SyntheticBoard {
    fn begin_tick(&mut self) -> EegResult<()> {
        self.advance_to(Instant::now());
        Ok(())
    }

    fn latest_window(&mut self, row: usize, len: usize) -> EegResult<Vec<f64>> {
        let history = self.history.get(row).ok_or_else(|| EegError::AcquisitionError {
            row,
            reason: format!("board has {} rows", self.history.len()),
        })?;

        let start = history.len().saturating_sub(len);
        Ok(history.range(start..).copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn seeded(rows: Vec<RowPattern>) -> SyntheticBoard {
        SyntheticBoard::new(SyntheticConfig {
            seed: Some(7),
            history_seconds: 2.0,
            rows,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(SyntheticConfig::default().validate().is_ok());

        let no_rows = SyntheticConfig {
            rows: Vec::new(),
            ..Default::default()
        };
        assert!(SyntheticBoard::new(no_rows).is_err());

        let bad_rate = SyntheticConfig {
            sampling_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(bad_rate.validate(), Err(EegError::InvalidSamplingRate { .. })));
    }

    #[test]
    fn test_seeded_boards_agree() {
        let mut a = seeded(RowPattern::standard_rows());
        let mut b = seeded(RowPattern::standard_rows());
        a.advance(300);
        b.advance(300);

        for row in 0..a.row_count() {
            assert_eq!(a.latest_window(row, 300).unwrap(), b.latest_window(row, 300).unwrap());
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut board = seeded(vec![RowPattern::Counter]);
        board.advance(1500);

        assert_eq!(board.available(0), 1024);
        let window = board.latest_window(0, 4).unwrap();
        assert_eq!(window, vec![1496.0, 1497.0, 1498.0, 1499.0]);
    }

    #[test]
    fn test_short_history_gives_short_window() {
        let mut board = seeded(vec![RowPattern::Counter]);
        board.advance(10);
        assert_eq!(board.latest_window(0, 2048).unwrap().len(), 10);
    }

    #[test]
    fn test_flat_row_is_flat() {
        let mut board = seeded(vec![RowPattern::Counter, RowPattern::Flat { level: 2.5 }]);
        board.advance(64);
        assert!(board.latest_window(1, 64).unwrap().iter().all(|&x| x == 2.5));
    }

    #[test]
    fn test_unknown_row_is_an_error() {
        let mut board = seeded(vec![RowPattern::Counter]);
        assert!(matches!(
            board.latest_window(3, 10),
            Err(EegError::AcquisitionError { row: 3, .. })
        ));
    }

    #[test]
    fn test_advance_to_follows_elapsed_time() {
        let mut board = seeded(vec![RowPattern::Counter]);
        let start = Instant::now();

        board.advance_to(start);
        assert_eq!(board.samples_generated(), 0);

        board.advance_to(start + Duration::from_millis(250));
        assert_eq!(board.samples_generated(), 128);

        // a long stall only refills the history
        board.advance_to(start + Duration::from_secs(60));
        assert_eq!(board.samples_generated(), 128 + 1024);
    }

    #[test]
    fn test_eeg_row_carries_alpha() {
        let mut board = seeded(vec![RowPattern::Eeg(Default::default())]);
        board.advance(1024);
        let window = board.latest_window(0, 1024).unwrap();

        let mean = window.iter().sum::<f64>() / window.len() as f64;
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / window.len() as f64;
        // 20 uV alpha alone contributes 200 uV^2
        assert!(variance > 150.0, "variance {}", variance);
    }
}

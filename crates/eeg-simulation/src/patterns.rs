//! Per-row signal content for the synthetic board

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Parameters of an EEG-like row, amplitudes in microvolts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EegProfile {
    pub alpha_frequency: f64,
    pub alpha_amplitude: f64,
    /// Standard deviation of the white component
    pub noise_std: f64,
    /// Scale of the leaky-integrated (1/f-like) background
    pub background_gain: f64,
    /// Mains interference amplitude
    pub line_amplitude: f64,
    pub dc_offset: f64,
}

impl Default for EegProfile {
    fn default() -> Self {
        EegProfile {
            alpha_frequency: 10.0,
            alpha_amplitude: 20.0,
            noise_std: 3.0,
            background_gain: 1.5,
            line_amplitude: 8.0,
            dc_offset: 0.0,
        }
    }
}

/// What a single board row produces
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowPattern {
    /// Monotonic sample counter, like a package number row
    Counter,
    /// Constant level, models a disconnected electrode
    Flat { level: f64 },
    /// Pure tone plus offset
    Sinusoid { frequency: f64, amplitude: f64, offset: f64 },
    Eeg(EegProfile),
}

impl RowPattern {
    /// Deterministic part of the row at `time` seconds for sample `index`.
    ///
    /// Random components are added by the board.
    pub fn deterministic_at(&self, time: f64, index: u64, line_frequency: Option<f64>) -> f64 {
        match self {
            RowPattern::Counter => index as f64,
            RowPattern::Flat { level } => *level,
            RowPattern::Sinusoid { frequency, amplitude, offset } => {
                offset + amplitude * (2.0 * PI * frequency * time).sin()
            }
            RowPattern::Eeg(profile) => {
                let alpha = profile.alpha_amplitude * (2.0 * PI * profile.alpha_frequency * time).sin();
                let line = line_frequency
                    .map_or(0.0, |f| profile.line_amplitude * (2.0 * PI * f * time).sin());
                profile.dc_offset + alpha + line
            }
        }
    }

    /// Whether the board adds noise to this row
    pub fn is_noisy(&self) -> bool {
        matches!(self, RowPattern::Eeg(_))
    }

    pub fn description(&self) -> &'static str {
        match self {
            RowPattern::Counter => "Sample counter",
            RowPattern::Flat { .. } => "Flat line",
            RowPattern::Sinusoid { .. } => "Pure tone",
            RowPattern::Eeg(_) => "EEG-like",
        }
    }

    /// Counter row followed by eight EEG rows with staggered alpha peaks
    pub fn standard_rows() -> Vec<RowPattern> {
        let mut rows = vec![RowPattern::Counter];
        rows.extend((0..8).map(|i| {
            RowPattern::Eeg(EegProfile {
                alpha_frequency: 9.0 + 0.25 * i as f64,
                alpha_amplitude: 15.0 + 2.0 * i as f64,
                dc_offset: 5.0 * i as f64,
                ..EegProfile::default()
            })
        }));
        rows
    }
}

//! Spectral data types: PSD estimates and canonical EEG bands

use core::fmt;
use serde::{Deserialize, Serialize};
use crate::error::{EegError, EegResult};

/// One-sided power spectral density for one channel and one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralEstimate {
    frequencies: Vec<f64>,
    powers: Vec<f64>,
}

impl SpectralEstimate {
    /// Pair ascending frequency bins with their power values
    pub fn new(frequencies: Vec<f64>, powers: Vec<f64>) -> EegResult<Self> {
        if frequencies.len() != powers.len() {
            return Err(EegError::InvalidSpectrum {
                reason: format!(
                    "{} frequency bins but {} power values",
                    frequencies.len(),
                    powers.len()
                ),
            });
        }
        if frequencies.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(EegError::InvalidSpectrum {
                reason: "frequency bins must be strictly ascending".to_string(),
            });
        }

        Ok(SpectralEstimate { frequencies, powers })
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn powers(&self) -> &[f64] {
        &self.powers
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Frequency spacing between adjacent bins, 0 for fewer than two bins
    pub fn resolution(&self) -> f64 {
        match self.frequencies.as_slice() {
            [first, second, ..] => second - first,
            _ => 0.0,
        }
    }

    /// Iterate `(frequency, power)` pairs
    pub fn bins(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.frequencies.iter().copied().zip(self.powers.iter().copied())
    }

    /// Copy of the first `bins` bins, used for display
    pub fn truncated(&self, bins: usize) -> SpectralEstimate {
        let keep = bins.min(self.len());
        SpectralEstimate {
            frequencies: self.frequencies[..keep].to_vec(),
            powers: self.powers[..keep].to_vec(),
        }
    }
}

/// Canonical EEG frequency bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Delta,
    Theta,
    Alpha,
    Beta,
    HighBeta,
    Gamma,
    HighGamma,
}

impl Band {
    pub const COUNT: usize = 7;

    /// Bands in ascending frequency order
    pub const ALL: [Band; Band::COUNT] = [
        Band::Delta,
        Band::Theta,
        Band::Alpha,
        Band::Beta,
        Band::HighBeta,
        Band::Gamma,
        Band::HighGamma,
    ];

    /// Inclusive frequency range in Hz
    pub fn range(&self) -> (f64, f64) {
        match self {
            Band::Delta => (1.0, 4.0),
            Band::Theta => (4.0, 8.0),
            Band::Alpha => (8.0, 13.0),
            Band::Beta => (13.0, 20.0),
            Band::HighBeta => (20.0, 30.0),
            Band::Gamma => (30.0, 60.0),
            Band::HighGamma => (60.0, 100.0),
        }
    }

    /// Short symbol used in status lines
    pub fn symbol(&self) -> &'static str {
        match self {
            Band::Delta => "\u{3b4}",
            Band::Theta => "\u{3b8}",
            Band::Alpha => "\u{3b1}",
            Band::Beta => "\u{3b2}",
            Band::HighBeta => "h-\u{3b2}",
            Band::Gamma => "\u{3b3}",
            Band::HighGamma => "h-\u{3b3}",
        }
    }

    pub fn position(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Band::Delta => "Delta",
            Band::Theta => "Theta",
            Band::Alpha => "Alpha",
            Band::Beta => "Beta",
            Band::HighBeta => "High Beta",
            Band::Gamma => "Gamma",
            Band::HighGamma => "High Gamma",
        };
        let (low, high) = self.range();
        write!(f, "{} ({}-{} Hz)", name, low, high)
    }
}

/// Integrated power for each canonical band
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandPowers {
    values: [f64; Band::COUNT],
}

impl BandPowers {
    pub fn from_values(values: [f64; Band::COUNT]) -> Self {
        BandPowers { values }
    }

    pub fn get(&self, band: Band) -> f64 {
        self.values[band.position()]
    }

    pub fn set(&mut self, band: Band, power: f64) {
        self.values[band.position()] = power;
    }

    pub fn values(&self) -> &[f64; Band::COUNT] {
        &self.values
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Band, f64)> + '_ {
        Band::ALL.iter().copied().zip(self.values.iter().copied())
    }
}

impl core::ops::AddAssign<&BandPowers> for BandPowers {
    fn add_assign(&mut self, other: &BandPowers) {
        for (total, value) in self.values.iter_mut().zip(other.values.iter()) {
            *total += value;
        }
    }
}

//! Signal quality classification
//!
//! Metrics are computed once per window; labels come from ordered rule
//! tables where the first matching predicate wins.

use crate::spectral::{band_powers, EPSILON};
use eeg_core::{
    Band, FrequencyDomainLabel, FrequencyDomainMetrics, QualityAssessment, SpectralEstimate,
    TimeDomainLabel, TimeDomainMetrics,
};
use serde::{Deserialize, Serialize};

/// Thresholds used by the rule tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Peak-to-peak below this is flat
    pub flat_peak_to_peak: f64,
    /// Flatness ratio above this is flat
    pub flat_ratio: f64,
    /// Consecutive differences below this count as flat steps
    pub flat_step: f64,
    pub noisy_peak_to_peak: f64,
    pub high_rms: f64,
    pub spiky_kurtosis: f64,
    /// Half width of the line-noise band around the line frequency
    pub line_tolerance: f64,
    /// Reference band the line noise is compared against
    pub reference_band: (f64, f64),
    /// Entropy above this is too flat a spectrum for EEG
    pub max_eeg_entropy: f64,
    /// Entropy below this is too peaky a spectrum for EEG
    pub min_eeg_entropy: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        QualityThresholds {
            flat_peak_to_peak: 10.0,
            flat_ratio: 0.95,
            flat_step: 3.0,
            noisy_peak_to_peak: 1000.0,
            high_rms: 100.0,
            spiky_kurtosis: 10.0,
            line_tolerance: 1.0,
            reference_band: (1.0, 45.0),
            max_eeg_entropy: 4.8,
            min_eeg_entropy: 2.5,
        }
    }
}

struct TimeRule {
    label: TimeDomainLabel,
    matches: fn(&TimeDomainMetrics, &QualityThresholds) -> bool,
}

struct FrequencyRule {
    label: FrequencyDomainLabel,
    matches: fn(&FrequencyDomainMetrics, &QualityThresholds) -> bool,
}

fn is_flat(m: &TimeDomainMetrics, t: &QualityThresholds) -> bool {
    m.peak_to_peak < t.flat_peak_to_peak || m.flatness > t.flat_ratio
}

fn is_noisy(m: &TimeDomainMetrics, t: &QualityThresholds) -> bool {
    m.peak_to_peak > t.noisy_peak_to_peak
}

fn is_high_rms(m: &TimeDomainMetrics, t: &QualityThresholds) -> bool {
    m.rms > t.high_rms
}

fn is_spiky(m: &TimeDomainMetrics, t: &QualityThresholds) -> bool {
    m.kurtosis > t.spiky_kurtosis
}

fn looks_like_eeg(m: &FrequencyDomainMetrics, t: &QualityThresholds) -> bool {
    m.spectral_entropy > t.min_eeg_entropy && m.spectral_entropy < t.max_eeg_entropy
}

fn looks_like_noise(m: &FrequencyDomainMetrics, t: &QualityThresholds) -> bool {
    m.spectral_entropy > t.max_eeg_entropy
}

static TIME_RULES: [TimeRule; 4] = [
    TimeRule { label: TimeDomainLabel::Flat, matches: is_flat },
    TimeRule { label: TimeDomainLabel::Noisy, matches: is_noisy },
    TimeRule { label: TimeDomainLabel::HighRms, matches: is_high_rms },
    TimeRule { label: TimeDomainLabel::Spiky, matches: is_spiky },
];

static FREQUENCY_RULES: [FrequencyRule; 2] = [
    FrequencyRule { label: FrequencyDomainLabel::HumanEegLike, matches: looks_like_eeg },
    FrequencyRule { label: FrequencyDomainLabel::RandomNoiseLike, matches: looks_like_noise },
];

/// Maps a filtered window and its spectrum to quality labels
#[derive(Debug, Clone)]
pub struct QualityClassifier {
    thresholds: QualityThresholds,
    line_frequency: f64,
}

impl QualityClassifier {
    pub fn new(thresholds: QualityThresholds, line_frequency: f64) -> Self {
        QualityClassifier {
            thresholds,
            line_frequency,
        }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// Labels and metrics for one window; the frequency label is
    /// `UNKNOWN` without a spectrum
    pub fn classify(&self, window: &[f64], estimate: Option<&SpectralEstimate>) -> QualityAssessment {
        let time_metrics = time_domain_metrics(window, self.thresholds.flat_step);
        let time_label = TIME_RULES
            .iter()
            .find(|rule| (rule.matches)(&time_metrics, &self.thresholds))
            .map_or(TimeDomainLabel::Ok, |rule| rule.label);

        let frequency_metrics = estimate.map(|e| self.frequency_domain_metrics(e));
        let frequency_label = frequency_metrics
            .as_ref()
            .and_then(|m| {
                FREQUENCY_RULES
                    .iter()
                    .find(|rule| (rule.matches)(m, &self.thresholds))
            })
            .map_or(FrequencyDomainLabel::Unknown, |rule| rule.label);

        QualityAssessment {
            time_label,
            frequency_label,
            time_metrics,
            frequency_metrics,
        }
    }

    fn frequency_domain_metrics(&self, estimate: &SpectralEstimate) -> FrequencyDomainMetrics {
        let bands = band_powers(estimate);
        let muscle = bands.get(Band::Gamma) + bands.get(Band::HighGamma);
        let rhythm = bands.get(Band::Alpha) + bands.get(Band::Beta);

        FrequencyDomainMetrics {
            line_noise_ratio: line_noise_ratio(
                estimate,
                self.line_frequency,
                self.thresholds.line_tolerance,
                self.thresholds.reference_band,
            ),
            muscle_ratio: muscle / (rhythm + EPSILON),
            spectral_entropy: spectral_entropy(estimate.powers()),
            band_powers: bands,
        }
    }
}

impl Default for QualityClassifier {
    fn default() -> Self {
        Self::new(QualityThresholds::default(), 50.0)
    }
}

/// Amplitude statistics; all zero for an empty window
pub fn time_domain_metrics(window: &[f64], flat_step: f64) -> TimeDomainMetrics {
    if window.is_empty() {
        return TimeDomainMetrics::default();
    }

    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let rms = (window.iter().map(|x| x * x).sum::<f64>() / n).sqrt();

    let min_value = window.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max_value = window.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let flatness = if window.len() < 2 {
        0.0
    } else {
        let flat_steps = window
            .windows(2)
            .filter(|pair| (pair[1] - pair[0]).abs() < flat_step)
            .count();
        flat_steps as f64 / (n - 1.0)
    };

    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for &x in window {
        let diff = x - mean;
        let diff2 = diff * diff;
        m2 += diff2;
        m3 += diff2 * diff;
        m4 += diff2 * diff2;
    }
    m2 /= n;
    m3 /= n;
    m4 /= n;

    let (skew, kurtosis) = if m2 > 0.0 {
        (m3 / m2.powf(1.5), m4 / (m2 * m2) - 3.0)
    } else {
        (0.0, 0.0)
    };

    TimeDomainMetrics {
        peak_to_peak: max_value - min_value,
        rms,
        dc_offset: mean,
        flatness,
        kurtosis,
        skew,
    }
}

/// Power within `tolerance` of `line_frequency` over power in the reference band
pub fn line_noise_ratio(
    estimate: &SpectralEstimate,
    line_frequency: f64,
    tolerance: f64,
    reference_band: (f64, f64),
) -> f64 {
    let (reference_low, reference_high) = reference_band;
    let (mut line, mut reference) = (0.0, 0.0);

    for (f, p) in estimate.bins() {
        if (f - line_frequency).abs() < tolerance {
            line += p;
        }
        if f > reference_low && f < reference_high {
            reference += p;
        }
    }

    line / (reference + EPSILON)
}

/// Shannon entropy in bits of the PSD treated as a distribution
pub fn spectral_entropy(powers: &[f64]) -> f64 {
    let total = powers.iter().sum::<f64>() + EPSILON;
    -powers
        .iter()
        .map(|power| {
            let p = power / total;
            p * (p + EPSILON).log2()
        })
        .sum::<f64>()
}

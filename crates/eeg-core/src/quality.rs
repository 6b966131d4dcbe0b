//! Signal quality labels and the metrics they are derived from

use core::fmt;
use serde::{Deserialize, Serialize};
use crate::spectrum::{Band, BandPowers};

/// Display colour attached to a label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Green,
    Gray,
    Red,
    DarkGreen,
    Orange,
    Black,
}

impl Severity {
    /// Colour name understood by most presentation toolkits
    pub fn color_name(&self) -> &'static str {
        match self {
            Severity::Green => "green",
            Severity::Gray => "gray",
            Severity::Red => "red",
            Severity::DarkGreen => "darkgreen",
            Severity::Orange => "orange",
            Severity::Black => "black",
        }
    }
}

/// Verdict from time-domain metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeDomainLabel {
    Ok,
    Flat,
    Noisy,
    HighRms,
    Spiky,
}

impl TimeDomainLabel {
    pub fn text(&self) -> &'static str {
        match self {
            TimeDomainLabel::Ok => "OK",
            TimeDomainLabel::Flat => "FLAT",
            TimeDomainLabel::Noisy => "NOISY",
            TimeDomainLabel::HighRms => "HIGH RMS",
            TimeDomainLabel::Spiky => "SPIKY",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            TimeDomainLabel::Ok => Severity::Green,
            TimeDomainLabel::Flat => Severity::Gray,
            TimeDomainLabel::Noisy => Severity::Red,
            TimeDomainLabel::HighRms => Severity::DarkGreen,
            TimeDomainLabel::Spiky => Severity::Orange,
        }
    }
}

/// Verdict from the spectral shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrequencyDomainLabel {
    Unknown,
    HumanEegLike,
    RandomNoiseLike,
}

impl FrequencyDomainLabel {
    pub fn text(&self) -> &'static str {
        match self {
            FrequencyDomainLabel::Unknown => "UNKNOWN",
            FrequencyDomainLabel::HumanEegLike => "human EEG alike",
            FrequencyDomainLabel::RandomNoiseLike => "RANDOM NOISE alike",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            FrequencyDomainLabel::Unknown => Severity::Black,
            FrequencyDomainLabel::HumanEegLike => Severity::Green,
            FrequencyDomainLabel::RandomNoiseLike => Severity::Red,
        }
    }
}

impl fmt::Display for TimeDomainLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

impl fmt::Display for FrequencyDomainLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Amplitude statistics of one filtered window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeDomainMetrics {
    pub peak_to_peak: f64,
    pub rms: f64,
    pub dc_offset: f64,
    /// Fraction of consecutive differences below the flat step
    pub flatness: f64,
    /// Excess (Fisher) kurtosis, biased estimator
    pub kurtosis: f64,
    pub skew: f64,
}

/// Spectral statistics of one filtered window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyDomainMetrics {
    pub line_noise_ratio: f64,
    pub muscle_ratio: f64,
    /// Shannon entropy of the normalised PSD, in bits
    pub spectral_entropy: f64,
    pub band_powers: BandPowers,
}

/// Labels plus the metrics that produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub time_label: TimeDomainLabel,
    pub frequency_label: FrequencyDomainLabel,
    pub time_metrics: TimeDomainMetrics,
    pub frequency_metrics: Option<FrequencyDomainMetrics>,
}

impl QualityAssessment {
    /// First status line: amplitude statistics and the time-domain verdict
    pub fn time_summary(&self) -> String {
        let m = &self.time_metrics;
        format!(
            "PTP: {:.1} | RMS: {:.1} | DC: {:.1} | Flat: {:.2} | Kurtosis: {:.2} | Skew: {:.2} | {}",
            m.peak_to_peak, m.rms, m.dc_offset, m.flatness, m.kurtosis, m.skew, self.time_label
        )
    }

    /// Second status line, absent when no spectrum was estimated
    pub fn frequency_summary(&self) -> Option<String> {
        self.frequency_metrics.as_ref().map(|m| {
            let bands: Vec<String> = Band::ALL
                .iter()
                .map(|band| format!("{}: {:.1}", band.symbol(), m.band_powers.get(*band)))
                .collect();
            format!(
                "LNR: {:.2} | MR: {:.2} | Ent: {:.2} | {} | {}",
                m.line_noise_ratio,
                m.muscle_ratio,
                m.spectral_entropy,
                bands.join(" | "),
                self.frequency_label
            )
        })
    }
}

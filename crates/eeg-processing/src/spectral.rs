//! Spectral analysis: Welch PSD, band integration, cross-channel aggregate

use eeg_core::{Band, BandPowers, SpectralEstimate};
use realfft::RealFftPlanner;
use std::f64::consts::PI;
use tracing::warn;

/// Smallest Welch segment
pub const MIN_SEGMENT: usize = 64;
/// Largest Welch segment
pub const MAX_SEGMENT: usize = 1024;

/// Added to denominators to keep ratios finite
pub const EPSILON: f64 = 1e-10;

/// Welch segment length for a sampling rate: `2^floor(log2(fs))` clamped
pub fn segment_size_for(sampling_rate: f64) -> usize {
    if !sampling_rate.is_finite() || sampling_rate < 1.0 {
        return MIN_SEGMENT;
    }
    let exponent = sampling_rate.log2().floor() as u32;
    1usize
        .checked_shl(exponent)
        .unwrap_or(usize::MAX)
        .clamp(MIN_SEGMENT, MAX_SEGMENT)
}

/// Periodic 4-term Blackman-Harris window
pub fn blackman_harris(len: usize) -> Vec<f64> {
    const A: [f64; 4] = [0.35875, 0.48829, 0.14128, 0.01168];

    let n = len as f64;
    (0..len)
        .map(|i| {
            let x = 2.0 * PI * i as f64 / n;
            A[0] - A[1] * x.cos() + A[2] * (2.0 * x).cos() - A[3] * (3.0 * x).cos()
        })
        .collect()
}

/// Welch estimator with cached FFT plans and taper
pub struct SpectralAnalyzer {
    planner: RealFftPlanner<f64>,
    taper: Vec<f64>,
    taper_power: f64,
}

impl SpectralAnalyzer {
    pub fn new() -> Self {
        SpectralAnalyzer {
            planner: RealFftPlanner::new(),
            taper: Vec::new(),
            taper_power: 0.0,
        }
    }

    /// One-sided PSD density (V^2/Hz) by Welch's method.
    ///
    /// Segments of `segment_size` with 50 % overlap, each with its mean
    /// removed and tapered before the FFT. `None` unless the window is
    /// strictly longer than one segment.
    pub fn estimate_psd(
        &mut self,
        window: &[f64],
        sampling_rate: f64,
        segment_size: usize,
    ) -> Option<SpectralEstimate> {
        if segment_size < 2 || window.len() <= segment_size {
            return None;
        }
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return None;
        }

        if self.taper.len() != segment_size {
            self.taper = blackman_harris(segment_size);
            self.taper_power = self.taper.iter().map(|w| w * w).sum();
        }

        let fft = self.planner.plan_fft_forward(segment_size);
        let mut input = fft.make_input_vec();
        let mut spectrum = fft.make_output_vec();

        let bins = segment_size / 2 + 1;
        let hop = segment_size - segment_size / 2;
        let segments = (window.len() - segment_size) / hop + 1;
        let mut powers = vec![0.0; bins];

        for index in 0..segments {
            let segment = &window[index * hop..index * hop + segment_size];
            let mean = segment.iter().sum::<f64>() / segment_size as f64;

            for ((slot, &x), &w) in input.iter_mut().zip(segment).zip(&self.taper) {
                *slot = (x - mean) * w;
            }
            if let Err(err) = fft.process(&mut input, &mut spectrum) {
                warn!(error = %err, segment_size, "FFT failed, spectrum dropped");
                return None;
            }

            for (power, value) in powers.iter_mut().zip(&spectrum) {
                *power += value.norm_sqr();
            }
        }

        let scale = 1.0 / (sampling_rate * self.taper_power * segments as f64);
        let nyquist_bin = (segment_size % 2 == 0).then_some(bins - 1);
        for (k, power) in powers.iter_mut().enumerate() {
            *power *= scale;
            if k != 0 && Some(k) != nyquist_bin {
                *power *= 2.0;
            }
        }

        let resolution = sampling_rate / segment_size as f64;
        let frequencies = (0..bins).map(|k| k as f64 * resolution).collect();

        SpectralEstimate::new(frequencies, powers).ok()
    }
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Trapezoidal integral of the PSD over bins with `f_low <= f <= f_high`
pub fn band_power(estimate: &SpectralEstimate, f_low: f64, f_high: f64) -> f64 {
    let selected: Vec<(f64, f64)> = estimate
        .bins()
        .filter(|(f, _)| *f >= f_low && *f <= f_high)
        .collect();

    selected
        .windows(2)
        .map(|pair| (pair[1].0 - pair[0].0) * (pair[0].1 + pair[1].1) / 2.0)
        .sum()
}

/// Integrated power in each canonical band
pub fn band_powers(estimate: &SpectralEstimate) -> BandPowers {
    let mut powers = BandPowers::default();
    for band in Band::ALL {
        let (low, high) = band.range();
        powers.set(band, band_power(estimate, low, high));
    }
    powers
}

/// Running sum of band powers over the channels of one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandAggregate {
    totals: BandPowers,
    contributors: usize,
}

impl BandAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, powers: &BandPowers) {
        self.totals += powers;
        self.contributors += 1;
    }

    pub fn totals(&self) -> &BandPowers {
        &self.totals
    }

    /// Channels that contributed a spectrum
    pub fn contributors(&self) -> usize {
        self.contributors
    }

    /// Share of each band in the grand total, in percent
    pub fn percentages(&self) -> [f64; Band::COUNT] {
        let total = self.totals.total() + EPSILON;
        let values = *self.totals.values();
        values.map(|value| value / total * 100.0)
    }
}

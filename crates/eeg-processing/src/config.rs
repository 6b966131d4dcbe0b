//! Static monitor configuration

use crate::classifier::QualityThresholds;
use crate::filter_bank::FilterDesignParams;
use crate::settings::{FilterChainSettings, RuntimeSettings};
use crate::spectral::segment_size_for;
use eeg_core::{config_error, ChannelLayout, EegError, EegResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything fixed at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Configuration name/profile
    pub name: String,
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// Length of the analysed window in seconds
    pub window_seconds: f64,
    /// Refresh period in milliseconds
    pub tick_period_ms: u64,
    /// Mains frequency targeted by the notch stages
    pub line_frequency: f64,
    /// PSD bins published for display
    pub psd_display_bins: usize,
    pub channels: ChannelLayout,
    /// Initial state of the filter chain
    pub filters: FilterChainSettings,
    pub design: FilterDesignParams,
    pub quality: QualityThresholds,
}

impl MonitorConfig {
    pub const MIN_SAMPLING_RATE: f64 = 64.0;
    pub const MAX_SAMPLING_RATE: f64 = 16_384.0;

    /// Samples per analysed window
    pub fn window_len(&self) -> usize {
        (self.sampling_rate * self.window_seconds).round() as usize
    }

    /// Welch segment length derived from the sampling rate
    pub fn segment_size(&self) -> usize {
        segment_size_for(self.sampling_rate)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn nyquist(&self) -> f64 {
        self.sampling_rate / 2.0
    }

    /// Runtime settings every channel starts with
    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings::new(self.filters.clone(), self.channels.len())
    }

    /// Validate entire configuration
    pub fn validate(&self) -> EegResult<()> {
        if !self.sampling_rate.is_finite()
            || self.sampling_rate < Self::MIN_SAMPLING_RATE
            || self.sampling_rate > Self::MAX_SAMPLING_RATE
        {
            return Err(EegError::InvalidSamplingRate {
                rate: self.sampling_rate,
                valid_range: "64-16384Hz",
            });
        }

        if !self.window_seconds.is_finite() || self.window_seconds <= 0.0 {
            return Err(config_error!("window length must be positive, got {}s", self.window_seconds));
        }

        if self.window_len() < 2 {
            return Err(config_error!("window of {} samples is too short", self.window_len()));
        }

        if self.tick_period_ms == 0 {
            return Err(config_error!("tick period must be greater than 0"));
        }

        if !self.line_frequency.is_finite()
            || self.line_frequency <= 0.0
            || self.line_frequency >= self.nyquist()
        {
            return Err(config_error!(
                "line frequency {}Hz outside (0, {})Hz",
                self.line_frequency,
                self.nyquist()
            ));
        }

        let design = &self.design;
        if !design.highpass_cutoff.is_finite()
            || design.highpass_cutoff <= 0.0
            || design.highpass_cutoff >= self.nyquist()
        {
            return Err(config_error!(
                "high-pass cutoff {}Hz outside (0, {})Hz",
                design.highpass_cutoff,
                self.nyquist()
            ));
        }
        if design.line_half_width <= 0.0 || design.line_half_width >= self.line_frequency {
            return Err(config_error!(
                "line band half width {}Hz must be within (0, {})Hz",
                design.line_half_width,
                self.line_frequency
            ));
        }

        self.channels.validate()
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> EegResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| EegError::ConfigurationError {
            message: format!("Failed to serialize configuration: {}", e),
        })
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> EegResult<Self> {
        serde_json::from_str(json).map_err(|e| EegError::ConfigurationError {
            message: format!("Failed to deserialize configuration: {}", e),
        })
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            name: "EEG monitor".to_string(),
            sampling_rate: 512.0,
            window_seconds: 4.0,
            tick_period_ms: 250,
            line_frequency: 50.0,
            psd_display_bins: 300,
            channels: ChannelLayout::standard(),
            filters: FilterChainSettings::default(),
            design: FilterDesignParams::default(),
            quality: QualityThresholds::default(),
        }
    }
}

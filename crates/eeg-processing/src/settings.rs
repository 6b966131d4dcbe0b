//! Runtime-mutable settings: filter toggles, band-pass cutoffs, visibility
//!
//! The presentation side edits settings through a [`SettingsHandle`]; the
//! orchestrator holds the matching `watch::Receiver` and takes one snapshot
//! at the start of every tick. Each edit bumps the revision counter.

use crate::filter_bank::FilterStage;
use eeg_core::{EegError, EegResult};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Band-pass cutoffs exactly as entered, parsed on every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandpassCutoffs {
    pub low: String,
    pub high: String,
}

impl BandpassCutoffs {
    pub fn new(low: impl Into<String>, high: impl Into<String>) -> Self {
        BandpassCutoffs {
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn hz(low: f64, high: f64) -> Self {
        Self::new(low.to_string(), high.to_string())
    }

    /// Parse both edges and check them against the Nyquist frequency.
    ///
    /// A low edge of exactly 0 Hz is accepted and means low-pass only.
    pub fn parse(&self, nyquist: f64) -> EegResult<(f64, f64)> {
        let invalid = |reason: &'static str| EegError::InvalidCutoff {
            low: self.low.clone(),
            high: self.high.clone(),
            reason,
        };

        let low: f64 = self.low.trim().parse().map_err(|_| invalid("not a number"))?;
        let high: f64 = self.high.trim().parse().map_err(|_| invalid("not a number"))?;

        if !low.is_finite() || !high.is_finite() {
            return Err(invalid("cutoffs must be finite"));
        }
        if low < 0.0 {
            return Err(invalid("low cutoff must not be negative"));
        }
        if high >= nyquist {
            return Err(invalid("high cutoff must be below the Nyquist frequency"));
        }
        if low >= high {
            return Err(invalid("low cutoff must be below high cutoff"));
        }

        Ok((low, high))
    }
}

impl Default for BandpassCutoffs {
    fn default() -> Self {
        Self::new("3.0", "333.0")
    }
}

/// Enable flag per filter stage plus the band-pass cutoffs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterChainSettings {
    pub detrend: bool,
    pub bandpass: bool,
    pub line_noise_bank: bool,
    pub zero_phase_notch: bool,
    pub causal_highpass: bool,
    pub causal_notch: bool,
    pub bandpass_cutoffs: BandpassCutoffs,
}

impl FilterChainSettings {
    /// Every stage disabled
    pub fn bypass() -> Self {
        FilterChainSettings {
            detrend: false,
            bandpass: false,
            line_noise_bank: false,
            zero_phase_notch: false,
            causal_highpass: false,
            causal_notch: false,
            bandpass_cutoffs: BandpassCutoffs::default(),
        }
    }

    /// Every stage enabled
    pub fn all_enabled() -> Self {
        let mut settings = Self::bypass();
        for stage in FilterStage::CHAIN {
            settings.set_enabled(stage, true);
        }
        settings
    }

    pub fn is_enabled(&self, stage: FilterStage) -> bool {
        match stage {
            FilterStage::Detrend => self.detrend,
            FilterStage::Bandpass => self.bandpass,
            FilterStage::LineNoiseBank => self.line_noise_bank,
            FilterStage::ZeroPhaseNotch => self.zero_phase_notch,
            FilterStage::CausalHighpass => self.causal_highpass,
            FilterStage::CausalNotch => self.causal_notch,
        }
    }

    pub fn set_enabled(&mut self, stage: FilterStage, enabled: bool) {
        let flag = match stage {
            FilterStage::Detrend => &mut self.detrend,
            FilterStage::Bandpass => &mut self.bandpass,
            FilterStage::LineNoiseBank => &mut self.line_noise_bank,
            FilterStage::ZeroPhaseNotch => &mut self.zero_phase_notch,
            FilterStage::CausalHighpass => &mut self.causal_highpass,
            FilterStage::CausalNotch => &mut self.causal_notch,
        };
        *flag = enabled;
    }

    pub fn enabled_stages(&self) -> impl Iterator<Item = FilterStage> + '_ {
        FilterStage::CHAIN.into_iter().filter(|stage| self.is_enabled(*stage))
    }
}

impl Default for FilterChainSettings {
    /// Detrend and causal high-pass on, everything else off
    fn default() -> Self {
        FilterChainSettings {
            detrend: true,
            causal_highpass: true,
            ..Self::bypass()
        }
    }
}

/// Snapshot read by the orchestrator at the start of a tick
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    /// Incremented on every edit
    pub revision: u64,
    pub filters: FilterChainSettings,
    /// Visibility per channel index
    pub visible: Vec<bool>,
}

impl RuntimeSettings {
    pub fn new(filters: FilterChainSettings, channel_count: usize) -> Self {
        RuntimeSettings {
            revision: 0,
            filters,
            visible: vec![true; channel_count],
        }
    }

    /// Channels without an explicit flag are visible
    pub fn is_visible(&self, channel: usize) -> bool {
        self.visible.get(channel).copied().unwrap_or(true)
    }
}

/// Writer side of the runtime settings
#[derive(Debug)]
pub struct SettingsHandle {
    sender: watch::Sender<RuntimeSettings>,
}

impl SettingsHandle {
    pub fn new(initial: RuntimeSettings) -> (Self, watch::Receiver<RuntimeSettings>) {
        let (sender, receiver) = watch::channel(initial);
        (SettingsHandle { sender }, receiver)
    }

    /// Another reader of the same settings
    pub fn subscribe(&self) -> watch::Receiver<RuntimeSettings> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> RuntimeSettings {
        self.sender.borrow().clone()
    }

    /// Apply an edit and bump the revision; returns the new revision
    pub fn update<F>(&self, edit: F) -> u64
    where
        F: FnOnce(&mut RuntimeSettings),
    {
        let mut revision = 0;
        self.sender.send_modify(|settings| {
            edit(settings);
            settings.revision += 1;
            revision = settings.revision;
        });
        revision
    }

    pub fn set_stage_enabled(&self, stage: FilterStage, enabled: bool) -> u64 {
        self.update(|settings| settings.filters.set_enabled(stage, enabled))
    }

    pub fn set_bandpass_cutoffs(&self, low: impl Into<String>, high: impl Into<String>) -> u64 {
        let cutoffs = BandpassCutoffs::new(low, high);
        self.update(move |settings| settings.filters.bandpass_cutoffs = cutoffs)
    }

    pub fn set_channel_visible(&self, channel: usize, visible: bool) -> u64 {
        self.update(|settings| {
            if channel >= settings.visible.len() {
                settings.visible.resize(channel + 1, true);
            }
            settings.visible[channel] = visible;
        })
    }
}

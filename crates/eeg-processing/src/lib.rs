//! EEG-Processing: filtering, spectral analysis and quality scoring
//!
//! Streaming filter bank, Welch spectral analyzer, signal quality
//! classifier and the tick orchestrator that ties them to an acquisition
//! source and a result sink.

pub mod classifier;
pub mod config;
pub mod design;
pub mod filter_bank;
pub mod filters;
pub mod pipeline;
pub mod service;
pub mod settings;
pub mod spectral;

pub use classifier::{QualityClassifier, QualityThresholds};
pub use config::MonitorConfig;
pub use design::{
    butterworth_bandpass, butterworth_bandstop, butterworth_highpass, iir_notch, Biquad,
};
pub use filter_bank::{FilterBank, FilterDesignParams, FilterStage};
pub use filters::{detrend_linear, zero_phase, DelayLine};
pub use pipeline::*;
pub use service::{run_ticks, LoopSummary, MonitorCommand};
pub use settings::{BandpassCutoffs, FilterChainSettings, RuntimeSettings, SettingsHandle};
pub use spectral::{band_power, band_powers, BandAggregate, SpectralAnalyzer};

//! Streaming filter bank: the fixed, toggleable filter chain per channel
//!
//! Stateless stages (detrend and the zero-phase filters) work on the whole
//! window every tick. The two causal stages keep one [`DelayLine`] per
//! channel in a flat arena so the stream stays continuous across ticks.

use crate::design::{
    butterworth_bandpass, butterworth_bandstop, butterworth_highpass, butterworth_lowpass, iir_notch, Biquad,
};
use crate::filters::{detrend_linear, zero_phase, DelayLine};
use crate::settings::{BandpassCutoffs, FilterChainSettings};
use eeg_core::{EegError, EegResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Stages of the filter chain, in application order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    /// Least-squares line removal
    Detrend,
    /// Zero-phase Butterworth band-pass with runtime cutoffs, low-pass when
    /// the low edge is 0 Hz
    Bandpass,
    /// Zero-phase band-stops at the line frequency and its harmonics
    LineNoiseBank,
    /// Zero-phase IIR notch at the line frequency
    ZeroPhaseNotch,
    /// Butterworth high-pass with a persistent delay line
    CausalHighpass,
    /// IIR notch with a persistent delay line
    CausalNotch,
}

impl FilterStage {
    pub const CHAIN: [FilterStage; 6] = [
        FilterStage::Detrend,
        FilterStage::Bandpass,
        FilterStage::LineNoiseBank,
        FilterStage::ZeroPhaseNotch,
        FilterStage::CausalHighpass,
        FilterStage::CausalNotch,
    ];

    /// Number of stages owning a delay line per channel
    pub const CAUSAL_STAGES: usize = 2;

    pub fn name(&self) -> &'static str {
        match self {
            FilterStage::Detrend => "detrend",
            FilterStage::Bandpass => "bandpass",
            FilterStage::LineNoiseBank => "line_noise_bank",
            FilterStage::ZeroPhaseNotch => "zero_phase_notch",
            FilterStage::CausalHighpass => "causal_highpass",
            FilterStage::CausalNotch => "causal_notch",
        }
    }

    pub fn is_stateful(&self) -> bool {
        self.causal_slot().is_some()
    }

    fn causal_slot(&self) -> Option<usize> {
        match self {
            FilterStage::CausalHighpass => Some(0),
            FilterStage::CausalNotch => Some(1),
            _ => None,
        }
    }
}

impl std::fmt::Display for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed design parameters of the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterDesignParams {
    pub bandpass_order: usize,
    /// Line frequency multiples covered by the band-stop bank
    pub line_harmonics: usize,
    /// Half width of each band-stop in Hz
    pub line_half_width: f64,
    pub line_bank_order: usize,
    pub zero_phase_notch_q: f64,
    pub highpass_order: usize,
    pub highpass_cutoff: f64,
    pub causal_notch_q: f64,
}

impl Default for FilterDesignParams {
    fn default() -> Self {
        FilterDesignParams {
            bandpass_order: 2,
            line_harmonics: 5,
            line_half_width: 2.0,
            line_bank_order: 2,
            zero_phase_notch_q: 50.0,
            highpass_order: 4,
            highpass_cutoff: 1.0,
            causal_notch_q: 30.0,
        }
    }
}

#[derive(Debug, Clone)]
struct BandpassDesign {
    low: f64,
    high: f64,
    sections: Vec<Biquad>,
}

/// Filter chain state for every channel of a layout
#[derive(Debug, Clone)]
pub struct FilterBank {
    sampling_rate: f64,
    bandpass_order: usize,
    channel_count: usize,
    line_bank: Vec<Vec<Biquad>>,
    zero_phase_notch: Biquad,
    bandpass: Option<BandpassDesign>,
    rejected_cutoffs: Option<BandpassCutoffs>,
    /// Indexed by `channel * CAUSAL_STAGES + slot`
    delay_lines: Vec<DelayLine>,
}

impl FilterBank {
    pub fn new(
        sampling_rate: f64,
        line_frequency: f64,
        channel_count: usize,
        params: &FilterDesignParams,
    ) -> EegResult<Self> {
        let nyquist = sampling_rate / 2.0;

        let mut line_bank = Vec::with_capacity(params.line_harmonics);
        for harmonic in 1..=params.line_harmonics {
            let centre = line_frequency * harmonic as f64;
            let (low, high) = (centre - params.line_half_width, centre + params.line_half_width);
            if high >= nyquist {
                debug!(harmonic, centre, "line harmonic reaches Nyquist, not filtered");
                continue;
            }
            line_bank.push(butterworth_bandstop(params.line_bank_order, low, high, sampling_rate)?);
        }

        let zero_phase_notch = iir_notch(line_frequency, params.zero_phase_notch_q, sampling_rate)?;

        let highpass = DelayLine::new(&butterworth_highpass(
            params.highpass_order,
            params.highpass_cutoff,
            sampling_rate,
        )?)?;
        let notch = DelayLine::new(&[iir_notch(line_frequency, params.causal_notch_q, sampling_rate)?])?;

        let mut delay_lines = Vec::with_capacity(channel_count * FilterStage::CAUSAL_STAGES);
        for _ in 0..channel_count {
            delay_lines.push(highpass);
            delay_lines.push(notch);
        }

        debug!(
            sampling_rate,
            line_frequency,
            channel_count,
            line_bands = line_bank.len(),
            "filter bank designed"
        );

        Ok(FilterBank {
            sampling_rate,
            bandpass_order: params.bandpass_order,
            channel_count,
            line_bank,
            zero_phase_notch,
            bandpass: None,
            rejected_cutoffs: None,
            delay_lines,
        })
    }

    /// Run the enabled stages over one window of `channel`
    pub fn apply_chain(
        &mut self,
        window: &[f64],
        channel: usize,
        settings: &FilterChainSettings,
    ) -> EegResult<Vec<f64>> {
        if channel >= self.channel_count {
            return Err(EegError::ChannelOutOfRange {
                index: channel,
                channel_count: self.channel_count,
            });
        }

        let mut samples = window.to_vec();

        for stage in settings.enabled_stages() {
            match stage {
                FilterStage::Detrend => detrend_linear(&mut samples),
                FilterStage::Bandpass => match self.prepare_bandpass(&settings.bandpass_cutoffs) {
                    Ok(()) => {
                        if let Some(design) = &self.bandpass {
                            samples = zero_phase(&design.sections, &samples);
                        }
                    }
                    Err(err) => self.report_rejected(&settings.bandpass_cutoffs, channel, &err),
                },
                FilterStage::LineNoiseBank => {
                    for sections in &self.line_bank {
                        samples = zero_phase(sections, &samples);
                    }
                }
                FilterStage::ZeroPhaseNotch => {
                    samples = zero_phase(std::slice::from_ref(&self.zero_phase_notch), &samples);
                }
                FilterStage::CausalHighpass | FilterStage::CausalNotch => {
                    if let Some(line) = self.delay_line_mut(channel, stage) {
                        line.process_in_place(&mut samples);
                    }
                }
            }
        }

        Ok(samples)
    }

    /// Clear every delay line
    pub fn reset(&mut self) {
        self.delay_lines.iter_mut().for_each(DelayLine::reset);
    }

    pub fn reset_channel(&mut self, channel: usize) -> EegResult<()> {
        if channel >= self.channel_count {
            return Err(EegError::ChannelOutOfRange {
                index: channel,
                channel_count: self.channel_count,
            });
        }
        let start = channel * FilterStage::CAUSAL_STAGES;
        self.delay_lines[start..start + FilterStage::CAUSAL_STAGES]
            .iter_mut()
            .for_each(DelayLine::reset);
        Ok(())
    }

    pub fn delay_line(&self, channel: usize, stage: FilterStage) -> Option<&DelayLine> {
        self.slot(channel, stage).and_then(|slot| self.delay_lines.get(slot))
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// Band-stops actually applied by the line-noise bank
    pub fn line_band_count(&self) -> usize {
        self.line_bank.len()
    }

    fn slot(&self, channel: usize, stage: FilterStage) -> Option<usize> {
        if channel >= self.channel_count {
            return None;
        }
        stage
            .causal_slot()
            .map(|slot| channel * FilterStage::CAUSAL_STAGES + slot)
    }

    fn delay_line_mut(&mut self, channel: usize, stage: FilterStage) -> Option<&mut DelayLine> {
        self.slot(channel, stage).and_then(|slot| self.delay_lines.get_mut(slot))
    }

    /// Design for the current cutoffs, redone only when they change
    fn prepare_bandpass(&mut self, cutoffs: &BandpassCutoffs) -> EegResult<()> {
        let (low, high) = cutoffs.parse(self.sampling_rate / 2.0)?;

        let stale = match &self.bandpass {
            Some(design) => design.low != low || design.high != high,
            None => true,
        };
        if stale {
            // a 0 Hz edge would put a band-pass pole on the unit circle
            let sections = if low == 0.0 {
                butterworth_lowpass(self.bandpass_order, high, self.sampling_rate)?
            } else {
                butterworth_bandpass(self.bandpass_order, low, high, self.sampling_rate)?
            };
            debug!(low, high, sections = sections.len(), "band-pass redesigned");
            self.bandpass = Some(BandpassDesign { low, high, sections });
        }
        self.rejected_cutoffs = None;
        Ok(())
    }

    fn report_rejected(&mut self, cutoffs: &BandpassCutoffs, channel: usize, err: &EegError) {
        if self.rejected_cutoffs.as_ref() == Some(cutoffs) {
            debug!(channel, error = %err, "band-pass still skipped");
            return;
        }
        warn!(channel, stage = "bandpass", error = %err, "stage skipped, window passes through");
        self.rejected_cutoffs = Some(cutoffs.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    const FS: f64 = 512.0;

    fn bank(channels: usize) -> FilterBank {
        FilterBank::new(FS, 50.0, channels, &FilterDesignParams::default()).unwrap()
    }

    fn causal_only() -> FilterChainSettings {
        let mut settings = FilterChainSettings::bypass();
        settings.causal_highpass = true;
        settings.causal_notch = true;
        settings
    }

    fn eeg_like(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / FS;
                30.0 * (2.0 * PI * 10.0 * t).sin() + 8.0 * (2.0 * PI * 50.0 * t).sin() + 15.0
            })
            .collect()
    }

    #[test]
    fn test_stage_order() {
        let positions: Vec<&str> = FilterStage::CHAIN.iter().map(|s| s.name()).collect();
        assert_eq!(positions, vec![
            "detrend",
            "bandpass",
            "line_noise_bank",
            "zero_phase_notch",
            "causal_highpass",
            "causal_notch",
        ]);
        assert!(FilterStage::CausalNotch.is_stateful());
        assert!(!FilterStage::Bandpass.is_stateful());
    }

    #[test]
    fn test_zeros_stay_zeros_with_every_stage() {
        let mut settings = FilterChainSettings::all_enabled();
        settings.bandpass_cutoffs = BandpassCutoffs::new("3.0", "100.0");

        let mut bank = bank(1);
        let output = bank.apply_chain(&vec![0.0; 512], 0, &settings).unwrap();
        assert_eq!(output.len(), 512);
        assert!(output.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_invalid_cutoffs_pass_through() {
        let input = eeg_like(600);
        let mut bank = bank(1);

        for (low, high) in [("abc", "40"), ("40", "30"), ("3.0", "333.0")] {
            let mut settings = FilterChainSettings::bypass();
            settings.bandpass = true;
            settings.bandpass_cutoffs = BandpassCutoffs::new(low, high);
            let output = bank.apply_chain(&input, 0, &settings).unwrap();
            assert_eq!(output, input);
        }
    }

    #[test]
    fn test_valid_cutoffs_filter() {
        let input = eeg_like(512);
        let mut settings = FilterChainSettings::bypass();
        settings.bandpass = true;
        settings.bandpass_cutoffs = BandpassCutoffs::new("3", "30");

        let mut bank = bank(1);
        let output = bank.apply_chain(&input, 0, &settings).unwrap();
        assert_ne!(output, input);

        // DC offset is outside the passband
        let mean = output.iter().sum::<f64>() / output.len() as f64;
        assert!(mean.abs() < 1.0);
    }

    #[test]
    fn test_zero_low_cutoff_filters_as_lowpass() {
        let input: Vec<f64> = (0..512)
            .map(|i| {
                let t = i as f64 / FS;
                30.0 * (2.0 * PI * 10.0 * t).sin() + 8.0 * (2.0 * PI * 120.0 * t).sin() + 15.0
            })
            .collect();
        let mut settings = FilterChainSettings::bypass();
        settings.bandpass = true;
        settings.bandpass_cutoffs = BandpassCutoffs::new("0", "40");

        let mut bank = bank(1);
        let output = bank.apply_chain(&input, 0, &settings).unwrap();
        assert_ne!(output, input);

        // offset and 10 Hz kept, 120 Hz removed
        for i in 100..412 {
            let t = i as f64 / FS;
            let expected = 30.0 * (2.0 * PI * 10.0 * t).sin() + 15.0;
            assert!((output[i] - expected).abs() < 0.5, "sample {} off by {}", i, output[i] - expected);
        }
    }

    #[test]
    fn test_rejected_cutoffs_forgotten_after_valid_tick() {
        let input = eeg_like(600);
        let mut bank = bank(1);
        let mut settings = FilterChainSettings::bypass();
        settings.bandpass = true;

        let valid = BandpassCutoffs::new("3", "30");
        let invalid = BandpassCutoffs::new("30", "3");
        for cutoffs in [&valid, &invalid, &valid] {
            settings.bandpass_cutoffs = cutoffs.clone();
            bank.apply_chain(&input, 0, &settings).unwrap();
        }
        assert!(bank.rejected_cutoffs.is_none());

        settings.bandpass_cutoffs = invalid.clone();
        bank.apply_chain(&input, 0, &settings).unwrap();
        assert_eq!(bank.rejected_cutoffs, Some(invalid));
    }

    #[test]
    fn test_line_bank_skips_harmonics_above_nyquist() {
        assert_eq!(bank(1).line_band_count(), 5);

        let low_rate = FilterBank::new(200.0, 50.0, 1, &FilterDesignParams::default()).unwrap();
        assert_eq!(low_rate.line_band_count(), 1);
    }

    #[test]
    fn test_delay_lines_are_per_channel() {
        let mut bank = bank(3);
        bank.apply_chain(&eeg_like(256), 1, &causal_only()).unwrap();

        let touched = bank.delay_line(1, FilterStage::CausalHighpass).unwrap();
        assert!(touched.state().iter().any(|s| *s != [0.0, 0.0]));

        for channel in [0, 2] {
            for stage in [FilterStage::CausalHighpass, FilterStage::CausalNotch] {
                let line = bank.delay_line(channel, stage).unwrap();
                assert!(line.state().iter().all(|s| *s == [0.0, 0.0]));
            }
        }
        assert!(bank.delay_line(1, FilterStage::Detrend).is_none());
    }

    #[test]
    fn test_reset_restores_initial_response() {
        let input = eeg_like(300);
        let mut bank = bank(2);
        let first = bank.apply_chain(&input, 0, &causal_only()).unwrap();
        let second = bank.apply_chain(&input, 0, &causal_only()).unwrap();
        assert_ne!(first, second);

        bank.reset_channel(0).unwrap();
        let after_reset = bank.apply_chain(&input, 0, &causal_only()).unwrap();
        assert_eq!(first, after_reset);

        bank.apply_chain(&input, 1, &causal_only()).unwrap();
        bank.reset();
        assert_eq!(bank.apply_chain(&input, 1, &causal_only()).unwrap(), first);
    }

    #[test]
    fn test_channel_out_of_range() {
        let mut bank = bank(2);
        let result = bank.apply_chain(&[1.0, 2.0], 2, &FilterChainSettings::default());
        assert!(matches!(result, Err(EegError::ChannelOutOfRange { index: 2, channel_count: 2 })));
        assert!(bank.reset_channel(5).is_err());
    }

    proptest! {
        #[test]
        fn bypassed_chain_is_identity(window in prop::collection::vec(-500.0f64..500.0, 0..700)) {
            let mut bank = bank(1);
            let output = bank.apply_chain(&window, 0, &FilterChainSettings::bypass()).unwrap();
            prop_assert_eq!(output, window);
        }

        #[test]
        fn causal_stages_do_not_depend_on_window_split(
            window in prop::collection::vec(-200.0f64..200.0, 2..400),
            split in 0usize..400,
        ) {
            let split = split % window.len();
            let settings = causal_only();

            let mut whole = bank(1);
            let expected = whole.apply_chain(&window, 0, &settings).unwrap();

            let mut pieces = bank(1);
            let mut actual = pieces.apply_chain(&window[..split], 0, &settings).unwrap();
            actual.extend(pieces.apply_chain(&window[split..], 0, &settings).unwrap());

            prop_assert_eq!(actual, expected);
        }
    }
}

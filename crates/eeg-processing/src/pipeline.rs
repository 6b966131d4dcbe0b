//! Tick orchestrator: acquisition -> filter chain -> quality + spectrum -> sink

use crate::classifier::QualityClassifier;
use crate::config::MonitorConfig;
use crate::filter_bank::FilterBank;
use crate::settings::{FilterChainSettings, RuntimeSettings};
use crate::spectral::{BandAggregate, SpectralAnalyzer};
use eeg_core::{
    derive_difference, Band, BandPowers, Channel, ChannelLayout, ChannelRole, EegError, EegResult,
    QualityAssessment, SampleSource, SpectralEstimate,
};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Presentation side of the monitor
pub trait ResultSink {
    fn publish(&mut self, report: &TickReport);
}

impl<K: ResultSink + ?Sized> ResultSink for Box<K> {
    fn publish(&mut self, report: &TickReport) {
        (**self).publish(report)
    }
}

/// Keeps every report, mostly useful in tests
impl ResultSink for Vec<TickReport> {
    fn publish(&mut self, report: &TickReport) {
        self.push(report.clone());
    }
}

/// Everything computed for one visible channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelOutput {
    pub channel: usize,
    pub name: String,
    pub filtered_samples: Vec<f64>,
    pub assessment: QualityAssessment,
    /// PSD cut to the display bins, absent for short windows
    pub spectrum: Option<SpectralEstimate>,
    pub band_powers: Option<BandPowers>,
}

impl ChannelOutput {
    pub fn label1_text(&self) -> String {
        self.assessment.time_summary()
    }

    pub fn label2_text(&self) -> Option<String> {
        self.assessment.frequency_summary()
    }

    pub fn psd_frequencies(&self) -> Option<&[f64]> {
        self.spectrum.as_ref().map(SpectralEstimate::frequencies)
    }

    pub fn psd_powers(&self) -> Option<&[f64]> {
        self.spectrum.as_ref().map(SpectralEstimate::powers)
    }
}

/// Per-channel slot of a tick report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelFrame {
    Computed(ChannelOutput),
    /// Skipped by visibility; previous outputs are cleared
    Hidden { channel: usize },
    /// Contained failure, the rest of the tick went on
    Failed { channel: usize, reason: String },
}

impl ChannelFrame {
    pub fn channel(&self) -> usize {
        match self {
            ChannelFrame::Computed(output) => output.channel,
            ChannelFrame::Hidden { channel } | ChannelFrame::Failed { channel, .. } => *channel,
        }
    }

    pub fn output(&self) -> Option<&ChannelOutput> {
        match self {
            ChannelFrame::Computed(output) => Some(output),
            _ => None,
        }
    }
}

/// Timing and outcome counts of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TickMetrics {
    pub processing_time_us: u64,
    pub computed: usize,
    pub hidden: usize,
    pub failed: usize,
    /// Channels that contributed to the band aggregate
    pub spectra: usize,
}

struct TickTimer {
    start_time: Instant,
    metrics: TickMetrics,
}

impl TickTimer {
    fn start() -> Self {
        TickTimer {
            start_time: Instant::now(),
            metrics: TickMetrics::default(),
        }
    }

    fn record(&mut self, frame: &ChannelFrame) {
        match frame {
            ChannelFrame::Computed(_) => self.metrics.computed += 1,
            ChannelFrame::Hidden { .. } => self.metrics.hidden += 1,
            ChannelFrame::Failed { .. } => self.metrics.failed += 1,
        }
    }

    fn finish(mut self, spectra: usize) -> TickMetrics {
        self.metrics.processing_time_us = self.start_time.elapsed().as_micros() as u64;
        self.metrics.spectra = spectra;
        self.metrics
    }
}

/// Result bundle published once per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub settings_revision: u64,
    /// One frame per configured channel, in layout order
    pub channels: Vec<ChannelFrame>,
    /// Share of each band across contributing channels, in percent
    pub band_percentages: [f64; Band::COUNT],
    pub metrics: TickMetrics,
}

impl TickReport {
    pub fn frame(&self, channel: usize) -> Option<&ChannelFrame> {
        self.channels.get(channel)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &ChannelOutput> + '_ {
        self.channels.iter().filter_map(ChannelFrame::output)
    }
}

/// Drives one tick at a time over every channel of the layout
pub struct Orchestrator {
    layout: ChannelLayout,
    sampling_rate: f64,
    window_len: usize,
    segment_size: usize,
    psd_display_bins: usize,
    bank: FilterBank,
    analyzer: SpectralAnalyzer,
    classifier: QualityClassifier,
    settings: watch::Receiver<RuntimeSettings>,
    last_revision: Option<u64>,
    tick: u64,
}

impl Orchestrator {
    pub fn new(config: &MonitorConfig, settings: watch::Receiver<RuntimeSettings>) -> EegResult<Self> {
        config.validate()?;

        let bank = FilterBank::new(
            config.sampling_rate,
            config.line_frequency,
            config.channels.len(),
            &config.design,
        )?;

        info!(
            name = %config.name,
            channels = config.channels.len(),
            sampling_rate = config.sampling_rate,
            window_len = config.window_len(),
            "orchestrator ready"
        );

        Ok(Orchestrator {
            layout: config.channels.clone(),
            sampling_rate: config.sampling_rate,
            window_len: config.window_len(),
            segment_size: config.segment_size(),
            psd_display_bins: config.psd_display_bins,
            bank,
            analyzer: SpectralAnalyzer::new(),
            classifier: QualityClassifier::new(config.quality.clone(), config.line_frequency),
            settings,
            last_revision: None,
            tick: 0,
        })
    }

    /// Run one full tick and publish its report
    pub fn run_tick<S, K>(&mut self, source: &mut S, sink: &mut K) -> TickReport
    where
        S: SampleSource + ?Sized,
        K: ResultSink + ?Sized,
    {
        let mut timer = TickTimer::start();
        self.tick += 1;

        let settings = self.settings.borrow_and_update().clone();
        if self.last_revision != Some(settings.revision) {
            if self.last_revision.is_some() {
                info!(revision = settings.revision, "runtime settings changed");
            }
            self.last_revision = Some(settings.revision);
        }

        if let Err(err) = source.begin_tick() {
            error!(tick = self.tick, error = %err, "acquisition failed to start tick");
        }

        let mut aggregate = BandAggregate::new();
        let mut frames = Vec::with_capacity(self.layout.len());

        for index in 0..self.layout.len() {
            let frame = if settings.is_visible(index) {
                self.computed_frame(index, source, &settings.filters)
            } else {
                ChannelFrame::Hidden { channel: index }
            };

            if let Some(powers) = frame.output().and_then(|output| output.band_powers.as_ref()) {
                aggregate.add(powers);
            }
            timer.record(&frame);
            frames.push(frame);
        }

        let metrics = timer.finish(aggregate.contributors());
        debug!(
            tick = self.tick,
            elapsed_us = metrics.processing_time_us,
            computed = metrics.computed,
            failed = metrics.failed,
            "tick processed"
        );

        let report = TickReport {
            tick: self.tick,
            settings_revision: settings.revision,
            channels: frames,
            band_percentages: aggregate.percentages(),
            metrics,
        };
        sink.publish(&report);
        report
    }

    /// Clear the causal filter state of every channel
    pub fn reset_filters(&mut self) {
        self.bank.reset();
        info!("filter state reset");
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    pub fn filter_bank(&self) -> &FilterBank {
        &self.bank
    }

    fn computed_frame<S>(&mut self, index: usize, source: &mut S, filters: &FilterChainSettings) -> ChannelFrame
    where
        S: SampleSource + ?Sized,
    {
        let Some(channel) = self.layout.get(index).cloned() else {
            return ChannelFrame::Failed {
                channel: index,
                reason: "channel missing from layout".to_string(),
            };
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| self.process_channel(&channel, source, filters)));

        match outcome {
            Ok(Ok(output)) => ChannelFrame::Computed(output),
            Ok(Err(err)) => {
                error!(channel = %channel, error = %err, "channel processing failed");
                ChannelFrame::Failed {
                    channel: index,
                    reason: err.to_string(),
                }
            }
            Err(payload) => {
                let err = EegError::ChannelPanicked {
                    channel: index,
                    message: panic_message(payload.as_ref()),
                };
                error!(channel = %channel, error = %err, "channel processing panicked");
                // delay lines may hold a half-processed window
                if let Err(reset_err) = self.bank.reset_channel(index) {
                    debug!(channel = index, error = %reset_err, "could not reset filter state");
                }
                ChannelFrame::Failed {
                    channel: index,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn process_channel<S>(
        &mut self,
        channel: &Channel,
        source: &mut S,
        filters: &FilterChainSettings,
    ) -> EegResult<ChannelOutput>
    where
        S: SampleSource + ?Sized,
    {
        let raw = raw_window(&self.layout, channel, source, self.window_len)?;
        let filtered = self.bank.apply_chain(&raw, channel.index, filters)?;

        let estimate = self
            .analyzer
            .estimate_psd(&filtered, self.sampling_rate, self.segment_size);
        let assessment = self.classifier.classify(&filtered, estimate.as_ref());
        let band_powers = assessment.frequency_metrics.map(|m| m.band_powers);

        Ok(ChannelOutput {
            channel: channel.index,
            name: channel.name.clone(),
            filtered_samples: filtered,
            assessment,
            spectrum: estimate.map(|e| e.truncated(self.psd_display_bins)),
            band_powers,
        })
    }
}

/// Raw window of a channel; derived channels subtract their sources' raw windows
fn raw_window<S>(layout: &ChannelLayout, channel: &Channel, source: &mut S, len: usize) -> EegResult<Vec<f64>>
where
    S: SampleSource + ?Sized,
{
    match channel.role {
        ChannelRole::Physical { row } => source.latest_window(row, len),
        ChannelRole::Derived { minuend, subtrahend } => {
            let minuend = source.latest_window(layout.row_of(minuend)?, len)?;
            let subtrahend = source.latest_window(layout.row_of(subtrahend)?, len)?;
            Ok(derive_difference(&minuend, &subtrahend))
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsHandle;
    use eeg_core::TimeDomainLabel;
    use std::collections::HashMap;

    /// Fixed windows per row; unknown rows fail
    #[derive(Default)]
    struct FixedSource {
        rows: HashMap<usize, Vec<f64>>,
        panic_row: Option<usize>,
        ticks: usize,
    }

    impl FixedSource {
        fn uniform(rows: usize, samples: Vec<f64>) -> Self {
            FixedSource {
                rows: (0..rows).map(|row| (row, samples.clone())).collect(),
                ..Default::default()
            }
        }
    }

    impl SampleSource for FixedSource {
        fn begin_tick(&mut self) -> EegResult<()> {
            self.ticks += 1;
            Ok(())
        }

        fn latest_window(&mut self, row: usize, len: usize) -> EegResult<Vec<f64>> {
            if self.panic_row == Some(row) {
                panic!("row {} exploded", row);
            }
            let data = self.rows.get(&row).ok_or_else(|| EegError::AcquisitionError {
                row,
                reason: "no such row".to_string(),
            })?;
            let start = data.len().saturating_sub(len);
            Ok(data[start..].to_vec())
        }
    }

    fn small_layout() -> ChannelLayout {
        ChannelLayout::new(vec![
            Channel::physical(0, "A", 0),
            Channel::physical(1, "B", 1),
            Channel::physical(2, "C", 2),
            Channel::physical(3, "D", 3),
            Channel::derived(4, "C-D", 2, 3),
        ])
        .unwrap()
    }

    fn setup(filters: FilterChainSettings) -> (Orchestrator, SettingsHandle) {
        let config = MonitorConfig {
            channels: small_layout(),
            filters,
            ..Default::default()
        };
        let (handle, receiver) = SettingsHandle::new(config.runtime_settings());
        (Orchestrator::new(&config, receiver).unwrap(), handle)
    }

    fn sine(freq: f64, amplitude: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f64::consts::PI * freq * i as f64 / 512.0).sin())
            .collect()
    }

    #[test]
    fn test_derived_channel_difference() {
        let (mut orchestrator, _handle) = setup(FilterChainSettings::bypass());
        let mut source = FixedSource::uniform(4, vec![0.0; 3]);
        source.rows.insert(2, vec![5.0, 5.0, 5.0]);
        source.rows.insert(3, vec![2.0, 2.0, 2.0]);

        let mut sink: Vec<TickReport> = Vec::new();
        let report = orchestrator.run_tick(&mut source, &mut sink);

        let derived = report.frame(4).and_then(ChannelFrame::output).unwrap();
        assert_eq!(derived.filtered_samples, vec![3.0, 3.0, 3.0]);
        assert_eq!(derived.name, "C-D");
        assert!(derived.spectrum.is_none());
        assert!(derived.label2_text().is_none());
        assert_eq!(sink.len(), 1);
        assert_eq!(source.ticks, 1);
    }

    #[test]
    fn test_hidden_channel_is_skipped() {
        let (mut orchestrator, handle) = setup(FilterChainSettings::bypass());
        let mut source = FixedSource::uniform(4, sine(10.0, 20.0, 2048));

        handle.set_channel_visible(1, false);
        let report = orchestrator.run_tick(&mut source, &mut Vec::<TickReport>::new());

        assert_eq!(report.settings_revision, 1);
        assert_eq!(report.frame(1), Some(&ChannelFrame::Hidden { channel: 1 }));
        assert_eq!(report.metrics.hidden, 1);
        assert_eq!(report.metrics.computed, 4);
        assert_eq!(report.metrics.spectra, 4);
    }

    #[test]
    fn test_all_hidden_gives_empty_aggregate() {
        let (mut orchestrator, handle) = setup(FilterChainSettings::bypass());
        let mut source = FixedSource::uniform(4, sine(10.0, 20.0, 2048));
        for channel in 0..5 {
            handle.set_channel_visible(channel, false);
        }

        let report = orchestrator.run_tick(&mut source, &mut Vec::<TickReport>::new());
        assert_eq!(report.band_percentages, [0.0; Band::COUNT]);
        assert_eq!(report.outputs().count(), 0);
    }

    #[test]
    fn test_aggregate_sums_to_hundred() {
        let (mut orchestrator, _handle) = setup(FilterChainSettings {
            detrend: true,
            ..FilterChainSettings::bypass()
        });
        let mut source = FixedSource::uniform(4, sine(10.0, 20.0, 2048));

        let report = orchestrator.run_tick(&mut source, &mut Vec::<TickReport>::new());
        let sum: f64 = report.band_percentages.iter().sum();
        assert!((sum - 100.0).abs() < 1e-6, "sum {}", sum);
        assert!(report.band_percentages[Band::Alpha.position()] > 90.0);

        let output = report.outputs().next().unwrap();
        assert_eq!(output.psd_frequencies().map(<[f64]>::len), Some(257));
        assert!(output.label2_text().is_some());
    }

    #[test]
    fn test_failing_row_is_contained() {
        let (mut orchestrator, _handle) = setup(FilterChainSettings::default());
        let mut source = FixedSource::uniform(4, sine(10.0, 20.0, 2048));
        source.rows.remove(&0);

        let report = orchestrator.run_tick(&mut source, &mut Vec::<TickReport>::new());
        assert!(matches!(report.frame(0), Some(ChannelFrame::Failed { channel: 0, .. })));
        assert_eq!(report.metrics.failed, 1);
        assert_eq!(report.metrics.computed, 4);
    }

    #[test]
    fn test_panicking_channel_is_contained() {
        let (mut orchestrator, _handle) = setup(FilterChainSettings::default());
        let mut source = FixedSource::uniform(4, sine(10.0, 20.0, 2048));
        source.panic_row = Some(3);

        let report = orchestrator.run_tick(&mut source, &mut Vec::<TickReport>::new());
        // row 3 feeds channel D and the derived channel
        assert!(matches!(report.frame(3), Some(ChannelFrame::Failed { .. })));
        assert!(matches!(report.frame(4), Some(ChannelFrame::Failed { .. })));
        if let Some(ChannelFrame::Failed { reason, .. }) = report.frame(3) {
            assert!(reason.contains("row 3 exploded"));
        }
        assert_eq!(report.metrics.computed, 3);
    }

    #[test]
    fn test_short_window_has_no_spectrum() {
        let (mut orchestrator, _handle) = setup(FilterChainSettings::default());
        let mut source = FixedSource::uniform(4, sine(10.0, 20.0, 300));

        let report = orchestrator.run_tick(&mut source, &mut Vec::<TickReport>::new());
        assert!(report.outputs().all(|output| output.spectrum.is_none()));
        assert_eq!(report.metrics.spectra, 0);
        assert_eq!(report.band_percentages, [0.0; Band::COUNT]);
    }

    #[test]
    fn test_silent_channels_give_empty_aggregate() {
        let (mut orchestrator, _handle) = setup(FilterChainSettings::bypass());
        let mut source = FixedSource::uniform(4, vec![0.0; 2048]);

        let report = orchestrator.run_tick(&mut source, &mut Vec::<TickReport>::new());
        assert_eq!(report.metrics.spectra, 5);
        assert!(report.outputs().all(|output| output.spectrum.is_some()));
        assert_eq!(report.band_percentages, [0.0; Band::COUNT]);
    }

    #[test]
    fn test_short_windows_left_out_of_aggregate() {
        let (mut orchestrator, _handle) = setup(FilterChainSettings {
            detrend: true,
            ..FilterChainSettings::bypass()
        });
        let mut source = FixedSource::uniform(4, sine(10.0, 20.0, 2048));
        // rows 2 and 3 also feed the derived channel
        source.rows.insert(2, sine(2.0, 500.0, 300));
        source.rows.insert(3, sine(2.0, 500.0, 300));

        let report = orchestrator.run_tick(&mut source, &mut Vec::<TickReport>::new());
        assert_eq!(report.metrics.computed, 5);
        assert_eq!(report.metrics.spectra, 2);
        for channel in 2..5 {
            assert!(report.frame(channel).and_then(ChannelFrame::output).unwrap().spectrum.is_none());
        }

        let sum: f64 = report.band_percentages.iter().sum();
        assert!((sum - 100.0).abs() < 1e-6, "sum {}", sum);
        assert!(report.band_percentages[Band::Alpha.position()] > 90.0);
        assert!(report.band_percentages[Band::Delta.position()] < 5.0);
    }

    #[test]
    fn test_zeros_through_full_chain() {
        let (mut orchestrator, _handle) = setup(FilterChainSettings::all_enabled());
        let mut source = FixedSource::uniform(4, vec![0.0; 512]);

        let report = orchestrator.run_tick(&mut source, &mut Vec::<TickReport>::new());
        for output in report.outputs() {
            assert!(output.filtered_samples.iter().all(|x| x.abs() < 1e-12));
            assert_eq!(output.assessment.time_label, TimeDomainLabel::Flat);
        }
        assert_eq!(report.metrics.computed, 5);
    }

    #[test]
    fn test_ticks_are_counted() {
        let (mut orchestrator, handle) = setup(FilterChainSettings::default());
        let mut source = FixedSource::uniform(4, sine(10.0, 20.0, 1024));
        let mut sink: Vec<TickReport> = Vec::new();

        orchestrator.run_tick(&mut source, &mut sink);
        handle.set_stage_enabled(crate::filter_bank::FilterStage::CausalNotch, true);
        orchestrator.run_tick(&mut source, &mut sink);
        orchestrator.reset_filters();

        assert_eq!(orchestrator.ticks(), 2);
        assert_eq!(sink[0].settings_revision, 0);
        assert_eq!(sink[1].settings_revision, 1);
        assert_eq!(sink[1].tick, 2);
    }
}

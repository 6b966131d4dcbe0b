//! Benchmarks for the per-tick hot paths: filter chain and Welch estimate

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use eeg_core::{EegResult, SampleSource};
use eeg_processing::{
    FilterBank, FilterChainSettings, FilterDesignParams, MonitorConfig, Orchestrator,
    SettingsHandle, SpectralAnalyzer, TickReport,
};

const FS: f64 = 512.0;

fn test_signal(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let t = i as f64 / FS;
            40.0 * (2.0 * std::f64::consts::PI * 10.0 * t).sin()
                + 15.0 * (2.0 * std::f64::consts::PI * 50.0 * t).sin()
                + 5.0
        })
        .collect()
}

/// Benchmark the filter chain with the default and the full stage set
fn bench_filter_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_chain");
    let chains = [
        ("default", FilterChainSettings::default()),
        ("all_enabled", {
            let mut settings = FilterChainSettings::all_enabled();
            settings.bandpass_cutoffs.high = "100.0".to_string();
            settings
        }),
    ];

    for len in [512, 2048] {
        let window = test_signal(len);
        for (name, settings) in &chains {
            let mut bank = FilterBank::new(FS, 50.0, 1, &FilterDesignParams::default()).unwrap();
            group.bench_with_input(BenchmarkId::new(*name, len), &window, |b, window| {
                b.iter(|| black_box(bank.apply_chain(black_box(window), 0, settings).unwrap()));
            });
        }
    }

    group.finish();
}

/// Benchmark Welch PSD estimation
fn bench_welch(c: &mut Criterion) {
    let mut group = c.benchmark_group("welch_psd");
    let mut analyzer = SpectralAnalyzer::new();

    for segment in [256, 512, 1024] {
        let window = test_signal(2048);
        group.bench_with_input(BenchmarkId::from_parameter(segment), &window, |b, window| {
            b.iter(|| black_box(analyzer.estimate_psd(black_box(window), FS, segment)));
        });
    }

    group.finish();
}

struct StaticSource(Vec<f64>);

impl SampleSource for StaticSource {
    fn latest_window(&mut self, _row: usize, len: usize) -> EegResult<Vec<f64>> {
        let start = self.0.len().saturating_sub(len);
        Ok(self.0[start..].to_vec())
    }
}

/// Benchmark a full tick over the default nine-channel layout
fn bench_full_tick(c: &mut Criterion) {
    let config = MonitorConfig::default();
    let (_handle, receiver) = SettingsHandle::new(config.runtime_settings());
    let mut orchestrator = Orchestrator::new(&config, receiver).unwrap();
    let mut source = StaticSource(test_signal(config.window_len()));

    c.bench_function("full_tick", |b| {
        b.iter(|| {
            let mut sink: Vec<TickReport> = Vec::new();
            black_box(orchestrator.run_tick(&mut source, &mut sink))
        });
    });
}

criterion_group!(benches, bench_filter_chain, bench_welch, bench_full_tick);
criterion_main!(benches);

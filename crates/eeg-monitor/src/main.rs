//! EEG monitor: synthetic board -> processing pipeline -> log output

mod sink;

use anyhow::Context;
use eeg_processing::{run_ticks, MonitorCommand, MonitorConfig, Orchestrator, SettingsHandle};
use eeg_simulation::{SyntheticBoard, SyntheticConfig};
use sink::LogSink;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

fn load_config(path: Option<&str>) -> anyhow::Result<MonitorConfig> {
    let config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path))?;
            MonitorConfig::from_json(&json).with_context(|| format!("Invalid config file {}", path))?
        }
        None => MonitorConfig::default(),
    };
    config.validate().context("Configuration rejected")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args().nth(1);
    let config = load_config(config_path.as_deref())?;
    info!(name = %config.name, sampling_rate = config.sampling_rate, "starting EEG monitor");

    let mut board = SyntheticBoard::new(SyntheticConfig {
        sampling_rate: config.sampling_rate,
        line_frequency: Some(config.line_frequency),
        history_seconds: (config.window_seconds * 2.0).max(1.0),
        ..Default::default()
    })
    .context("Failed to create synthetic board")?;

    let (settings, receiver) = SettingsHandle::new(config.runtime_settings());
    let mut orchestrator = Orchestrator::new(&config, receiver).context("Failed to build pipeline")?;
    let mut sink = LogSink::new(4);

    for (row, pattern) in board.config().rows.iter().enumerate() {
        debug!(row, "synthetic row: {}", pattern.description());
    }
    let layout = orchestrator.layout();
    let derived = layout.channels().iter().filter(|channel| channel.is_derived()).count();
    info!(channels = layout.len(), derived, "channel layout ready");

    let (commands, mut command_receiver) = mpsc::channel(8);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, stopping"),
            Err(err) => warn!(error = %err, "cannot listen for interrupt, stopping"),
        }
        let _ = commands.send(MonitorCommand::Stop).await;
    });

    let summary = run_ticks(
        &mut orchestrator,
        &mut board,
        &mut sink,
        config.tick_period(),
        &mut command_receiver,
    )
    .await;

    info!(
        ticks = summary.ticks_run,
        failed_ticks = summary.ticks_failed,
        published = sink.published(),
        settings_revision = settings.current().revision,
        samples = board.samples_generated(),
        "EEG monitor stopped"
    );
    Ok(())
}

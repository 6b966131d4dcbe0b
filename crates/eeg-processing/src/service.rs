//! Periodic tick driver on the tokio runtime

use crate::pipeline::{panic_message, Orchestrator, ResultSink};
use eeg_core::SampleSource;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Control messages accepted while the loop runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCommand {
    Pause,
    Resume,
    ResetFilters,
    Stop,
}

/// How a tick loop ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub ticks_run: u64,
    /// Ticks that panicked outside per-channel processing
    pub ticks_failed: u64,
    /// Interval ticks skipped while paused
    pub ticks_paused: u64,
}

/// Run ticks every `period` until `Stop` arrives or the command channel closes.
///
/// Ticks run one after another on this task, so a slow tick delays the next
/// one instead of overlapping it. Missed deadlines are skipped. Pending
/// commands are handled before the next tick. A tick that panics, in the
/// source or the sink included, is logged and the loop keeps going.
pub async fn run_ticks<S, K>(
    orchestrator: &mut Orchestrator,
    source: &mut S,
    sink: &mut K,
    period: Duration,
    commands: &mut mpsc::Receiver<MonitorCommand>,
) -> LoopSummary
where
    S: SampleSource + ?Sized,
    K: ResultSink + ?Sized,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut summary = LoopSummary::default();
    let mut paused = false;

    info!(period_ms = period.as_millis() as u64, "tick loop started");

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(MonitorCommand::Pause) => {
                    paused = true;
                    info!("tick loop paused");
                }
                Some(MonitorCommand::Resume) => {
                    paused = false;
                    info!("tick loop resumed");
                }
                Some(MonitorCommand::ResetFilters) => orchestrator.reset_filters(),
                Some(MonitorCommand::Stop) | None => break,
            },
            _ = ticker.tick() => {
                if paused {
                    summary.ticks_paused += 1;
                    continue;
                }
                summary.ticks_run += 1;
                match catch_unwind(AssertUnwindSafe(|| orchestrator.run_tick(source, sink))) {
                    Ok(report) => {
                        debug!(tick = report.tick, failed = report.metrics.failed, "tick published");
                    }
                    Err(payload) => {
                        summary.ticks_failed += 1;
                        error!(
                            tick = orchestrator.ticks(),
                            message = %panic_message(payload.as_ref()),
                            "tick panicked, loop continues"
                        );
                    }
                }
            }
        }
    }

    info!(ticks = summary.ticks_run, failed = summary.ticks_failed, "tick loop stopped");
    summary
}

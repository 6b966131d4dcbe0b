//! Result sink that reports ticks through the log

use eeg_core::Band;
use eeg_processing::{ChannelFrame, ResultSink, TickReport};
use tracing::{debug, info, warn};

/// Logs the band aggregate every `summary_every` ticks and the channel
/// status lines at debug level
pub struct LogSink {
    summary_every: u64,
    published: u64,
}

impl LogSink {
    pub fn new(summary_every: u64) -> Self {
        LogSink {
            summary_every: summary_every.max(1),
            published: 0,
        }
    }

    pub fn published(&self) -> u64 {
        self.published
    }
}

impl ResultSink for LogSink {
    fn publish(&mut self, report: &TickReport) {
        self.published += 1;

        for frame in &report.channels {
            match frame {
                ChannelFrame::Computed(output) => {
                    debug!(channel = %output.name, "{}", output.label1_text());
                    if let Some(line) = output.label2_text() {
                        debug!(channel = %output.name, "{}", line);
                    }
                }
                ChannelFrame::Hidden { .. } => {}
                ChannelFrame::Failed { channel, reason } => {
                    warn!(channel, tick = report.tick, "{}", reason);
                }
            }
        }

        if self.published % self.summary_every == 0 {
            let bands: Vec<String> = Band::ALL
                .iter()
                .zip(report.band_percentages)
                .map(|(band, share)| format!("{} {:.1}%", band.symbol(), share))
                .collect();
            info!(
                tick = report.tick,
                spectra = report.metrics.spectra,
                elapsed_us = report.metrics.processing_time_us,
                "bands: {}",
                bands.join(" | ")
            );
        }
    }
}

//! Acquisition seam: where raw sample windows come from

use crate::error::EegResult;

/// Supplier of raw sample windows, one row per electrode
pub trait SampleSource {
    /// Called once at the start of every tick, before any window is read
    fn begin_tick(&mut self) -> EegResult<()> {
        Ok(())
    }

    /// Most recent `len` samples of `row`, oldest first.
    ///
    /// Returns fewer samples when the history is not long enough yet.
    fn latest_window(&mut self, row: usize, len: usize) -> EegResult<Vec<f64>>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn begin_tick(&mut self) -> EegResult<()> {
        (**self).begin_tick()
    }

    fn latest_window(&mut self, row: usize, len: usize) -> EegResult<Vec<f64>> {
        (**self).latest_window(row, len)
    }
}

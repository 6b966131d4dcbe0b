//! EEG-Simulation: synthetic acquisition for the EEG monitor
//!
//! Generates EEG-like rows (alpha rhythm, 1/f background, mains
//! interference) into a bounded per-row history and serves windows
//! through [`eeg_core::SampleSource`].

pub mod board;
pub mod patterns;

pub use board::*;
pub use patterns::*;

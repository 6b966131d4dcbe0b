//! EEG-Core: Foundation types for the EEG monitor
//!
//! Channel layout, spectral and quality data types, the acquisition
//! trait and the shared error type.

pub mod acquisition;
pub mod channel;
pub mod error;
pub mod quality;
pub mod spectrum;

pub use acquisition::SampleSource;
pub use channel::*;
pub use error::{EegError, EegResult};
pub use quality::*;
pub use spectrum::*;

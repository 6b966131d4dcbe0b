//! Error handling for the EEG monitor
//!
//! One error type shared by every crate of the workspace. Most runtime
//! problems are recoverable and degrade a single stage or channel; the
//! variants here carry enough context to log them.

use core::fmt;

/// Result type alias for EEG monitor operations
pub type EegResult<T> = Result<T, EegError>;

/// Error type for all EEG monitor operations
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EegError {
    /// Channel layout failed startup validation
    InvalidChannelLayout {
        /// Description of the layout problem
        reason: String,
    },

    /// Sampling rate outside the supported range
    InvalidSamplingRate {
        /// Provided sampling rate
        rate: f64,
        /// Valid range description
        valid_range: &'static str,
    },

    /// Band-pass cutoff text that cannot be turned into a usable band
    InvalidCutoff {
        /// Raw low cutoff as entered
        low: String,
        /// Raw high cutoff as entered
        high: String,
        /// Why the pair was rejected
        reason: &'static str,
    },

    /// Filter coefficients could not be designed
    InvalidFilterDesign {
        /// Description of the design problem
        reason: String,
    },

    /// Spectrum bins and powers that do not pair up
    InvalidSpectrum {
        /// Description of the mismatch
        reason: String,
    },

    /// Static configuration rejected
    ConfigurationError {
        /// Description of the configuration error
        message: String,
    },

    /// Acquisition layer could not deliver a window
    AcquisitionError {
        /// Acquisition row that was requested
        row: usize,
        /// Source-specific description
        reason: String,
    },

    /// Channel index not covered by the configured layout
    ChannelOutOfRange {
        /// Requested channel index
        index: usize,
        /// Number of configured channels
        channel_count: usize,
    },

    /// Processing of one channel panicked and was contained
    ChannelPanicked {
        /// Channel whose pipeline panicked
        channel: usize,
        /// Panic payload, when it was a string
        message: String,
    },
}

impl fmt::Display for EegError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EegError::InvalidChannelLayout { reason } => {
                write!(f, "Invalid channel layout: {}", reason)
            }
            EegError::InvalidSamplingRate { rate, valid_range } => {
                write!(f, "Invalid sampling rate: {}Hz, valid range: {}",
                       rate, valid_range)
            }
            EegError::InvalidCutoff { low, high, reason } => {
                write!(f, "Invalid band-pass cutoffs ({:?}, {:?}): {}",
                       low, high, reason)
            }
            EegError::InvalidFilterDesign { reason } => {
                write!(f, "Filter design error: {}", reason)
            }
            EegError::InvalidSpectrum { reason } => {
                write!(f, "Invalid spectral estimate: {}", reason)
            }
            EegError::ConfigurationError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            EegError::AcquisitionError { row, reason } => {
                write!(f, "Acquisition error on row {}: {}", row, reason)
            }
            EegError::ChannelOutOfRange { index, channel_count } => {
                write!(f, "Channel {} out of range, layout has {} channels",
                       index, channel_count)
            }
            EegError::ChannelPanicked { channel, message } => {
                write!(f, "Processing of channel {} panicked: {}", channel, message)
            }
        }
    }
}

impl std::error::Error for EegError {}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::EegError::ConfigurationError {
            message: format!($($arg)*)
        }
    };
}

/// Convenience macro for creating layout errors
#[macro_export]
macro_rules! layout_error {
    ($($arg:tt)*) => {
        $crate::error::EegError::InvalidChannelLayout {
            reason: format!($($arg)*)
        }
    };
}

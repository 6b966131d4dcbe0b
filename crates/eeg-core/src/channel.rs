//! Channel layout: physical electrodes plus derived difference channels

use serde::{Deserialize, Serialize};
use crate::error::{EegError, EegResult};

/// Where the samples of a channel come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelRole {
    /// Read directly from an acquisition row
    Physical {
        row: usize,
    },
    /// Element-wise difference `minuend - subtrahend` of two physical channels
    Derived {
        minuend: usize,
        subtrahend: usize,
    },
}

/// One displayed channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Position in the layout, also the index used by the filter bank
    pub index: usize,
    /// Display name (electrode label)
    pub name: String,
    pub role: ChannelRole,
}

impl Channel {
    pub fn physical(index: usize, name: impl Into<String>, row: usize) -> Self {
        Channel {
            index,
            name: name.into(),
            role: ChannelRole::Physical { row },
        }
    }

    pub fn derived(index: usize, name: impl Into<String>, minuend: usize, subtrahend: usize) -> Self {
        Channel {
            index,
            name: name.into(),
            role: ChannelRole::Derived { minuend, subtrahend },
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.role, ChannelRole::Derived { .. })
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.role {
            ChannelRole::Physical { row } => write!(f, "{} (row {})", self.name, row),
            ChannelRole::Derived { minuend, subtrahend } => {
                write!(f, "{} (ch{} - ch{})", self.name, minuend, subtrahend)
            }
        }
    }
}

/// Immutable set of channels configured at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelLayout {
    channels: Vec<Channel>,
}

impl ChannelLayout {
    /// Maximum number of channels a layout may carry
    pub const MAX_CHANNELS: usize = 64;

    /// Build a layout and validate it
    pub fn new(channels: Vec<Channel>) -> EegResult<Self> {
        let layout = ChannelLayout { channels };
        layout.validate()?;
        Ok(layout)
    }

    /// Eight temporal/central electrodes on rows 1..=8 plus the C3-C4 derivation
    pub fn standard() -> Self {
        const NAMES: [&str; 8] = ["T7", "T8", "C3", "C4", "FC3", "FC4", "CP3", "CP4"];

        let mut channels: Vec<Channel> = NAMES
            .iter()
            .enumerate()
            .map(|(index, name)| Channel::physical(index, *name, index + 1))
            .collect();
        channels.push(Channel::derived(NAMES.len(), "C3\u{2013}C4", 2, 3));

        ChannelLayout { channels }
    }

    /// Check structural invariants of the layout
    pub fn validate(&self) -> EegResult<()> {
        if self.channels.is_empty() {
            return Err(crate::layout_error!("layout has no channels"));
        }
        if self.channels.len() > Self::MAX_CHANNELS {
            return Err(crate::layout_error!(
                "{} channels exceeds the maximum of {}",
                self.channels.len(),
                Self::MAX_CHANNELS
            ));
        }

        for (position, channel) in self.channels.iter().enumerate() {
            if channel.index != position {
                return Err(crate::layout_error!(
                    "channel {:?} has index {} but sits at position {}",
                    channel.name, channel.index, position
                ));
            }

            if let ChannelRole::Derived { minuend, subtrahend } = channel.role {
                if minuend == subtrahend {
                    return Err(crate::layout_error!(
                        "derived channel {:?} uses channel {} twice",
                        channel.name, minuend
                    ));
                }
                for source in [minuend, subtrahend] {
                    match self.channels.get(source).map(|c| c.role) {
                        Some(ChannelRole::Physical { .. }) => {}
                        Some(ChannelRole::Derived { .. }) => {
                            return Err(crate::layout_error!(
                                "derived channel {:?} refers to derived channel {}",
                                channel.name, source
                            ));
                        }
                        None => {
                            return Err(EegError::ChannelOutOfRange {
                                index: source,
                                channel_count: self.channels.len(),
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn get(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Acquisition row of a physical channel
    pub fn row_of(&self, index: usize) -> EegResult<usize> {
        match self.channels.get(index).map(|c| c.role) {
            Some(ChannelRole::Physical { row }) => Ok(row),
            Some(ChannelRole::Derived { .. }) => Err(crate::layout_error!(
                "channel {} is derived and has no acquisition row",
                index
            )),
            None => Err(EegError::ChannelOutOfRange {
                index,
                channel_count: self.channels.len(),
            }),
        }
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::standard()
    }
}

/// Element-wise `minuend - subtrahend`, truncated to the shorter input
pub fn derive_difference(minuend: &[f64], subtrahend: &[f64]) -> Vec<f64> {
    minuend
        .iter()
        .zip(subtrahend)
        .map(|(a, b)| a - b)
        .collect()
}

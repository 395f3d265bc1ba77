use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::SequencerError;
use crate::timing::Step;

/// Channel space is 4 bits, and a track's index is its input channel.
pub const MAX_TRACKS: usize = 16;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a track. Survives clones and edits, so it is what the
/// sequencer uses to find a track again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(u64);

impl TrackId {
    pub fn next() -> Self {
        Self(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Channel(u8);

impl Channel {
    pub fn index(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Channel {
    type Error = SequencerError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        if index > 15 {
            return Err(SequencerError::InvalidChannel(index));
        }
        Ok(Self(index))
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> u8 {
        channel.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    #[serde(skip, default = "TrackId::next")]
    id: TrackId,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub output_channels: Vec<Channel>,
    #[serde(default)]
    pub is_mute: bool,
    #[serde(default)]
    pub is_solo: bool,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TrackId::next(),
            name: name.into(),
            steps: Vec::new(),
            output_channels: Vec::new(),
            is_mute: false,
            is_solo: false,
        }
    }

    pub fn with_steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn with_output_channels(mut self, channels: impl IntoIterator<Item = Channel>) -> Self {
        self.output_channels.extend(channels);
        self
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Latest step end in beats, 0 for an empty track.
    pub fn duration(&self) -> f64 {
        self.steps.iter().map(Step::end).fold(0.0, f64::max)
    }
}

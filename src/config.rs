use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::SequencerError;
use crate::timing::Tempo;
use crate::track::{MAX_TRACKS, Track};

fn default_tick_interval_ms() -> u64 {
    1
}

/// Startup description of a sequencer, read from a RON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    pub name: String,
    #[serde(default)]
    pub tempo: Tempo,
    /// How often the playback thread wakes to emit due events.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl SequencerConfig {
    pub fn load(path: &Path) -> Result<Self, SequencerError> {
        let ron_string = fs::read_to_string(path)?;
        let config = Self::from_ron_str(&ron_string)?;
        tracing::info!(path = %path.display(), tracks = config.tracks.len(), "Loaded config");
        Ok(config)
    }

    pub fn from_ron_str(ron_string: &str) -> Result<Self, SequencerError> {
        let config: SequencerConfig = ron::from_str(ron_string)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SequencerError> {
        self.tempo.validate()?;
        if self.tracks.len() > MAX_TRACKS {
            return Err(SequencerError::CapacityExceeded);
        }
        for step in self.tracks.iter().flat_map(|t| t.steps.iter()) {
            step.validate()?;
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

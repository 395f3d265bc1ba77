use serde::{Deserialize, Serialize};

use crate::SequencerError;

/// Single scalar tempo plus bar length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    bpm: f64,
    beats_per_bar: u32,
}

impl Tempo {
    pub fn new(bpm: f64, beats_per_bar: u32) -> Result<Self, SequencerError> {
        let tempo = Self { bpm, beats_per_bar };
        tempo.validate()?;
        Ok(tempo)
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn beats_per_second(&self) -> f64 {
        self.bpm / 60.0
    }

    /// Deserialized tempos bypass `new`, so config loading calls this.
    pub fn validate(&self) -> Result<(), SequencerError> {
        if !self.bpm.is_finite() || self.bpm <= 0.0 || self.beats_per_bar == 0 {
            return Err(SequencerError::InvalidTempo {
                bpm: self.bpm,
                beats_per_bar: self.beats_per_bar,
            });
        }
        Ok(())
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beats_per_bar: 4,
        }
    }
}

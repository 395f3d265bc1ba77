use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::SequencerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Note(u8);

impl Note {
    pub fn number(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Note {
    type Error = SequencerError;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        if number > 127 {
            return Err(SequencerError::InvalidNote(number));
        }
        Ok(Self(number))
    }
}

impl From<Note> for u8 {
    fn from(note: Note) -> u8 {
        note.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Velocity(u8);

impl Velocity {
    pub const ZERO: Velocity = Velocity(0);
    pub const MAX: Velocity = Velocity(127);

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Velocity {
    type Error = SequencerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > 127 {
            return Err(SequencerError::InvalidVelocity(value));
        }
        Ok(Self(value))
    }
}

impl From<Velocity> for u8 {
    fn from(velocity: Velocity) -> u8 {
        velocity.0
    }
}

/// A chord (or single note) firing at `position` and held for `duration`,
/// both in beats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub position: f64,
    pub duration: f64,
    pub notes: BTreeSet<Note>,
    pub velocity: Velocity,
}

impl Step {
    pub fn new(
        position: f64,
        duration: f64,
        notes: impl IntoIterator<Item = Note>,
        velocity: Velocity,
    ) -> Result<Self, SequencerError> {
        let step = Self {
            position,
            duration,
            notes: notes.into_iter().collect(),
            velocity,
        };
        step.validate()?;
        Ok(step)
    }

    pub fn end(&self) -> f64 {
        self.position + self.duration
    }

    pub fn validate(&self) -> Result<(), SequencerError> {
        let position_ok = self.position.is_finite() && self.position >= 0.0;
        let duration_ok = self.duration.is_finite() && self.duration > 0.0;
        if !position_ok || !duration_ok {
            return Err(SequencerError::InvalidStep {
                position: self.position,
                duration: self.duration,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(n: u8) -> Note {
        Note::try_from(n).unwrap()
    }

    #[test]
    fn test_note_range() {
        assert!(Note::try_from(127).is_ok());
        assert!(matches!(
            Note::try_from(128),
            Err(SequencerError::InvalidNote(128))
        ));
        assert!(Velocity::try_from(200).is_err());
    }

    #[test]
    fn test_step_collapses_duplicate_notes() {
        let step = Step::new(0.0, 1.0, [note(64), note(60), note(64)], Velocity::MAX).unwrap();
        let numbers: Vec<u8> = step.notes.iter().map(|n| n.number()).collect();
        assert_eq!(numbers, vec![60, 64]);
        assert_eq!(step.end(), 1.0);
    }

    #[test]
    fn test_step_rejects_bad_timing() {
        assert!(Step::new(-1.0, 1.0, [note(60)], Velocity::MAX).is_err());
        assert!(Step::new(0.0, 0.0, [note(60)], Velocity::MAX).is_err());
        assert!(Step::new(f64::INFINITY, 1.0, [note(60)], Velocity::MAX).is_err());
    }
}

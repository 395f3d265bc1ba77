use crate::timing::{Note, Velocity};
use crate::track::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    NoteOn,
    NoteOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub kind: NoteKind,
    pub note: Note,
    pub velocity: Velocity,
}

impl NoteEvent {
    pub fn note_on(note: Note, velocity: Velocity) -> Self {
        Self {
            kind: NoteKind::NoteOn,
            note,
            velocity,
        }
    }

    pub fn note_off(note: Note, velocity: Velocity) -> Self {
        Self {
            kind: NoteKind::NoteOff,
            note,
            velocity,
        }
    }
}

/// A timeline entry, positioned in beats from the start of the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsoluteEvent {
    pub beat_offset: f64,
    pub track_index: usize,
    pub event: NoteEvent,
}

/// A note event bound for one output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutedNote {
    pub event: NoteEvent,
    pub channel: Channel,
}

/// Channel voice messages the sequencer cares about. Everything else on the
/// wire is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiMessage {
    pub channel: Channel,
    pub event: NoteEvent,
}

impl MidiMessage {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let &[status, note, velocity, ..] = bytes else {
            return None;
        };
        let channel = Channel::try_from(status & 0x0F).ok()?;
        let note = Note::try_from(note).ok()?;
        let velocity = Velocity::try_from(velocity).ok()?;

        let event = match status & 0xF0 {
            // Running-status style note off
            0x90 if velocity == Velocity::ZERO => NoteEvent::note_off(note, velocity),
            0x90 => NoteEvent::note_on(note, velocity),
            0x80 => NoteEvent::note_off(note, velocity),
            _ => return None,
        };

        Some(Self { channel, event })
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        let status = match self.event.kind {
            NoteKind::NoteOn => 0x90,
            NoteKind::NoteOff => 0x80,
        };
        [
            status | self.channel.index(),
            self.event.note.number(),
            self.event.velocity.value(),
        ]
    }
}

use crate::events::{AbsoluteEvent, NoteEvent};
use crate::track::{Track, TrackId};

use super::{Step, Tempo};

/// Compiled, loop-relative playback events for a set of tracks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    events: Vec<AbsoluteEvent>,
    loop_length_beats: f64,
    track_ids: Vec<TrackId>,
}

impl Timeline {
    pub fn events(&self) -> &[AbsoluteEvent] {
        &self.events
    }

    pub fn loop_length_beats(&self) -> f64 {
        self.loop_length_beats
    }

    pub fn loop_length_seconds(&self, tempo: &Tempo) -> f64 {
        self.loop_length_beats * tempo.seconds_per_beat()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The track an event's `track_index` referred to when this timeline
    /// was built. Later edits can move or remove it.
    pub fn track_id(&self, track_index: usize) -> Option<TrackId> {
        self.track_ids.get(track_index).copied()
    }
}

/// Offsets are kept in beats so a tempo change never needs a rebuild; the
/// clock does the conversion to wall time.
pub fn build_timeline(tracks: &[Track], _tempo: &Tempo) -> Timeline {
    let note_count: usize = tracks
        .iter()
        .flat_map(|t| t.steps.iter())
        .map(|s| s.notes.len())
        .sum();
    let mut events: Vec<AbsoluteEvent> = Vec::with_capacity(note_count * 2);
    let mut loop_length_beats: f64 = 0.0;

    for (track_index, track) in tracks.iter().enumerate() {
        let mut steps: Vec<&Step> = track.steps.iter().collect();
        steps.sort_by(|a, b| a.position.total_cmp(&b.position));

        for step in steps {
            for &note in &step.notes {
                events.push(AbsoluteEvent {
                    beat_offset: step.position,
                    track_index,
                    event: NoteEvent::note_on(note, step.velocity),
                });
                events.push(AbsoluteEvent {
                    beat_offset: step.end(),
                    track_index,
                    event: NoteEvent::note_off(note, step.velocity),
                });
            }
        }

        loop_length_beats = loop_length_beats.max(track.duration());
    }

    // Stable, so ties stay in track/step/note order
    events.sort_by(|a, b| a.beat_offset.total_cmp(&b.beat_offset));

    tracing::debug!(
        events = events.len(),
        loop_length_beats,
        "Built timeline from {} tracks",
        tracks.len()
    );

    Timeline {
        events,
        loop_length_beats,
        track_ids: tracks.iter().map(Track::id).collect(),
    }
}

use std::time::Duration;

use crate::events::{AbsoluteEvent, NoteEvent, NoteKind};

use super::{Note, Tempo, Timeline, Velocity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Playing,
}

/// Walks a [`Timeline`] in wall-clock time, looping at its end.
///
/// The clock never talks to an output itself; `tick` hands back whatever
/// became due and the caller decides where it goes.
#[derive(Debug)]
pub struct PlaybackClock {
    state: ClockState,
    timeline: Option<Timeline>,
    tempo: Tempo,
    position_beats: f64,
    sounding: Vec<(usize, Note, Velocity)>,
}

impl PlaybackClock {
    pub fn new(tempo: Tempo) -> Self {
        Self {
            state: ClockState::Stopped,
            timeline: None,
            tempo,
            position_beats: 0.0,
            sounding: Vec::new(),
        }
    }

    pub fn start(&mut self, timeline: Timeline, tempo: Tempo) {
        self.sounding.clear();
        self.timeline = Some(timeline);
        self.tempo = tempo;
        self.position_beats = 0.0;
        self.state = ClockState::Playing;
    }

    /// Returns note offs for anything still sounding.
    pub fn stop(&mut self) -> Vec<AbsoluteEvent> {
        let released = self.release_sounding();
        self.timeline = None;
        self.position_beats = 0.0;
        self.state = ClockState::Stopped;
        released
    }

    pub fn is_playing(&self) -> bool {
        self.state == ClockState::Playing
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    /// Only the rate changes; position and timeline stay put.
    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.tempo = tempo;
    }

    pub fn position_beats(&self) -> f64 {
        self.position_beats
    }

    pub fn timeline(&self) -> Option<&Timeline> {
        self.timeline.as_ref()
    }

    /// Swaps in a freshly built timeline without restarting. Sounding notes
    /// are released since the new timeline won't know about them.
    pub fn replace_timeline(&mut self, timeline: Timeline) -> Vec<AbsoluteEvent> {
        if !self.is_playing() {
            return Vec::new();
        }
        let released = self.release_sounding();
        let loop_length = timeline.loop_length_beats();
        self.position_beats = if loop_length > 0.0 {
            self.position_beats % loop_length
        } else {
            0.0
        };
        self.timeline = Some(timeline);
        released
    }

    pub fn tick(&mut self, elapsed: Duration) -> Vec<AbsoluteEvent> {
        let Some(timeline) = self.timeline.as_ref() else {
            return Vec::new();
        };
        let loop_length = timeline.loop_length_beats();
        if loop_length <= 0.0 {
            return Vec::new();
        }

        let events = timeline.events();
        let mut due: Vec<AbsoluteEvent> = Vec::new();
        let mut from = self.position_beats;
        let mut to = from + elapsed.as_secs_f64() * self.tempo.beats_per_second();

        if to >= loop_length {
            // Offs sitting exactly on the loop end fire before the wrap
            let start = events.partition_point(|e| e.beat_offset < from);
            due.extend_from_slice(&events[start..]);

            // Whole passes after that are balanced on/off pairs, so a stall
            // or a tiny loop folds them away instead of replaying them.
            let overrun = to - loop_length;
            if overrun >= loop_length {
                tracing::debug!(
                    passes = (overrun / loop_length).floor(),
                    "Skipped whole loop passes"
                );
            }
            to = overrun % loop_length;
            from = 0.0;
        }

        let start = events.partition_point(|e| e.beat_offset < from);
        let end = events.partition_point(|e| e.beat_offset < to);
        due.extend_from_slice(&events[start..end]);

        self.position_beats = to;
        for event in &due {
            self.track_sounding(event);
        }
        due
    }

    fn track_sounding(&mut self, event: &AbsoluteEvent) {
        let note = event.event.note;
        match event.event.kind {
            NoteKind::NoteOn => {
                self.sounding
                    .push((event.track_index, note, event.event.velocity));
            }
            NoteKind::NoteOff => {
                if let Some(idx) = self
                    .sounding
                    .iter()
                    .position(|&(track, n, _)| track == event.track_index && n == note)
                {
                    self.sounding.remove(idx);
                }
            }
        }
    }

    fn release_sounding(&mut self) -> Vec<AbsoluteEvent> {
        let position = self.position_beats;
        self.sounding
            .drain(..)
            .map(|(track_index, note, velocity)| AbsoluteEvent {
                beat_offset: position,
                track_index,
                event: NoteEvent::note_off(note, velocity),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::{Step, build_timeline};
    use crate::track::Track;

    fn step(position: f64, duration: f64, note: u8) -> Step {
        Step::new(
            position,
            duration,
            [Note::try_from(note).unwrap()],
            Velocity::try_from(100).unwrap(),
        )
        .unwrap()
    }

    fn bpm(bpm: f64) -> Tempo {
        Tempo::new(bpm, 4).unwrap()
    }

    fn summary(events: &[AbsoluteEvent]) -> Vec<(f64, NoteKind, u8)> {
        events
            .iter()
            .map(|e| (e.beat_offset, e.event.kind, e.event.note.number()))
            .collect()
    }

    fn two_step_timeline() -> Timeline {
        let tracks = vec![Track::new("a").with_steps([step(0.0, 1.0, 60), step(1.0, 1.0, 62)])];
        build_timeline(&tracks, &Tempo::default())
    }

    #[test]
    fn test_tick_emits_traversed_events() {
        let mut clock = PlaybackClock::new(bpm(120.0));
        clock.start(two_step_timeline(), bpm(120.0));
        assert!(clock.is_playing());

        let first = clock.tick(Duration::from_millis(250));
        assert_eq!(summary(&first), vec![(0.0, NoteKind::NoteOn, 60)]);
        assert_eq!(clock.position_beats(), 0.5);

        let second = clock.tick(Duration::from_millis(250));
        assert!(second.is_empty());

        let third = clock.tick(Duration::from_millis(250));
        assert_eq!(
            summary(&third),
            vec![(1.0, NoteKind::NoteOff, 60), (1.0, NoteKind::NoteOn, 62)]
        );
    }

    #[test]
    fn test_wraps_at_loop_end() {
        let mut clock = PlaybackClock::new(bpm(120.0));
        clock.start(two_step_timeline(), bpm(120.0));

        let pass = clock.tick(Duration::from_secs(1));
        assert_eq!(
            summary(&pass),
            vec![
                (0.0, NoteKind::NoteOn, 60),
                (1.0, NoteKind::NoteOff, 60),
                (1.0, NoteKind::NoteOn, 62),
                (2.0, NoteKind::NoteOff, 62),
            ]
        );
        assert_eq!(clock.position_beats(), 0.0);

        let restart = clock.tick(Duration::from_millis(250));
        assert_eq!(summary(&restart), vec![(0.0, NoteKind::NoteOn, 60)]);
    }

    #[test]
    fn test_long_tick_crosses_the_loop_boundary() {
        let mut clock = PlaybackClock::new(bpm(60.0));
        clock.start(two_step_timeline(), bpm(60.0));
        clock.tick(Duration::from_millis(1500));
        assert_eq!(clock.position_beats(), 1.5);

        let events = clock.tick(Duration::from_secs(1));
        assert_eq!(
            summary(&events),
            vec![(2.0, NoteKind::NoteOff, 62), (0.0, NoteKind::NoteOn, 60)]
        );
        assert_eq!(clock.position_beats(), 0.5);
    }

    #[test]
    fn test_stall_folds_whole_passes() {
        let mut clock = PlaybackClock::new(bpm(120.0));
        clock.start(two_step_timeline(), bpm(120.0));

        let events = clock.tick(Duration::from_millis(10_250));
        assert_eq!(
            summary(&events),
            vec![
                (0.0, NoteKind::NoteOn, 60),
                (1.0, NoteKind::NoteOff, 60),
                (1.0, NoteKind::NoteOn, 62),
                (2.0, NoteKind::NoteOff, 62),
                (0.0, NoteKind::NoteOn, 60),
            ]
        );
        assert_eq!(clock.position_beats(), 0.5);
    }

    #[test]
    fn test_tiny_loop_emits_bounded_events_per_tick() {
        let tiny = build_timeline(
            &[Track::new("tiny").with_steps([step(0.0, 1e-9, 60)])],
            &Tempo::default(),
        );
        let mut clock = PlaybackClock::new(bpm(120.0));
        clock.start(tiny, bpm(120.0));

        let events = clock.tick(Duration::from_millis(20));
        assert!(events.len() <= 3, "{} events", events.len());
        assert!(clock.position_beats() < 1e-9);

        let released = clock.stop();
        let ons = events.iter().filter(|e| e.event.kind == NoteKind::NoteOn).count();
        let offs = events.len() - ons + released.len();
        assert_eq!(ons, offs);
    }

    #[test]
    fn test_zero_length_loop_is_a_no_op() {
        let mut clock = PlaybackClock::new(Tempo::default());
        clock.start(Timeline::default(), Tempo::default());
        assert!(clock.tick(Duration::from_secs(10)).is_empty());
        assert_eq!(clock.position_beats(), 0.0);
    }

    #[test]
    fn test_tempo_change_keeps_position() {
        let mut clock = PlaybackClock::new(bpm(60.0));
        clock.start(two_step_timeline(), bpm(60.0));
        clock.tick(Duration::from_millis(500));
        assert_eq!(clock.position_beats(), 0.5);

        clock.set_tempo(bpm(120.0));
        assert_eq!(clock.position_beats(), 0.5);
        assert!(clock.timeline().is_some());

        let events = clock.tick(Duration::from_millis(250));
        assert_eq!(clock.position_beats(), 1.0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_stop_releases_sounding_notes() {
        let mut clock = PlaybackClock::new(bpm(120.0));
        clock.start(two_step_timeline(), bpm(120.0));
        clock.tick(Duration::from_millis(250));

        let released = clock.stop();
        assert_eq!(summary(&released), vec![(0.5, NoteKind::NoteOff, 60)]);
        assert_eq!(clock.state(), ClockState::Stopped);
        assert!(clock.timeline().is_none());

        assert!(clock.stop().is_empty());
        assert!(clock.tick(Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_replace_timeline_keeps_position() {
        let mut clock = PlaybackClock::new(bpm(60.0));
        clock.start(two_step_timeline(), bpm(60.0));
        clock.tick(Duration::from_millis(1500));

        let shorter = build_timeline(
            &[Track::new("b").with_steps([step(0.0, 1.0, 48)])],
            &Tempo::default(),
        );
        let released = clock.replace_timeline(shorter);
        assert_eq!(summary(&released), vec![(1.5, NoteKind::NoteOff, 62)]);
        assert_eq!(clock.position_beats(), 0.5);
    }
}

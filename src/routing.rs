use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::TransportError;
use crate::events::{NoteEvent, NoteKind, RoutedNote};
use crate::timing::{Note, Velocity};
use crate::track::{Channel, Track};

/// Outgoing side of the MIDI transport.
pub trait NoteOutput: Send + Sync {
    /// Whether at least one destination can currently receive events.
    fn endpoint_available(&self) -> bool;

    fn send_note_on(
        &self,
        note: Note,
        velocity: Velocity,
        channel: Channel,
    ) -> Result<(), TransportError>;

    fn send_note_off(
        &self,
        note: Note,
        velocity: Velocity,
        channel: Channel,
    ) -> Result<(), TransportError>;
}

/// Incoming side: the one capability the transport is handed so it can
/// deliver what arrives on its input port.
pub trait NoteListener: Send + Sync {
    fn received_note_on(&self, note: Note, velocity: Velocity, channel: Channel);
    fn received_note_off(&self, note: Note, velocity: Velocity, channel: Channel);
}

/// Routes an event that arrived tagged with `on_channel` to the output
/// channels of the track at that index. Channels with no track are unrouted.
pub fn route(event: NoteEvent, on_channel: u8, tracks: &[Track]) -> Vec<RoutedNote> {
    match tracks.get(usize::from(on_channel)) {
        Some(track) => fan_out(event, track),
        None => Vec::new(),
    }
}

/// One routed copy per output channel, in the track's channel order.
pub fn fan_out(event: NoteEvent, track: &Track) -> Vec<RoutedNote> {
    let event = apply_mute(event, track);
    track
        .output_channels
        .iter()
        .map(|&channel| RoutedNote { event, channel })
        .collect()
}

/// Muted tracks still send note ons, at velocity 0. Note offs always pass
/// through untouched or the receiver would be left with a stuck note.
/// Solo is not consulted here.
pub fn apply_mute(event: NoteEvent, track: &Track) -> NoteEvent {
    match event.kind {
        NoteKind::NoteOn if track.is_mute => NoteEvent {
            velocity: Velocity::ZERO,
            ..event
        },
        _ => event,
    }
}

pub fn send_routed(output: &dyn NoteOutput, routed: &RoutedNote) {
    let NoteEvent {
        kind,
        note,
        velocity,
    } = routed.event;
    let result = match kind {
        NoteKind::NoteOn => output.send_note_on(note, velocity, routed.channel),
        NoteKind::NoteOff => output.send_note_off(note, velocity, routed.channel),
    };
    if let Err(e) = result {
        tracing::warn!(
            channel = routed.channel.index(),
            note = note.number(),
            "Failed to send {:?}: {}",
            kind,
            e
        );
    }
}

/// Forwards externally arriving notes through [`route`], reading the
/// sequencer's published track list without ever writing to it.
pub struct InputRouter {
    tracks: Arc<ArcSwap<Vec<Track>>>,
    output: Arc<dyn NoteOutput>,
}

impl InputRouter {
    pub fn new(tracks: Arc<ArcSwap<Vec<Track>>>, output: Arc<dyn NoteOutput>) -> Self {
        Self { tracks, output }
    }

    fn forward(&self, event: NoteEvent, channel: Channel) {
        let tracks = self.tracks.load();
        for routed in route(event, channel.index(), &tracks) {
            send_routed(self.output.as_ref(), &routed);
        }
    }
}

impl NoteListener for InputRouter {
    fn received_note_on(&self, note: Note, velocity: Velocity, channel: Channel) {
        self.forward(NoteEvent::note_on(note, velocity), channel);
    }

    fn received_note_off(&self, note: Note, velocity: Velocity, channel: Channel) {
        self.forward(NoteEvent::note_off(note, velocity), channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn note(n: u8) -> Note {
        Note::try_from(n).unwrap()
    }

    fn vel(v: u8) -> Velocity {
        Velocity::try_from(v).unwrap()
    }

    fn ch(c: u8) -> Channel {
        Channel::try_from(c).unwrap()
    }

    fn summary(routed: &[RoutedNote]) -> Vec<(u8, u8, u8)> {
        routed
            .iter()
            .map(|r| (r.event.note.number(), r.event.velocity.value(), r.channel.index()))
            .collect()
    }

    fn three_tracks() -> Vec<Track> {
        vec![
            Track::new("a").with_output_channels([ch(0)]),
            Track::new("b").with_output_channels([ch(1), ch(9)]),
            Track::new("c").with_output_channels([ch(2), ch(5)]),
        ]
    }

    #[derive(Default)]
    struct RecordingOutput {
        sent: Mutex<Vec<(NoteKind, u8, u8, u8)>>,
    }

    impl NoteOutput for RecordingOutput {
        fn endpoint_available(&self) -> bool {
            true
        }

        fn send_note_on(
            &self,
            note: Note,
            velocity: Velocity,
            channel: Channel,
        ) -> Result<(), TransportError> {
            self.sent
                .lock()
                .push((NoteKind::NoteOn, note.number(), velocity.value(), channel.index()));
            Ok(())
        }

        fn send_note_off(
            &self,
            note: Note,
            velocity: Velocity,
            channel: Channel,
        ) -> Result<(), TransportError> {
            self.sent
                .lock()
                .push((NoteKind::NoteOff, note.number(), velocity.value(), channel.index()));
            Ok(())
        }
    }

    #[test]
    fn test_fans_out_in_channel_order() {
        let routed = route(NoteEvent::note_on(note(60), vel(90)), 1, &three_tracks());
        assert_eq!(summary(&routed), vec![(60, 90, 1), (60, 90, 9)]);
    }

    #[test]
    fn test_muted_track_zeroes_note_on_only() {
        let mut tracks = three_tracks();
        tracks[2].is_mute = true;

        let on = route(NoteEvent::note_on(note(64), vel(100)), 2, &tracks);
        assert_eq!(summary(&on), vec![(64, 0, 2), (64, 0, 5)]);

        let off = route(NoteEvent::note_off(note(64), vel(100)), 2, &tracks);
        assert_eq!(summary(&off), vec![(64, 100, 2), (64, 100, 5)]);
        assert!(off.iter().all(|r| r.event.kind == NoteKind::NoteOff));
    }

    #[test]
    fn test_unknown_channel_is_unrouted() {
        let tracks = three_tracks();
        assert!(route(NoteEvent::note_on(note(60), vel(100)), 3, &tracks).is_empty());
        assert!(route(NoteEvent::note_on(note(60), vel(100)), 15, &tracks).is_empty());
        assert!(route(NoteEvent::note_on(note(60), vel(100)), 0, &[]).is_empty());
    }

    #[test]
    fn test_solo_does_not_gate_routing() {
        let mut tracks = three_tracks();
        tracks[0].is_solo = true;

        let soloed = route(NoteEvent::note_on(note(60), vel(100)), 0, &tracks);
        let other = route(NoteEvent::note_on(note(60), vel(100)), 1, &tracks);
        assert_eq!(summary(&soloed), vec![(60, 100, 0)]);
        assert_eq!(summary(&other), vec![(60, 100, 1), (60, 100, 9)]);
    }

    #[test]
    fn test_duplicate_output_channels_are_kept() {
        let tracks = vec![Track::new("dup").with_output_channels([ch(3), ch(3)])];
        let routed = route(NoteEvent::note_on(note(60), vel(100)), 0, &tracks);
        assert_eq!(summary(&routed), vec![(60, 100, 3), (60, 100, 3)]);
    }

    #[test]
    fn test_input_router_reads_latest_tracks() {
        let tracks = Arc::new(ArcSwap::from_pointee(three_tracks()));
        let output = Arc::new(RecordingOutput::default());
        let router = InputRouter::new(tracks.clone(), output.clone());

        router.received_note_on(note(60), vel(80), ch(0));

        let mut muted = three_tracks();
        muted[0].is_mute = true;
        tracks.store(Arc::new(muted));

        router.received_note_on(note(62), vel(80), ch(0));
        router.received_note_off(note(62), vel(80), ch(0));
        router.received_note_on(note(62), vel(80), ch(7));

        assert_eq!(
            *output.sent.lock(),
            vec![
                (NoteKind::NoteOn, 60, 80, 0),
                (NoteKind::NoteOn, 62, 0, 0),
                (NoteKind::NoteOff, 62, 80, 0),
            ]
        );
    }
}

use crate::SequencerError;
use crate::config::SequencerConfig;
use crate::events::{AbsoluteEvent, NoteKind, RoutedNote};
use crate::routing::{self, InputRouter, NoteOutput};
use crate::timing::{self, Note, PlaybackClock, Tempo, Timeline};
use crate::track::{Channel, MAX_TRACKS, Track, TrackId};
use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, RecvTimeoutError, SendError, Sender};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Called once with whether playback actually started.
pub type Completion = Box<dyn FnOnce(bool) + Send + 'static>;

enum PlaybackCommand {
    Start {
        timeline: Timeline,
        tempo: Tempo,
        done: Completion,
    },
    Rebuild {
        timeline: Timeline,
        done: Completion,
    },
    SetTempo(Tempo),
    Stop {
        done: Completion,
    },
    Shutdown,
}

/// Owns the tracks and tempo, and the playback thread that turns them into
/// MIDI output.
///
/// Track edits are serialized behind one lock and published as immutable
/// snapshots, so the playback thread and the [`InputRouter`] read them
/// without blocking. Everything that touches the clock happens on the
/// playback thread.
pub struct Sequencer {
    name: String,
    tempo: Mutex<Tempo>,
    tracks: Arc<ArcSwap<Vec<Track>>>,
    edit_lock: Mutex<()>,
    output: Arc<dyn NoteOutput>,
    playing: Arc<AtomicBool>,
    command_tx: Sender<PlaybackCommand>,
    playback_thread: Option<JoinHandle<()>>,
}

impl Sequencer {
    pub fn new(name: impl Into<String>, tempo: Tempo, output: Arc<dyn NoteOutput>) -> Self {
        Self::with_tick_interval(name, tempo, output, DEFAULT_TICK_INTERVAL)
    }

    pub fn with_tick_interval(
        name: impl Into<String>,
        tempo: Tempo,
        output: Arc<dyn NoteOutput>,
        tick_interval: Duration,
    ) -> Self {
        let (command_tx, command_rx) = crossbeam::channel::unbounded();
        let tracks = Arc::new(ArcSwap::from_pointee(Vec::new()));
        let playing = Arc::new(AtomicBool::new(false));

        let context = PlaybackContext {
            clock: PlaybackClock::new(tempo),
            tracks: tracks.clone(),
            output: output.clone(),
            playing: playing.clone(),
            last_tick: Instant::now(),
            held: Vec::new(),
        };
        let playback_thread = std::thread::spawn(move || {
            playback_thread(context, command_rx, tick_interval);
        });

        Self {
            name: name.into(),
            tempo: Mutex::new(tempo),
            tracks,
            edit_lock: Mutex::new(()),
            output,
            playing,
            command_tx,
            playback_thread: Some(playback_thread),
        }
    }

    pub fn from_config(
        config: SequencerConfig,
        output: Arc<dyn NoteOutput>,
    ) -> Result<Self, SequencerError> {
        config.validate()?;
        let tick_interval = config.tick_interval();
        let sequencer = Self::with_tick_interval(config.name, config.tempo, output, tick_interval);
        sequencer.set_tracks(config.tracks)?;
        Ok(sequencer)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tempo(&self) -> Tempo {
        *self.tempo.lock()
    }

    /// Takes effect on a running clock from now on, without a rebuild.
    pub fn set_tempo(&self, tempo: Tempo) {
        *self.tempo.lock() = tempo;
        let _ = self.command_tx.send(PlaybackCommand::SetTempo(tempo));
        tracing::info!(bpm = tempo.bpm(), "Tempo changed");
    }

    pub fn tracks(&self) -> Arc<Vec<Track>> {
        self.tracks.load_full()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.load().len()
    }

    pub fn set_tracks(&self, tracks: Vec<Track>) -> Result<(), SequencerError> {
        if tracks.len() > MAX_TRACKS {
            return Err(SequencerError::CapacityExceeded);
        }
        let _guard = self.edit_lock.lock();
        self.tracks.store(Arc::new(tracks));
        Ok(())
    }

    /// Handle for the transport's input side.
    pub fn input_router(&self) -> Arc<InputRouter> {
        Arc::new(InputRouter::new(self.tracks.clone(), self.output.clone()))
    }

    pub fn try_add_track(
        &self,
        track: Track,
        at_index: Option<usize>,
    ) -> Result<usize, SequencerError> {
        self.edit_tracks(|tracks| {
            if tracks.len() >= MAX_TRACKS {
                return Err(SequencerError::CapacityExceeded);
            }
            let index = at_index.map_or(tracks.len(), |i| i.min(tracks.len()));
            tracing::info!(track = %track.name, index, "Added track");
            tracks.insert(index, track);
            Ok(index)
        })
    }

    /// Inserts at `at_index` (clamped, appends when `None`). Ignored once
    /// the sequencer holds [`MAX_TRACKS`] tracks.
    pub fn add_track(&self, track: Track, at_index: Option<usize>) -> bool {
        match self.try_add_track(track, at_index) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Track not added: {}", e);
                false
            }
        }
    }

    pub fn try_remove_track(&self, id: TrackId) -> Result<Track, SequencerError> {
        self.edit_tracks(|tracks| {
            let index = tracks
                .iter()
                .position(|t| t.id() == id)
                .ok_or(SequencerError::TrackNotFound)?;
            let removed = tracks.remove(index);
            tracing::info!(track = %removed.name, index, "Removed track");
            Ok(removed)
        })
    }

    pub fn remove_track(&self, id: TrackId) -> bool {
        self.try_remove_track(id).is_ok()
    }

    /// Edits a track in place. A running timeline keeps playing the old
    /// steps until [`Sequencer::rebuild`] is called.
    pub fn try_update_track(
        &self,
        id: TrackId,
        edit: impl FnOnce(&mut Track),
    ) -> Result<(), SequencerError> {
        self.edit_tracks(|tracks| {
            let track = tracks
                .iter_mut()
                .find(|t| t.id() == id)
                .ok_or(SequencerError::TrackNotFound)?;
            edit(track);
            Ok(())
        })
    }

    pub fn update_track(&self, id: TrackId, edit: impl FnOnce(&mut Track)) -> bool {
        self.try_update_track(id, edit).is_ok()
    }

    pub fn mute_track(&self, id: TrackId) -> bool {
        self.update_track(id, |t| t.is_mute = true)
    }

    pub fn unmute_track(&self, id: TrackId) -> bool {
        self.update_track(id, |t| t.is_mute = false)
    }

    pub fn solo_track(&self, id: TrackId) -> bool {
        self.update_track(id, |t| t.is_solo = true)
    }

    pub fn unsolo_track(&self, id: TrackId) -> bool {
        self.update_track(id, |t| t.is_solo = false)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Builds a timeline from the current tracks and starts it from beat 0.
    /// Returns once playback is running.
    pub fn try_play(&self) -> Result<(), SequencerError> {
        if !self.output.endpoint_available() {
            return Err(SequencerError::NoOutputAvailable);
        }
        let (tracks, tempo) = self.snapshot();
        let timeline = timing::build_timeline(&tracks, &tempo);

        let (ack_tx, ack_rx) = crossbeam::channel::bounded(1);
        send_start(
            &self.command_tx,
            timeline,
            tempo,
            Box::new(move |started| {
                let _ = ack_tx.send(started);
            }),
        );

        match ack_rx.recv() {
            Ok(true) => {
                tracing::info!(sequencer = %self.name, "Playing");
                Ok(())
            }
            _ => Err(SequencerError::PlaybackUnavailable),
        }
    }

    pub fn play(&self) -> bool {
        match self.try_play() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Cannot play: {}", e);
                false
            }
        }
    }

    /// Like [`Sequencer::play`], but the timeline is built on a worker
    /// thread. `completion` runs exactly once, after `is_playing` reflects
    /// the outcome.
    pub fn play_async(&self, completion: impl FnOnce(bool) + Send + 'static) {
        let (tracks, tempo) = self.snapshot();
        let output = self.output.clone();
        let command_tx = self.command_tx.clone();

        std::thread::spawn(move || {
            if !output.endpoint_available() {
                tracing::warn!("Cannot play: {}", SequencerError::NoOutputAvailable);
                completion(false);
                return;
            }
            let timeline = timing::build_timeline(&tracks, &tempo);
            send_start(&command_tx, timeline, tempo, Box::new(completion));
        });
    }

    /// Recompiles the running timeline from the current tracks, keeping the
    /// playback position. Returns false when not playing.
    pub fn rebuild(&self) -> bool {
        if !self.is_playing() {
            return false;
        }
        let (tracks, tempo) = self.snapshot();
        let timeline = timing::build_timeline(&tracks, &tempo);

        let (ack_tx, ack_rx) = crossbeam::channel::bounded(1);
        let done: Completion = Box::new(move |rebuilt| {
            let _ = ack_tx.send(rebuilt);
        });
        if self
            .command_tx
            .send(PlaybackCommand::Rebuild { timeline, done })
            .is_err()
        {
            return false;
        }
        ack_rx.recv().unwrap_or(false)
    }

    pub fn stop(&self) {
        let (ack_tx, ack_rx) = crossbeam::channel::bounded(1);
        let done: Completion = Box::new(move |_| {
            let _ = ack_tx.send(());
        });
        if self.command_tx.send(PlaybackCommand::Stop { done }).is_ok() {
            let _ = ack_rx.recv();
        }
        self.playing.store(false, Ordering::SeqCst);
    }

    fn snapshot(&self) -> (Arc<Vec<Track>>, Tempo) {
        (self.tracks.load_full(), self.tempo())
    }

    fn edit_tracks<R>(&self, edit: impl FnOnce(&mut Vec<Track>) -> R) -> R {
        let _guard = self.edit_lock.lock();
        let mut tracks = Vec::clone(&self.tracks.load());
        let result = edit(&mut tracks);
        self.tracks.store(Arc::new(tracks));
        result
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        let _ = self.command_tx.send(PlaybackCommand::Shutdown);
        if let Some(handle) = self.playback_thread.take() {
            let _ = handle.join();
        }
    }
}

fn send_start(
    command_tx: &Sender<PlaybackCommand>,
    timeline: Timeline,
    tempo: Tempo,
    done: Completion,
) {
    let command = PlaybackCommand::Start {
        timeline,
        tempo,
        done,
    };
    if let Err(SendError(PlaybackCommand::Start { done, .. })) = command_tx.send(command) {
        tracing::warn!("Playback thread is gone");
        done(false);
    }
}

/// A note on that went out, and the channels it actually went out on.
struct HeldNote {
    track_index: usize,
    note: Note,
    channels: Vec<Channel>,
}

struct PlaybackContext {
    clock: PlaybackClock,
    tracks: Arc<ArcSwap<Vec<Track>>>,
    output: Arc<dyn NoteOutput>,
    playing: Arc<AtomicBool>,
    last_tick: Instant,
    held: Vec<HeldNote>,
}

impl PlaybackContext {
    fn handle(&mut self, command: PlaybackCommand) {
        match command {
            PlaybackCommand::Start {
                timeline,
                tempo,
                done,
            } => {
                let released = self.clock.stop();
                self.emit(&released);

                tracing::debug!(
                    events = timeline.events().len(),
                    loop_length_beats = timeline.loop_length_beats(),
                    "Starting timeline"
                );
                self.clock.start(timeline, tempo);
                self.last_tick = Instant::now();
                self.playing.store(true, Ordering::SeqCst);
                done(true);
            }
            PlaybackCommand::Rebuild { timeline, done } => {
                if !self.clock.is_playing() {
                    done(false);
                    return;
                }
                self.tick();
                let released = self.clock.replace_timeline(timeline);
                self.emit(&released);
                tracing::debug!(
                    position = self.clock.position_beats(),
                    "Swapped in rebuilt timeline"
                );
                done(true);
            }
            PlaybackCommand::SetTempo(tempo) => {
                // Settle the elapsed time at the old rate first
                self.tick();
                self.clock.set_tempo(tempo);
            }
            PlaybackCommand::Stop { done } => {
                self.stop();
                done(true);
            }
            PlaybackCommand::Shutdown => self.stop(),
        }
    }

    fn stop(&mut self) {
        if self.clock.is_playing() {
            tracing::info!("Stopped");
        }
        let released = self.clock.stop();
        self.emit(&released);
        self.playing.store(false, Ordering::SeqCst);
    }

    fn tick(&mut self) {
        if !self.clock.is_playing() {
            return;
        }
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick);
        self.last_tick = now;

        let due = self.clock.tick(elapsed);
        self.emit(&due);
    }

    fn emit(&mut self, events: &[AbsoluteEvent]) {
        if events.is_empty() {
            return;
        }
        let tracks = self.tracks.load_full();
        for event in events {
            match event.event.kind {
                NoteKind::NoteOn => self.emit_note_on(event, &tracks),
                NoteKind::NoteOff => self.emit_note_off(event),
            }
        }
    }

    /// The track is looked up by identity in the live list, so mute and
    /// channel edits apply from the next note on. Removed tracks go quiet.
    fn emit_note_on(&mut self, event: &AbsoluteEvent, tracks: &[Track]) {
        let Some(id) = self
            .clock
            .timeline()
            .and_then(|t| t.track_id(event.track_index))
        else {
            return;
        };
        let Some(track) = tracks.iter().find(|t| t.id() == id) else {
            return;
        };

        let routed = routing::fan_out(event.event, track);
        for note in &routed {
            routing::send_routed(self.output.as_ref(), note);
        }
        self.held.push(HeldNote {
            track_index: event.track_index,
            note: event.event.note,
            channels: routed.iter().map(|r| r.channel).collect(),
        });
    }

    /// Released on the channels the matching note on used, whatever the
    /// track looks like now.
    fn emit_note_off(&mut self, event: &AbsoluteEvent) {
        let Some(index) = self
            .held
            .iter()
            .position(|h| h.track_index == event.track_index && h.note == event.event.note)
        else {
            return;
        };
        let held = self.held.remove(index);
        for channel in held.channels {
            let routed = RoutedNote {
                event: event.event,
                channel,
            };
            routing::send_routed(self.output.as_ref(), &routed);
        }
    }
}

fn playback_thread(
    mut context: PlaybackContext,
    command_rx: Receiver<PlaybackCommand>,
    tick_interval: Duration,
) {
    tracing::debug!(?tick_interval, "Playback thread started");

    loop {
        match command_rx.recv_timeout(tick_interval) {
            Ok(PlaybackCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                context.stop();
                break;
            }
            Ok(command) => context.handle(command),
            Err(RecvTimeoutError::Timeout) => {}
        }
        context.tick();
    }

    tracing::debug!("Playback thread exited");
}

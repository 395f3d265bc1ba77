//! Multi-track MIDI step sequencer.
//!
//! Tracks of [`Step`]s are compiled into a looping [`Timeline`] that a
//! playback thread broadcasts over MIDI, while notes arriving on the input
//! side are re-routed to each track's output channels.

pub mod config;
mod engine;
mod error;
pub mod events;
pub mod routing;
pub mod timing;
mod track;
pub mod transport;

pub use config::SequencerConfig;
pub use engine::{Completion, DEFAULT_TICK_INTERVAL, Sequencer};
pub use error::{SequencerError, TransportError};
pub use events::{AbsoluteEvent, MidiMessage, NoteEvent, NoteKind, RoutedNote};
pub use routing::{InputRouter, NoteListener, NoteOutput, route};
pub use timing::{Note, PlaybackClock, Step, Tempo, Timeline, Velocity, build_timeline};
pub use track::{Channel, MAX_TRACKS, Track, TrackId};
pub use transport::{MidiIn, MidiOut};

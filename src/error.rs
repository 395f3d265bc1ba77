#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error("no MIDI output endpoint available")]
    NoOutputAvailable,
    #[error("track not found")]
    TrackNotFound,
    #[error("track limit of 16 reached")]
    CapacityExceeded,
    #[error("invalid tempo: {bpm} bpm, {beats_per_bar} beats per bar")]
    InvalidTempo { bpm: f64, beats_per_bar: u32 },
    #[error("note number {0} is outside 0..=127")]
    InvalidNote(u8),
    #[error("velocity {0} is outside 0..=127")]
    InvalidVelocity(u8),
    #[error("channel {0} is outside 0..=15")]
    InvalidChannel(u8),
    #[error("invalid step at {position} beats with duration {duration}")]
    InvalidStep { position: f64, duration: f64 },
    #[error("playback thread is not running")]
    PlaybackUnavailable,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Config(#[from] ron::error::SpannedError),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to initialize MIDI client: {0}")]
    Init(#[from] midir::InitError),
    #[error("no MIDI port found")]
    NoPort,
    #[error("failed to connect MIDI port: {0}")]
    Connect(String),
    #[error("failed to send MIDI message: {0}")]
    Send(#[from] midir::SendError),
}

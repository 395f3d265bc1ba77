mod clock;
mod scheduler;
mod step;
mod tempo;

pub use clock::{ClockState, PlaybackClock};
pub use scheduler::{Timeline, build_timeline};
pub use step::{Note, Step, Velocity};
pub use tempo::Tempo;

use std::path::PathBuf;
use std::sync::Arc;

use midiseq::{
    Channel, MidiIn, MidiOut, Note, Sequencer, SequencerConfig, Step, Tempo, Track, Velocity,
};
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(std::env::args().nth(1).map(PathBuf::from)) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => SequencerConfig::load(&path)?,
        None => demo_config()?,
    };

    let ports = MidiOut::available_ports(&config.name);
    tracing::info!(?ports, "MIDI output ports");
    let timeline = midiseq::build_timeline(&config.tracks, &config.tempo);
    tracing::info!(
        seconds = timeline.loop_length_seconds(&config.tempo),
        "Loop length"
    );

    let output = Arc::new(MidiOut::open(&config.name)?);
    let sequencer = Sequencer::from_config(config, output.clone())?;
    let _input = MidiIn::open(&format!("{} in", sequencer.name()), sequencer.input_router())?;

    sequencer.try_play()?;
    println!("Playing {}. Press Enter to stop.", sequencer.name());

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    sequencer.stop();
    output.disconnect();

    Ok(())
}

fn demo_config() -> Result<SequencerConfig, midiseq::SequencerError> {
    let velocity = Velocity::try_from(100)?;
    let chord = |position: f64, root: u8| -> Result<Step, midiseq::SequencerError> {
        let notes = [root, root + 4, root + 7]
            .into_iter()
            .map(Note::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Step::new(position, 2.0, notes, velocity)
    };
    let kick = |position: f64| -> Result<Step, midiseq::SequencerError> {
        Step::new(position, 0.25, [Note::try_from(36)?], velocity)
    };

    let chords = Track::new("chords")
        .with_steps([chord(0.0, 60)?, chord(2.0, 65)?, chord(4.0, 67)?, chord(6.0, 60)?])
        .with_output_channels([Channel::try_from(0)?]);
    let drums = Track::new("drums")
        .with_steps((0..8).map(|beat| kick(f64::from(beat))).collect::<Result<Vec<_>, _>>()?)
        .with_output_channels([Channel::try_from(9)?]);

    Ok(SequencerConfig {
        name: "midiseq".to_string(),
        tempo: Tempo::new(110.0, 4)?,
        tick_interval_ms: 1,
        tracks: vec![chords, drums],
    })
}

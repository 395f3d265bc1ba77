use std::sync::Arc;

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;

use crate::TransportError;
use crate::events::{MidiMessage, NoteEvent, NoteKind};
use crate::routing::{NoteListener, NoteOutput};
use crate::timing::{Note, Velocity};
use crate::track::Channel;

/// Output port the sequencer broadcasts on.
pub struct MidiOut {
    connection: Mutex<Option<MidiOutputConnection>>,
}

impl MidiOut {
    /// A virtual port other applications can subscribe to where the platform
    /// supports it, otherwise the first hardware/system port.
    pub fn open(port_name: &str) -> Result<Self, TransportError> {
        #[cfg(unix)]
        {
            use midir::os::unix::VirtualOutput;

            let midi_out = MidiOutput::new(port_name)?;
            let connection = midi_out
                .create_virtual(port_name)
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            tracing::info!(port = port_name, "Opened virtual MIDI output");
            Ok(Self::from_connection(connection))
        }
        #[cfg(not(unix))]
        {
            Self::connect(port_name, None)
        }
    }

    /// Connects to the first port whose name contains `filter`, or the
    /// first port at all.
    pub fn connect(client_name: &str, filter: Option<&str>) -> Result<Self, TransportError> {
        let midi_out = MidiOutput::new(client_name)?;
        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| {
                filter.is_some_and(|f| midi_out.port_name(p).unwrap_or_default().contains(f))
            })
            .or_else(|| ports.first())
            .ok_or(TransportError::NoPort)?;
        let port_name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, client_name)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::info!(port = %port_name, "Connected MIDI output");
        Ok(Self::from_connection(connection))
    }

    pub fn available_ports(client_name: &str) -> Vec<String> {
        match MidiOutput::new(client_name) {
            Ok(midi_out) => midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn disconnect(&self) {
        if let Some(connection) = self.connection.lock().take() {
            connection.close();
            tracing::info!("Disconnected MIDI output");
        }
    }

    fn from_connection(connection: MidiOutputConnection) -> Self {
        Self {
            connection: Mutex::new(Some(connection)),
        }
    }

    fn send(&self, message: MidiMessage) -> Result<(), TransportError> {
        if let Some(connection) = self.connection.lock().as_mut() {
            connection.send(&message.to_bytes())?;
        }
        Ok(())
    }
}

impl NoteOutput for MidiOut {
    fn endpoint_available(&self) -> bool {
        self.connection.lock().is_some()
    }

    fn send_note_on(
        &self,
        note: Note,
        velocity: Velocity,
        channel: Channel,
    ) -> Result<(), TransportError> {
        self.send(MidiMessage {
            channel,
            event: NoteEvent::note_on(note, velocity),
        })
    }

    fn send_note_off(
        &self,
        note: Note,
        velocity: Velocity,
        channel: Channel,
    ) -> Result<(), TransportError> {
        self.send(MidiMessage {
            channel,
            event: NoteEvent::note_off(note, velocity),
        })
    }
}

/// Input port whose note traffic is handed to a [`NoteListener`]. The port
/// stays open for as long as this value lives.
pub struct MidiIn {
    _connection: MidiInputConnection<()>,
}

impl MidiIn {
    pub fn open(port_name: &str, listener: Arc<dyn NoteListener>) -> Result<Self, TransportError> {
        let midi_in = MidiInput::new(port_name)?;
        let callback = move |_timestamp: u64, bytes: &[u8], _: &mut ()| {
            dispatch(listener.as_ref(), bytes);
        };

        #[cfg(unix)]
        let connection = {
            use midir::os::unix::VirtualInput;

            midi_in
                .create_virtual(port_name, callback, ())
                .map_err(|e| TransportError::Connect(e.to_string()))?
        };
        #[cfg(not(unix))]
        let connection = {
            let ports = midi_in.ports();
            let port = ports.first().ok_or(TransportError::NoPort)?;
            midi_in
                .connect(port, port_name, callback, ())
                .map_err(|e| TransportError::Connect(e.to_string()))?
        };

        tracing::info!(port = port_name, "Opened MIDI input");
        Ok(Self {
            _connection: connection,
        })
    }
}

/// Decodes one raw message; anything that isn't a note on/off is dropped.
pub fn dispatch(listener: &dyn NoteListener, bytes: &[u8]) {
    let Some(MidiMessage { channel, event }) = MidiMessage::from_bytes(bytes) else {
        tracing::trace!("Ignoring MIDI message {:02X?}", bytes);
        return;
    };
    match event.kind {
        NoteKind::NoteOn => listener.received_note_on(event.note, event.velocity, channel),
        NoteKind::NoteOff => listener.received_note_off(event.note, event.velocity, channel),
    }
}

//! MIDI input handling
//!
//! Receives raw MIDI bytes from the midir callback, parses them with midly,
//! and forwards events to the controller via a flume channel.

use crate::connection::{find_input_port, MidiConnectionError};
use flume::Sender;
use midly::live::LiveEvent;
use midly::MidiMessage;
use midir::MidiInputConnection;

/// Raw MIDI input event (before mapping)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiInputEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, cc: u8, value: u8 },
}

impl MidiInputEvent {
    /// Parse raw MIDI bytes into an event
    ///
    /// Note On with velocity 0 is reported as Note Off. Messages other than
    /// notes and control changes (pitch bend, aftertouch, sysex...) are ignored.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let LiveEvent::Midi { channel, message } = LiveEvent::parse(data).ok()? else {
            return None;
        };
        let channel = channel.as_int();

        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => Some(Self::NoteOff {
                channel,
                note: key.as_int(),
                velocity: 0,
            }),
            MidiMessage::NoteOn { key, vel } => Some(Self::NoteOn {
                channel,
                note: key.as_int(),
                velocity: vel.as_int(),
            }),
            MidiMessage::NoteOff { key, vel } => Some(Self::NoteOff {
                channel,
                note: key.as_int(),
                velocity: vel.as_int(),
            }),
            MidiMessage::Controller { controller, value } => Some(Self::ControlChange {
                channel,
                cc: controller.as_int(),
                value: value.as_int(),
            }),
            _ => None,
        }
    }

    /// CC number and value, if this is a control change
    pub fn as_cc(&self) -> Option<(u8, u8)> {
        match self {
            Self::ControlChange { cc, value, .. } => Some((*cc, *value)),
            _ => None,
        }
    }
}

/// MIDI input handler
///
/// Owns the midir connection. Dropping it disconnects the port.
pub struct MidiInputHandler {
    _connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidiInputHandler {
    /// Connect to the first port matching `port_match` and forward every
    /// parsed event into `tx`
    ///
    /// The callback runs on the MIDI driver thread and never blocks: when
    /// the channel is full the event is dropped.
    pub fn connect<T>(port_match: &str, tx: Sender<T>) -> Result<Self, MidiConnectionError>
    where
        T: From<MidiInputEvent> + Send + 'static,
    {
        let (midi_in, port, port_name) = find_input_port(port_match)?;

        let connection = midi_in
            .connect(
                &port,
                "promptdj-midi-input",
                move |_timestamp, data, _| {
                    let Some(event) = MidiInputEvent::parse(data) else {
                        return;
                    };
                    log::trace!("[MIDI IN] {:?}", event);
                    if tx.try_send(T::from(event)).is_err() {
                        log::warn!("MIDI: Input channel full or closed, dropping event");
                    }
                },
                (),
            )
            .map_err(|e| MidiConnectionError::ConnectionError(e.to_string()))?;

        log::info!("MIDI: Input handler connected to '{}'", port_name);

        Ok(Self {
            _connection: connection,
            port_name,
        })
    }

    /// Name of the connected port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

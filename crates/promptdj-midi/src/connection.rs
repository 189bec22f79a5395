//! MIDI port discovery
//!
//! Uses midir for cross-platform MIDI I/O (ALSA on Linux, CoreMIDI on macOS, WinMM on Windows).

use midir::{MidiInput, MidiInputPort};

/// Client name registered with the MIDI system
pub(crate) const CLIENT_NAME: &str = "promptdj-midi-in";

/// Error type for MIDI connection operations
#[derive(Debug, thiserror::Error)]
pub enum MidiConnectionError {
    #[error("Failed to initialize MIDI input: {0}")]
    InputInitError(String),

    #[error("No MIDI input ports available")]
    NoInputPorts,

    #[error("No MIDI port found matching pattern: {0}")]
    PortNotFound(String),

    #[error("Failed to connect to MIDI port: {0}")]
    ConnectionError(String),

    #[error("Failed to get port info: {0}")]
    PortInfoError(String),
}

/// Discovered MIDI input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiDeviceInfo {
    /// Position in the port list at discovery time
    pub index: usize,
    /// Port name; also the device identity bindings are stored under
    pub name: String,
}

/// List all available MIDI input devices
pub fn list_input_devices() -> Result<Vec<MidiDeviceInfo>, MidiConnectionError> {
    let midi_in = MidiInput::new("promptdj-midi-list")
        .map_err(|e| MidiConnectionError::InputInitError(e.to_string()))?;

    let devices = midi_in
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(index, port)| {
            midi_in
                .port_name(port)
                .ok()
                .map(|name| MidiDeviceInfo { index, name })
        })
        .collect();

    Ok(devices)
}

/// Find an input port whose name contains `port_match` (case-insensitive)
///
/// Returns the MidiInput so the caller can connect its own callback.
pub fn find_input_port(
    port_match: &str,
) -> Result<(MidiInput, MidiInputPort, String), MidiConnectionError> {
    let pattern = port_match.to_lowercase();

    let midi_in = MidiInput::new(CLIENT_NAME)
        .map_err(|e| MidiConnectionError::InputInitError(e.to_string()))?;

    let in_ports = midi_in.ports();
    if in_ports.is_empty() {
        return Err(MidiConnectionError::NoInputPorts);
    }

    let input_port = in_ports
        .into_iter()
        .find(|port| {
            midi_in
                .port_name(port)
                .map(|name| name.to_lowercase().contains(&pattern))
                .unwrap_or(false)
        })
        .ok_or_else(|| MidiConnectionError::PortNotFound(port_match.to_string()))?;

    let port_name = midi_in
        .port_name(&input_port)
        .map_err(|e| MidiConnectionError::PortInfoError(e.to_string()))?;

    log::info!("MIDI: Found input port: {}", port_name);

    Ok((midi_in, input_port, port_name))
}

//! MIDI controller support for promptdj
//!
//! This crate provides:
//! - MIDI device discovery and input handling via midir
//! - MIDI message parsing via midly
//! - Device-scoped CC bindings with learn mode
//! - CC value scaling to prompt weights and action triggers
//! - Async channel bridge (flume) from the midir callback thread
//!
//! # Architecture
//!
//! ```text
//! MIDI Device → midir callback → flume channel → controller loop → MappingEngine::handle_cc()
//! ```
//!
//! The mapping engine itself is plain synchronous state; it runs on the
//! controller's thread and never touches the MIDI driver thread.

mod bindings;
mod config;
mod connection;
mod input;
mod learn;
mod mapping;
mod normalize;
mod types;

pub use bindings::BindingMap;
pub use config::{
    load_binding_profiles, save_binding_profiles, BindingProfiles, BindingStore, DeviceBindings,
    MidiSettings, YamlBindingStore,
};
pub use connection::{find_input_port, list_input_devices, MidiConnectionError, MidiDeviceInfo};
pub use input::{MidiInputEvent, MidiInputHandler};
pub use learn::{LearnState, LearnToggle, ToggleGesture, DEFAULT_LONG_PRESS};
pub use mapping::{CcOutcome, MappingEngine, ToggleOutcome};
pub use normalize::{is_trigger, normalize_cc_value, DEFAULT_TRIGGER_THRESHOLD};
pub use types::{ActionTag, CcBinding, LearnTarget, MidiCommand};

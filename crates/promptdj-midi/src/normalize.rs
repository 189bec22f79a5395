//! Value normalization for MIDI controls
//!
//! MIDI CC values are 0-127; prompt weights span 0.0 to 2.0. Discrete
//! actions interpret the raw value as a button state instead.

/// Highest raw CC value
pub const MIDI_MAX: u8 = 127;

/// Upper end of the prompt weight range a CC is scaled to
pub const MAX_CC_WEIGHT: f32 = 2.0;

/// Raw values strictly above this count as a button press
pub const DEFAULT_TRIGGER_THRESHOLD: u8 = 64;

/// Scale a MIDI CC value (0-127) linearly to a prompt weight (0.0-2.0)
pub fn normalize_cc_value(midi_value: u8) -> f32 {
    midi_value.min(MIDI_MAX) as f32 / MIDI_MAX as f32 * MAX_CC_WEIGHT
}

/// Whether a raw value counts as a pressed button
pub fn is_trigger(midi_value: u8, threshold: u8) -> bool {
    midi_value > threshold
}

//! Controller settings
//!
//! Every section uses `#[serde(default)]` so partial files work.

use super::io::read_yaml;
use crate::session::GenerationConfig;
use promptdj_midi::MidiSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub audio: AudioConfig,
    pub mixer: MixerConfig,
    pub session: SessionConfig,
    pub effects: EffectsConfig,
    pub midi: MidiSettings,
    pub relay: RelayConfig,
}

impl LiveConfig {
    /// Load from `path`; a missing or broken file gives the defaults
    pub fn load(path: &Path) -> Self {
        match read_yaml(path) {
            Ok(Some(config)) => {
                log::info!("Config: Loaded {:?}", path);
                config
            }
            Ok(None) => {
                log::info!("Config: No file at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => {
                log::warn!("Config: {:#}, using defaults", e);
                Self::default()
            }
        }
    }
}

/// Incoming audio format and playback timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate of frames delivered by the service
    pub sample_rate: u32,
    /// Interleaved channel count of delivered frames
    pub channels: u16,
    /// Buffer-ahead latency absorbing network jitter
    pub lookahead_secs: f64,
    /// Gain fade on play/pause/stop
    pub gain_ramp_ms: u64,
    /// Output device name (substring match); default device when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            lookahead_secs: 1.5,
            gain_ramp_ms: 150,
            output_device: None,
        }
    }
}

impl AudioConfig {
    pub fn gain_ramp(&self) -> Duration {
        Duration::from_millis(self.gain_ramp_ms)
    }
}

/// Prompt mixing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Prompts at or below this weight are muted
    pub activity_threshold: f32,
    /// Minimum spacing between two mix pushes
    pub push_interval_ms: u64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            activity_threshold: 0.01,
            push_interval_ms: 250,
        }
    }
}

impl MixerConfig {
    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms)
    }
}

/// Session lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// First reconnect delay (doubles per attempt)
    pub retry_base_delay_ms: u64,
    /// Connect attempts after the first one before giving up
    pub retry_max_attempts: u32,
    /// Time in `loading` after a play request before a stall nudge
    pub stall_timeout_ms: u64,
    /// Weight offset used by the stall nudge
    pub stall_nudge_epsilon: f32,
    /// Nudges per play request
    pub stall_max_attempts: u32,
    /// Underruns within one play request before the user is told
    pub underrun_notice_after: u32,
    /// Forwarded to the service with `set_config`
    pub generation: GenerationConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_base_delay_ms: 500,
            retry_max_attempts: 4,
            stall_timeout_ms: 3000,
            stall_nudge_epsilon: 0.001,
            stall_max_attempts: 2,
            underrun_notice_after: 3,
            generation: GenerationConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}

/// Drop and transition effects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    pub drop_silence_ms: u64,
    pub drop_impact_ms: u64,
    pub transition_buildup_ms: u64,
    /// Weight every active prompt drops to during silence (kept above zero)
    pub silence_weight: f32,
    /// Weight of the synthetic drop track
    pub drop_track_weight: f32,
    /// Impact boost for rhythm/percussion prompts: `w * mult + add`
    pub rhythm_boost_mult: f32,
    pub rhythm_boost_add: f32,
    /// Impact boost for other prompts
    pub other_boost_mult: f32,
    pub other_boost_add: f32,
    /// Weight forced on the strongest prompt when nothing would be audible
    pub fallback_weight: f32,
    /// Build-up multiplier for significant prompts
    pub buildup_boost: f32,
    /// Appended to prompt text during build-up
    pub buildup_suffix: String,
    pub riser_text: String,
    pub riser_weight: f32,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            drop_silence_ms: 3000,
            drop_impact_ms: 8000,
            transition_buildup_ms: 8000,
            silence_weight: 0.001,
            drop_track_weight: 1.8,
            rhythm_boost_mult: 1.75,
            rhythm_boost_add: 0.3,
            other_boost_mult: 1.1,
            other_boost_add: 0.1,
            fallback_weight: 1.0,
            buildup_boost: 1.3,
            buildup_suffix: ", building tension, rising energy".to_string(),
            riser_text: "Rising white noise riser, snare roll building up".to_string(),
            riser_weight: 1.5,
        }
    }
}

impl EffectsConfig {
    pub fn drop_silence(&self) -> Duration {
        Duration::from_millis(self.drop_silence_ms)
    }

    pub fn drop_impact(&self) -> Duration {
        Duration::from_millis(self.drop_impact_ms)
    }

    pub fn transition_buildup(&self) -> Duration {
        Duration::from_millis(self.transition_buildup_ms)
    }
}

/// Optional audio relay (casting sink)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Base URL, e.g. `http://192.168.1.20:8080`; relay disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Frames queued for upload before new ones are rejected
    pub queue_frames: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            queue_frames: 64,
        }
    }
}

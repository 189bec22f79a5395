//! Core types shared across the controller

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest prompt weight
pub const MIN_WEIGHT: f32 = 0.0;

/// Highest prompt weight
pub const MAX_WEIGHT: f32 = 2.0;

/// Clamp a weight into `[MIN_WEIGHT, MAX_WEIGHT]`; NaN becomes 0
pub fn clamp_weight(weight: f32) -> f32 {
    if weight.is_nan() {
        return MIN_WEIGHT;
    }
    weight.clamp(MIN_WEIGHT, MAX_WEIGHT)
}

/// Opaque, stable prompt identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptId(String);

impl PromptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PromptId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A named text prompt with its mix weight
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: PromptId,
    pub text: String,
    /// Always within `[MIN_WEIGHT, MAX_WEIGHT]`
    pub weight: f32,
    /// Display tag, passed through untouched
    #[serde(default)]
    pub color: String,
    /// Synthetic track injected by an effect; never persisted
    #[serde(skip)]
    pub is_effect_track: bool,
}

impl Prompt {
    pub fn new(id: impl Into<PromptId>, text: impl Into<String>, weight: f32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            weight: clamp_weight(weight),
            color: String::new(),
            is_effect_track: false,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}

impl From<String> for PromptId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One entry of the mix sent to the generation service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedPrompt {
    pub text: String,
    pub weight: f32,
}

impl WeightedPrompt {
    pub fn new(text: impl Into<String>, weight: f32) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }
}

/// Playback state, written only by the session manager
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Loading,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
        }
    }

    /// Whether incoming audio should be scheduled
    pub fn accepts_audio(&self) -> bool {
        matches!(self, Self::Loading | Self::Playing)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

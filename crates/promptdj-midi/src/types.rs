//! Binding target types
//!
//! A CC number can be bound to either a prompt (continuous weight control)
//! or a discrete action (button press simulation). Prompt identifiers are
//! opaque strings at this boundary; the controller owns their meaning.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete actions a CC can trigger
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", content = "name", rename_all = "snake_case")]
pub enum ActionTag {
    /// Toggle between playing and paused/stopped
    PlayPause,
    /// Run the drop effect
    Drop,
    /// Run the transition effect (build-up followed by a drop)
    Transition,
    /// A named effect resolved by the controller
    Effect(String),
}

impl ActionTag {
    /// Parse an action from its short name ("play-pause", "drop", ...)
    ///
    /// Unknown names become [`ActionTag::Effect`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "play-pause" | "play_pause" | "playpause" => Self::PlayPause,
            "drop" => Self::Drop,
            "transition" => Self::Transition,
            other => Self::Effect(other.to_string()),
        }
    }

    /// Short name for display and logs
    pub fn name(&self) -> &str {
        match self {
            Self::PlayPause => "play-pause",
            Self::Drop => "drop",
            Self::Transition => "transition",
            Self::Effect(name) => name,
        }
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a learned CC controls
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum LearnTarget {
    /// Weight of the prompt with this id
    Prompt(String),
    /// A discrete action
    Action(ActionTag),
}

impl LearnTarget {
    pub fn prompt(id: impl Into<String>) -> Self {
        Self::Prompt(id.into())
    }

    pub fn action(tag: ActionTag) -> Self {
        Self::Action(tag)
    }
}

impl fmt::Display for LearnTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prompt(id) => write!(f, "prompt:{}", id),
            Self::Action(tag) => write!(f, "action:{}", tag),
        }
    }
}

/// A single CC → target binding
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CcBinding {
    /// Controller number (0-127)
    pub cc: u8,
    /// Bound target
    pub target: LearnTarget,
}

/// Command produced by the mapping engine for the controller to apply
#[derive(Clone, Debug, PartialEq)]
pub enum MidiCommand {
    /// Set a prompt weight (already scaled to the prompt weight range)
    SetPromptWeight { prompt_id: String, weight: f32 },
    /// Trigger a discrete action
    Trigger(ActionTag),
}

//! Learn mode state machine
//!
//! ```text
//! Idle ──enter──► Learning{None} ──select──► Learning{Some(target)}
//!   ▲                 ▲   │                        │
//!   └─────exit────────┼───┘        CC received ────┘ (bind, back to None)
//!                     └── select same target again (deselect)
//! ```

use crate::types::LearnTarget;
use std::time::{Duration, Instant};

/// Default hold time that turns a learn-toggle press into "clear all"
pub const DEFAULT_LONG_PRESS: Duration = Duration::from_millis(1500);

/// Learn mode state
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LearnState {
    #[default]
    Idle,
    Learning {
        /// Target waiting for the next CC
        selected: Option<LearnTarget>,
    },
}

impl LearnState {
    pub fn is_learning(&self) -> bool {
        matches!(self, Self::Learning { .. })
    }

    pub fn selected(&self) -> Option<&LearnTarget> {
        match self {
            Self::Learning { selected } => selected.as_ref(),
            Self::Idle => None,
        }
    }

    /// Enter learn mode with no target selected
    pub fn enter(&mut self) {
        *self = Self::Learning { selected: None };
    }

    /// Leave learn mode. Returns true if we were learning.
    pub fn exit(&mut self) -> bool {
        let was_learning = self.is_learning();
        *self = Self::Idle;
        was_learning
    }

    /// Select (or deselect, if already selected) a target
    ///
    /// Returns false when not learning; selection is ignored then.
    pub fn select(&mut self, target: LearnTarget) -> bool {
        match self {
            Self::Learning { selected } => {
                if selected.as_ref() == Some(&target) {
                    *selected = None;
                } else {
                    *selected = Some(target);
                }
                true
            }
            Self::Idle => false,
        }
    }

    /// Take the selected target after a CC was bound to it
    pub fn take_selected(&mut self) -> Option<LearnTarget> {
        match self {
            Self::Learning { selected } => selected.take(),
            Self::Idle => None,
        }
    }
}

/// Gesture recognized on the learn toggle button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleGesture {
    /// Normal click: toggle learn mode
    Short,
    /// Held past the long-press threshold
    Long,
}

/// Press/release tracker for the learn toggle
#[derive(Debug, Clone)]
pub struct LearnToggle {
    long_press: Duration,
    pressed_at: Option<Instant>,
}

impl Default for LearnToggle {
    fn default() -> Self {
        Self::new(DEFAULT_LONG_PRESS)
    }
}

impl LearnToggle {
    pub fn new(long_press: Duration) -> Self {
        Self {
            long_press,
            pressed_at: None,
        }
    }

    pub fn press(&mut self, now: Instant) {
        self.pressed_at = Some(now);
    }

    /// Classify the gesture on release. A release without a press is a
    /// short click.
    pub fn release(&mut self, now: Instant) -> ToggleGesture {
        match self.pressed_at.take() {
            Some(at) if now.saturating_duration_since(at) >= self.long_press => ToggleGesture::Long,
            _ => ToggleGesture::Short,
        }
    }
}

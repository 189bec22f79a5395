//! Messages into and out of the controller

use crate::session::{SessionEvent, SessionId};
use crate::types::{PlaybackState, Prompt, PromptId};
use flume::Sender;
use promptdj_midi::{CcBinding, LearnTarget, MidiInputEvent};

/// Commands from the user interface
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    // ─────────────────────────────────────────────────────────────
    // Prompts
    // ─────────────────────────────────────────────────────────────
    AddPrompt { text: String, weight: f32, color: String },
    RemovePrompt { id: PromptId },
    SetPromptText { id: PromptId, text: String },
    SetPromptWeight { id: PromptId, weight: f32 },
    SetPromptColor { id: PromptId, color: String },
    /// Allow a previously filtered text again
    ClearFiltered { text: String },
    /// Stop, drop any effect and go back to the default palette
    ResetPrompts,

    // ─────────────────────────────────────────────────────────────
    // Playback
    // ─────────────────────────────────────────────────────────────
    Play,
    Pause,
    Stop,
    TogglePlayPause,

    // ─────────────────────────────────────────────────────────────
    // Effects
    // ─────────────────────────────────────────────────────────────
    Drop,
    Transition,

    // ─────────────────────────────────────────────────────────────
    // MIDI
    // ─────────────────────────────────────────────────────────────
    /// Connect to an input port by name (or disconnect with `None`)
    SelectMidiDevice(Option<String>),
    EnterLearn,
    ExitLearn,
    /// Escape: leave learn mode (bindings are still persisted)
    CancelLearn,
    LearnTogglePressed,
    LearnToggleReleased,
    SelectLearnTarget(LearnTarget),
    ClearBindings,
}

/// Notifications for the user interface
#[derive(Debug, Clone, PartialEq)]
pub enum UiNotice {
    PlaybackStateChanged(PlaybackState),
    PromptFiltered { text: String, reason: String },
    LearnStateChanged {
        is_learning: bool,
        selected_target: Option<LearnTarget>,
    },
    BindingsChanged(Vec<CcBinding>),
    /// Prompts as displayed (effect substitutions included)
    PromptsChanged(Vec<Prompt>),
    /// Transient toast
    Error { message: String },
}

/// Event from the session of `session`
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMessage {
    pub session: SessionId,
    pub event: SessionEvent,
}

/// Everything the controller reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerInput {
    Ui(UiCommand),
    Midi(MidiInputEvent),
    Session(SessionMessage),
    Shutdown,
}

impl From<MidiInputEvent> for ControllerInput {
    fn from(event: MidiInputEvent) -> Self {
        Self::Midi(event)
    }
}

impl From<UiCommand> for ControllerInput {
    fn from(command: UiCommand) -> Self {
        Self::Ui(command)
    }
}

/// Sending half of the notice channel
///
/// Sends never block; a closed channel only logs.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Sender<UiNotice>,
}

impl Notifier {
    pub fn new(tx: Sender<UiNotice>) -> Self {
        Self { tx }
    }

    pub fn notify(&self, notice: UiNotice) {
        if let Err(e) = self.tx.try_send(notice) {
            log::debug!("Notice dropped: {:?}", e.into_inner());
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(UiNotice::Error {
            message: message.into(),
        });
    }
}

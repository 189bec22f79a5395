//! promptdj core - live generation session controller
//!
//! Steers a continuously generated music stream from weighted text prompts,
//! MIDI controllers and one-shot effects.
//!
//! # Architecture
//!
//! ```text
//!  UI commands ──┐
//!  MIDI (flume) ─┼──► LiveController::handle() ──► PromptMixer ──(throttled)──► GenerationSessionManager
//!  Session events┘            │                         ▲                           │        │
//!                             │                         │ overlay                   │        ▼
//!  timers ──► poll_timers() ──┴──► EffectSequencer ─────┘              AudioScheduler ──► AudioOutput
//! ```
//!
//! Everything runs on one logical thread. Inputs arrive as [`ControllerInput`]
//! values; timers are polled with an explicit `now`, so the whole controller
//! is deterministic under test.

pub mod audio;
pub mod config;
pub mod controller;
pub mod effects;
pub mod messages;
pub mod mixer;
pub mod relay;
pub mod runtime;
pub mod session;
pub mod store;
pub mod timer;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{ControllerDeps, LiveController};
pub use messages::{ControllerInput, Notifier, UiCommand, UiNotice};
pub use runtime::{run_controller, LiveRuntime, RuntimeHandles};
pub use types::*;

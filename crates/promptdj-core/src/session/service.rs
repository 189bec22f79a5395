//! Generation service boundary
//!
//! The wire protocol is not part of this crate. A service implementation
//! opens a session, forwards its traffic as [`SessionEvent`]s through the
//! [`SessionEvents`] it was given and exposes a [`SessionHandle`] for the
//! outgoing direction.

use crate::messages::{ControllerInput, SessionMessage};
use crate::types::WeightedPrompt;
use flume::Sender;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stale-generation token of one connection lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Traffic from the service
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SetupComplete,
    /// The service refused a prompt text
    FilteredPrompt { text: String, reason: String },
    /// Raw 16-bit PCM
    AudioFrame(Vec<u8>),
    Error(String),
    Closed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Failed to send to session: {0}")]
    Send(String),

    #[error("Session closed")]
    Closed,
}

/// Generation parameters forwarded to the service as-is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Outgoing side of one open session
pub trait SessionHandle {
    fn play(&mut self) -> Result<(), ServiceError>;
    fn pause(&mut self) -> Result<(), ServiceError>;
    fn stop(&mut self) -> Result<(), ServiceError>;
    fn set_weighted_prompts(&mut self, prompts: &[WeightedPrompt]) -> Result<(), ServiceError>;
    fn set_config(&mut self, config: &GenerationConfig) -> Result<(), ServiceError>;
}

/// Connects sessions
pub trait GenerationService {
    /// Open a session; every event it produces must go through `events`
    fn connect(&mut self, events: SessionEvents) -> Result<Box<dyn SessionHandle>, ServiceError>;
}

/// Event sink handed to a service for one session
#[derive(Debug, Clone)]
pub struct SessionEvents {
    session: SessionId,
    tx: Sender<ControllerInput>,
}

impl SessionEvents {
    pub fn new(session: SessionId, tx: Sender<ControllerInput>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Deliver an event; returns false once the controller is gone
    pub fn send(&self, event: SessionEvent) -> bool {
        self.tx
            .send(ControllerInput::Session(SessionMessage {
                session: self.session,
                event,
            }))
            .is_ok()
    }
}

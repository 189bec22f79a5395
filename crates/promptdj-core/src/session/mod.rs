//! Generation session manager
//!
//! Owns the connection to the generation service, the playback state and
//! the audio path (scheduler, output, optional relay).
//!
//! ```text
//! Stopped ──play──► Loading ──first frame──► Playing ⇄ Paused
//!    ▲                 │  ▲                     │
//!    │   connect fail  │  └──── underrun ───────┘
//!    └─────────────────┘
//!    ▲
//!    └──── stop / fatal error / close (from any state)
//! ```
//!
//! Every connection gets a fresh [`SessionId`]. Events carrying any other
//! id are stale and ignored, which also swallows the close that follows a
//! user stop.

mod backoff;
mod service;

pub use backoff::Backoff;
pub use service::{
    GenerationConfig, GenerationService, ServiceError, SessionEvent, SessionEvents, SessionHandle,
    SessionId,
};

use crate::audio::{decode_pcm16, AudioFormat, AudioOutput, AudioScheduler, ScheduleOutcome};
use crate::config::SessionConfig;
use crate::messages::{ControllerInput, Notifier, SessionMessage, UiNotice};
use crate::mixer::PromptMixer;
use crate::relay::AudioRelay;
use crate::timer::{earliest, TimerSlot};
use crate::types::{clamp_weight, PlaybackState, WeightedPrompt, MAX_WEIGHT};
use flume::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: PlaybackState,
    },

    #[error("need an active prompt")]
    NoActivePrompt,

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Whether a failed connect is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectPolicy {
    /// Fail on the first error (UI play)
    #[default]
    Once,
    /// Exponential backoff before giving up (MIDI play)
    WithRetry,
}

/// What the controller has to follow up on after a session step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    None,
    /// A prompt was filtered; push the mix again
    Filtered,
    /// The session ended on its own (error, close, push failure)
    Ended,
}

/// Everything the manager needs from the outside world
pub struct SessionDeps {
    pub service: Box<dyn GenerationService>,
    pub output: Box<dyn AudioOutput>,
    pub relay: Option<Box<dyn AudioRelay>>,
    /// Controller input channel handed to every session
    pub events_tx: Sender<ControllerInput>,
    pub notifier: Notifier,
}

pub struct GenerationSessionManager {
    service: Box<dyn GenerationService>,
    output: Box<dyn AudioOutput>,
    relay: Option<Box<dyn AudioRelay>>,
    events_tx: Sender<ControllerInput>,
    notifier: Notifier,

    config: SessionConfig,
    format: AudioFormat,
    gain_ramp: Duration,

    state: PlaybackState,
    scheduler: AudioScheduler,

    handle: Option<Box<dyn SessionHandle>>,
    session: Option<SessionId>,
    last_session: u64,
    setup_complete: bool,
    /// Play as soon as setup completes
    pending_play: bool,

    policy: ConnectPolicy,
    backoff: Backoff,
    retry_timer: TimerSlot,

    stall_timer: TimerSlot,
    stall_attempts: u32,
    underruns: u32,
}

impl GenerationSessionManager {
    pub fn new(
        deps: SessionDeps,
        config: SessionConfig,
        format: AudioFormat,
        lookahead_secs: f64,
        gain_ramp: Duration,
    ) -> Self {
        let backoff = Backoff::new(config.retry_base_delay(), config.retry_max_attempts);
        Self {
            service: deps.service,
            output: deps.output,
            relay: deps.relay,
            events_tx: deps.events_tx,
            notifier: deps.notifier,
            config,
            format,
            gain_ramp,
            state: PlaybackState::Stopped,
            scheduler: AudioScheduler::new(lookahead_secs),
            handle: None,
            session: None,
            last_session: 0,
            setup_complete: false,
            pending_play: false,
            policy: ConnectPolicy::Once,
            backoff,
            retry_timer: TimerSlot::new(),
            stall_timer: TimerSlot::new(),
            stall_attempts: 0,
            underruns: 0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete
    }

    pub fn scheduler(&self) -> &AudioScheduler {
        &self.scheduler
    }

    /// Underruns since the last play request
    pub fn underruns(&self) -> u32 {
        self.underruns
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([self.retry_timer.deadline(), self.stall_timer.deadline()])
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state == state {
            return;
        }
        log::info!("Session: {} -> {}", self.state, state);
        self.state = state;
        self.notifier.notify(UiNotice::PlaybackStateChanged(state));
    }

    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────

    /// Start or resume playback
    pub fn play(
        &mut self,
        mixer: &PromptMixer,
        now: Instant,
        policy: ConnectPolicy,
    ) -> Result<(), SessionError> {
        if !matches!(self.state, PlaybackState::Stopped | PlaybackState::Paused) {
            return Err(SessionError::InvalidState {
                action: "play",
                state: self.state,
            });
        }
        if !mixer.has_active_prompt() {
            return Err(SessionError::NoActivePrompt);
        }

        if self.state == PlaybackState::Stopped {
            self.scheduler.reset();
            self.output.clear();
        }
        self.output.ramp_gain(0.0, Duration::ZERO);
        self.output.ramp_gain(1.0, self.gain_ramp);

        self.underruns = 0;
        self.stall_attempts = 0;
        self.stall_timer.arm(now + self.config.stall_timeout());
        self.set_state(PlaybackState::Loading);

        if self.handle.is_some() && self.setup_complete {
            return self.start_remote(mixer).map_err(|e| {
                self.end_session(&e.to_string());
                SessionError::Service(e)
            });
        }

        self.pending_play = true;
        self.policy = policy;
        self.backoff.reset();
        if self.handle.is_none() {
            self.connect(now);
        }
        Ok(())
    }

    /// Pause; the session stays open
    pub fn pause(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Loading) {
            return Err(SessionError::InvalidState {
                action: "pause",
                state: self.state,
            });
        }
        if let Some(handle) = self.handle.as_mut() {
            if self.setup_complete {
                if let Err(e) = handle.pause() {
                    log::warn!("Session: Remote pause failed: {}", e);
                }
            }
        }
        self.pending_play = false;
        self.retry_timer.cancel();
        self.stall_timer.cancel();
        self.output.ramp_gain(0.0, self.gain_ramp);
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    /// Stop and close the session
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.stop() {
                log::warn!("Session: Remote stop failed: {}", e);
            }
        }
        self.teardown();
    }

    /// Push a mix to the open session
    ///
    /// Returns false when there is nothing to push to yet; the mix is sent
    /// when setup completes.
    pub fn push_mix(&mut self, mix: &[WeightedPrompt]) -> Result<bool, SessionError> {
        match self.handle.as_mut() {
            Some(handle) if self.setup_complete => {
                handle.set_weighted_prompts(mix)?;
                log::trace!("Session: Pushed {} prompts", mix.len());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Push failure outside of an effect: the session is unusable
    pub fn fail(&mut self, error: &SessionError) {
        self.end_session(&error.to_string());
    }

    // ─────────────────────────────────────────────────────────────
    // Connection lifecycle
    // ─────────────────────────────────────────────────────────────

    fn connect(&mut self, now: Instant) {
        self.close_handle();

        self.last_session += 1;
        let session = SessionId(self.last_session);
        let events = SessionEvents::new(session, self.events_tx.clone());
        log::info!("Session: Connecting {}", session);

        match self.service.connect(events) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.session = Some(session);
            }
            Err(e) => self.connect_failed(now, &e.to_string()),
        }
    }

    fn connect_failed(&mut self, now: Instant, reason: &str) {
        self.close_handle();

        if self.policy == ConnectPolicy::WithRetry {
            if let Some(delay) = self.backoff.next_delay() {
                log::warn!(
                    "Session: Connect failed ({}), retry {} in {:?}",
                    reason,
                    self.backoff.attempts(),
                    delay
                );
                self.retry_timer.arm(now + delay);
                return;
            }
        }

        log::error!("Session: Connect failed: {}", reason);
        self.teardown();
        self.notifier
            .error(format!("Could not connect to the generation service: {}", reason));
    }

    fn start_remote(&mut self, mixer: &PromptMixer) -> Result<(), ServiceError> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(ServiceError::Closed);
        };
        handle.set_weighted_prompts(&mixer.snapshot())?;
        handle.play()
    }

    fn close_handle(&mut self) {
        self.handle = None;
        self.session = None;
        self.setup_complete = false;
    }

    /// Drop the session and return to `Stopped`
    fn teardown(&mut self) {
        self.close_handle();
        self.pending_play = false;
        self.retry_timer.cancel();
        self.stall_timer.cancel();
        self.output.ramp_gain(0.0, self.gain_ramp);
        self.scheduler.reset();
        if let Some(relay) = self.relay.as_mut() {
            if let Err(e) = relay.reset() {
                log::debug!("Relay: Reset not queued: {}", e);
            }
        }
        self.set_state(PlaybackState::Stopped);
    }

    fn end_session(&mut self, reason: &str) {
        log::error!("Session: Ended: {}", reason);
        self.teardown();
        self.notifier.error(format!("Session ended: {}", reason));
    }

    // ─────────────────────────────────────────────────────────────
    // Events and timers
    // ─────────────────────────────────────────────────────────────

    pub fn handle_event(
        &mut self,
        message: SessionMessage,
        mixer: &mut PromptMixer,
        now: Instant,
    ) -> SessionUpdate {
        if self.session != Some(message.session) {
            log::trace!("Session: Ignoring event from stale session {}", message.session);
            return SessionUpdate::None;
        }

        match message.event {
            SessionEvent::SetupComplete => self.on_setup_complete(mixer),
            SessionEvent::FilteredPrompt { text, reason } => {
                log::warn!("Session: Prompt filtered: '{}' ({})", text, reason);
                mixer.mark_filtered(text.clone());
                self.notifier.notify(UiNotice::PromptFiltered { text, reason });
                SessionUpdate::Filtered
            }
            SessionEvent::AudioFrame(bytes) => {
                self.on_audio_frame(&bytes);
                SessionUpdate::None
            }
            SessionEvent::Error(reason) => self.on_session_lost(now, &reason),
            SessionEvent::Closed => self.on_session_lost(now, "connection closed"),
        }
    }

    fn on_setup_complete(&mut self, mixer: &PromptMixer) -> SessionUpdate {
        log::info!("Session: Setup complete");
        self.setup_complete = true;
        self.backoff.reset();

        let generation = self.config.generation.clone();
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.set_config(&generation) {
                log::warn!("Session: Failed to send generation config: {}", e);
            }
        }

        if !self.pending_play {
            return SessionUpdate::None;
        }
        self.pending_play = false;
        match self.start_remote(mixer) {
            Ok(()) => SessionUpdate::None,
            Err(e) => {
                self.end_session(&e.to_string());
                SessionUpdate::Ended
            }
        }
    }

    fn on_session_lost(&mut self, now: Instant, reason: &str) -> SessionUpdate {
        if !self.setup_complete && self.pending_play {
            self.connect_failed(now, reason);
            return if self.state == PlaybackState::Stopped {
                SessionUpdate::Ended
            } else {
                SessionUpdate::None
            };
        }
        self.end_session(reason);
        SessionUpdate::Ended
    }

    fn on_audio_frame(&mut self, bytes: &[u8]) {
        if !self.state.accepts_audio() {
            log::trace!("Session: Dropping frame while {}", self.state);
            return;
        }

        let buffer = match decode_pcm16(bytes, self.format) {
            Ok(buffer) => buffer,
            Err(e) => {
                log::warn!("Session: Skipping audio frame: {}", e);
                return;
            }
        };

        let now = self.output.current_time();
        match self.scheduler.schedule(self.state, now, buffer.duration_secs()) {
            ScheduleOutcome::Scheduled { start, now_playing } => {
                if let Err(e) = self.output.schedule(start, buffer) {
                    log::warn!("Audio: Failed to schedule frame: {}", e);
                }
                if let Some(relay) = self.relay.as_mut() {
                    if let Err(e) = relay.upload(bytes) {
                        log::debug!("Relay: Frame not queued: {}", e);
                    }
                }
                if now_playing {
                    self.stall_timer.cancel();
                    self.set_state(PlaybackState::Playing);
                }
            }
            ScheduleOutcome::Underrun { resume_at } => {
                self.underruns += 1;
                log::warn!(
                    "Audio: Underrun {} in this play, re-buffering until {:.2}s",
                    self.underruns,
                    resume_at
                );
                self.set_state(PlaybackState::Loading);
                if self.underruns == self.config.underrun_notice_after {
                    self.notifier
                        .error("Playback keeps stalling; the connection may be too slow");
                }
            }
            ScheduleOutcome::Ignored => {}
        }
    }

    pub fn poll_timers(&mut self, mixer: &PromptMixer, now: Instant) -> SessionUpdate {
        if self.retry_timer.fire(now) && self.pending_play && self.state == PlaybackState::Loading {
            log::info!("Session: Reconnecting (attempt {})", self.backoff.attempts());
            self.connect(now);
            if self.state == PlaybackState::Stopped {
                return SessionUpdate::Ended;
            }
        }

        if self.stall_timer.fire(now) && self.state == PlaybackState::Loading {
            return self.recover_stall(mixer, now);
        }
        SessionUpdate::None
    }

    /// Nudge the first mix entry by epsilon and revert it
    fn recover_stall(&mut self, mixer: &PromptMixer, now: Instant) -> SessionUpdate {
        self.stall_attempts += 1;
        if self.stall_attempts < self.config.stall_max_attempts {
            self.stall_timer.arm(now + self.config.stall_timeout());
        }

        let mix = mixer.snapshot();
        let Some(first) = mix.first() else {
            return SessionUpdate::None;
        };
        if !self.setup_complete {
            return SessionUpdate::None;
        }

        let epsilon = self.config.stall_nudge_epsilon;
        let nudged_weight = if first.weight + epsilon <= MAX_WEIGHT {
            first.weight + epsilon
        } else {
            first.weight - epsilon
        };
        let mut nudged = mix.clone();
        nudged[0].weight = clamp_weight(nudged_weight);

        log::info!(
            "Session: Still loading, nudging '{}' (attempt {})",
            first.text,
            self.stall_attempts
        );
        let result = self
            .push_mix(&nudged)
            .and_then(|_| self.push_mix(&mix));
        match result {
            Ok(_) => SessionUpdate::None,
            Err(e) => {
                self.fail(&e);
                SessionUpdate::Ended
            }
        }
    }
}

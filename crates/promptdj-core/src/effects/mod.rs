//! Timed effect sequences
//!
//! ```text
//! Drop:        Silence ──(drop_silence)──► Impact ──(drop_impact)──► restore
//! Transition:  BuildUp ──(buildup)──► Silence ──► Impact ──► restore
//! ```
//!
//! Effects only ever install a [`MixOverlay`](crate::mixer::MixOverlay) on
//! the mixer; the base prompts stay untouched while a run is active, and
//! the snapshot taken at the start is restored verbatim at the end.
//! The controller pushes the mix after every phase change.

mod mix;

pub use mix::{
    buildup_overlay, impact_overlay, is_rhythmic, silence_overlay, MixContext, DROP_TRACK_ID,
    RISER_TRACK_ID,
};

use crate::config::EffectsConfig;
use crate::mixer::PromptMixer;
use crate::timer::TimerSlot;
use crate::types::{PlaybackState, Prompt};
use std::fmt;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    Drop,
    Transition,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drop => f.write_str("drop"),
            Self::Transition => f.write_str("transition"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectPhase {
    BuildUp,
    Silence,
    Impact,
}

/// Rejection of an effect trigger or a prompt edit
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Effects need playback to be running (currently {0})")]
    NotPlaying(PlaybackState),

    #[error("A {0} is already running")]
    EffectRunning(EffectKind),

    #[error("Prompts are locked while the {0} runs")]
    PromptsLocked(EffectKind),
}

/// How an aborted run leaves the prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortMode {
    /// Put back the snapshot taken at the start
    Restore,
    /// Forget the snapshot (full reset follows)
    Discard,
}

/// Result of advancing the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectProgress {
    Phase(EffectKind, EffectPhase),
    Finished(EffectKind),
}

/// The effect currently running
#[derive(Debug, Clone)]
pub struct EffectRun {
    pub id: u64,
    pub kind: EffectKind,
    pub phase: EffectPhase,
    pub started_at: Instant,
    pub snapshot_before_run: Vec<Prompt>,
    /// Prompts the drop phases work from
    drop_base: Vec<Prompt>,
}

pub struct EffectSequencer {
    config: EffectsConfig,
    run: Option<EffectRun>,
    timer: TimerSlot,
    last_run: u64,
}

impl EffectSequencer {
    pub fn new(config: EffectsConfig) -> Self {
        Self {
            config,
            run: None,
            timer: TimerSlot::new(),
            last_run: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    pub fn current(&self) -> Option<&EffectRun> {
        self.run.as_ref()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Reject prompt edits while a run is active
    pub fn check_edit(&self) -> Result<(), GuardError> {
        match &self.run {
            Some(run) => Err(GuardError::PromptsLocked(run.kind)),
            None => Ok(()),
        }
    }

    fn check_trigger(&self, state: PlaybackState) -> Result<(), GuardError> {
        if let Some(run) = &self.run {
            return Err(GuardError::EffectRunning(run.kind));
        }
        if state != PlaybackState::Playing {
            return Err(GuardError::NotPlaying(state));
        }
        Ok(())
    }

    fn begin(
        &mut self,
        kind: EffectKind,
        phase: EffectPhase,
        mixer: &PromptMixer,
        now: Instant,
        drop_base: Vec<Prompt>,
    ) {
        self.last_run += 1;
        self.run = Some(EffectRun {
            id: self.last_run,
            kind,
            phase,
            started_at: now,
            snapshot_before_run: mixer.prompts().to_vec(),
            drop_base,
        });
        log::info!("Effects: {} #{} started", kind, self.last_run);
    }

    pub fn start_drop(
        &mut self,
        mixer: &mut PromptMixer,
        state: PlaybackState,
        now: Instant,
    ) -> Result<(), GuardError> {
        self.check_trigger(state)?;
        let base = mixer.prompts().to_vec();
        self.begin(EffectKind::Drop, EffectPhase::Silence, mixer, now, base);
        self.enter_silence(mixer, now);
        Ok(())
    }

    pub fn start_transition(
        &mut self,
        mixer: &mut PromptMixer,
        state: PlaybackState,
        now: Instant,
    ) -> Result<(), GuardError> {
        self.check_trigger(state)?;
        let (overlay, drop_base) = {
            let ctx = MixContext {
                filtered: mixer.filtered(),
                threshold: mixer.threshold(),
                config: &self.config,
            };
            buildup_overlay(mixer.prompts(), &ctx)
        };
        self.begin(EffectKind::Transition, EffectPhase::BuildUp, mixer, now, drop_base);
        mixer.set_overlay(overlay);
        self.timer.arm(now + self.config.transition_buildup());
        Ok(())
    }

    fn enter_silence(&mut self, mixer: &mut PromptMixer, now: Instant) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        run.phase = EffectPhase::Silence;
        let overlay = silence_overlay(
            &run.drop_base,
            &MixContext {
                filtered: mixer.filtered(),
                threshold: mixer.threshold(),
                config: &self.config,
            },
        );
        mixer.set_overlay(overlay);
        self.timer.arm(now + self.config.drop_silence());
    }

    fn enter_impact(&mut self, mixer: &mut PromptMixer, now: Instant) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        run.phase = EffectPhase::Impact;
        let overlay = impact_overlay(
            &run.drop_base,
            &MixContext {
                filtered: mixer.filtered(),
                threshold: mixer.threshold(),
                config: &self.config,
            },
        );
        mixer.set_overlay(overlay);
        self.timer.arm(now + self.config.drop_impact());
    }

    /// Advance to the next phase when its timer is due
    pub fn poll(&mut self, mixer: &mut PromptMixer, now: Instant) -> Option<EffectProgress> {
        if !self.timer.fire(now) {
            return None;
        }
        let (kind, phase) = {
            let run = self.run.as_ref()?;
            (run.kind, run.phase)
        };

        match phase {
            EffectPhase::BuildUp => {
                self.enter_silence(mixer, now);
                log::debug!("Effects: {} build-up done, dropping", kind);
                Some(EffectProgress::Phase(kind, EffectPhase::Silence))
            }
            EffectPhase::Silence => {
                self.enter_impact(mixer, now);
                log::debug!("Effects: {} impact", kind);
                Some(EffectProgress::Phase(kind, EffectPhase::Impact))
            }
            EffectPhase::Impact => {
                let run = self.run.take()?;
                mixer.clear_overlay();
                mixer.restore(run.snapshot_before_run);
                log::info!(
                    "Effects: {} #{} finished after {:?}",
                    kind,
                    run.id,
                    now.saturating_duration_since(run.started_at)
                );
                Some(EffectProgress::Finished(kind))
            }
        }
    }

    /// Cancel the running effect, if any; returns its kind
    pub fn abort(&mut self, mixer: &mut PromptMixer, mode: AbortMode) -> Option<EffectKind> {
        self.timer.cancel();
        let run = self.run.take()?;
        mixer.clear_overlay();
        if mode == AbortMode::Restore {
            mixer.restore(run.snapshot_before_run);
        }
        log::info!("Effects: {} #{} aborted ({:?})", run.kind, run.id, mode);
        Some(run.kind)
    }
}

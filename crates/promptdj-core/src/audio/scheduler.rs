//! Gap-free scheduling of decoded frames on the output clock
//!
//! The scheduler keeps a single `next_start` cursor in output-clock seconds.
//! Frames are laid back to back from that cursor; a constant lookahead
//! absorbs network jitter. When the cursor falls behind the clock the frame
//! is dropped (underrun) and playback re-buffers from `now + lookahead`.

use crate::types::PlaybackState;

/// Default buffer-ahead latency in seconds
pub const DEFAULT_LOOKAHEAD_SECS: f64 = 1.5;

/// What to do with one decoded frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleOutcome {
    /// Play the frame at `start`; `now_playing` requests `Loading → Playing`
    Scheduled { start: f64, now_playing: bool },
    /// Frame dropped; re-buffer (`→ Loading`) and resume at `resume_at`
    Underrun { resume_at: f64 },
    /// Not playing; frame dropped
    Ignored,
}

#[derive(Debug, Clone)]
pub struct AudioScheduler {
    lookahead: f64,
    /// Unset after stop, set by the first scheduled frame
    next_start: Option<f64>,
}

impl Default for AudioScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKAHEAD_SECS)
    }
}

impl AudioScheduler {
    pub fn new(lookahead: f64) -> Self {
        Self {
            lookahead: lookahead.max(0.0),
            next_start: None,
        }
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    pub fn next_start_time(&self) -> Option<f64> {
        self.next_start
    }

    /// Unset the timeline (used when playback starts from `Stopped`)
    pub fn reset(&mut self) {
        self.next_start = None;
    }

    /// Place a frame of `duration` seconds given the clock time `now`
    pub fn schedule(&mut self, state: PlaybackState, now: f64, duration: f64) -> ScheduleOutcome {
        match state {
            PlaybackState::Loading => {
                let earliest = now + self.lookahead;
                let start = self.next_start.map_or(earliest, |next| next.max(earliest));
                self.next_start = Some(start + duration);
                ScheduleOutcome::Scheduled {
                    start,
                    now_playing: true,
                }
            }
            PlaybackState::Playing => match self.next_start {
                Some(next) if next >= now => {
                    self.next_start = Some(next + duration);
                    ScheduleOutcome::Scheduled {
                        start: next,
                        now_playing: false,
                    }
                }
                _ => {
                    let resume_at = now + self.lookahead;
                    log::debug!("Audio: Underrun at {:.3}s, resuming at {:.3}s", now, resume_at);
                    self.next_start = Some(resume_at);
                    ScheduleOutcome::Underrun { resume_at }
                }
            },
            PlaybackState::Stopped | PlaybackState::Paused => ScheduleOutcome::Ignored,
        }
    }
}

//! Audio output abstraction

use super::decode::AudioBuffer;
use super::error::AudioResult;
use std::time::Duration;

/// A sink that plays buffers at absolute times on its own clock
///
/// The clock is monotonic seconds since the output was opened. It keeps
/// running while nothing is scheduled.
pub trait AudioOutput {
    /// Current position of the output clock in seconds
    fn current_time(&self) -> f64;

    /// Play `buffer` starting at clock time `start`
    fn schedule(&mut self, start: f64, buffer: AudioBuffer) -> AudioResult<()>;

    /// Fade the master gain to `target` over `duration`
    fn ramp_gain(&mut self, target: f32, duration: Duration);

    /// Drop every scheduled buffer that has not finished playing
    fn clear(&mut self);
}

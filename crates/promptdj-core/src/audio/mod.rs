//! Audio playback for the generated stream
//!
//! - **Decode**: service frames are 16-bit little-endian interleaved PCM
//! - **Scheduling**: [`AudioScheduler`] places frames back to back on the
//!   output clock with a constant lookahead
//! - **Output**: [`AudioOutput`] plays buffers at absolute clock times;
//!   [`CpalOutput`] is the device implementation
//!
//! # Example Usage
//!
//! ```ignore
//! use promptdj_core::audio::{decode_pcm16, AudioFormat, AudioScheduler, CpalOutput};
//!
//! let format = AudioFormat::default();
//! let mut output = CpalOutput::open(format, None)?;
//! let buffer = decode_pcm16(&bytes, format)?;
//! ```

mod cpal_output;
mod decode;
mod error;
mod output;
mod scheduler;

pub use cpal_output::CpalOutput;
pub use decode::{decode_pcm16, AudioBuffer, AudioFormat};
pub use error::{AudioError, AudioResult, DecodeError};
pub use output::AudioOutput;
pub use scheduler::{AudioScheduler, ScheduleOutcome, DEFAULT_LOOKAHEAD_SECS};

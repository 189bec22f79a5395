//! PCM decoding of service audio frames

use super::error::DecodeError;
use crate::config::AudioConfig;

/// Sample format of frames delivered by the generation service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(config.sample_rate, config.channels)
    }

    /// Bytes of one interleaved 16-bit sample frame
    pub fn frame_bytes(&self) -> usize {
        2 * self.channels as usize
    }
}

/// Decoded, interleaved f32 audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub format: AudioFormat,
    /// Interleaved samples in [-1, 1]
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        match self.format.channels {
            0 => 0,
            channels => self.samples.len() / channels as usize,
        }
    }

    /// Playback duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.format.sample_rate as f64
    }
}

/// Decode signed 16-bit little-endian interleaved PCM
pub fn decode_pcm16(bytes: &[u8], format: AudioFormat) -> Result<AudioBuffer, DecodeError> {
    if format.channels == 0 || format.sample_rate == 0 {
        return Err(DecodeError::InvalidFormat(format!(
            "{} Hz, {} channels",
            format.sample_rate, format.channels
        )));
    }
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let frame_bytes = format.frame_bytes();
    if bytes.len() % frame_bytes != 0 {
        return Err(DecodeError::Misaligned {
            len: bytes.len(),
            frame_bytes,
        });
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    Ok(AudioBuffer { format, samples })
}

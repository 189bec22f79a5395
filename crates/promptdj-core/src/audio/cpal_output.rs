//! CPAL output with sample-accurate buffer scheduling
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   Schedule / Ramp / Clear   ┌─────────────────────┐
//! │ Controller thread│───push()───────────────────►│   Command Queue     │
//! │  (CpalOutput)    │                             │  (lock-free SPSC)   │
//! └────────┬─────────┘                             └──────────┬──────────┘
//!          │ frame clock (Relaxed atomic)                     │ pop()
//!          ▼                                                  ▼
//! ┌──────────────────┐                             ┌─────────────────────┐
//! │   AtomicU64      │◄────────────────────────────│  CPAL Audio Thread  │
//! │ frames rendered  │                             │   (owns Renderer)   │
//! └──────────────────┘                             └─────────────────────┘
//! ```
//!
//! Buffers travel as `basedrop::Owned`, so dropping a finished buffer on the
//! audio thread only queues it; the memory is released when the controller
//! thread calls `Collector::collect()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use basedrop::{Collector, Owned};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use super::decode::{AudioBuffer, AudioFormat};
use super::error::{AudioError, AudioResult};
use super::output::AudioOutput;

/// Capacity of the controller → audio thread queue
const COMMAND_QUEUE_SIZE: usize = 256;

/// Scheduled buffers kept without reallocating on the audio thread
const MAX_VOICES: usize = 64;

/// Commands sent to the audio thread
enum OutputCommand {
    Schedule {
        start_frame: u64,
        channels: usize,
        samples: Owned<Vec<f32>>,
    },
    Ramp {
        target: f32,
        frames: u64,
    },
    Clear,
}

/// A buffer waiting for or being played
struct Voice {
    start_frame: u64,
    channels: usize,
    samples: Owned<Vec<f32>>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + (self.samples.len() / self.channels.max(1)) as u64
    }
}

/// Audio-thread half: mixes scheduled voices into the device buffer
struct Renderer {
    commands: rtrb::Consumer<OutputCommand>,
    voices: Vec<Voice>,
    out_channels: usize,
    gain: f32,
    gain_target: f32,
    gain_step: f32,
    clock: Arc<AtomicU64>,
}

impl Renderer {
    fn new(
        commands: rtrb::Consumer<OutputCommand>,
        out_channels: usize,
        clock: Arc<AtomicU64>,
    ) -> Self {
        Self {
            commands,
            voices: Vec::with_capacity(MAX_VOICES),
            out_channels: out_channels.max(1),
            gain: 0.0,
            gain_target: 0.0,
            gain_step: 0.0,
            clock,
        }
    }

    fn process_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                OutputCommand::Schedule {
                    start_frame,
                    channels,
                    samples,
                } => {
                    if self.voices.len() < MAX_VOICES {
                        self.voices.push(Voice {
                            start_frame,
                            channels,
                            samples,
                        });
                    }
                }
                OutputCommand::Ramp { target, frames } => {
                    self.gain_target = target;
                    if frames == 0 {
                        self.gain = target;
                        self.gain_step = 0.0;
                    } else {
                        self.gain_step = (target - self.gain) / frames as f32;
                    }
                }
                OutputCommand::Clear => self.voices.clear(),
            }
        }
    }

    fn advance_gain(&mut self) {
        if self.gain_step == 0.0 {
            return;
        }
        self.gain += self.gain_step;
        let reached = (self.gain_step > 0.0 && self.gain >= self.gain_target)
            || (self.gain_step < 0.0 && self.gain <= self.gain_target);
        if reached {
            self.gain = self.gain_target;
            self.gain_step = 0.0;
        }
    }

    /// Fill one interleaved device buffer
    fn render(&mut self, data: &mut [f32]) {
        self.process_commands();

        let out_channels = self.out_channels;
        let clock = self.clock.load(Ordering::Relaxed);
        let n_frames = data.len() / out_channels;

        for (i, frame) in data.chunks_mut(out_channels).enumerate() {
            let position = clock + i as u64;
            frame.iter_mut().for_each(|s| *s = 0.0);

            for voice in &self.voices {
                if position < voice.start_frame || position >= voice.end_frame() {
                    continue;
                }
                let base = (position - voice.start_frame) as usize * voice.channels;
                for (ch, out) in frame.iter_mut().enumerate() {
                    let src = if ch < voice.channels {
                        ch
                    } else if voice.channels == 1 && ch < 2 {
                        0
                    } else {
                        continue;
                    };
                    *out += voice.samples[base + src];
                }
            }

            let gain = self.gain;
            frame.iter_mut().for_each(|s| *s *= gain);
            self.advance_gain();
        }

        let now = clock + n_frames as u64;
        self.voices.retain(|voice| voice.end_frame() > now);
        self.clock.store(now, Ordering::Relaxed);
    }
}

/// Output device stream with a frame clock
///
/// Keeps the stream alive; drop to stop audio.
pub struct CpalOutput {
    _stream: Stream,
    commands: rtrb::Producer<OutputCommand>,
    clock: Arc<AtomicU64>,
    collector: Collector,
    format: AudioFormat,
}

impl CpalOutput {
    /// Open `device_name` (substring match) or the default output device
    pub fn open(format: AudioFormat, device_name: Option<&str>) -> AudioResult<Self> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(wanted) => find_output_device(&host, wanted)?,
            None => host
                .default_output_device()
                .ok_or_else(|| AudioError::NoDefaultDevice("no default output".to_string()))?,
        };
        let device_label = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Audio: Using output device: {}", device_label);

        let stream_config = select_output_config(&device, format)?;
        let out_channels = stream_config.channels as usize;
        log::info!(
            "Audio: Output config: {} channels, {}Hz",
            out_channels,
            stream_config.sample_rate.0
        );

        let (producer, consumer) = rtrb::RingBuffer::new(COMMAND_QUEUE_SIZE);
        let clock = Arc::new(AtomicU64::new(0));
        let mut renderer = Renderer::new(consumer, out_channels, Arc::clone(&clock));

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    renderer.render(data);
                },
                move |err| {
                    log::error!("Audio: Output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            commands: producer,
            clock,
            collector: Collector::new(),
            format,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    fn push(&mut self, command: OutputCommand) -> AudioResult<()> {
        self.commands.push(command).map_err(|_| AudioError::QueueFull)
    }

    fn seconds_to_frames(&self, secs: f64) -> u64 {
        (secs.max(0.0) * self.format.sample_rate as f64).round() as u64
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> f64 {
        self.clock.load(Ordering::Relaxed) as f64 / self.format.sample_rate as f64
    }

    fn schedule(&mut self, start: f64, buffer: AudioBuffer) -> AudioResult<()> {
        self.collector.collect();

        if buffer.format.sample_rate != self.format.sample_rate {
            return Err(AudioError::UnsupportedFormat(format!(
                "buffer at {}Hz, output at {}Hz",
                buffer.format.sample_rate, self.format.sample_rate
            )));
        }

        let start_frame = self.seconds_to_frames(start);
        let samples = Owned::new(&self.collector.handle(), buffer.samples);
        self.push(OutputCommand::Schedule {
            start_frame,
            channels: buffer.format.channels as usize,
            samples,
        })
    }

    fn ramp_gain(&mut self, target: f32, duration: Duration) {
        let frames = self.seconds_to_frames(duration.as_secs_f64());
        if self.push(OutputCommand::Ramp { target, frames }).is_err() {
            log::warn!("Audio: Command queue full, gain ramp dropped");
        }
    }

    fn clear(&mut self) {
        if self.push(OutputCommand::Clear).is_err() {
            log::warn!("Audio: Command queue full, clear dropped");
        }
        self.collector.collect();
    }
}

fn find_output_device(host: &cpal::Host, wanted: &str) -> AudioResult<cpal::Device> {
    let mut devices = host
        .output_devices()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .peekable();
    if devices.peek().is_none() {
        return Err(AudioError::NoDevices);
    }
    let wanted_lower = wanted.to_lowercase();
    devices
        .find(|d| {
            d.name()
                .map(|name| name.to_lowercase().contains(&wanted_lower))
                .unwrap_or(false)
        })
        .ok_or_else(|| AudioError::DeviceNotFound(wanted.to_string()))
}

/// Pick an f32 config at the stream's sample rate, preferring stereo
fn select_output_config(device: &cpal::Device, format: AudioFormat) -> AudioResult<StreamConfig> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| {
            (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&format.sample_rate)
        })
        .collect();

    let best = supported
        .iter()
        .find(|c| c.channels() == format.channels)
        .or_else(|| supported.iter().find(|c| c.channels() >= format.channels))
        .or_else(|| supported.first())
        .ok_or_else(|| {
            AudioError::UnsupportedFormat(format!("no f32 output at {}Hz", format.sample_rate))
        })?;

    Ok(best
        .clone()
        .with_sample_rate(cpal::SampleRate(format.sample_rate))
        .config())
}

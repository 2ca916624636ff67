/// Audio output using cpal
///
/// The stream's frame counter doubles as the audio clock: it only moves when
/// the device consumes samples, so deadlines measured against it line up with
/// what is actually heard. Between callbacks it is interpolated from the
/// instant the last buffer was handed over.
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::clock::Clock;
use crate::error::DeviceError;

const VOICE_LEVEL: f32 = 0.2;
const VOICE_DECAY_SECONDS: f32 = 0.15;
const MAX_VOICES: usize = 32;

#[derive(Debug, Default)]
struct Position {
    /// Frames rendered before the most recent buffer.
    base: u64,
    /// Length of the most recent buffer.
    buffer: u64,
    stamp: Option<Instant>,
    /// Latest time handed out; `now` never goes below it.
    reported: f64,
}

/// Playback position of a stream, in seconds.
///
/// Each callback hands over one buffer. The position runs from the start of
/// that buffer in real time and holds at its end if the next callback is late.
#[derive(Debug, Clone)]
pub struct StreamClock {
    position: Arc<Mutex<Position>>,
    sample_rate: f64,
}

impl StreamClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            position: Arc::new(Mutex::new(Position::default())),
            sample_rate: sample_rate as f64,
        }
    }

    fn position(&self) -> MutexGuard<'_, Position> {
        self.position.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Total frames rendered so far.
    pub fn frames(&self) -> u64 {
        let position = self.position();
        position.base + position.buffer
    }

    /// Called from the audio callback.
    pub fn advance(&self, frames: usize) {
        self.advance_at(frames, Instant::now());
    }

    pub fn advance_at(&self, frames: usize, at: Instant) {
        let mut position = self.position();
        position.base += position.buffer;
        position.buffer = frames as u64;
        position.stamp = Some(at);
    }

    pub fn now_at(&self, at: Instant) -> f64 {
        let mut position = self.position();
        let played = position
            .stamp
            .map(|stamp| at.saturating_duration_since(stamp).as_secs_f64() * self.sample_rate)
            .unwrap_or(0.0)
            .min(position.buffer as f64);
        let time = (position.base as f64 + played) / self.sample_rate;
        position.reported = position.reported.max(time);
        position.reported
    }
}

impl Clock for StreamClock {
    fn now(&self) -> f64 {
        self.now_at(Instant::now())
    }
}

/// A decaying sine blip.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Voice {
    frequency: f32,
    phase: f32,
    level: f32,
}

/// Mixes one frame from all voices and retires the silent ones.
fn render_frame(voices: &mut Vec<Voice>, sample_rate: f32) -> f32 {
    let decay = (-1.0 / (VOICE_DECAY_SECONDS * sample_rate)).exp();
    let mut mix = 0.0;
    for voice in voices.iter_mut() {
        mix += (voice.phase * 2.0 * std::f32::consts::PI).sin() * voice.level;
        voice.phase += voice.frequency / sample_rate;
        if voice.phase >= 1.0 {
            voice.phase -= 1.0;
        }
        voice.level *= decay;
    }
    voices.retain(|v| v.level > 1e-4);
    mix.clamp(-1.0, 1.0)
}

pub struct AudioOutput {
    _stream: cpal::Stream,
    voices: Arc<Mutex<Vec<Voice>>>,
    clock: StreamClock,
}

impl AudioOutput {
    pub fn new() -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(DeviceError::NoOutputDevice)?;
        let config = device.default_output_config()?;
        let sample_format = config.sample_format();
        if sample_format != cpal::SampleFormat::F32 {
            return Err(DeviceError::UnsupportedFormat(sample_format));
        }

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        let voices = Arc::new(Mutex::new(Vec::with_capacity(MAX_VOICES)));
        let clock = StreamClock::new(sample_rate);

        let voices_clone = Arc::clone(&voices);
        let clock_clone = clock.clone();
        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                if let Ok(mut voices) = voices_clone.lock() {
                    for frame in data.chunks_mut(channels) {
                        let sample = render_frame(&mut voices, sample_rate as f32);
                        frame.fill(sample);
                    }
                } else {
                    data.fill(0.0);
                }
                clock_clone.advance(frames);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )?;
        stream.play()?;
        info!(
            "Audio output on {} at {} Hz, {} channel(s)",
            device.name().unwrap_or_else(|_| "unknown device".into()),
            sample_rate,
            channels
        );

        Ok(Self {
            _stream: stream,
            voices,
            clock,
        })
    }

    /// Handle to the stream's sample clock.
    pub fn clock(&self) -> StreamClock {
        self.clock.clone()
    }

    pub fn trigger_note(&self, note: u8) {
        let voice = Voice {
            frequency: midi_note_to_frequency(note),
            phase: 0.0,
            level: VOICE_LEVEL,
        };
        if let Ok(mut voices) = self.voices.lock() {
            if voices.len() >= MAX_VOICES {
                voices.remove(0);
            }
            voices.push(voice);
        }
    }

    pub fn silence(&self) {
        if let Ok(mut voices) = self.voices.lock() {
            voices.clear();
        }
    }
}

pub fn midi_note_to_frequency(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

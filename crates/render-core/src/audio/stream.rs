//! CPAL output stream driving an [`OutputProcessor`]
//!
//! ```text
//! ┌──────────────────┐   process(data, channels)   ┌──────────────────────┐
//! │ CPAL audio thread│ ──────────────────────────► │ RealtimeOutputDriver │
//! │  (device clock)  │                             │ (owned by callback)  │
//! └──────────────────┘                             └──────────────────────┘
//! ```
//!
//! The processor is moved into the callback closure, so the audio thread
//! owns it outright: no mutex sits between the device and the rings.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig, SupportedStreamConfig};

use super::config::{AudioConfig, MIN_BUFFER_SIZE};
use super::device::{default_output_device, find_device_by_id};
use super::error::{AudioError, AudioResult};
use crate::output::OutputProcessor;
use crate::types::MAX_CALLBACK_FRAMES;

/// Keeps the output stream alive; drop it to close the device
pub struct OutputHandle {
    stream: Stream,
    device_name: String,
    sample_rate: u32,
    channels: u16,
    buffer_size: u32,
}

impl OutputHandle {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Negotiated buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Pause the device clock (the callback stops being invoked)
    pub fn pause(&self) -> AudioResult<()> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamPauseError(e.to_string()))
    }

    /// Resume the device clock
    pub fn play(&self) -> AudioResult<()> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))
    }
}

/// Open the configured device at `sample_rate` and start calling `processor`
///
/// The device must support `sample_rate` exactly: the rings are filled at
/// the pipeline's rate and are never resampled.
pub fn start_output<P>(config: &AudioConfig, sample_rate: u32, processor: P) -> AudioResult<OutputHandle>
where
    P: OutputProcessor + 'static,
{
    let device = match &config.device {
        Some(id) => find_device_by_id(id)?,
        None => default_output_device()?,
    };
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let supported = output_config(&device, sample_rate)?;
    let buffer_size = config
        .buffer_size
        .frames()
        .clamp(MIN_BUFFER_SIZE, MAX_CALLBACK_FRAMES as u32);

    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        config.buffer_size.latency_ms(sample_rate)
    );

    let stream = build_output_stream(&device, &stream_config, processor)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    log::info!("Audio stream started");

    Ok(OutputHandle {
        stream,
        device_name,
        sample_rate,
        channels: stream_config.channels,
        buffer_size,
    })
}

/// Pick an f32 output config that runs at `sample_rate`, preferring stereo
fn output_config(device: &cpal::Device, sample_rate: u32) -> AudioResult<SupportedStreamConfig> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .collect();

    if supported.is_empty() {
        return Err(AudioError::ConfigError(
            "No f32 output configurations".to_string(),
        ));
    }

    let in_range = |c: &&cpal::SupportedStreamConfigRange| {
        sample_rate >= c.min_sample_rate().0 && sample_rate <= c.max_sample_rate().0
    };

    let best = supported
        .iter()
        .filter(in_range)
        .find(|c| c.channels() >= 2)
        .or_else(|| supported.iter().find(in_range))
        .ok_or_else(|| AudioError::UnsupportedSampleRate {
            requested: sample_rate,
            max: supported
                .iter()
                .map(|c| c.max_sample_rate().0)
                .max()
                .unwrap_or(0),
        })?;

    Ok(best.clone().with_sample_rate(cpal::SampleRate(sample_rate)))
}

fn build_output_stream<P>(device: &cpal::Device, config: &StreamConfig, mut processor: P) -> AudioResult<Stream>
where
    P: OutputProcessor + 'static,
{
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                processor.process(data, channels);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

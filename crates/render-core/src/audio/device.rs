//! Output device discovery
//!
//! The pipeline writes f32 at one fixed sample rate and never resamples, so
//! a device is only useful if it has an f32 output config covering that
//! rate. Discovery walks every host (ALSA, JACK, PulseAudio, CoreAudio,
//! WASAPI...) so a [`DeviceId`] can pin both the device and its host.

use std::ops::RangeInclusive;

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, SampleFormat};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Label a host the way users write it in a [`DeviceId`]
fn host_label(host_id: cpal::HostId) -> String {
    match host_id.name() {
        "ALSA" | "Alsa" => "ALSA".to_string(),
        "JACK" | "Jack" => "JACK".to_string(),
        "WASAPI" | "Wasapi" => "WASAPI".to_string(),
        other => other.to_string(),
    }
}

/// Every host that initializes, with its label
fn hosts() -> impl Iterator<Item = (String, Host)> {
    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| match cpal::host_from_id(host_id) {
            Ok(host) => Some((host_label(host_id), host)),
            Err(e) => {
                log::debug!("Skipping host {:?}: {}", host_id, e);
                None
            }
        })
}

/// An output device the pipeline could drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    /// Identifier usable in [`AudioConfig`](super::AudioConfig), host included
    pub id: DeviceId,
    /// Whether this is the default device of its host
    pub is_default: bool,
    /// Sample rates the device plays as f32, one range per config
    pub rate_ranges: Vec<RangeInclusive<u32>>,
    /// Widest f32 config, in channels
    pub max_channels: u16,
}

impl AudioDevice {
    /// Whether the device can run at `rate` without resampling
    pub fn supports_sample_rate(&self, rate: u32) -> bool {
        self.rate_ranges.iter().any(|range| range.contains(&rate))
    }

    fn from_device(id: DeviceId, is_default: bool, device: &cpal::Device) -> Option<Self> {
        let configs = match device.supported_output_configs() {
            Ok(configs) => configs,
            Err(e) => {
                log::debug!("No output configs for {}: {}", id.display_label(), e);
                return None;
            }
        };

        let mut rate_ranges = Vec::new();
        let mut max_channels = 0;
        for config in configs.filter(|c| c.sample_format() == SampleFormat::F32) {
            max_channels = max_channels.max(config.channels());
            rate_ranges.push(config.min_sample_rate().0..=config.max_sample_rate().0);
        }
        if rate_ranges.is_empty() {
            return None;
        }

        Some(Self {
            id,
            is_default,
            rate_ranges,
            max_channels,
        })
    }
}

/// Output devices on every host that can play f32 at `sample_rate`
///
/// Defaults come first, then by host and name.
pub fn list_output_devices(sample_rate: u32) -> AudioResult<Vec<AudioDevice>> {
    let mut devices = Vec::new();

    for (label, host) in hosts() {
        let default_name = host.default_output_device().and_then(|d| d.name().ok());
        let outputs = match host.output_devices() {
            Ok(outputs) => outputs,
            Err(e) => {
                log::debug!("Could not enumerate {} outputs: {}", label, e);
                continue;
            }
        };

        for device in outputs {
            let Ok(name) = device.name() else {
                continue;
            };
            let is_default = default_name.as_deref() == Some(name.as_str());
            let id = DeviceId::with_host(&name, &label);
            if let Some(found) = AudioDevice::from_device(id, is_default, &device) {
                devices.push(found);
            }
        }
    }

    let total = devices.len();
    devices.retain(|device| device.supports_sample_rate(sample_rate));
    log::info!(
        "{} of {} output devices play f32 at {}Hz",
        devices.len(),
        total,
        sample_rate
    );
    if devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.id.host.cmp(&b.id.host))
            .then_with(|| a.id.name.cmp(&b.id.name))
    });
    Ok(devices)
}

/// Resolve a configured device, searching only its host when it names one
pub fn find_device_by_id(id: &DeviceId) -> AudioResult<cpal::Device> {
    let wanted_host = id.host.as_deref();
    for (label, host) in hosts() {
        if wanted_host.is_some_and(|wanted| wanted != label) {
            continue;
        }
        let Ok(mut outputs) = host.output_devices() else {
            continue;
        };
        if let Some(device) = outputs.find(|d| d.name().ok().as_deref() == Some(id.name.as_str())) {
            return Ok(device);
        }
    }
    Err(AudioError::DeviceNotFound(id.display_label()))
}

/// The default output device of the default host
pub fn default_output_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()))
}

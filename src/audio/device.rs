//! Input device enumeration and lookup

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::error::AudioError;

/// Description of an input device
#[derive(Debug, Clone, Serialize)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// List all available input devices
pub fn list_input_devices() -> Vec<InputDeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let Ok(name) = device.name() {
                let is_default = default_name.as_ref() == Some(&name);
                let (sample_rates, channels) = get_device_capabilities(&device);

                devices.push(InputDeviceInfo {
                    name,
                    is_default,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    devices
}

/// Get supported sample rates and channel counts for a device
fn get_device_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    if let Ok(configs) = device.supported_input_configs() {
        for config in configs {
            for rate in [8_000, 16_000, 22_050, 44_100, 48_000] {
                if rate >= config.min_sample_rate().0
                    && rate <= config.max_sample_rate().0
                    && !sample_rates.contains(&rate)
                {
                    sample_rates.push(rate);
                }
            }
            if !channels.contains(&config.channels()) {
                channels.push(config.channels());
            }
        }
    }

    sample_rates.sort_unstable();
    channels.sort_unstable();
    (sample_rates, channels)
}

/// Find an input device by name, or the default input device
pub fn find_input_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    match name {
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("no default input device".to_string())),
        Some(wanted) => host
            .input_devices()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound(wanted.to_string())),
    }
}

/// Pick a stream config for `sample_rate`.
///
/// Prefers a supported range containing the rate with the fewest channels;
/// falls back to the device default otherwise.
pub fn select_input_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<cpal::SupportedStreamConfig, AudioError> {
    let rate = cpal::SampleRate(sample_rate);

    let exact = device
        .supported_input_configs()
        .map_err(|e| AudioError::UnsupportedFormat(e.to_string()))?
        .filter(|c| c.min_sample_rate() <= rate && rate <= c.max_sample_rate())
        .min_by_key(|c| c.channels());

    match exact {
        Some(range) => Ok(range.with_sample_rate(rate)),
        None => device
            .default_input_config()
            .map_err(|e| AudioError::UnsupportedFormat(e.to_string())),
    }
}

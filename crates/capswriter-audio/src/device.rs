use capswriter_foundation::AudioError;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, HostId};

/// Windows exposes an abstract "Sound Mapper" input device that does not
/// point at a physical one; we special-case around it in `open`.
const WINDOWS_SOUND_MAPPER: &str = "Microsoft Sound Mapper - Input";

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub max_input_channels: u16,
}

/// `"{hostapi_name}|{device_name}"`, excluding any device index so transient
/// renumbering by the OS is not observed as a device change.
pub fn device_signature(host_id: HostId, device_name: &str) -> String {
    format!("{}|{}", host_id.name(), device_name)
}

pub struct DeviceManager {
    host: Host,
    current_device: Option<Device>,
    current_signature: Option<String>,
}

impl DeviceManager {
    pub fn new() -> Result<Self, AudioError> {
        Ok(Self {
            host: cpal::default_host(),
            current_device: None,
            current_signature: None,
        })
    }

    pub fn host_id(&self) -> HostId {
        self.host.id()
    }

    pub fn enumerate_devices(&self) -> Vec<DeviceInfo> {
        let mut devices = Vec::new();
        let Ok(inputs) = self.host.input_devices() else {
            return devices;
        };
        let default_name = self.default_input_device_name();

        for device in inputs {
            let Ok(name) = device.name() else { continue };
            let max_input_channels = device
                .supported_input_configs()
                .ok()
                .and_then(|mut cfgs| cfgs.next())
                .map(|c| c.channels())
                .unwrap_or(0);
            let is_default = default_name.as_deref() == Some(name.as_str());
            devices.push(DeviceInfo {
                name,
                is_default,
                max_input_channels,
            });
        }
        devices
    }

    pub fn default_input_device_name(&self) -> Option<String> {
        self.host.default_input_device().and_then(|d| d.name().ok())
    }

    pub fn current_signature(&self) -> Option<&str> {
        self.current_signature.as_deref()
    }

    /// Device selection, in priority order: a previously preferred device
    /// signature, then the OS default input, then the first device exposing
    /// at least one input channel. On Windows, a default that resolves to
    /// the Sound Mapper abstraction is bypassed in favor of WASAPI's actual
    /// default; if selection still lands on Sound Mapper, fall through to a
    /// null device index so the host resolves the physical default itself.
    pub fn open(&mut self, preferred_signature: Option<&str>) -> Result<Device, AudioError> {
        if let Some(sig) = preferred_signature {
            if let Some(device) = self.find_by_signature(sig) {
                return self.select(device);
            }
        }

        if let Some(device) = self.open_default_input()? {
            return self.select(device);
        }

        if let Some(device) = self
            .host
            .input_devices()
            .ok()
            .and_then(|mut devs| devs.find(|d| has_input_channels(d)))
        {
            return self.select(device);
        }

        Err(AudioError::DeviceNotFound {
            name: preferred_signature.map(str::to_string),
        })
    }

    #[cfg(windows)]
    fn open_default_input(&self) -> Result<Option<Device>, AudioError> {
        let default = self.host.default_input_device();
        let name = default.as_ref().and_then(|d| d.name().ok());

        if name.as_deref() != Some(WINDOWS_SOUND_MAPPER) {
            return Ok(default);
        }

        // Sound Mapper resolved: look for a host-default WASAPI device
        // instead of the abstract mapper entry.
        if let Some(device) = self.host.input_devices().ok().and_then(|mut devs| {
            devs.find(|d| {
                d.name()
                    .map(|n| n != WINDOWS_SOUND_MAPPER)
                    .unwrap_or(false)
            })
        }) {
            return Ok(Some(device));
        }

        // Still only the Sound Mapper available: let cpal resolve whatever
        // the host considers the physical default rather than opening the
        // abstract device directly.
        Ok(default)
    }

    #[cfg(not(windows))]
    fn open_default_input(&self) -> Result<Option<Device>, AudioError> {
        Ok(self.host.default_input_device())
    }

    fn find_by_signature(&self, signature: &str) -> Option<Device> {
        self.host.input_devices().ok()?.find(|d| {
            d.name()
                .map(|n| device_signature(self.host.id(), &n) == signature)
                .unwrap_or(false)
        })
    }

    fn select(&mut self, device: Device) -> Result<Device, AudioError> {
        let name = device
            .name()
            .map_err(|_| AudioError::DeviceNotFound { name: None })?;
        self.current_signature = Some(device_signature(self.host.id(), &name));
        self.current_device = Some(device.clone());
        Ok(device)
    }
}

fn has_input_channels(device: &Device) -> bool {
    device
        .supported_input_configs()
        .map(|mut cfgs| cfgs.next().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_excludes_index() {
        let host = cpal::default_host();
        let sig = device_signature(host.id(), "USB Microphone");
        assert!(sig.ends_with("|USB Microphone"));
        assert!(!sig.contains("::"));
    }
}

pub mod capture;
pub mod detector;
pub mod device;
pub mod resampler;
#[cfg(unix)]
pub mod stderr_suppressor;
pub mod watchdog;

pub use capture::{AudioCapture, CaptureHandle, CaptureStats, DeviceConfig};
pub use detector::VoiceActivityState;
pub use device::{device_signature, DeviceInfo, DeviceManager};
pub use resampler::Resampler;
pub use watchdog::WatchdogTimer;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use capswriter_foundation::AudioError;
use capswriter_protocol::AudioBlock;
use crossbeam_channel::Sender;

use crate::detector::VoiceActivityState;
use crate::device::{device_signature, DeviceManager};
use crate::watchdog::WatchdogTimer;

pub const BLOCK_MS: u64 = 50;
pub const CAPTURE_SAMPLE_RATE: u32 = 48_000;

/// Negotiated stream parameters, reported once a device opens successfully.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub device_signature: String,
}

#[derive(Debug, Default)]
pub struct CaptureStats {
    pub blocks_captured: AtomicU64,
    pub blocks_dropped: AtomicU64,
    pub reopen_count: AtomicU64,
}

/// C1 AudioCapture. Owns the cpal stream and the device-monitor worker;
/// delivers 50ms blocks to SessionFramer over a bounded channel.
pub struct AudioCapture {
    device_manager: DeviceManager,
    stream: Option<Stream>,
    block_tx: Sender<AudioBlock>,
    watchdog: WatchdogTimer,
    vad: VoiceActivityState,
    stats: Arc<CaptureStats>,
    running: Arc<AtomicBool>,
    last_voice_activity_ns: Arc<AtomicU64>,
    device_poll_interval: Duration,
}

impl AudioCapture {
    pub fn new(
        block_tx: Sender<AudioBlock>,
        vad_threshold: f32,
        device_poll_interval: Duration,
        running: Arc<AtomicBool>,
    ) -> Result<Self, AudioError> {
        Ok(Self {
            device_manager: DeviceManager::new()?,
            stream: None,
            block_tx,
            watchdog: WatchdogTimer::new(Duration::from_secs(5)),
            vad: VoiceActivityState::new(vad_threshold),
            stats: Arc::new(CaptureStats::default()),
            running,
            last_voice_activity_ns: Arc::new(AtomicU64::new(0)),
            device_poll_interval,
        })
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        self.stats.clone()
    }

    pub fn last_voice_activity_ns(&self) -> Arc<AtomicU64> {
        self.last_voice_activity_ns.clone()
    }

    /// Opens the preferred device signature if still present, otherwise
    /// falls through `DeviceManager::open`'s priority chain. A missing
    /// device here is fatal; callers decide whether first-open fatality
    /// should abort the process (§4.1).
    pub fn open(&mut self, preferred_signature: Option<&str>) -> Result<DeviceConfig, AudioError> {
        self.running.store(true, Ordering::SeqCst);

        let device = self.device_manager.open(preferred_signature)?;
        let signature = self
            .device_manager
            .current_signature()
            .expect("signature set by DeviceManager::open on success")
            .to_string();
        tracing::info!(signature = %signature, "opened input device");

        let (config, sample_format) = negotiate_config(&device)?;
        let device_config = DeviceConfig {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
            device_signature: signature,
        };

        let stream = self.build_stream(&device, config, sample_format, device_config.channels)?;
        stream.play().map_err(AudioError::PlayStream)?;
        self.stream = Some(stream);
        self.watchdog.start(Arc::clone(&self.running));

        Ok(device_config)
    }

    /// Closes the stream first so the watchdog's finished-callback cannot
    /// misread the deliberate close as a fault and self-restart (§4.1).
    pub fn reopen(&mut self, preferred_signature: Option<&str>) -> Result<DeviceConfig, AudioError> {
        self.close();
        self.stats.reopen_count.fetch_add(1, Ordering::Relaxed);
        self.open(preferred_signature)
    }

    pub fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.watchdog.stop();
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
    }

    fn build_stream(
        &mut self,
        device: &cpal::Device,
        config: StreamConfig,
        sample_format: SampleFormat,
        channels: u16,
    ) -> Result<Stream, AudioError> {
        let block_tx = self.block_tx.clone();
        let stats = Arc::clone(&self.stats);
        let watchdog = self.watchdog.clone();
        let vad = self.vad;
        let last_voice_activity_ns = Arc::clone(&self.last_voice_activity_ns);
        let running = Arc::clone(&self.running);

        let err_fn = move |err: cpal::StreamError| {
            tracing::error!("audio stream error: {err}");
        };

        // Only this closure runs on the driver thread; it must stay
        // allocation-light: record RMS, push a copy of the block, and stamp
        // last-voice-activity when the block clears the VAD threshold.
        let emit = move |samples: Vec<f32>| {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            watchdog.feed();

            if vad.is_active(&samples) {
                last_voice_activity_ns.store(now_ns(), Ordering::Relaxed);
            }

            let block = AudioBlock::new(now_ns(), samples, channels);
            match block_tx.try_send(block) {
                Ok(()) => {
                    stats.blocks_captured.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    stats.blocks_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        };

        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &_| emit(data.to_vec()),
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &_| {
                    emit(data.iter().map(|&s| s as f32 / 32768.0).collect())
                },
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _: &_| {
                    emit(
                        data.iter()
                            .map(|&s| (s as f32 - 32768.0) / 32768.0)
                            .collect(),
                    )
                },
                err_fn,
                None,
            )?,
            other => {
                return Err(AudioError::FormatNotSupported {
                    format: format!("{other:?}"),
                });
            }
        };

        Ok(stream)
    }
}

fn negotiate_config(device: &cpal::Device) -> Result<(StreamConfig, SampleFormat), AudioError> {
    if let Ok(default_config) = device.default_input_config() {
        return Ok((
            StreamConfig {
                channels: default_config.channels(),
                sample_rate: default_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            },
            default_config.sample_format(),
        ));
    }

    if let Ok(mut configs) = device.supported_input_configs() {
        if let Some(config) = configs.next() {
            return Ok((config.with_max_sample_rate().into(), config.sample_format()));
        }
    }

    Err(AudioError::FormatNotSupported {
        format: "no supported input configuration".into(),
    })
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Owns the capture thread plus the device-monitor task; reopens on
/// disconnection per §4.1's poll-and-reopen contract.
pub struct CaptureHandle {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

impl CaptureHandle {
    pub fn spawn(
        block_tx: Sender<AudioBlock>,
        vad_threshold: f32,
        device_poll_interval: Duration,
        preferred_device: Option<String>,
    ) -> Result<(Self, DeviceConfig), AudioError> {
        let running = Arc::new(AtomicBool::new(false));
        let shutdown = running.clone();
        let opened_config: Arc<Mutex<Option<DeviceConfig>>> = Arc::new(Mutex::new(None));
        let opened_config_clone = opened_config.clone();

        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let mut capture = match AudioCapture::new(
                    block_tx,
                    0.02,
                    device_poll_interval,
                    running.clone(),
                ) {
                    Ok(c) => c,
                    Err(err) => {
                        tracing::error!("failed to construct AudioCapture: {err}");
                        return;
                    }
                };

                let cfg = match capture.open(preferred_device.as_deref()) {
                    Ok(cfg) => cfg,
                    Err(err) => {
                        tracing::error!("fatal: no input device available on first open: {err}");
                        return;
                    }
                };
                *opened_config_clone.lock().unwrap() = Some(cfg.clone());

                let mut active_signature = cfg.device_signature.clone();
                let mut last_poll = Instant::now();

                while running.load(Ordering::Relaxed) {
                    if last_poll.elapsed() >= device_poll_interval {
                        last_poll = Instant::now();
                        let still_present = capture
                            .device_manager
                            .enumerate_devices()
                            .into_iter()
                            .any(|d| {
                                device_signature(capture.device_manager.host_id(), &d.name)
                                    == active_signature
                            });

                        if !still_present {
                            tracing::warn!(signature = %active_signature, "active device disappeared, reopening");
                            match capture.reopen(None) {
                                Ok(new_cfg) => {
                                    if new_cfg.device_signature == active_signature {
                                        tracing::info!("reopen resolved to the same signature, nothing to do");
                                    }
                                    active_signature = new_cfg.device_signature.clone();
                                    *opened_config_clone.lock().unwrap() = Some(new_cfg);
                                }
                                Err(err) => {
                                    tracing::error!("reopen after device loss failed: {err}");
                                }
                            }
                        }
                    }

                    thread::sleep(Duration::from_millis(50));
                }

                capture.close();
            })
            .map_err(|err| AudioError::Fatal(format!("failed to spawn capture thread: {err}")))?;

        let start = Instant::now();
        let cfg = loop {
            if let Some(cfg) = opened_config.lock().unwrap().clone() {
                break Some(cfg);
            }
            if start.elapsed() > Duration::from_secs(5) {
                break None;
            }
            thread::sleep(Duration::from_millis(50));
        };

        let cfg = cfg.ok_or_else(|| {
            AudioError::Fatal("timed out waiting for device to open".into())
        })?;

        Ok((Self { handle, shutdown }, cfg))
    }

    pub fn stop(self) {
        self.shutdown.store(false, Ordering::Relaxed);
        let _ = self.handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_ms_and_sample_rate_match_the_contract() {
        assert_eq!(BLOCK_MS, 50);
        assert_eq!(CAPTURE_SAMPLE_RATE, 48_000);
    }
}

use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::rate::FpsTracker;

/// Cross-thread client-side metrics: audio level, capture/framer throughput,
/// and commit activity. Grounded on the teacher's `PipelineMetrics`, trimmed
/// to the fields this system's client pipeline (C1/C3/C5) actually produces
/// — the STT-plugin and VAD-model fields had no counterpart here.
#[derive(Clone)]
pub struct ClientMetrics {
    pub current_peak: Arc<AtomicI16>,
    pub current_rms_x1000: Arc<AtomicU64>,

    pub capture_fps_x10: Arc<AtomicU64>,
    pub framer_fps_x10: Arc<AtomicU64>,
    capture_fps_tracker: Arc<Mutex<FpsTracker>>,
    framer_fps_tracker: Arc<Mutex<FpsTracker>>,

    pub capture_blocks_total: Arc<AtomicU64>,
    pub frames_sent_total: Arc<AtomicU64>,
    pub frames_final_total: Arc<AtomicU64>,

    pub is_recording: Arc<AtomicBool>,
    pub device_reopen_total: Arc<AtomicU64>,

    pub partials_received_total: Arc<AtomicU64>,
    pub partials_regressed_total: Arc<AtomicU64>,
    pub chars_committed_total: Arc<AtomicU64>,
}

impl Default for ClientMetrics {
    fn default() -> Self {
        Self {
            current_peak: Arc::new(AtomicI16::new(0)),
            current_rms_x1000: Arc::new(AtomicU64::new(0)),
            capture_fps_x10: Arc::new(AtomicU64::new(0)),
            framer_fps_x10: Arc::new(AtomicU64::new(0)),
            capture_fps_tracker: Arc::new(Mutex::new(FpsTracker::new())),
            framer_fps_tracker: Arc::new(Mutex::new(FpsTracker::new())),
            capture_blocks_total: Arc::new(AtomicU64::new(0)),
            frames_sent_total: Arc::new(AtomicU64::new(0)),
            frames_final_total: Arc::new(AtomicU64::new(0)),
            is_recording: Arc::new(AtomicBool::new(false)),
            device_reopen_total: Arc::new(AtomicU64::new(0)),
            partials_received_total: Arc::new(AtomicU64::new(0)),
            partials_regressed_total: Arc::new(AtomicU64::new(0)),
            chars_committed_total: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl ClientMetrics {
    /// Updates peak/RMS from one audio block's i16 samples, matching the
    /// teacher's `update_audio_level`.
    pub fn update_audio_level(&self, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }
        let peak = samples.iter().map(|&s| s.abs()).max().unwrap_or(0);
        self.current_peak.store(peak, Ordering::Relaxed);

        let sum: i64 = samples.iter().map(|&s| s as i64 * s as i64).sum();
        let rms = ((sum as f64 / samples.len() as f64).sqrt() * 1000.0) as u64;
        self.current_rms_x1000.store(rms, Ordering::Relaxed);
    }

    pub fn record_capture_block(&self) {
        self.capture_blocks_total.fetch_add(1, Ordering::Relaxed);
        if let Some(fps) = self.capture_fps_tracker.lock().unwrap().tick() {
            self.capture_fps_x10.store((fps * 10.0) as u64, Ordering::Relaxed);
        }
    }

    pub fn record_frame_sent(&self, is_final: bool) {
        self.frames_sent_total.fetch_add(1, Ordering::Relaxed);
        if is_final {
            self.frames_final_total.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(fps) = self.framer_fps_tracker.lock().unwrap().tick() {
            self.framer_fps_x10.store((fps * 10.0) as u64, Ordering::Relaxed);
        }
    }

    pub fn record_partial(&self, regressed: bool) {
        self.partials_received_total.fetch_add(1, Ordering::Relaxed);
        if regressed {
            self.partials_regressed_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_commit(&self, chars: usize) {
        self.chars_committed_total
            .fetch_add(chars as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_and_framer_fps_stay_zero_until_a_second_has_elapsed() {
        let metrics = ClientMetrics::default();
        metrics.record_capture_block();
        metrics.record_frame_sent(false);
        assert_eq!(metrics.capture_fps_x10.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.framer_fps_x10.load(Ordering::Relaxed), 0);
    }
}

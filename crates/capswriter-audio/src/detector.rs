/// Root-mean-square level of a float32 block, normalized to roughly [0, 1]
/// for typical PCM content. Used both to gate the release-tail timer and to
/// drive the client's audio-level telemetry.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Lightweight voice-activity state the capture callback updates inline:
/// whether the most recent block's RMS cleared `vad_threshold`.
#[derive(Debug, Clone, Copy)]
pub struct VoiceActivityState {
    pub vad_threshold: f32,
}

impl VoiceActivityState {
    pub fn new(vad_threshold: f32) -> Self {
        Self { vad_threshold }
    }

    pub fn is_active(&self, samples: &[f32]) -> bool {
        rms(samples) >= self.vad_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_below_threshold() {
        let state = VoiceActivityState::new(0.02);
        assert!(!state.is_active(&[0.0; 800]));
    }

    #[test]
    fn loud_tone_clears_threshold() {
        let state = VoiceActivityState::new(0.02);
        let samples: Vec<f32> = (0..800).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        assert!(state.is_active(&samples));
    }

    #[test]
    fn rms_of_empty_slice_is_zero() {
        assert_eq!(rms(&[]), 0.0);
    }
}

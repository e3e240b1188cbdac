//! SessionFramer (C3): turns 50ms 48kHz `AudioBlock`s into 16kHz mono
//! `Frame`s on the sliding seg_duration/seg_overlap window described in
//! the wire protocol. Carries no knowledge of the wire transport itself —
//! the WSClient owns sending the frames this produces.

use std::time::{SystemTime, UNIX_EPOCH};

use capswriter_audio::Resampler;
use capswriter_protocol::{AudioBlock, Frame, FrameHeader, Source};

const SR_OUT: f32 = 16_000.0;

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub struct SessionFramer {
    resampler: Resampler,
    buffer: Vec<f32>,
    task_id: Option<String>,
    time_start: f64,
    seg_duration: f32,
    seg_overlap: f32,
    source: Source,
}

impl SessionFramer {
    pub fn new(in_rate: u32, seg_duration: f32, seg_overlap: f32, source: Source) -> Self {
        Self {
            resampler: Resampler::new(in_rate, SR_OUT as u32),
            buffer: Vec::new(),
            task_id: None,
            time_start: 0.0,
            seg_duration,
            seg_overlap,
            source,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task_id.is_some()
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    /// Starts a new session, returning its freshly allocated `task_id`.
    pub fn begin(&mut self) -> String {
        self.resampler.reset();
        self.buffer.clear();
        self.time_start = now_secs();
        let task_id = format!("{:x}", rand::random::<u128>());
        self.task_id = Some(task_id.clone());
        task_id
    }

    /// Folds one captured block into the rolling buffer, returning zero or
    /// more non-final frames ready to send. No-op (empty) if no session is
    /// active (`begin` not yet called, or already `finish`ed/`cancel`ed).
    pub fn push_block(&mut self, block: &AudioBlock) -> Vec<Frame> {
        if self.task_id.is_none() {
            return Vec::new();
        }
        let mono = block.downmix_mono();
        let resampled = self.resampler.process(&mono);
        self.buffer.extend_from_slice(&resampled);

        let window_samples = ((self.seg_duration + 2.0 * self.seg_overlap) * SR_OUT) as usize;
        let emit_samples = ((self.seg_duration + self.seg_overlap) * SR_OUT) as usize;
        let advance_samples = (self.seg_duration * SR_OUT) as usize;

        let mut frames = Vec::new();
        while self.buffer.len() >= window_samples {
            let payload = self.buffer[..emit_samples.min(self.buffer.len())].to_vec();
            frames.push(self.make_frame(payload, false));
            let advance = advance_samples.min(self.buffer.len());
            self.buffer.drain(..advance);
        }
        frames
    }

    /// Emits the terminal frame carrying whatever remains in the buffer and
    /// releases the session. Returns `None` if no session is active.
    pub fn finish(&mut self) -> Option<Frame> {
        let task_id = self.task_id.take()?;
        let payload = std::mem::take(&mut self.buffer);
        Some(self.make_frame_for(task_id, payload, true))
    }

    /// Drops the buffer and releases the session without emitting anything.
    pub fn cancel(&mut self) {
        self.buffer.clear();
        self.task_id = None;
    }

    fn make_frame(&self, payload: Vec<f32>, is_final: bool) -> Frame {
        let task_id = self.task_id.clone().expect("push_block checked task_id is Some");
        self.make_frame_for(task_id, payload, is_final)
    }

    fn make_frame_for(&self, task_id: String, payload: Vec<f32>, is_final: bool) -> Frame {
        Frame {
            header: FrameHeader {
                task_id,
                seg_duration: self.seg_duration,
                seg_overlap: self.seg_overlap,
                is_final,
                time_start: self.time_start,
                time_submit: now_secs(),
                source: self.source,
                context: None,
            },
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(samples: usize) -> AudioBlock {
        AudioBlock::new(0, vec![0.0; samples], 1)
    }

    #[test]
    fn no_frames_emitted_below_the_window_threshold() {
        let mut framer = SessionFramer::new(16_000, 6.0, 1.0, Source::Mic);
        framer.begin();
        // window is (6 + 2*1) * 16000 = 128_000 samples; well under that.
        let frames = framer.push_block(&block(8_000));
        assert!(frames.is_empty());
    }

    #[test]
    fn finish_with_no_active_session_returns_none() {
        let mut framer = SessionFramer::new(16_000, 6.0, 1.0, Source::Mic);
        assert!(framer.finish().is_none());
    }

    #[test]
    fn finish_emits_final_frame_with_remaining_buffer_and_clears_session() {
        let mut framer = SessionFramer::new(16_000, 6.0, 1.0, Source::Mic);
        framer.begin();
        framer.push_block(&block(4_000));
        let frame = framer.finish().expect("active session");
        assert!(frame.header.is_final);
        assert_eq!(frame.payload.len(), 4_000);
        assert!(!framer.is_active());
    }

    #[test]
    fn cancel_drops_the_buffer_and_emits_nothing_on_finish() {
        let mut framer = SessionFramer::new(16_000, 6.0, 1.0, Source::Mic);
        framer.begin();
        framer.push_block(&block(4_000));
        framer.cancel();
        assert!(!framer.is_active());
        assert!(framer.finish().is_none());
    }

    #[test]
    fn emits_non_final_frame_once_the_window_fills_and_advances_by_seg_duration() {
        let mut framer = SessionFramer::new(16_000, 6.0, 1.0, Source::Mic);
        framer.begin();
        // 6 + 2*1 = 8s window at 16kHz = 128_000 samples.
        let frames = framer.push_block(&block(130_000));
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].header.is_final);
        // (6 + 1) * 16000 = 112_000 samples.
        assert_eq!(frames[0].payload.len(), 112_000);
        // advanced by 6 * 16000 = 96_000, leaving 130_000 - 96_000 = 34_000.
        assert_eq!(framer.buffer.len(), 34_000);
    }
}

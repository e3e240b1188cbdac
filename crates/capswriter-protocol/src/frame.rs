use serde::{Deserialize, Serialize};

/// One 50 ms block out of AudioCapture (C1). Ephemeral: dropped once
/// SessionFramer (C3) has folded it into the rolling buffer.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    pub timestamp_ns: u64,
    pub samples: Vec<f32>,
    pub channels: u16,
}

impl AudioBlock {
    pub fn new(timestamp_ns: u64, samples: Vec<f32>, channels: u16) -> Self {
        Self {
            timestamp_ns,
            samples,
            channels,
        }
    }

    /// Downmixes interleaved multi-channel samples to mono by averaging
    /// channels, matching the "always mono-downmixed before framing" rule.
    pub fn downmix_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }
        let ch = self.channels as usize;
        self.samples
            .chunks(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    }
}

/// Where a Frame's audio originated. Carried through to the server so the
/// queue can synthesize an HTTP `socket_id` distinct from live mic sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Mic,
    File,
}

/// Wire header for one Frame, sent as a JSON text message immediately
/// followed by a binary message carrying the PCM payload (or, in the
/// length-prefixed encoding, concatenated into one binary frame whose first
/// four bytes are a big-endian header length).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameHeader {
    pub task_id: String,
    pub seg_duration: f32,
    pub seg_overlap: f32,
    pub is_final: bool,
    pub time_start: f64,
    pub time_submit: f64,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// A decoded Frame: header plus its float32 PCM payload (16 kHz mono).
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<f32>,
}

impl Frame {
    pub fn expected_sample_count(&self) -> usize {
        let seconds = if self.header.is_final {
            self.header.seg_duration
        } else {
            self.header.seg_duration + self.header.seg_overlap
        };
        (seconds * 16_000.0).round() as usize
    }

    /// Serializes the header to the JSON text message; the payload is sent
    /// as a companion binary message by the caller.
    pub fn header_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.header)
    }

    /// Packs PCM samples little-endian, the wire's on-disk representation.
    pub fn payload_bytes(samples: &[f32]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(samples.len() * 4);
        for &s in samples {
            buf.extend_from_slice(&s.to_le_bytes());
        }
        buf
    }

    pub fn decode_payload(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trips_through_bytes() {
        let samples = vec![0.0_f32, 0.5, -0.5, 1.0, -1.0];
        let bytes = Frame::payload_bytes(&samples);
        let decoded = Frame::decode_payload(&bytes);
        assert_eq!(samples, decoded);
    }

    #[test]
    fn stereo_block_downmixes_to_mono_average() {
        let block = AudioBlock::new(0, vec![1.0, -1.0, 0.5, 0.5], 2);
        assert_eq!(block.downmix_mono(), vec![0.0, 0.5]);
    }

    #[test]
    fn non_final_expects_segment_plus_overlap_samples() {
        let frame = Frame {
            header: FrameHeader {
                task_id: "t".into(),
                seg_duration: 6.0,
                seg_overlap: 1.0,
                is_final: false,
                time_start: 0.0,
                time_submit: 0.0,
                source: Source::Mic,
                context: None,
            },
            payload: Vec::new(),
        };
        assert_eq!(frame.expected_sample_count(), 7 * 16_000);
    }
}

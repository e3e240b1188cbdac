use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

#[derive(Debug, Clone, Copy)]
pub enum ResamplerQuality {
    Fast,
    Balanced,
    Quality,
}

/// Streaming mono float32 resampler wrapping Rubato's sinc interpolator.
/// SessionFramer calls this once per captured block; internal buffering
/// absorbs the mismatch between cpal's block size and Rubato's fixed chunk
/// requirement so callers never have to reason about it. The contract from
/// §4.3 — output length = round(input_len * out_rate / in_rate) ± 1 — holds
/// once buffered output has drained, not necessarily on the very first call.
pub struct Resampler {
    in_rate: u32,
    out_rate: u32,
    resampler: SincFixedIn<f32>,
    input_buffer: Vec<f32>,
    output_buffer: Vec<f32>,
    chunk_size: usize,
}

impl Resampler {
    pub fn new(in_rate: u32, out_rate: u32) -> Self {
        Self::with_quality(in_rate, out_rate, ResamplerQuality::Balanced)
    }

    pub fn with_quality(in_rate: u32, out_rate: u32, quality: ResamplerQuality) -> Self {
        let chunk_size = 512;

        let sinc_params = match quality {
            ResamplerQuality::Fast => SincInterpolationParameters {
                sinc_len: 32,
                f_cutoff: 0.92,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 64,
                window: WindowFunction::Blackman,
            },
            ResamplerQuality::Balanced => SincInterpolationParameters {
                sinc_len: 64,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 128,
                window: WindowFunction::Blackman2,
            },
            ResamplerQuality::Quality => SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.97,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            },
        };

        let resampler = SincFixedIn::<f32>::new(
            out_rate as f64 / in_rate as f64,
            2.0,
            sinc_params,
            chunk_size,
            1,
        )
        .expect("valid rubato resampler parameters");

        Self {
            in_rate,
            out_rate,
            resampler,
            input_buffer: Vec::with_capacity(chunk_size * 2),
            output_buffer: Vec::new(),
            chunk_size,
        }
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.in_rate == self.out_rate {
            return input.to_vec();
        }

        self.input_buffer.extend_from_slice(input);

        while self.input_buffer.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.input_buffer.drain(..self.chunk_size).collect();
            match self.resampler.process(&[chunk], None) {
                Ok(frames) => {
                    if let Some(channel) = frames.first() {
                        self.output_buffer.extend_from_slice(channel);
                    }
                }
                Err(err) => {
                    tracing::error!("resampler error: {err}");
                    return Vec::new();
                }
            }
        }

        std::mem::take(&mut self.output_buffer)
    }

    pub fn reset(&mut self) {
        self.input_buffer.clear();
        self.output_buffer.clear();
        self.resampler.reset();
    }

    pub fn input_rate(&self) -> u32 {
        self.in_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.out_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_rates_match() {
        let mut rs = Resampler::new(16_000, 16_000);
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(rs.process(&input), input);
    }

    #[test]
    fn downsamples_48k_to_16k_by_roughly_a_third() {
        let mut rs = Resampler::new(48_000, 16_000);
        let input: Vec<f32> = (0..4_800).map(|i| ((i % 100) as f32 / 100.0) - 0.5).collect();
        let mut out = rs.process(&input);
        out.extend(rs.process(&input));
        assert!(!out.is_empty());
        assert!(out.len() < input.len());
    }
}

use capswriter_audio::detector::{rms, VoiceActivityState};
use capswriter_audio::resampler::Resampler;
use capswriter_protocol::frame::AudioBlock;

#[test]
fn stereo_block_downmixes_to_mono() {
    let block = AudioBlock::new(0, vec![1.0, -1.0, 0.5, -0.5], 2);
    assert_eq!(block.downmix_mono(), vec![0.0, 0.0]);
}

#[test]
fn vad_state_distinguishes_silence_from_speech() {
    let vad = VoiceActivityState::new(0.02);
    let silence = vec![0.0_f32; 2_400];
    let speech: Vec<f32> = (0..2_400)
        .map(|i| if i % 2 == 0 { 0.3 } else { -0.3 })
        .collect();
    assert!(!vad.is_active(&silence));
    assert!(vad.is_active(&speech));
    assert!(rms(&speech) > rms(&silence));
}

#[test]
fn resampler_shrinks_48k_to_16k_by_roughly_a_third() {
    let mut resampler = Resampler::new(48_000, 16_000);
    let one_block: Vec<f32> = (0..2_400).map(|i| ((i % 50) as f32 / 50.0) - 0.5).collect();
    let mut total_out = 0usize;
    for _ in 0..20 {
        total_out += resampler.process(&one_block).len();
    }
    let total_in = one_block.len() * 20;
    let ratio = total_out as f32 / total_in as f32;
    assert!((ratio - 1.0 / 3.0).abs() < 0.05, "ratio was {ratio}");
}

//! Run a test tone through every voice preset and report what comes out
//!
//! Run with: cargo run --example voice_changer -- [frequency-hz] [seconds]
//! Example: cargo run --example voice_changer -- 220 2

use screenlive_bridge::{SoundTouch, VoicePreset};
use std::f32::consts::PI;

const SAMPLE_RATE: u32 = 44100;
const CHANNELS: usize = 2;
/// 20 ms blocks, like a capture callback.
const BLOCK_FRAMES: usize = 882;

fn tone(frequency: f32, seconds: f32) -> Vec<u8> {
    let frames = (SAMPLE_RATE as f32 * seconds) as usize;
    let mut pcm = Vec::with_capacity(frames * CHANNELS * 2);
    for i in 0..frames {
        let t = i as f32 / SAMPLE_RATE as f32;
        let sample = ((2.0 * PI * frequency * t).sin() * 12000.0) as i16;
        for _ in 0..CHANNELS {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
    }
    pcm
}

/// Estimate the fundamental of the left channel from zero crossings.
fn estimate_frequency(pcm: &[u8]) -> f32 {
    let left: Vec<i16> = pcm
        .chunks_exact(2 * CHANNELS)
        .map(|f| i16::from_le_bytes([f[0], f[1]]))
        .collect();
    if left.len() < 2 {
        return 0.0;
    }
    let crossings = left.windows(2).filter(|w| (w[0] < 0) != (w[1] < 0)).count();
    crossings as f32 / 2.0 / (left.len() as f32 / SAMPLE_RATE as f32)
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let frequency: f32 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(220.0);
    let seconds: f32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(2.0);

    let input = tone(frequency, seconds);
    println!(
        "Input: {:.0} Hz, {} frames, SoundTouch {}",
        frequency,
        input.len() / (2 * CHANNELS),
        SoundTouch::version()
    );

    for preset in VoicePreset::ALL {
        let st = SoundTouch::new();
        st.set_audio_format(SAMPLE_RATE, CHANNELS);
        st.set_voice_preset(preset);

        let mut output = Vec::new();
        let mut target = vec![0u8; 16 * BLOCK_FRAMES * CHANNELS * 2];
        for block in input.chunks(BLOCK_FRAMES * CHANNELS * 2) {
            let n = st.process(block, block.len(), &mut target) as usize;
            output.extend_from_slice(&target[..n]);
        }
        let mut n = st.flush(&mut target) as usize;
        while n > 0 {
            output.extend_from_slice(&target[..n]);
            n = st.receive(&mut target) as usize;
        }

        println!(
            "{:>6}: pitch {:.3} rate {:.2} -> {} frames, ~{:.0} Hz",
            preset.name(),
            st.pitch(),
            st.rate(),
            output.len() / (2 * CHANNELS),
            estimate_frequency(&output)
        );
    }
}

//! Signed 16-bit little-endian PCM conversions.

use screenlive_resampler::dither_to_i16;

/// Bytes per sample.
pub const SAMPLE_BYTES: usize = 2;

/// Decode whole samples from `bytes`, appending normalized floats.
pub fn decode_i16le(bytes: &[u8], out: &mut Vec<f32>) {
    out.reserve(bytes.len() / SAMPLE_BYTES);
    for pair in bytes.chunks_exact(SAMPLE_BYTES) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        out.push(sample as f32 / 32768.0);
    }
}

/// Round and clamp a normalized float to 16 bits.
#[inline]
pub fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Encode `samples` into `out`, which must hold `samples.len() * 2` bytes.
pub fn encode_i16le(samples: &[f32], dither: bool, out: &mut [u8]) {
    for (sample, dst) in samples.iter().zip(out.chunks_exact_mut(SAMPLE_BYTES)) {
        let value = if dither {
            dither_to_i16(*sample)
        } else {
            to_i16(*sample)
        };
        dst.copy_from_slice(&value.to_le_bytes());
    }
}

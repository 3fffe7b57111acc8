//! Band-limited audio resampling for the screenlive audio engine.
//!
//! This crate provides a streaming sinc resampler over interleaved `f32`
//! frames with a runtime-adjustable ratio, plus TPDF dithering helpers for
//! the final `f32 -> i16` conversion.

pub mod error;

pub use error::{ResampleError, Result};

use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use tracing::{debug, info};

/// Default chunk size for resampling (frames per period).
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Ratio changes within this factor of the construction ratio are applied in
/// place; larger changes rebuild the filter.
const MAX_RELATIVE_RATIO: f64 = 4.0;

/// Sinc interpolation parameters for real-time use.
///
/// - `sinc_len: 128` - Short enough for low latency on voice
/// - `f_cutoff: 0.95` - Good HF preservation
/// - `interpolation: Cubic` - Cubic interpolation between sinc points
/// - `oversampling_factor: 128`
/// - `window: BlackmanHarris2` - Excellent stopband attenuation
const SINC_PARAMS: SincInterpolationParameters = SincInterpolationParameters {
    sinc_len: 128,
    f_cutoff: 0.95,
    interpolation: SincInterpolationType::Cubic,
    oversampling_factor: 128,
    window: WindowFunction::BlackmanHarris2,
};

/// Streaming sinc resampler over interleaved frames.
///
/// `ratio` is output rate over input rate. Output is aligned with the
/// input: the filter delay is dropped from the front, and [`flush`]
/// pushes the tail out.
///
/// For a fixed ratio the output depends only on the input sample stream,
/// not on how it was split across calls.
///
/// [`flush`]: Resampler::flush
pub struct Resampler {
    inner: SincFixedIn<f32>,
    channels: usize,
    chunk_size: usize,
    /// Ratio the filter was built for.
    base_ratio: f64,
    ratio: f64,
    /// Per-channel input waiting for a full chunk.
    pending: Vec<Vec<f32>>,
    /// Output frames still to discard (filter delay).
    skip: usize,
}

impl Resampler {
    pub fn new(ratio: f64, channels: usize) -> Result<Self> {
        Self::with_chunk_size(ratio, channels, DEFAULT_CHUNK_SIZE)
    }

    /// Create a resampler with a custom chunk size.
    pub fn with_chunk_size(ratio: f64, channels: usize, chunk_size: usize) -> Result<Self> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(ResampleError::InvalidRatio(ratio));
        }
        if channels == 0 {
            return Err(ResampleError::InvalidChannels(channels));
        }
        let chunk_size = chunk_size.max(1);
        let inner = build(ratio, channels, chunk_size)?;
        let skip = inner.output_delay();
        info!(
            "Resampler created: ratio {:.4}, {} channels, delay: {} frames",
            ratio, channels, skip
        );

        Ok(Self {
            inner,
            channels,
            chunk_size,
            base_ratio: ratio,
            ratio,
            pending: vec![Vec::with_capacity(chunk_size * 2); channels],
            skip,
        })
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Filter delay in output frames.
    pub fn output_delay(&self) -> usize {
        self.inner.output_delay()
    }

    /// Input frames buffered but not yet run through the filter.
    pub fn pending_frames(&self) -> usize {
        self.pending[0].len()
    }

    /// Change the ratio for subsequent input.
    pub fn set_ratio(&mut self, ratio: f64) -> Result<()> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(ResampleError::InvalidRatio(ratio));
        }
        if ratio == self.ratio {
            return Ok(());
        }
        let relative = ratio / self.base_ratio;
        if relative <= MAX_RELATIVE_RATIO && relative >= 1.0 / MAX_RELATIVE_RATIO {
            self.inner.set_resample_ratio(ratio, false)?;
        } else {
            debug!(
                from = self.ratio,
                to = ratio,
                "Ratio outside adjustable range, rebuilding filter"
            );
            self.inner = build(ratio, self.channels, self.chunk_size)?;
            self.base_ratio = ratio;
            self.skip = self.inner.output_delay();
        }
        self.ratio = ratio;
        Ok(())
    }

    /// Resample interleaved frames, appending whole output frames to `out`.
    ///
    /// A trailing partial frame in `input` is ignored. Returns the number of
    /// frames appended.
    pub fn process_interleaved(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<usize> {
        for frame in input.chunks_exact(self.channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                self.pending[ch].push(sample);
            }
        }
        self.drain_pending(out)
    }

    /// Push silence through the filter so every buffered input frame has
    /// produced output, then reset.
    ///
    /// The result overshoots by up to one chunk; callers that need an exact
    /// length trim it themselves.
    pub fn flush(&mut self, out: &mut Vec<f32>) -> Result<usize> {
        let tail = (self.inner.output_delay() as f64 / self.ratio).ceil() as usize;
        let pad = tail + self.inner.input_frames_next();
        for channel in &mut self.pending {
            channel.resize(channel.len() + pad, 0.0);
        }
        let produced = self.drain_pending(out)?;
        self.reset();
        Ok(produced)
    }

    /// Drop buffered input and filter state.
    pub fn reset(&mut self) {
        self.inner.reset();
        // reset() restores the construction ratio
        if self.ratio != self.base_ratio {
            if let Err(e) = self.inner.set_resample_ratio(self.ratio, false) {
                debug!(error = %e, "Failed to restore ratio after reset");
            }
        }
        for channel in &mut self.pending {
            channel.clear();
        }
        self.skip = self.inner.output_delay();
        debug!("Resampler reset");
    }

    /// Process interleaved i16 samples.
    ///
    /// Converts i16 -> f32, resamples, then converts back to i16 with TPDF dithering.
    pub fn process_i16(&mut self, samples: &[i16]) -> Result<Vec<i16>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        let input: Vec<f32> = samples.iter().map(|&s| s as f32 / 32768.0).collect();
        let mut output = Vec::with_capacity((input.len() as f64 * self.ratio) as usize + 64);
        self.process_interleaved(&input, &mut output)?;
        Ok(output.into_iter().map(dither_to_i16).collect())
    }

    fn drain_pending(&mut self, out: &mut Vec<f32>) -> Result<usize> {
        let mut produced = 0;
        loop {
            let need = self.inner.input_frames_next();
            if self.pending[0].len() < need {
                break;
            }
            let block: Vec<&[f32]> = self.pending.iter().map(|c| &c[..need]).collect();
            let result = self.inner.process(&block, None)?;
            for channel in &mut self.pending {
                channel.drain(..need);
            }
            produced += self.append(&result, out);
        }
        Ok(produced)
    }

    fn append(&mut self, channels: &[Vec<f32>], out: &mut Vec<f32>) -> usize {
        let frames = channels.first().map_or(0, Vec::len);
        let start = self.skip.min(frames);
        self.skip -= start;
        out.reserve((frames - start) * self.channels);
        for frame_idx in start..frames {
            for channel in channels {
                out.push(channel[frame_idx]);
            }
        }
        frames - start
    }
}

fn build(ratio: f64, channels: usize, chunk_size: usize) -> Result<SincFixedIn<f32>> {
    Ok(SincFixedIn::<f32>::new(
        ratio,
        MAX_RELATIVE_RATIO,
        SINC_PARAMS,
        chunk_size,
        channels,
    )?)
}

/// Convert f32 sample to i16 with TPDF dithering.
///
/// TPDF (Triangular Probability Density Function) dithering adds
/// triangular-distributed noise to decorrelate quantization error
/// from the signal, reducing audible distortion.
#[inline]
pub fn dither_to_i16(sample: f32) -> i16 {
    // TPDF dithering: add triangular-distributed noise
    let rand1 = fastrand::f32() - 0.5; // Uniform -0.5 to 0.5
    let rand2 = fastrand::f32() - 0.5;
    let tpdf_noise = (rand1 + rand2) / 32768.0; // Triangular, scaled to 1 LSB

    let dithered = sample + tpdf_noise;
    (dithered * 32767.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Interleave per-channel f32 buffers to i16 with TPDF dithering.
pub fn interleave_with_dither(channels: &[Vec<f32>]) -> Vec<i16> {
    if channels.is_empty() || channels[0].is_empty() {
        return Vec::new();
    }

    let num_frames = channels[0].len();
    let mut output = Vec::with_capacity(num_frames * channels.len());
    for frame_idx in 0..num_frames {
        for channel in channels {
            output.push(dither_to_i16(channel[frame_idx]));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    /// Interleaved stereo sine wave.
    fn sine_stereo(frequency: f32, sample_rate: f32, num_frames: usize) -> Vec<f32> {
        (0..num_frames)
            .flat_map(|i| {
                let s = (2.0 * PI * frequency * i as f32 / sample_rate).sin() * 0.8;
                [s, s]
            })
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
        (sum_squares / samples.len() as f32).sqrt()
    }

    mod creation {
        use super::*;

        #[test]
        fn creates_downsampler() {
            let resampler = Resampler::new(44100.0 / 48000.0, 2).unwrap();
            assert_eq!(resampler.channels(), 2);
            assert!(resampler.output_delay() > 0);
        }

        #[test]
        fn rejects_bad_ratio() {
            assert!(matches!(
                Resampler::new(0.0, 2),
                Err(ResampleError::InvalidRatio(_))
            ));
            assert!(matches!(
                Resampler::new(f64::NAN, 2),
                Err(ResampleError::InvalidRatio(_))
            ));
        }

        #[test]
        fn rejects_zero_channels() {
            assert!(matches!(
                Resampler::new(1.0, 0),
                Err(ResampleError::InvalidChannels(0))
            ));
        }
    }

    mod streaming {
        use super::*;

        #[test]
        fn output_length_follows_ratio() {
            let ratio = 44100.0 / 48000.0;
            let mut resampler = Resampler::new(ratio, 2).unwrap();
            let input = sine_stereo(440.0, 48000.0, 9600);
            let mut out = Vec::new();
            resampler.process_interleaved(&input, &mut out).unwrap();
            resampler.flush(&mut out).unwrap();

            let frames = out.len() / 2;
            let expected = (9600.0 * ratio) as usize;
            assert!(
                frames + 2 >= expected && frames <= expected + 2 * DEFAULT_CHUNK_SIZE,
                "expected about {}, got {}",
                expected,
                frames
            );
        }

        #[test]
        fn output_is_independent_of_chunking() {
            let input = sine_stereo(300.0, 48000.0, 4000);

            let mut whole = Resampler::new(0.75, 2).unwrap();
            let mut a = Vec::new();
            whole.process_interleaved(&input, &mut a).unwrap();
            whole.flush(&mut a).unwrap();

            let mut pieces = Resampler::new(0.75, 2).unwrap();
            let mut b = Vec::new();
            for chunk in input.chunks(14) {
                pieces.process_interleaved(chunk, &mut b).unwrap();
            }
            pieces.flush(&mut b).unwrap();

            assert_eq!(a, b);
        }

        #[test]
        fn delay_is_compensated() {
            let mut resampler = Resampler::new(1.0, 1).unwrap();
            let mut input = vec![0.0f32; 2000];
            input[500] = 1.0;
            let mut out = Vec::new();
            resampler.process_interleaved(&input, &mut out).unwrap();
            resampler.flush(&mut out).unwrap();

            let peak = out
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
                .map(|(i, _)| i)
                .unwrap();
            assert!((495..=505).contains(&peak), "peak at {}", peak);
        }

        #[test]
        fn preserves_amplitude() {
            let mut resampler = Resampler::new(48000.0 / 44100.0, 2).unwrap();
            let input = sine_stereo(440.0, 44100.0, 8820);
            let mut out = Vec::new();
            resampler.process_interleaved(&input, &mut out).unwrap();
            let mid = out.len() / 2;
            let level = rms(&out[mid..mid + 2000]);
            assert!((level - 0.8 / 2f32.sqrt()).abs() < 0.05, "rms {}", level);
        }

        #[test]
        fn ignores_trailing_partial_frame() {
            let mut resampler = Resampler::new(1.0, 2).unwrap();
            let mut out = Vec::new();
            resampler
                .process_interleaved(&[0.1, 0.1, 0.2], &mut out)
                .unwrap();
            assert_eq!(resampler.pending_frames(), 1);
        }
    }

    mod ratio_changes {
        use super::*;

        #[test]
        fn small_change_applies_in_place() {
            let mut resampler = Resampler::new(1.0, 2).unwrap();
            resampler.set_ratio(1.5).unwrap();
            assert_eq!(resampler.ratio(), 1.5);
            let mut out = Vec::new();
            let input = sine_stereo(440.0, 48000.0, 4800);
            resampler.process_interleaved(&input, &mut out).unwrap();
            assert!(!out.is_empty());
        }

        #[test]
        fn large_change_rebuilds() {
            let mut resampler = Resampler::new(1.0, 1).unwrap();
            resampler.set_ratio(8.0).unwrap();
            assert_eq!(resampler.ratio(), 8.0);
            let mut out = Vec::new();
            resampler
                .process_interleaved(&vec![0.25; 1000], &mut out)
                .unwrap();
            resampler.flush(&mut out).unwrap();
            assert!(out.len() >= 8000);
        }

        #[test]
        fn rejects_invalid_ratio() {
            let mut resampler = Resampler::new(1.0, 1).unwrap();
            assert!(resampler.set_ratio(-1.0).is_err());
            assert_eq!(resampler.ratio(), 1.0);
        }
    }

    mod i16_processing {
        use super::*;

        #[test]
        fn handles_empty_input() {
            let mut resampler = Resampler::new(0.5, 2).unwrap();
            assert!(resampler.process_i16(&[]).unwrap().is_empty());
        }

        #[test]
        fn resamples_i16() {
            let mut resampler = Resampler::new(0.5, 2).unwrap();
            let input: Vec<i16> = sine_stereo(440.0, 48000.0, 4096)
                .into_iter()
                .map(|s| (s * 32767.0) as i16)
                .collect();
            let output = resampler.process_i16(&input).unwrap();
            assert_eq!(output.len() % 2, 0);
            assert!(output.len() / 2 <= 2048);
            assert!(output.len() / 2 >= 2048 - resampler.output_delay() - 2 * DEFAULT_CHUNK_SIZE);
        }
    }

    mod dithering {
        use super::*;

        #[test]
        fn dither_to_i16_preserves_range() {
            assert!(dither_to_i16(0.0).abs() <= 1);
            assert!(dither_to_i16(1.0) > 30000);
            assert!(dither_to_i16(-1.0) < -30000);
            assert_eq!(dither_to_i16(4.0), 32767);
            assert_eq!(dither_to_i16(-4.0), -32768);
        }

        #[test]
        fn interleave_with_dither_correct_length() {
            let channels = vec![vec![0.5f32; 100], vec![-0.5f32; 100]];
            let output = interleave_with_dither(&channels);
            assert_eq!(output.len(), 200);
            assert!(output[0] > 0 && output[1] < 0);
        }

        #[test]
        fn interleave_with_dither_handles_empty() {
            let channels: Vec<Vec<f32>> = vec![];
            assert!(interleave_with_dither(&channels).is_empty());
        }
    }

    mod reset {
        use super::*;

        #[test]
        fn reset_drops_pending_input() {
            let mut resampler = Resampler::new(0.9, 2).unwrap();
            let mut out = Vec::new();
            resampler
                .process_interleaved(&sine_stereo(440.0, 48000.0, 100), &mut out)
                .unwrap();
            assert_eq!(resampler.pending_frames(), 100);
            resampler.reset();
            assert_eq!(resampler.pending_frames(), 0);
        }
    }
}

//! Sample-rate transposers for the rate stage.

use screenlive_resampler::{Resampler, DEFAULT_CHUNK_SIZE};

use crate::error::Result;

/// Changes the playback rate of an interleaved stream.
///
/// `rate` is input frames consumed per output frame: above 1 shortens the
/// stream and raises its pitch. Implementations keep their own history so
/// output does not depend on how the input is split across calls.
#[cfg_attr(test, mockall::automock)]
pub trait Transposer: Send {
    fn set_rate(&mut self, rate: f64) -> Result<()>;

    /// Consume all of `input`, appending produced frames to `out`.
    fn transpose(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<()>;

    /// Drop history and return to the initial state.
    fn reset(&mut self);

    /// Input frames needed before the first output frame.
    fn latency_frames(&self) -> usize;
}

const FRAC_BITS: u32 = 32;
const FRAC_ONE: u64 = 1 << FRAC_BITS;
const FRAC_MASK: u64 = FRAC_ONE - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Linear,
    Cubic,
}

impl Kernel {
    /// Frames needed before and after the interpolation point.
    fn support(self) -> (usize, usize) {
        match self {
            Kernel::Linear => (0, 1),
            Kernel::Cubic => (1, 2),
        }
    }
}

/// Linear or cubic interpolating transposer.
///
/// The read position is kept in 32.32 fixed point so it advances exactly
/// the same way however the input is chunked.
pub struct InterpolatingTransposer {
    kernel: Kernel,
    channels: usize,
    step: u64,
    /// Unconsumed input frames, starting `before` frames ahead of `pos`.
    buffer: Vec<f32>,
    pos: usize,
    frac: u64,
}

impl InterpolatingTransposer {
    pub fn linear(channels: usize) -> Self {
        Self::new(Kernel::Linear, channels)
    }

    pub fn cubic(channels: usize) -> Self {
        Self::new(Kernel::Cubic, channels)
    }

    fn new(kernel: Kernel, channels: usize) -> Self {
        let mut transposer = Self {
            kernel,
            channels: channels.max(1),
            step: FRAC_ONE,
            buffer: Vec::new(),
            pos: 0,
            frac: 0,
        };
        transposer.reset();
        transposer
    }

    #[inline]
    fn sample(&self, frame: usize, channel: usize, fraction: f32) -> f32 {
        let ch = self.channels;
        let b = &self.buffer;
        match self.kernel {
            Kernel::Linear => {
                let s0 = b[frame * ch + channel];
                let s1 = b[(frame + 1) * ch + channel];
                s0 + (s1 - s0) * fraction
            }
            Kernel::Cubic => {
                let x1 = fraction;
                let x2 = x1 * x1;
                let x3 = x2 * x1;
                let y0 = -0.5 * x3 + x2 - 0.5 * x1;
                let y1 = 1.5 * x3 - 2.5 * x2 + 1.0;
                let y2 = -1.5 * x3 + 2.0 * x2 + 0.5 * x1;
                let y3 = 0.5 * x3 - 0.5 * x2;
                y0 * b[(frame - 1) * ch + channel]
                    + y1 * b[frame * ch + channel]
                    + y2 * b[(frame + 1) * ch + channel]
                    + y3 * b[(frame + 2) * ch + channel]
            }
        }
    }
}

impl Transposer for InterpolatingTransposer {
    fn set_rate(&mut self, rate: f64) -> Result<()> {
        self.step = ((rate * FRAC_ONE as f64).round() as u64).max(1);
        Ok(())
    }

    fn transpose(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<()> {
        let ch = self.channels;
        self.buffer.extend_from_slice(&input[..input.len() / ch * ch]);
        let frames = self.buffer.len() / ch;
        let (before, after) = self.kernel.support();

        while self.pos + after < frames {
            let fraction = (self.frac as f64 / FRAC_ONE as f64) as f32;
            for c in 0..ch {
                out.push(self.sample(self.pos, c, fraction));
            }
            self.frac += self.step;
            self.pos += (self.frac >> FRAC_BITS) as usize;
            self.frac &= FRAC_MASK;
        }

        let drop = self.pos.saturating_sub(before).min(frames);
        self.buffer.drain(..drop * ch);
        self.pos -= drop;
        Ok(())
    }

    fn reset(&mut self) {
        let (before, _) = self.kernel.support();
        self.buffer.clear();
        // Leading silence so the first output lines up with the first input
        self.buffer.resize(before * self.channels, 0.0);
        self.pos = before;
        self.frac = 0;
    }

    fn latency_frames(&self) -> usize {
        let (_, after) = self.kernel.support();
        after + 1
    }
}

/// Band-limited transposer backed by the sinc resampler.
pub struct SincTransposer {
    resampler: Resampler,
}

impl SincTransposer {
    pub fn new(channels: usize) -> Result<Self> {
        Ok(Self {
            resampler: Resampler::new(1.0, channels.max(1))?,
        })
    }
}

impl Transposer for SincTransposer {
    fn set_rate(&mut self, rate: f64) -> Result<()> {
        self.resampler.set_ratio(1.0 / rate)?;
        Ok(())
    }

    fn transpose(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<()> {
        self.resampler.process_interleaved(input, out)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.resampler.reset();
    }

    fn latency_frames(&self) -> usize {
        DEFAULT_CHUNK_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> Vec<f32> {
        (0..frames).map(|i| i as f32 / frames as f32).collect()
    }

    mod linear {
        use super::*;

        #[test]
        fn unit_rate_copies_input() {
            let mut t = InterpolatingTransposer::linear(1);
            let mut out = Vec::new();
            t.transpose(&[0.1, 0.2, 0.3, 0.4], &mut out).unwrap();
            // Last frame waits for its successor
            assert_eq!(out, vec![0.1, 0.2, 0.3]);
            t.transpose(&[0.5], &mut out).unwrap();
            assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
        }

        #[test]
        fn half_rate_interpolates_midpoints() {
            let mut t = InterpolatingTransposer::linear(1);
            t.set_rate(0.5).unwrap();
            let mut out = Vec::new();
            t.transpose(&[0.0, 1.0, 0.0], &mut out).unwrap();
            assert_eq!(out, vec![0.0, 0.5, 1.0, 0.5]);
        }

        #[test]
        fn double_rate_skips_frames() {
            let mut t = InterpolatingTransposer::linear(2);
            t.set_rate(2.0).unwrap();
            let input: Vec<f32> = (0..10).map(|i| i as f32).collect();
            let mut out = Vec::new();
            t.transpose(&input, &mut out).unwrap();
            assert_eq!(out, vec![0.0, 1.0, 4.0, 5.0]);
        }

        #[test]
        fn latency() {
            assert_eq!(InterpolatingTransposer::linear(1).latency_frames(), 2);
        }
    }

    mod cubic {
        use super::*;

        #[test]
        fn passes_through_sample_points() {
            let mut t = InterpolatingTransposer::cubic(1);
            let input = ramp(16);
            let mut out = Vec::new();
            t.transpose(&input, &mut out).unwrap();
            assert_eq!(out.len(), 14);
            for (a, b) in out.iter().zip(&input) {
                assert!((a - b).abs() < 1e-6);
            }
        }

        #[test]
        fn reproduces_linear_ramp_between_points() {
            let mut t = InterpolatingTransposer::cubic(1);
            t.set_rate(0.25).unwrap();
            let input: Vec<f32> = (0..20).map(|i| i as f32).collect();
            let mut out = Vec::new();
            t.transpose(&input, &mut out).unwrap();
            // Away from the zero-padded start, a ramp stays a ramp
            for (i, v) in out.iter().enumerate().skip(8) {
                assert!((v - i as f32 * 0.25).abs() < 1e-4, "{} at {}", v, i);
            }
        }
    }

    mod chunking {
        use super::*;

        fn run(t: &mut InterpolatingTransposer, input: &[f32], chunk: usize) -> Vec<f32> {
            let mut out = Vec::new();
            for piece in input.chunks(chunk) {
                t.transpose(piece, &mut out).unwrap();
            }
            out
        }

        #[test]
        fn output_independent_of_chunk_size() {
            let input: Vec<f32> = (0..2000).map(|i| ((i as f32) * 0.05).sin()).collect();
            for rate in [0.37, 0.8, 1.19, 2.5] {
                let mut a = InterpolatingTransposer::cubic(2);
                let mut b = InterpolatingTransposer::cubic(2);
                a.set_rate(rate).unwrap();
                b.set_rate(rate).unwrap();
                assert_eq!(run(&mut a, &input, 2000), run(&mut b, &input, 6), "rate {}", rate);
            }
        }

        #[test]
        fn output_length_tracks_rate() {
            let mut t = InterpolatingTransposer::linear(1);
            t.set_rate(1.25).unwrap();
            let out = run(&mut t, &vec![0.0; 10_000], 100);
            assert!((out.len() as i64 - 8000).abs() <= 1, "{}", out.len());
        }
    }

    mod sinc {
        use super::*;

        #[test]
        fn downsamples_by_rate() {
            let mut t = SincTransposer::new(1).unwrap();
            t.set_rate(2.0).unwrap();
            let mut out = Vec::new();
            t.transpose(&vec![0.5; 8192], &mut out).unwrap();
            assert!(out.len() <= 4096);
            assert!(out.len() >= 4096 - 2 * DEFAULT_CHUNK_SIZE);
        }
    }

    mod mock {
        use super::*;
        use mockall::predicate::eq;

        #[test]
        fn mock_transposer_records_rate() {
            let mut mock = MockTransposer::new();
            mock.expect_set_rate()
                .with(eq(1.5))
                .times(1)
                .returning(|_| Ok(()));
            mock.expect_latency_frames().return_const(3usize);
            mock.set_rate(1.5).unwrap();
            assert_eq!(mock.latency_frames(), 3);
        }
    }
}

//! Windowed-sinc FIR low-pass used around the interpolating transposers.

use std::f64::consts::PI;

/// Streaming FIR low-pass with a Hamming-windowed sinc kernel.
///
/// Cutoff is a fraction of the sample rate; 0.5 is Nyquist. One output
/// frame is produced per input frame, delayed by half the filter length.
pub struct AaFilter {
    length: usize,
    cutoff: f64,
    coeffs: Vec<f32>,
    channels: usize,
    /// Last `length - 1` input frames.
    history: Vec<f32>,
    work: Vec<f32>,
}

impl AaFilter {
    /// `length` is rounded down to a multiple of 4 (minimum 4).
    pub fn new(length: usize, channels: usize) -> Self {
        let length = (length - length % 4).max(4);
        let channels = channels.max(1);
        let mut filter = Self {
            length,
            cutoff: 0.5,
            coeffs: Vec::new(),
            channels,
            history: vec![0.0; (length - 1) * channels],
            work: Vec::new(),
        };
        filter.calculate_coeffs();
        filter
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coeffs
    }

    pub fn set_cutoff(&mut self, cutoff: f64) {
        let cutoff = cutoff.clamp(0.0001, 0.5);
        if cutoff != self.cutoff {
            self.cutoff = cutoff;
            self.calculate_coeffs();
        }
    }

    fn calculate_coeffs(&mut self) {
        let wc = 2.0 * PI * self.cutoff;
        let window_step = 2.0 * PI / self.length as f64;
        let half = (self.length / 2) as f64;

        let raw: Vec<f64> = (0..self.length)
            .map(|i| {
                let n = i as f64 - half;
                let x = n * wc;
                let sinc = if x != 0.0 { x.sin() / x } else { 1.0 };
                let window = 0.54 + 0.46 * (window_step * n).cos();
                sinc * window
            })
            .collect();
        let sum: f64 = raw.iter().sum();
        self.coeffs = raw.iter().map(|c| (c / sum) as f32).collect();
    }

    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let ch = self.channels;
        let frames = input.len() / ch;
        if frames == 0 {
            return;
        }
        self.work.clear();
        self.work.extend_from_slice(&self.history);
        self.work.extend_from_slice(&input[..frames * ch]);

        let taps = self.length;
        out.reserve(frames * ch);
        for n in 0..frames {
            for c in 0..ch {
                let mut acc = 0.0f32;
                for (k, &h) in self.coeffs.iter().enumerate() {
                    acc += h * self.work[(n + taps - 1 - k) * ch + c];
                }
                out.push(acc);
            }
        }

        let keep = (taps - 1) * ch;
        let start = self.work.len() - keep;
        self.history.copy_from_slice(&self.work[start..]);
    }

    pub fn reset(&mut self) {
        self.history.fill(0.0);
    }
}

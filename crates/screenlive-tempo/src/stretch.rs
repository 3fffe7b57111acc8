//! WSOLA time stretch: changes duration without changing pitch.
//!
//! Input is cut into overlapping sequences. Each new sequence is placed at
//! the position within the seek window whose start best matches the tail of
//! the previous one, and the two are joined with a linear cross-fade.

use tracing::trace;

use crate::config::StretchParams;
use crate::fifo::SampleFifo;

const AUTO_TEMPO_LOW: f64 = 0.5;
const AUTO_TEMPO_HIGH: f64 = 2.0;
const AUTO_SEQUENCE_MS: (f64, f64) = (90.0, 40.0);
const AUTO_SEEK_MS: (f64, f64) = (20.0, 15.0);

const MIN_OVERLAP_FRAMES: usize = 16;

/// Linear map from tempo to a window length, clamped to its end points.
fn auto_window_ms(tempo: f64, (at_low, at_high): (f64, f64)) -> f64 {
    let k = (at_high - at_low) / (AUTO_TEMPO_HIGH - AUTO_TEMPO_LOW);
    let c = at_low - k * AUTO_TEMPO_LOW;
    (c + k * tempo).clamp(at_low.min(at_high), at_low.max(at_high))
}

fn ms_to_frames(sample_rate: u32, ms: f64) -> usize {
    (sample_rate as f64 * ms / 1000.0).round() as usize
}

pub struct TimeStretch {
    params: StretchParams,
    sample_rate: u32,
    channels: usize,
    tempo: f64,

    sequence_frames: usize,
    seek_frames: usize,
    overlap_frames: usize,
    nominal_skip: f64,
    sample_req: usize,
    skip_fract: f64,

    input: SampleFifo,
    /// Tail of the previous sequence, cross-faded into the next one.
    mid: Vec<f32>,
    /// `mid` weighted by `i * (overlap - i)` for correlation.
    ref_mid: Vec<f32>,
    beginning: bool,
}

impl TimeStretch {
    pub fn new(params: StretchParams, sample_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        let mut overlap = ms_to_frames(sample_rate, params.overlap_ms).max(MIN_OVERLAP_FRAMES);
        overlap -= overlap % 8;

        let mut stretch = Self {
            params,
            sample_rate,
            channels,
            tempo: 1.0,
            sequence_frames: 0,
            seek_frames: 0,
            overlap_frames: overlap,
            nominal_skip: 0.0,
            sample_req: 0,
            skip_fract: 0.0,
            input: SampleFifo::new(channels),
            mid: vec![0.0; overlap * channels],
            ref_mid: vec![0.0; overlap * channels],
            beginning: true,
        };
        stretch.update_parameters();
        stretch
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: f64) {
        if tempo == self.tempo || !tempo.is_finite() || tempo <= 0.0 {
            return;
        }
        self.tempo = tempo;
        self.update_parameters();
    }

    pub fn sequence_frames(&self) -> usize {
        self.sequence_frames
    }

    pub fn seek_frames(&self) -> usize {
        self.seek_frames
    }

    pub fn overlap_frames(&self) -> usize {
        self.overlap_frames
    }

    /// Input frames needed before one sequence can be processed.
    pub fn sample_req(&self) -> usize {
        self.sample_req
    }

    pub fn buffered_frames(&self) -> usize {
        self.input.frames()
    }

    /// No input seen since construction or the last clear.
    pub fn is_pristine(&self) -> bool {
        self.beginning && self.input.is_empty()
    }

    /// Whether `process` currently copies input straight through.
    pub fn is_passthrough(&self) -> bool {
        self.tempo == 1.0 && self.is_pristine()
    }

    fn update_parameters(&mut self) {
        let sequence_ms = self
            .params
            .sequence_ms
            .unwrap_or_else(|| auto_window_ms(self.tempo, AUTO_SEQUENCE_MS));
        let seek_ms = self
            .params
            .seek_window_ms
            .unwrap_or_else(|| auto_window_ms(self.tempo, AUTO_SEEK_MS));

        self.sequence_frames =
            ms_to_frames(self.sample_rate, sequence_ms).max(2 * self.overlap_frames);
        self.seek_frames = ms_to_frames(self.sample_rate, seek_ms).max(1);
        self.nominal_skip = self.tempo * (self.sequence_frames - self.overlap_frames) as f64;
        let int_skip = (self.nominal_skip + 0.5) as usize;
        self.sample_req =
            (int_skip + self.overlap_frames).max(self.sequence_frames) + self.seek_frames;

        trace!(
            tempo = self.tempo,
            sequence = self.sequence_frames,
            seek = self.seek_frames,
            overlap = self.overlap_frames,
            sample_req = self.sample_req,
            "Stretch parameters"
        );
    }

    /// Stretch interleaved `input`, appending finished frames to `out`.
    pub fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if self.is_passthrough() {
            out.extend_from_slice(input);
            return;
        }
        self.input.put(input);

        let overlap = self.overlap_frames;
        let sequence = self.sequence_frames;
        while self.input.frames() >= self.sample_req {
            let offset = if self.beginning {
                self.beginning = false;
                out.extend_from_slice(self.input.frames_slice(0, overlap));
                0
            } else {
                let offset = if self.params.quick_seek {
                    self.seek_quick()
                } else {
                    self.seek_full()
                };
                self.cross_fade(offset, out);
                offset
            };

            out.extend_from_slice(
                self.input
                    .frames_slice(offset + overlap, offset + sequence - overlap),
            );
            self.mid.copy_from_slice(
                self.input
                    .frames_slice(offset + sequence - overlap, offset + sequence),
            );
            self.update_reference();

            self.skip_fract += self.nominal_skip;
            let skip = self.skip_fract as usize;
            self.skip_fract -= skip as f64;
            self.input.consume(skip);
        }
    }

    /// Drop buffered input and start over.
    pub fn clear(&mut self) {
        self.input.clear();
        self.mid.fill(0.0);
        self.ref_mid.fill(0.0);
        self.skip_fract = 0.0;
        self.beginning = true;
    }

    fn update_reference(&mut self) {
        let overlap = self.overlap_frames;
        let channels = self.channels;
        for i in 0..overlap {
            let weight = (i * (overlap - i)) as f32;
            for c in 0..channels {
                let idx = i * channels + c;
                self.ref_mid[idx] = self.mid[idx] * weight;
            }
        }
    }

    /// Weighted normalized cross-correlation of the reference with the input
    /// at frame `position`.
    fn correlation(&self, position: usize) -> f64 {
        let compare = self
            .input
            .frames_slice(position, position + self.overlap_frames);
        let mut corr = 0.0f64;
        let mut norm = 0.0f64;
        for (&x, &r) in compare.iter().zip(&self.ref_mid) {
            corr += x as f64 * r as f64;
            norm += x as f64 * x as f64;
        }
        corr / if norm < 1e-9 { 1.0 } else { norm.sqrt() }
    }

    /// Correlation with a mild preference for the middle of the window.
    fn biased_correlation(&self, position: usize) -> f64 {
        let seek = self.seek_frames as f64;
        let tmp = (2.0 * position as f64 - seek) / seek;
        (self.correlation(position) + 0.1) * (1.0 - 0.25 * tmp * tmp)
    }

    fn seek_full(&self) -> usize {
        self.best_in(0, self.seek_frames, 1)
    }

    fn seek_quick(&self) -> usize {
        let step = (self.seek_frames / 16).max(1);
        let coarse = self.best_in(0, self.seek_frames, step);
        let from = coarse.saturating_sub(step - 1);
        let to = (coarse + step).min(self.seek_frames);
        self.best_in(from, to, 1)
    }

    fn best_in(&self, from: usize, to: usize, step: usize) -> usize {
        let mut best = from;
        let mut best_corr = f64::MIN;
        for position in (from..to).step_by(step) {
            let corr = self.biased_correlation(position);
            if corr > best_corr {
                best_corr = corr;
                best = position;
            }
        }
        best
    }

    fn cross_fade(&self, offset: usize, out: &mut Vec<f32>) {
        let overlap = self.overlap_frames;
        let channels = self.channels;
        let incoming = self.input.frames_slice(offset, offset + overlap);
        let scale = 1.0 / overlap as f32;
        out.reserve(overlap * channels);
        for i in 0..overlap {
            let fade_in = i as f32 * scale;
            let fade_out = 1.0 - fade_in;
            for c in 0..channels {
                let idx = i * channels + c;
                out.push(incoming[idx] * fade_in + self.mid[idx] * fade_out);
            }
        }
    }
}

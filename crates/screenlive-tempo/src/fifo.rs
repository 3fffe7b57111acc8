//! Interleaved sample FIFO shared by the processing stages.

/// Growable FIFO of interleaved `f32` frames.
///
/// Consumed frames are reclaimed lazily so reads stay contiguous.
#[derive(Debug, Clone)]
pub struct SampleFifo {
    samples: Vec<f32>,
    start: usize,
    channels: usize,
}

impl SampleFifo {
    pub fn new(channels: usize) -> Self {
        Self {
            samples: Vec::new(),
            start: 0,
            channels: channels.max(1),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of whole frames buffered.
    pub fn frames(&self) -> usize {
        (self.samples.len() - self.start) / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.len() == self.start
    }

    /// Append interleaved samples. `samples.len()` must be a multiple of the
    /// channel count.
    pub fn put(&mut self, samples: &[f32]) {
        debug_assert_eq!(samples.len() % self.channels, 0);
        self.samples.extend_from_slice(samples);
    }

    /// Append `frames` frames of silence.
    pub fn put_silence(&mut self, frames: usize) {
        self.samples
            .resize(self.samples.len() + frames * self.channels, 0.0);
    }

    /// All buffered samples, oldest first.
    pub fn as_slice(&self) -> &[f32] {
        &self.samples[self.start..]
    }

    /// Samples of frames `from..to`, relative to the oldest frame.
    pub fn frames_slice(&self, from: usize, to: usize) -> &[f32] {
        let base = self.start;
        &self.samples[base + from * self.channels..base + to * self.channels]
    }

    /// Drop up to `frames` frames from the front. Returns how many were dropped.
    pub fn consume(&mut self, frames: usize) -> usize {
        let n = frames.min(self.frames());
        self.start += n * self.channels;
        if self.start == self.samples.len() {
            self.samples.clear();
            self.start = 0;
        } else if self.start > 16 * 1024 && self.start * 2 > self.samples.len() {
            self.samples.drain(..self.start);
            self.start = 0;
        }
        n
    }

    /// Move up to `max_frames` frames from the front into `out`.
    pub fn receive(&mut self, max_frames: usize, out: &mut Vec<f32>) -> usize {
        let n = max_frames.min(self.frames());
        out.extend_from_slice(self.frames_slice(0, n));
        self.consume(n)
    }

    /// Drop up to `frames` frames from the back.
    pub fn truncate_back(&mut self, frames: usize) -> usize {
        let n = frames.min(self.frames());
        let len = self.samples.len() - n * self.channels;
        self.samples.truncate(len);
        n
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.start = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_consume() {
        let mut fifo = SampleFifo::new(2);
        assert!(fifo.is_empty());
        fifo.put(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(fifo.frames(), 3);
        assert_eq!(fifo.consume(1), 1);
        assert_eq!(fifo.as_slice(), &[3.0, 4.0, 5.0, 6.0]);
        assert_eq!(fifo.frames_slice(1, 2), &[5.0, 6.0]);
    }

    #[test]
    fn consume_more_than_available() {
        let mut fifo = SampleFifo::new(1);
        fifo.put(&[1.0, 2.0]);
        assert_eq!(fifo.consume(10), 2);
        assert!(fifo.is_empty());
    }

    #[test]
    fn receive_moves_front_frames() {
        let mut fifo = SampleFifo::new(2);
        fifo.put(&[1.0, 1.5, 2.0, 2.5]);
        let mut out = Vec::new();
        assert_eq!(fifo.receive(1, &mut out), 1);
        assert_eq!(out, vec![1.0, 1.5]);
        assert_eq!(fifo.frames(), 1);
    }

    #[test]
    fn silence_and_truncate() {
        let mut fifo = SampleFifo::new(2);
        fifo.put(&[1.0, 1.0]);
        fifo.put_silence(3);
        assert_eq!(fifo.frames(), 4);
        assert_eq!(fifo.truncate_back(2), 2);
        assert_eq!(fifo.as_slice(), &[1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn compaction_keeps_contents() {
        let mut fifo = SampleFifo::new(1);
        let data: Vec<f32> = (0..40_000).map(|i| i as f32).collect();
        fifo.put(&data);
        fifo.consume(30_000);
        fifo.put(&[-1.0]);
        assert_eq!(fifo.frames(), 10_001);
        assert_eq!(fifo.as_slice()[0], 30_000.0);
        assert_eq!(*fifo.as_slice().last().unwrap(), -1.0);
    }
}

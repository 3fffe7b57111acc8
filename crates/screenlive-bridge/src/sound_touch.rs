//! Audio transformer wrapper with sentinel-valued results.

use parking_lot::Mutex;
use screenlive_tempo::{AudioTransformer, EngineConfig, Result, VoicePreset};
use tracing::{debug, error, warn};

/// Caller-facing tempo/rate/pitch processor.
///
/// The engine sits behind a mutex so one instance can be shared across
/// threads. After [`release`](SoundTouch::release) every call is a no-op
/// returning 0.
pub struct SoundTouch {
    engine: Mutex<Option<AudioTransformer>>,
}

impl SoundTouch {
    /// Create a processor with the default engine configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default()).unwrap_or_else(|e| {
            error!(error = %e, "Audio transformer creation failed");
            Self {
                engine: Mutex::new(None),
            }
        })
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        Ok(Self {
            engine: Mutex::new(Some(AudioTransformer::new(config)?)),
        })
    }

    pub fn version() -> &'static str {
        screenlive_tempo::VERSION
    }

    /// Drop the engine and all buffered audio.
    pub fn release(&self) {
        if self.engine.lock().take().is_some() {
            debug!("Audio transformer released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.engine.lock().is_none()
    }

    fn with_engine<R>(&self, default: R, f: impl FnOnce(&mut AudioTransformer) -> R) -> R {
        match self.engine.lock().as_mut() {
            Some(engine) => f(engine),
            None => default,
        }
    }

    pub fn set_audio_format(&self, sample_rate: u32, channels: usize) -> bool {
        self.with_engine(false, |e| match e.set_audio_format(sample_rate, channels) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, sample_rate, channels, "Failed to set audio format");
                false
            }
        })
    }

    pub fn set_tempo(&self, tempo: f64) {
        self.with_engine((), |e| e.set_tempo(tempo))
    }

    pub fn set_tempo_change(&self, percent: f64) {
        self.with_engine((), |e| e.set_tempo_change(percent))
    }

    pub fn set_rate(&self, rate: f64) {
        self.with_engine((), |e| e.set_rate(rate))
    }

    pub fn set_rate_change(&self, percent: f64) {
        self.with_engine((), |e| e.set_rate_change(percent))
    }

    pub fn set_pitch(&self, pitch: f64) {
        self.with_engine((), |e| e.set_pitch(pitch))
    }

    pub fn set_pitch_octaves(&self, octaves: f64) {
        self.with_engine((), |e| e.set_pitch_octaves(octaves))
    }

    pub fn set_pitch_semitones(&self, semitones: f64) {
        self.with_engine((), |e| e.set_pitch_semitones(semitones))
    }

    pub fn set_voice_preset(&self, preset: VoicePreset) {
        self.with_engine((), |e| e.apply_preset(preset))
    }

    pub fn tempo(&self) -> f64 {
        self.with_engine(1.0, |e| e.tempo())
    }

    pub fn rate(&self) -> f64 {
        self.with_engine(1.0, |e| e.rate())
    }

    pub fn pitch(&self) -> f64 {
        self.with_engine(1.0, |e| e.pitch())
    }

    /// Transform `source[..source_size]` into `target`.
    ///
    /// Returns the bytes written. A trailing partial frame, such as the odd
    /// byte of an odd `source_size`, is held until the next call completes it.
    pub fn process(&self, source: &[u8], source_size: usize, target: &mut [u8]) -> i32 {
        let source = &source[..source_size.min(source.len())];
        self.with_engine(0, |e| match e.process(source, target) {
            Ok(n) => n.min(i32::MAX as usize) as i32,
            Err(err) => {
                warn!(error = %err, "Audio processing failed");
                0
            }
        })
    }

    /// Drain buffered output without new input.
    pub fn receive(&self, target: &mut [u8]) -> i32 {
        self.with_engine(0, |e| e.receive(target).min(i32::MAX as usize) as i32)
    }

    /// Finish the stream, writing the tail of the output into `target`.
    pub fn flush(&self, target: &mut [u8]) -> i32 {
        self.with_engine(0, |e| match e.flush(target) {
            Ok(n) => n.min(i32::MAX as usize) as i32,
            Err(err) => {
                warn!(error = %err, "Audio flush failed");
                0
            }
        })
    }

    pub fn clear(&self) {
        self.with_engine((), |e| e.clear())
    }
}

impl Default for SoundTouch {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SoundTouch {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence(frames: usize) -> Vec<u8> {
        vec![0u8; frames * 2]
    }

    #[test]
    fn passthrough_by_default() {
        let st = SoundTouch::new();
        let input: Vec<u8> = (0..200u16).flat_map(|i| (i * 100).to_le_bytes()).collect();
        let mut out = vec![0u8; 400];
        assert_eq!(st.process(&input, input.len(), &mut out), 400);
        assert_eq!(out, input);
    }

    #[test]
    fn odd_source_size_carries_the_split_sample() {
        let st = SoundTouch::new();
        let input: Vec<u8> = (1..=8u16).flat_map(|i| (i * 257).to_le_bytes()).collect();
        let mut out = vec![0u8; 64];

        assert_eq!(st.process(&input, 7, &mut out), 6);
        let mut collected = out[..6].to_vec();
        assert_eq!(st.process(&input[7..], 9, &mut out), 10);
        collected.extend_from_slice(&out[..10]);
        assert_eq!(collected, input);
    }

    #[test]
    fn percent_setters_are_absolute_factors() {
        let st = SoundTouch::new();
        st.set_tempo_change(50.0);
        assert_eq!(st.tempo(), 1.5);
        st.set_rate_change(-25.0);
        assert_eq!(st.rate(), 0.75);
        st.set_pitch_octaves(1.0);
        st.set_pitch_semitones(0.0);
        assert_eq!(st.pitch(), 1.0);
    }

    #[test]
    fn released_instance_is_inert() {
        let st = SoundTouch::new();
        st.release();
        assert!(st.is_released());
        st.set_tempo(2.0);
        assert_eq!(st.tempo(), 1.0);
        let mut out = vec![0u8; 64];
        assert_eq!(st.process(&silence(16), 32, &mut out), 0);
        assert_eq!(st.flush(&mut out), 0);
        st.release();
    }

    #[test]
    fn flush_emits_remaining_audio() {
        let st = SoundTouch::new();
        st.set_tempo(2.0);
        let mut out = vec![0u8; 1 << 16];
        let mut total = st.process(&silence(10_000), 20_000, &mut out);
        total += st.flush(&mut out);
        assert_eq!(total, 10_000);
    }
}

//! The audio transformer: PCM in, tempo/rate/pitch-shifted PCM out.

use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::fifo::SampleFifo;
use crate::pcm::{self, SAMPLE_BYTES};
use crate::preset::VoicePreset;
use crate::rate::RateStage;
use crate::settings::Settings;
use crate::stretch::TimeStretch;

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_CHANNELS: usize = 1;

pub const MIN_SAMPLE_RATE: u32 = 8000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;
pub const MAX_CHANNELS: usize = 16;

/// Silence block fed per round while flushing.
const FLUSH_BLOCK_FRAMES: usize = 1024;
/// Extra rounds allowed beyond the estimate before padding directly.
const FLUSH_EXTRA_ROUNDS: usize = 16;

/// Streaming tempo, rate and pitch transformer for interleaved 16-bit PCM.
///
/// Single-threaded; wrap it in a mutex to share.
pub struct AudioTransformer {
    config: EngineConfig,
    settings: Settings,
    sample_rate: u32,
    channels: usize,

    stretch: TimeStretch,
    rate_stage: RateStage,
    /// Rate stage runs before the stretch.
    rate_first: bool,

    /// Trailing bytes of an incomplete input frame.
    partial: Vec<u8>,
    decoded: Vec<f32>,
    between: Vec<f32>,
    stage_out: Vec<f32>,
    output: SampleFifo,

    /// Output frames the input so far should yield.
    expected_frames: f64,
    /// Output frames produced since the last flush or clear.
    produced_frames: u64,
    /// Output frames of the current stream already received.
    released_frames: u64,
    /// Finished output from the last flush still waiting in `output`.
    backlog_frames: usize,
}

impl AudioTransformer {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let stretch = TimeStretch::new(config.stretch.clone(), DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS);
        let rate_stage = RateStage::new(&config, DEFAULT_CHANNELS)?;
        debug!(interpolation = ?config.interpolation, "Audio transformer created");
        Ok(Self {
            config,
            settings: Settings::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            stretch,
            rate_stage,
            rate_first: false,
            partial: Vec::new(),
            decoded: Vec::new(),
            between: Vec::new(),
            stage_out: Vec::new(),
            output: SampleFifo::new(DEFAULT_CHANNELS),
            expected_frames: 0.0,
            produced_frames: 0,
            released_frames: 0,
            backlog_frames: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Set the PCM format. Values are clamped to the supported range.
    ///
    /// Changing the format discards all buffered audio.
    pub fn set_audio_format(&mut self, sample_rate: u32, channels: usize) -> Result<()> {
        let sample_rate = sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE);
        let channels = channels.clamp(1, MAX_CHANNELS);
        if sample_rate == self.sample_rate && channels == self.channels {
            return Ok(());
        }
        if self.has_buffered_audio() {
            warn!(
                old_rate = self.sample_rate,
                old_channels = self.channels,
                sample_rate,
                channels,
                "Audio format changed, discarding buffered audio"
            );
        }

        self.rate_stage = RateStage::new(&self.config, channels)?;
        self.stretch = TimeStretch::new(self.config.stretch.clone(), sample_rate, channels);
        self.output = SampleFifo::new(channels);
        self.sample_rate = sample_rate;
        self.channels = channels;
        self.partial.clear();
        self.reset_counters();
        self.apply_settings();
        info!(sample_rate, channels, "Audio format set");
        Ok(())
    }

    pub fn set_tempo(&mut self, tempo: f64) {
        self.settings.set_tempo(tempo);
        self.apply_settings();
    }

    pub fn set_tempo_change(&mut self, percent: f64) {
        self.settings.set_tempo_change(percent);
        self.apply_settings();
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.settings.set_rate(rate);
        self.apply_settings();
    }

    pub fn set_rate_change(&mut self, percent: f64) {
        self.settings.set_rate_change(percent);
        self.apply_settings();
    }

    pub fn set_pitch(&mut self, pitch: f64) {
        self.settings.set_pitch(pitch);
        self.apply_settings();
    }

    pub fn set_pitch_octaves(&mut self, octaves: f64) {
        self.settings.set_pitch_octaves(octaves);
        self.apply_settings();
    }

    pub fn set_pitch_semitones(&mut self, semitones: f64) {
        self.settings.set_pitch_semitones(semitones);
        self.apply_settings();
    }

    pub fn apply_preset(&mut self, preset: VoicePreset) {
        preset.apply(&mut self.settings);
        info!(preset = preset.name(), "Voice preset applied");
        self.apply_settings();
    }

    pub fn tempo(&self) -> f64 {
        self.settings.tempo()
    }

    pub fn rate(&self) -> f64 {
        self.settings.rate()
    }

    pub fn pitch(&self) -> f64 {
        self.settings.pitch()
    }

    pub fn effective_tempo(&self) -> f64 {
        self.settings.effective_tempo()
    }

    pub fn effective_rate(&self) -> f64 {
        self.settings.effective_rate()
    }

    fn apply_settings(&mut self) {
        let tempo = self.settings.effective_tempo();
        let rate = self.settings.effective_rate();
        self.stretch.set_tempo(tempo);
        if let Err(e) = self.rate_stage.set_rate(rate) {
            warn!(error = %e, rate, "Failed to update rate stage");
        }
        self.rate_first = rate < 1.0;
        debug!(tempo, rate, rate_first = self.rate_first, "Effective factors");
    }

    /// Feed PCM and collect output.
    ///
    /// Writes at most `target.len()` bytes of whole frames and returns the
    /// number written. Output that does not fit stays buffered.
    pub fn process(&mut self, source: &[u8], target: &mut [u8]) -> Result<usize> {
        self.put_bytes(source)?;
        Ok(self.receive(target))
    }

    /// Feed PCM without collecting output.
    pub fn put_bytes(&mut self, source: &[u8]) -> Result<()> {
        let frame_bytes = self.frame_bytes();
        let mut decoded = std::mem::take(&mut self.decoded);
        decoded.clear();

        let mut bytes = source;
        if !self.partial.is_empty() {
            let take = (frame_bytes - self.partial.len()).min(bytes.len());
            self.partial.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if self.partial.len() == frame_bytes {
                pcm::decode_i16le(&self.partial, &mut decoded);
                self.partial.clear();
            }
        }
        let whole = bytes.len() / frame_bytes * frame_bytes;
        pcm::decode_i16le(&bytes[..whole], &mut decoded);
        self.partial.extend_from_slice(&bytes[whole..]);

        let result = self.put_samples(&decoded);
        self.decoded = decoded;
        result
    }

    /// Feed interleaved normalized samples.
    pub fn put_samples(&mut self, samples: &[f32]) -> Result<()> {
        let frames = samples.len() / self.channels;
        if frames == 0 {
            return Ok(());
        }
        self.expected_frames += frames as f64 / self.settings.speed();
        self.run(&samples[..frames * self.channels])
    }

    fn run(&mut self, input: &[f32]) -> Result<()> {
        self.between.clear();
        self.stage_out.clear();
        if self.rate_first {
            self.rate_stage.process(input, &mut self.between)?;
            self.stretch.process(&self.between, &mut self.stage_out);
        } else {
            self.stretch.process(input, &mut self.between);
            self.rate_stage.process(&self.between, &mut self.stage_out)?;
        }
        let frames = self.stage_out.len() / self.channels;
        self.produced_frames += frames as u64;
        self.output.put(&self.stage_out[..frames * self.channels]);
        trace!(
            input_frames = input.len() / self.channels,
            output_frames = frames,
            "Processed block"
        );
        Ok(())
    }

    /// Drain already-processed output into `target`.
    pub fn receive(&mut self, target: &mut [u8]) -> usize {
        let frame_bytes = self.frame_bytes();
        let frames = (target.len() / frame_bytes).min(self.available_frames());
        if frames == 0 {
            return 0;
        }
        let from_backlog = frames.min(self.backlog_frames);
        self.backlog_frames -= from_backlog;
        self.released_frames += (frames - from_backlog) as u64;

        let bytes = frames * frame_bytes;
        pcm::encode_i16le(
            self.output.frames_slice(0, frames),
            self.config.dither,
            &mut target[..bytes],
        );
        self.output.consume(frames);
        bytes
    }

    /// Finish the stream: push everything still inside the stages out.
    ///
    /// Total output since the last flush becomes exactly
    /// `round(Σ input_frames / (tempo·rate))`. Stages are reset afterwards;
    /// output beyond `target` stays available to [`receive`].
    ///
    /// [`receive`]: AudioTransformer::receive
    pub fn flush(&mut self, target: &mut [u8]) -> Result<usize> {
        if !self.partial.is_empty() {
            debug!(bytes = self.partial.len(), "Dropping incomplete frame at flush");
            self.partial.clear();
        }

        let goal = self.expected_frames.round() as u64;
        if self.produced_frames < goal {
            let missing = goal - self.produced_frames;
            let estimate = (missing as f64 * self.settings.speed()).ceil() as usize
                + self.latency_frames();
            let block = FLUSH_BLOCK_FRAMES.max(self.stretch.sample_req());
            let max_rounds = estimate / block + FLUSH_EXTRA_ROUNDS;
            let silence = vec![0.0f32; block * self.channels];

            let mut rounds = 0;
            while self.produced_frames < goal && rounds < max_rounds {
                self.run(&silence)?;
                rounds += 1;
            }
            if self.produced_frames < goal {
                let short = goal - self.produced_frames;
                warn!(short, "Pipeline did not drain, padding output with silence");
                self.output.put_silence(short as usize);
                self.produced_frames = goal;
            }
        }
        if self.produced_frames > goal {
            // Never received: receive holds back frames past the expected count
            self.output
                .truncate_back((self.produced_frames - goal) as usize);
        }
        debug!(frames = goal, "Flushed");

        self.stretch.clear();
        self.rate_stage.reset();
        self.reset_counters();
        self.backlog_frames = self.output.frames();
        Ok(self.receive(target))
    }

    /// Drop all buffered audio and stage state.
    pub fn clear(&mut self) {
        self.partial.clear();
        self.output.clear();
        self.stretch.clear();
        self.rate_stage.reset();
        self.reset_counters();
    }

    /// Output frames ready to be received.
    ///
    /// While a stream is running, output is released only up to the length
    /// the input so far should produce.
    pub fn available_frames(&self) -> usize {
        let stream = (self.expected_frames.round() as u64).saturating_sub(self.released_frames);
        (self.backlog_frames + stream as usize).min(self.output.frames())
    }

    /// Input frames needed before output starts, for the current settings.
    pub fn latency_frames(&self) -> usize {
        let stretch = if self.stretch.is_passthrough() {
            0
        } else {
            self.stretch.sample_req()
        };
        let rate = self.rate_stage.latency_frames();
        if self.rate_first {
            rate + (stretch as f64 * self.settings.effective_rate()).ceil() as usize
        } else if stretch == 0 {
            rate
        } else {
            stretch
        }
    }

    fn reset_counters(&mut self) {
        self.expected_frames = 0.0;
        self.produced_frames = 0;
        self.released_frames = 0;
        self.backlog_frames = 0;
    }

    fn frame_bytes(&self) -> usize {
        self.channels * SAMPLE_BYTES
    }

    fn has_buffered_audio(&self) -> bool {
        !self.partial.is_empty()
            || !self.output.is_empty()
            || !self.stretch.is_pristine()
            || self.produced_frames > 0
    }
}

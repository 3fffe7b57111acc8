//! Real-time tempo, rate and pitch transformation for interleaved PCM.
//!
//! Provides:
//! - WSOLA time stretching (tempo without pitch)
//! - Interpolating and sinc transposers with anti-alias filtering (rate)
//! - Pitch as a combination of the two
//! - A streaming [`AudioTransformer`] over 16-bit little-endian PCM
//! - Voice-changer presets

pub mod aa_filter;
pub mod config;
pub mod engine;
pub mod error;
pub mod fifo;
pub mod pcm;
pub mod preset;
pub mod rate;
pub mod settings;
pub mod stretch;
pub mod transposer;

pub use config::{EngineConfig, Interpolation, StretchParams};
pub use engine::AudioTransformer;
pub use error::{Result, TempoError};
pub use preset::VoicePreset;
pub use settings::Settings;

/// Version of the transform engine.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

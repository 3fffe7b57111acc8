//! Caller-facing surface over the screenlive engines.
//!
//! Provides:
//! - [`RtmpClient`] and [`SoundTouch`] wrappers that report failure through
//!   sentinel return values
//! - Handle-based entry points (`rtmp_*`, `soundtouch_*`) over
//!   generational registries
//! - Version getters for both engines

pub mod handle;
pub mod raw;
pub mod rtmp_client;
pub mod sound_touch;

pub use handle::{Handle, HandleTable, NULL_HANDLE};
pub use raw::*;
pub use rtmp_client::RtmpClient;
pub use sound_touch::SoundTouch;

pub use screenlive_rtmp::SessionConfig;
pub use screenlive_tempo::{EngineConfig, VoicePreset};

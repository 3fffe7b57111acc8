//! Handle-based entry points.
//!
//! Instances live in process-wide registries and are addressed by `u64`
//! handles; 0 is the null handle and every function accepts it. A handle
//! is invalid once closed or deleted, even if its slot is reused.

use screenlive_rtmp::{RtmpSession, SessionConfig, SessionMode};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::handle::{Handle, HandleTable, NULL_HANDLE};
use crate::rtmp_client::{read_session, write_session};
use crate::sound_touch::SoundTouch;

static RTMP_SESSIONS: OnceLock<HandleTable<RtmpSession>> = OnceLock::new();
static SOUND_TOUCH: OnceLock<HandleTable<SoundTouch>> = OnceLock::new();

fn rtmp_sessions() -> &'static HandleTable<RtmpSession> {
    RTMP_SESSIONS.get_or_init(HandleTable::new)
}

fn sound_touch() -> &'static HandleTable<SoundTouch> {
    SOUND_TOUCH.get_or_init(HandleTable::new)
}

/// Open an RTMP session. Returns 0 on failure.
pub fn rtmp_open(url: &str, is_publish: bool) -> Handle {
    rtmp_open_with_config(url, is_publish, SessionConfig::default())
}

pub fn rtmp_open_with_config(url: &str, is_publish: bool, config: SessionConfig) -> Handle {
    let mode = SessionMode::from_publish_flag(is_publish);
    match RtmpSession::open(url, mode, config) {
        Ok(session) => {
            let handle = rtmp_sessions().insert(session);
            debug!(handle, "RTMP session registered");
            handle
        }
        Err(e) => {
            warn!(url, error = %e, "RTMP open failed");
            NULL_HANDLE
        }
    }
}

/// Read into `buf[offset..offset + size]`; see [`RtmpClient::read`].
///
/// [`RtmpClient::read`]: crate::RtmpClient::read
pub fn rtmp_read(handle: Handle, buf: &mut [u8], offset: usize, size: usize) -> i32 {
    match rtmp_sessions().get(handle) {
        Some(session) => read_session(&session, buf, offset, size),
        None => 0,
    }
}

/// Send `buf[..size]`. Returns 1 on success, 0 on failure.
pub fn rtmp_write(handle: Handle, buf: &[u8], size: usize, message_type: u8, timestamp: u32) -> i32 {
    match rtmp_sessions().get(handle) {
        Some(session) => write_session(&session, buf, size, message_type, timestamp) as i32,
        None => 0,
    }
}

pub fn rtmp_is_connected(handle: Handle) -> bool {
    rtmp_sessions()
        .get(handle)
        .is_some_and(|s| s.is_connected())
}

/// Close and unregister a session. Unknown handles are ignored.
pub fn rtmp_close(handle: Handle) {
    if let Some(session) = rtmp_sessions().remove(handle) {
        session.close();
        debug!(handle, "RTMP session unregistered");
    }
}

/// Create an audio transformer. Returns 0 on failure.
pub fn soundtouch_new() -> Handle {
    let st = SoundTouch::new();
    if st.is_released() {
        return NULL_HANDLE;
    }
    sound_touch().insert(st)
}

fn with_sound_touch<R>(handle: Handle, default: R, f: impl FnOnce(&SoundTouch) -> R) -> R {
    match sound_touch().get(handle) {
        Some(st) => f(&st),
        None => default,
    }
}

pub fn soundtouch_set_audio_format(handle: Handle, sample_rate: u32, channels: usize) -> bool {
    with_sound_touch(handle, false, |st| st.set_audio_format(sample_rate, channels))
}

pub fn soundtouch_set_tempo(handle: Handle, tempo: f64) {
    with_sound_touch(handle, (), |st| st.set_tempo(tempo))
}

pub fn soundtouch_set_tempo_change(handle: Handle, percent: f64) {
    with_sound_touch(handle, (), |st| st.set_tempo_change(percent))
}

pub fn soundtouch_set_rate(handle: Handle, rate: f64) {
    with_sound_touch(handle, (), |st| st.set_rate(rate))
}

pub fn soundtouch_set_rate_change(handle: Handle, percent: f64) {
    with_sound_touch(handle, (), |st| st.set_rate_change(percent))
}

pub fn soundtouch_set_pitch(handle: Handle, pitch: f64) {
    with_sound_touch(handle, (), |st| st.set_pitch(pitch))
}

pub fn soundtouch_set_pitch_octaves(handle: Handle, octaves: f64) {
    with_sound_touch(handle, (), |st| st.set_pitch_octaves(octaves))
}

pub fn soundtouch_set_pitch_semitones(handle: Handle, semitones: f64) {
    with_sound_touch(handle, (), |st| st.set_pitch_semitones(semitones))
}

pub fn soundtouch_process(handle: Handle, source: &[u8], source_size: usize, target: &mut [u8]) -> i32 {
    with_sound_touch(handle, 0, |st| st.process(source, source_size, target))
}

pub fn soundtouch_flush(handle: Handle, target: &mut [u8]) -> i32 {
    with_sound_touch(handle, 0, |st| st.flush(target))
}

/// Release and unregister a transformer. Unknown handles are ignored.
pub fn soundtouch_delete(handle: Handle) {
    if let Some(st) = sound_touch().remove(handle) {
        st.release();
    }
}

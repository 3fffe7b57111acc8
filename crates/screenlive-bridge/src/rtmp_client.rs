//! RTMP client with sentinel-valued results.

use parking_lot::Mutex;
use screenlive_rtmp::{RtmpError, RtmpSession, SessionConfig, SessionMode};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Caller-facing RTMP client.
///
/// Every method reports failure through its return value; nothing panics
/// or returns an error type. `read` and `write` may run on different
/// threads, and `close` unblocks both.
pub struct RtmpClient {
    config: SessionConfig,
    session: Mutex<Option<Arc<RtmpSession>>>,
}

impl RtmpClient {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    pub fn version() -> &'static str {
        screenlive_rtmp::VERSION
    }

    /// Open a session. Any previous session is closed first.
    pub fn connect(&self, url: &str, publish: bool) -> bool {
        self.close();
        let mode = SessionMode::from_publish_flag(publish);
        match RtmpSession::open(url, mode, self.config.clone()) {
            Ok(session) => {
                *self.session.lock() = Some(Arc::new(session));
                true
            }
            Err(e) => {
                warn!(url, error = %e, "RTMP connect failed");
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.current().is_some_and(|s| s.is_connected())
    }

    /// Read into `buf[offset..offset + size]`.
    ///
    /// Returns the byte count, 0 when nothing is available or the session is
    /// closed, and a negative value on a fatal stream error.
    pub fn read(&self, buf: &mut [u8], offset: usize, size: usize) -> i32 {
        match self.current() {
            Some(session) => read_session(&session, buf, offset, size),
            None => 0,
        }
    }

    /// Send `buf[..size]` as one message of `message_type`.
    pub fn write(&self, buf: &[u8], size: usize, message_type: u8, timestamp: u32) -> bool {
        match self.current() {
            Some(session) => write_session(&session, buf, size, message_type, timestamp),
            None => false,
        }
    }

    /// Close the session. Safe to call at any time, any number of times.
    pub fn close(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.close();
            info!("RTMP client closed");
        }
    }

    fn current(&self) -> Option<Arc<RtmpSession>> {
        self.session.lock().clone()
    }
}

impl Default for RtmpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RtmpClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Clamp `offset..offset + size` to `len`.
pub(crate) fn clamp_range(len: usize, offset: usize, size: usize) -> std::ops::Range<usize> {
    let start = offset.min(len);
    let end = start.saturating_add(size).min(len);
    start..end
}

pub(crate) fn read_session(session: &RtmpSession, buf: &mut [u8], offset: usize, size: usize) -> i32 {
    let range = clamp_range(buf.len(), offset, size);
    if range.len() < size {
        debug!(len = buf.len(), offset, size, "Read range clamped to buffer");
    }
    match session.read(&mut buf[range]) {
        Ok(n) => n.min(i32::MAX as usize) as i32,
        Err(e) if e.is_fatal() => {
            warn!(error = %e, "RTMP read failed");
            -1
        }
        Err(RtmpError::StreamClosed) => 0,
        Err(e) => {
            debug!(error = %e, "RTMP read returned nothing");
            0
        }
    }
}

pub(crate) fn write_session(
    session: &RtmpSession,
    buf: &[u8],
    size: usize,
    message_type: u8,
    timestamp: u32,
) -> bool {
    let payload = &buf[..size.min(buf.len())];
    match session.write(payload, message_type, timestamp) {
        Ok(_) => true,
        Err(e) => {
            debug!(error = %e, message_type, "RTMP write failed");
            false
        }
    }
}

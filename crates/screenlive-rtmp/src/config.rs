//! Session configuration.

use std::time::Duration;

/// How play-mode reads present media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadFormat {
    /// One raw message payload per logical read.
    #[default]
    Raw,
    /// An FLV byte stream: file header first, then one tag per message.
    Flv,
}

/// Tunables for an [`RtmpSession`](crate::RtmpSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Bound on each handshake read.
    pub handshake_timeout: Duration,
    /// How long to wait for each command reply during open.
    pub command_timeout: Duration,
    /// Longest a single `read` blocks before returning 0.
    pub read_timeout: Duration,
    /// Socket write timeout.
    pub write_timeout: Duration,
    /// Outgoing chunk size announced after the handshake.
    pub chunk_size: u32,
    /// Window Acknowledgement Size announced to the server.
    pub window_ack_size: u32,
    /// Client buffer length sent with `play`.
    pub buffer_length_ms: u32,
    pub flash_version: String,
    /// Fail the handshake when S2 does not echo C1.
    pub strict_handshake: bool,
    pub read_format: ReadFormat,
    /// Received media messages buffered ahead of `read`.
    pub media_queue_capacity: usize,
    pub command_queue_capacity: usize,
    /// Largest incoming message accepted before the stream is treated as corrupt.
    pub max_message_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            chunk_size: 4096,
            window_ack_size: 2_500_000,
            buffer_length_ms: 3000,
            flash_version: "LNX 9,0,124,2".to_string(),
            strict_handshake: true,
            read_format: ReadFormat::Raw,
            media_queue_capacity: 1024,
            command_queue_capacity: 64,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

impl SessionConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Outgoing chunk size, clamped to 128..=65536.
    pub fn with_chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.clamp(128, 65_536);
        self
    }

    pub fn with_window_ack_size(mut self, size: u32) -> Self {
        self.window_ack_size = size;
        self
    }

    pub fn with_buffer_length_ms(mut self, ms: u32) -> Self {
        self.buffer_length_ms = ms;
        self
    }

    pub fn with_flash_version(mut self, version: impl Into<String>) -> Self {
        self.flash_version = version.into();
        self
    }

    pub fn with_strict_handshake(mut self, strict: bool) -> Self {
        self.strict_handshake = strict;
        self
    }

    pub fn with_read_format(mut self, format: ReadFormat) -> Self {
        self.read_format = format;
        self
    }

    pub fn with_media_queue_capacity(mut self, capacity: usize) -> Self {
        self.media_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_max_message_size(mut self, size: u32) -> Self {
        self.max_message_size = size;
        self
    }
}

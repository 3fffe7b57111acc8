//! RTMP client session engine.
//!
//! Provides:
//! - URL parsing and the C0/C1/C2 handshake
//! - Chunk stream framing with header compression
//! - AMF0 / AMF3 encoding and decoding
//! - Publish and play sessions with a background receive thread
//! - FLV packaging for H.264/AAC and a queued publish pusher

pub mod amf0;
pub mod amf3;
pub mod chunk;
pub mod command;
pub mod config;
pub mod error;
pub mod flv;
pub mod handshake;
pub mod message;
pub mod pusher;
pub mod session;
pub mod url;

pub use amf0::AmfValue;
pub use amf3::Amf3Value;
pub use chunk::{ChunkReader, ChunkWriter};
pub use config::{ReadFormat, SessionConfig};
pub use error::{AmfError, HandshakeError, Result, RtmpError};
pub use flv::{FlvMetadata, FlvTag};
pub use message::{MessageType, RtmpMessage, UserControlEvent};
pub use pusher::{FlvPacket, PacketKind, PacketSink, PusherConfig, RtmpPusher};
pub use session::{RtmpSession, SessionMode, SessionState};
pub use url::RtmpUrl;

/// Version of the RTMP engine.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

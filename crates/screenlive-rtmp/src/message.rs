//! RTMP message types and protocol control messages.

use crate::error::{Result, RtmpError};

/// Standard RTMP message type IDs.
pub mod type_ids {
    pub const SET_CHUNK_SIZE: u8 = 1;
    pub const ABORT: u8 = 2;
    pub const ACKNOWLEDGEMENT: u8 = 3;
    pub const USER_CONTROL: u8 = 4;
    pub const WINDOW_ACK_SIZE: u8 = 5;
    pub const SET_PEER_BANDWIDTH: u8 = 6;
    pub const AUDIO: u8 = 8;
    pub const VIDEO: u8 = 9;
    pub const DATA_AMF3: u8 = 15;
    pub const SHARED_OBJECT_AMF3: u8 = 16;
    pub const COMMAND_AMF3: u8 = 17;
    pub const DATA_AMF0: u8 = 18;
    pub const SHARED_OBJECT_AMF0: u8 = 19;
    pub const COMMAND_AMF0: u8 = 20;
    pub const AGGREGATE: u8 = 22;
}

/// Chunk stream IDs used for outgoing messages.
pub mod chunk_streams {
    pub const PROTOCOL: u32 = 2;
    pub const COMMAND: u32 = 3;
    pub const VIDEO: u32 = 4;
    pub const AUDIO: u32 = 5;
}

/// Classified message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    SetChunkSize,
    Abort,
    Acknowledgement,
    UserControl,
    WindowAckSize,
    SetPeerBandwidth,
    Audio,
    Video,
    DataAmf3,
    SharedObjectAmf3,
    CommandAmf3,
    DataAmf0,
    SharedObjectAmf0,
    CommandAmf0,
    Aggregate,
    Unknown(u8),
}

impl MessageType {
    /// Map a wire type ID.
    pub fn from_id(id: u8) -> Self {
        use type_ids::*;
        match id {
            SET_CHUNK_SIZE => Self::SetChunkSize,
            ABORT => Self::Abort,
            ACKNOWLEDGEMENT => Self::Acknowledgement,
            USER_CONTROL => Self::UserControl,
            WINDOW_ACK_SIZE => Self::WindowAckSize,
            SET_PEER_BANDWIDTH => Self::SetPeerBandwidth,
            AUDIO => Self::Audio,
            VIDEO => Self::Video,
            DATA_AMF3 => Self::DataAmf3,
            SHARED_OBJECT_AMF3 => Self::SharedObjectAmf3,
            COMMAND_AMF3 => Self::CommandAmf3,
            DATA_AMF0 => Self::DataAmf0,
            SHARED_OBJECT_AMF0 => Self::SharedObjectAmf0,
            COMMAND_AMF0 => Self::CommandAmf0,
            AGGREGATE => Self::Aggregate,
            other => Self::Unknown(other),
        }
    }

    /// Wire type ID.
    pub fn id(&self) -> u8 {
        use type_ids::*;
        match self {
            Self::SetChunkSize => SET_CHUNK_SIZE,
            Self::Abort => ABORT,
            Self::Acknowledgement => ACKNOWLEDGEMENT,
            Self::UserControl => USER_CONTROL,
            Self::WindowAckSize => WINDOW_ACK_SIZE,
            Self::SetPeerBandwidth => SET_PEER_BANDWIDTH,
            Self::Audio => AUDIO,
            Self::Video => VIDEO,
            Self::DataAmf3 => DATA_AMF3,
            Self::SharedObjectAmf3 => SHARED_OBJECT_AMF3,
            Self::CommandAmf3 => COMMAND_AMF3,
            Self::DataAmf0 => DATA_AMF0,
            Self::SharedObjectAmf0 => SHARED_OBJECT_AMF0,
            Self::CommandAmf0 => COMMAND_AMF0,
            Self::Aggregate => AGGREGATE,
            Self::Unknown(id) => *id,
        }
    }

    /// Protocol control messages (types 1-6) travel on chunk stream 2 / stream 0.
    pub fn is_protocol_control(&self) -> bool {
        matches!(
            self,
            Self::SetChunkSize
                | Self::Abort
                | Self::Acknowledgement
                | Self::UserControl
                | Self::WindowAckSize
                | Self::SetPeerBandwidth
        )
    }

    /// Audio, video and script data messages delivered to a play-mode reader.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            Self::Audio | Self::Video | Self::DataAmf0 | Self::DataAmf3
        )
    }

    /// Chunk stream used when sending a message of this type.
    pub fn outgoing_chunk_stream(&self) -> u32 {
        match self {
            t if t.is_protocol_control() => chunk_streams::PROTOCOL,
            Self::Video => chunk_streams::VIDEO,
            Self::Audio => chunk_streams::AUDIO,
            _ => chunk_streams::COMMAND,
        }
    }
}

/// Single reassembled RTMP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpMessage {
    pub message_type: MessageType,
    /// Timestamp in milliseconds.
    pub timestamp: u32,
    /// Message stream ID.
    pub stream_id: u32,
    pub payload: Vec<u8>,
}

impl RtmpMessage {
    pub fn new(message_type: MessageType, timestamp: u32, stream_id: u32, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            timestamp,
            stream_id,
            payload,
        }
    }

    /// Set Chunk Size (type 1). The top bit must be zero.
    pub fn set_chunk_size(size: u32) -> Self {
        Self::control(MessageType::SetChunkSize, (size & 0x7FFF_FFFF).to_be_bytes().to_vec())
    }

    /// Abort Message (type 2).
    pub fn abort(chunk_stream_id: u32) -> Self {
        Self::control(MessageType::Abort, chunk_stream_id.to_be_bytes().to_vec())
    }

    /// Acknowledgement (type 3) with the running received byte count.
    pub fn acknowledgement(sequence_number: u32) -> Self {
        Self::control(MessageType::Acknowledgement, sequence_number.to_be_bytes().to_vec())
    }

    /// Window Acknowledgement Size (type 5).
    pub fn window_ack_size(size: u32) -> Self {
        Self::control(MessageType::WindowAckSize, size.to_be_bytes().to_vec())
    }

    /// Set Peer Bandwidth (type 6).
    pub fn set_peer_bandwidth(size: u32, limit: BandwidthLimit) -> Self {
        let mut payload = size.to_be_bytes().to_vec();
        payload.push(limit as u8);
        Self::control(MessageType::SetPeerBandwidth, payload)
    }

    /// User Control (type 4).
    pub fn user_control(event: UserControlEvent) -> Self {
        Self::control(MessageType::UserControl, event.serialize())
    }

    fn control(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self::new(message_type, 0, 0, payload)
    }

    /// Read the 4-byte big-endian value carried by types 1, 2, 3, 5 and 6.
    pub fn control_value(&self) -> Result<u32> {
        read_u32(&self.payload, 0).ok_or_else(|| {
            RtmpError::FatalStream(format!(
                "{:?} payload too short: {} bytes",
                self.message_type,
                self.payload.len()
            ))
        })
    }
}

/// Set Peer Bandwidth limit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthLimit {
    Hard = 0,
    Soft = 1,
    Dynamic = 2,
}

/// User Control event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserControlEvent {
    StreamBegin(u32),
    StreamEof(u32),
    StreamDry(u32),
    SetBufferLength { stream_id: u32, buffer_ms: u32 },
    StreamIsRecorded(u32),
    PingRequest(u32),
    PingResponse(u32),
    Unknown(u16),
}

impl UserControlEvent {
    pub fn serialize(&self) -> Vec<u8> {
        let (event_type, a, b): (u16, u32, Option<u32>) = match *self {
            Self::StreamBegin(id) => (0, id, None),
            Self::StreamEof(id) => (1, id, None),
            Self::StreamDry(id) => (2, id, None),
            Self::SetBufferLength { stream_id, buffer_ms } => (3, stream_id, Some(buffer_ms)),
            Self::StreamIsRecorded(id) => (4, id, None),
            Self::PingRequest(ts) => (6, ts, None),
            Self::PingResponse(ts) => (7, ts, None),
            Self::Unknown(t) => (t, 0, None),
        };
        let mut buf = Vec::with_capacity(10);
        buf.extend_from_slice(&event_type.to_be_bytes());
        buf.extend_from_slice(&a.to_be_bytes());
        if let Some(b) = b {
            buf.extend_from_slice(&b.to_be_bytes());
        }
        buf
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(RtmpError::FatalStream("user control message too short".into()));
        }
        let event_type = u16::from_be_bytes([data[0], data[1]]);
        let value = || {
            read_u32(data, 2).ok_or_else(|| {
                RtmpError::FatalStream(format!("user control event {} truncated", event_type))
            })
        };
        Ok(match event_type {
            0 => Self::StreamBegin(value()?),
            1 => Self::StreamEof(value()?),
            2 => Self::StreamDry(value()?),
            3 => Self::SetBufferLength {
                stream_id: value()?,
                buffer_ms: read_u32(data, 6).ok_or_else(|| {
                    RtmpError::FatalStream("SetBufferLength truncated".into())
                })?,
            },
            4 => Self::StreamIsRecorded(value()?),
            6 => Self::PingRequest(value()?),
            7 => Self::PingResponse(value()?),
            other => Self::Unknown(other),
        })
    }
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

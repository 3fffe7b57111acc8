//! Chunk stream framing: message to chunk serialization and chunk to message
//! reassembly.
//!
//! Both directions keep per-chunk-stream header state so that headers can be
//! compressed (writer) and decompressed (reader) with formats 0-3.

use crate::error::{Result, RtmpError};
use crate::message::{MessageType, RtmpMessage};
use std::collections::HashMap;
use std::io::{ErrorKind, Read};

/// Chunk size both peers assume until a Set Chunk Size message arrives.
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Largest chunk size allowed by the protocol (top bit must be zero).
pub const MAX_CHUNK_SIZE: u32 = 0x7FFF_FFFF;

/// Largest payload a 24-bit message length field can carry.
pub const MAX_MESSAGE_LEN: usize = 0x00FF_FFFF;

/// Timestamp field value signalling a 4-byte extended timestamp.
const EXTENDED_TIMESTAMP: u32 = 0x00FF_FFFF;

/// Lowest and highest encodable chunk stream IDs.
pub const MIN_CHUNK_STREAM_ID: u32 = 2;
pub const MAX_CHUNK_STREAM_ID: u32 = 65_599;

/// Chunk message header format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFormat {
    /// 11 bytes: absolute timestamp, length, type, stream ID.
    Full = 0,
    /// 7 bytes: timestamp delta, length, type.
    SameStream = 1,
    /// 3 bytes: timestamp delta.
    TimestampOnly = 2,
    /// No message header.
    Continuation = 3,
}

/// Serialize the basic header for a chunk stream ID.
///
/// Uses the 1, 2 or 3 byte form depending on the ID range.
pub fn write_basic_header(out: &mut Vec<u8>, format: ChunkFormat, csid: u32) {
    let fmt = (format as u8) << 6;
    match csid {
        2..=63 => out.push(fmt | csid as u8),
        64..=319 => {
            out.push(fmt);
            out.push((csid - 64) as u8);
        }
        _ => {
            let id = csid - 64;
            out.push(fmt | 1);
            out.push((id & 0xFF) as u8);
            out.push((id >> 8) as u8);
        }
    }
}

fn put_u24(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes()[1..]);
}

#[derive(Debug, Clone, Copy)]
struct OutgoingState {
    timestamp: u32,
    delta: u32,
    length: u32,
    type_id: u8,
    stream_id: u32,
}

/// Splits messages into chunks with header compression.
#[derive(Debug)]
pub struct ChunkWriter {
    chunk_size: u32,
    streams: HashMap<u32, OutgoingState>,
}

impl Default for ChunkWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkWriter {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
        }
    }

    /// Current outgoing chunk size.
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Change the outgoing chunk size.
    ///
    /// The caller is responsible for sending the matching Set Chunk Size
    /// message before any chunk encoded with the new size.
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    /// Serialize `message` on chunk stream `csid`, appending to `out`.
    pub fn encode(&mut self, message: &RtmpMessage, csid: u32, out: &mut Vec<u8>) {
        self.encode_parts(
            message.message_type,
            message.timestamp,
            message.stream_id,
            &message.payload,
            csid,
            out,
        );
    }

    /// Serialize a message given as parts, avoiding a payload copy.
    ///
    /// Callers must keep `payload` within [`MAX_MESSAGE_LEN`].
    pub fn encode_parts(
        &mut self,
        message_type: MessageType,
        timestamp: u32,
        stream_id: u32,
        payload: &[u8],
        csid: u32,
        out: &mut Vec<u8>,
    ) {
        let csid = csid.clamp(MIN_CHUNK_STREAM_ID, MAX_CHUNK_STREAM_ID);
        debug_assert!(payload.len() <= MAX_MESSAGE_LEN);
        let length = payload.len() as u32;
        let type_id = message_type.id();

        let (format, field, delta) = match self.streams.get(&csid) {
            Some(prev) if prev.stream_id == stream_id && timestamp >= prev.timestamp => {
                let delta = timestamp - prev.timestamp;
                if prev.length != length || prev.type_id != type_id {
                    (ChunkFormat::SameStream, delta, delta)
                } else if prev.delta != delta {
                    (ChunkFormat::TimestampOnly, delta, delta)
                } else {
                    (ChunkFormat::Continuation, delta, delta)
                }
            }
            // First use, stream change, or timestamp going backwards
            _ => (ChunkFormat::Full, timestamp, timestamp),
        };

        let extended = field >= EXTENDED_TIMESTAMP;
        let field24 = if extended { EXTENDED_TIMESTAMP } else { field };

        write_basic_header(out, format, csid);
        match format {
            ChunkFormat::Full => {
                put_u24(out, field24);
                put_u24(out, length);
                out.push(type_id);
                out.extend_from_slice(&stream_id.to_le_bytes());
            }
            ChunkFormat::SameStream => {
                put_u24(out, field24);
                put_u24(out, length);
                out.push(type_id);
            }
            ChunkFormat::TimestampOnly => put_u24(out, field24),
            ChunkFormat::Continuation => {}
        }
        if extended {
            out.extend_from_slice(&field.to_be_bytes());
        }

        let mut chunks = payload.chunks(self.chunk_size as usize);
        if let Some(first) = chunks.next() {
            out.extend_from_slice(first);
        }
        for chunk in chunks {
            write_basic_header(out, ChunkFormat::Continuation, csid);
            if extended {
                out.extend_from_slice(&field.to_be_bytes());
            }
            out.extend_from_slice(chunk);
        }

        self.streams.insert(
            csid,
            OutgoingState {
                timestamp,
                delta,
                length,
                type_id,
                stream_id,
            },
        );
    }

    /// Serialize a message on its default outgoing chunk stream.
    pub fn encode_default(&mut self, message: &RtmpMessage, out: &mut Vec<u8>) {
        self.encode(message, message.message_type.outgoing_chunk_stream(), out);
    }
}

#[derive(Debug, Default)]
struct IncomingState {
    has_header: bool,
    timestamp: u32,
    delta: u32,
    length: u32,
    type_id: u8,
    stream_id: u32,
    extended: bool,
    payload: Vec<u8>,
}

/// Reassembles messages from a chunked byte stream.
pub struct ChunkReader<R> {
    inner: R,
    chunk_size: u32,
    max_message_size: u32,
    streams: HashMap<u32, IncomingState>,
    bytes_read: u64,
    at_eof: bool,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(inner: R, max_message_size: u32) -> Self {
        Self {
            inner,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_message_size,
            streams: HashMap::new(),
            bytes_read: 0,
            at_eof: false,
        }
    }

    /// Apply a peer Set Chunk Size. Affects subsequent chunks only.
    pub fn set_chunk_size(&mut self, size: u32) -> Result<()> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(RtmpError::FatalStream(format!("invalid chunk size {}", size)));
        }
        self.chunk_size = size;
        Ok(())
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Total bytes consumed from the underlying stream.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Count bytes consumed outside this reader (handshake) toward the ack window.
    pub fn add_bytes_read(&mut self, n: u64) {
        self.bytes_read += n;
    }

    /// Discard a partially received message (Abort Message).
    pub fn abort(&mut self, csid: u32) {
        if let Some(state) = self.streams.get_mut(&csid) {
            state.payload.clear();
        }
    }

    /// Read chunks until one message is complete.
    ///
    /// Returns `Ok(None)` on a clean end of stream at a chunk boundary.
    pub fn read_message(&mut self) -> Result<Option<RtmpMessage>> {
        loop {
            if let Some(message) = self.read_chunk()? {
                return Ok(Some(message));
            }
            if self.at_eof {
                if self.streams.values().any(|s| !s.payload.is_empty()) {
                    return Err(RtmpError::FatalStream(
                        "stream ended inside a message".into(),
                    ));
                }
                return Ok(None);
            }
        }
    }

    fn read_chunk(&mut self) -> Result<Option<RtmpMessage>> {
        let mut first = [0u8; 1];
        if !self.read_first(&mut first)? {
            return Ok(None);
        }

        let format = first[0] >> 6;
        let csid = match first[0] & 0x3F {
            0 => {
                let b = self.read_u8()?;
                64 + b as u32
            }
            1 => {
                let mut b = [0u8; 2];
                self.read_full(&mut b)?;
                64 + b[0] as u32 + ((b[1] as u32) << 8)
            }
            id => id as u32,
        };

        let mut header = [0u8; 11];
        let header_len = match format {
            0 => 11,
            1 => 7,
            2 => 3,
            _ => 0,
        };
        self.read_full(&mut header[..header_len])?;

        let state = self.streams.entry(csid).or_default();
        if format != 3 && !state.payload.is_empty() {
            return Err(RtmpError::FatalStream(format!(
                "chunk stream {} got a fmt {} header mid-message",
                csid, format
            )));
        }
        if format == 3 && !state.has_header {
            return Err(RtmpError::FatalStream(format!(
                "continuation chunk on unknown chunk stream {}",
                csid
            )));
        }

        let starting = state.payload.is_empty();
        let mut field = 0u32;
        if format <= 2 {
            field = u24(&header[0..3]);
            state.extended = field == EXTENDED_TIMESTAMP;
        }
        if format <= 1 {
            state.length = u24(&header[3..6]);
            state.type_id = header[6];
        }
        if format == 0 {
            state.stream_id =
                u32::from_le_bytes([header[7], header[8], header[9], header[10]]);
        }
        state.has_header = true;
        let extended = state.extended;

        if extended {
            let mut ext = [0u8; 4];
            self.read_full(&mut ext)?;
            field = u32::from_be_bytes(ext);
        }

        let state = self
            .streams
            .get_mut(&csid)
            .ok_or_else(|| RtmpError::FatalStream("chunk stream state lost".into()))?;

        match format {
            0 => {
                state.timestamp = field;
                state.delta = field;
            }
            1 | 2 => {
                state.delta = field;
                state.timestamp = state.timestamp.wrapping_add(field);
            }
            _ => {
                if starting {
                    if extended {
                        state.delta = field;
                    }
                    state.timestamp = state.timestamp.wrapping_add(state.delta);
                }
            }
        }

        if state.length > self.max_message_size {
            return Err(RtmpError::FatalStream(format!(
                "message of {} bytes exceeds limit of {}",
                state.length, self.max_message_size
            )));
        }

        let remaining = state.length as usize - state.payload.len();
        let take = remaining.min(self.chunk_size as usize);
        let start = state.payload.len();
        state.payload.resize(start + take, 0);
        let mut payload = std::mem::take(&mut state.payload);
        let result = self.read_full(&mut payload[start..]);
        let state = self
            .streams
            .get_mut(&csid)
            .ok_or_else(|| RtmpError::FatalStream("chunk stream state lost".into()))?;
        state.payload = payload;
        result?;

        if state.payload.len() == state.length as usize {
            let payload = std::mem::take(&mut state.payload);
            return Ok(Some(RtmpMessage::new(
                MessageType::from_id(state.type_id),
                state.timestamp,
                state.stream_id,
                payload,
            )));
        }
        Ok(None)
    }

    /// Read the first byte of a chunk, distinguishing clean EOF.
    fn read_first(&mut self, buf: &mut [u8; 1]) -> Result<bool> {
        loop {
            match self.inner.read(buf) {
                Ok(0) => {
                    self.at_eof = true;
                    return Ok(false);
                }
                Ok(_) => {
                    self.bytes_read += 1;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_full(&mut b)?;
        Ok(b[0])
    }

    fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.bytes_read += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(RtmpError::FatalStream("stream ended mid-chunk".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Consume the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn u24(b: &[u8]) -> u32 {
    ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: Vec<u8>) -> ChunkReader<Cursor<Vec<u8>>> {
        ChunkReader::new(Cursor::new(bytes), 16 * 1024 * 1024)
    }

    fn video(ts: u32, len: usize) -> RtmpMessage {
        let payload = (0..len).map(|i| (i % 251) as u8).collect();
        RtmpMessage::new(MessageType::Video, ts, 1, payload)
    }

    mod basic_header {
        use super::*;

        #[test]
        fn one_byte_form() {
            let mut out = Vec::new();
            write_basic_header(&mut out, ChunkFormat::Full, 3);
            assert_eq!(out, vec![0x03]);
        }

        #[test]
        fn two_byte_form() {
            let mut out = Vec::new();
            write_basic_header(&mut out, ChunkFormat::SameStream, 319);
            assert_eq!(out, vec![0x40, 255]);
        }

        #[test]
        fn three_byte_form() {
            let mut out = Vec::new();
            write_basic_header(&mut out, ChunkFormat::Continuation, 65_599);
            assert_eq!(out, vec![0xC1, 0xFF, 0xFF]);
        }

        #[test]
        fn large_ids_round_trip() {
            for csid in [64u32, 319, 320, 1000, 65_599] {
                let mut writer = ChunkWriter::new();
                let mut out = Vec::new();
                writer.encode(&video(5, 10), csid, &mut out);
                let msg = reader(out).read_message().unwrap().unwrap();
                assert_eq!(msg.payload.len(), 10, "csid {}", csid);
            }
        }
    }

    mod header_compression {
        use super::*;

        #[test]
        fn first_message_uses_full_header() {
            let mut writer = ChunkWriter::new();
            let mut out = Vec::new();
            writer.encode(&video(1000, 4), 4, &mut out);
            assert_eq!(out[0] >> 6, 0);
            assert_eq!(out.len(), 1 + 11 + 4);
            // Stream ID is little-endian
            assert_eq!(&out[8..12], &[1, 0, 0, 0]);
        }

        #[test]
        fn format_progression() {
            let mut writer = ChunkWriter::new();
            let mut out = Vec::new();

            writer.encode(&video(0, 4), 4, &mut out);
            assert_eq!(out[0] >> 6, 0);

            // Same length and type, delta 40 differs from implied delta 0
            out.clear();
            writer.encode(&video(40, 4), 4, &mut out);
            assert_eq!(out[0] >> 6, 2);
            assert_eq!(out.len(), 1 + 3 + 4);

            // Same delta again
            out.clear();
            writer.encode(&video(80, 4), 4, &mut out);
            assert_eq!(out[0] >> 6, 3);
            assert_eq!(out.len(), 1 + 4);

            // Length change
            out.clear();
            writer.encode(&video(120, 9), 4, &mut out);
            assert_eq!(out[0] >> 6, 1);
            assert_eq!(out.len(), 1 + 7 + 9);
        }

        #[test]
        fn backwards_timestamp_resets_to_full() {
            let mut writer = ChunkWriter::new();
            let mut out = Vec::new();
            writer.encode(&video(500, 4), 4, &mut out);
            out.clear();
            writer.encode(&video(100, 4), 4, &mut out);
            assert_eq!(out[0] >> 6, 0);
        }

        #[test]
        fn stream_id_change_resets_to_full() {
            let mut writer = ChunkWriter::new();
            let mut out = Vec::new();
            writer.encode(&video(0, 4), 4, &mut out);
            out.clear();
            let mut other = video(10, 4);
            other.stream_id = 2;
            writer.encode(&other, 4, &mut out);
            assert_eq!(out[0] >> 6, 0);
        }

        #[test]
        fn compressed_sequence_decodes_to_same_timestamps() {
            let mut writer = ChunkWriter::new();
            let mut out = Vec::new();
            let stamps = [0u32, 40, 80, 120, 121, 500, 30, 70];
            for (i, ts) in stamps.iter().enumerate() {
                writer.encode(&video(*ts, 3 + (i % 2)), 4, &mut out);
            }
            let mut r = reader(out);
            for ts in stamps {
                let msg = r.read_message().unwrap().unwrap();
                assert_eq!(msg.timestamp, ts);
            }
            assert!(r.read_message().unwrap().is_none());
        }
    }

    mod chunking {
        use super::*;

        #[test]
        fn large_message_is_split_and_reassembled() {
            let mut writer = ChunkWriter::new();
            writer.set_chunk_size(100);
            let msg = video(1234, 1050);
            let mut out = Vec::new();
            writer.encode(&msg, 4, &mut out);
            // 11 continuation headers of one byte each
            assert_eq!(out.len(), 1 + 11 + 1050 + 10);

            let mut r = reader(out);
            r.set_chunk_size(100).unwrap();
            let decoded = r.read_message().unwrap().unwrap();
            assert_eq!(decoded, msg);
        }

        #[test]
        fn interleaved_chunk_streams_reassemble_in_order() {
            let mut writer = ChunkWriter::new();
            let a = video(10, 300);
            let b = RtmpMessage::new(MessageType::Audio, 12, 1, vec![7u8; 200]);
            let mut out_a = Vec::new();
            let mut out_b = Vec::new();
            writer.encode(&a, 4, &mut out_a);
            writer.encode(&b, 5, &mut out_b);

            // Interleave the first chunk of a, all of b, then the rest of a
            let first_a = 1 + 11 + 128;
            let mut wire = out_a[..first_a].to_vec();
            wire.extend_from_slice(&out_b);
            wire.extend_from_slice(&out_a[first_a..]);

            let mut r = reader(wire);
            assert_eq!(r.read_message().unwrap().unwrap(), b);
            assert_eq!(r.read_message().unwrap().unwrap(), a);
        }

        #[test]
        fn extended_timestamp_is_repeated_on_continuations() {
            let mut writer = ChunkWriter::new();
            let msg = video(0x0100_0000, 300);
            let mut out = Vec::new();
            writer.encode(&msg, 4, &mut out);
            assert_eq!(out.len(), 1 + 11 + 4 + 300 + 2 * (1 + 4));
            assert_eq!(&out[1..4], &[0xFF, 0xFF, 0xFF]);

            let decoded = reader(out).read_message().unwrap().unwrap();
            assert_eq!(decoded.timestamp, 0x0100_0000);
            assert_eq!(decoded.payload, msg.payload);
        }

        #[test]
        fn zero_length_message() {
            let mut writer = ChunkWriter::new();
            let msg = RtmpMessage::new(MessageType::DataAmf0, 0, 1, Vec::new());
            let mut out = Vec::new();
            writer.encode(&msg, 3, &mut out);
            assert_eq!(reader(out).read_message().unwrap().unwrap(), msg);
        }

        #[test]
        fn chunk_size_change_applies_to_later_chunks() {
            let mut writer = ChunkWriter::new();
            let mut out = Vec::new();
            writer.encode(&video(0, 200), 4, &mut out);
            writer.set_chunk_size(4096);
            writer.encode(&video(40, 200), 4, &mut out);

            let mut r = reader(out);
            assert_eq!(r.read_message().unwrap().unwrap().payload.len(), 200);
            r.set_chunk_size(4096).unwrap();
            assert_eq!(r.read_message().unwrap().unwrap().payload.len(), 200);
        }
    }

    mod reader_errors {
        use super::*;

        #[test]
        fn clean_eof_returns_none() {
            assert!(reader(Vec::new()).read_message().unwrap().is_none());
        }

        #[test]
        fn truncated_chunk_is_fatal() {
            let mut writer = ChunkWriter::new();
            let mut out = Vec::new();
            writer.encode(&video(0, 50), 4, &mut out);
            out.truncate(out.len() - 10);
            let err = reader(out).read_message().unwrap_err();
            assert!(matches!(err, RtmpError::FatalStream(_)));
        }

        #[test]
        fn continuation_without_header_is_fatal() {
            let err = reader(vec![0xC4, 0x00]).read_message().unwrap_err();
            assert!(matches!(err, RtmpError::FatalStream(_)));
        }

        #[test]
        fn oversized_message_is_fatal() {
            let mut writer = ChunkWriter::new();
            let mut out = Vec::new();
            writer.encode(&video(0, 64), 4, &mut out);
            let mut r = ChunkReader::new(Cursor::new(out), 32);
            assert!(matches!(r.read_message(), Err(RtmpError::FatalStream(_))));
        }

        #[test]
        fn abort_discards_partial_message() {
            let mut writer = ChunkWriter::new();
            let mut first = Vec::new();
            writer.encode(&video(0, 200), 4, &mut first);
            // Only the first chunk arrives
            first.truncate(1 + 11 + 128);
            let mut second = Vec::new();
            let mut fresh = ChunkWriter::new();
            fresh.encode(&video(10, 5), 4, &mut second);

            let mut r = reader(first.clone());
            assert!(r.read_chunk().unwrap().is_none());
            r.abort(4);
            r.inner = Cursor::new(second);
            assert_eq!(r.read_message().unwrap().unwrap().payload.len(), 5);
        }

        #[test]
        fn rejects_invalid_chunk_size() {
            let mut r = reader(Vec::new());
            assert!(r.set_chunk_size(0).is_err());
            assert!(r.set_chunk_size(0x8000_0000).is_err());
        }

        #[test]
        fn counts_bytes() {
            let mut writer = ChunkWriter::new();
            let mut out = Vec::new();
            writer.encode(&video(0, 20), 4, &mut out);
            let total = out.len() as u64;
            let mut r = reader(out);
            r.read_message().unwrap();
            assert_eq!(r.bytes_read(), total);
        }
    }
}

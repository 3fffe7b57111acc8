//! FLV tag packaging for H.264/AAC media and `onMetaData`.
//!
//! RTMP audio/video message payloads are FLV tag bodies, so the same helpers
//! serve both publishing (building payloads from encoder output) and playing
//! (re-wrapping received messages as an FLV byte stream).

use crate::amf0::{self, AmfValue};
use crate::error::{Result, RtmpError};
use crate::message::{type_ids, MessageType, RtmpMessage};

/// FLV tag types (identical to the RTMP message type IDs).
pub mod tag_types {
    pub const AUDIO: u8 = 8;
    pub const VIDEO: u8 = 9;
    pub const SCRIPT: u8 = 18;
}

/// FLV tag header length.
pub const TAG_HEADER_SIZE: usize = 11;

/// Codec IDs advertised in metadata.
pub const AAC_CODEC_ID: f64 = 10.0;
pub const AVC_CODEC_ID: f64 = 7.0;

const AVC_KEYFRAME: u8 = 0x17;
const AVC_INTERFRAME: u8 = 0x27;
const AVC_SEQUENCE_HEADER: u8 = 0x00;
const AVC_NALU: u8 = 0x01;
const AAC_SEQUENCE_HEADER: u8 = 0x00;
const AAC_RAW: u8 = 0x01;

/// H.264 NAL unit types of interest.
pub mod nal_types {
    pub const IDR: u8 = 5;
    pub const SEI: u8 = 6;
    pub const SPS: u8 = 7;
    pub const PPS: u8 = 8;
}

/// 13-byte FLV file header (9-byte header plus PreviousTagSize0).
pub fn file_header(has_audio: bool, has_video: bool) -> [u8; 13] {
    let flags = ((has_audio as u8) << 2) | has_video as u8;
    [b'F', b'L', b'V', 0x01, flags, 0, 0, 0, 9, 0, 0, 0, 0]
}

/// A single FLV tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlvTag {
    pub tag_type: u8,
    pub timestamp: u32,
    pub data: Vec<u8>,
}

impl FlvTag {
    pub fn new(tag_type: u8, timestamp: u32, data: Vec<u8>) -> Self {
        Self {
            tag_type,
            timestamp,
            data,
        }
    }

    pub fn from_message(message: &RtmpMessage) -> Self {
        Self::new(
            message.message_type.id(),
            message.timestamp,
            message.payload.clone(),
        )
    }

    /// Tag header, body and trailing PreviousTagSize.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let size = self.data.len() as u32;
        out.reserve(TAG_HEADER_SIZE + self.data.len() + 4);
        out.push(self.tag_type);
        out.extend_from_slice(&size.to_be_bytes()[1..]);
        out.extend_from_slice(&self.timestamp.to_be_bytes()[1..]);
        out.push((self.timestamp >> 24) as u8);
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&(TAG_HEADER_SIZE as u32 + size).to_be_bytes());
    }

    pub fn encoded_len(&self) -> usize {
        TAG_HEADER_SIZE + self.data.len() + 4
    }

    /// Parse one tag (including PreviousTagSize) from the front of `data`.
    ///
    /// Returns the tag and the number of bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < TAG_HEADER_SIZE {
            return Err(RtmpError::FatalStream("FLV tag header truncated".into()));
        }
        let tag_type = data[0] & 0x1F;
        let size = u24(&data[1..4]) as usize;
        let timestamp = u24(&data[4..7]) | ((data[7] as u32) << 24);
        let end = TAG_HEADER_SIZE + size;
        let body = data
            .get(TAG_HEADER_SIZE..end)
            .ok_or_else(|| RtmpError::FatalStream("FLV tag body truncated".into()))?;
        // PreviousTagSize is optional on the last tag of an aggregate
        let consumed = (end + 4).min(data.len());
        Ok((Self::new(tag_type, timestamp, body.to_vec()), consumed))
    }
}

/// Split an aggregate message into its sub-messages.
///
/// Sub-tag timestamps are rebased so the first sub-tag lands on the
/// aggregate message's own timestamp.
pub fn split_aggregate(message: &RtmpMessage) -> Result<Vec<RtmpMessage>> {
    let mut out = Vec::new();
    let mut rest = message.payload.as_slice();
    let mut base: Option<u32> = None;
    while !rest.is_empty() {
        let (tag, consumed) = FlvTag::parse(rest)?;
        rest = &rest[consumed..];
        let first = *base.get_or_insert(tag.timestamp);
        let timestamp = message
            .timestamp
            .wrapping_add(tag.timestamp.wrapping_sub(first));
        match tag.tag_type {
            type_ids::AUDIO | type_ids::VIDEO | type_ids::DATA_AMF0 => out.push(RtmpMessage::new(
                MessageType::from_id(tag.tag_type),
                timestamp,
                message.stream_id,
                tag.data,
            )),
            other => tracing::debug!(tag_type = other, "Skipping unknown aggregate sub-tag"),
        }
    }
    Ok(out)
}

/// Split an Annex-B byte stream into NAL units (start codes removed).
pub fn split_annexb(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push((i, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }
    if starts.is_empty() {
        return if data.is_empty() { Vec::new() } else { vec![data] };
    }

    let mut nalus = Vec::with_capacity(starts.len());
    for (n, &(_, begin)) in starts.iter().enumerate() {
        let mut end = starts.get(n + 1).map(|&(s, _)| s).unwrap_or(data.len());
        // A 4-byte start code leaves a zero before the next 3-byte code
        while end > begin && data[end - 1] == 0 && n + 1 < starts.len() {
            end -= 1;
        }
        if end > begin {
            nalus.push(&data[begin..end]);
        }
    }
    nalus
}

/// NAL unit type of a NAL unit without start code.
pub fn nal_type(nalu: &[u8]) -> Option<u8> {
    nalu.first().map(|b| b & 0x1F)
}

/// Whether the NAL unit is an IDR slice.
pub fn is_keyframe(nalu: &[u8]) -> bool {
    nal_type(nalu) == Some(nal_types::IDR)
}

/// AVC sequence header tag body (AVCDecoderConfigurationRecord).
pub fn avc_sequence_header(sps: &[u8], pps: &[u8]) -> Result<Vec<u8>> {
    if sps.len() < 4 || pps.is_empty() {
        return Err(RtmpError::FatalStream("SPS/PPS too short".into()));
    }
    let mut body = Vec::with_capacity(16 + sps.len() + pps.len());
    body.extend_from_slice(&[AVC_KEYFRAME, AVC_SEQUENCE_HEADER, 0, 0, 0]);
    body.push(0x01); // configurationVersion
    body.push(sps[1]); // AVCProfileIndication
    body.push(sps[2]); // profile_compatibility
    body.push(sps[3]); // AVCLevelIndication
    body.push(0xFF); // 4-byte NALU lengths
    body.push(0xE1); // one SPS
    body.extend_from_slice(&(sps.len() as u16).to_be_bytes());
    body.extend_from_slice(sps);
    body.push(0x01); // one PPS
    body.extend_from_slice(&(pps.len() as u16).to_be_bytes());
    body.extend_from_slice(pps);
    Ok(body)
}

/// AVC NALU tag body with 4-byte length-prefixed NAL units.
pub fn avc_frame(nalus: &[&[u8]], keyframe: bool, composition_time: i32) -> Vec<u8> {
    let total: usize = nalus.iter().map(|n| n.len() + 4).sum();
    let mut body = Vec::with_capacity(5 + total);
    body.push(if keyframe { AVC_KEYFRAME } else { AVC_INTERFRAME });
    body.push(AVC_NALU);
    body.extend_from_slice(&composition_time.to_be_bytes()[1..]);
    for nalu in nalus {
        body.extend_from_slice(&(nalu.len() as u32).to_be_bytes());
        body.extend_from_slice(nalu);
    }
    body
}

/// Whether a video tag body is an AVC sequence header.
pub fn is_avc_sequence_header(body: &[u8]) -> bool {
    body.len() >= 2 && body[0] & 0x0F == 7 && body[1] == AVC_SEQUENCE_HEADER
}

/// Whether a video tag body is a keyframe.
pub fn is_video_keyframe(body: &[u8]) -> bool {
    body.first().map(|b| b >> 4 == 1).unwrap_or(false)
}

/// AAC sound format byte: AAC, 44 kHz flag, 16-bit, mono/stereo.
pub fn aac_sound_byte(channels: u16) -> u8 {
    0xAE | (channels > 1) as u8
}

/// AAC sequence header tag body from an AudioSpecificConfig.
pub fn aac_sequence_header(audio_specific_config: &[u8], channels: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 + audio_specific_config.len());
    body.push(aac_sound_byte(channels));
    body.push(AAC_SEQUENCE_HEADER);
    body.extend_from_slice(audio_specific_config);
    body
}

/// AAC raw frame tag body.
pub fn aac_frame(raw: &[u8], channels: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 + raw.len());
    body.push(aac_sound_byte(channels));
    body.push(AAC_RAW);
    body.extend_from_slice(raw);
    body
}

/// Stream description sent as `onMetaData`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlvMetadata {
    pub width: u32,
    pub height: u32,
    pub framerate: f64,
    pub video_datarate_kbps: Option<f64>,
    pub audio_samplerate: u32,
    pub audio_datarate_kbps: f64,
    pub audio_channels: u16,
}

impl Default for FlvMetadata {
    fn default() -> Self {
        Self {
            width: 720,
            height: 1280,
            framerate: 25.0,
            video_datarate_kbps: None,
            audio_samplerate: 44_100,
            audio_datarate_kbps: 32.0,
            audio_channels: 1,
        }
    }
}

impl FlvMetadata {
    fn properties(&self) -> Vec<(String, AmfValue)> {
        let mut props = vec![
            ("audiocodecid".to_string(), AmfValue::Number(AAC_CODEC_ID)),
            ("audiodatarate".to_string(), AmfValue::Number(self.audio_datarate_kbps)),
            ("audiosamplerate".to_string(), AmfValue::Number(self.audio_samplerate as f64)),
            ("stereo".to_string(), AmfValue::Boolean(self.audio_channels > 1)),
            ("videocodecid".to_string(), AmfValue::Number(AVC_CODEC_ID)),
            ("framerate".to_string(), AmfValue::Number(self.framerate)),
            ("width".to_string(), AmfValue::Number(self.width as f64)),
            ("height".to_string(), AmfValue::Number(self.height as f64)),
        ];
        if let Some(rate) = self.video_datarate_kbps {
            props.push(("videodatarate".to_string(), AmfValue::Number(rate)));
        }
        props
    }

    /// Script data payload: `onMetaData` followed by an ECMA array, optionally
    /// prefixed with `@setDataFrame` for servers that expect it from publishers.
    pub fn encode(&self, set_data_frame: bool) -> Vec<u8> {
        let mut values = Vec::with_capacity(3);
        if set_data_frame {
            values.push(AmfValue::string("@setDataFrame"));
        }
        values.push(AmfValue::string("onMetaData"));
        values.push(AmfValue::EcmaArray(self.properties()));
        amf0::encode_all(&values)
    }
}

fn u24(b: &[u8]) -> u32 {
    ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32
}

//! NetConnection / NetStream command messages.

use crate::amf0::{self, AmfValue};
use crate::error::{Result, RtmpError};
use crate::url::RtmpUrl;

/// Audio codecs advertised in `connect` (all SUPPORT_SND_* flags).
const AUDIO_CODECS: f64 = 3575.0;
/// Video codecs advertised in `connect` (all SUPPORT_VID_* flags).
const VIDEO_CODECS: f64 = 252.0;
/// SUPPORT_VID_CLIENT_SEEK.
const VIDEO_FUNCTION: f64 = 1.0;

/// A decoded or to-be-encoded command message.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub transaction_id: f64,
    /// Command object; `Null` when absent.
    pub command_object: AmfValue,
    pub args: Vec<AmfValue>,
}

impl Command {
    pub fn new(name: impl Into<String>, transaction_id: f64) -> Self {
        Self {
            name: name.into(),
            transaction_id,
            command_object: AmfValue::Null,
            args: Vec::new(),
        }
    }

    pub fn with_object(mut self, object: AmfValue) -> Self {
        self.command_object = object;
        self
    }

    pub fn with_arg(mut self, arg: AmfValue) -> Self {
        self.args.push(arg);
        self
    }

    /// AMF0 payload for a type 20 message.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        amf0::encode(&AmfValue::string(self.name.as_str()), &mut out);
        amf0::encode(&AmfValue::Number(self.transaction_id), &mut out);
        amf0::encode(&self.command_object, &mut out);
        for arg in &self.args {
            amf0::encode(arg, &mut out);
        }
        out
    }

    /// Decode a command payload.
    ///
    /// Type 17 (AMF3 command) payloads start with a format byte that is
    /// skipped; the remainder is AMF0 with optional AVM+ switches.
    pub fn decode(payload: &[u8], amf3: bool) -> Result<Self> {
        let body = if amf3 && !payload.is_empty() {
            &payload[1..]
        } else {
            payload
        };
        let mut values = amf0::decode_all(body)?.into_iter();

        let name = values
            .next()
            .and_then(|v| v.as_str().map(str::to_owned))
            .ok_or_else(|| RtmpError::FatalStream("command without a name".into()))?;
        let transaction_id = values.next().and_then(|v| v.as_number()).unwrap_or(0.0);
        let command_object = values.next().unwrap_or(AmfValue::Null);

        Ok(Self {
            name,
            transaction_id,
            command_object,
            args: values.collect(),
        })
    }

    /// First argument after the command object.
    pub fn first_arg(&self) -> Option<&AmfValue> {
        self.args.first()
    }
}

/// `connect` for the given URL.
///
/// Publish mode adds `type: "nonprivate"` to the command object.
pub fn connect(transaction_id: f64, url: &RtmpUrl, flash_version: &str, publish: bool) -> Command {
    let mut props = vec![
        ("app".to_string(), AmfValue::string(url.app.as_str())),
        ("flashVer".to_string(), AmfValue::string(flash_version)),
        ("tcUrl".to_string(), AmfValue::string(url.tc_url())),
    ];
    if publish {
        props.push(("type".to_string(), AmfValue::string("nonprivate")));
    }
    props.extend([
        ("fpad".to_string(), AmfValue::Boolean(false)),
        ("capabilities".to_string(), AmfValue::Number(15.0)),
        ("audioCodecs".to_string(), AmfValue::Number(AUDIO_CODECS)),
        ("videoCodecs".to_string(), AmfValue::Number(VIDEO_CODECS)),
        ("videoFunction".to_string(), AmfValue::Number(VIDEO_FUNCTION)),
    ]);
    props.push(("objectEncoding".to_string(), AmfValue::Number(0.0)));
    Command::new("connect", transaction_id).with_object(AmfValue::Object(props))
}

pub fn create_stream(transaction_id: f64) -> Command {
    Command::new("createStream", transaction_id)
}

pub fn release_stream(transaction_id: f64, stream_key: &str) -> Command {
    Command::new("releaseStream", transaction_id).with_arg(AmfValue::string(stream_key))
}

pub fn fc_publish(transaction_id: f64, stream_key: &str) -> Command {
    Command::new("FCPublish", transaction_id).with_arg(AmfValue::string(stream_key))
}

pub fn fc_unpublish(transaction_id: f64, stream_key: &str) -> Command {
    Command::new("FCUnpublish", transaction_id).with_arg(AmfValue::string(stream_key))
}

/// `publish(key, "live")`.
pub fn publish(stream_key: &str) -> Command {
    Command::new("publish", 0.0)
        .with_arg(AmfValue::string(stream_key))
        .with_arg(AmfValue::string("live"))
}

/// `play(key, -2000)`: live stream if available, recorded otherwise.
pub fn play(stream_key: &str) -> Command {
    Command::new("play", 0.0)
        .with_arg(AmfValue::string(stream_key))
        .with_arg(AmfValue::Number(-2000.0))
}

pub fn delete_stream(stream_id: u32) -> Command {
    Command::new("deleteStream", 0.0).with_arg(AmfValue::Number(stream_id as f64))
}

/// `onStatus` info object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusInfo {
    pub level: String,
    pub code: String,
    pub description: String,
}

impl StatusInfo {
    pub fn from_value(value: Option<&AmfValue>) -> Self {
        let field = |key: &str| {
            value
                .and_then(|v| v.get(key))
                .and_then(AmfValue::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            level: field("level"),
            code: field("code"),
            description: field("description"),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level.eq_ignore_ascii_case("error")
    }

    /// Convert into a rejection error for `command`.
    pub fn into_rejection(self, command: &str) -> RtmpError {
        RtmpError::CommandRejected {
            command: command.to_string(),
            code: self.code,
            description: self.description,
        }
    }
}

/// Server reply classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Result { transaction_id: f64, values: Vec<AmfValue> },
    Error { transaction_id: f64, info: StatusInfo },
    Status(StatusInfo),
    /// Anything else (`onBWDone`, `_checkbw`, `|RtmpSampleAccess`, ...).
    Other(Command),
}

impl Response {
    pub fn classify(command: Command) -> Self {
        match command.name.as_str() {
            "_result" => {
                let mut values = Vec::with_capacity(command.args.len() + 1);
                values.push(command.command_object);
                values.extend(command.args);
                Response::Result {
                    transaction_id: command.transaction_id,
                    values,
                }
            }
            "_error" => {
                let info = StatusInfo::from_value(command.args.first());
                Response::Error {
                    transaction_id: command.transaction_id,
                    info,
                }
            }
            "onStatus" => Response::Status(StatusInfo::from_value(command.args.first())),
            _ => Response::Other(command),
        }
    }
}

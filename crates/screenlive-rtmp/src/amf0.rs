//! AMF0 value model, encoder and decoder.

use crate::amf3::{self, Amf3Value};
use crate::error::AmfError;

/// AMF0 type markers.
pub mod markers {
    pub const NUMBER: u8 = 0x00;
    pub const BOOLEAN: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const OBJECT: u8 = 0x03;
    pub const MOVIECLIP: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const UNDEFINED: u8 = 0x06;
    pub const REFERENCE: u8 = 0x07;
    pub const ECMA_ARRAY: u8 = 0x08;
    pub const OBJECT_END: u8 = 0x09;
    pub const STRICT_ARRAY: u8 = 0x0A;
    pub const DATE: u8 = 0x0B;
    pub const LONG_STRING: u8 = 0x0C;
    pub const UNSUPPORTED: u8 = 0x0D;
    pub const RECORDSET: u8 = 0x0E;
    pub const XML_DOCUMENT: u8 = 0x0F;
    pub const TYPED_OBJECT: u8 = 0x10;
    pub const AVMPLUS: u8 = 0x11;
}

/// Maximum nesting depth accepted by the decoders.
pub const MAX_DEPTH: usize = 64;

/// An ordered list of key/value pairs.
pub type Properties = Vec<(String, AmfValue)>;

/// AMF0 value.
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    Number(f64),
    Boolean(bool),
    String(String),
    Object(Properties),
    Null,
    Undefined,
    /// Index into the table of complex values already decoded in this message.
    Reference(u16),
    EcmaArray(Properties),
    StrictArray(Vec<AmfValue>),
    Date { millis: f64, timezone: i16 },
    LongString(String),
    Unsupported,
    XmlDocument(String),
    TypedObject { class_name: String, properties: Properties },
    /// Value following an AVM+ switch marker.
    Amf3(Amf3Value),
}

impl AmfValue {
    /// Convenience constructor for an anonymous object.
    pub fn object<K: Into<String>>(pairs: impl IntoIterator<Item = (K, AmfValue)>) -> Self {
        AmfValue::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn string(s: impl Into<String>) -> Self {
        AmfValue::String(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) | AmfValue::LongString(s) => Some(s),
            AmfValue::Amf3(Amf3Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            AmfValue::Amf3(Amf3Value::Double(n)) => Some(*n),
            AmfValue::Amf3(Amf3Value::Integer(i)) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            AmfValue::Amf3(Amf3Value::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Property list of an object-like value.
    pub fn properties(&self) -> Option<&Properties> {
        match self {
            AmfValue::Object(p) | AmfValue::EcmaArray(p) => Some(p),
            AmfValue::TypedObject { properties, .. } => Some(properties),
            _ => None,
        }
    }

    /// Look up a property by name on an object-like value.
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.properties()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    fn is_complex(&self) -> bool {
        matches!(
            self,
            AmfValue::Object(_)
                | AmfValue::EcmaArray(_)
                | AmfValue::StrictArray(_)
                | AmfValue::TypedObject { .. }
        )
    }
}

/// Append the AMF0 encoding of `value` to `out`.
pub fn encode(value: &AmfValue, out: &mut Vec<u8>) {
    match value {
        AmfValue::Number(n) => {
            out.push(markers::NUMBER);
            out.extend_from_slice(&n.to_be_bytes());
        }
        AmfValue::Boolean(b) => {
            out.push(markers::BOOLEAN);
            out.push(*b as u8);
        }
        AmfValue::String(s) if s.len() > u16::MAX as usize => {
            out.push(markers::LONG_STRING);
            put_long_utf8(out, s);
        }
        AmfValue::String(s) => {
            out.push(markers::STRING);
            put_utf8(out, s);
        }
        AmfValue::Object(props) => {
            out.push(markers::OBJECT);
            put_properties(out, props);
        }
        AmfValue::Null => out.push(markers::NULL),
        AmfValue::Undefined => out.push(markers::UNDEFINED),
        AmfValue::Reference(idx) => {
            out.push(markers::REFERENCE);
            out.extend_from_slice(&idx.to_be_bytes());
        }
        AmfValue::EcmaArray(props) => {
            out.push(markers::ECMA_ARRAY);
            out.extend_from_slice(&(props.len() as u32).to_be_bytes());
            put_properties(out, props);
        }
        AmfValue::StrictArray(items) => {
            out.push(markers::STRICT_ARRAY);
            out.extend_from_slice(&(items.len() as u32).to_be_bytes());
            for item in items {
                encode(item, out);
            }
        }
        AmfValue::Date { millis, timezone } => {
            out.push(markers::DATE);
            out.extend_from_slice(&millis.to_be_bytes());
            out.extend_from_slice(&timezone.to_be_bytes());
        }
        AmfValue::LongString(s) => {
            out.push(markers::LONG_STRING);
            put_long_utf8(out, s);
        }
        AmfValue::Unsupported => out.push(markers::UNSUPPORTED),
        AmfValue::XmlDocument(s) => {
            out.push(markers::XML_DOCUMENT);
            put_long_utf8(out, s);
        }
        AmfValue::TypedObject {
            class_name,
            properties,
        } => {
            out.push(markers::TYPED_OBJECT);
            put_utf8(out, class_name);
            put_properties(out, properties);
        }
        AmfValue::Amf3(v) => {
            out.push(markers::AVMPLUS);
            amf3::encode(v, out);
        }
    }
}

/// Encode a sequence of values back to back.
pub fn encode_all(values: &[AmfValue]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        encode(value, &mut out);
    }
    out
}

fn put_utf8(out: &mut Vec<u8>, s: &str) {
    let bytes = &s.as_bytes()[..s.len().min(u16::MAX as usize)];
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn put_long_utf8(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn put_properties(out: &mut Vec<u8>, props: &Properties) {
    for (key, value) in props {
        put_utf8(out, key);
        encode(value, out);
    }
    out.extend_from_slice(&[0x00, 0x00, markers::OBJECT_END]);
}

/// Bounds-checked big-endian byte reader shared by the AMF decoders.
#[derive(Debug)]
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], AmfError> {
        let end = self.pos.checked_add(n).ok_or(AmfError::Truncated(what))?;
        let slice = self.data.get(self.pos..end).ok_or(AmfError::Truncated(what))?;
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub(crate) fn u8(&mut self, what: &'static str) -> Result<u8, AmfError> {
        Ok(self.take(1, what)?[0])
    }

    pub(crate) fn u16(&mut self, what: &'static str) -> Result<u16, AmfError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self, what: &'static str) -> Result<u32, AmfError> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn f64(&mut self, what: &'static str) -> Result<f64, AmfError> {
        let b = self.take(8, what)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(f64::from_be_bytes(arr))
    }

    pub(crate) fn utf8(&mut self, len: usize, what: &'static str) -> Result<String, AmfError> {
        let bytes = self.take(len, what)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| AmfError::InvalidUtf8)
    }
}

/// AMF0 decoder over a byte slice.
pub struct Amf0Decoder<'a> {
    reader: ByteReader<'a>,
    /// Complex values in decode order, addressed by reference markers.
    references: Vec<AmfValue>,
}

impl<'a> Amf0Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(data),
            references: Vec::new(),
        }
    }

    /// Whether all input has been consumed.
    pub fn is_empty(&self) -> bool {
        self.reader.is_empty()
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.reader.position()
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> Result<AmfValue, AmfError> {
        self.decode_at(0)
    }

    fn decode_at(&mut self, depth: usize) -> Result<AmfValue, AmfError> {
        if depth > MAX_DEPTH {
            return Err(AmfError::TooDeep(MAX_DEPTH));
        }
        let marker = self.reader.u8("marker")?;
        let value = match marker {
            markers::NUMBER => AmfValue::Number(self.reader.f64("number")?),
            markers::BOOLEAN => AmfValue::Boolean(self.reader.u8("boolean")? != 0),
            markers::STRING => {
                let len = self.reader.u16("string length")? as usize;
                AmfValue::String(self.reader.utf8(len, "string")?)
            }
            markers::OBJECT => {
                let slot = self.reserve();
                let props = self.properties(depth)?;
                self.fill(slot, AmfValue::Object(props))
            }
            markers::NULL => AmfValue::Null,
            markers::UNDEFINED => AmfValue::Undefined,
            markers::REFERENCE => {
                let idx = self.reader.u16("reference")?;
                if idx as usize >= self.references.len() {
                    return Err(AmfError::BadReference(idx as usize));
                }
                AmfValue::Reference(idx)
            }
            markers::ECMA_ARRAY => {
                let slot = self.reserve();
                // The count is advisory; the terminator ends the array
                let _count = self.reader.u32("ecma array count")?;
                let props = self.properties(depth)?;
                self.fill(slot, AmfValue::EcmaArray(props))
            }
            markers::STRICT_ARRAY => {
                let slot = self.reserve();
                let count = self.reader.u32("strict array count")? as usize;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(self.decode_at(depth + 1)?);
                }
                self.fill(slot, AmfValue::StrictArray(items))
            }
            markers::DATE => AmfValue::Date {
                millis: self.reader.f64("date")?,
                timezone: self.reader.u16("date timezone")? as i16,
            },
            markers::LONG_STRING => {
                let len = self.reader.u32("long string length")? as usize;
                AmfValue::LongString(self.reader.utf8(len, "long string")?)
            }
            markers::UNSUPPORTED => AmfValue::Unsupported,
            markers::XML_DOCUMENT => {
                let len = self.reader.u32("xml length")? as usize;
                AmfValue::XmlDocument(self.reader.utf8(len, "xml document")?)
            }
            markers::TYPED_OBJECT => {
                let slot = self.reserve();
                let len = self.reader.u16("class name length")? as usize;
                let class_name = self.reader.utf8(len, "class name")?;
                let properties = self.properties(depth)?;
                self.fill(
                    slot,
                    AmfValue::TypedObject {
                        class_name,
                        properties,
                    },
                )
            }
            markers::AVMPLUS => {
                AmfValue::Amf3(amf3::Amf3Decoder::new(&mut self.reader).decode()?)
            }
            other => return Err(AmfError::UnknownMarker(other)),
        };
        Ok(value)
    }

    fn properties(&mut self, depth: usize) -> Result<Properties, AmfError> {
        let mut props = Vec::new();
        loop {
            let len = self.reader.u16("property name length")? as usize;
            if len == 0 && self.reader.peek() == Some(markers::OBJECT_END) {
                self.reader.u8("object end")?;
                return Ok(props);
            }
            let key = self.reader.utf8(len, "property name")?;
            let value = self.decode_at(depth + 1)?;
            props.push((key, value));
        }
    }

    fn reserve(&mut self) -> usize {
        self.references.push(AmfValue::Null);
        self.references.len() - 1
    }

    fn fill(&mut self, slot: usize, value: AmfValue) -> AmfValue {
        debug_assert!(value.is_complex());
        if let Some(entry) = self.references.get_mut(slot) {
            *entry = value.clone();
        }
        value
    }

    /// Resolve a reference to the complex value it points at.
    pub fn resolve(&self, idx: u16) -> Option<&AmfValue> {
        self.references.get(idx as usize)
    }
}

/// Decode every value in `data`.
pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, AmfError> {
    let mut decoder = Amf0Decoder::new(data);
    let mut values = Vec::new();
    while !decoder.is_empty() {
        values.push(decoder.decode()?);
    }
    Ok(values)
}

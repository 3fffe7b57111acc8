//! AMF3 decoding (used by AVM+ switched values and type 15/17 messages) and a
//! reference-free encoder.

use crate::amf0::{ByteReader, MAX_DEPTH};
use crate::error::AmfError;

/// AMF3 type markers.
pub mod markers {
    pub const UNDEFINED: u8 = 0x00;
    pub const NULL: u8 = 0x01;
    pub const FALSE: u8 = 0x02;
    pub const TRUE: u8 = 0x03;
    pub const INTEGER: u8 = 0x04;
    pub const DOUBLE: u8 = 0x05;
    pub const STRING: u8 = 0x06;
    pub const XML_DOC: u8 = 0x07;
    pub const DATE: u8 = 0x08;
    pub const ARRAY: u8 = 0x09;
    pub const OBJECT: u8 = 0x0A;
    pub const XML: u8 = 0x0B;
    pub const BYTE_ARRAY: u8 = 0x0C;
}

/// Largest value representable by a U29.
const U29_MAX: u32 = 0x1FFF_FFFF;

/// AMF3 value.
#[derive(Debug, Clone, PartialEq)]
pub enum Amf3Value {
    Undefined,
    Null,
    Boolean(bool),
    /// 29-bit signed integer.
    Integer(i32),
    Double(f64),
    String(String),
    XmlDoc(String),
    /// Milliseconds since the epoch, UTC.
    Date(f64),
    Array {
        assoc: Vec<(String, Amf3Value)>,
        dense: Vec<Amf3Value>,
    },
    Object {
        class_name: Option<String>,
        sealed: Vec<(String, Amf3Value)>,
        dynamic: Vec<(String, Amf3Value)>,
    },
    Xml(String),
    ByteArray(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Traits {
    class_name: Option<String>,
    dynamic: bool,
    externalizable: bool,
    sealed_names: Vec<String>,
}

/// AMF3 decoder with string, object and traits reference tables.
pub(crate) struct Amf3Decoder<'r, 'a> {
    reader: &'r mut ByteReader<'a>,
    strings: Vec<String>,
    objects: Vec<Amf3Value>,
    traits: Vec<Traits>,
}

impl<'r, 'a> Amf3Decoder<'r, 'a> {
    pub(crate) fn new(reader: &'r mut ByteReader<'a>) -> Self {
        Self {
            reader,
            strings: Vec::new(),
            objects: Vec::new(),
            traits: Vec::new(),
        }
    }

    pub(crate) fn decode(&mut self) -> Result<Amf3Value, AmfError> {
        self.decode_at(0)
    }

    fn decode_at(&mut self, depth: usize) -> Result<Amf3Value, AmfError> {
        if depth > MAX_DEPTH {
            return Err(AmfError::TooDeep(MAX_DEPTH));
        }
        let marker = self.reader.u8("amf3 marker")?;
        Ok(match marker {
            markers::UNDEFINED => Amf3Value::Undefined,
            markers::NULL => Amf3Value::Null,
            markers::FALSE => Amf3Value::Boolean(false),
            markers::TRUE => Amf3Value::Boolean(true),
            markers::INTEGER => {
                let raw = self.u29()?;
                // Sign-extend from 29 bits
                Amf3Value::Integer(((raw << 3) as i32) >> 3)
            }
            markers::DOUBLE => Amf3Value::Double(self.reader.f64("amf3 double")?),
            markers::STRING => Amf3Value::String(self.string()?),
            markers::XML_DOC | markers::XML => {
                let (inline, value) = self.u29_ref()?;
                if !inline {
                    return self.object_ref(value);
                }
                let text = self.reader.utf8(value as usize, "amf3 xml")?;
                let result = if marker == markers::XML {
                    Amf3Value::Xml(text)
                } else {
                    Amf3Value::XmlDoc(text)
                };
                self.objects.push(result.clone());
                result
            }
            markers::DATE => {
                let (inline, value) = self.u29_ref()?;
                if !inline {
                    return self.object_ref(value);
                }
                let date = Amf3Value::Date(self.reader.f64("amf3 date")?);
                self.objects.push(date.clone());
                date
            }
            markers::ARRAY => {
                let (inline, value) = self.u29_ref()?;
                if !inline {
                    return self.object_ref(value);
                }
                let slot = self.reserve();
                let mut assoc = Vec::new();
                loop {
                    let key = self.string()?;
                    if key.is_empty() {
                        break;
                    }
                    let v = self.decode_at(depth + 1)?;
                    assoc.push((key, v));
                }
                let mut dense = Vec::with_capacity((value as usize).min(1024));
                for _ in 0..value {
                    dense.push(self.decode_at(depth + 1)?);
                }
                self.fill(slot, Amf3Value::Array { assoc, dense })
            }
            markers::OBJECT => self.object(depth)?,
            markers::BYTE_ARRAY => {
                let (inline, value) = self.u29_ref()?;
                if !inline {
                    return self.object_ref(value);
                }
                let bytes = self.reader.take(value as usize, "amf3 byte array")?.to_vec();
                let result = Amf3Value::ByteArray(bytes);
                self.objects.push(result.clone());
                result
            }
            other => return Err(AmfError::UnknownAmf3Marker(other)),
        })
    }

    fn object(&mut self, depth: usize) -> Result<Amf3Value, AmfError> {
        let header = self.u29()?;
        if header & 1 == 0 {
            return self.object_ref(header >> 1);
        }
        let traits = if header & 0b10 == 0 {
            let idx = (header >> 2) as usize;
            self.traits
                .get(idx)
                .cloned()
                .ok_or(AmfError::BadReference(idx))?
        } else {
            let externalizable = header & 0b100 != 0;
            let dynamic = header & 0b1000 != 0;
            let sealed_count = header >> 4;
            let name = self.string()?;
            let mut sealed_names = Vec::with_capacity((sealed_count as usize).min(256));
            for _ in 0..sealed_count {
                sealed_names.push(self.string()?);
            }
            let traits = Traits {
                class_name: (!name.is_empty()).then_some(name),
                dynamic,
                externalizable,
                sealed_names,
            };
            self.traits.push(traits.clone());
            traits
        };

        let slot = self.reserve();

        if traits.externalizable {
            // Flex collection wrappers serialize a single wrapped value
            let wrapper = matches!(
                traits.class_name.as_deref(),
                Some("flex.messaging.io.ArrayCollection") | Some("flex.messaging.io.ObjectProxy")
            );
            if !wrapper {
                return Err(AmfError::UnknownAmf3Marker(markers::OBJECT));
            }
            let inner = self.decode_at(depth + 1)?;
            return Ok(self.fill(
                slot,
                Amf3Value::Object {
                    class_name: traits.class_name,
                    sealed: vec![("source".to_string(), inner)],
                    dynamic: Vec::new(),
                },
            ));
        }

        let mut sealed = Vec::with_capacity(traits.sealed_names.len());
        for name in &traits.sealed_names {
            let v = self.decode_at(depth + 1)?;
            sealed.push((name.clone(), v));
        }
        let mut dynamic = Vec::new();
        if traits.dynamic {
            loop {
                let key = self.string()?;
                if key.is_empty() {
                    break;
                }
                let v = self.decode_at(depth + 1)?;
                dynamic.push((key, v));
            }
        }
        Ok(self.fill(
            slot,
            Amf3Value::Object {
                class_name: traits.class_name,
                sealed,
                dynamic,
            },
        ))
    }

    fn string(&mut self) -> Result<String, AmfError> {
        let (inline, value) = self.u29_ref()?;
        if !inline {
            let idx = value as usize;
            return self
                .strings
                .get(idx)
                .cloned()
                .ok_or(AmfError::BadReference(idx));
        }
        let s = self.reader.utf8(value as usize, "amf3 string")?;
        // Empty strings are never added to the reference table
        if !s.is_empty() {
            self.strings.push(s.clone());
        }
        Ok(s)
    }

    fn object_ref(&self, idx: u32) -> Result<Amf3Value, AmfError> {
        self.objects
            .get(idx as usize)
            .cloned()
            .ok_or(AmfError::BadReference(idx as usize))
    }

    fn reserve(&mut self) -> usize {
        self.objects.push(Amf3Value::Null);
        self.objects.len() - 1
    }

    fn fill(&mut self, slot: usize, value: Amf3Value) -> Amf3Value {
        if let Some(entry) = self.objects.get_mut(slot) {
            *entry = value.clone();
        }
        value
    }

    /// Read a U29 and split off the low "inline" flag bit.
    fn u29_ref(&mut self) -> Result<(bool, u32), AmfError> {
        let v = self.u29()?;
        Ok((v & 1 == 1, v >> 1))
    }

    fn u29(&mut self) -> Result<u32, AmfError> {
        let mut value: u32 = 0;
        for i in 0..4 {
            let b = self.reader.u8("u29")? as u32;
            if i == 3 {
                return Ok((value << 8) | b);
            }
            value = (value << 7) | (b & 0x7F);
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Ok(value)
    }
}

/// Decode a single AMF3 value from `data`.
pub fn decode(data: &[u8]) -> Result<Amf3Value, AmfError> {
    let mut reader = ByteReader::new(data);
    Amf3Decoder::new(&mut reader).decode()
}

/// Append the AMF3 encoding of `value` to `out`.
///
/// All strings and objects are written inline. Integers outside the 29-bit
/// range are written as doubles.
pub fn encode(value: &Amf3Value, out: &mut Vec<u8>) {
    match value {
        Amf3Value::Undefined => out.push(markers::UNDEFINED),
        Amf3Value::Null => out.push(markers::NULL),
        Amf3Value::Boolean(false) => out.push(markers::FALSE),
        Amf3Value::Boolean(true) => out.push(markers::TRUE),
        Amf3Value::Integer(i) if (-(1 << 28)..(1 << 28)).contains(i) => {
            out.push(markers::INTEGER);
            put_u29(out, (*i as u32) & U29_MAX);
        }
        Amf3Value::Integer(i) => {
            out.push(markers::DOUBLE);
            out.extend_from_slice(&(*i as f64).to_be_bytes());
        }
        Amf3Value::Double(d) => {
            out.push(markers::DOUBLE);
            out.extend_from_slice(&d.to_be_bytes());
        }
        Amf3Value::String(s) => {
            out.push(markers::STRING);
            put_string(out, s);
        }
        Amf3Value::XmlDoc(s) | Amf3Value::Xml(s) => {
            out.push(if matches!(value, Amf3Value::Xml(_)) {
                markers::XML
            } else {
                markers::XML_DOC
            });
            put_u29(out, ((s.len() as u32) << 1) | 1);
            out.extend_from_slice(s.as_bytes());
        }
        Amf3Value::Date(ms) => {
            out.push(markers::DATE);
            put_u29(out, 1);
            out.extend_from_slice(&ms.to_be_bytes());
        }
        Amf3Value::Array { assoc, dense } => {
            out.push(markers::ARRAY);
            put_u29(out, ((dense.len() as u32) << 1) | 1);
            for (k, v) in assoc {
                put_string(out, k);
                encode(v, out);
            }
            put_string(out, "");
            for v in dense {
                encode(v, out);
            }
        }
        Amf3Value::Object {
            class_name,
            sealed,
            dynamic,
        } => {
            out.push(markers::OBJECT);
            // Inline object, inline traits, dynamic
            put_u29(out, ((sealed.len() as u32) << 4) | 0b1011);
            put_string(out, class_name.as_deref().unwrap_or(""));
            for (k, _) in sealed {
                put_string(out, k);
            }
            for (_, v) in sealed {
                encode(v, out);
            }
            for (k, v) in dynamic {
                put_string(out, k);
                encode(v, out);
            }
            put_string(out, "");
        }
        Amf3Value::ByteArray(bytes) => {
            out.push(markers::BYTE_ARRAY);
            put_u29(out, ((bytes.len() as u32) << 1) | 1);
            out.extend_from_slice(bytes);
        }
    }
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    put_u29(out, ((s.len() as u32) << 1) | 1);
    out.extend_from_slice(s.as_bytes());
}

fn put_u29(out: &mut Vec<u8>, v: u32) {
    let v = v & U29_MAX;
    if v < 0x80 {
        out.push(v as u8);
    } else if v < 0x4000 {
        out.push(((v >> 7) | 0x80) as u8);
        out.push((v & 0x7F) as u8);
    } else if v < 0x20_0000 {
        out.push(((v >> 14) | 0x80) as u8);
        out.push(((v >> 7) | 0x80) as u8);
        out.push((v & 0x7F) as u8);
    } else {
        out.push(((v >> 22) | 0x80) as u8);
        out.push(((v >> 15) | 0x80) as u8);
        out.push(((v >> 8) | 0x80) as u8);
        out.push((v & 0xFF) as u8);
    }
}

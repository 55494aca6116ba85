//! Self-describing tagged-value serialization.
//!
//! Every encoded value is preceded by exactly one type-tag byte; decoding is
//! driven solely by that tag, with no external schema. Numerics are
//! big-endian and fixed-width. Strings, blobs and collection counts carry a
//! u16 length prefix, which bounds any single element at 65,535 bytes or
//! entries — oversized input is rejected, never truncated.

use crate::error::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// One-byte type tags (stable numbering, append-only)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTag {
    /// Absent value
    Null = 0x00,
    /// Boolean, one byte
    Bool = 0x01,
    /// Signed 8-bit integer
    Int8 = 0x02,
    /// Signed 16-bit integer
    Int16 = 0x03,
    /// Signed 32-bit integer
    Int32 = 0x04,
    /// Signed 64-bit integer
    Int64 = 0x05,
    /// Unsigned 8-bit integer
    UInt8 = 0x06,
    /// Unsigned 16-bit integer
    UInt16 = 0x07,
    /// Unsigned 32-bit integer
    UInt32 = 0x08,
    /// IEEE-754 single-precision float
    Float32 = 0x09,
    /// IEEE-754 double-precision float
    Float64 = 0x0A,
    /// UTF-8 string with u16 length prefix
    String = 0x0B,
    /// Raw byte sequence with u16 length prefix
    Binary = 0x0C,
    /// Ordered sequence of tagged values
    Array = 0x0D,
    /// Ordered string-keyed mapping, insertion order preserved
    Object = 0x0E,
}

impl TryFrom<u8> for ValueTag {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ValueTag::Null),
            0x01 => Ok(ValueTag::Bool),
            0x02 => Ok(ValueTag::Int8),
            0x03 => Ok(ValueTag::Int16),
            0x04 => Ok(ValueTag::Int32),
            0x05 => Ok(ValueTag::Int64),
            0x06 => Ok(ValueTag::UInt8),
            0x07 => Ok(ValueTag::UInt16),
            0x08 => Ok(ValueTag::UInt32),
            0x09 => Ok(ValueTag::Float32),
            0x0A => Ok(ValueTag::Float64),
            0x0B => Ok(ValueTag::String),
            0x0C => Ok(ValueTag::Binary),
            0x0D => Ok(ValueTag::Array),
            0x0E => Ok(ValueTag::Object),
            _ => Err(WireError::MalformedValue),
        }
    }
}

/// Fields of an object value, insertion order preserved
pub type ObjectFields = Vec<(String, Value)>;

/// Dynamically-typed value tree carried by message payloads
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed 8-bit integer
    Int8(i8),
    /// Signed 16-bit integer
    Int16(i16),
    /// Signed 32-bit integer
    Int32(i32),
    /// Signed 64-bit integer
    Int64(i64),
    /// Unsigned 8-bit integer
    UInt8(u8),
    /// Unsigned 16-bit integer
    UInt16(u16),
    /// Unsigned 32-bit integer
    UInt32(u32),
    /// Single-precision float
    Float32(f32),
    /// Double-precision float
    Float64(f64),
    /// UTF-8 string
    String(String),
    /// Raw byte sequence
    Binary(Vec<u8>),
    /// Ordered sequence of values
    Array(Vec<Value>),
    /// Ordered string-keyed mapping
    Object(ObjectFields),
}

impl Value {
    /// Wire tag for this value
    pub fn tag(&self) -> ValueTag {
        match self {
            Value::Null => ValueTag::Null,
            Value::Bool(_) => ValueTag::Bool,
            Value::Int8(_) => ValueTag::Int8,
            Value::Int16(_) => ValueTag::Int16,
            Value::Int32(_) => ValueTag::Int32,
            Value::Int64(_) => ValueTag::Int64,
            Value::UInt8(_) => ValueTag::UInt8,
            Value::UInt16(_) => ValueTag::UInt16,
            Value::UInt32(_) => ValueTag::UInt32,
            Value::Float32(_) => ValueTag::Float32,
            Value::Float64(_) => ValueTag::Float64,
            Value::String(_) => ValueTag::String,
            Value::Binary(_) => ValueTag::Binary,
            Value::Array(_) => ValueTag::Array,
            Value::Object(_) => ValueTag::Object,
        }
    }

    /// Encode this value, tag byte first
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        buf.put_u8(self.tag() as u8);
        self.encode_body(buf)
    }

    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        match self {
            Value::Null => {}
            Value::Bool(v) => buf.put_u8(*v as u8),
            Value::Int8(v) => buf.put_i8(*v),
            Value::Int16(v) => buf.put_i16(*v),
            Value::Int32(v) => buf.put_i32(*v),
            Value::Int64(v) => buf.put_i64(*v),
            Value::UInt8(v) => buf.put_u8(*v),
            Value::UInt16(v) => buf.put_u16(*v),
            Value::UInt32(v) => buf.put_u32(*v),
            Value::Float32(v) => buf.put_f32(*v),
            Value::Float64(v) => buf.put_f64(*v),
            Value::String(v) => put_str(buf, v)?,
            Value::Binary(v) => put_bytes(buf, v)?,
            Value::Array(items) => put_array(buf, items)?,
            Value::Object(fields) => put_object(buf, fields)?,
        }
        Ok(())
    }

    /// Decode one tagged value, advancing the cursor past it
    pub fn decode(buf: &mut Bytes) -> Result<Value, WireError> {
        ensure(buf, 1)?;
        let tag = ValueTag::try_from(buf.get_u8())?;
        Self::decode_body(tag, buf)
    }

    fn decode_body(tag: ValueTag, buf: &mut Bytes) -> Result<Value, WireError> {
        Ok(match tag {
            ValueTag::Null => Value::Null,
            ValueTag::Bool => {
                ensure(buf, 1)?;
                Value::Bool(buf.get_u8() != 0)
            }
            ValueTag::Int8 => {
                ensure(buf, 1)?;
                Value::Int8(buf.get_i8())
            }
            ValueTag::Int16 => {
                ensure(buf, 2)?;
                Value::Int16(buf.get_i16())
            }
            ValueTag::Int32 => {
                ensure(buf, 4)?;
                Value::Int32(buf.get_i32())
            }
            ValueTag::Int64 => {
                ensure(buf, 8)?;
                Value::Int64(buf.get_i64())
            }
            ValueTag::UInt8 => {
                ensure(buf, 1)?;
                Value::UInt8(buf.get_u8())
            }
            ValueTag::UInt16 => {
                ensure(buf, 2)?;
                Value::UInt16(buf.get_u16())
            }
            ValueTag::UInt32 => {
                ensure(buf, 4)?;
                Value::UInt32(buf.get_u32())
            }
            ValueTag::Float32 => {
                ensure(buf, 4)?;
                Value::Float32(buf.get_f32())
            }
            ValueTag::Float64 => {
                ensure(buf, 8)?;
                Value::Float64(buf.get_f64())
            }
            ValueTag::String => Value::String(get_str(buf)?),
            ValueTag::Binary => Value::Binary(get_bytes(buf)?),
            ValueTag::Array => Value::Array(get_array(buf)?),
            ValueTag::Object => Value::Object(get_object(buf)?),
        })
    }

    /// Build a value tree from parsed JSON. Integers that fit 32 bits
    /// become `Int32`, wider ones `Int64`, everything else numeric
    /// `Float64`.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(v) => Value::Bool(*v),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i >= i64::from(i32::MIN) && i <= i64::from(i32::MAX) {
                        Value::Int32(i as i32)
                    } else {
                        Value::Int64(i)
                    }
                } else {
                    Value::Float64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render this value as JSON. Binary blobs become lowercase hex
    /// strings; non-finite floats become null, as JSON cannot carry them.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(v) => (*v).into(),
            Value::Int8(v) => i64::from(*v).into(),
            Value::Int16(v) => i64::from(*v).into(),
            Value::Int32(v) => i64::from(*v).into(),
            Value::Int64(v) => (*v).into(),
            Value::UInt8(v) => u64::from(*v).into(),
            Value::UInt16(v) => u64::from(*v).into(),
            Value::UInt32(v) => u64::from(*v).into(),
            Value::Float32(v) => serde_json::Number::from_f64(f64::from(*v))
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Float64(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(v) => v.clone().into(),
            Value::Binary(v) => {
                let mut hex = String::with_capacity(v.len() * 2);
                for byte in v {
                    hex.push_str(&format!("{byte:02x}"));
                }
                hex.into()
            }
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

pub(crate) fn ensure(buf: &Bytes, len: usize) -> Result<(), WireError> {
    if buf.remaining() < len {
        return Err(WireError::MalformedValue);
    }
    Ok(())
}

/// Write a length-prefixed string without a leading tag byte. The envelope
/// device id and several payload fields use this raw form.
pub fn put_str(buf: &mut BytesMut, value: &str) -> Result<(), WireError> {
    let raw = value.as_bytes();
    if raw.len() > u16::MAX as usize {
        return Err(WireError::UnsupportedValueType("string longer than 65535 bytes"));
    }
    buf.put_u16(raw.len() as u16);
    buf.put_slice(raw);
    Ok(())
}

/// Read a length-prefixed string without a leading tag byte
pub fn get_str(buf: &mut Bytes) -> Result<String, WireError> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure(buf, len)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| WireError::MalformedValue)
}

/// Write a length-prefixed byte blob without a leading tag byte
pub fn put_bytes(buf: &mut BytesMut, value: &[u8]) -> Result<(), WireError> {
    if value.len() > u16::MAX as usize {
        return Err(WireError::UnsupportedValueType("binary longer than 65535 bytes"));
    }
    buf.put_u16(value.len() as u16);
    buf.put_slice(value);
    Ok(())
}

/// Read a length-prefixed byte blob without a leading tag byte
pub fn get_bytes(buf: &mut Bytes) -> Result<Vec<u8>, WireError> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure(buf, len)?;
    Ok(buf.split_to(len).to_vec())
}

/// Write a counted sequence of tagged values without a leading tag byte
pub fn put_array(buf: &mut BytesMut, items: &[Value]) -> Result<(), WireError> {
    if items.len() > u16::MAX as usize {
        return Err(WireError::UnsupportedValueType("array longer than 65535 elements"));
    }
    buf.put_u16(items.len() as u16);
    for item in items {
        item.encode(buf)?;
    }
    Ok(())
}

/// Read a counted sequence of tagged values without a leading tag byte
pub fn get_array(buf: &mut Bytes) -> Result<Vec<Value>, WireError> {
    ensure(buf, 2)?;
    let count = buf.get_u16() as usize;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(Value::decode(buf)?);
    }
    Ok(items)
}

/// Write counted (string key, tagged value) pairs without a leading tag byte
pub fn put_object(buf: &mut BytesMut, fields: &[(String, Value)]) -> Result<(), WireError> {
    if fields.len() > u16::MAX as usize {
        return Err(WireError::UnsupportedValueType("object longer than 65535 entries"));
    }
    buf.put_u16(fields.len() as u16);
    for (key, value) in fields {
        put_str(buf, key)?;
        value.encode(buf)?;
    }
    Ok(())
}

/// Read counted (string key, tagged value) pairs without a leading tag byte
pub fn get_object(buf: &mut Bytes) -> Result<ObjectFields, WireError> {
    ensure(buf, 2)?;
    let count = buf.get_u16() as usize;
    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        let key = get_str(buf)?;
        fields.push((key, Value::decode(buf)?));
    }
    Ok(fields)
}

//! MessagePack encoding for [`WireValue`], built on `rmpv`.
//!
//! Scalars, arrays and maps map one-to-one. Extension frames whose type code
//! matches one of the configured handle codes carry an embedded MessagePack
//! integer (the remote object id) and decode to [`WireValue::Handle`]; any
//! other code decodes to [`WireValue::Ext`] untouched.

use std::io::{self, Cursor};

use rmpv::Value;

use super::value::{Buffer, Handle, Tabpage, WireValue, Window};

/// Extension type codes the editor assigns to its handle kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleTypes {
    pub buffer: i8,
    pub window: i8,
    pub tabpage: i8,
}

impl Default for HandleTypes {
    fn default() -> Self {
        Self {
            buffer: 0,
            window: 1,
            tabpage: 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Stateless codec; construct once and pass by value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WireCodec {
    handles: HandleTypes,
}

impl WireCodec {
    pub fn new(handles: HandleTypes) -> Self {
        Self { handles }
    }

    pub fn handle_types(&self) -> HandleTypes {
        self.handles
    }

    pub fn encode(&self, value: &WireValue, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let raw = self.to_rmpv(value)?;
        rmpv::encode::write_value(out, &raw).map_err(|err| CodecError::Encode(err.to_string()))
    }

    pub fn encode_to_vec(&self, value: &WireValue) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(64);
        self.encode(value, &mut out)?;
        Ok(out)
    }

    /// Decodes exactly one value from the front of `bytes`, advancing the slice.
    pub fn decode(&self, bytes: &mut &[u8]) -> Result<WireValue, CodecError> {
        let raw = rmpv::decode::read_value(bytes)
            .map_err(|err| CodecError::Malformed(err.to_string()))?;
        Ok(self.from_rmpv(raw))
    }

    fn to_rmpv(&self, value: &WireValue) -> Result<Value, CodecError> {
        Ok(match value {
            WireValue::Nil => Value::Nil,
            WireValue::Bool(flag) => Value::Boolean(*flag),
            WireValue::Int(int) => Value::from(*int),
            WireValue::Float(float) => Value::F64(*float),
            WireValue::Str(text) => Value::from(text.as_str()),
            WireValue::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.to_rmpv(item))
                    .collect::<Result<_, _>>()?,
            ),
            WireValue::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(key, value)| Ok((self.to_rmpv(key)?, self.to_rmpv(value)?)))
                    .collect::<Result<_, CodecError>>()?,
            ),
            WireValue::Handle(handle) => {
                let code = match handle {
                    Handle::Buffer(_) => self.handles.buffer,
                    Handle::Window(_) => self.handles.window,
                    Handle::Tabpage(_) => self.handles.tabpage,
                };
                let mut payload = Vec::with_capacity(9);
                rmpv::encode::write_value(&mut payload, &Value::from(handle.id()))
                    .map_err(|err| CodecError::Encode(err.to_string()))?;
                Value::Ext(code, payload)
            }
            WireValue::Ext(code, data) => Value::Ext(*code, data.clone()),
        })
    }

    pub(crate) fn from_rmpv(&self, raw: Value) -> WireValue {
        match raw {
            Value::Nil => WireValue::Nil,
            Value::Boolean(flag) => WireValue::Bool(flag),
            Value::Integer(int) => match int.as_i64() {
                Some(value) => WireValue::Int(value),
                None => int
                    .as_u64()
                    .map_or(WireValue::Int(i64::MAX), WireValue::lossy),
            },
            Value::F32(float) => WireValue::Float(f64::from(float)),
            Value::F64(float) => WireValue::Float(float),
            Value::String(text) => match text.as_str() {
                Some(valid) => WireValue::Str(valid.to_owned()),
                None => WireValue::Str(String::from_utf8_lossy(text.as_bytes()).into_owned()),
            },
            Value::Binary(bytes) => WireValue::Str(String::from_utf8_lossy(&bytes).into_owned()),
            Value::Array(items) => {
                WireValue::Array(items.into_iter().map(|item| self.from_rmpv(item)).collect())
            }
            Value::Map(entries) => WireValue::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (self.from_rmpv(key), self.from_rmpv(value)))
                    .collect(),
            ),
            Value::Ext(code, data) => self.decode_extension(code, data),
        }
    }

    fn decode_extension(&self, code: i8, data: Vec<u8>) -> WireValue {
        let handle: fn(i64) -> Handle = if code == self.handles.buffer {
            |id| Handle::Buffer(Buffer(id))
        } else if code == self.handles.window {
            |id| Handle::Window(Window(id))
        } else if code == self.handles.tabpage {
            |id| Handle::Tabpage(Tabpage(id))
        } else {
            return WireValue::Ext(code, data);
        };
        let mut payload = data.as_slice();
        match rmpv::decode::read_value(&mut payload) {
            Ok(Value::Integer(id)) => match id.as_i64() {
                Some(id) => WireValue::Handle(handle(id)),
                None => WireValue::Ext(code, data),
            },
            _ => WireValue::Ext(code, data),
        }
    }
}

/// Returns `Ok(None)` when `bytes` holds only a prefix of a value.
pub(crate) fn try_decode_prefix(
    codec: &WireCodec,
    bytes: &[u8],
) -> Result<Option<(WireValue, usize)>, CodecError> {
    let mut cursor = Cursor::new(bytes);
    match rmpv::decode::read_value(&mut cursor) {
        Ok(raw) => Ok(Some((codec.from_rmpv(raw), cursor.position() as usize))),
        Err(err) if is_truncated(&err) => Ok(None),
        Err(err) => Err(CodecError::Malformed(err.to_string())),
    }
}

fn is_truncated(err: &rmpv::decode::Error) -> bool {
    match err {
        rmpv::decode::Error::InvalidMarkerRead(io) | rmpv::decode::Error::InvalidDataRead(io) => {
            io.kind() == io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &WireValue) -> WireValue {
        let codec = WireCodec::default();
        let bytes = codec.encode_to_vec(value).expect("encode");
        let mut slice = bytes.as_slice();
        let decoded = codec.decode(&mut slice).expect("decode");
        assert!(slice.is_empty(), "decoder left trailing bytes");
        decoded
    }

    #[test_timeout::timeout]
    fn handles_decode_by_type_code() {
        for handle in [
            Handle::Buffer(Buffer(7)),
            Handle::Window(Window(1000)),
            Handle::Tabpage(Tabpage(-2)),
        ] {
            let value = WireValue::Handle(handle);
            assert_eq!(round_trip(&value), value);
        }
    }

    #[test_timeout::timeout]
    fn handle_ext_payload_is_an_embedded_integer() {
        let codec = WireCodec::default();
        let bytes = codec
            .encode_to_vec(&WireValue::Handle(Handle::Window(Window(5))))
            .expect("encode");
        // fixext1, type 1, positive fixint 5
        assert_eq!(bytes, vec![0xd4, 0x01, 0x05]);
    }

    #[test_timeout::timeout]
    fn unknown_extension_stays_opaque() {
        let value = WireValue::Ext(42, vec![1, 2, 3]);
        assert_eq!(round_trip(&value), value);
    }

    #[test_timeout::timeout]
    fn extensions_nested_in_containers() {
        let value = WireValue::Array(vec![
            WireValue::Map(vec![(
                WireValue::Str("buf".into()),
                WireValue::Handle(Handle::Buffer(Buffer(3))),
            )]),
            WireValue::Ext(9, vec![0xff]),
        ]);
        assert_eq!(round_trip(&value), value);
    }

    #[test_timeout::timeout]
    fn custom_handle_codes_are_respected() {
        let codec = WireCodec::new(HandleTypes {
            buffer: 10,
            window: 11,
            tabpage: 12,
        });
        let bytes = codec
            .encode_to_vec(&WireValue::Handle(Handle::Tabpage(Tabpage(4))))
            .expect("encode");
        assert_eq!(bytes[1], 12);
        let mut slice = bytes.as_slice();
        assert_eq!(
            WireCodec::default().decode(&mut slice).expect("decode"),
            WireValue::Ext(12, vec![0x04])
        );
    }

    #[test_timeout::timeout]
    fn prefix_decode_waits_for_complete_value() {
        let codec = WireCodec::default();
        let bytes = codec
            .encode_to_vec(&WireValue::Str("hello world".into()))
            .expect("encode");
        assert!(
            try_decode_prefix(&codec, &bytes[..4])
                .expect("prefix")
                .is_none()
        );
        let (value, used) = try_decode_prefix(&codec, &bytes)
            .expect("full")
            .expect("value");
        assert_eq!(value, WireValue::Str("hello world".into()));
        assert_eq!(used, bytes.len());
    }
}

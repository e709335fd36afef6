use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Remote buffer reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Buffer(pub i64);

/// Remote window reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Window(pub i64);

/// Remote tabpage reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tabpage(pub i64);

/// Opaque reference to a remote object, carried on the wire as an extension
/// type whose payload is a MessagePack integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Handle {
    Buffer(Buffer),
    Window(Window),
    Tabpage(Tabpage),
}

impl Handle {
    pub fn id(self) -> i64 {
        match self {
            Handle::Buffer(Buffer(id)) | Handle::Window(Window(id)) | Handle::Tabpage(Tabpage(id)) => {
                id
            }
        }
    }
}

/// Every value that crosses the RPC boundary.
///
/// Maps keep their wire order; keys are arbitrary values although the editor
/// only ever sends string keys.
#[derive(Clone, Debug, PartialEq)]
pub enum WireValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<WireValue>),
    Map(Vec<(WireValue, WireValue)>),
    Handle(Handle),
    /// Extension frame with a type code the codec does not recognize.
    Ext(i8, Vec<u8>),
}

impl WireValue {
    /// Explicit lossy path: encodes any displayable host value as its string form.
    pub fn lossy(value: impl fmt::Display) -> Self {
        WireValue::Str(value.to_string())
    }

    /// Builds a string-keyed map, preserving the given order.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: IntoWire,
        I: IntoIterator<Item = (K, V)>,
    {
        WireValue::Map(
            entries
                .into_iter()
                .map(|(key, value)| (WireValue::Str(key.into()), value.into_wire()))
                .collect(),
        )
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, WireValue::Nil)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            WireValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireValue::Float(value) => Some(*value),
            WireValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WireValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::Str(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(WireValue, WireValue)]> {
        match self {
            WireValue::Map(entries) => Some(entries.as_slice()),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            WireValue::Handle(handle) => Some(*handle),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<WireValue>> {
        match self {
            WireValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            WireValue::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Looks up a string key in a map value.
    pub fn get(&self, key: &str) -> Option<&WireValue> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::Nil => f.write_str("nil"),
            WireValue::Bool(value) => write!(f, "{value}"),
            WireValue::Int(value) => write!(f, "{value}"),
            WireValue::Float(value) => write!(f, "{value}"),
            WireValue::Str(value) => write!(f, "{value:?}"),
            WireValue::Array(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            WireValue::Map(entries) => {
                f.write_str("{")?;
                for (idx, (key, value)) in entries.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            WireValue::Handle(handle) => write!(f, "{handle:?}"),
            WireValue::Ext(code, data) => write!(f, "ext({code}, {} bytes)", data.len()),
        }
    }
}

/// Conversion from host values into [`WireValue`].
///
/// Types without a natural wire shape go through [`WireValue::lossy`].
pub trait IntoWire {
    fn into_wire(self) -> WireValue;
}

impl IntoWire for WireValue {
    fn into_wire(self) -> WireValue {
        self
    }
}

impl IntoWire for () {
    fn into_wire(self) -> WireValue {
        WireValue::Nil
    }
}

impl IntoWire for bool {
    fn into_wire(self) -> WireValue {
        WireValue::Bool(self)
    }
}

macro_rules! int_into_wire {
    ($($ty:ty),*) => {
        $(impl IntoWire for $ty {
            fn into_wire(self) -> WireValue {
                WireValue::Int(self as i64)
            }
        })*
    };
}

int_into_wire!(i8, i16, i32, i64, u8, u16, u32, isize);

/// Values above `i64::MAX` have no signed wire form and go through the lossy path.
macro_rules! wide_uint_into_wire {
    ($($ty:ty),*) => {
        $(impl IntoWire for $ty {
            fn into_wire(self) -> WireValue {
                match i64::try_from(self) {
                    Ok(value) => WireValue::Int(value),
                    Err(_) => WireValue::lossy(self),
                }
            }
        })*
    };
}

wide_uint_into_wire!(u64, usize);

impl IntoWire for f32 {
    fn into_wire(self) -> WireValue {
        WireValue::Float(f64::from(self))
    }
}

impl IntoWire for f64 {
    fn into_wire(self) -> WireValue {
        WireValue::Float(self)
    }
}

impl IntoWire for &str {
    fn into_wire(self) -> WireValue {
        WireValue::Str(self.to_owned())
    }
}

impl IntoWire for String {
    fn into_wire(self) -> WireValue {
        WireValue::Str(self)
    }
}

impl IntoWire for char {
    fn into_wire(self) -> WireValue {
        WireValue::lossy(self)
    }
}

impl IntoWire for Handle {
    fn into_wire(self) -> WireValue {
        WireValue::Handle(self)
    }
}

impl IntoWire for Buffer {
    fn into_wire(self) -> WireValue {
        WireValue::Handle(Handle::Buffer(self))
    }
}

impl IntoWire for Window {
    fn into_wire(self) -> WireValue {
        WireValue::Handle(Handle::Window(self))
    }
}

impl IntoWire for Tabpage {
    fn into_wire(self) -> WireValue {
        WireValue::Handle(Handle::Tabpage(self))
    }
}

impl<T: IntoWire> IntoWire for Option<T> {
    fn into_wire(self) -> WireValue {
        self.map_or(WireValue::Nil, IntoWire::into_wire)
    }
}

impl<T: IntoWire> IntoWire for Vec<T> {
    fn into_wire(self) -> WireValue {
        WireValue::Array(self.into_iter().map(IntoWire::into_wire).collect())
    }
}

impl<K: Into<String>, V: IntoWire> IntoWire for HashMap<K, V> {
    fn into_wire(self) -> WireValue {
        WireValue::map(self)
    }
}

impl<K: Into<String>, V: IntoWire> IntoWire for BTreeMap<K, V> {
    fn into_wire(self) -> WireValue {
        WireValue::map(self)
    }
}

macro_rules! from_into_wire {
    ($($ty:ty),*) => {
        $(impl From<$ty> for WireValue {
            fn from(value: $ty) -> Self {
                value.into_wire()
            }
        })*
    };
}

from_into_wire!(
    bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64, &str, String, Handle,
    Buffer, Window, Tabpage
);

impl<T: IntoWire> From<Option<T>> for WireValue {
    fn from(value: Option<T>) -> Self {
        value.into_wire()
    }
}

impl<T: IntoWire> From<Vec<T>> for WireValue {
    fn from(value: Vec<T>) -> Self {
        value.into_wire()
    }
}

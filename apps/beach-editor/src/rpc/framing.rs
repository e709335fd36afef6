use bytes::{Buf, BytesMut};
use rmp::Marker;

use crate::protocol::codec::{self, CodecError, WireCodec};
use crate::protocol::WireValue;

const INITIAL_CAPACITY: usize = 16 * 1024;

/// Accumulates reads from the peer and yields each complete value.
///
/// MessagePack is self-delimiting, so a "frame" is simply one top-level value.
/// A frame may be split across any number of reads; several frames may also
/// arrive in a single read. Frame boundaries are found by walking markers and
/// length prefixes, resuming where the previous read stopped, and a value tree
/// is only built once its last byte has arrived.
pub struct FrameDecoder {
    codec: WireCodec,
    buffer: BytesMut,
    scan: BoundaryScan,
    #[cfg(test)]
    decodes: usize,
}

impl FrameDecoder {
    pub fn new(codec: WireCodec) -> Self {
        Self {
            codec,
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            scan: BoundaryScan::default(),
            #[cfg(test)]
            decodes: 0,
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the next complete value, `Ok(None)` if more bytes are needed.
    ///
    /// An error means the byte stream can no longer be resynchronized.
    pub fn next_value(&mut self) -> Result<Option<WireValue>, CodecError> {
        let Some(end) = self.scan.advance(&self.buffer)? else {
            return Ok(None);
        };
        #[cfg(test)]
        {
            self.decodes += 1;
        }
        let value = match codec::try_decode_prefix(&self.codec, &self.buffer[..end])? {
            Some((value, consumed)) if consumed == end => value,
            _ => {
                return Err(CodecError::Malformed(format!(
                    "frame of {end} bytes did not decode as one value"
                )));
            }
        };
        self.buffer.advance(end);
        Ok(Some(value))
    }
}

/// Resumable walk over one top-level value.
///
/// `offset` is where the next unread item starts; `open` holds how many items
/// each enclosing array or map still expects (maps count keys and values).
#[derive(Debug, Default)]
struct BoundaryScan {
    offset: usize,
    open: Vec<u64>,
}

impl BoundaryScan {
    /// Length of the first complete value in `bytes`, or `None` until it has
    /// fully arrived. Resets itself after reporting a boundary.
    fn advance(&mut self, bytes: &[u8]) -> Result<Option<usize>, CodecError> {
        loop {
            let Some(item) = Item::at(&bytes[self.offset..])? else {
                return Ok(None);
            };
            self.offset += item.len;
            if item.children > 0 {
                self.open.push(item.children);
                continue;
            }
            loop {
                match self.open.last_mut() {
                    None => {
                        let end = self.offset;
                        self.offset = 0;
                        return Ok(Some(end));
                    }
                    Some(remaining) => {
                        *remaining -= 1;
                        if *remaining > 0 {
                            break;
                        }
                        self.open.pop();
                    }
                }
            }
        }
    }
}

/// One marker with its header and inline payload. Container elements are not
/// part of `len`; they are counted in `children`.
struct Item {
    len: usize,
    children: u64,
}

impl Item {
    fn at(bytes: &[u8]) -> Result<Option<Item>, CodecError> {
        let Some(&first) = bytes.first() else {
            return Ok(None);
        };
        let shape = match Marker::from_u8(first) {
            Marker::Null
            | Marker::True
            | Marker::False
            | Marker::FixPos(_)
            | Marker::FixNeg(_) => fixed(0),
            Marker::U8 | Marker::I8 => fixed(1),
            Marker::U16 | Marker::I16 => fixed(2),
            Marker::U32 | Marker::I32 | Marker::F32 => fixed(4),
            Marker::U64 | Marker::I64 | Marker::F64 => fixed(8),
            Marker::FixStr(len) => fixed(u64::from(len)),
            Marker::Str8 | Marker::Bin8 => sized(bytes, 1, 0),
            Marker::Str16 | Marker::Bin16 => sized(bytes, 2, 0),
            Marker::Str32 | Marker::Bin32 => sized(bytes, 4, 0),
            Marker::FixExt1 => fixed(2),
            Marker::FixExt2 => fixed(3),
            Marker::FixExt4 => fixed(5),
            Marker::FixExt8 => fixed(9),
            Marker::FixExt16 => fixed(17),
            Marker::Ext8 => sized(bytes, 1, 1),
            Marker::Ext16 => sized(bytes, 2, 1),
            Marker::Ext32 => sized(bytes, 4, 1),
            Marker::FixArray(len) => Some((0, 0, u64::from(len))),
            Marker::Array16 => counted(bytes, 2, 1),
            Marker::Array32 => counted(bytes, 4, 1),
            Marker::FixMap(len) => Some((0, 0, 2 * u64::from(len))),
            Marker::Map16 => counted(bytes, 2, 2),
            Marker::Map32 => counted(bytes, 4, 2),
            Marker::Reserved => {
                return Err(CodecError::Malformed(format!(
                    "reserved marker {first:#04x}"
                )));
            }
        };
        // The length prefix itself may not have arrived yet.
        let Some((header, payload, children)) = shape else {
            return Ok(None);
        };
        let len = usize::try_from(1 + header + payload)
            .map_err(|_| CodecError::Malformed("frame too large".to_owned()))?;
        if bytes.len() < len {
            return Ok(None);
        }
        Ok(Some(Item { len, children }))
    }
}

/// Header bytes after the marker, inline payload bytes, element count.
type Shape = (u64, u64, u64);

fn fixed(payload: u64) -> Option<Shape> {
    Some((0, payload, 0))
}

/// A `width`-byte length prefix, then `extra` bytes, then that many bytes of data.
fn sized(bytes: &[u8], width: usize, extra: u64) -> Option<Shape> {
    let len = length(bytes, width)?;
    Some((width as u64, extra + len, 0))
}

/// A `width`-byte element count; maps pass `per_entry = 2`.
fn counted(bytes: &[u8], width: usize, per_entry: u64) -> Option<Shape> {
    let count = length(bytes, width)?;
    Some((width as u64, 0, per_entry * count))
}

fn length(bytes: &[u8], width: usize) -> Option<u64> {
    let digits = bytes.get(1..1 + width)?;
    Some(digits.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
}

//! Wire model shared by the RPC transport and the redraw parser.

pub mod codec;
pub mod message;
pub mod value;

pub use codec::{CodecError, HandleTypes, WireCodec};
pub use message::{RpcMessage, serialize_notification, serialize_request};
pub use value::{Buffer, Handle, IntoWire, Tabpage, WireValue, Window};

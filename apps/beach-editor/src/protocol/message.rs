use super::codec::{CodecError, WireCodec};
use super::value::WireValue;

pub const TAG_REQUEST: i64 = 0;
pub const TAG_RESPONSE: i64 = 1;
pub const TAG_NOTIFICATION: i64 = 2;

/// One MessagePack-RPC message.
#[derive(Clone, Debug, PartialEq)]
pub enum RpcMessage {
    Request {
        id: u64,
        method: String,
        args: Vec<WireValue>,
    },
    Response {
        id: u64,
        error: Option<WireValue>,
        result: WireValue,
    },
    Notification {
        method: String,
        args: Vec<WireValue>,
    },
}

impl RpcMessage {
    pub fn into_value(self) -> WireValue {
        match self {
            RpcMessage::Request { id, method, args } => WireValue::Array(vec![
                WireValue::Int(TAG_REQUEST),
                WireValue::Int(id as i64),
                WireValue::Str(method),
                WireValue::Array(args),
            ]),
            RpcMessage::Response { id, error, result } => WireValue::Array(vec![
                WireValue::Int(TAG_RESPONSE),
                WireValue::Int(id as i64),
                error.unwrap_or(WireValue::Nil),
                result,
            ]),
            RpcMessage::Notification { method, args } => WireValue::Array(vec![
                WireValue::Int(TAG_NOTIFICATION),
                WireValue::Str(method),
                WireValue::Array(args),
            ]),
        }
    }

    pub fn from_value(value: WireValue) -> Result<Self, CodecError> {
        let items = value
            .into_array()
            .ok_or(CodecError::InvalidMessage("message is not an array"))?;
        let tag = items
            .first()
            .and_then(WireValue::as_i64)
            .ok_or(CodecError::InvalidMessage("missing message tag"))?;
        let mut items = items.into_iter().skip(1);
        match tag {
            TAG_REQUEST => {
                let (id, method, args) = match (items.next(), items.next(), items.next()) {
                    (Some(id), Some(method), Some(args)) => (id, method, args),
                    _ => return Err(CodecError::InvalidMessage("short request")),
                };
                Ok(RpcMessage::Request {
                    id: message_id(&id)?,
                    method: method
                        .into_string()
                        .ok_or(CodecError::InvalidMessage("request method is not a string"))?,
                    args: args_of(args),
                })
            }
            TAG_RESPONSE => {
                let (id, error, result) = match (items.next(), items.next(), items.next()) {
                    (Some(id), Some(error), Some(result)) => (id, error, result),
                    _ => return Err(CodecError::InvalidMessage("short response")),
                };
                Ok(RpcMessage::Response {
                    id: message_id(&id)?,
                    error: (!error.is_nil()).then_some(error),
                    result,
                })
            }
            TAG_NOTIFICATION => {
                let (method, args) = match (items.next(), items.next()) {
                    (Some(method), Some(args)) => (method, args),
                    _ => return Err(CodecError::InvalidMessage("short notification")),
                };
                Ok(RpcMessage::Notification {
                    method: method
                        .into_string()
                        .ok_or(CodecError::InvalidMessage("notification method is not a string"))?,
                    args: args_of(args),
                })
            }
            _ => Err(CodecError::InvalidMessage("unknown message tag")),
        }
    }
}

fn message_id(value: &WireValue) -> Result<u64, CodecError> {
    value
        .as_i64()
        .and_then(|id| u64::try_from(id).ok())
        .ok_or(CodecError::InvalidMessage("message id is not a non-negative integer"))
}

// Some peers send a bare value instead of an argument array.
fn args_of(value: WireValue) -> Vec<WireValue> {
    match value {
        WireValue::Array(items) => items,
        WireValue::Nil => Vec::new(),
        other => vec![other],
    }
}

/// Bytes for `[0, id, method, args]`.
pub fn serialize_request(
    codec: &WireCodec,
    id: u64,
    method: &str,
    args: Vec<WireValue>,
) -> Result<Vec<u8>, CodecError> {
    codec.encode_to_vec(
        &RpcMessage::Request {
            id,
            method: method.to_owned(),
            args,
        }
        .into_value(),
    )
}

/// Bytes for `[2, method, args]`.
pub fn serialize_notification(
    codec: &WireCodec,
    method: &str,
    args: Vec<WireValue>,
) -> Result<Vec<u8>, CodecError> {
    codec.encode_to_vec(
        &RpcMessage::Notification {
            method: method.to_owned(),
            args,
        }
        .into_value(),
    )
}

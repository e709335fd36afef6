use std::fmt;

use crate::protocol::{CodecError, WireValue};

/// Error object returned by the editor for one request.
///
/// The editor reports errors as `[kind, message]`; anything else is kept as
/// its rendered text.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteError {
    pub kind: Option<i64>,
    pub message: String,
}

impl RemoteError {
    pub fn from_value(value: &WireValue) -> Self {
        match value.as_array() {
            Some([kind, message]) if kind.as_i64().is_some() && message.as_str().is_some() => {
                Self {
                    kind: kind.as_i64(),
                    message: message.as_str().unwrap_or_default().to_owned(),
                }
            }
            _ => Self {
                kind: None,
                message: match value.as_str() {
                    Some(text) => text.to_owned(),
                    None => value.to_string(),
                },
            },
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{} (kind {kind})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("remote error: {0}")]
    Remote(RemoteError),
    #[error("request cancelled")]
    Cancelled,
    #[error("transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Encode(#[from] CodecError),
    #[error("unexpected result from {method}: {detail}")]
    UnexpectedResult {
        method: &'static str,
        detail: String,
    },
}

impl RpcError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RpcError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn editor_error_pair_is_split() {
        let value = WireValue::Array(vec![
            WireValue::Int(0),
            WireValue::Str("Vim:E492: Not an editor command: bogus".into()),
        ]);
        let err = RemoteError::from_value(&value);
        assert_eq!(err.kind, Some(0));
        assert_eq!(err.message, "Vim:E492: Not an editor command: bogus");
    }

    #[test_timeout::timeout]
    fn other_shapes_keep_their_text() {
        assert_eq!(
            RemoteError::from_value(&WireValue::Str("boom".into())).message,
            "boom"
        );
        assert_eq!(RemoteError::from_value(&WireValue::Int(3)).message, "3");
    }
}

use crate::protocol::{Buffer, WireValue};
use crate::redraw::RedrawEvent;

/// Everything the client publishes to its consumer, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum EditorEvent {
    Redraw(RedrawEvent),
    Buffer(BufferEvent),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferEventKind {
    Modified,
    Saved,
    Entered,
    Deleted,
}

impl BufferEventKind {
    pub const ALL: [BufferEventKind; 4] = [
        BufferEventKind::Modified,
        BufferEventKind::Saved,
        BufferEventKind::Entered,
        BufferEventKind::Deleted,
    ];

    /// Notification method sent by the installed autocmd.
    pub fn method(self) -> &'static str {
        match self {
            BufferEventKind::Modified => "buffer_modified",
            BufferEventKind::Saved => "buffer_saved",
            BufferEventKind::Entered => "buffer_entered",
            BufferEventKind::Deleted => "buffer_deleted",
        }
    }

    /// Editor autocmd event that triggers the notification.
    pub fn autocmd(self) -> &'static str {
        match self {
            BufferEventKind::Modified => "BufModifiedSet",
            BufferEventKind::Saved => "BufWritePost",
            BufferEventKind::Entered => "BufEnter",
            BufferEventKind::Deleted => "BufDelete",
        }
    }

    pub fn from_method(method: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.method() == method)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferEvent {
    pub kind: BufferEventKind,
    pub buffer: Buffer,
    pub file: String,
}

impl BufferEvent {
    /// Builds the event from `[bufnr, file]`; a missing file name is empty.
    pub fn from_params(kind: BufferEventKind, params: &[WireValue]) -> Option<Self> {
        let buffer = match params.first()? {
            WireValue::Handle(crate::protocol::Handle::Buffer(buffer)) => *buffer,
            other => Buffer(other.as_i64()?),
        };
        let file = params
            .get(1)
            .and_then(WireValue::as_str)
            .unwrap_or_default()
            .to_owned();
        Some(Self { kind, buffer, file })
    }
}

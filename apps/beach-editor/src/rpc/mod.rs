//! MessagePack-RPC transport over a pair of byte streams.
//!
//! One background task owns the read half: it decodes frames, resolves pending
//! requests by id and pushes notifications onto an unbounded queue. Writers
//! share the write half behind an async mutex so every message goes out as one
//! uninterrupted buffer. When the stream closes, a fatal decode error occurs or
//! the shared [`CancellationToken`] fires, every pending request resolves as
//! [`RpcError::Cancelled`] and the notification queue closes.

pub mod error;
pub mod framing;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::protocol::{RpcMessage, WireCodec, WireValue, serialize_notification, serialize_request};
use crate::telemetry::logging::hexdump;

pub use error::{RemoteError, RpcError};
pub use framing::FrameDecoder;

const READ_CHUNK: usize = 64 * 1024;

/// A notification pushed by the editor.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Vec<WireValue>,
}

type Completion = oneshot::Sender<Result<WireValue, RpcError>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Default)]
struct PendingTable {
    entries: HashMap<u64, Completion>,
    closed: bool,
}

struct Shared {
    codec: WireCodec,
    writer: AsyncMutex<BoxedWriter>,
    next_id: AtomicU64,
    pending: Mutex<PendingTable>,
    cancel: CancellationToken,
}

impl Shared {
    fn register(&self, id: u64) -> Result<oneshot::Receiver<Result<WireValue, RpcError>>, RpcError> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();
        if pending.closed {
            return Err(RpcError::Cancelled);
        }
        pending.entries.insert(id, tx);
        Ok(rx)
    }

    fn forget(&self, id: u64) {
        self.pending.lock().entries.remove(&id);
    }

    /// Resolves every outstanding request as cancelled and refuses new ones.
    fn close_pending(&self) -> usize {
        let drained: Vec<(u64, Completion)> = {
            let mut pending = self.pending.lock();
            pending.closed = true;
            pending.entries.drain().collect()
        };
        let count = drained.len();
        for (id, completion) in drained {
            trace!(target: "editor::rpc", id, "cancelling pending request");
            let _ = completion.send(Err(RpcError::Cancelled));
        }
        count
    }

    async fn write_frame(&self, bytes: &[u8]) -> Result<(), RpcError> {
        if self.cancel.is_cancelled() {
            return Err(RpcError::Cancelled);
        }
        let mut writer = self.writer.lock().await;
        writer
            .write_all(bytes)
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|err| RpcError::Transport(err.to_string()))
    }

    fn dispatch(&self, value: WireValue, notifications: &UnboundedSender<Notification>) {
        let message = match RpcMessage::from_value(value) {
            Ok(message) => message,
            Err(err) => {
                warn!(target: "editor::rpc", error = %err, "skipping undecodable message");
                return;
            }
        };
        match message {
            RpcMessage::Response { id, error, result } => {
                let completion = self.pending.lock().entries.remove(&id);
                let Some(completion) = completion else {
                    debug!(target: "editor::rpc", id, "response for unknown request id");
                    return;
                };
                let outcome = match error {
                    Some(error) => Err(RpcError::Remote(RemoteError::from_value(&error))),
                    None => Ok(result),
                };
                if completion.send(outcome).is_err() {
                    trace!(target: "editor::rpc", id, "caller dropped before response arrived");
                }
            }
            RpcMessage::Notification { method, args } => {
                trace!(target: "editor::rpc", method = %method, args = args.len(), "notification");
                // Receiver may already be gone during shutdown.
                let _ = notifications.send(Notification {
                    method,
                    params: args,
                });
            }
            RpcMessage::Request { id, method, .. } => {
                warn!(
                    target: "editor::rpc",
                    id,
                    method = %method,
                    "request from peer, unhandled"
                );
            }
        }
    }
}

/// Client half of a MessagePack-RPC session.
pub struct RpcTransport {
    shared: Arc<Shared>,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

impl RpcTransport {
    /// Spawns the read loop and returns the transport together with the
    /// notification queue it feeds. Must be called inside a tokio runtime.
    pub fn start<R, W>(
        reader: R,
        writer: W,
        codec: WireCodec,
        cancel: CancellationToken,
    ) -> (Self, UnboundedReceiver<Notification>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            codec,
            writer: AsyncMutex::new(Box::new(writer)),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(PendingTable::default()),
            cancel,
        });
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let read_task = tokio::spawn(read_loop(Arc::clone(&shared), reader, notify_tx));
        (
            Self {
                shared,
                read_task: Mutex::new(Some(read_task)),
            },
            notify_rx,
        )
    }

    /// Sends a request and waits for its response. There is no per-call
    /// timeout; a call only ends early when the session is torn down.
    pub async fn call(&self, method: &str, args: Vec<WireValue>) -> Result<WireValue, RpcError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let bytes = serialize_request(&self.shared.codec, id, method, args)?;
        let response = self.shared.register(id)?;
        trace!(target: "editor::rpc", id, method, bytes = bytes.len(), "request");
        if tracing::enabled!(target: "editor::rpc::wire", tracing::Level::TRACE) {
            trace!(target: "editor::rpc::wire", "outgoing frame\n{}", hexdump(&bytes));
        }
        if let Err(err) = self.shared.write_frame(&bytes).await {
            self.shared.forget(id);
            return Err(err);
        }
        match response.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RpcError::Cancelled),
        }
    }

    /// Fire-and-forget notification.
    pub async fn notify(&self, method: &str, args: Vec<WireValue>) -> Result<(), RpcError> {
        let bytes = serialize_notification(&self.shared.codec, method, args)?;
        trace!(target: "editor::rpc", method, bytes = bytes.len(), "notify");
        self.shared.write_frame(&bytes).await
    }

    pub fn codec(&self) -> WireCodec {
        self.shared.codec
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.pending.lock().entries.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Cancels the read loop, waits for it to finish and resolves anything
    /// still pending. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        let task = self.read_task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(target: "editor::rpc", error = %err, "read loop ended abnormally");
            }
        }
        self.shared.close_pending();
        let mut writer = self.shared.writer.lock().await;
        if let Err(err) = writer.shutdown().await {
            trace!(target: "editor::rpc", error = %err, "writer shutdown failed");
        }
    }
}

impl Drop for RpcTransport {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        self.shared.close_pending();
    }
}

async fn read_loop<R>(shared: Arc<Shared>, mut reader: R, notifications: UnboundedSender<Notification>)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new(shared.codec);
    let mut chunk = vec![0u8; READ_CHUNK];
    'read: loop {
        let read = tokio::select! {
            _ = shared.cancel.cancelled() => {
                debug!(target: "editor::rpc", "read loop cancelled");
                break 'read;
            }
            read = reader.read(&mut chunk) => read,
        };
        let count = match read {
            Ok(0) => {
                debug!(
                    target: "editor::rpc",
                    buffered = decoder.buffered(),
                    "peer closed the stream"
                );
                break 'read;
            }
            Ok(count) => count,
            Err(err) => {
                warn!(target: "editor::rpc", error = %err, "read failed");
                break 'read;
            }
        };
        decoder.extend(&chunk[..count]);
        loop {
            match decoder.next_value() {
                Ok(Some(value)) => shared.dispatch(value, &notifications),
                Ok(None) => break,
                Err(err) => {
                    warn!(target: "editor::rpc", error = %err, "fatal decode error");
                    break 'read;
                }
            }
        }
    }
    shared.cancel.cancel();
    let cancelled = shared.close_pending();
    if cancelled > 0 {
        debug!(target: "editor::rpc", cancelled, "resolved pending requests after teardown");
    }
    // Dropping the sender closes the notification queue for the drain task.
    drop(notifications);
}

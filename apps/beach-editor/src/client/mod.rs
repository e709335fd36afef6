//! Facade over the editor process, the RPC transport and the screen model.

pub mod events;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::EditorConfig;
use crate::error::ClientError;
use crate::grid::{Screen, SharedScreen};
use crate::process::{EditorProcess, ProcessPipes, SpawnConfig};
use crate::protocol::{Buffer, Handle, IntoWire, WireCodec, WireValue};
use crate::redraw::{REDRAW_METHOD, parse_redraw};
use crate::rpc::{Notification, RpcError, RpcTransport};
use crate::telemetry::PerfGuard;

pub use events::{BufferEvent, BufferEventKind, EditorEvent};

const BUFFER_AUGROUP: &str = "beach_editor_buffers";

/// `metadata.version` from `nvim_get_api_info`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: i64,
    pub minor: i64,
    pub patch: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiInfo {
    pub channel_id: i64,
    pub metadata: WireValue,
}

impl ApiInfo {
    fn from_result(result: WireValue) -> Result<Self, RpcError> {
        let bad_shape = |detail: &str| RpcError::UnexpectedResult {
            method: "nvim_get_api_info",
            detail: detail.to_owned(),
        };
        let mut parts = result
            .into_array()
            .ok_or_else(|| bad_shape("expected [channel_id, metadata]"))?
            .into_iter();
        let channel_id = parts
            .next()
            .and_then(|value| value.as_i64())
            .ok_or_else(|| bad_shape("missing channel id"))?;
        let metadata = parts.next().unwrap_or(WireValue::Nil);
        Ok(Self {
            channel_id,
            metadata,
        })
    }

    pub fn version(&self) -> Option<ApiVersion> {
        let version = self.metadata.get("version")?;
        let field = |name: &str| version.get(name).and_then(WireValue::as_i64);
        Some(ApiVersion {
            major: field("major")?,
            minor: field("minor")?,
            patch: field("patch").unwrap_or(0),
        })
    }
}

#[derive(Default)]
struct State {
    transport: Option<Arc<RpcTransport>>,
    process: Option<EditorProcess>,
    drain_task: Option<JoinHandle<()>>,
    event_tx: Option<UnboundedSender<EditorEvent>>,
    channel_id: Option<i64>,
    /// Set by `shutdown`; the event stream is gone and cannot be reopened.
    closed: bool,
}

/// Session with one embedded editor.
///
/// Requests may be issued concurrently from any task. Screen updates are
/// applied to [`EditorClient::screen`] and republished on the event stream
/// returned by [`EditorClient::take_events`].
pub struct EditorClient {
    config: EditorConfig,
    codec: WireCodec,
    screen: SharedScreen,
    state: Mutex<State>,
    events: Mutex<Option<UnboundedReceiver<EditorEvent>>>,
}

impl EditorClient {
    pub fn new(config: EditorConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let screen = Screen::new(config.width, config.height).shared();
        Self {
            config,
            codec: WireCodec::default(),
            screen,
            state: Mutex::new(State {
                event_tx: Some(event_tx),
                ..State::default()
            }),
            events: Mutex::new(Some(event_rx)),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// The single consumer's end of the event stream. `None` after the first call.
    pub fn take_events(&self) -> Option<UnboundedReceiver<EditorEvent>> {
        self.events.lock().take()
    }

    pub fn screen(&self) -> SharedScreen {
        Arc::clone(&self.screen)
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .transport
            .as_ref()
            .is_some_and(|transport| !transport.is_closed())
    }

    /// Launches the configured editor and connects to its stdio.
    ///
    /// A client runs one session: after [`EditorClient::shutdown`] this
    /// fails with [`ClientError::Closed`] without spawning anything.
    pub fn start(&self) -> Result<(), ClientError> {
        {
            let state = self.state.lock();
            if state.closed {
                return Err(ClientError::Closed);
            }
            if state.transport.is_some() {
                debug!(target: "editor::client", "already started");
                return Ok(());
            }
        }
        let (process, ProcessPipes { stdin, stdout }) =
            EditorProcess::spawn(&SpawnConfig::from(&self.config))?;
        self.connect(stdout, stdin, Some(process));
        Ok(())
    }

    /// Connects to an editor already speaking RPC on the given streams.
    pub fn connect_streams<R, W>(&self, reader: R, writer: W) -> Result<(), ClientError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        {
            let state = self.state.lock();
            if state.closed {
                return Err(ClientError::Closed);
            }
            if state.transport.is_some() {
                debug!(target: "editor::client", "already connected");
                return Ok(());
            }
        }
        self.connect(reader, writer, None);
        Ok(())
    }

    fn connect<R, W>(&self, reader: R, writer: W, process: Option<EditorProcess>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let cancel = CancellationToken::new();
        let (transport, notifications) =
            RpcTransport::start(reader, writer, self.codec, cancel.clone());
        let mut state = self.state.lock();
        let drain_task = state.event_tx.take().map(|event_tx| {
            tokio::spawn(drain_notifications(
                notifications,
                event_tx,
                Arc::clone(&self.screen),
                cancel,
            ))
        });
        state.transport = Some(Arc::new(transport));
        state.process = process;
        state.drain_task = drain_task;
        info!(target: "editor::client", "editor session started");
    }

    fn transport(&self) -> Result<Arc<RpcTransport>, ClientError> {
        let state = self.state.lock();
        match &state.transport {
            Some(transport) => Ok(Arc::clone(transport)),
            None if state.closed => Err(ClientError::Closed),
            None => Err(ClientError::NotStarted),
        }
    }

    pub async fn call(&self, method: &str, args: Vec<WireValue>) -> Result<WireValue, ClientError> {
        let transport = self.transport()?;
        Ok(transport.call(method, args).await?)
    }

    pub async fn notify(&self, method: &str, args: Vec<WireValue>) -> Result<(), ClientError> {
        let transport = self.transport()?;
        Ok(transport.notify(method, args).await?)
    }

    pub async fn ui_attach(&self, width: usize, height: usize) -> Result<(), ClientError> {
        let options = self.config.ui_options.to_wire();
        self.call(
            "nvim_ui_attach",
            vec![width.into_wire(), height.into_wire(), options],
        )
        .await?;
        Ok(())
    }

    pub async fn ui_detach(&self) -> Result<(), ClientError> {
        self.call("nvim_ui_detach", Vec::new()).await?;
        Ok(())
    }

    /// Resizes the local grid right away, then asks the editor to follow.
    ///
    /// This is the one write to the grid outside the drain task, so a
    /// renderer sees the new size before the editor's `grid_resize` arrives.
    /// Both writers go through the screen lock.
    pub async fn ui_try_resize(&self, width: usize, height: usize) -> Result<(), ClientError> {
        self.screen.lock().grid.resize(width.max(1), height.max(1));
        self.call(
            "nvim_ui_try_resize",
            vec![width.into_wire(), height.into_wire()],
        )
        .await?;
        Ok(())
    }

    /// Sends keys in key notation; returns how many bytes the editor accepted.
    pub async fn input(&self, keys: &str) -> Result<i64, ClientError> {
        let result = self.call("nvim_input", vec![keys.into_wire()]).await?;
        result.as_i64().ok_or_else(|| {
            unexpected("nvim_input", format!("expected an integer, got {result}"))
        })
    }

    pub async fn command(&self, command: &str) -> Result<(), ClientError> {
        self.call("nvim_command", vec![command.into_wire()]).await?;
        Ok(())
    }

    pub async fn buf_get_lines(
        &self,
        buffer: Buffer,
        start: i64,
        end: i64,
        strict: bool,
    ) -> Result<Vec<String>, ClientError> {
        let result = self
            .call(
                "nvim_buf_get_lines",
                vec![
                    buffer.into_wire(),
                    start.into_wire(),
                    end.into_wire(),
                    strict.into_wire(),
                ],
            )
            .await?;
        let lines = result
            .into_array()
            .ok_or_else(|| unexpected("nvim_buf_get_lines", "expected an array".to_owned()))?;
        lines
            .into_iter()
            .map(|line| {
                line.into_string().ok_or_else(|| {
                    unexpected("nvim_buf_get_lines", "expected string lines".to_owned())
                })
            })
            .collect()
    }

    pub async fn buf_set_lines(
        &self,
        buffer: Buffer,
        start: i64,
        end: i64,
        strict: bool,
        lines: &[String],
    ) -> Result<(), ClientError> {
        let lines: Vec<WireValue> = lines.iter().map(|line| line.as_str().into_wire()).collect();
        self.call(
            "nvim_buf_set_lines",
            vec![
                buffer.into_wire(),
                start.into_wire(),
                end.into_wire(),
                strict.into_wire(),
                WireValue::Array(lines),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn get_api_info(&self) -> Result<ApiInfo, ClientError> {
        let result = self.call("nvim_get_api_info", Vec::new()).await?;
        let info = ApiInfo::from_result(result)?;
        self.state.lock().channel_id = Some(info.channel_id);
        Ok(info)
    }

    pub async fn eval(&self, expr: &str) -> Result<WireValue, ClientError> {
        self.call("nvim_eval", vec![expr.into_wire()]).await
    }

    pub async fn current_buffer(&self) -> Result<Buffer, ClientError> {
        let result = self.call("nvim_get_current_buf", Vec::new()).await?;
        match result.as_handle() {
            Some(Handle::Buffer(buffer)) => Ok(buffer),
            _ => Err(unexpected(
                "nvim_get_current_buf",
                format!("expected a buffer handle, got {result}"),
            )),
        }
    }

    /// Installs autocmds that report buffer lifecycle changes back to this
    /// channel as [`EditorEvent::Buffer`].
    pub async fn subscribe_buffer_events(&self) -> Result<(), ClientError> {
        let cached = self.state.lock().channel_id;
        let channel_id = match cached {
            Some(id) => id,
            None => self.get_api_info().await?.channel_id,
        };
        self.command(&format!("augroup {BUFFER_AUGROUP}")).await?;
        self.command("autocmd!").await?;
        for kind in BufferEventKind::ALL {
            self.command(&buffer_autocmd(channel_id, kind)).await?;
        }
        self.command("augroup END").await?;
        debug!(target: "editor::client", channel_id, "buffer events subscribed");
        Ok(())
    }

    /// Ends the session. Every step runs even if an earlier one fails, and
    /// calling it again (or on a client that never started) is a no-op.
    pub async fn shutdown(&self, timeout: Duration) {
        let (transport, mut process, drain_task, event_tx) = {
            let mut state = self.state.lock();
            state.closed = true;
            (
                state.transport.take(),
                state.process.take(),
                state.drain_task.take(),
                state.event_tx.take(),
            )
        };
        // Never started: closing the sender ends the consumer's stream.
        drop(event_tx);

        // 1. Graceful quit. A notification, so a peer that is already going
        //    away cannot leave us waiting for a response.
        if let Some(transport) = &transport {
            let running = match process.as_mut() {
                Some(process) => process.is_running(),
                None => !transport.is_closed(),
            };
            if running {
                if let Err(err) = transport.notify("nvim_command", vec!["qa!".into_wire()]).await {
                    debug!(target: "editor::client", error = %err, "quit command not delivered");
                }
            }
        }

        // 2. and 3. Wait for exit, then force-kill.
        if let Some(process) = process.as_mut() {
            if process.wait_for_exit(timeout).await.is_none() {
                process.kill_tree().await;
            }
        }

        // 4. Stop the drain task.
        if let Some(transport) = &transport {
            transport.cancellation().cancel();
        }
        if let Some(task) = drain_task {
            if let Err(err) = task.await {
                warn!(target: "editor::client", error = %err, "event task ended abnormally");
            }
        }

        // 5. Transport.
        if let Some(transport) = transport {
            transport.shutdown().await;
        }

        // 6. Process handle.
        if let Some(process) = process {
            process.dispose().await;
        }
        debug!(target: "editor::client", "editor session closed");
    }

    /// Shuts down with the configured timeout and releases the client.
    pub async fn dispose(self) {
        self.shutdown(self.config.shutdown_timeout()).await;
    }
}

impl Drop for EditorClient {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(task) = state.drain_task.take() {
            task.abort();
        }
        if let Some(transport) = state.transport.take() {
            transport.cancellation().cancel();
        }
        // `kill_on_drop` takes care of a child that is still running.
        state.process.take();
    }
}

fn unexpected(method: &'static str, detail: String) -> ClientError {
    ClientError::Rpc(RpcError::UnexpectedResult { method, detail })
}

fn buffer_autocmd(channel_id: i64, kind: BufferEventKind) -> String {
    format!(
        "autocmd {event} * call rpcnotify({channel_id}, '{method}', str2nr(expand('<abuf>')), expand('<afile>:p'))",
        event = kind.autocmd(),
        method = kind.method(),
    )
}

async fn drain_notifications(
    mut notifications: UnboundedReceiver<Notification>,
    events: UnboundedSender<EditorEvent>,
    screen: SharedScreen,
    cancel: CancellationToken,
) {
    loop {
        let notification = tokio::select! {
            biased;
            next = notifications.recv() => match next {
                Some(notification) => notification,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };
        handle_notification(notification, &events, &screen);
    }
    debug!(target: "editor::client", "event stream closed");
}

fn handle_notification(
    notification: Notification,
    events: &UnboundedSender<EditorEvent>,
    screen: &SharedScreen,
) {
    let Notification { method, params } = notification;
    if method == REDRAW_METHOD {
        let batch = parse_redraw(&params);
        {
            let _perf = PerfGuard::new("grid.apply");
            screen.lock().apply_all(&batch);
        }
        for event in batch {
            if events.send(EditorEvent::Redraw(event)).is_err() {
                trace!(target: "editor::client", "event consumer gone");
                break;
            }
        }
        return;
    }
    match BufferEventKind::from_method(&method) {
        Some(kind) => match BufferEvent::from_params(kind, &params) {
            Some(event) => {
                let _ = events.send(EditorEvent::Buffer(event));
            }
            None => warn!(target: "editor::client", method = %method, "malformed buffer event"),
        },
        None => trace!(target: "editor::client", method = %method, "dropping notification"),
    }
}

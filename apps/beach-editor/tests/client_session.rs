mod common;

use std::sync::Arc;
use std::time::Duration;

use beach_editor::client::{BufferEvent, BufferEventKind, EditorClient, EditorEvent};
use beach_editor::config::EditorConfig;
use beach_editor::error::ClientError;
use beach_editor::protocol::{Buffer, Handle, RpcMessage, WireValue};
use beach_editor::redraw::RedrawEvent;
use common::{FakeEditor, group};

fn connected(width: usize, height: usize) -> (Arc<EditorClient>, FakeEditor) {
    let config = EditorConfig {
        width,
        height,
        ..EditorConfig::default()
    };
    let client = Arc::new(EditorClient::new(config));
    let (reader, writer, editor) = common::session();
    client.connect_streams(reader, writer).expect("connect");
    (client, editor)
}

fn int(value: i64) -> WireValue {
    WireValue::Int(value)
}

fn cell(text: &str, hl_id: i64, repeat: i64) -> WireValue {
    WireValue::Array(vec![text.into(), int(hl_id), int(repeat)])
}

#[test_timeout::tokio_timeout_test(10)]
async fn attach_sends_linegrid_options() {
    let (client, mut editor) = connected(20, 3);
    let attach = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.ui_attach(20, 3).await }
    });
    let (id, method, args) = editor.request().await;
    assert_eq!(method, "nvim_ui_attach");
    assert_eq!(&args[..2], &[int(20), int(3)]);
    assert_eq!(args[2].get("ext_linegrid"), Some(&WireValue::Bool(true)));
    assert_eq!(args[2].get("rgb"), Some(&WireValue::Bool(true)));
    editor.respond(id, WireValue::Nil).await;
    attach.await.expect("join").expect("attach");
}

#[test_timeout::tokio_timeout_test(10)]
async fn redraw_batches_update_the_screen_then_publish() {
    let (client, mut editor) = connected(20, 3);
    let mut events = client.take_events().expect("events");

    editor
        .notify(
            "redraw",
            vec![
                group("grid_resize", vec![vec![int(1), int(20), int(3)]]),
                group(
                    "grid_line",
                    vec![vec![
                        int(1),
                        int(1),
                        int(0),
                        WireValue::Array(vec![cell(" ", 0, 10), cell("X", 1, 5)]),
                        WireValue::Bool(false),
                    ]],
                ),
                group("grid_cursor_goto", vec![vec![int(1), int(1), int(15)]]),
                group("flush", vec![Vec::new()]),
            ],
        )
        .await;

    let mut names = Vec::new();
    loop {
        let event = events.recv().await.expect("event");
        let done = matches!(event, EditorEvent::Redraw(RedrawEvent::Flush));
        names.push(match event {
            EditorEvent::Redraw(RedrawEvent::GridResize { .. }) => "grid_resize",
            EditorEvent::Redraw(RedrawEvent::GridLine(_)) => "grid_line",
            EditorEvent::Redraw(RedrawEvent::GridCursorGoto { .. }) => "grid_cursor_goto",
            EditorEvent::Redraw(RedrawEvent::Flush) => "flush",
            _ => "other",
        });
        if done {
            break;
        }
    }
    assert_eq!(names, ["grid_resize", "grid_line", "grid_cursor_goto", "flush"]);

    let screen = client.screen();
    let mut screen = screen.lock();
    assert_eq!(
        screen.grid.row_text(1).as_deref(),
        Some("          XXXXX     ")
    );
    assert_eq!(screen.grid.cursor().col, 15);
    assert!(screen.grid.is_dirty(1));
    screen.grid.clear_dirty_rows();
    assert!(screen.grid.dirty_rows().is_empty());
}

#[test_timeout::tokio_timeout_test(10)]
async fn buffer_notifications_become_typed_events() {
    let (client, mut editor) = connected(10, 2);
    let mut events = client.take_events().expect("events");
    editor.notify("some_plugin_event", vec![int(1)]).await;
    editor
        .notify("buffer_modified", vec![int(4), "/tmp/draft.md".into()])
        .await;

    let event = events.recv().await.expect("event");
    assert_eq!(
        event,
        EditorEvent::Buffer(BufferEvent {
            kind: BufferEventKind::Modified,
            buffer: Buffer(4),
            file: "/tmp/draft.md".into(),
        })
    );
}

#[test_timeout::tokio_timeout_test(10)]
async fn subscribe_installs_autocmds_for_this_channel() {
    let (client, mut editor) = connected(10, 2);
    let subscribe = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.subscribe_buffer_events().await }
    });

    let (id, method, _) = editor.request().await;
    assert_eq!(method, "nvim_get_api_info");
    editor
        .respond(id, WireValue::Array(vec![int(7), WireValue::Map(Vec::new())]))
        .await;

    let mut commands = Vec::new();
    loop {
        let (id, method, args) = editor.request().await;
        assert_eq!(method, "nvim_command");
        let command = args[0].as_str().expect("command text").to_owned();
        editor.respond(id, WireValue::Nil).await;
        let done = command == "augroup END";
        commands.push(command);
        if done {
            break;
        }
    }
    subscribe.await.expect("join").expect("subscribe");

    assert_eq!(commands.first().map(String::as_str), Some("augroup beach_editor_buffers"));
    let autocmds: Vec<&String> = commands
        .iter()
        .filter(|cmd| cmd.starts_with("autocmd "))
        .collect();
    assert_eq!(autocmds.len(), 4);
    assert!(autocmds.iter().all(|cmd| cmd.contains("rpcnotify(7, ")));
    assert!(autocmds.iter().any(|cmd| cmd.contains("'buffer_deleted'")));
}

#[test_timeout::tokio_timeout_test(10)]
async fn typed_wrappers_decode_results() {
    let (client, mut editor) = connected(10, 2);

    let input = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.input("ihi<Esc>").await }
    });
    let (id, method, _) = editor.request().await;
    assert_eq!(method, "nvim_input");
    editor.respond(id, int(8)).await;
    assert_eq!(input.await.expect("join").expect("input"), 8);

    let current = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.current_buffer().await }
    });
    let (id, ..) = editor.request().await;
    editor
        .respond(id, WireValue::Handle(Handle::Buffer(Buffer(3))))
        .await;
    assert_eq!(current.await.expect("join").expect("buffer"), Buffer(3));

    let lines = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.buf_get_lines(Buffer(3), 0, -1, false).await }
    });
    let (id, method, args) = editor.request().await;
    assert_eq!(method, "nvim_buf_get_lines");
    assert_eq!(args[0], WireValue::Handle(Handle::Buffer(Buffer(3))));
    assert_eq!(&args[1..], &[int(0), int(-1), WireValue::Bool(false)]);
    editor
        .respond(
            id,
            WireValue::Array(vec!["---".into(), "title: hi".into(), "---".into()]),
        )
        .await;
    assert_eq!(
        lines.await.expect("join").expect("lines"),
        vec!["---", "title: hi", "---"]
    );

    let bad = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.input("x").await }
    });
    let (id, ..) = editor.request().await;
    editor.respond(id, "not a number".into()).await;
    let err = bad.await.expect("join").expect_err("shape");
    assert!(err.to_string().contains("nvim_input"));
}

#[test_timeout::tokio_timeout_test(10)]
async fn try_resize_resizes_locally_first() {
    let (client, mut editor) = connected(10, 4);
    client.screen().lock().grid.clear_dirty_rows();
    let resize = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.ui_try_resize(30, 6).await }
    });
    let (id, method, args) = editor.request().await;
    assert_eq!(method, "nvim_ui_try_resize");
    assert_eq!(args, vec![int(30), int(6)]);
    {
        let screen = client.screen();
        let screen = screen.lock();
        assert_eq!((screen.grid.width(), screen.grid.height()), (30, 6));
        assert_eq!(screen.grid.dirty_rows().len(), 6);
    }
    editor.respond(id, WireValue::Nil).await;
    resize.await.expect("join").expect("resize");
}

#[test_timeout::tokio_timeout_test(10)]
async fn editor_vanishing_mid_session_ends_everything() {
    let (client, mut editor) = connected(10, 2);
    let mut events = client.take_events().expect("events");

    let pending = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.command("sleep 10").await }
    });
    editor.request().await;
    editor.hang_up();

    let err = pending.await.expect("join").expect_err("cancelled");
    assert!(err.is_cancelled());
    assert!(events.recv().await.is_none());
    assert!(!client.is_connected());

    client.shutdown(Duration::from_millis(50)).await;
    client.shutdown(Duration::from_millis(50)).await;
}

#[test_timeout::tokio_timeout_test(10)]
async fn shutdown_asks_the_editor_to_quit() {
    let (client, mut editor) = connected(10, 2);
    let mut events = client.take_events().expect("events");

    client.shutdown(Duration::from_millis(50)).await;

    match editor.recv().await {
        Some(RpcMessage::Notification { method, args }) => {
            assert_eq!(method, "nvim_command");
            assert_eq!(args, vec![WireValue::from("qa!")]);
        }
        other => panic!("expected quit notification, got {other:?}"),
    }
    assert!(events.recv().await.is_none());
    assert!(matches!(
        client.command("echo").await,
        Err(ClientError::Closed)
    ));
}

#[test_timeout::tokio_timeout_test(10)]
async fn reconnecting_after_shutdown_is_refused() {
    let (client, _editor) = connected(10, 2);
    client.shutdown(Duration::from_millis(50)).await;

    let (reader, writer, _editor) = common::session();
    let err = client.connect_streams(reader, writer).expect_err("closed");
    assert!(matches!(err, ClientError::Closed));
    assert!(!client.is_connected());
    assert!(matches!(
        client.command("echo").await,
        Err(ClientError::Closed)
    ));
    let screen = client.screen();
    let screen = screen.lock();
    assert_eq!((screen.grid.width(), screen.grid.height()), (10, 2));
}

#[test_timeout::tokio_timeout_test(10)]
async fn never_started_client_shuts_down_cleanly() {
    let client = EditorClient::new(EditorConfig::default());
    let mut events = client.take_events().expect("events");
    client.shutdown(Duration::from_millis(10)).await;
    assert!(events.recv().await.is_none());
    client.dispose().await;
}

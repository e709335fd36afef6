mod cli;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::Instant;
use tracing::debug;

use beach_editor::client::{EditorClient, EditorEvent};
use beach_editor::config::EditorConfig;
use beach_editor::protocol::Buffer;
use beach_editor::redraw::RedrawEvent;
use beach_editor::telemetry::logging as logctl;

use cli::{Cli, Command, LinesArgs, SnapshotArgs};

/// Quiet period after a flush before the screen is considered settled.
const SETTLE: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("❌ {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let log_config = cli.logging.to_config();
    logctl::init(&log_config).context("failed to initialise logging")?;
    debug!(log_level = ?log_config.level, log_file = ?log_config.file, "logging configured");

    let mut config = EditorConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    let client = EditorClient::new(config);
    client
        .start()
        .with_context(|| format!("could not launch `{}`", client.config().program))?;
    let outcome = match &cli.command {
        Command::ApiInfo => api_info(&client).await,
        Command::Snapshot(args) => snapshot(&client, args).await,
        Command::Lines(args) => lines(&client, args).await,
    };
    client.dispose().await;
    outcome
}

async fn api_info(client: &EditorClient) -> Result<()> {
    let info = client.get_api_info().await?;
    println!("channel: {}", info.channel_id);
    match info.version() {
        Some(version) => println!(
            "api version: {}.{}.{}",
            version.major, version.minor, version.patch
        ),
        None => println!("api version: unknown"),
    }
    Ok(())
}

async fn snapshot(client: &EditorClient, args: &SnapshotArgs) -> Result<()> {
    let mut events = client
        .take_events()
        .context("event stream already taken")?;
    let (width, height) = (client.config().width, client.config().height);
    client.ui_attach(width, height).await?;
    for command in &args.commands {
        client
            .command(command)
            .await
            .with_context(|| format!("command failed: {command}"))?;
    }

    // Take the last frame that settles before the deadline.
    let deadline = Instant::now() + Duration::from_millis(args.wait_ms);
    let mut flushed = false;
    loop {
        let wait_until = if flushed {
            deadline.min(Instant::now() + SETTLE)
        } else {
            deadline
        };
        match tokio::time::timeout_at(wait_until, events.recv()).await {
            Ok(Some(EditorEvent::Redraw(RedrawEvent::Flush))) => flushed = true,
            Ok(Some(_)) => continue,
            Ok(None) => anyhow::bail!("editor closed the session"),
            Err(_) => {
                if !flushed {
                    debug!(target: "editor::client", "no flush before deadline");
                }
                break;
            }
        }
    }

    let screen = client.screen();
    let mut screen = screen.lock();
    for row in 0..screen.grid.height() {
        println!("{}", screen.grid.row_text(row).unwrap_or_default().trim_end());
    }
    screen.grid.clear_dirty_rows();
    Ok(())
}

async fn lines(client: &EditorClient, args: &LinesArgs) -> Result<()> {
    for command in &args.commands {
        client
            .command(command)
            .await
            .with_context(|| format!("command failed: {command}"))?;
    }
    let buffer = match args.buffer {
        Some(number) => Buffer(number),
        None => client.current_buffer().await?,
    };
    for line in client
        .buf_get_lines(buffer, args.start, args.end, false)
        .await?
    {
        println!("{line}");
    }
    Ok(())
}

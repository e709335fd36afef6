use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use beach_editor::config::EditorConfig;
use beach_editor::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "beach-editor",
    about = "Drive an embedded, headless editor and inspect its screen",
    author,
    version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("BUILD_TIMESTAMP"))
)]
pub struct Cli {
    #[arg(
        long = "nvim",
        global = true,
        value_name = "PATH",
        help = "Editor executable (overrides config and BEACH_EDITOR_NVIM)"
    )]
    pub program: Option<String>,

    #[arg(long, global = true, help = "UI width in cells")]
    pub width: Option<usize>,

    #[arg(long, global = true, help = "UI height in cells")]
    pub height: Option<usize>,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        env = "BEACH_EDITOR_CONFIG",
        help = "Config file (default ~/.beach/editor.toml)"
    )]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Command-line flags win over file and environment settings.
    pub fn apply_overrides(&self, config: &mut EditorConfig) {
        if let Some(program) = &self.program {
            config.program = program.clone();
        }
        if let Some(width) = self.width {
            config.width = width.max(1);
        }
        if let Some(height) = self.height {
            config.height = height.max(1);
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        global = true,
        env = "BEACH_EDITOR_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        global = true,
        env = "BEACH_EDITOR_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the channel id and API version.
    ApiInfo,
    /// Attach a UI, run commands and print the screen.
    Snapshot(SnapshotArgs),
    /// Run commands and print buffer lines.
    Lines(LinesArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SnapshotArgs {
    #[arg(long = "cmd", value_name = "EX", help = "Ex command to run (repeatable)")]
    pub commands: Vec<String>,

    #[arg(
        long = "wait-ms",
        default_value_t = 1_000,
        help = "How long to wait for the editor to flush a frame"
    )]
    pub wait_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct LinesArgs {
    #[arg(long, help = "Buffer number (default: current buffer)")]
    pub buffer: Option<i64>,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub start: i64,

    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub end: i64,

    #[arg(long = "cmd", value_name = "EX", help = "Ex command to run first (repeatable)")]
    pub commands: Vec<String>,
}

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::WireValue;

pub const NVIM_ENV: &str = "BEACH_EDITOR_NVIM";
pub const WIDTH_ENV: &str = "BEACH_EDITOR_WIDTH";
pub const HEIGHT_ENV: &str = "BEACH_EDITOR_HEIGHT";
pub const SHUTDOWN_ENV: &str = "BEACH_EDITOR_SHUTDOWN_MS";

/// Options sent with `nvim_ui_attach`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiOptions {
    pub rgb: bool,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self { rgb: true }
    }
}

impl UiOptions {
    /// `ext_linegrid` is always requested; only the line-grid events are decoded.
    pub fn to_wire(&self) -> WireValue {
        WireValue::map([("rgb", self.rgb), ("ext_linegrid", true)])
    }
}

/// Settings for launching and attaching to the editor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub program: String,
    pub extra_args: Vec<String>,
    pub width: usize,
    pub height: usize,
    pub shutdown_timeout_ms: u64,
    pub ui_options: UiOptions,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            program: "nvim".to_owned(),
            extra_args: Vec::new(),
            width: 80,
            height: 24,
            shutdown_timeout_ms: 2_000,
            ui_options: UiOptions::default(),
        }
    }
}

impl EditorConfig {
    /// `~/.beach/editor.toml`, if a home directory can be determined.
    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new().map(|base| base.home_dir().join(".beach").join("editor.toml"))
    }

    /// Defaults, then the config file, then environment overrides.
    ///
    /// An explicit `path` must exist; the default path may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) => Self::from_file_if_exists(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &raw)
    }

    fn from_file_if_exists(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(path, &raw),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn from_toml(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let config: EditorConfig = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config.clamped())
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| env::var(var).ok())
    }

    /// Applies overrides from any variable source.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(program) = lookup(NVIM_ENV).filter(|value| !value.is_empty()) {
            self.program = program;
        }
        if let Some(width) = parse_var(&lookup, WIDTH_ENV)? {
            self.width = width;
        }
        if let Some(height) = parse_var(&lookup, HEIGHT_ENV)? {
            self.height = height;
        }
        if let Some(ms) = parse_var(&lookup, SHUTDOWN_ENV)? {
            self.shutdown_timeout_ms = ms;
        }
        *self = std::mem::take(self).clamped();
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    fn clamped(mut self) -> Self {
        self.width = self.width.max(1);
        self.height = self.height.max(1);
        self
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
    }
}

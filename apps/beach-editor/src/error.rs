use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::rpc::RpcError;

/// The editor process could not be launched or its pipes were unavailable.
#[derive(Debug, Error)]
#[error("failed to start `{program}`: {source}")]
pub struct StartupError {
    pub program: String,
    #[source]
    pub source: io::Error,
}

impl StartupError {
    pub fn new(program: impl Into<String>, source: io::Error) -> Self {
        Self {
            program: program.into(),
            source,
        }
    }

    pub(crate) fn missing_pipe(program: &str, pipe: &'static str) -> Self {
        Self::new(
            program,
            io::Error::new(io::ErrorKind::BrokenPipe, format!("{pipe} not captured")),
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("editor client not started")]
    NotStarted,
    #[error("editor session already shut down")]
    Closed,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// True when the call failed only because the session ended.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Rpc(err) if err.is_cancelled())
    }
}

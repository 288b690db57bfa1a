use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::cli::Action;

/// The server configuration could not be located or parsed.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Unknown server type '{0}'")]
    UnknownServerType(String),
    #[error("Reading config {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Reading config from stdin: {0}")]
    Stdin(io::Error),
    #[error("Parsing config: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
    #[error("Site root {} is not a directory", .0.display())]
    Root(PathBuf),
}

/// The managed server failed to come up.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("Resolving listen address {addr}: {reason}")]
    Resolve { addr: String, reason: String },
    #[error("Building server runtime: {0}")]
    Runtime(io::Error),
    #[error("Spawning server thread: {0}")]
    Thread(io::Error),
    #[error("Binding listener: {0}")]
    Bind(warp::Error),
    #[error("Server thread exited before binding")]
    Aborted,
    #[error("Writing pid file {}: {source}", .path.display())]
    Pidfile { path: PathBuf, source: io::Error },
}

/// The managed server did not shut down cleanly.
#[derive(Error, Debug)]
pub enum StopError {
    #[error("Server did not stop within {0:?}")]
    GraceExceeded(Duration),
    #[error("Server thread panicked")]
    Panicked,
}

/// The OS service manager rejected a control request.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Action '{0}' is not a control action")]
    UnsupportedAction(Action),
    #[error("Service {0} is already installed")]
    AlreadyInstalled(String),
    #[error("Service {0} is not installed")]
    NotInstalled(String),
    #[error("Service {name} did not stop within {timeout:?}")]
    Timeout { name: String, timeout: Duration },
    #[error("{command} exited with status {status}: {stderr}")]
    Command { command: String, status: String, stderr: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[cfg(windows)]
    #[error(transparent)]
    Windows(#[from] windows_service::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    ConfigLoad(#[from] ConfigLoadError),
    #[error(transparent)]
    Start(#[from] StartError),
    #[error(transparent)]
    Stop(#[from] StopError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("Waiting for shutdown signal: {0}")]
    Signal(io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

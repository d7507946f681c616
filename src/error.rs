use std::net::SocketAddr;

use thiserror::Error;

use crate::kill::KillTarget;

/// Failure of one scan tick. Never fatal to the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("socket enumeration failed: {0}")]
    Enumeration(String),
    #[error("remote session lost: {0}")]
    SessionLost(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostSpecError {
    #[error("host cannot be empty")]
    EmptyHost,
    #[error("user cannot be empty in '{0}'")]
    EmptyUser(String),
    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("invalid host: {0}")]
    InvalidHost(#[from] HostSpecError),
    #[error("cannot reach {addr}: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("SSH handshake with {0} failed: {1}")]
    Handshake(SocketAddr, String),
    #[error("authentication failed for {user} (tried: {})", tried.join(", "))]
    AuthExhausted { user: String, tried: Vec<String> },
    #[error("SSH session error: {0}")]
    Session(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<ExecError> for ScanError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Transport(msg) => ScanError::SessionLost(msg),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KillError {
    #[error("multiple processes match, pick one of PIDs {}", format_pids(.0))]
    Ambiguous(Vec<u32>),
    #[error("no process found for {0}")]
    NotFound(KillTarget),
    #[error("permission denied signalling PID {0}")]
    PermissionDenied(u32),
    #[error("failed to signal PID {pid}: {reason}")]
    SignalFailed { pid: u32, reason: String },
}

fn format_pids(pids: &[u32]) -> String {
    pids.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Top-level error for the binary and the engine handle.
#[derive(Error, Debug)]
pub enum PortlensError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Kill(#[from] KillError),
    #[error(transparent)]
    HostSpec(#[from] HostSpecError),
    #[error("refresh engine is not running")]
    EngineStopped,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PortlensError>;

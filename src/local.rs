use std::process::Command;

use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;
use tracing::{debug, info};

use crate::error::{KillError, ScanError};
use crate::kill::{KillSignal, KillTarget};
use crate::model::{dedup_sockets, Protocol, RawSocket};
use crate::parse;
use crate::platform::{create_provider, SocketProvider};
use crate::process_dir::ProcessDirectory;
use crate::scanner::ScanOutput;

/// Scans the machine we are running on.
pub struct LocalScanner {
    provider: Box<dyn SocketProvider>,
    processes: ProcessDirectory,
}

impl LocalScanner {
    pub fn new() -> Self {
        Self::with_provider(create_provider())
    }

    pub fn with_provider(provider: Box<dyn SocketProvider>) -> Self {
        Self {
            provider,
            processes: ProcessDirectory::new(),
        }
    }

    /// See [`ProcessDirectory::warm_up`].
    pub fn warm_up(&mut self) {
        self.processes.warm_up();
    }

    pub fn scan(&mut self) -> Result<ScanOutput, ScanError> {
        let sockets = match self.provider.list_listeners() {
            Ok(sockets) if !sockets.is_empty() => sockets,
            Ok(_) => {
                debug!("kernel socket tables empty, trying listing commands");
                command_listeners().unwrap_or_else(|e| {
                    debug!(error = %e, "command fallback unavailable");
                    Vec::new()
                })
            }
            Err(primary) => {
                info!(error = %primary, "kernel socket tables unavailable, trying listing commands");
                command_listeners().map_err(|fallback| {
                    ScanError::Enumeration(format!("{}; {}", primary, fallback))
                })?
            }
        };

        let sockets = dedup_sockets(sockets);
        let processes = self.processes.snapshot();
        debug!(sockets = sockets.len(), processes = processes.len(), "local scan finished");
        Ok(ScanOutput { sockets, processes })
    }

    pub fn signal(&self, pid: u32, sig: KillSignal) -> Result<(), KillError> {
        let raw = i32::try_from(pid).map_err(|_| KillError::NotFound(KillTarget::Pid(pid)))?;
        match signal::kill(Pid::from_raw(raw), sig.as_nix()) {
            Ok(()) => Ok(()),
            Err(Errno::EPERM) => Err(KillError::PermissionDenied(pid)),
            Err(Errno::ESRCH) => Err(KillError::NotFound(KillTarget::Pid(pid))),
            Err(e) => Err(KillError::SignalFailed {
                pid,
                reason: e.desc().to_string(),
            }),
        }
    }
}

impl Default for LocalScanner {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Command fallback
// ---------------------------------------------------------------------------

/// Stdout of a command that ran and exited successfully.
fn run(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        debug!(program, status = ?output.status.code(), "listing command failed");
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Stdout of a command that could be started, whatever its exit status.
/// `lsof` exits 1 when nothing matches.
fn run_lenient(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `ss`, then `netstat`, then `lsof`. The first tool that runs wins.
fn command_listeners() -> Result<Vec<RawSocket>, ScanError> {
    if let Some(tcp) = run("ss", &["-H", "-tlnp"]) {
        let udp = run("ss", &["-H", "-ulnp"]).unwrap_or_default();
        let mut sockets = parse::parse_ss(&tcp, Protocol::Tcp);
        sockets.extend(parse::parse_ss(&udp, Protocol::Udp));
        debug!(count = sockets.len(), "listeners from ss");
        return Ok(sockets);
    }

    if let Some(tcp) = run("netstat", &["-tlnp"]) {
        let udp = run("netstat", &["-ulnp"]).unwrap_or_default();
        let mut sockets = parse::parse_netstat_linux(&tcp, Protocol::Tcp);
        sockets.extend(parse::parse_netstat_linux(&udp, Protocol::Udp));
        debug!(count = sockets.len(), "listeners from netstat");
        return Ok(sockets);
    }

    if let Some(tcp) = run_lenient("lsof", &["-nP", "-iTCP", "-sTCP:LISTEN"]) {
        let udp = run_lenient("lsof", &["-nP", "-iUDP"]).unwrap_or_default();
        let mut sockets = parse::parse_lsof(&tcp, Protocol::Tcp);
        sockets.extend(parse::parse_lsof(&udp, Protocol::Udp));
        debug!(count = sockets.len(), "listeners from lsof");
        return Ok(sockets);
    }

    Err(ScanError::Enumeration(
        "no listing command available (tried ss, netstat, lsof)".into(),
    ))
}

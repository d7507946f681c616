use std::collections::HashMap;

use tracing::debug;

use super::session::{ExecOutput, RemoteExec};
use crate::error::{ExecError, KillError, ScanError};
use crate::kill::{KillSignal, KillTarget};
use crate::model::{dedup_sockets, Protocol, RawSocket};
use crate::parse::{self, RemoteOs};
use crate::scanner::ScanOutput;

pub const PS_COMMAND: &str = "ps -eo pid=,ppid=,pcpu=,rss=,comm=";

/// Scans a remote host by running listing commands over a [`RemoteExec`].
pub struct RemoteScanner {
    exec: Box<dyn RemoteExec>,
    label: String,
    os: Option<RemoteOs>,
    /// Set when a kill hit a dead transport.
    lost: Option<String>,
}

impl RemoteScanner {
    pub fn new(exec: Box<dyn RemoteExec>, label: impl Into<String>) -> Self {
        Self {
            exec,
            label: label.into(),
            os: None,
            lost: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Why the session died during a kill, if it did.
    pub fn session_lost(&self) -> Option<&str> {
        self.lost.as_deref()
    }

    /// `uname -s`, asked once per scanner.
    fn os(&mut self) -> Result<RemoteOs, ExecError> {
        if let Some(os) = self.os {
            return Ok(os);
        }
        let out = self.exec.execute("uname -s")?;
        let os = if out.success() {
            RemoteOs::from_uname(&out.stdout)
        } else {
            RemoteOs::Other
        };
        debug!(host = %self.label, ?os, "detected remote OS");
        self.os = Some(os);
        Ok(os)
    }

    fn run(&mut self, command: &str) -> Result<ExecOutput, ExecError> {
        self.exec.execute(command)
    }

    fn list_sockets(&mut self) -> Result<Vec<RawSocket>, ExecError> {
        let sockets = match self.os()? {
            RemoteOs::Linux => {
                let tcp = self.run("ss -H -tlnp")?;
                if tcp.success() {
                    let udp = self.run("ss -H -ulnp")?;
                    let mut sockets = parse::parse_ss(&tcp.stdout, Protocol::Tcp);
                    sockets.extend(parse::parse_ss(&udp.stdout, Protocol::Udp));
                    sockets
                } else {
                    debug!(host = %self.label, "ss unavailable, using netstat");
                    let tcp = self.run("netstat -tlnp")?;
                    let udp = self.run("netstat -ulnp")?;
                    let mut sockets = parse::parse_netstat_linux(&tcp.stdout, Protocol::Tcp);
                    sockets.extend(parse::parse_netstat_linux(&udp.stdout, Protocol::Udp));
                    sockets
                }
            }
            RemoteOs::Darwin => {
                let tcp = self.run("lsof -nP -iTCP -sTCP:LISTEN")?;
                let udp = self.run("lsof -nP -iUDP")?;
                let mut sockets = parse::parse_lsof(&tcp.stdout, Protocol::Tcp);
                sockets.extend(parse::parse_lsof(&udp.stdout, Protocol::Udp));
                sockets
            }
            RemoteOs::Other => parse::parse_netstat_bsd(&self.run("netstat -an")?.stdout),
        };
        Ok(sockets)
    }

    pub fn scan(&mut self) -> Result<ScanOutput, ScanError> {
        let sockets = self.list_sockets()?;

        let ps = self.run(PS_COMMAND)?;
        let processes = if ps.success() {
            parse::parse_ps(&ps.stdout)
        } else {
            debug!(host = %self.label, code = ps.exit_code, "ps failed, no process metrics");
            HashMap::new()
        };

        Ok(ScanOutput {
            sockets: dedup_sockets(sockets),
            processes,
        })
    }

    pub fn signal(&mut self, pid: u32, sig: KillSignal) -> Result<(), KillError> {
        let out = match self.run(&format!("kill -{} {}", sig.name(), pid)) {
            Ok(out) => out,
            Err(e) => {
                let reason = e.to_string();
                self.lost = Some(reason.clone());
                return Err(KillError::SignalFailed { pid, reason });
            }
        };
        if out.success() {
            return Ok(());
        }

        let stderr = out.stderr.trim();
        if stderr.contains("No such process") {
            Err(KillError::NotFound(KillTarget::Pid(pid)))
        } else if stderr.contains("Operation not permitted") || stderr.contains("Permission denied")
        {
            Err(KillError::PermissionDenied(pid))
        } else {
            Err(KillError::SignalFailed {
                pid,
                reason: if stderr.is_empty() {
                    format!("kill exited with status {}", out.exit_code)
                } else {
                    stderr.to_string()
                },
            })
        }
    }
}

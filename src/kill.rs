use std::fmt;

use tracing::info;

use crate::error::KillError;
use crate::model::{Snapshot, Source};
use crate::scanner::Scanner;

/// What the user asked to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillTarget {
    Port(u16),
    Pid(u32),
}

impl fmt::Display for KillTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillTarget::Port(port) => write!(f, "port {}", port),
            KillTarget::Pid(pid) => write!(f, "PID {}", pid),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
    Term,
    Kill,
}

impl KillSignal {
    pub fn from_force(force: bool) -> Self {
        if force {
            KillSignal::Kill
        } else {
            KillSignal::Term
        }
    }

    /// Name as understood by `kill -<NAME>`.
    pub fn name(self) -> &'static str {
        match self {
            KillSignal::Term => "TERM",
            KillSignal::Kill => "KILL",
        }
    }

    pub fn as_nix(self) -> nix::sys::signal::Signal {
        match self {
            KillSignal::Term => nix::sys::signal::Signal::SIGTERM,
            KillSignal::Kill => nix::sys::signal::Signal::SIGKILL,
        }
    }
}

impl fmt::Display for KillSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KillOutcome {
    pub pid: u32,
    pub signal: KillSignal,
    pub process_name: Option<String>,
    pub source: Source,
}

/// Turn a target into exactly one pid using the snapshot alone.
pub fn resolve(target: KillTarget, snapshot: &Snapshot) -> Result<u32, KillError> {
    match target {
        KillTarget::Port(port) => {
            let mut pids: Vec<u32> = snapshot
                .entries
                .iter()
                .filter(|e| e.port == port)
                .filter_map(|e| e.pid)
                .collect();
            pids.sort_unstable();
            pids.dedup();
            match pids.as_slice() {
                [] => Err(KillError::NotFound(target)),
                [pid] => Ok(*pid),
                _ => Err(KillError::Ambiguous(pids)),
            }
        }
        KillTarget::Pid(0) => Err(KillError::NotFound(target)),
        KillTarget::Pid(pid) if snapshot.contains_pid(pid) => Ok(pid),
        KillTarget::Pid(_) => Err(KillError::NotFound(target)),
    }
}

/// Resolve `target` against `snapshot` and signal it through `scanner`.
/// A snapshot taken from another source than the scanner's resolves
/// nothing.
pub fn kill(
    target: KillTarget,
    force: bool,
    snapshot: &Snapshot,
    scanner: &mut Scanner,
) -> Result<KillOutcome, KillError> {
    let source = scanner.source();
    if snapshot.source != source {
        return Err(KillError::NotFound(target));
    }

    let pid = resolve(target, snapshot)?;
    let signal = KillSignal::from_force(force);
    scanner.signal(pid, signal)?;

    let process_name = snapshot
        .entries
        .iter()
        .find(|e| e.pid == Some(pid))
        .and_then(|e| e.process_name.clone());
    info!(pid, %signal, %source, name = ?process_name, "signal sent");

    Ok(KillOutcome {
        pid,
        signal,
        process_name,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PortEntry, Protocol};

    fn make_entry(port: u16, protocol: Protocol, pid: Option<u32>) -> PortEntry {
        let mut e = PortEntry::unowned(port, protocol);
        e.pid = pid;
        e
    }

    fn make_snapshot(entries: Vec<PortEntry>) -> Snapshot {
        Snapshot::new(entries, Source::Local)
    }

    #[test]
    fn test_resolve_port_ambiguous() {
        let snap = make_snapshot(vec![
            make_entry(8080, Protocol::Tcp, Some(200)),
            make_entry(8080, Protocol::Tcp, Some(100)),
        ]);
        assert_eq!(
            resolve(KillTarget::Port(8080), &snap),
            Err(KillError::Ambiguous(vec![100, 200]))
        );
    }

    #[test]
    fn test_resolve_port_same_pid_twice_is_unique() {
        let snap = make_snapshot(vec![
            make_entry(53, Protocol::Tcp, Some(600)),
            make_entry(53, Protocol::Udp, Some(600)),
        ]);
        assert_eq!(resolve(KillTarget::Port(53), &snap), Ok(600));
    }

    #[test]
    fn test_resolve_port_without_owner() {
        let snap = make_snapshot(vec![make_entry(25, Protocol::Tcp, None)]);
        assert_eq!(
            resolve(KillTarget::Port(25), &snap),
            Err(KillError::NotFound(KillTarget::Port(25)))
        );
        assert_eq!(
            resolve(KillTarget::Port(26), &snap),
            Err(KillError::NotFound(KillTarget::Port(26)))
        );
    }

    #[test]
    fn test_resolve_pid() {
        let snap = make_snapshot(vec![make_entry(80, Protocol::Tcp, Some(100))]);
        assert_eq!(resolve(KillTarget::Pid(100), &snap), Ok(100));
        assert_eq!(
            resolve(KillTarget::Pid(101), &snap),
            Err(KillError::NotFound(KillTarget::Pid(101)))
        );
        assert_eq!(
            resolve(KillTarget::Pid(0), &snap),
            Err(KillError::NotFound(KillTarget::Pid(0)))
        );
    }

    #[test]
    fn test_kill_rejects_foreign_snapshot() {
        let snap = Snapshot::new(
            vec![make_entry(80, Protocol::Tcp, Some(100))],
            Source::Remote("me@box:22".into()),
        );
        let mut scanner = Scanner::local();
        assert_eq!(
            kill(KillTarget::Pid(100), false, &snap, &mut scanner),
            Err(KillError::NotFound(KillTarget::Pid(100)))
        );
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(KillSignal::from_force(false).name(), "TERM");
        assert_eq!(KillSignal::from_force(true).to_string(), "SIGKILL");
        assert_eq!(KillTarget::Port(80).to_string(), "port 80");
    }
}

use std::collections::HashMap;

use procfs::net::{TcpState, UdpState};
use procfs::process::FDTarget;
use tracing::debug;

use super::SocketProvider;
use crate::error::ScanError;
use crate::model::{Protocol, RawSocket};

// ---------------------------------------------------------------------------
// Socket tables
// ---------------------------------------------------------------------------

/// A listening row from /proc/net/*, keyed later by inode.
#[derive(Debug, Clone, Copy)]
struct Listener {
    port: u16,
    protocol: Protocol,
    inode: u64,
}

/// Read /proc/net/{tcp,tcp6,udp,udp6}. Tables that cannot be read are
/// skipped; an error is returned only when all four fail.
fn read_listeners() -> Result<Vec<Listener>, ScanError> {
    let mut listeners = Vec::new();
    let mut failures = Vec::new();

    for (table, entries) in [("tcp", procfs::net::tcp()), ("tcp6", procfs::net::tcp6())] {
        match entries {
            Ok(entries) => listeners.extend(
                entries
                    .into_iter()
                    .filter(|e| matches!(e.state, TcpState::Listen))
                    .map(|e| Listener {
                        port: e.local_address.port(),
                        protocol: Protocol::Tcp,
                        inode: e.inode,
                    }),
            ),
            Err(e) => {
                debug!(table, error = %e, "skipping unreadable socket table");
                failures.push(format!("{}: {}", table, e));
            }
        }
    }

    for (table, entries) in [("udp", procfs::net::udp()), ("udp6", procfs::net::udp6())] {
        match entries {
            Ok(entries) => listeners.extend(
                entries
                    .into_iter()
                    // Bound but unconnected: remote port 0.
                    .filter(|e| {
                        e.local_address.port() != 0
                            && e.remote_address.port() == 0
                            && !matches!(e.state, UdpState::Established)
                    })
                    .map(|e| Listener {
                        port: e.local_address.port(),
                        protocol: Protocol::Udp,
                        inode: e.inode,
                    }),
            ),
            Err(e) => {
                debug!(table, error = %e, "skipping unreadable socket table");
                failures.push(format!("{}: {}", table, e));
            }
        }
    }

    if failures.len() == 4 {
        return Err(ScanError::Enumeration(failures.join("; ")));
    }
    Ok(listeners)
}

// ---------------------------------------------------------------------------
// Inode ownership
// ---------------------------------------------------------------------------

/// Map socket inode -> owning pid by walking /proc/<pid>/fd. Processes we
/// are not allowed to inspect are skipped.
fn socket_owners() -> HashMap<u64, u32> {
    let mut owners = HashMap::new();
    let all_procs = match procfs::process::all_processes() {
        Ok(p) => p,
        Err(e) => {
            debug!(error = %e, "cannot list /proc, owners unresolved");
            return owners;
        }
    };

    for proc_result in all_procs {
        let proc = match proc_result {
            Ok(p) => p,
            Err(_) => continue,
        };
        let fds = match proc.fd() {
            Ok(fds) => fds,
            Err(_) => continue,
        };
        for fd_info in fds {
            let fd_info = match fd_info {
                Ok(fi) => fi,
                Err(_) => continue,
            };
            if let FDTarget::Socket(inode) = fd_info.target {
                owners.entry(inode).or_insert(proc.pid as u32);
            }
        }
    }

    owners
}

// ---------------------------------------------------------------------------
// LinuxProvider
// ---------------------------------------------------------------------------

pub struct LinuxProvider;

impl LinuxProvider {
    pub fn new() -> Self {
        Self
    }
}

impl SocketProvider for LinuxProvider {
    fn list_listeners(&self) -> Result<Vec<RawSocket>, ScanError> {
        let listeners = read_listeners()?;
        if listeners.is_empty() {
            return Ok(Vec::new());
        }
        let owners = socket_owners();

        Ok(listeners
            .into_iter()
            .map(|l| RawSocket::new(l.port, l.protocol, owners.get(&l.inode).copied()))
            .collect())
    }
}

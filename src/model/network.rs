use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// A listening socket as reported by a scanner, before correlation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSocket {
    pub port: u16,
    pub protocol: Protocol,
    pub pid: Option<u32>,
    /// Owner name as printed by text tools (`ss`, `lsof`, `netstat`).
    /// Only used when the process map has no entry for `pid`.
    pub process_name: Option<String>,
}

impl RawSocket {
    pub fn new(port: u16, protocol: Protocol, pid: Option<u32>) -> Self {
        Self {
            port,
            protocol,
            pid,
            process_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = Some(name.into());
        self
    }
}

/// Drop exact `(port, protocol, pid)` repeats, keeping the first occurrence.
/// IPv4 and IPv6 bindings of the same process collapse into one row.
pub fn dedup_sockets(sockets: Vec<RawSocket>) -> Vec<RawSocket> {
    let mut seen = std::collections::HashSet::new();
    sockets
        .into_iter()
        .filter(|s| seen.insert((s.port, s.protocol, s.pid)))
        .collect()
}

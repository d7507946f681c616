//! Parsers for the text output of `ss`, `netstat`, `lsof` and `ps`.
//!
//! Used by the remote scanner and by the local command fallback. Every
//! parser is line oriented: rows it cannot make sense of (headers,
//! truncated lines, foreign formats) are skipped rather than reported.

use std::collections::HashMap;

use crate::model::{ProcessInfo, Protocol, RawSocket};

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Port of a local address column.
///
/// Accepts `*:22`, `0.0.0.0:80`, `[::]:8080`, `127.0.0.53%lo:53` and the
/// BSD dotted forms `*.8080` and `127.0.0.1.631`. Port 0 and wildcards
/// (`*:*`) yield `None`.
pub fn extract_port(addr: &str) -> Option<u16> {
    let addr = addr.trim();
    let candidate = if let Some(pos) = addr.rfind("]:") {
        &addr[pos + 2..]
    } else {
        match addr.rfind(':').map(|pos| &addr[pos + 1..]) {
            Some(tail) if tail.parse::<u16>().is_ok() => tail,
            _ => addr.rsplit_once('.').map(|(_, tail)| tail)?,
        }
    };
    match candidate.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

/// True when a foreign address column names no peer (`*:*`, `0.0.0.0:*`,
/// `*.*`, `[::]:*`). Used to tell bound UDP sockets from connected ones.
fn is_unconnected_peer(addr: &str) -> bool {
    addr.ends_with(":*") || addr.ends_with(".*") || addr.ends_with(":0")
}

// ---------------------------------------------------------------------------
// ss
// ---------------------------------------------------------------------------

/// Owners from an `ss -p` process column, e.g.
/// `users:(("nginx",pid=10,fd=6),("nginx",pid=11,fd=6))`.
///
/// Returns `(name, pid)` per owner, in order. A quoted name without a
/// parsable `pid=` keeps `None`.
pub fn parse_ss_users(field: &str) -> Vec<(String, Option<u32>)> {
    let mut owners = Vec::new();
    let mut rest = match field.find("users:(") {
        Some(pos) => &field[pos + "users:(".len()..],
        None => return owners,
    };

    while let Some(start) = rest.find("(\"") {
        let after_quote = &rest[start + 2..];
        let end = match after_quote.find('"') {
            Some(e) => e,
            None => break,
        };
        let name = after_quote[..end].to_string();
        let tail = &after_quote[end + 1..];
        let group_end = tail.find(')').unwrap_or(tail.len());
        let group = &tail[..group_end];

        let pid = group.find("pid=").and_then(|p| {
            let digits: String = group[p + 4..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse::<u32>().ok().filter(|pid| *pid != 0)
        });

        owners.push((name, pid));
        rest = &tail[group_end..];
    }

    owners
}

/// Rows of `ss -H -tlnp` / `ss -H -ulnp`. A leading `Netid` column and a
/// header line are tolerated. One socket is produced per owner listed in
/// the process column; rows without one keep `pid = None`.
pub fn parse_ss(output: &str, protocol: Protocol) -> Vec<RawSocket> {
    let mut sockets = Vec::new();

    for line in output.lines() {
        let mut parts: Vec<&str> = line.split_whitespace().collect();
        if matches!(parts.first(), Some(&("tcp" | "udp"))) {
            parts.remove(0);
        }
        if parts.len() < 4 {
            continue;
        }
        let port = match extract_port(parts[3]) {
            Some(p) => p,
            None => continue,
        };

        let owners = line.find("users:(").map(|pos| parse_ss_users(&line[pos..]));
        match owners {
            Some(owners) if !owners.is_empty() => {
                for (name, pid) in owners {
                    sockets.push(RawSocket::new(port, protocol, pid).with_name(name));
                }
            }
            _ => sockets.push(RawSocket::new(port, protocol, None)),
        }
    }

    sockets
}

// ---------------------------------------------------------------------------
// netstat
// ---------------------------------------------------------------------------

/// `1234/sshd` or `-` from the PID/Program column of `netstat -p`.
fn parse_pid_program(tokens: &[&str]) -> (Option<u32>, Option<String>) {
    for (i, token) in tokens.iter().enumerate() {
        if *token == "-" {
            return (None, None);
        }
        if let Some((pid, prog)) = token.split_once('/') {
            if let Ok(pid) = pid.parse::<u32>() {
                let mut name = prog.to_string();
                for extra in &tokens[i + 1..] {
                    name.push(' ');
                    name.push_str(extra);
                }
                let name = name.trim().to_string();
                let pid = Some(pid).filter(|p| *p != 0);
                return (pid, (!name.is_empty()).then_some(name));
            }
        }
    }
    (None, None)
}

/// Rows of Linux `netstat -tlnp` / `netstat -ulnp`:
/// `tcp 0 0 0.0.0.0:22 0.0.0.0:* LISTEN 1234/sshd`.
/// Header lines and rows of the other protocol are skipped; UDP rows with
/// a connected peer are dropped.
pub fn parse_netstat_linux(output: &str, protocol: Protocol) -> Vec<RawSocket> {
    let prefix = match protocol {
        Protocol::Tcp => "tcp",
        Protocol::Udp => "udp",
    };
    let mut sockets = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 || !parts[0].starts_with(prefix) {
            continue;
        }
        if protocol == Protocol::Tcp && !parts.contains(&"LISTEN") {
            continue;
        }
        if protocol == Protocol::Udp && !is_unconnected_peer(parts[4]) {
            continue;
        }
        let port = match extract_port(parts[3]) {
            Some(p) => p,
            None => continue,
        };

        let (pid, name) = parse_pid_program(&parts[5..]);
        let mut socket = RawSocket::new(port, protocol, pid);
        socket.process_name = name;
        sockets.push(socket);
    }

    sockets
}

/// Rows of `netstat -an` on BSD-like hosts: `tcp4 0 0 *.8080 *.* LISTEN`,
/// `udp46 0 0 *.5353 *.*`. Also copes with the colon address form. No
/// owner information is available on this path.
pub fn parse_netstat_bsd(output: &str) -> Vec<RawSocket> {
    let mut sockets = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }
        let proto = parts[0].to_ascii_lowercase();
        let protocol = if proto.starts_with("tcp") {
            if !parts.iter().any(|p| p.eq_ignore_ascii_case("LISTEN")) {
                continue;
            }
            Protocol::Tcp
        } else if proto.starts_with("udp") {
            if !is_unconnected_peer(parts[4]) {
                continue;
            }
            Protocol::Udp
        } else {
            continue;
        };

        if let Some(port) = extract_port(parts[3]) {
            sockets.push(RawSocket::new(port, protocol, None));
        }
    }

    sockets
}

// ---------------------------------------------------------------------------
// lsof
// ---------------------------------------------------------------------------

/// Rows of `lsof -nP -iTCP -sTCP:LISTEN` / `lsof -nP -iUDP`:
/// `node 1234 me 23u IPv4 0xabc 0t0 TCP *:3000 (LISTEN)`.
/// Connected sockets (`a->b`) are dropped.
pub fn parse_lsof(output: &str, protocol: Protocol) -> Vec<RawSocket> {
    let marker = protocol.to_string();
    let mut sockets = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 9 {
            continue;
        }
        let pid = match parts[1].parse::<u32>() {
            Ok(p) => p,
            Err(_) => continue,
        };
        let addr = parts
            .iter()
            .skip(4)
            .position(|p| *p == marker)
            .and_then(|i| parts.get(i + 5))
            .copied()
            .unwrap_or(parts[8]);
        if addr.contains("->") {
            continue;
        }
        if protocol == Protocol::Tcp && line.contains('(') && !line.contains("(LISTEN)") {
            continue;
        }
        let port = match extract_port(addr) {
            Some(p) => p,
            None => continue,
        };

        let pid = Some(pid).filter(|p| *p != 0);
        sockets.push(RawSocket::new(port, protocol, pid).with_name(parts[0].replace("\\x20", " ")));
    }

    sockets
}

// ---------------------------------------------------------------------------
// ps
// ---------------------------------------------------------------------------

/// Rows of `ps -eo pid=,ppid=,pcpu=,rss=,comm=`. `rss` is KiB. Columns
/// that fail to parse degrade to 0 / `None`; rows without a pid are
/// skipped. A full executable path in `comm` is reduced to its file name.
pub fn parse_ps(output: &str) -> HashMap<u32, ProcessInfo> {
    let mut processes = HashMap::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let pid = match parts.first().and_then(|p| p.parse::<u32>().ok()) {
            Some(p) => p,
            None => continue,
        };
        let parent_pid = parts.get(1).and_then(|p| p.parse::<u32>().ok());
        let cpu_percent = parts
            .get(2)
            .and_then(|p| p.replace(',', ".").parse::<f32>().ok())
            .filter(|c| c.is_finite())
            .unwrap_or(0.0);
        let memory_bytes = parts
            .get(3)
            .and_then(|p| p.parse::<u64>().ok())
            .map(|kib| kib.saturating_mul(1024))
            .unwrap_or(0);

        let comm = if parts.len() > 4 {
            parts[4..].join(" ")
        } else {
            String::new()
        };
        let name = if comm.starts_with('/') {
            comm.rsplit('/').next().unwrap_or(&comm).to_string()
        } else {
            comm
        };

        processes.insert(
            pid,
            ProcessInfo {
                name,
                cpu_percent,
                memory_bytes,
                parent_pid,
            },
        );
    }

    processes
}

/// Name reported by `uname -s`, folded into the three families we scan
/// differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOs {
    Linux,
    Darwin,
    Other,
}

impl RemoteOs {
    pub fn from_uname(output: &str) -> Self {
        match output.trim() {
            "Linux" => RemoteOs::Linux,
            "Darwin" => RemoteOs::Darwin,
            _ => RemoteOs::Other,
        }
    }
}

use std::fmt::Write as _;

use crate::correlate::SUSPICIOUS_LABEL;
use crate::error::KillError;
use crate::kill::KillOutcome;
use crate::model::{PortEntry, Snapshot};

/// Entries a `describe` query refers to: listeners on that port, or, when
/// there are none, listeners owned by that PID.
pub fn describe_matches(snapshot: &Snapshot, target: u32) -> Vec<&PortEntry> {
    let by_port: Vec<&PortEntry> = match u16::try_from(target) {
        Ok(port) => snapshot.entries.iter().filter(|e| e.port == port).collect(),
        Err(_) => Vec::new(),
    };
    if !by_port.is_empty() {
        return by_port;
    }
    snapshot
        .entries
        .iter()
        .filter(|e| e.pid == Some(target))
        .collect()
}

/// Every field of one entry, one per line.
pub fn format_entry(entry: &PortEntry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<10}{}/{}", "PORT", entry.port, entry.protocol);
    let _ = writeln!(out, "{:<10}{}", "PID", entry.pid_display());
    let _ = writeln!(out, "{:<10}{}", "PROCESS", entry.name_or_dash());
    if entry.pid.is_some() {
        let _ = writeln!(out, "{:<10}{:.1}%", "CPU", entry.cpu_percent);
    } else {
        let _ = writeln!(out, "{:<10}-", "CPU");
    }
    let _ = writeln!(out, "{:<10}{}", "MEMORY", entry.memory_display());
    let parent = match entry.parent_pid {
        Some(ppid) if entry.has_live_parent => format!("{} (running)", ppid),
        Some(ppid) => format!("{} (not running)", ppid),
        None => "-".to_string(),
    };
    let _ = writeln!(out, "{:<10}{}", "PARENT", parent);
    if entry.is_suspicious {
        let _ = writeln!(out, "{:<10}{}", "FLAG", SUSPICIOUS_LABEL);
    }
    out
}

/// Blocks for all matches, separated by blank lines, with a source footer.
pub fn format_describe(snapshot: &Snapshot, entries: &[&PortEntry]) -> String {
    let mut out = entries
        .iter()
        .map(|e| format_entry(e))
        .collect::<Vec<_>>()
        .join("\n");
    let _ = writeln!(out, "\n{:<10}{}", "SOURCE", snapshot.source);
    out
}

pub fn format_kill_outcome(outcome: &KillOutcome) -> String {
    match &outcome.process_name {
        Some(name) => format!(
            "Sent {} to PID {} ({}) on {}",
            outcome.signal, outcome.pid, name, outcome.source
        ),
        None => format!(
            "Sent {} to PID {} on {}",
            outcome.signal, outcome.pid, outcome.source
        ),
    }
}

/// Error text for `kill`. Ambiguous matches list one PID per line.
pub fn format_kill_error(err: &KillError, snapshot: &Snapshot) -> String {
    match err {
        KillError::Ambiguous(pids) => {
            let mut out = String::from("Error: several processes match; use --pid with one of:\n");
            for pid in pids {
                let name = snapshot
                    .entries
                    .iter()
                    .find(|e| e.pid == Some(*pid))
                    .map(|e| e.name_or_dash())
                    .unwrap_or("-");
                let _ = writeln!(out, "  {:>7}  {}", pid, name);
            }
            out.trim_end().to_string()
        }
        other => format!("Error: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kill::{KillSignal, KillTarget};
    use crate::model::{Protocol, Source};

    fn make_entry(port: u16, pid: Option<u32>, name: Option<&str>) -> PortEntry {
        let mut e = PortEntry::unowned(port, Protocol::Tcp);
        e.pid = pid;
        e.process_name = name.map(str::to_string);
        e
    }

    fn make_snapshot() -> Snapshot {
        Snapshot::new(
            vec![
                make_entry(8080, Some(100), Some("node")),
                make_entry(8080, Some(200), Some("deno")),
                make_entry(22, Some(8080), Some("sshd")),
            ],
            Source::Local,
        )
    }

    #[test]
    fn test_describe_prefers_port() {
        let snap = make_snapshot();
        let matches = describe_matches(&snap, 8080);
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|e| e.port == 8080));
    }

    #[test]
    fn test_describe_falls_back_to_pid() {
        let snap = make_snapshot();
        let matches = describe_matches(&snap, 200);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].port, 8080);
        assert!(describe_matches(&snap, 70000).is_empty());
    }

    #[test]
    fn test_format_entry_fields() {
        let mut e = make_entry(4444, Some(7), Some("miner"));
        e.cpu_percent = 93.25;
        e.memory_bytes = 2048;
        e.parent_pid = Some(1);
        e.is_suspicious = true;
        let text = format_entry(&e);
        assert!(text.contains("4444/TCP"));
        assert!(text.contains("93.2%") || text.contains("93.3%"));
        assert!(text.contains("2.0 KB"));
        assert!(text.contains("1 (not running)"));
        assert!(text.contains(SUSPICIOUS_LABEL));
    }

    #[test]
    fn test_format_unowned_entry() {
        let text = format_entry(&make_entry(53, None, None));
        assert!(text.contains("PID       -"));
        assert!(!text.contains("FLAG"));
    }

    #[test]
    fn test_format_ambiguous_lists_pids() {
        let snap = make_snapshot();
        let text = format_kill_error(&KillError::Ambiguous(vec![100, 200]), &snap);
        assert!(text.contains("100  node"));
        assert!(text.contains("200  deno"));
    }

    #[test]
    fn test_format_kill_outcome() {
        let outcome = KillOutcome {
            pid: 100,
            signal: KillSignal::Term,
            process_name: Some("node".into()),
            source: Source::Local,
        };
        assert_eq!(
            format_kill_outcome(&outcome),
            "Sent SIGTERM to PID 100 (node) on localhost"
        );
        let err = KillError::NotFound(KillTarget::Port(9));
        assert_eq!(format_kill_error(&err, &make_snapshot()), "Error: no process found for port 9");
    }
}

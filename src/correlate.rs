use std::collections::HashMap;

use crate::model::{PortEntry, ProcessInfo, RawSocket, Snapshot, Source};
use crate::scanner::ScanOutput;

pub const DEFAULT_CPU_THRESHOLD: f32 = 50.0;

/// Knobs for the "suspicious" flag: a process above `cpu_threshold`
/// percent CPU whose parent is gone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuspicionPolicy {
    pub cpu_threshold: f32,
}

impl Default for SuspicionPolicy {
    fn default() -> Self {
        Self {
            cpu_threshold: DEFAULT_CPU_THRESHOLD,
        }
    }
}

/// Label used wherever the flag is shown to a person.
pub const SUSPICIOUS_LABEL: &str = "suspicious: high CPU, no live parent";

/// Join raw sockets with the process map, preserving scan order.
pub fn merge(
    raw: &[RawSocket],
    processes: &HashMap<u32, ProcessInfo>,
    policy: &SuspicionPolicy,
) -> Vec<PortEntry> {
    raw.iter()
        .map(|socket| {
            let info = socket.pid.and_then(|pid| processes.get(&pid));
            let mut entry = PortEntry::unowned(socket.port, socket.protocol);
            entry.pid = socket.pid;

            match info {
                Some(info) => {
                    entry.process_name = Some(info.name.clone());
                    entry.cpu_percent = info.cpu_percent;
                    entry.memory_bytes = info.memory_bytes;
                    entry.parent_pid = info.parent_pid;
                    entry.has_live_parent = info
                        .parent_pid
                        .map(|ppid| ppid > 1 && processes.contains_key(&ppid))
                        .unwrap_or(false);
                    entry.is_suspicious =
                        entry.cpu_percent > policy.cpu_threshold && !entry.has_live_parent;
                }
                None if socket.pid.is_some() => {
                    entry.process_name = socket.process_name.clone();
                }
                None => {}
            }

            entry
        })
        .collect()
}

/// Merge a scan into a fresh snapshot.
pub fn build_snapshot(scan: &ScanOutput, source: Source, policy: &SuspicionPolicy) -> Snapshot {
    Snapshot::new(merge(&scan.sockets, &scan.processes, policy), source)
}

use super::network::Protocol;

/// Identity of a row across refreshes.
pub type EntryKey = (u16, Protocol, Option<u32>);

/// One listening socket joined with its owning process. Built by
/// `correlate::merge` and never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PortEntry {
    pub port: u16,
    pub protocol: Protocol,
    pub pid: Option<u32>,
    pub process_name: Option<String>,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub parent_pid: Option<u32>,
    pub has_live_parent: bool,
    /// High CPU with no live parent. A heuristic, not a process state.
    pub is_suspicious: bool,
}

impl PortEntry {
    /// An entry whose owner could not be resolved.
    pub fn unowned(port: u16, protocol: Protocol) -> Self {
        Self {
            port,
            protocol,
            pid: None,
            process_name: None,
            cpu_percent: 0.0,
            memory_bytes: 0,
            parent_pid: None,
            has_live_parent: false,
            is_suspicious: false,
        }
    }

    pub fn key(&self) -> EntryKey {
        (self.port, self.protocol, self.pid)
    }

    pub fn name_or_dash(&self) -> &str {
        self.process_name.as_deref().unwrap_or("-")
    }

    pub fn pid_display(&self) -> String {
        self.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into())
    }

    pub fn memory_display(&self) -> String {
        if self.pid.is_none() {
            return "-".to_string();
        }
        format_memory(self.memory_bytes)
    }
}

/// Human-readable byte count, 1024 based, one decimal.
pub fn format_memory(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

use std::fmt;
use std::time::SystemTime;

use super::entry::PortEntry;

/// Where a snapshot's rows came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local,
    /// `user@host:port`
    Remote(String),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Local => write!(f, "localhost"),
            Source::Remote(label) => write!(f, "{}", label),
        }
    }
}

/// One complete scan-and-merge result. Shared as `Arc<Snapshot>` and
/// replaced wholesale on every refresh.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub entries: Vec<PortEntry>,
    pub taken_at: SystemTime,
    pub source: Source,
    /// Set when the scan for this tick failed; `entries` are then the
    /// previous snapshot's rows.
    pub error: Option<String>,
}

impl Snapshot {
    pub fn new(entries: Vec<PortEntry>, source: Source) -> Self {
        Self {
            entries,
            taken_at: SystemTime::now(),
            source,
            error: None,
        }
    }

    pub fn empty(source: Source) -> Self {
        Self::new(Vec::new(), source)
    }

    /// Keep the previous rows, attach the failure.
    pub fn with_error(previous: &Snapshot, error: impl Into<String>) -> Self {
        Self {
            entries: previous.entries.clone(),
            taken_at: SystemTime::now(),
            source: previous.source.clone(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_pid(&self, pid: u32) -> bool {
        self.entries.iter().any(|e| e.pid == Some(pid))
    }
}

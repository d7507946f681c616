use std::cmp::Ordering;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::model::{EntryKey, PortEntry, Snapshot, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Port,
    Protocol,
    Pid,
    Name,
    Cpu,
    Memory,
}

impl SortKey {
    pub const ALL: [SortKey; 6] = [
        SortKey::Port,
        SortKey::Protocol,
        SortKey::Pid,
        SortKey::Name,
        SortKey::Cpu,
        SortKey::Memory,
    ];

    /// Column heading.
    pub fn label(self) -> &'static str {
        match self {
            SortKey::Port => "PORT",
            SortKey::Protocol => "PROTO",
            SortKey::Pid => "PID",
            SortKey::Name => "PROCESS",
            SortKey::Cpu => "CPU%",
            SortKey::Memory => "MEMORY",
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|k| *k == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    fn compare(self, a: &PortEntry, b: &PortEntry) -> Ordering {
        match self {
            SortKey::Port => a.port.cmp(&b.port),
            SortKey::Protocol => a.protocol.cmp(&b.protocol),
            SortKey::Pid => a.pid.cmp(&b.pid),
            SortKey::Name => {
                let a = a.process_name.as_ref().map(|n| n.to_lowercase());
                let b = b.process_name.as_ref().map(|n| n.to_lowercase());
                a.cmp(&b)
            }
            SortKey::Cpu => a.cpu_percent.total_cmp(&b.cpu_percent),
            SortKey::Memory => a.memory_bytes.cmp(&b.memory_bytes),
        }
    }
}

/// Compiled form of the filter pattern.
#[derive(Debug, Clone)]
enum Matcher {
    All,
    Regex(Regex),
    /// Lower-cased pattern; used when the pattern is not a valid regex.
    Substring(String),
}

impl Matcher {
    fn compile(pattern: &str) -> Self {
        if pattern.is_empty() {
            return Matcher::All;
        }
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => Matcher::Regex(re),
            Err(_) => Matcher::Substring(pattern.to_lowercase()),
        }
    }

    fn matches(&self, entry: &PortEntry) -> bool {
        let port = entry.port.to_string();
        let pid = entry.pid.map(|p| p.to_string());
        let fields = [entry.process_name.as_deref(), pid.as_deref(), Some(port.as_str())];

        match self {
            Matcher::All => true,
            Matcher::Regex(re) => fields.iter().flatten().any(|f| re.is_match(f)),
            Matcher::Substring(needle) => fields
                .iter()
                .flatten()
                .any(|f| f.to_lowercase().contains(needle.as_str())),
        }
    }
}

/// Filter, sort and selection, re-applied to every snapshot.
#[derive(Debug, Clone)]
pub struct ViewState {
    snapshot: Arc<Snapshot>,
    filter_pattern: String,
    matcher: Matcher,
    sort_key: SortKey,
    sort_ascending: bool,
    rows: Vec<usize>,
    selected: Option<usize>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewState {
    pub fn new() -> Self {
        Self {
            snapshot: Arc::new(Snapshot::empty(Source::Local)),
            filter_pattern: String::new(),
            matcher: Matcher::All,
            sort_key: SortKey::Port,
            sort_ascending: true,
            rows: Vec::new(),
            selected: None,
        }
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    /// Take a new snapshot, keeping filter, sort and the selected row.
    pub fn apply(&mut self, snapshot: Arc<Snapshot>) {
        let anchor = self.selected_key();
        let old_index = self.selected;
        self.snapshot = snapshot;
        self.recompute(anchor, old_index);
    }

    /// Empty pattern shows everything. Invalid regexes fall back to a
    /// case-insensitive substring match.
    pub fn set_filter(&mut self, pattern: &str) {
        let anchor = self.selected_key();
        let old_index = self.selected;
        self.filter_pattern = pattern.to_string();
        self.matcher = Matcher::compile(pattern);
        self.recompute(anchor, old_index);
    }

    /// Same key flips direction; a new key sorts ascending.
    pub fn set_sort(&mut self, key: SortKey) {
        if key == self.sort_key {
            self.sort_ascending = !self.sort_ascending;
        } else {
            self.sort_key = key;
            self.sort_ascending = true;
        }
        self.resort();
    }

    pub fn reverse_sort(&mut self) {
        self.sort_ascending = !self.sort_ascending;
        self.resort();
    }

    fn resort(&mut self) {
        let anchor = self.selected_key();
        let old_index = self.selected;
        self.recompute(anchor, old_index);
    }

    fn recompute(&mut self, anchor: Option<EntryKey>, old_index: Option<usize>) {
        let entries = &self.snapshot.entries;
        let mut rows: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| self.matcher.matches(e))
            .map(|(i, _)| i)
            .collect();

        let key = self.sort_key;
        let ascending = self.sort_ascending;
        rows.sort_by(|&a, &b| {
            let (a, b) = (&entries[a], &entries[b]);
            let primary = key.compare(a, b);
            let primary = if ascending { primary } else { primary.reverse() };
            primary.then_with(|| (a.port, a.protocol, a.pid).cmp(&(b.port, b.protocol, b.pid)))
        });
        self.rows = rows;

        self.selected = if self.rows.is_empty() {
            None
        } else if let Some(pos) = anchor.and_then(|k| self.position_of(k)) {
            Some(pos)
        } else {
            Some(old_index.map_or(0, |i| i.min(self.rows.len() - 1)))
        };
    }

    fn position_of(&self, key: EntryKey) -> Option<usize> {
        self.rows
            .iter()
            .position(|&i| self.snapshot.entries[i].key() == key)
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    fn step(&mut self, delta: i64) {
        if self.rows.is_empty() {
            return;
        }
        let len = self.rows.len() as i64;
        let current = self.selected.unwrap_or(0) as i64;
        let next = ((current + delta) % len + len) % len;
        self.selected = Some(next as usize);
    }

    pub fn select_next(&mut self) {
        self.step(1);
    }

    pub fn select_previous(&mut self) {
        self.step(-1);
    }

    pub fn select_first(&mut self) {
        if !self.rows.is_empty() {
            self.selected = Some(0);
        }
    }

    pub fn select_last(&mut self) {
        if !self.rows.is_empty() {
            self.selected = Some(self.rows.len() - 1);
        }
    }

    /// Move by `delta` rows without wrapping.
    pub fn page(&mut self, delta: i64) {
        if self.rows.is_empty() {
            return;
        }
        let last = self.rows.len() as i64 - 1;
        let current = self.selected.unwrap_or(0) as i64;
        self.selected = Some((current + delta).clamp(0, last) as usize);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn rows(&self) -> impl Iterator<Item = &PortEntry> + '_ {
        self.rows.iter().map(move |&i| &self.snapshot.entries[i])
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_entry(&self) -> Option<&PortEntry> {
        self.selected
            .and_then(|s| self.rows.get(s))
            .map(|&i| &self.snapshot.entries[i])
    }

    pub fn selected_key(&self) -> Option<EntryKey> {
        self.selected_entry().map(PortEntry::key)
    }

    pub fn match_count(&self) -> usize {
        self.rows.len()
    }

    pub fn total_count(&self) -> usize {
        self.snapshot.entries.len()
    }

    pub fn filter_pattern(&self) -> &str {
        &self.filter_pattern
    }

    /// False when the pattern is empty or fell back to substring matching.
    pub fn filter_is_regex(&self) -> bool {
        matches!(self.matcher, Matcher::Regex(_))
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    pub fn sort_ascending(&self) -> bool {
        self.sort_ascending
    }
}

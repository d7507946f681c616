use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ratatui::widgets::TableState;
use tokio::sync::oneshot::error::TryRecvError;

use crate::config::{clamp_interval, MIN_INTERVAL};
use crate::engine::{ConnectReply, EngineEvent, EngineHandle, KillReply};
use crate::error::Result;
use crate::kill::KillTarget;
use crate::model::Snapshot;
use crate::output;
use crate::remote::HostSpec;
use crate::view::{SortKey, ViewState};

/// How long a status message stays on screen.
pub const STATUS_TTL: Duration = Duration::from_secs(4);
const INTERVAL_STEP: Duration = Duration::from_secs(1);
const MAX_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Filter,
    Connect,
    ConfirmKill { pid: u32, name: String, force: bool },
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub level: StatusLevel,
    expires_at: Instant,
}

pub struct AppState {
    pub view: ViewState,
    pub table_state: TableState,
    pub mode: Mode,
    pub filter_input: String,
    pub connect_input: String,
    pub interval: Duration,
    /// Label of a connection attempt still in flight.
    pub connecting: Option<String>,
    pub page_rows: usize,
    pub should_quit: bool,
    status: Option<StatusMessage>,
    pending_connect: Option<ConnectReply>,
    pending_kills: Vec<KillReply>,
}

impl AppState {
    pub fn new(interval: Duration) -> Self {
        Self {
            view: ViewState::new(),
            table_state: TableState::default(),
            mode: Mode::Normal,
            filter_input: String::new(),
            connect_input: String::new(),
            interval: clamp_interval(interval),
            connecting: None,
            page_rows: 20,
            should_quit: false,
            status: None,
            pending_connect: None,
            pending_kills: Vec::new(),
        }
    }

    fn sync_table(&mut self) {
        self.table_state.select(self.view.selected());
    }

    pub fn apply_snapshot(&mut self, snapshot: Arc<Snapshot>) {
        self.view.apply(snapshot);
        self.sync_table();
    }

    // -----------------------------------------------------------------------
    // Status line
    // -----------------------------------------------------------------------

    pub fn set_status(&mut self, text: impl Into<String>, level: StatusLevel) {
        self.status = Some(StatusMessage {
            text: text.into(),
            level,
            expires_at: Instant::now() + STATUS_TTL,
        });
    }

    /// The current message, unless it has expired.
    pub fn status(&self) -> Option<&StatusMessage> {
        self.status
            .as_ref()
            .filter(|s| s.expires_at > Instant::now())
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    pub fn move_up(&mut self) {
        self.view.select_previous();
        self.sync_table();
    }

    pub fn move_down(&mut self) {
        self.view.select_next();
        self.sync_table();
    }

    pub fn page_up(&mut self) {
        self.view.page(-(self.page_rows.max(1) as i64));
        self.sync_table();
    }

    pub fn page_down(&mut self) {
        self.view.page(self.page_rows.max(1) as i64);
        self.sync_table();
    }

    pub fn select_first(&mut self) {
        self.view.select_first();
        self.sync_table();
    }

    pub fn select_last(&mut self) {
        self.view.select_last();
        self.sync_table();
    }

    /// Visible table rows for a terminal of this height.
    pub fn resize(&mut self, height: u16) {
        // header line, table header, table border, filter line and status line
        self.page_rows = usize::from(height.saturating_sub(6)).max(1);
    }

    // -----------------------------------------------------------------------
    // Filter and sort
    // -----------------------------------------------------------------------

    pub fn start_filter(&mut self) {
        self.filter_input = self.view.filter_pattern().to_string();
        self.mode = Mode::Filter;
    }

    pub fn filter_push(&mut self, c: char) {
        self.filter_input.push(c);
        self.view.set_filter(&self.filter_input);
        self.sync_table();
    }

    pub fn filter_pop(&mut self) {
        self.filter_input.pop();
        self.view.set_filter(&self.filter_input);
        self.sync_table();
    }

    /// Leave filter mode keeping the pattern.
    pub fn filter_commit(&mut self) {
        self.mode = Mode::Normal;
    }

    pub fn clear_filter(&mut self) {
        self.filter_input.clear();
        self.view.set_filter("");
        self.mode = Mode::Normal;
        self.sync_table();
    }

    pub fn sort_by(&mut self, key: SortKey) {
        self.view.set_sort(key);
        self.sync_table();
    }

    pub fn cycle_sort(&mut self) {
        let next = self.view.sort_key().next();
        self.view.set_sort(next);
        self.sync_table();
    }

    pub fn reverse_sort(&mut self) {
        self.view.reverse_sort();
        self.sync_table();
    }

    // -----------------------------------------------------------------------
    // Kill
    // -----------------------------------------------------------------------

    /// Ask for confirmation before signalling the selected row's owner.
    pub fn request_kill(&mut self, force: bool) {
        let Some(entry) = self.view.selected_entry() else {
            self.set_status("Nothing selected", StatusLevel::Error);
            return;
        };
        let Some(pid) = entry.pid else {
            let msg = format!("No owning process known for port {}", entry.port);
            self.set_status(msg, StatusLevel::Error);
            return;
        };
        self.mode = Mode::ConfirmKill {
            pid,
            name: entry.name_or_dash().to_string(),
            force,
        };
    }

    pub fn toggle_force(&mut self) {
        if let Mode::ConfirmKill { force, .. } = &mut self.mode {
            *force = !*force;
        }
    }

    /// Leave the confirmation and return what should be signalled.
    pub fn confirm_kill(&mut self) -> Option<(KillTarget, bool)> {
        match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::ConfirmKill { pid, force, .. } => Some((KillTarget::Pid(pid), force)),
            other => {
                self.mode = other;
                None
            }
        }
    }

    pub fn cancel_kill(&mut self) {
        if matches!(self.mode, Mode::ConfirmKill { .. }) {
            self.mode = Mode::Normal;
        }
    }

    pub fn track_kill(&mut self, reply: KillReply) {
        self.pending_kills.push(reply);
    }

    // -----------------------------------------------------------------------
    // Connect
    // -----------------------------------------------------------------------

    pub fn start_connect(&mut self) {
        if let Some(label) = &self.connecting {
            let msg = format!("Already connecting to {}", label);
            self.set_status(msg, StatusLevel::Error);
            return;
        }
        self.connect_input.clear();
        self.mode = Mode::Connect;
    }

    pub fn connect_push(&mut self, c: char) {
        self.connect_input.push(c);
    }

    pub fn connect_pop(&mut self) {
        self.connect_input.pop();
    }

    pub fn cancel_connect(&mut self) {
        self.connect_input.clear();
        self.mode = Mode::Normal;
    }

    /// Parse the prompt. A bad host spec stays in the prompt with an error.
    pub fn submit_connect(&mut self) -> Option<HostSpec> {
        match HostSpec::parse(self.connect_input.trim()) {
            Ok(spec) => {
                self.mode = Mode::Normal;
                self.set_status(format!("Connecting to {}...", spec), StatusLevel::Info);
                Some(spec)
            }
            Err(e) => {
                self.set_status(format!("Invalid host: {}", e), StatusLevel::Error);
                None
            }
        }
    }

    pub fn track_connect(&mut self, label: String, reply: ConnectReply) {
        self.connecting = Some(label);
        self.pending_connect = Some(reply);
    }

    /// Hand the connection to the engine; the outcome arrives through
    /// `poll_replies`.
    pub fn connect_via(
        &mut self,
        engine: &EngineHandle,
        spec: HostSpec,
        identity: Option<PathBuf>,
    ) -> Result<()> {
        let label = spec.to_string();
        let reply = engine.connect(spec, identity)?;
        self.track_connect(label, reply);
        Ok(())
    }

    /// `-H` on the command line. Scanning stays local until the session is
    /// up, and a bad host only costs a status message.
    pub fn connect_at_startup(
        &mut self,
        engine: &EngineHandle,
        host: &str,
        identity: Option<PathBuf>,
    ) -> Result<()> {
        match HostSpec::parse(host) {
            Ok(spec) => {
                self.set_status(format!("Connecting to {}...", spec), StatusLevel::Info);
                self.connect_via(engine, spec, identity)
            }
            Err(e) => {
                self.set_status(format!("Invalid host: {}", e), StatusLevel::Error);
                Ok(())
            }
        }
    }

    /// Disconnecting also abandons a connection attempt in flight.
    pub fn disconnected(&mut self) {
        if let Some(label) = self.connecting.take() {
            self.set_status(format!("Cancelled connection to {}", label), StatusLevel::Info);
        }
    }

    pub fn toggle_help(&mut self) {
        self.mode = match self.mode {
            Mode::Help => Mode::Normal,
            _ => Mode::Help,
        };
    }

    // -----------------------------------------------------------------------
    // Engine feedback
    // -----------------------------------------------------------------------

    pub fn adjust_interval(&mut self, faster: bool) -> Duration {
        let next = if faster {
            self.interval.saturating_sub(INTERVAL_STEP)
        } else {
            self.interval + INTERVAL_STEP
        };
        self.interval = next.clamp(MIN_INTERVAL, MAX_INTERVAL);
        self.set_status(
            format!("Refresh every {:.1}s", self.interval.as_secs_f32()),
            StatusLevel::Info,
        );
        self.interval
    }

    pub fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::SourceChanged(source) => {
                self.set_status(format!("Now scanning {}", source), StatusLevel::Info);
            }
            EngineEvent::SessionLost { host, reason } => {
                let msg = format!("Lost {}: {}; back to localhost", host, reason);
                self.set_status(msg, StatusLevel::Error);
            }
        }
    }

    /// Pick up finished connect and kill requests.
    pub fn poll_replies(&mut self) {
        if let Some(reply) = self.pending_connect.as_mut() {
            match reply.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(Ok(label)) => {
                    self.pending_connect = None;
                    self.connecting = None;
                    self.set_status(format!("Connected to {}", label), StatusLevel::Info);
                }
                Ok(Err(e)) => {
                    self.pending_connect = None;
                    self.connecting = None;
                    self.set_status(format!("Connect failed: {}", e), StatusLevel::Error);
                }
                Err(TryRecvError::Closed) => {
                    self.pending_connect = None;
                    self.connecting = None;
                }
            }
        }

        let mut finished = Vec::new();
        self.pending_kills.retain_mut(|reply| match reply.try_recv() {
            Err(TryRecvError::Empty) => true,
            Ok(result) => {
                finished.push(result);
                false
            }
            Err(TryRecvError::Closed) => false,
        });
        for result in finished {
            match result {
                Ok(outcome) => {
                    self.set_status(output::format_kill_outcome(&outcome), StatusLevel::Info)
                }
                Err(e) => {
                    let text = output::format_kill_error(&e, self.view.snapshot());
                    self.set_status(text, StatusLevel::Error);
                }
            }
        }
    }
}

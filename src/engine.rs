//! Background refresh loop.
//!
//! The loop runs on its own thread with a current-thread tokio runtime.
//! Scans and kills are blocking work and run one at a time on the blocking
//! pool; the scanner is moved into the job and handed back when it
//! finishes. Everything the outside world sees is an `Arc<Snapshot>` on a
//! watch channel, and everything it asks for is a [`Command`] on an mpsc
//! channel.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{clamp_interval, EngineConfig};
use crate::correlate::{build_snapshot, SuspicionPolicy};
use crate::error::{ConnectError, KillError, PortlensError, Result, ScanError};
use crate::kill::{self, KillOutcome, KillTarget};
use crate::local::LocalScanner;
use crate::model::{Snapshot, Source};
use crate::remote::{HostSpec, RemoteScanner, RemoteSession, SessionOptions};
use crate::scanner::{ScanOutput, Scanner};

pub type ConnectReply = oneshot::Receiver<std::result::Result<String, ConnectError>>;
pub type KillReply = oneshot::Receiver<std::result::Result<KillOutcome, KillError>>;

/// Things the presentation layer should tell the user about.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Scanning now targets this source.
    SourceChanged(Source),
    /// The remote session died; the loop is switching back to local.
    SessionLost { host: String, reason: String },
}

pub enum Command {
    Connect {
        spec: HostSpec,
        identity: Option<PathBuf>,
        reply: oneshot::Sender<std::result::Result<String, ConnectError>>,
    },
    /// Switch to an already built remote scanner.
    Attach(RemoteScanner),
    Disconnect,
    SetInterval(Duration),
    Refresh,
    Kill {
        target: KillTarget,
        force: bool,
        reply: oneshot::Sender<std::result::Result<KillOutcome, KillError>>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Control-side end of the engine. Dropping it stops the loop.
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Arc<Snapshot>>,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    thread: Option<thread::JoinHandle<()>>,
}

impl EngineHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| PortlensError::EngineStopped)
    }

    /// Most recently published snapshot.
    pub fn latest_snapshot(&self) -> Arc<Snapshot> {
        self.snapshots.borrow().clone()
    }

    /// A snapshot published since the last call, if any.
    pub fn poll_snapshot(&mut self) -> Option<Arc<Snapshot>> {
        match self.snapshots.has_changed() {
            Ok(true) => Some(self.snapshots.borrow_and_update().clone()),
            _ => None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.clone()
    }

    /// Start connecting in the background. The reply carries the session
    /// label once the switch is staged.
    pub fn connect(&self, spec: HostSpec, identity: Option<PathBuf>) -> Result<ConnectReply> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect {
            spec,
            identity,
            reply,
        })?;
        Ok(rx)
    }

    pub fn attach(&self, scanner: RemoteScanner) -> Result<()> {
        self.send(Command::Attach(scanner))
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect)
    }

    /// Takes effect when the next tick is scheduled.
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        self.send(Command::SetInterval(interval))
    }

    pub fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh)
    }

    pub fn kill(&self, target: KillTarget, force: bool) -> Result<KillReply> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Kill {
            target,
            force,
            reply,
        })?;
        Ok(rx)
    }

    pub fn try_event(&mut self) -> Option<EngineEvent> {
        self.events.try_recv().ok()
    }

    /// Stop the loop and wait for its thread.
    pub fn shutdown(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("refresh thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct Engine;

impl Engine {
    /// Start the refresh loop on a dedicated thread, scanning `initial`.
    pub fn spawn(config: EngineConfig, initial: Scanner) -> Result<EngineHandle> {
        let (snap_tx, snap_rx) = watch::channel(Arc::new(Snapshot::empty(initial.source())));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let thread = thread::Builder::new()
            .name("portlens-refresh".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!(error = %e, "cannot start refresh runtime");
                        return;
                    }
                };
                runtime.block_on(RefreshLoop::new(config, initial, snap_tx, event_tx).run(cmd_rx));
                // Abandon a job stuck on a dead host.
                runtime.shutdown_timeout(Duration::from_millis(500));
            })?;

        Ok(EngineHandle {
            commands: cmd_tx,
            snapshots: snap_rx,
            events: event_rx,
            thread: Some(thread),
        })
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

enum Switch {
    ToRemote(RemoteScanner),
    ToLocal,
}

struct KillRequest {
    target: KillTarget,
    force: bool,
    reply: oneshot::Sender<std::result::Result<KillOutcome, KillError>>,
}

enum JobOutput {
    Scan(std::result::Result<ScanOutput, ScanError>),
    Kill(
        std::result::Result<KillOutcome, KillError>,
        oneshot::Sender<std::result::Result<KillOutcome, KillError>>,
    ),
}

struct Connecting {
    handle: JoinHandle<std::result::Result<RemoteSession, ConnectError>>,
    reply: oneshot::Sender<std::result::Result<String, ConnectError>>,
    cancelled: bool,
}

struct RefreshLoop {
    interval: Duration,
    policy: SuspicionPolicy,
    session_options: SessionOptions,
    /// `None` only while a job holds the scanner.
    scanner: Option<Scanner>,
    source: Source,
    /// Local scanner kept while remote, so CPU deltas survive.
    parked_local: Option<LocalScanner>,
    staged: Option<Switch>,
    /// Bumped whenever a source switch is staged.
    generation: u64,
    job: Option<JoinHandle<(Scanner, JobOutput)>>,
    job_generation: u64,
    connecting: Option<Connecting>,
    pending_kills: VecDeque<KillRequest>,
    refresh_due: bool,
    next_tick: Instant,
    snapshots: watch::Sender<Arc<Snapshot>>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

/// Await an optional join handle; pending forever when there is none.
async fn join_opt<T>(handle: &mut Option<JoinHandle<T>>) -> std::result::Result<T, JoinError> {
    match handle {
        Some(h) => h.await,
        None => std::future::pending().await,
    }
}

async fn join_connect(
    connecting: &mut Option<Connecting>,
) -> std::result::Result<std::result::Result<RemoteSession, ConnectError>, JoinError> {
    match connecting {
        Some(c) => (&mut c.handle).await,
        None => std::future::pending().await,
    }
}

impl RefreshLoop {
    fn new(
        config: EngineConfig,
        initial: Scanner,
        snapshots: watch::Sender<Arc<Snapshot>>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let interval = clamp_interval(config.interval);
        Self {
            interval,
            policy: config.policy,
            session_options: config.session,
            source: initial.source(),
            scanner: Some(initial),
            parked_local: None,
            staged: None,
            generation: 0,
            job: None,
            job_generation: 0,
            connecting: None,
            pending_kills: VecDeque::new(),
            refresh_due: true,
            next_tick: Instant::now() + interval,
            snapshots,
            events,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(source = %self.source, interval = ?self.interval, "refresh loop started");
        loop {
            self.start_job_if_idle();

            let idle = self.job.is_none() && !self.refresh_due;
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle(command),
                },
                result = join_opt(&mut self.job) => {
                    self.job = None;
                    self.finish_job(result);
                }
                result = join_connect(&mut self.connecting) => {
                    if let Some(connecting) = self.connecting.take() {
                        self.finish_connect(result, connecting);
                    }
                }
                _ = tokio::time::sleep_until(self.next_tick), if idle => {
                    self.refresh_due = true;
                }
            }
        }
        info!("refresh loop stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Connect {
                spec,
                identity,
                reply,
            } => {
                if self.connecting.is_some() {
                    let _ = reply.send(Err(ConnectError::Session(
                        "a connection attempt is already in progress".into(),
                    )));
                    return;
                }
                info!(host = %spec, "connecting");
                let options = self.session_options.clone();
                let handle = tokio::task::spawn_blocking(move || {
                    RemoteSession::connect(&spec, identity.as_deref(), &options)
                });
                self.connecting = Some(Connecting {
                    handle,
                    reply,
                    cancelled: false,
                });
            }
            Command::Attach(remote) => {
                self.stage(Switch::ToRemote(remote));
                self.refresh_due = true;
            }
            Command::Disconnect => {
                if let Some(connecting) = self.connecting.as_mut() {
                    connecting.cancelled = true;
                }
                let remote_now = matches!(self.source, Source::Remote(_));
                let remote_staged = matches!(self.staged, Some(Switch::ToRemote(_)));
                if remote_now || remote_staged {
                    self.stage(Switch::ToLocal);
                    self.refresh_due = true;
                } else {
                    debug!("disconnect ignored, already local");
                }
            }
            Command::SetInterval(interval) => {
                self.interval = clamp_interval(interval);
                debug!(interval = ?self.interval, "refresh interval changed");
            }
            Command::Refresh => self.refresh_due = true,
            Command::Kill {
                target,
                force,
                reply,
            } => self.pending_kills.push_back(KillRequest {
                target,
                force,
                reply,
            }),
            Command::Shutdown => {}
        }
    }

    fn stage(&mut self, switch: Switch) {
        self.staged = Some(switch);
        self.generation += 1;
    }

    /// Swap scanners if a switch is staged. Only called right before a
    /// job starts, so an error snapshot stays up until the next tick.
    fn apply_staged(&mut self) {
        let switch = match self.staged.take() {
            Some(s) => s,
            None => return,
        };
        match switch {
            Switch::ToRemote(remote) => {
                match self.scanner.take() {
                    Some(Scanner::Local(local)) => self.parked_local = Some(local),
                    Some(Scanner::Remote(old)) => debug!(host = old.label(), "replacing remote session"),
                    None => {}
                }
                self.scanner = Some(Scanner::Remote(remote));
            }
            Switch::ToLocal => {
                if !matches!(self.scanner, Some(Scanner::Remote(_))) {
                    return;
                }
                let local = self.parked_local.take().unwrap_or_default();
                self.scanner = Some(Scanner::Local(local));
            }
        }

        if let Some(scanner) = &self.scanner {
            self.source = scanner.source();
        }
        info!(source = %self.source, "scanning source changed");
        self.snapshots
            .send_replace(Arc::new(Snapshot::empty(self.source.clone())));
        let _ = self.events.send(EngineEvent::SourceChanged(self.source.clone()));
    }

    fn start_job_if_idle(&mut self) {
        if self.job.is_some() {
            return;
        }
        let has_work = !self.pending_kills.is_empty() || self.refresh_due;
        if !has_work {
            return;
        }
        self.apply_staged();

        let mut scanner = match self.scanner.take() {
            Some(s) => s,
            None => return,
        };

        self.job_generation = self.generation;
        if let Some(request) = self.pending_kills.pop_front() {
            let snapshot = self.snapshots.borrow().clone();
            self.job = Some(tokio::task::spawn_blocking(move || {
                let result = kill::kill(request.target, request.force, &snapshot, &mut scanner);
                (scanner, JobOutput::Kill(result, request.reply))
            }));
        } else {
            self.refresh_due = false;
            debug!(source = %self.source, "scan started");
            self.job = Some(tokio::task::spawn_blocking(move || {
                let result = scanner.scan();
                (scanner, JobOutput::Scan(result))
            }));
        }
    }

    fn finish_job(&mut self, result: std::result::Result<(Scanner, JobOutput), JoinError>) {
        let (scanner, output) = match result {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "refresh job panicked, falling back to local");
                let local = self.parked_local.take().unwrap_or_default();
                self.scanner = Some(Scanner::Local(local));
                self.source = Source::Local;
                self.publish_error(format!("internal error: {}", e));
                self.next_tick = Instant::now() + self.interval;
                return;
            }
        };
        let source = scanner.source();
        let lost = scanner.session_lost().map(str::to_string);
        self.scanner = Some(scanner);
        let stale = self.job_generation != self.generation;

        match output {
            JobOutput::Kill(result, reply) => {
                if let Err(e) = &result {
                    info!(error = %e, "kill failed");
                }
                let _ = reply.send(result);
                match lost {
                    Some(reason) if !stale => {
                        self.publish_error(ScanError::SessionLost(reason.clone()).to_string());
                        self.lose_session(&source, reason);
                        self.next_tick = Instant::now() + self.interval;
                    }
                    _ => self.refresh_due = true,
                }
                return;
            }
            JobOutput::Scan(_) if stale => {
                debug!(%source, "discarding scan from a replaced source");
            }
            JobOutput::Scan(Ok(out)) => {
                debug!(%source, sockets = out.sockets.len(), processes = out.processes.len(), "scan finished");
                let snapshot = build_snapshot(&out, source, &self.policy);
                self.snapshots.send_replace(Arc::new(snapshot));
            }
            JobOutput::Scan(Err(e)) => {
                self.publish_error(e.to_string());
                match e {
                    ScanError::SessionLost(reason) => self.lose_session(&source, reason),
                    ScanError::Enumeration(reason) => warn!(%source, %reason, "scan failed"),
                }
            }
        }
        self.next_tick = Instant::now() + self.interval;
    }

    fn finish_connect(
        &mut self,
        result: std::result::Result<std::result::Result<RemoteSession, ConnectError>, JoinError>,
        connecting: Connecting,
    ) {
        let outcome = match result {
            Ok(Ok(_)) if connecting.cancelled => {
                debug!("connection finished after disconnect, dropping it");
                Err(ConnectError::Session("cancelled by disconnect".into()))
            }
            Ok(Ok(session)) => {
                let label = session.label();
                self.stage(Switch::ToRemote(RemoteScanner::new(Box::new(session), label.clone())));
                self.refresh_due = true;
                Ok(label)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "connect failed");
                Err(e)
            }
            Err(e) => Err(ConnectError::Session(e.to_string())),
        };
        let _ = connecting.reply.send(outcome);
    }

    /// Fall back to local at the next tick and tell the UI why.
    fn lose_session(&mut self, source: &Source, reason: String) {
        warn!(host = %source, %reason, "remote session lost, returning to local");
        self.stage(Switch::ToLocal);
        let _ = self.events.send(EngineEvent::SessionLost {
            host: source.to_string(),
            reason,
        });
    }

    /// Keep the previous rows, flag the failure.
    fn publish_error(&mut self, message: String) {
        let previous = self.snapshots.borrow().clone();
        let snapshot = if previous.source == self.source {
            Snapshot::with_error(&previous, message)
        } else {
            let mut empty = Snapshot::empty(self.source.clone());
            empty.error = Some(message);
            empty
        };
        self.snapshots.send_replace(Arc::new(snapshot));
    }
}

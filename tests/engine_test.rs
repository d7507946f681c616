use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use portlens::app::{AppState, StatusLevel};
use portlens::config::EngineConfig;
use portlens::engine::{Engine, EngineEvent, EngineHandle};
use portlens::error::{ExecError, KillError};
use portlens::kill::{KillSignal, KillTarget};
use portlens::model::{Snapshot, Source};
use portlens::remote::scanner::PS_COMMAND;
use portlens::remote::{ExecOutput, RemoteExec, RemoteScanner};
use portlens::scanner::Scanner;
use portlens::view::ViewState;

const LABEL: &str = "ops@fake:22";

/// A Linux host whose listeners and processes the test can change.
#[derive(Default)]
struct HostState {
    listeners: Vec<(u16, u32, String)>,
    processes: Vec<(u32, u32, f32, u64, String)>,
    broken: bool,
    signals: Vec<String>,
    /// TCP listings served so far, one per remote scan.
    scans: usize,
    /// Holds the next TCP listing until the test releases it.
    gate: Option<Gate>,
}

struct Gate {
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

#[derive(Clone, Default)]
struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    fn with_listener(self, port: u16, pid: u32, name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.listeners.push((port, pid, name.to_string()));
            if !state.processes.iter().any(|p| p.0 == pid) {
                state.processes.push((pid, 1, 0.5, 4096, name.to_string()));
            }
        }
        self
    }

    fn break_session(&self) {
        self.state.lock().unwrap().broken = true;
    }

    fn scans(&self) -> usize {
        self.state.lock().unwrap().scans
    }

    /// Block the next scan inside its socket listing. Returns the "entered"
    /// receiver and the "release" sender.
    fn hold_next_scan(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        self.state.lock().unwrap().gate = Some(Gate {
            entered: entered_tx,
            release: release_rx,
        });
        (entered_rx, release_tx)
    }

    fn signals(&self) -> Vec<String> {
        self.state.lock().unwrap().signals.clone()
    }

    fn reply(stdout: String) -> ExecOutput {
        ExecOutput {
            stdout,
            stderr: String::new(),
            exit_code: 0,
        }
    }
}

impl RemoteExec for FakeHost {
    fn execute(&mut self, command: &str) -> Result<ExecOutput, ExecError> {
        if command == "ss -H -tlnp" {
            let gate = self.state.lock().unwrap().gate.take();
            if let Some(gate) = gate {
                gate.entered.send(()).unwrap();
                gate.release.recv().unwrap();
            }
        }

        let mut state = self.state.lock().unwrap();
        if state.broken {
            return Err(ExecError::Transport("connection reset by peer".into()));
        }

        if command == "uname -s" {
            return Ok(Self::reply("Linux\n".into()));
        }
        if command == "ss -H -tlnp" {
            state.scans += 1;
            let out = state
                .listeners
                .iter()
                .map(|(port, pid, name)| {
                    format!(
                        "LISTEN 0 128 0.0.0.0:{} 0.0.0.0:* users:((\"{}\",pid={},fd=3))\n",
                        port, name, pid
                    )
                })
                .collect();
            return Ok(Self::reply(out));
        }
        if command == "ss -H -ulnp" {
            return Ok(Self::reply(String::new()));
        }
        if command == PS_COMMAND {
            let out = state
                .processes
                .iter()
                .map(|(pid, ppid, cpu, rss, name)| {
                    format!("{} {} {:.1} {} {}\n", pid, ppid, cpu, rss, name)
                })
                .collect();
            return Ok(Self::reply(out));
        }
        if let Some(rest) = command.strip_prefix("kill -") {
            let (_, pid) = rest.split_once(' ').unwrap();
            let pid: u32 = pid.parse().unwrap();
            state.signals.push(command.to_string());
            if !state.processes.iter().any(|p| p.0 == pid) {
                return Ok(ExecOutput {
                    stdout: String::new(),
                    stderr: format!("kill: ({}) - No such process", pid),
                    exit_code: 1,
                });
            }
            state.listeners.retain(|l| l.1 != pid);
            state.processes.retain(|p| p.0 != pid);
            return Ok(Self::reply(String::new()));
        }

        Ok(ExecOutput {
            stdout: String::new(),
            stderr: format!("{}: command not found", command),
            exit_code: 127,
        })
    }
}

fn make_engine(host: &FakeHost) -> EngineHandle {
    make_engine_every(host, Duration::from_millis(200))
}

fn make_engine_every(host: &FakeHost, interval: Duration) -> EngineHandle {
    let config = EngineConfig::default().with_interval(interval);
    let scanner = Scanner::Remote(RemoteScanner::new(Box::new(host.clone()), LABEL));
    Engine::spawn(config, scanner).unwrap()
}

/// First published snapshot satisfying `pred`, within a few seconds.
fn wait_for(engine: &mut EngineHandle, pred: impl Fn(&Snapshot) -> bool) -> Arc<Snapshot> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(snapshot) = engine.poll_snapshot() {
            if pred(&snapshot) {
                return snapshot;
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for snapshot");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn wait_for_event(engine: &mut EngineHandle, pred: impl Fn(&EngineEvent) -> bool) -> EngineEvent {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(event) = engine.try_event() {
            if pred(&event) {
                return event;
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for event");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_remote_snapshot_published() {
    let host = FakeHost::default()
        .with_listener(22, 10, "sshd")
        .with_listener(8080, 100, "node");
    let mut engine = make_engine(&host);

    let snap = wait_for(&mut engine, |s| s.len() == 2);
    assert_eq!(snap.source, Source::Remote(LABEL.into()));
    assert!(snap.error.is_none());
    let node = snap.entries.iter().find(|e| e.port == 8080).unwrap();
    assert_eq!(node.pid, Some(100));
    assert_eq!(node.process_name.as_deref(), Some("node"));
    assert_eq!(node.memory_bytes, 4096 * 1024);
}

#[test]
fn test_kill_shared_port_is_ambiguous() {
    let host = FakeHost::default()
        .with_listener(8080, 100, "node")
        .with_listener(8080, 200, "node");
    let mut engine = make_engine(&host);
    wait_for(&mut engine, |s| s.len() == 2);

    let reply = engine.kill(KillTarget::Port(8080), false).unwrap();
    let result = reply.blocking_recv().unwrap();
    assert_eq!(result, Err(KillError::Ambiguous(vec![100, 200])));
    assert!(host.signals().is_empty());
}

#[test]
fn test_kill_pid_then_rescan() {
    let host = FakeHost::default()
        .with_listener(8080, 100, "node")
        .with_listener(9090, 200, "python3");
    let mut engine = make_engine(&host);
    wait_for(&mut engine, |s| s.len() == 2);

    let reply = engine.kill(KillTarget::Pid(100), true).unwrap();
    let outcome = reply.blocking_recv().unwrap().unwrap();
    assert_eq!(outcome.pid, 100);
    assert_eq!(outcome.signal, KillSignal::Kill);
    assert_eq!(outcome.process_name.as_deref(), Some("node"));
    assert_eq!(host.signals(), vec!["kill -KILL 100".to_string()]);

    let snap = wait_for(&mut engine, |s| !s.contains_pid(100));
    assert_eq!(snap.len(), 1);
    assert_eq!(snap.entries[0].pid, Some(200));
}

#[test]
fn test_kill_unknown_pid_not_found() {
    let host = FakeHost::default().with_listener(8080, 100, "node");
    let mut engine = make_engine(&host);
    wait_for(&mut engine, |s| s.len() == 1);

    let reply = engine.kill(KillTarget::Pid(4242), false).unwrap();
    let result = reply.blocking_recv().unwrap();
    assert_eq!(result, Err(KillError::NotFound(KillTarget::Pid(4242))));
}

#[test]
fn test_session_loss_keeps_rows_and_reports() {
    let host = FakeHost::default().with_listener(5432, 300, "postgres");
    let mut engine = make_engine(&host);
    wait_for(&mut engine, |s| s.len() == 1);

    host.break_session();
    let snap = wait_for(&mut engine, |s| s.is_error());
    assert_eq!(snap.len(), 1);
    assert_eq!(snap.source, Source::Remote(LABEL.into()));
    assert!(snap.error.as_deref().unwrap().contains("connection reset"));

    let event = wait_for_event(&mut engine, |e| matches!(e, EngineEvent::SessionLost { .. }));
    match event {
        EngineEvent::SessionLost { host, reason } => {
            assert_eq!(host, LABEL);
            assert!(reason.contains("connection reset"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    wait_for(&mut engine, |s| s.source == Source::Local);
}

#[test]
fn test_disconnect_switches_to_local() {
    let host = FakeHost::default().with_listener(22, 10, "sshd");
    let mut engine = make_engine(&host);
    wait_for(&mut engine, |s| s.len() == 1);

    engine.disconnect().unwrap();
    wait_for_event(&mut engine, |e| *e == EngineEvent::SourceChanged(Source::Local));
    let snap = engine.latest_snapshot();
    assert_eq!(snap.source, Source::Local);
}

#[test]
fn test_attach_switches_to_remote() {
    let first = FakeHost::default().with_listener(22, 10, "sshd");
    let second = FakeHost::default().with_listener(6379, 77, "redis-server");
    let mut engine = make_engine(&first);
    wait_for(&mut engine, |s| s.len() == 1);

    engine
        .attach(RemoteScanner::new(Box::new(second.clone()), "ops@cache:22"))
        .unwrap();
    let snap = wait_for(&mut engine, |s| s.contains_pid(77));
    assert_eq!(snap.source, Source::Remote("ops@cache:22".into()));
    assert!(!snap.contains_pid(10));
}

#[test]
fn test_selection_survives_refresh() {
    let host = FakeHost::default()
        .with_listener(22, 10, "sshd")
        .with_listener(80, 20, "nginx")
        .with_listener(443, 20, "nginx");
    let mut engine = make_engine(&host);

    let mut view = ViewState::new();
    view.apply(wait_for(&mut engine, |s| s.len() == 3));
    view.select_next();
    view.select_next();
    assert_eq!(view.selected_entry().map(|e| e.port), Some(443));

    // A new listener sorts ahead of the selected row.
    let host = host.with_listener(53, 30, "dnsmasq");
    engine.refresh().unwrap();
    view.apply(wait_for(&mut engine, |s| s.len() == 4));
    assert_eq!(view.selected_entry().map(|e| e.port), Some(443));
    assert_eq!(view.selected(), Some(3));
    drop(host);
}

#[test]
fn test_disconnect_discards_scan_in_flight() {
    let host = FakeHost::default().with_listener(22, 10, "sshd");
    let mut engine = make_engine_every(&host, Duration::from_secs(10));
    wait_for(&mut engine, |s| s.len() == 1);

    let (entered, release) = host.hold_next_scan();
    engine.refresh().unwrap();
    entered.recv_timeout(Duration::from_secs(5)).unwrap();

    // The held scan would report this listener if it were published.
    let host = host.with_listener(6379, 77, "redis-server");
    engine.disconnect().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    release.send(()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(1);
    let mut saw_local = false;
    while Instant::now() < deadline {
        if let Some(snap) = engine.poll_snapshot() {
            assert_eq!(snap.source, Source::Local, "remote scan published after disconnect");
            assert!(!snap.contains_pid(77));
            saw_local = true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(saw_local);
    assert_eq!(engine.latest_snapshot().source, Source::Local);
    assert_eq!(host.scans(), 2);
}

#[test]
fn test_set_interval_keeps_scheduled_tick() {
    let host = FakeHost::default().with_listener(22, 10, "sshd");
    let mut engine = make_engine_every(&host, Duration::from_millis(1500));
    wait_for(&mut engine, |s| s.len() == 1);
    let after_first = host.scans();

    engine.set_interval(Duration::from_millis(100)).unwrap();
    std::thread::sleep(Duration::from_millis(800));
    assert_eq!(host.scans(), after_first, "tick already scheduled was moved");

    let deadline = Instant::now() + Duration::from_secs(3);
    while host.scans() == after_first {
        assert!(Instant::now() < deadline, "scheduled tick never fired");
        std::thread::sleep(Duration::from_millis(10));
    }

    // From here on the shorter interval applies.
    let ticked = host.scans();
    std::thread::sleep(Duration::from_millis(1000));
    assert!(host.scans() >= ticked + 3, "only {} scans", host.scans() - ticked);
}

#[test]
fn test_kill_over_dead_transport_falls_back_to_local() {
    let host = FakeHost::default().with_listener(8080, 100, "node");
    let mut engine = make_engine_every(&host, Duration::from_secs(10));
    wait_for(&mut engine, |s| s.len() == 1);

    host.break_session();
    let reply = engine.kill(KillTarget::Pid(100), false).unwrap();
    match reply.blocking_recv().unwrap() {
        Err(KillError::SignalFailed { pid, reason }) => {
            assert_eq!(pid, 100);
            assert!(reason.contains("connection reset"));
        }
        other => panic!("unexpected kill result {:?}", other),
    }

    let event = wait_for_event(&mut engine, |e| matches!(e, EngineEvent::SessionLost { .. }));
    assert!(matches!(event, EngineEvent::SessionLost { ref host, .. } if host == LABEL));
    let snap = wait_for(&mut engine, |s| s.is_error());
    assert_eq!(snap.source, Source::Remote(LABEL.into()));
    assert!(snap.contains_pid(100));

    engine.refresh().unwrap();
    wait_for(&mut engine, |s| s.source == Source::Local);
}

#[test]
fn test_bad_startup_host_stays_local() {
    let config = EngineConfig::default().with_interval(Duration::from_millis(200));
    let mut engine = Engine::spawn(config, Scanner::local()).unwrap();
    let mut state = AppState::new(Duration::from_millis(200));

    // Nothing listens on port 1, so the attempt is refused.
    state
        .connect_at_startup(&engine, "nobody@127.0.0.1:1", None)
        .unwrap();
    assert!(state.connecting.is_some());

    let deadline = Instant::now() + Duration::from_secs(15);
    while state.connecting.is_some() {
        assert!(Instant::now() < deadline, "connect never finished");
        state.poll_replies();
        std::thread::sleep(Duration::from_millis(10));
    }

    let status = state.status().unwrap();
    assert_eq!(status.level, StatusLevel::Error);
    assert!(status.text.contains("Connect failed"), "status was {}", status.text);
    assert_eq!(engine.latest_snapshot().source, Source::Local);
    assert!(engine.poll_snapshot().map_or(true, |s| s.source == Source::Local));
}

#[test]
fn test_invalid_startup_host_reports_without_connecting() {
    let engine = Engine::spawn(EngineConfig::default(), Scanner::local()).unwrap();
    let mut state = AppState::new(Duration::from_secs(2));

    state.connect_at_startup(&engine, "ops@box:99999", None).unwrap();
    assert!(state.connecting.is_none());
    let status = state.status().unwrap();
    assert_eq!(status.level, StatusLevel::Error);
    assert!(status.text.starts_with("Invalid host"));
    assert_eq!(engine.latest_snapshot().source, Source::Local);
}

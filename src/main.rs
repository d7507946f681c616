use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use portlens::app::action::map_key_to_action;
use portlens::app::{Action, AppState, StatusLevel};
use portlens::cli::{CliArgs, Commands, KillArgs};
use portlens::config::EngineConfig;
use portlens::correlate::{build_snapshot, SuspicionPolicy};
use portlens::engine::{Engine, EngineHandle};
use portlens::error::{PortlensError, Result};
use portlens::event::{AppEvent, EventHandler};
use portlens::kill;
use portlens::model::Snapshot;
use portlens::output;
use portlens::remote::{HostSpec, RemoteScanner, RemoteSession, SessionOptions};
use portlens::scanner::Scanner;
use portlens::ui;

fn main() {
    let args = CliArgs::parse();

    let interactive = args.command.is_none();
    if let Err(e) = init_logging(args.log_file.as_deref(), interactive) {
        eprintln!("Error: cannot open log file: {}", e);
        std::process::exit(1);
    }

    let code = match &args.command {
        None => match run_tui(&args) {
            Ok(()) => 0,
            Err(e) => {
                ratatui::restore();
                eprintln!("Error: {}", e);
                1
            }
        },
        Some(Commands::Describe { target }) => run_describe(&args, *target),
        Some(Commands::Kill(kill_args)) => run_kill(&args, kill_args),
    };
    std::process::exit(code);
}

/// `RUST_LOG` wins over the default `info`. Without `--log-file` the TUI
/// logs nowhere so nothing draws over the screen.
fn init_logging(log_file: Option<&Path>, interactive: bool) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None if interactive => builder.with_writer(std::io::sink).try_init(),
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    if let Err(e) = result {
        eprintln!("warning: logging disabled: {}", e);
    }
    Ok(())
}

/// The scanner for a one-shot: `-H` connects synchronously, otherwise local.
fn initial_scanner(args: &CliArgs) -> Result<Scanner> {
    match &args.host {
        Some(host) => {
            let spec = HostSpec::parse(host)?;
            let session =
                RemoteSession::connect(&spec, args.identity.as_deref(), &SessionOptions::default())?;
            let label = session.label();
            Ok(Scanner::Remote(RemoteScanner::new(Box::new(session), label)))
        }
        None => Ok(Scanner::local()),
    }
}

/// One scan and merge, outside the refresh engine.
fn scan_once(scanner: &mut Scanner, policy: &SuspicionPolicy) -> Result<Snapshot> {
    if let Scanner::Local(local) = scanner {
        // CPU usage needs two samples.
        local.warm_up();
    }
    let scan = scanner.scan()?;
    Ok(build_snapshot(&scan, scanner.source(), policy))
}

fn one_shot_policy(args: &CliArgs) -> SuspicionPolicy {
    SuspicionPolicy {
        cpu_threshold: args.cpu_threshold,
    }
}

fn run_describe(args: &CliArgs, target: u32) -> i32 {
    let snapshot = match initial_scanner(args)
        .and_then(|mut scanner| scan_once(&mut scanner, &one_shot_policy(args)))
    {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let matches = output::describe_matches(&snapshot, target);
    if matches.is_empty() {
        eprintln!(
            "No listener on port {} and no listening process with PID {} on {}",
            target, target, snapshot.source
        );
        return 1;
    }
    print!("{}", output::format_describe(&snapshot, &matches));
    0
}

fn run_kill(args: &CliArgs, kill_args: &KillArgs) -> i32 {
    let Some(target) = kill_args.target() else {
        eprintln!("Error: exactly one of --pid or --port is required");
        return 2;
    };

    let mut scanner = match initial_scanner(args) {
        Ok(scanner) => scanner,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let snapshot = match scan_once(&mut scanner, &one_shot_policy(args)) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    match kill::kill(target, kill_args.force, &snapshot, &mut scanner) {
        Ok(outcome) => {
            println!("{}", output::format_kill_outcome(&outcome));
            0
        }
        Err(e) => {
            eprintln!("{}", output::format_kill_error(&e, &snapshot));
            1
        }
    }
}

fn run_tui(args: &CliArgs) -> Result<()> {
    let config = EngineConfig::default()
        .with_interval(args.interval)
        .with_cpu_threshold(args.cpu_threshold);
    let mut state = AppState::new(config.interval);
    info!(host = ?args.host, interval = ?config.interval, "starting TUI");

    // Always start local; a remote host is connected in the background.
    let mut engine = Engine::spawn(config, Scanner::local())?;
    if let Some(host) = &args.host {
        state.connect_at_startup(&engine, host, args.identity.clone())?;
    }
    let mut events = EventHandler::new(Duration::from_millis(100));

    let mut terminal = ratatui::init();
    if let Ok(size) = terminal.size() {
        state.resize(size.height);
    }

    loop {
        if let Some(snapshot) = engine.poll_snapshot() {
            state.apply_snapshot(snapshot);
        }
        while let Some(event) = engine.try_event() {
            state.on_engine_event(event);
        }
        state.poll_replies();

        terminal.draw(|frame| ui::render(frame, &mut state))?;

        match events.next()? {
            AppEvent::Key(key) => {
                if let Some(action) = map_key_to_action(key, &state.mode) {
                    if let Err(e) = dispatch_action(&mut state, action, &engine, args) {
                        warn!(error = %e, "engine command failed");
                        state.set_status(e.to_string(), StatusLevel::Error);
                    }
                }
            }
            AppEvent::Resize(_, height) => state.resize(height),
            AppEvent::Tick => {}
        }

        if state.should_quit {
            break;
        }
    }

    ratatui::restore();
    engine.shutdown();
    Ok(())
}

fn dispatch_action(
    state: &mut AppState,
    action: Action,
    engine: &EngineHandle,
    args: &CliArgs,
) -> std::result::Result<(), PortlensError> {
    match action {
        Action::Quit => state.should_quit = true,
        Action::MoveUp => state.move_up(),
        Action::MoveDown => state.move_down(),
        Action::PageUp => state.page_up(),
        Action::PageDown => state.page_down(),
        Action::First => state.select_first(),
        Action::Last => state.select_last(),
        Action::StartFilter => state.start_filter(),
        Action::FilterInput(c) => state.filter_push(c),
        Action::FilterBackspace => state.filter_pop(),
        Action::FilterCommit => state.filter_commit(),
        Action::ClearFilter => state.clear_filter(),
        Action::Sort(key) => state.sort_by(key),
        Action::CycleSort => state.cycle_sort(),
        Action::ReverseSort => state.reverse_sort(),
        Action::RequestKill { force } => state.request_kill(force),
        Action::ToggleForce => state.toggle_force(),
        Action::CancelKill => state.cancel_kill(),
        Action::ConfirmKill => {
            if let Some((target, force)) = state.confirm_kill() {
                let reply = engine.kill(target, force)?;
                state.track_kill(reply);
            }
        }
        Action::StartConnect => state.start_connect(),
        Action::ConnectInput(c) => state.connect_push(c),
        Action::ConnectBackspace => state.connect_pop(),
        Action::CancelConnect => state.cancel_connect(),
        Action::ConnectSubmit => {
            if let Some(spec) = state.submit_connect() {
                state.connect_via(engine, spec, args.identity.clone())?;
            }
        }
        Action::Disconnect => {
            engine.disconnect()?;
            state.disconnected();
        }
        Action::IntervalUp => {
            let interval = state.adjust_interval(false);
            engine.set_interval(interval)?;
        }
        Action::IntervalDown => {
            let interval = state.adjust_interval(true);
            engine.set_interval(interval)?;
        }
        Action::Refresh => engine.refresh()?,
        Action::ToggleHelp => state.toggle_help(),
    }
    Ok(())
}

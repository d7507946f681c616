use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::correlate::DEFAULT_CPU_THRESHOLD;
use crate::kill::KillTarget;

#[derive(Parser, Debug)]
#[command(
    name = "portlens",
    version,
    about = "Which process owns which port, locally or over SSH, with an interactive TUI"
)]
pub struct CliArgs {
    /// Scan a remote host over SSH: [user@]host[:port]
    #[arg(short = 'H', long = "host", value_name = "HOST", global = true)]
    pub host: Option<String>,

    /// SSH private key to try before the agent and default keys
    #[arg(short = 'i', long = "identity", value_name = "FILE", global = true)]
    pub identity: Option<PathBuf>,

    /// Refresh interval in seconds (fractions allowed, minimum 0.1)
    #[arg(short = 's', long = "interval", value_name = "SECS", default_value = "2", value_parser = parse_interval)]
    pub interval: Duration,

    /// CPU percentage above which an orphaned listener is flagged
    #[arg(long = "cpu-threshold", value_name = "PCT", default_value_t = DEFAULT_CPU_THRESHOLD, value_parser = parse_threshold, global = true)]
    pub cpu_threshold: f32,

    /// Write logs to this file (RUST_LOG controls the level)
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print every listener on a port, or owned by a PID
    Describe {
        /// Port number, or PID when no listener uses that port
        #[arg(value_name = "PORT_OR_PID")]
        target: u32,
    },
    /// Send SIGTERM (or SIGKILL with --force) to the owner of a port or PID
    Kill(KillArgs),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["pid", "port"])))]
pub struct KillArgs {
    /// Process ID to signal
    #[arg(long, value_name = "PID")]
    pub pid: Option<u32>,

    /// Signal the single process listening on this port
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Use SIGKILL instead of SIGTERM
    #[arg(short = 'f', long)]
    pub force: bool,
}

impl KillArgs {
    pub fn target(&self) -> Option<KillTarget> {
        match (self.pid, self.port) {
            (Some(pid), None) => Some(KillTarget::Pid(pid)),
            (None, Some(port)) => Some(KillTarget::Port(port)),
            _ => None,
        }
    }
}

fn parse_interval(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", s))?;
    if !secs.is_finite() || secs < 0.1 {
        return Err("interval must be at least 0.1 seconds".to_string());
    }
    Ok(Duration::from_secs_f64(secs))
}

fn parse_threshold(s: &str) -> Result<f32, String> {
    let pct: f32 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a percentage", s))?;
    if !pct.is_finite() || pct < 0.0 {
        return Err("threshold must be a non-negative percentage".to_string());
    }
    Ok(pct)
}

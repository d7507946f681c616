use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use ssh2::Session;
use tracing::{debug, info, warn};

use super::host::HostSpec;
use crate::error::{ConnectError, ExecError};

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a shell command on the other end of a connection. `&mut self`
/// serializes commands on one session.
pub trait RemoteExec: Send {
    fn execute(&mut self, command: &str) -> Result<ExecOutput, ExecError>;
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    /// Upper bound on any single blocking SSH operation.
    pub io_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(15),
        }
    }
}

/// How the session got authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    IdentityFile(PathBuf),
    Agent,
    DefaultKey(PathBuf),
}

const DEFAULT_KEYS: [&str; 3] = [".ssh/id_ed25519", ".ssh/id_rsa", ".ssh/id_ecdsa"];

/// Pause between polls of a channel with nothing to read.
const POLL_PAUSE: Duration = Duration::from_millis(5);

/// One authenticated SSH connection.
pub struct RemoteSession {
    session: Session,
    spec: HostSpec,
    auth: AuthMethod,
    io_timeout: Duration,
}

impl RemoteSession {
    /// Connect, handshake and authenticate. Tries, in order: the explicit
    /// identity file, the ssh-agent, then the default key files that
    /// exist. Never retries.
    pub fn connect(
        spec: &HostSpec,
        identity: Option<&Path>,
        options: &SessionOptions,
    ) -> Result<Self, ConnectError> {
        let (tcp, addr) = open_tcp(spec, options.connect_timeout)?;

        let mut session = Session::new().map_err(|e| ConnectError::Session(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(u32::try_from(options.io_timeout.as_millis()).unwrap_or(u32::MAX));
        session
            .handshake()
            .map_err(|e| ConnectError::Handshake(addr, e.to_string()))?;

        let auth = authenticate(&session, &spec.user, identity)?;
        info!(host = %spec, ?auth, "SSH session established");

        Ok(Self {
            session,
            spec: spec.clone(),
            auth,
            io_timeout: options.io_timeout,
        })
    }

    /// `user@host:port`
    pub fn label(&self) -> String {
        self.spec.to_string()
    }

    pub fn spec(&self) -> &HostSpec {
        &self.spec
    }

    pub fn auth_method(&self) -> &AuthMethod {
        &self.auth
    }
}

fn open_tcp(spec: &HostSpec, timeout: Duration) -> Result<(TcpStream, SocketAddr), ConnectError> {
    let display = format!("{}:{}", spec.host, spec.port);
    let addrs: Vec<SocketAddr> = spec
        .address()
        .to_socket_addrs()
        .map_err(|source| ConnectError::Unreachable {
            addr: display.clone(),
            source,
        })?
        .collect();

    let mut last_err =
        io::Error::new(io::ErrorKind::NotFound, "host name resolved to no addresses");
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(tcp) => return Ok((tcp, addr)),
            Err(e) => {
                debug!(%addr, error = %e, "TCP connect failed");
                last_err = e;
            }
        }
    }

    Err(ConnectError::Unreachable {
        addr: display,
        source: last_err,
    })
}

fn authenticate(
    session: &Session,
    user: &str,
    identity: Option<&Path>,
) -> Result<AuthMethod, ConnectError> {
    let mut tried = Vec::new();

    if let Some(path) = identity {
        if try_key(session, user, path) {
            return Ok(AuthMethod::IdentityFile(path.to_path_buf()));
        }
        tried.push(format!("identity {}", path.display()));
    }

    match session.userauth_agent(user) {
        Ok(()) if session.authenticated() => return Ok(AuthMethod::Agent),
        Ok(()) => {}
        Err(e) => debug!(error = %e, "ssh-agent authentication failed"),
    }
    tried.push("ssh-agent".to_string());

    if let Some(home) = dirs::home_dir() {
        for key in DEFAULT_KEYS {
            let path = home.join(key);
            if !path.exists() {
                continue;
            }
            if try_key(session, user, &path) {
                return Ok(AuthMethod::DefaultKey(path));
            }
            tried.push(path.display().to_string());
        }
    }

    warn!(user, ?tried, "all SSH authentication methods failed");
    Err(ConnectError::AuthExhausted {
        user: user.to_string(),
        tried,
    })
}

fn try_key(session: &Session, user: &str, path: &Path) -> bool {
    match session.userauth_pubkey_file(user, None, path, None) {
        Ok(()) => session.authenticated(),
        Err(e) => {
            debug!(key = %path.display(), error = %e, "public key authentication failed");
            false
        }
    }
}

fn transport<E: std::fmt::Display>(err: E) -> ExecError {
    ExecError::Transport(err.to_string())
}

/// Read whatever `reader` has buffered into `sink`. `Ok(true)` once the
/// stream has ended.
fn drain(reader: &mut impl Read, sink: &mut Vec<u8>, progress: &mut bool) -> io::Result<bool> {
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(true),
            Ok(n) => {
                sink.extend_from_slice(&buf[..n]);
                *progress = true;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

/// Collect stdout and stderr of a non-blocking channel, taking from
/// whichever has data so a full stderr window cannot stall stdout. Fails
/// when neither stream moves for `timeout`.
fn read_interleaved(
    stdout: &mut impl Read,
    stderr: &mut impl Read,
    eof: impl Fn() -> bool,
    timeout: Duration,
) -> Result<(Vec<u8>, Vec<u8>), ExecError> {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let (mut out_done, mut err_done) = (false, false);
    let mut deadline = Instant::now() + timeout;

    loop {
        let closing = eof();
        let mut progress = false;
        if !out_done {
            out_done = drain(stdout, &mut out, &mut progress).map_err(transport)?;
        }
        if !err_done {
            err_done = drain(stderr, &mut err, &mut progress).map_err(transport)?;
        }
        if (out_done && err_done) || (closing && !progress) {
            return Ok((out, err));
        }

        let now = Instant::now();
        if progress {
            deadline = now + timeout;
        } else if now >= deadline {
            return Err(ExecError::Transport(format!(
                "command output timed out after {:?}",
                timeout
            )));
        } else {
            thread::sleep(POLL_PAUSE);
        }
    }
}

impl RemoteExec for RemoteSession {
    fn execute(&mut self, command: &str) -> Result<ExecOutput, ExecError> {
        let mut channel = self.session.channel_session().map_err(transport)?;
        channel.exec(command).map_err(transport)?;

        self.session.set_blocking(false);
        let read = {
            let mut out_stream = channel.stream(0);
            let mut err_stream = channel.stderr();
            read_interleaved(&mut out_stream, &mut err_stream, || channel.eof(), self.io_timeout)
        };
        self.session.set_blocking(true);
        let (stdout, stderr) = read?;

        channel.wait_close().map_err(transport)?;
        let exit_code = channel.exit_status().map_err(transport)?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
        })
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        if let Err(e) = self.session.disconnect(None, "portlens closing", None) {
            debug!(error = %e, "SSH disconnect failed");
        }
    }
}

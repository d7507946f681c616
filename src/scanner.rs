use std::collections::HashMap;

use crate::error::{KillError, ScanError};
use crate::kill::KillSignal;
use crate::local::LocalScanner;
use crate::model::{ProcessInfo, RawSocket, Source};
use crate::remote::RemoteScanner;

/// Raw material for one snapshot: sockets plus the process map they join
/// against.
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    pub sockets: Vec<RawSocket>,
    pub processes: HashMap<u32, ProcessInfo>,
}

/// The active data source.
pub enum Scanner {
    Local(LocalScanner),
    Remote(RemoteScanner),
}

impl Scanner {
    pub fn local() -> Self {
        Scanner::Local(LocalScanner::new())
    }

    pub fn source(&self) -> Source {
        match self {
            Scanner::Local(_) => Source::Local,
            Scanner::Remote(remote) => Source::Remote(remote.label().to_string()),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Scanner::Remote(_))
    }

    /// Set once a remote transport failure was seen outside a scan.
    pub fn session_lost(&self) -> Option<&str> {
        match self {
            Scanner::Local(_) => None,
            Scanner::Remote(remote) => remote.session_lost(),
        }
    }

    pub fn scan(&mut self) -> Result<ScanOutput, ScanError> {
        match self {
            Scanner::Local(local) => local.scan(),
            Scanner::Remote(remote) => remote.scan(),
        }
    }

    pub fn signal(&mut self, pid: u32, sig: KillSignal) -> Result<(), KillError> {
        match self {
            Scanner::Local(local) => local.signal(pid, sig),
            Scanner::Remote(remote) => remote.signal(pid, sig),
        }
    }
}

pub mod host;
pub mod scanner;
pub mod session;

pub use host::HostSpec;
pub use scanner::RemoteScanner;
pub use session::{ExecOutput, RemoteExec, RemoteSession, SessionOptions};

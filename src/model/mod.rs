pub mod entry;
pub mod network;
pub mod process;
pub mod snapshot;

pub use entry::{format_memory, EntryKey, PortEntry};
pub use network::{dedup_sockets, Protocol, RawSocket};
pub use process::ProcessInfo;
pub use snapshot::{Snapshot, Source};

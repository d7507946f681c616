use crate::error::ScanError;
use crate::model::RawSocket;

/// Kernel-level listener enumeration for the local host.
pub trait SocketProvider: Send {
    /// Every listening TCP socket and bound UDP socket, with the owning
    /// PID where the kernel tables allow it to be resolved.
    fn list_listeners(&self) -> Result<Vec<RawSocket>, ScanError>;
}

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

pub fn create_provider() -> Box<dyn SocketProvider> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::LinuxProvider::new())
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::MacosProvider::new())
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Box::new(Unsupported)
    }
}

/// Platforms without a kernel path rely on the command fallback alone.
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
struct Unsupported;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
impl SocketProvider for Unsupported {
    fn list_listeners(&self) -> Result<Vec<RawSocket>, ScanError> {
        Err(ScanError::Enumeration(
            "no kernel socket table support on this platform".into(),
        ))
    }
}

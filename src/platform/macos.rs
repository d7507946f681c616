use libproc::libproc::file_info::{pidfdinfo, ListFDs, ProcFDInfo, ProcFDType};
use libproc::libproc::net_info::{SocketFDInfo, SocketInfoKind, TcpSIState};
use libproc::libproc::proc_pid::{listpidinfo, listpids, pidinfo, ProcType};
use libproc::libproc::task_info::TaskAllInfo;

use super::SocketProvider;
use crate::error::ScanError;
use crate::model::{Protocol, RawSocket};

// IPPROTO_UDP from <netinet/in.h>
const IPPROTO_UDP: i32 = 17;

/// Convert a network-byte-order port (stored in an i32) to host-byte-order u16.
fn port_from_nbo(nbo: i32) -> u16 {
    let p = nbo as u16;
    u16::from_be(p)
}

/// Listening port of one socket fd, if it is a TCP listener or a bound UDP
/// socket.
fn listener_from_socket(fd_num: i32, pid: i32) -> Option<(u16, Protocol)> {
    let sock: SocketFDInfo = pidfdinfo(pid, fd_num).ok()?;
    let si = &sock.psi;
    let kind: SocketInfoKind = si.soi_kind.into();

    match kind {
        SocketInfoKind::Tcp => {
            let tcp = unsafe { si.soi_proto.pri_tcp };
            if !matches!(TcpSIState::from(tcp.tcpsi_state), TcpSIState::Listen) {
                return None;
            }
            let port = port_from_nbo(tcp.tcpsi_ini.insi_lport);
            (port != 0).then_some((port, Protocol::Tcp))
        }
        SocketInfoKind::In if si.soi_protocol == IPPROTO_UDP => {
            let ini = unsafe { si.soi_proto.pri_in };
            let port = port_from_nbo(ini.insi_lport);
            (port != 0).then_some((port, Protocol::Udp))
        }
        _ => None,
    }
}

/// Get the list of FDs for a process. Returns an empty vec on error
/// (e.g. permission denied for system processes).
fn get_fd_list(pid: i32) -> Vec<ProcFDInfo> {
    let max_fds = pidinfo::<TaskAllInfo>(pid, 0)
        .map(|info| info.pbsd.pbi_nfiles as usize)
        .unwrap_or(256);

    listpidinfo::<ListFDs>(pid, max_fds).unwrap_or_default()
}

pub struct MacosProvider;

impl MacosProvider {
    pub fn new() -> Self {
        Self
    }
}

impl SocketProvider for MacosProvider {
    fn list_listeners(&self) -> Result<Vec<RawSocket>, ScanError> {
        let pids = listpids(ProcType::ProcAllPIDS).map_err(ScanError::Enumeration)?;
        let mut sockets = Vec::new();

        for pid in pids {
            if pid == 0 {
                continue;
            }
            let pid_i32 = pid as i32;
            for fd in get_fd_list(pid_i32) {
                let fd_type: ProcFDType = fd.proc_fdtype.into();
                if let ProcFDType::Socket = fd_type {
                    if let Some((port, protocol)) = listener_from_socket(fd.proc_fd, pid_i32) {
                        sockets.push(RawSocket::new(port, protocol, Some(pid)));
                    }
                }
            }
        }

        Ok(sockets)
    }
}

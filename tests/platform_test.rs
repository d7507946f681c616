use std::net::{TcpListener, UdpSocket};
use std::process;

use portlens::local::LocalScanner;
use portlens::model::Protocol;
use portlens::platform::create_provider;

#[test]
#[cfg(any(target_os = "linux", target_os = "macos"))]
fn test_provider_sees_own_tcp_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let sockets = create_provider().list_listeners().unwrap();
    let ours = sockets
        .iter()
        .find(|s| s.port == port && s.protocol == Protocol::Tcp)
        .expect("listener missing from socket tables");
    assert_eq!(ours.pid, Some(process::id()));
}

#[test]
#[cfg(any(target_os = "linux", target_os = "macos"))]
fn test_provider_sees_unconnected_udp_socket() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = socket.local_addr().unwrap().port();

    let sockets = create_provider().list_listeners().unwrap();
    assert!(sockets
        .iter()
        .any(|s| s.port == port && s.protocol == Protocol::Udp));
}

#[test]
fn test_local_scan_joins_process_metadata() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut scanner = LocalScanner::new();
    let scan = scanner.scan().unwrap();
    assert!(scan.sockets.iter().any(|s| s.port == port));

    let me = scan.processes.get(&process::id()).expect("own process missing");
    assert!(me.memory_bytes > 0);
    assert!(!me.name.is_empty());
}

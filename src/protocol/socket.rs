//! socket.rs
//! UDP plumbing shared by the receive loop and the heartbeat timer.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::{
    io,
    net::{SocketAddr, UdpSocket},
    time::Duration,
};
use log::{info, warn};

use crate::protocol::codec::{REGISTER, UNREGISTER};

/// Datagram sender. `UdpSocket` in production, a recorder in tests.
pub trait Outbound: Send + Sync {
    fn send_datagram(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize>;
}

impl Outbound for UdpSocket {
    fn send_datagram(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.send_to(payload, target)
    }
}

/// Binds the client socket on `bind` with address reuse, so several clients
/// can listen for announcements on the same discovery port.
pub fn bind_client_socket(bind: SocketAddr, read_timeout: Duration) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(bind), Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    {
        socket.set_reuse_port(true)?;
    }
    socket.set_broadcast(true)?;
    socket.bind(&SockAddr::from(bind))?;

    let udp: UdpSocket = socket.into();
    udp.set_read_timeout(Some(read_timeout))?;
    info!("[Socket] Listening on {}", udp.local_addr()?);
    Ok(udp)
}

/// Sends `register` to `target`. Failures are logged, never escalated: an
/// unreachable service drops out with the next expiry sweep.
pub fn register(out: &dyn Outbound, target: SocketAddr) -> bool {
    send_logged(out, REGISTER, target)
}

pub fn unregister(out: &dyn Outbound, target: SocketAddr) -> bool {
    send_logged(out, UNREGISTER, target)
}

fn send_logged(out: &dyn Outbound, payload: &[u8], target: SocketAddr) -> bool {
    match out.send_datagram(payload, target) {
        Ok(_) => true,
        Err(e) => {
            warn!(
                "[Socket] Sending '{}' to {} failed: {}",
                String::from_utf8_lossy(payload),
                target,
                e
            );
            false
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_reaches_a_listening_peer() {
        let client = bind_client_socket("127.0.0.1:0".parse().unwrap(), Duration::from_millis(200)).unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        assert!(register(&client, peer.local_addr().unwrap()));

        let mut buf = [0u8; 64];
        let (n, from) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"register");
        assert_eq!(from, client.local_addr().unwrap());
    }

    #[test]
    fn send_failure_is_logged_not_raised() {
        let dead = "192.168.1.99:8981".parse().unwrap();
        let out = testing::RecordingOutbound::refusing(&[dead]);
        assert!(!register(&out, dead));
        assert!(!unregister(&out, dead));
        assert!(register(&out, "192.168.1.20:8981".parse().unwrap()));
        assert_eq!(out.sent.lock().len(), 1);
    }

    #[test]
    fn bound_socket_honours_read_timeout() {
        let client = bind_client_socket("127.0.0.1:0".parse().unwrap(), Duration::from_millis(50)).unwrap();
        let mut buf = [0u8; 16];
        let err = client.recv_from(&mut buf).unwrap_err();
        assert!(matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut));
    }
}

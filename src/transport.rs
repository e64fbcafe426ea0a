//! The non-blocking datagram transport the endpoint drives.
//!
//! Kept behind a small trait so the connection/endpoint core stays testable
//! against an in-memory fake (used for the lossy-delivery scenarios in
//! `tests/`) without coupling it to `std::net::UdpSocket`, in the same
//! spirit as the wire codec staying generic over `T: AsRef<[u8]>` instead
//! of a concrete buffer type.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// A non-blocking datagram socket: never blocks, reports [`io::ErrorKind::WouldBlock`]
/// when nothing is ready.
pub trait UdpTransport {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
    /// The raw OS socket descriptor, exposed via `endpoint_get_prop(FD)`.
    fn raw_fd(&self) -> libc::c_int;
}

/// The real transport: a non-blocking OS UDP socket.
pub struct RealUdpSocket {
    socket: UdpSocket,
}

impl RealUdpSocket {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<RealUdpSocket> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(RealUdpSocket { socket })
    }
}

impl UdpTransport for RealUdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn raw_fd(&self) -> libc::c_int {
        use std::os::unix::io::AsRawFd;
        self.socket.as_raw_fd()
    }
}

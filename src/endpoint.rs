//! The endpoint: owns the UDP socket, demultiplexes inbound datagrams to
//! connections (creating new ones on incoming handshakes), and drives
//! periodic maintenance.
//!
//! The endpoint is the thing that owns the device and pumps packets, while
//! each [`Connection`] stays a self-contained state machine that only ever
//! sees a transport and a peer address, never the collection it lives in.
//! [`Connection`]s and the UDP socket are kept as separate struct fields
//! throughout so the borrow checker can see they're independent, instead
//! of routing every access through a single `&mut self` accessor.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{Config, SockOpt};
use crate::connection::{ConnState, Connection, DrainOutcome, TickAction};
use crate::consts::{RDP_MAX_VEC, SOCKET_CHECK_MAX, SOCKET_CHECK_MIN};
use crate::error::{Error, Result};
use crate::events::Events;
use crate::seq::Seq;
use crate::time::Instant;
use crate::transport::{RealUdpSocket, UdpTransport};
use crate::wire::{self, Packet, PacketType, Repr};

/// How many random `id_seed` draws `connect` attempts before giving up on
/// finding a collision-free one and using the last draw anyway.
const ID_SEED_ATTEMPTS: u32 = 64;

/// A sentinel handle returned for datagrams that couldn't be demultiplexed
/// to any connection (malformed, or addressed to an unknown conn id).
const NONE_HANDLE: ConnHandle = ConnHandle { index: usize::MAX, generation: 0 };

/// Opaque handle to a connection living inside an [`Endpoint`]'s arena.
///
/// Carries a generation counter alongside the slot index so a handle to a
/// destroyed-and-recycled slot is detected rather than silently aliasing
/// a newer, unrelated connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnHandle {
    index: usize,
    generation: u32,
}

/// Owns the UDP socket and the collection of connections multiplexed over
/// it. The sole entry point the caller's event loop drives.
///
/// `conns`/`generations` and `transport` are kept as separate top-level
/// fields (rather than one `connections: Vec<Slot>` holding everything)
/// so that e.g. iterating `conns` while sending on `transport` borrows two
/// disjoint fields instead of the whole `Endpoint`.
pub struct Endpoint {
    transport: Box<dyn UdpTransport>,
    conns: Vec<Option<Connection>>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
    rng: StdRng,
    config: Config,
    created_at: std::time::Instant,
}

impl Endpoint {
    /// `endpoint_create(version, host, service)`: only `version == 1` is
    /// accepted.
    pub fn create<A: ToSocketAddrs>(version: u8, addr: A) -> Result<Endpoint> {
        if version != wire::PROTOCOL_VERSION {
            return Err(Error::InvalidArgument);
        }
        let socket = RealUdpSocket::bind(addr).map_err(|_| Error::InvalidArgument)?;
        Ok(Endpoint::from_transport(Box::new(socket)))
    }

    /// Constructs an endpoint over an arbitrary [`UdpTransport`], the seam
    /// the in-memory lossy-channel test harness hooks into instead of a
    /// real socket.
    pub fn from_transport(transport: Box<dyn UdpTransport>) -> Endpoint {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Endpoint {
            transport,
            conns: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            config: Config::default(),
            created_at: std::time::Instant::now(),
        }
    }

    fn now(&self) -> Instant {
        Instant::from_millis(self.created_at.elapsed().as_millis() as i64)
    }

    /// Test-only seam: rewinds the reference instant `now()` measures
    /// elapsed time against, so retransmit/keepalive timers can be driven
    /// past their deadline without an actual `sleep`.
    #[cfg(test)]
    fn advance_clock_for_test(&mut self, ms: u64) {
        self.created_at -= std::time::Duration::from_millis(ms);
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr().map_err(|_| Error::InvalidArgument)
    }

    pub fn get_prop(&self, opt: SockOpt) -> i64 {
        if opt == SockOpt::Fd {
            return self.transport.raw_fd() as i64;
        }
        self.config.get(opt)
    }

    pub fn set_prop(&mut self, opt: SockOpt, val: i64) {
        self.config.set(opt, val);
    }

    // ---- arena helpers (free functions over explicit fields, so callers
    // can hold a `transport` borrow and a `conns`/`generations` borrow at
    // the same time without the borrow checker treating it as one `self`
    // borrow) ----

    fn conn_ref(conns: &[Option<Connection>], generations: &[u32], handle: ConnHandle) -> Result<&Connection> {
        if generations.get(handle.index) != Some(&handle.generation) {
            return Err(Error::InvalidArgument);
        }
        conns[handle.index].as_ref().ok_or(Error::InvalidArgument)
    }

    fn conn_mut<'a>(
        conns: &'a mut [Option<Connection>],
        generations: &[u32],
        handle: ConnHandle,
    ) -> Result<&'a mut Connection> {
        if generations.get(handle.index) != Some(&handle.generation) {
            return Err(Error::InvalidArgument);
        }
        conns[handle.index].as_mut().ok_or(Error::InvalidArgument)
    }

    fn find(conns: &[Option<Connection>], generations: &[u32], peer_addr: SocketAddr, recv_id: u16) -> Option<ConnHandle> {
        conns.iter().enumerate().find_map(|(index, c)| {
            let c = c.as_ref()?;
            if c.peer_addr() == Some(peer_addr) && c.recv_id() == recv_id {
                Some(ConnHandle { index, generation: generations[index] })
            } else {
                None
            }
        })
    }

    fn insert(&mut self, conn: Connection) -> ConnHandle {
        if let Some(index) = self.free_list.pop() {
            self.conns[index] = Some(conn);
            ConnHandle { index, generation: self.generations[index] }
        } else {
            let index = self.conns.len();
            self.conns.push(Some(conn));
            self.generations.push(0);
            ConnHandle { index, generation: 0 }
        }
    }

    fn recv_id_collides(&self, recv_id: u16) -> bool {
        self.conns
            .iter()
            .flatten()
            .any(|c| c.state() != ConnState::Uninitialized && c.recv_id() == recv_id)
    }

    fn fresh_id_seed(&mut self) -> u16 {
        let mut candidate = self.rng.gen();
        for _ in 1..ID_SEED_ATTEMPTS {
            if !self.recv_id_collides(candidate) {
                break;
            }
            candidate = self.rng.gen();
        }
        candidate
    }

    // ---- connection lifecycle / public accessors ----

    pub fn connection_create(&mut self) -> ConnHandle {
        let conn = Connection::new(self.config.effective_mtu, self.now());
        self.insert(conn)
    }

    /// `connect(Conn, sockaddr)`: only from `UNINITIALIZED`.
    pub fn connect(&mut self, handle: ConnHandle, peer_addr: SocketAddr) -> Result<()> {
        if Self::conn_ref(&self.conns, &self.generations, handle)?.state() != ConnState::Uninitialized {
            return Err(Error::InvalidArgument);
        }
        let id_seed = self.fresh_id_seed();
        let initial_seq = Seq::new(self.rng.gen());
        let now = self.now();
        let conn = Self::conn_mut(&mut self.conns, &self.generations, handle)?;
        conn.begin_connect(peer_addr, id_seed, initial_seq, now, &*self.transport);
        Ok(())
    }

    /// `net_connect(Endpoint, host, service)`: resolve an address and
    /// `connect` in one call.
    pub fn net_connect<A: ToSocketAddrs>(&mut self, addr: A) -> Result<ConnHandle> {
        let peer_addr = addr
            .to_socket_addrs()
            .ok()
            .and_then(|mut it| it.next())
            .ok_or(Error::InvalidArgument)?;
        let handle = self.connection_create();
        self.connect(handle, peer_addr)?;
        Ok(handle)
    }

    pub fn close(&mut self, handle: ConnHandle) -> Result<()> {
        let now = self.now();
        let conn = Self::conn_mut(&mut self.conns, &self.generations, handle)?;
        conn.close(now, &*self.transport)
    }

    pub fn conn_peer_addr(&self, handle: ConnHandle) -> Result<Option<SocketAddr>> {
        Ok(Self::conn_ref(&self.conns, &self.generations, handle)?.peer_addr())
    }

    pub fn conn_state(&self, handle: ConnHandle) -> Result<ConnState> {
        Ok(Self::conn_ref(&self.conns, &self.generations, handle)?.state())
    }

    pub fn conn_set_user_data<T: 'static>(&mut self, handle: ConnHandle, data: T) -> Result<()> {
        Self::conn_mut(&mut self.conns, &self.generations, handle)?.set_user_data(data);
        Ok(())
    }

    pub fn conn_get_user_data<T: 'static>(&self, handle: ConnHandle) -> Result<Option<&T>> {
        Ok(Self::conn_ref(&self.conns, &self.generations, handle)?.user_data::<T>())
    }

    // ---- write ----

    pub fn write(&mut self, handle: ConnHandle, bytes: &[u8]) -> Result<usize> {
        self.write_vec(handle, &[bytes])
    }

    /// `write_vec(Conn, vec[])`: accepts up to [`RDP_MAX_VEC`] iovecs.
    pub fn write_vec(&mut self, handle: ConnHandle, bufs: &[&[u8]]) -> Result<usize> {
        if bufs.len() > RDP_MAX_VEC {
            return Err(Error::InvalidArgument);
        }
        let now = self.now();
        let conn = Self::conn_mut(&mut self.conns, &self.generations, handle)?;
        conn.write(bufs, now, &*self.transport)
    }

    // ---- demux ----

    fn handle_inbound(&mut self, peer_addr: SocketAddr, datagram: &[u8]) -> (ConnHandle, Events) {
        let packet = match Packet::new_checked(datagram) {
            Ok(p) => p,
            Err(_) => {
                warn!("endpoint: dropping malformed datagram from {peer_addr}");
                return (NONE_HANDLE, Events::NONE);
            }
        };
        let repr = Repr::parse(&packet);

        let (sack, consumed) = match wire::split_extensions(packet.extension(), packet.payload()) {
            Ok(v) => v,
            Err(_) => {
                warn!("endpoint: dropping datagram with malformed extension chain from {peer_addr}");
                return (NONE_HANDLE, Events::NONE);
            }
        };
        let payload = &packet.payload()[consumed..];

        if repr.packet_type == PacketType::Syn {
            let handle = match Self::find(&self.conns, &self.generations, peer_addr, repr.conn_id.wrapping_add(1)) {
                Some(h) => {
                    trace!("endpoint: duplicate SYN from {peer_addr}, re-acking");
                    h
                }
                None => {
                    let now = self.now();
                    let initial_seq = Seq::new(self.rng.gen());
                    let mut conn = Connection::new(self.config.effective_mtu, now);
                    conn.begin_accept(peer_addr, repr.conn_id, repr.seqnr, repr.window, initial_seq, now, &*self.transport);
                    self.insert(conn)
                }
            };
            return (handle, Events::NONE);
        }

        let handle = match Self::find(&self.conns, &self.generations, peer_addr, repr.conn_id) {
            Some(h) => h,
            None => {
                warn!("endpoint: dropping packet for unknown connection {:#06x} from {peer_addr}", repr.conn_id);
                return (NONE_HANDLE, Events::NONE);
            }
        };

        let now = self.now();
        let events = match Self::conn_mut(&mut self.conns, &self.generations, handle) {
            Ok(conn) => conn.on_packet(&repr, sack, payload, now),
            Err(_) => Events::NONE,
        };
        (handle, events)
    }

    /// `read_poll(Endpoint, buf, len) -> (bytes, Conn, events)`.
    ///
    /// Drains at most one inbound datagram (or one ready reassembly slot)
    /// per call; the `CONTINUE` bit tells the caller whether to call again
    /// immediately without waiting on the socket to become readable.
    pub fn read_poll(&mut self, buf: &mut [u8]) -> (usize, Option<ConnHandle>, Events) {
        let mut scratch = vec![0u8; self.config.effective_mtu + wire::HEADER_LEN + 64];
        let recv_result = self.transport.recv_from(&mut scratch);
        match recv_result {
            Ok((n, peer_addr)) => {
                let (handle, mut events) = self.handle_inbound(peer_addr, &scratch[..n]);
                if handle == NONE_HANDLE {
                    return (0, None, Events::CONTINUE);
                }
                match Self::conn_mut(&mut self.conns, &self.generations, handle).map(|c| c.drain_one(buf)) {
                    Ok(DrainOutcome::Delivered(len)) => {
                        events |= Events::DATA;
                        (len, Some(handle), events | Events::CONTINUE)
                    }
                    Ok(DrainOutcome::Eof) => (0, Some(handle), events | Events::CONTINUE),
                    Ok(DrainOutcome::TooSmall) => (0, Some(handle), events | Events::ERROR),
                    Ok(DrainOutcome::Empty) | Err(_) => (0, Some(handle), events | Events::CONTINUE),
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if let Some((handle, len)) = self.drain_pending(buf) {
                    return (len, Some(handle), Events::DATA | Events::CONTINUE);
                }
                self.flush_acks();
                (0, None, Events::AGAIN)
            }
            Err(_) => (0, None, Events::AGAIN),
        }
    }

    /// Before blocking, drain any reassembly slot that became ready from a
    /// previous packet but wasn't read out yet (e.g. the caller's buffer
    /// was too small and it retried with a bigger one).
    fn drain_pending(&mut self, buf: &mut [u8]) -> Option<(ConnHandle, usize)> {
        for (index, slot) in self.conns.iter_mut().enumerate() {
            let conn = match slot {
                Some(c) => c,
                None => continue,
            };
            if !conn.has_more_to_drain() {
                continue;
            }
            if let DrainOutcome::Delivered(len) = conn.drain_one(buf) {
                return Some((ConnHandle { index, generation: self.generations[index] }, len));
            }
        }
        None
    }

    /// `endpoint.flush_acks`: when `recv` would block, walk all connections
    /// and emit any pending ack.
    fn flush_acks(&mut self) {
        for conn in self.conns.iter_mut().flatten() {
            if !conn.needs_ack() {
                continue;
            }
            if let Some(addr) = conn.peer_addr() {
                let ack = conn.build_ack();
                let _ = self.transport.send_to(&ack, addr);
            }
        }
    }

    /// `tick(Endpoint) -> next_timeout_ms`.
    ///
    /// Sweeps connections that reached `DESTROY` on a prior call first (a
    /// connection is considered destroyed once its state reaches DESTROY
    /// and the next tick runs), then drives retransmission/keepalive on
    /// everything left.
    pub fn tick(&mut self) -> u64 {
        for index in 0..self.conns.len() {
            let destroyed = self.conns[index].as_ref().is_some_and(|c| c.is_destroyed());
            if destroyed {
                self.conns[index] = None;
                self.generations[index] = self.generations[index].wrapping_add(1);
                self.free_list.push(index);
            }
        }

        let now = self.now();
        for conn in self.conns.iter_mut().flatten() {
            let _: TickAction = conn.tick(now, &*self.transport);
        }

        let now = self.now();
        let min_hint = self
            .conns
            .iter()
            .flatten()
            .filter(|c| !c.is_destroyed())
            .map(|c| c.next_timeout_hint(now).as_millis())
            .min()
            .unwrap_or(SOCKET_CHECK_MAX);
        min_hint.clamp(SOCKET_CHECK_MIN, SOCKET_CHECK_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// In-memory lossy UDP substitute: two endpoints share a pair of
    /// queues, and specific sequence numbers can be told to drop so
    /// retransmission/SYN-collision scenarios are deterministic.
    pub struct LossyChannel {
        local: SocketAddr,
        peer: SocketAddr,
        inbox: Arc<Mutex<VecDeque<Vec<u8>>>>,
        outbox: Arc<Mutex<VecDeque<Vec<u8>>>>,
        drop_seqs: RefCell<Vec<u16>>,
    }

    impl LossyChannel {
        pub fn pair(a: SocketAddr, b: SocketAddr) -> (LossyChannel, LossyChannel) {
            let q1 = Arc::new(Mutex::new(VecDeque::new()));
            let q2 = Arc::new(Mutex::new(VecDeque::new()));
            (
                LossyChannel { local: a, peer: b, inbox: q1.clone(), outbox: q2.clone(), drop_seqs: RefCell::new(Vec::new()) },
                LossyChannel { local: b, peer: a, inbox: q2, outbox: q1, drop_seqs: RefCell::new(Vec::new()) },
            )
        }

        pub fn drop_seq(&self, seq: u16) {
            self.drop_seqs.borrow_mut().push(seq);
        }
    }

    impl UdpTransport for LossyChannel {
        fn send_to(&self, buf: &[u8], _addr: SocketAddr) -> io::Result<usize> {
            if buf.len() >= wire::HEADER_LEN {
                if let Ok(pkt) = Packet::new_checked(buf) {
                    if self.drop_seqs.borrow().contains(&pkt.seqnr().0) {
                        return Ok(buf.len());
                    }
                }
            }
            self.outbox.lock().unwrap().push_back(buf.to_vec());
            Ok(buf.len())
        }

        fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            match self.inbox.lock().unwrap().pop_front() {
                Some(bytes) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok((n, self.peer))
                }
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(self.local)
        }

        fn raw_fd(&self) -> libc::c_int {
            -1
        }
    }

    fn pump_until_again(ep: &mut Endpoint) -> Vec<(usize, Option<ConnHandle>, Events)> {
        let mut out = Vec::new();
        let mut buf = [0u8; 2048];
        loop {
            let (n, h, ev) = ep.read_poll(&mut buf);
            out.push((n, h, ev));
            if ev.contains(Events::AGAIN) {
                break;
            }
        }
        out
    }

    fn only_conn(ep: &Endpoint) -> ConnHandle {
        let index = ep.conns.iter().position(Option::is_some).unwrap();
        ConnHandle { index, generation: ep.generations[index] }
    }

    #[test]
    fn handshake_and_single_payload() {
        let client_addr: SocketAddr = "127.0.0.1:40001".parse().unwrap();
        let server_addr: SocketAddr = "127.0.0.1:40002".parse().unwrap();
        let (client_t, server_t) = LossyChannel::pair(client_addr, server_addr);
        let mut client = Endpoint::from_transport(Box::new(client_t));
        let mut server = Endpoint::from_transport(Box::new(server_t));

        let c = client.net_connect(server_addr).unwrap();
        assert_eq!(client.conn_state(c).unwrap(), ConnState::SynSent);

        pump_until_again(&mut server);
        let client_events = pump_until_again(&mut client);
        assert!(client_events.iter().any(|(_, _, ev)| ev.contains(Events::CONNECTED)));
        assert_eq!(client.conn_state(c).unwrap(), ConnState::Connected);

        let n = client.write(c, b"hello").unwrap();
        assert_eq!(n, 5);

        // Drain server datagrams by hand rather than via `pump_until_again`,
        // which would discard the delivered bytes before this test can see
        // them.
        let mut buf = [0u8; 64];
        let mut delivered = None;
        loop {
            let (n, h, ev) = server.read_poll(&mut buf);
            if n > 0 {
                delivered = Some((n, h, ev));
            }
            if ev.contains(Events::AGAIN) {
                break;
            }
        }
        let (n, h, ev) = delivered.expect("server should have received \"hello\"");
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], b"hello");
        assert!(ev.contains(Events::DATA));
        let server_handle = h.unwrap();
        assert_eq!(server.conn_state(server_handle).unwrap(), ConnState::Connected);

        client.close(c).unwrap();
        pump_until_again(&mut server);

        let mut buf = [0u8; 64];
        let mut saw_eof = false;
        loop {
            let (n, _h, ev) = server.read_poll(&mut buf);
            if n == 0 && !ev.contains(Events::AGAIN) {
                saw_eof = true;
            }
            if ev.contains(Events::AGAIN) {
                break;
            }
        }
        assert!(saw_eof);

        // The client's FIN gets acked by this last round trip, which
        // already drives the client straight to DESTROY inside
        // `on_packet`'s `maybe_finish_close` -- `tick()` only sweeps a
        // connection that was already DESTROY when it's called, so assert
        // before calling it, not after.
        pump_until_again(&mut server);
        pump_until_again(&mut client);
        assert_eq!(client.conn_state(c).unwrap(), ConnState::Destroy);

        client.tick();
        assert_eq!(client.conn_state(c), Err(Error::InvalidArgument));
    }

    #[test]
    fn out_of_order_delivery_sacks_and_drains_in_order() {
        let client_addr: SocketAddr = "127.0.0.1:40021".parse().unwrap();
        let server_addr: SocketAddr = "127.0.0.1:40022".parse().unwrap();
        let (client_t, server_t) = LossyChannel::pair(client_addr, server_addr);
        let server_inbox = server_t.inbox.clone(); // the queue client datagrams land in
        let mut client = Endpoint::from_transport(Box::new(client_t));
        let mut server = Endpoint::from_transport(Box::new(server_t));

        let c = client.net_connect(server_addr).unwrap();
        pump_until_again(&mut server);
        pump_until_again(&mut client);

        client.write(c, b"one").unwrap();
        client.write(c, b"two").unwrap();

        // Reverse the two queued server-bound datagrams so "two" arrives first.
        {
            let mut q = server_inbox.lock().unwrap();
            assert_eq!(q.len(), 2);
            let first = q.pop_front().unwrap();
            let second = q.pop_front().unwrap();
            q.push_back(second);
            q.push_back(first);
        }

        pump_until_again(&mut server);
        let h = only_conn(&server);
        let mut buf = [0u8; 16];
        let mut collected = Vec::new();
        loop {
            let (n, _h, ev) = server.read_poll(&mut buf);
            if n > 0 {
                collected.extend_from_slice(&buf[..n]);
            }
            if ev.contains(Events::AGAIN) {
                break;
            }
        }
        assert_eq!(collected, b"onetwo");
        assert_eq!(server.conn_state(h).unwrap(), ConnState::Connected);
    }

    #[test]
    fn write_vec_rejects_too_many_iovecs() {
        let client_addr: SocketAddr = "127.0.0.1:40011".parse().unwrap();
        let server_addr: SocketAddr = "127.0.0.1:40012".parse().unwrap();
        let (client_t, server_t) = LossyChannel::pair(client_addr, server_addr);
        let mut client = Endpoint::from_transport(Box::new(client_t));
        let mut server = Endpoint::from_transport(Box::new(server_t));

        let c = client.net_connect(server_addr).unwrap();
        pump_until_again(&mut server);
        pump_until_again(&mut client);

        let chunk = b"hi".as_ref();
        let too_many: Vec<&[u8]> = vec![chunk; RDP_MAX_VEC + 1];
        assert_eq!(client.write_vec(c, &too_many), Err(Error::InvalidArgument));

        let ok: Vec<&[u8]> = vec![chunk; RDP_MAX_VEC];
        assert!(client.write_vec(c, &ok).is_ok());
    }

    #[test]
    fn repeated_small_writes_stay_under_the_default_window() {
        // With the default 16 MiB advertised window (see the connection
        // module's `full_window_blocks_write_until_ack_frees_it` test for the
        // actual backpressure path), ordinary small writes never trip
        // `ConnectedFull`.
        let client_addr: SocketAddr = "127.0.0.1:40013".parse().unwrap();
        let server_addr: SocketAddr = "127.0.0.1:40014".parse().unwrap();
        let (client_t, server_t) = LossyChannel::pair(client_addr, server_addr);
        let mut client = Endpoint::from_transport(Box::new(client_t));
        let mut server = Endpoint::from_transport(Box::new(server_t));

        let c = client.net_connect(server_addr).unwrap();
        pump_until_again(&mut server);
        pump_until_again(&mut client);

        for _ in 0..16 {
            client.write(c, b"chunk").unwrap();
            assert_eq!(client.conn_state(c).unwrap(), ConnState::Connected);
        }
        pump_until_again(&mut server);
        pump_until_again(&mut client);
    }

    #[test]
    fn half_close_waits_for_outstanding_data_to_be_acked() {
        let client_addr: SocketAddr = "127.0.0.1:40031".parse().unwrap();
        let server_addr: SocketAddr = "127.0.0.1:40032".parse().unwrap();
        let (client_t, server_t) = LossyChannel::pair(client_addr, server_addr);
        let mut client = Endpoint::from_transport(Box::new(client_t));
        let mut server = Endpoint::from_transport(Box::new(server_t));

        let c = client.net_connect(server_addr).unwrap();
        pump_until_again(&mut server);
        pump_until_again(&mut client);

        client.write(c, b"unacked").unwrap();
        client.close(c).unwrap();
        assert_eq!(client.conn_state(c).unwrap(), ConnState::FinSent);

        pump_until_again(&mut server);
        pump_until_again(&mut client);
        // The ack for the FIN drives DESTROY inline inside `on_packet`;
        // `tick()` only sweeps a connection already DESTROY when called.
        assert_eq!(client.conn_state(c).unwrap(), ConnState::Destroy);
        client.tick();
        assert_eq!(client.conn_state(c), Err(Error::InvalidArgument));
    }

    #[test]
    fn fresh_id_seed_avoids_an_id_already_in_use() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut ep = Endpoint::create(1, addr).unwrap();
        let h = ep.connection_create();
        ep.connect(h, "127.0.0.1:1".parse().unwrap()).unwrap();

        // However many of `fresh_id_seed`'s bounded draws land on a
        // collision along the way, the id it finally settles on must not
        // collide with the connection already registered.
        for _ in 0..200 {
            let candidate = ep.fresh_id_seed();
            assert!(!ep.recv_id_collides(candidate));
        }
    }

    #[test]
    fn fresh_id_seed_avoids_collisions_among_1024_live_connections() {
        // Scenario 6: with 1024 live connections, a new `connect` whose
        // random `id_seed` collides retries until it finds a free id.
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut ep = Endpoint::create(1, addr).unwrap();

        for i in 0u16..1024 {
            let h = ep.connection_create();
            let peer: SocketAddr = format!("127.0.0.1:{}", 20000 + i).parse().unwrap();
            ep.connect(h, peer).unwrap();
        }

        // At this density (1024 of 65536 ids) a uniformly random draw
        // collides with an existing connection often enough that the
        // bounded retry loop is genuinely exercised, not just a single
        // lucky draw; the draw must still land on a free id every time.
        for _ in 0..2000 {
            let candidate = ep.fresh_id_seed();
            assert!(!ep.recv_id_collides(candidate));
        }
    }

    #[test]
    fn retransmission_resends_only_the_dropped_packets_then_doubles_the_window() {
        // Scenario 3: client sends 10 packets; the middle 4 are dropped.
        // The peer SACKs the outer 6. On the retransmit ticker, only the
        // missing 4 are resent; `flight_window_limit` doubles on the next
        // round that makes progress.
        let client_addr: SocketAddr = "127.0.0.1:40041".parse().unwrap();
        let server_addr: SocketAddr = "127.0.0.1:40042".parse().unwrap();
        let (client_t, server_t) = LossyChannel::pair(client_addr, server_addr);
        let server_inbox = server_t.inbox.clone();
        let mut client = Endpoint::from_transport(Box::new(client_t));
        let mut server = Endpoint::from_transport(Box::new(server_t));

        let c = client.net_connect(server_addr).unwrap();
        pump_until_again(&mut server);
        pump_until_again(&mut client);

        for i in 0u8..10 {
            client.write(c, &[b'0' + i]).unwrap();
        }

        // Drop the middle 4 of the 10 queued datagrams.
        {
            let mut q = server_inbox.lock().unwrap();
            assert_eq!(q.len(), 10);
            let kept: Vec<Vec<u8>> = q.drain(..).enumerate().filter(|(i, _)| !(3..7).contains(i)).map(|(_, d)| d).collect();
            assert_eq!(kept.len(), 6);
            q.extend(kept);
        }

        pump_until_again(&mut server);
        pump_until_again(&mut client);

        let client_conn = client.conns[c.index].as_ref().unwrap();
        assert_eq!(client_conn.outstanding_count(), 4);
        let limit_before = client_conn.flight_window_limit();

        // Past the default 500ms retransmit timeout: flag the 4 missing
        // records and resend exactly them.
        client.advance_clock_for_test(600);
        client.tick();
        assert_eq!(server_inbox.lock().unwrap().len(), 4);

        let client_conn = client.conns[c.index].as_ref().unwrap();
        assert_eq!(client_conn.outstanding_count(), 4);
        assert_eq!(client_conn.flight_window_limit(), limit_before, "no progress yet: limit unchanged");

        // Deliver the resent 4 and let the server ack the now-complete run.
        pump_until_again(&mut server);
        pump_until_again(&mut client);

        let client_conn = client.conns[c.index].as_ref().unwrap();
        assert_eq!(client_conn.outstanding_count(), 0);

        // Next retransmit-ticker firing observes progress (the oldest
        // in-flight slot advanced) and doubles the window.
        client.advance_clock_for_test(600);
        client.tick();
        let client_conn = client.conns[c.index].as_ref().unwrap();
        assert_eq!(client_conn.flight_window_limit(), (limit_before.saturating_mul(2)).min(crate::consts::WINDOW_SIZE_MAX));
    }

    #[test]
    fn sock_opts_roundtrip_through_config() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut ep = Endpoint::create(1, addr).unwrap();

        assert!(ep.get_prop(SockOpt::Fd) >= 0);

        ep.set_prop(SockOpt::Mtu, 1000);
        assert_eq!(ep.get_prop(SockOpt::Mtu), 1000);

        ep.set_prop(SockOpt::SndBuf, 4096);
        assert_eq!(ep.get_prop(SockOpt::SndBuf), 4096);

        ep.set_prop(SockOpt::RcvBuf, 8192);
        assert_eq!(ep.get_prop(SockOpt::RcvBuf), 8192);

        assert_eq!(ep.get_prop(SockOpt::LogDebug), 0);
        ep.set_prop(SockOpt::LogDebug, 1);
        assert_eq!(ep.get_prop(SockOpt::LogDebug), 1);
    }

    #[test]
    fn user_data_is_attached_to_the_right_handle_and_rejects_the_wrong_type() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut ep = Endpoint::create(1, addr).unwrap();
        let h = ep.connection_create();

        assert_eq!(ep.conn_get_user_data::<u32>(h).unwrap(), None);
        ep.conn_set_user_data(h, 42u32).unwrap();
        assert_eq!(ep.conn_get_user_data::<u32>(h).unwrap(), Some(&42));
        assert_eq!(ep.conn_get_user_data::<&str>(h).unwrap(), None);
    }
}

//! Per-peer reliable-transport state machine.
//!
//! A [`Connection`] owns its send/receive ring buffers, RTT estimator and
//! congestion window, and the packet assembler. It never touches the
//! network directly from its own fields: every method that needs to send
//! a datagram takes the transport and peer address as arguments, so the
//! [`Endpoint`](crate::endpoint::Endpoint) stays the sole owner of the
//! socket, matching the `wire::Packet<T: AsRef<[u8]>>` convention of
//! staying generic over its I/O rather than baking in a concrete type.

mod congestion;
mod rtt;

pub use congestion::Congestion;
pub use rtt::RttEstimator;

use std::net::SocketAddr;

use log::{debug, trace, warn};

use crate::consts::{
    ACK_RECV_BEHIND_ALLOWED, KEEPALIVE_INTERVAL, QUEUE_SIZE_MAX, WAIT_FIN_SENT, WAIT_SYN_RECV,
};
use crate::error::{Error, Result};
use crate::events::Events;
use crate::seq::Seq;
use crate::storage::SeqRing;
use crate::time::{Duration, Instant};
use crate::transport::UdpTransport;
use crate::wire::{self, sack_bit_offsets_set, Packet, PacketType, Repr, SackWriter, EXT_SACK, EXT_TERMINATOR};

/// Tagged-variant connection state. Transitions are all
/// explicit in [`Connection::on_packet`], [`Connection::write`],
/// [`Connection::close`] and [`Connection::tick`]: no inheritance here,
/// just a plain enum and a handful of `match` arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Uninitialized,
    SynSent,
    SynRecv,
    Connected,
    ConnectedFull,
    FinSent,
    Destroy,
}

/// A single entry in the send queue.
#[derive(Debug, Clone)]
struct PacketRecord {
    ptype: PacketType,
    payload_len: usize,
    sent_at: Option<Instant>,
    transmissions: u32,
    needs_resend: bool,
    bytes: Vec<u8>,
}

/// A reassembly-buffer entry: either user payload bytes or the marker that
/// a FIN landed at this sequence number with no payload of its own.
#[derive(Debug, Clone)]
enum Inbound {
    Data(Vec<u8>),
    Fin,
}

impl Inbound {
    fn len(&self) -> usize {
        match self {
            Inbound::Data(v) => v.len(),
            Inbound::Fin => 0,
        }
    }
}

/// Outcome of draining one in-order reassembly slot into a caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing ready at `acknr + 1` right now.
    Empty,
    /// `n` bytes copied into the caller's buffer; `acknr` advanced.
    Delivered(usize),
    /// The next in-order payload doesn't fit in the caller's buffer. Not
    /// consumed, retry with a bigger buffer.
    TooSmall,
    /// The peer's FIN was fully consumed; report EOF exactly once.
    Eof,
}

/// What a connection's `tick()` wants the endpoint to do afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    None,
    Destroy,
}

/// Per-peer reliable-transport state.
#[derive(Debug)]
pub struct Connection {
    state: ConnState,
    peer_addr: Option<SocketAddr>,

    id_seed: u16,
    recv_id: u16,
    send_id: u16,

    seqnr: Seq,
    acknr: Seq,
    eof_seqnr: Option<Seq>,
    queue: u16,

    out_of_order_count: usize,

    inbuf: SeqRing<Inbound>,
    outbuf: SeqRing<PacketRecord>,

    congestion: Congestion,
    recv_window_peer: u32,
    recv_window_self: u32,

    rtt: RttEstimator,
    next_retransmit_timeout: Duration,
    retransmit_timeout: Duration,
    retransmit_ticker_at: Instant,

    last_received_packet_at: Instant,
    last_sent_packet_at: Instant,

    received_fin: bool,
    received_fin_completed: bool,
    need_send_ack: bool,

    mtu: usize,
    user_data: Option<Box<dyn std::any::Any>>,
}

impl Connection {
    pub(crate) fn new(mtu: usize, now: Instant) -> Connection {
        Connection {
            state: ConnState::Uninitialized,
            peer_addr: None,
            id_seed: 0,
            recv_id: 0,
            send_id: 0,
            seqnr: Seq::new(0),
            acknr: Seq::new(0),
            eof_seqnr: None,
            queue: 0,
            out_of_order_count: 0,
            inbuf: SeqRing::new(),
            outbuf: SeqRing::new(),
            congestion: Congestion::new(mtu),
            recv_window_peer: mtu as u32,
            recv_window_self: crate::consts::WINDOW_SIZE_MAX,
            rtt: RttEstimator::new(),
            next_retransmit_timeout: crate::consts::RETRANSMIT_TIMEOUT_DEFAULT,
            retransmit_timeout: crate::consts::RETRANSMIT_TIMEOUT_DEFAULT,
            retransmit_ticker_at: now,
            last_received_packet_at: now,
            last_sent_packet_at: now,
            received_fin: false,
            received_fin_completed: false,
            need_send_ack: false,
            mtu,
            user_data: None,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn recv_id(&self) -> u16 {
        self.recv_id
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == ConnState::Destroy
    }

    pub fn set_user_data<T: 'static>(&mut self, data: T) {
        self.user_data = Some(Box::new(data));
    }

    pub fn user_data<T: 'static>(&self) -> Option<&T> {
        self.user_data.as_ref().and_then(|b| b.downcast_ref::<T>())
    }

    /// True once a caller could legitimately `write()`. Used by the
    /// endpoint to decide whether backpressure should be reported.
    pub fn can_write(&self) -> bool {
        matches!(self.state, ConnState::Connected | ConnState::ConnectedFull)
    }

    /// Number of records still outstanding in the outbuf (`queue`). Exposed
    /// for tests exercising retransmission counts.
    pub(crate) fn outstanding_count(&self) -> u16 {
        self.queue
    }

    /// The current congestion window ceiling. Exposed for tests exercising
    /// the halve/double resize behavior end to end.
    pub(crate) fn flight_window_limit(&self) -> u32 {
        self.congestion.flight_window_limit()
    }

    // ---- §4.4 connection identification / handshake setup ----

    /// Initiator path: `connect(addr)`. Caller has already picked a
    /// collision-free `id_seed` (see `Endpoint::connect`).
    pub(crate) fn begin_connect(
        &mut self,
        peer_addr: SocketAddr,
        id_seed: u16,
        initial_seq: Seq,
        now: Instant,
        transport: &dyn UdpTransport,
    ) {
        self.peer_addr = Some(peer_addr);
        self.id_seed = id_seed;
        self.recv_id = id_seed;
        self.send_id = id_seed.wrapping_add(1);
        self.seqnr = initial_seq;
        self.state = ConnState::SynSent;
        self.push_chunk(&[], PacketType::Syn);
        self.flush_packets(now, transport, peer_addr);
        debug!("connection {:#06x}: SYN sent, -> SYN_SENT", self.recv_id);
    }

    /// Acceptor path: a fresh inbound SYN with no matching connection.
    /// `conn_id` is the SYN's `conn_id` field (the peer's `recv_id`).
    pub(crate) fn begin_accept(
        &mut self,
        peer_addr: SocketAddr,
        conn_id: u16,
        syn_seq: Seq,
        peer_window: u32,
        initial_seq: Seq,
        now: Instant,
        transport: &dyn UdpTransport,
    ) {
        self.peer_addr = Some(peer_addr);
        self.id_seed = conn_id;
        self.recv_id = conn_id.wrapping_add(1);
        self.send_id = conn_id;
        self.acknr = syn_seq;
        self.seqnr = initial_seq;
        self.recv_window_peer = peer_window;
        self.last_received_packet_at = now;
        self.state = ConnState::SynRecv;
        let ack = self.build_ack();
        if let Some(addr) = self.peer_addr {
            let _ = transport.send_to(&ack, addr);
        }
        debug!("connection {:#06x}: SYN received, -> SYN_RECV", self.recv_id);
    }

    // ---- §4.3 packet assembly ----

    /// Coalesce into the outbuf tail when possible, else allocate a new
    /// record. Returns the number of bytes actually consumed from `chunk`
    /// (may be less than `chunk.len()` if it doesn't all fit in one
    /// record).
    fn push_chunk(&mut self, chunk: &[u8], ptype: PacketType) -> usize {
        if ptype == PacketType::Data && self.queue > 0 {
            let tail_seq = self.seqnr - 1;
            if let Some(rec) = self.outbuf.get_mut(tail_seq) {
                if rec.transmissions == 0 && rec.ptype == PacketType::Data && rec.payload_len < self.mtu {
                    let room = self.mtu - rec.payload_len;
                    let n = room.min(chunk.len());
                    rec.bytes.extend_from_slice(&chunk[..n]);
                    rec.payload_len += n;
                    trace!("connection {:#06x}: coalesced {} bytes into seq {}", self.recv_id, n, tail_seq);
                    return n;
                }
            }
        }
        let n = chunk.len().min(self.mtu);
        self.allocate_record(ptype, &chunk[..n]);
        n
    }

    fn allocate_record(&mut self, ptype: PacketType, payload: &[u8]) {
        let seq = self.seqnr;
        self.outbuf.ensure_size(self.queue.wrapping_add(1));
        let mut bytes = vec![0u8; wire::HEADER_LEN + payload.len()];
        {
            let mut pkt = Packet::new_unchecked(&mut bytes[..]);
            let repr = Repr {
                packet_type: ptype,
                extension: 0,
                conn_id: self.send_id,
                window: self.recv_window_self,
                seqnr: seq,
                acknr: self.acknr,
            };
            repr.emit(&mut pkt);
            pkt.payload_mut().copy_from_slice(payload);
        }
        self.outbuf.put(
            seq,
            PacketRecord {
                ptype,
                payload_len: payload.len(),
                sent_at: None,
                transmissions: 0,
                needs_resend: false,
                bytes,
            },
        );
        self.seqnr = self.seqnr + 1;
        self.queue += 1;
        trace!("connection {:#06x}: allocated seq {} ({:?}, {} bytes)", self.recv_id, seq, ptype, payload.len());
    }

    fn send_packet_record(&mut self, seq: Seq, now: Instant, transport: &dyn UdpTransport, peer_addr: SocketAddr) {
        let acknr = self.acknr;
        let window = self.recv_window_self;
        let send_id = self.send_id;
        let mut to_send: Option<Vec<u8>> = None;
        if let Some(rec) = self.outbuf.get_mut(seq) {
            {
                let mut pkt = Packet::new_unchecked(&mut rec.bytes[..]);
                pkt.set_acknr(acknr);
                pkt.set_window(window);
                pkt.set_conn_id(send_id);
            }
            self.congestion.add_in_flight(rec.payload_len as u32);
            rec.needs_resend = false;
            rec.sent_at = Some(now);
            rec.transmissions += 1;
            to_send = Some(rec.bytes.clone());
        }
        if let Some(bytes) = to_send {
            let _ = transport.send_to(&bytes, peer_addr);
            self.last_sent_packet_at = now;
        }
    }

    /// Sends every pending (untransmitted or flagged) record in
    /// `[seqnr - queue, seqnr)`, stopping once the flight window is full.
    /// Returns `true` if it stopped early because the window is full.
    fn flush_packets(&mut self, now: Instant, transport: &dyn UdpTransport, peer_addr: SocketAddr) -> bool {
        let base = self.seqnr - self.queue;
        for i in 0..self.queue {
            let seq = base + i;
            let needs_send = match self.outbuf.get(seq) {
                Some(rec) => rec.transmissions == 0 || rec.needs_resend,
                None => false,
            };
            if !needs_send {
                continue;
            }
            if self.congestion.is_full(self.mtu as u32, self.recv_window_peer) {
                return true;
            }
            self.send_packet_record(seq, now, transport, peer_addr);
        }
        false
    }

    // ---- public surface: write ----

    pub(crate) fn write(&mut self, bufs: &[&[u8]], now: Instant, transport: &dyn UdpTransport) -> Result<usize> {
        if !self.can_write() {
            return Err(Error::InvalidArgument);
        }
        let peer_addr = self.peer_addr.ok_or(Error::InvalidArgument)?;
        if bufs.iter().all(|b| b.is_empty()) {
            return Ok(0);
        }
        let mut total = 0usize;
        'outer: for buf in bufs {
            let mut offset = 0usize;
            while offset < buf.len() {
                if self.congestion.is_full(self.mtu as u32, self.recv_window_peer) {
                    break 'outer;
                }
                let n = self.push_chunk(&buf[offset..], PacketType::Data);
                offset += n;
                total += n;
                self.flush_packets(now, transport, peer_addr);
                if n == 0 {
                    break 'outer;
                }
            }
        }
        if self.congestion.is_full(self.mtu as u32, self.recv_window_peer) {
            self.state = ConnState::ConnectedFull;
        }
        if total == 0 {
            Err(Error::WouldBlock)
        } else {
            Ok(total)
        }
    }

    // ---- §4.7 ack emission ----

    fn sack_bit_offsets(&self) -> Vec<usize> {
        let base = self.acknr + 2;
        let mut offsets: Vec<usize> = self
            .inbuf
            .iter()
            .filter_map(|(s, _)| {
                let d = s.distance_from(base);
                if d < QUEUE_SIZE_MAX { Some(d as usize) } else { None }
            })
            .collect();
        offsets.sort_unstable_by(|a, b| b.cmp(a));
        offsets
    }

    /// `send_ack`: a STATE packet, with a SACK extension appended when
    /// there's out-of-order data to report.
    pub(crate) fn build_ack(&mut self) -> Vec<u8> {
        let include_sack =
            self.out_of_order_count > 0 && self.state != ConnState::SynRecv && !self.received_fin_completed;
        let mut buf = vec![0u8; wire::HEADER_LEN];
        {
            let mut pkt = Packet::new_unchecked(&mut buf[..]);
            let repr = Repr {
                packet_type: PacketType::State,
                extension: if include_sack { EXT_SACK } else { EXT_TERMINATOR },
                conn_id: self.send_id,
                window: self.recv_window_self,
                seqnr: self.seqnr,
                acknr: self.acknr,
            };
            repr.emit(&mut pkt);
        }
        if include_sack {
            let bits = self.sack_bit_offsets();
            let tlv = SackWriter::build(self.out_of_order_count, bits.into_iter(), EXT_TERMINATOR);
            buf.extend_from_slice(&tlv);
        }
        self.need_send_ack = false;
        buf
    }

    pub(crate) fn needs_ack(&self) -> bool {
        self.need_send_ack
    }

    // ---- §4.6 receive path ----

    fn recompute_out_of_order_count(&mut self) {
        let acknr = self.acknr;
        self.out_of_order_count = self.inbuf.iter().filter(|(s, _)| s.after(acknr)).count();
    }

    fn ack_packet(&mut self, seq: Seq, now: Instant) -> bool {
        let (needs_resend, payload_len, transmissions, sent_at) = match self.outbuf.get(seq) {
            Some(rec) if rec.transmissions > 0 => (rec.needs_resend, rec.payload_len, rec.transmissions, rec.sent_at),
            _ => return false,
        };
        self.outbuf.remove(seq);
        if transmissions == 1 {
            if let Some(sent_at) = sent_at {
                let sample = now.saturating_duration_since(sent_at);
                self.next_retransmit_timeout = self.rtt.sample(sample);
            }
        }
        if !needs_resend {
            self.congestion.sub_in_flight(payload_len as u32);
        }
        true
    }

    fn in_flight_range(&self, v: Seq) -> bool {
        let base = self.seqnr - self.queue;
        v.distance_from(base) < self.queue
    }

    fn selective_ack(&mut self, start: Seq, mask: &[u8], now: Instant) {
        for offset in sack_bit_offsets_set(mask) {
            let v = start + offset as u16;
            if !self.in_flight_range(v) {
                continue;
            }
            let has_record = self.outbuf.get(v).map(|r| r.transmissions > 0).unwrap_or(false);
            if has_record {
                self.ack_packet(v, now);
                trace!("connection {:#06x}: sack'd seq {}", self.recv_id, v);
            }
        }
    }

    fn maybe_finish_close(&mut self) {
        if self.state == ConnState::FinSent && self.queue == 0 {
            self.state = ConnState::Destroy;
            debug!("connection {:#06x}: FIN acked, -> DESTROY", self.recv_id);
        }
    }

    /// The generic receive path. `sack` is the SACK extension payload if
    /// the extension chain carried one; `payload` is the remaining user
    /// bytes after extensions are stripped.
    pub(crate) fn on_packet(&mut self, repr: &Repr, sack_payload: Option<&[u8]>, payload: &[u8], now: Instant) -> Events {
        let mut events = Events::NONE;

        // 1. ack number validation.
        let last_sent = self.seqnr - 1;
        let floor = last_sent - self.queue - ACK_RECV_BEHIND_ALLOWED;
        if last_sent.after(repr.acknr) || repr.acknr.after(floor) {
            warn!("connection {:#06x}: dropping packet with out-of-range ack {}", self.recv_id, repr.acknr);
            return events;
        }

        // 3. stale/garbage seqnr check.
        let seq_cnt = repr.seqnr.distance_from(self.acknr + 1);
        if seq_cnt >= QUEUE_SIZE_MAX {
            let looks_stale = (seq_cnt as i16) < 0 && repr.packet_type != PacketType::State;
            if looks_stale {
                self.need_send_ack = true;
            } else {
                warn!("connection {:#06x}: dropping garbage seqnr {}", self.recv_id, repr.seqnr);
            }
            return events;
        }

        // 4. bookkeeping.
        self.last_received_packet_at = now;
        self.recv_window_peer = repr.window;

        // 5. handshake transitions.
        match (self.state, repr.packet_type) {
            (ConnState::SynSent, PacketType::State) => {
                self.state = ConnState::Connected;
                events |= Events::CONNECTED;
                debug!("connection {:#06x}: handshake complete, -> CONNECTED", self.recv_id);
            }
            (ConnState::SynRecv, PacketType::Data) => {
                self.state = ConnState::Connected;
                events |= Events::ACCEPT;
                debug!("connection {:#06x}: first data, -> CONNECTED", self.recv_id);
            }
            _ => {}
        }

        // 6. cumulative ack.
        let base = self.seqnr - self.queue;
        let ack_cnt = repr.acknr.distance_from(base).wrapping_add(1).min(self.queue);
        for i in 0..ack_cnt {
            if self.ack_packet(base + i, now) {
                self.queue -= 1;
            }
        }

        // 7. selective ack.
        if let Some(mask) = sack_payload {
            self.selective_ack(repr.acknr + 2, mask, now);
        }

        // 8. unblock CONNECTED_FULL.
        if self.state == ConnState::ConnectedFull && !self.congestion.is_full(self.mtu as u32, self.recv_window_peer) {
            self.state = ConnState::Connected;
            events |= Events::POLLOUT;
        }

        self.maybe_finish_close();

        // 9. STATE is pure ack, nothing more to do.
        if repr.packet_type == PacketType::State {
            return events;
        }

        // 10. FIN bookkeeping.
        if repr.packet_type == PacketType::Fin && !self.received_fin {
            self.received_fin = true;
            self.eof_seqnr = Some(repr.seqnr);
            if self.state == ConnState::FinSent {
                self.state = ConnState::Destroy;
                debug!("connection {:#06x}: simultaneous FIN, -> DESTROY", self.recv_id);
                return events;
            }
        }

        // 11/12. store into the reassembly buffer (read_poll drains it).
        if seq_cnt != 0 {
            if self.received_fin && repr.seqnr.after(self.eof_seqnr.unwrap_or(repr.seqnr)) {
                return events;
            }
        }
        if repr.packet_type == PacketType::Fin || repr.packet_type == PacketType::Data {
            let span = seq_cnt.wrapping_add(1);
            self.inbuf.ensure_size(span);
            if self.inbuf.get(repr.seqnr).is_some() {
                trace!("connection {:#06x}: duplicate seq {}", self.recv_id, repr.seqnr);
            } else {
                let entry = if repr.packet_type == PacketType::Fin {
                    Inbound::Fin
                } else {
                    Inbound::Data(payload.to_vec())
                };
                self.inbuf.put(repr.seqnr, entry);
                self.recompute_out_of_order_count();
            }
            self.need_send_ack = true;
        }

        events
    }

    /// Drains one in-order reassembly slot into `buf`.
    pub(crate) fn drain_one(&mut self, buf: &mut [u8]) -> DrainOutcome {
        let next = self.acknr + 1;
        let len = match self.inbuf.get(next) {
            Some(entry) => entry.len(),
            None => return DrainOutcome::Empty,
        };
        if len > buf.len() {
            return DrainOutcome::TooSmall;
        }
        let entry = self.inbuf.remove(next).expect("checked above");
        self.acknr = next;
        self.need_send_ack = true;
        self.recompute_out_of_order_count();
        match entry {
            Inbound::Data(payload) => {
                buf[..payload.len()].copy_from_slice(&payload);
                DrainOutcome::Delivered(payload.len())
            }
            Inbound::Fin => {
                if self.received_fin_completed {
                    DrainOutcome::Empty
                } else {
                    self.received_fin_completed = true;
                    self.maybe_finish_close();
                    DrainOutcome::Eof
                }
            }
        }
    }

    pub(crate) fn has_more_to_drain(&self) -> bool {
        self.inbuf.get(self.acknr + 1).is_some()
    }

    // ---- §4.8 retransmission / window resizing ----

    pub(crate) fn tick(&mut self, now: Instant, transport: &dyn UdpTransport) -> TickAction {
        if self.state == ConnState::Destroy {
            return TickAction::Destroy;
        }

        if self.retransmit_ticker_at.total_millis() > now.total_millis() {
            return TickAction::None;
        }

        match self.state {
            ConnState::SynRecv if now.saturating_duration_since(self.last_received_packet_at) >= WAIT_SYN_RECV => {
                debug!("connection {:#06x}: SYN_RECV idle timeout, -> DESTROY", self.recv_id);
                self.state = ConnState::Destroy;
                return TickAction::Destroy;
            }
            ConnState::FinSent if now.saturating_duration_since(self.last_received_packet_at) >= WAIT_FIN_SENT => {
                debug!("connection {:#06x}: FIN_SENT idle timeout, -> DESTROY", self.recv_id);
                self.state = ConnState::Destroy;
                return TickAction::Destroy;
            }
            _ => {}
        }

        let peer_addr = match self.peer_addr {
            Some(a) => a,
            None => return TickAction::None,
        };

        let base = self.seqnr - self.queue;
        for i in 0..self.queue {
            let seq = base + i;
            let expired = match self.outbuf.get(seq) {
                Some(rec) if rec.transmissions > 0 && !rec.needs_resend => {
                    rec.sent_at.is_some_and(|t| now.saturating_duration_since(t) >= self.retransmit_timeout)
                }
                _ => false,
            };
            if expired {
                if let Some(rec) = self.outbuf.get_mut(seq) {
                    rec.needs_resend = true;
                    let payload_len = rec.payload_len;
                    self.congestion.sub_in_flight(payload_len as u32);
                }
                debug!("connection {:#06x}: flagging seq {} for resend", self.recv_id, seq);
            }
        }

        self.congestion.resize_window(base, self.mtu);
        self.flush_packets(now, transport, peer_addr);

        let tail_sent = self.outbuf.get(self.seqnr - 1).and_then(|r| r.sent_at);
        let remaining_ms = match tail_sent {
            Some(sent_at) => {
                let elapsed_ms = now.total_millis() - sent_at.total_millis();
                (self.next_retransmit_timeout.as_millis() as i64 - elapsed_ms).max(0)
            }
            None => self.next_retransmit_timeout.as_millis() as i64,
        };
        self.retransmit_timeout = Duration::from_millis(remaining_ms as u64);
        self.retransmit_ticker_at = now + self.retransmit_timeout;

        if matches!(self.state, ConnState::Connected | ConnState::ConnectedFull)
            && now.saturating_duration_since(self.last_sent_packet_at) >= KEEPALIVE_INTERVAL
        {
            self.send_keepalive(now, transport, peer_addr);
        }

        TickAction::None
    }

    fn send_keepalive(&mut self, now: Instant, transport: &dyn UdpTransport, peer_addr: SocketAddr) {
        let mut buf = vec![0u8; wire::HEADER_LEN];
        {
            let mut pkt = Packet::new_unchecked(&mut buf[..]);
            let repr = Repr {
                packet_type: PacketType::State,
                extension: EXT_TERMINATOR,
                conn_id: self.send_id,
                window: self.recv_window_self,
                seqnr: self.seqnr,
                acknr: self.acknr - 1,
            };
            repr.emit(&mut pkt);
        }
        let _ = transport.send_to(&buf, peer_addr);
        self.last_sent_packet_at = now;
        trace!("connection {:#06x}: keepalive probe sent", self.recv_id);
    }

    pub(crate) fn next_timeout_hint(&self, now: Instant) -> Duration {
        self.retransmit_ticker_at.saturating_duration_since(now)
    }

    // ---- lifecycle ----

    pub(crate) fn close(&mut self, now: Instant, transport: &dyn UdpTransport) -> Result<()> {
        match self.state {
            ConnState::Uninitialized | ConnState::SynSent => {
                self.state = ConnState::Destroy;
                Ok(())
            }
            ConnState::Connected | ConnState::ConnectedFull => {
                if self.received_fin_completed {
                    self.state = ConnState::Destroy;
                } else {
                    self.push_chunk(&[], PacketType::Fin);
                    self.state = ConnState::FinSent;
                    if let Some(addr) = self.peer_addr {
                        self.flush_packets(now, transport, addr);
                    }
                    self.maybe_finish_close();
                }
                Ok(())
            }
            ConnState::FinSent | ConnState::SynRecv | ConnState::Destroy => Err(Error::InvalidArgument),
        }
    }
}

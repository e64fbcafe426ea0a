//! Windowed congestion control.

use crate::consts::{DEFAULT_MAX_PACKET_PAYLOAD, WINDOW_SIZE_MAX};
use crate::seq::Seq;

#[derive(Debug, Clone)]
pub struct Congestion {
    flight_window: u32,
    flight_window_limit: u32,
    /// A `-1` sentinel, represented as `None`.
    oldest_resent: Option<Seq>,
}

impl Congestion {
    pub fn new(mtu: usize) -> Congestion {
        Congestion {
            flight_window: 0,
            flight_window_limit: WINDOW_SIZE_MAX,
            oldest_resent: None,
        }
        .with_floor(mtu)
    }

    fn with_floor(mut self, mtu: usize) -> Self {
        self.flight_window_limit = self.flight_window_limit.max(mtu as u32);
        self
    }

    pub fn flight_window(&self) -> u32 {
        self.flight_window
    }

    pub fn flight_window_limit(&self) -> u32 {
        self.flight_window_limit
    }

    pub fn add_in_flight(&mut self, bytes: u32) {
        self.flight_window += bytes;
    }

    pub fn sub_in_flight(&mut self, bytes: u32) {
        self.flight_window = self.flight_window.saturating_sub(bytes);
    }

    pub fn is_full(&self, mtu: u32, recv_window_peer: u32) -> bool {
        self.flight_window + mtu > self.flight_window_limit.min(recv_window_peer)
    }

    /// Called once per retransmit-ticker firing, after flagging any expired
    /// records for resend. `oldest_in_flight` is `seqnr - queue` at the time
    /// of this call (the oldest slot still outstanding).
    pub fn resize_window(&mut self, oldest_in_flight: Seq, mtu: usize) {
        match self.oldest_resent {
            None => {
                self.oldest_resent = Some(oldest_in_flight);
            }
            Some(prev) if prev == oldest_in_flight => {
                self.flight_window_limit = (self.flight_window_limit / 2).max(mtu as u32);
            }
            Some(_) => {
                self.flight_window_limit = self.flight_window_limit.saturating_mul(2).min(WINDOW_SIZE_MAX);
                self.oldest_resent = Some(oldest_in_flight);
            }
        }
    }

}

impl Default for Congestion {
    fn default() -> Self {
        Congestion::new(DEFAULT_MAX_PACKET_PAYLOAD)
    }
}

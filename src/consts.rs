//! Protocol constants.

use crate::time::Duration;

/// `(1500 - 20 - 8 - 24 - 8 - 2 - 36) - 20`, a conservative IPv4 MTU
/// budget after tunneling overheads, minus the 20-byte header. Overridable
/// per endpoint via `endpoint_set_prop(MTU, _)`.
pub const DEFAULT_MAX_PACKET_PAYLOAD: usize = 1382;

/// Anything farther ahead of `acknr` than this is either a stale
/// wraparound duplicate or garbage.
pub const QUEUE_SIZE_MAX: u16 = 16384;

/// How far behind `seqnr - 1 - queue` an inbound ack is still tolerated
/// before being rejected outright.
pub const ACK_RECV_BEHIND_ALLOWED: u16 = 10;

/// `resize_window`'s ceiling on `flight_window_limit`.
pub const WINDOW_SIZE_MAX: u32 = 16 * 1024 * 1024;

/// `ack_packet`'s retransmit-timeout clamp bounds and default.
pub const RETRANSMIT_TIMEOUT_MIN: Duration = Duration::from_millis(200);
pub const RETRANSMIT_TIMEOUT_MAX: Duration = Duration::from_millis(1000);
pub const RETRANSMIT_TIMEOUT_DEFAULT: Duration = Duration::from_millis(500);

/// SYN_RECV and FIN_SENT are killed after this much silence.
pub const WAIT_FIN_SENT: Duration = Duration::from_secs(10);
pub const WAIT_SYN_RECV: Duration = Duration::from_secs(10);

/// Idle keepalive probe interval.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(29);

/// `ack_packet`'s RTT-variance smoothing bases (7/8, 3/4).
pub const RTT_ALPHA_SHIFT: u32 = 3; // rtt += (sample - rtt) / 8
pub const RTT_BETA_SHIFT: u32 = 2; // rtt_var += (|.| - rtt_var) / 4

/// `write_vec`'s maximum iovec count per call.
pub const RDP_MAX_VEC: usize = 1024;

/// Endpoint-level tick hint clamp.
pub const SOCKET_CHECK_MIN: u64 = 5;
pub const SOCKET_CHECK_MAX: u64 = 500;

/// Initial ring buffer size.
pub const RING_INITIAL_SIZE: usize = 64;

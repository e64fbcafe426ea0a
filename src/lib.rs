//! A reliable, connection-oriented, ordered byte-stream transport layered
//! over UDP (uTP/BEP-29 family): fixed 20-byte packet headers, 16-bit
//! sequence/ack numbers, selective acknowledgment, RTT-estimated
//! retransmission and windowed congestion control.
//!
//! A single [`Endpoint`] multiplexes many logical connections to different
//! peers over one UDP socket. The caller owns the event loop: poll the
//! endpoint's [`Endpoint::read_poll`] until it reports [`Events::AGAIN`],
//! then call [`Endpoint::tick`] at the returned timeout to drive
//! retransmission and keepalive.

mod config;
mod connection;
mod consts;
mod endpoint;
mod error;
mod events;
mod seq;
mod storage;
pub mod time;
mod transport;
mod wire;

pub use config::SockOpt;
pub use connection::ConnState;
pub use endpoint::{ConnHandle, Endpoint};
pub use error::{Error, Result};
pub use events::Events;
pub use seq::Seq;
pub use transport::UdpTransport;

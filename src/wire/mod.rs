//! Low-level packet access and construction.
//!
//! The `wire` module deals with the packet *representation*: the fixed
//! 20-byte header shared by every packet type, and the selective-ack
//! extension TLV chained at the start of the payload area.
//!
//! [`Packet`] provides `new_unchecked`/`new_checked`/`check_len` in the
//! same style as any zero-copy header accessor: once `check_len` has
//! succeeded, no accessor method panics.

use core::fmt;

mod field {
    pub type Field = ::core::ops::Range<usize>;

    pub const VERSION_TYPE: usize = 0;
    pub const EXTENSION: usize = 1;
    pub const CONN_ID: Field = 2..4;
    pub const WINDOW: Field = 4..8;
    pub const SEQNR: Field = 8..10;
    pub const ACKNR: Field = 10..12;
    pub const RESERVED: Field = 12..20;
}

mod packet;
mod sack;

pub use self::packet::{Packet, Repr, HEADER_LEN, PROTOCOL_VERSION};
pub use self::sack::{
    sack_bit_offsets_set, sack_len_for_count, split_extensions, SackWriter, EXT_SACK, EXT_TERMINATOR,
};

/// The packet's high-nibble type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Data,
    Fin,
    State,
    /// Parsed but never constructed by this crate.
    Reset,
    Syn,
}

impl PacketType {
    pub const fn from_nibble(n: u8) -> Option<PacketType> {
        match n {
            0 => Some(PacketType::Data),
            1 => Some(PacketType::Fin),
            2 => Some(PacketType::State),
            3 => Some(PacketType::Reset),
            4 => Some(PacketType::Syn),
            _ => None,
        }
    }

    pub const fn to_nibble(self) -> u8 {
        match self {
            PacketType::Data => 0,
            PacketType::Fin => 1,
            PacketType::State => 2,
            PacketType::Reset => 3,
            PacketType::Syn => 4,
        }
    }
}

/// Parsing a datagram failed: too short, unsupported version, or an
/// unrecognized type nibble. A protocol violation, dropped silently by the
/// caller of this module (logged, not surfaced).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wire::Error: malformed packet")
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

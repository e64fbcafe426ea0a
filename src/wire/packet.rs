use byteorder::{ByteOrder, NetworkEndian};

use super::{field, Error, PacketType, Result};
use crate::seq::Seq;

/// Protocol version carried in the low nibble of `version_and_type`.
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed header size: 20 bytes, of which only 12 carry named fields
/// (type/ext/conn_id/window/seqnr/acknr); the remaining 8 bytes are
/// reserved padding, zeroed on emit and ignored on parse. See DESIGN.md.
pub const HEADER_LEN: usize = 20;

/// A read/write wrapper around a single packet buffer.
///
/// Mirrors the `new_unchecked`/`new_checked`/`check_len` convention: once
/// `check_len` succeeds, no accessor below panics.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    pub fn check_len(&self) -> Result<()> {
        if self.buffer.as_ref().len() < HEADER_LEN {
            return Err(Error);
        }
        if self.version() != PROTOCOL_VERSION {
            return Err(Error);
        }
        if self.packet_type().is_none() {
            return Err(Error);
        }
        Ok(())
    }

    pub fn version(&self) -> u8 {
        self.buffer.as_ref()[field::VERSION_TYPE] & 0x0f
    }

    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_nibble(self.buffer.as_ref()[field::VERSION_TYPE] >> 4)
    }

    pub fn extension(&self) -> u8 {
        self.buffer.as_ref()[field::EXTENSION]
    }

    pub fn conn_id(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::CONN_ID])
    }

    pub fn window(&self) -> u32 {
        NetworkEndian::read_u32(&self.buffer.as_ref()[field::WINDOW])
    }

    pub fn seqnr(&self) -> Seq {
        Seq(NetworkEndian::read_u16(&self.buffer.as_ref()[field::SEQNR]))
    }

    pub fn acknr(&self) -> Seq {
        Seq(NetworkEndian::read_u16(&self.buffer.as_ref()[field::ACKNR]))
    }

    /// The payload area: everything past the fixed header, which may start
    /// with a chain of extension TLVs before user bytes.
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_ref()[HEADER_LEN..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_version_and_type(&mut self, packet_type: PacketType) {
        self.buffer.as_mut()[field::VERSION_TYPE] = (packet_type.to_nibble() << 4) | PROTOCOL_VERSION;
    }

    pub fn set_extension(&mut self, ext: u8) {
        self.buffer.as_mut()[field::EXTENSION] = ext;
    }

    pub fn set_conn_id(&mut self, v: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::CONN_ID], v);
    }

    pub fn set_window(&mut self, v: u32) {
        NetworkEndian::write_u32(&mut self.buffer.as_mut()[field::WINDOW], v);
    }

    pub fn set_seqnr(&mut self, v: Seq) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::SEQNR], v.0);
    }

    pub fn set_acknr(&mut self, v: Seq) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::ACKNR], v.0);
    }

    pub fn clear_reserved(&mut self) {
        self.buffer.as_mut()[field::RESERVED].fill(0);
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[HEADER_LEN..]
    }
}

/// A parsed, owned representation of a header, independent of any backing
/// buffer. Used to build outgoing packets without round-tripping through a
/// scratch `Packet<&mut [u8]>` at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repr {
    pub packet_type: PacketType,
    pub extension: u8,
    pub conn_id: u16,
    pub window: u32,
    pub seqnr: Seq,
    pub acknr: Seq,
}

impl Repr {
    pub fn parse<T: AsRef<[u8]>>(packet: &Packet<T>) -> Repr {
        Repr {
            packet_type: packet.packet_type().expect("check_len validates packet_type"),
            extension: packet.extension(),
            conn_id: packet.conn_id(),
            window: packet.window(),
            seqnr: packet.seqnr(),
            acknr: packet.acknr(),
        }
    }

    pub fn emit<T: AsRef<[u8]> + AsMut<[u8]>>(&self, packet: &mut Packet<T>) {
        packet.set_version_and_type(self.packet_type);
        packet.set_extension(self.extension);
        packet.set_conn_id(self.conn_id);
        packet.set_window(self.window);
        packet.set_seqnr(self.seqnr);
        packet.set_acknr(self.acknr);
        packet.clear_reserved();
    }
}

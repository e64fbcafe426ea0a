//! 16-bit sequence-number arithmetic with wraparound.

use core::fmt;
use core::ops::{Add, Sub};

/// A sequence or ack number living in the 16-bit wrapping space uTP-family
/// protocols use for `seqnr`/`acknr`/`conn_id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Seq(pub u16);

impl Seq {
    pub const fn new(v: u16) -> Seq {
        Seq(v)
    }

    pub const fn wrapping_add(self, rhs: u16) -> Seq {
        Seq(self.0.wrapping_add(rhs))
    }

    pub const fn wrapping_sub(self, rhs: u16) -> Seq {
        Seq(self.0.wrapping_sub(rhs))
    }

    /// `(int16)(a - b) < 0`: true when `self` comes strictly after `other`
    /// in the wrapping sequence space.
    pub fn after(self, other: Seq) -> bool {
        (self.0.wrapping_sub(other.0) as i16) < 0
    }

    /// Distance from `other` to `self`, counted forward modulo 2^16. Used
    /// for outstanding-packet counts on the send and receive sides.
    pub fn distance_from(self, other: Seq) -> u16 {
        self.0.wrapping_sub(other.0)
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u16> for Seq {
    type Output = Seq;
    fn add(self, rhs: u16) -> Seq {
        self.wrapping_add(rhs)
    }
}

impl Sub<u16> for Seq {
    type Output = Seq;
    fn sub(self, rhs: u16) -> Seq {
        self.wrapping_sub(rhs)
    }
}

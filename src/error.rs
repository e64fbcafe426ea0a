//! Error kinds for the public API.
//!
//! Protocol violations and stale duplicates are not represented here:
//! they are silently dropped and only observable through `log` output,
//! never surfaced to the caller as an `Err`.

use core::fmt;

/// An error returned by a public operation on an [`crate::Endpoint`] or
/// connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Wrong state for the requested operation, an out-of-range vector
    /// count, a null/unknown handle, or an unsupported protocol version.
    /// EINVAL-equivalent.
    InvalidArgument,
    /// The send window (or the connection's local slot table) is full.
    /// EAGAIN-equivalent; retry once a `POLLOUT` event is observed.
    WouldBlock,
    /// The caller's `read_poll` buffer is smaller than the next in-order
    /// payload. The packet is not consumed, so a retry with a larger
    /// buffer succeeds.
    BufferTooSmall,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::InvalidArgument => "invalid argument",
            Error::WouldBlock => "operation would block",
            Error::BufferTooSmall => "read buffer too small for next payload",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

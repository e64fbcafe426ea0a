//! Endpoint-level configuration and the `endpoint_get_prop`/`set_prop`
//! surface.

use log::LevelFilter;

use crate::consts::DEFAULT_MAX_PACKET_PAYLOAD;

/// Recognized `endpoint_get_prop`/`endpoint_set_prop` options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockOpt {
    /// The underlying socket descriptor. Read-only.
    Fd,
    /// Send buffer size hint, in bytes. Informational only, not a backing
    /// allocation.
    SndBuf,
    /// Receive buffer size hint, in bytes.
    RcvBuf,
    /// Override for the effective payload MTU. Defaults to 1382.
    Mtu,
    /// libutp-style verbosity bit: state transitions and retransmit/
    /// keepalive firing. Enabling raises the `log` crate's max level to at
    /// least `Debug`.
    LogNormal,
    /// libutp-style verbosity bit: per-packet MTU/codec decisions
    /// (coalesce vs allocate, ack clamping, SACK bit walks). Enabling
    /// raises the max level to at least `Trace`.
    LogMtu,
    /// libutp-style verbosity bit: the most verbose tier, equivalent to
    /// `LogMtu` in the levels this crate emits (there is no finer
    /// granularity than `trace!` to promote to).
    LogDebug,
}

/// Verbosity bits, set independently, each promoting the global `log`
/// level filter rather than gating a category of its own the way libutp's
/// per-context booleans do -- this crate has one `log` sink, not one per
/// verbosity tier.
const VERBOSITY_NORMAL: u8 = 1 << 0;
const VERBOSITY_MTU: u8 = 1 << 1;
const VERBOSITY_DEBUG: u8 = 1 << 2;

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) sndbuf_hint: i64,
    pub(crate) rcvbuf_hint: i64,
    pub(crate) effective_mtu: usize,
    verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sndbuf_hint: 0,
            rcvbuf_hint: 0,
            effective_mtu: DEFAULT_MAX_PACKET_PAYLOAD,
            verbosity: 0,
        }
    }
}

impl Config {
    pub(crate) fn get(&self, opt: SockOpt) -> i64 {
        match opt {
            SockOpt::Fd => 0, // overridden by Endpoint, which knows the real fd
            SockOpt::SndBuf => self.sndbuf_hint,
            SockOpt::RcvBuf => self.rcvbuf_hint,
            SockOpt::Mtu => self.effective_mtu as i64,
            SockOpt::LogNormal => (self.verbosity & VERBOSITY_NORMAL != 0) as i64,
            SockOpt::LogMtu => (self.verbosity & VERBOSITY_MTU != 0) as i64,
            SockOpt::LogDebug => (self.verbosity & VERBOSITY_DEBUG != 0) as i64,
        }
    }

    pub(crate) fn set(&mut self, opt: SockOpt, val: i64) {
        match opt {
            SockOpt::Fd => {} // read-only, ignored
            SockOpt::SndBuf => self.sndbuf_hint = val,
            SockOpt::RcvBuf => self.rcvbuf_hint = val,
            SockOpt::Mtu => {
                if val > 0 {
                    self.effective_mtu = val as usize;
                }
            }
            SockOpt::LogNormal => self.set_verbosity_bit(VERBOSITY_NORMAL, val),
            SockOpt::LogMtu => self.set_verbosity_bit(VERBOSITY_MTU, val),
            SockOpt::LogDebug => self.set_verbosity_bit(VERBOSITY_DEBUG, val),
        }
    }

    fn set_verbosity_bit(&mut self, bit: u8, val: i64) {
        if val != 0 {
            self.verbosity |= bit;
        } else {
            self.verbosity &= !bit;
        }
        log::set_max_level(self.level_filter());
    }

    /// The most verbose tier among the set bits, `Warn` if none are set
    /// (matching §7's "nothing above `warn!`" rule for a quiescent
    /// endpoint).
    fn level_filter(&self) -> LevelFilter {
        if self.verbosity & (VERBOSITY_MTU | VERBOSITY_DEBUG) != 0 {
            LevelFilter::Trace
        } else if self.verbosity & VERBOSITY_NORMAL != 0 {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_bits_roundtrip_independently() {
        let mut c = Config::default();
        assert_eq!(c.get(SockOpt::LogNormal), 0);
        c.set(SockOpt::LogNormal, 1);
        assert_eq!(c.get(SockOpt::LogNormal), 1);
        assert_eq!(c.get(SockOpt::LogMtu), 0);
        c.set(SockOpt::LogMtu, 1);
        assert_eq!(c.get(SockOpt::LogMtu), 1);
        c.set(SockOpt::LogNormal, 0);
        assert_eq!(c.get(SockOpt::LogNormal), 0);
        assert_eq!(c.get(SockOpt::LogMtu), 1);
    }

    #[test]
    fn level_filter_escalates_with_the_most_verbose_set_bit() {
        let mut c = Config::default();
        assert_eq!(c.level_filter(), LevelFilter::Warn);
        c.set(SockOpt::LogNormal, 1);
        assert_eq!(c.level_filter(), LevelFilter::Debug);
        c.set(SockOpt::LogDebug, 1);
        assert_eq!(c.level_filter(), LevelFilter::Trace);
    }
}

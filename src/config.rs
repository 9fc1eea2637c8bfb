//! Tunable defaults, mirroring `TCPConfig`/`FdAdapterConfig` from the lab
//! this crate's core is modeled on.

use std::net::Ipv4Addr;

use crate::tcp::Wrap32;

/// Default byte-stream capacity for each half of a connection.
pub const DEFAULT_CAPACITY: u64 = 64_000;
/// Default initial retransmission timeout, in milliseconds.
pub const DEFAULT_INITIAL_RTO_MS: u64 = 1_000;
/// Default retransmission ceiling enforced by the event loop, not the core
/// itself: past this many consecutive unacked expiries, the caller aborts
/// the connection (spec §7).
pub const DEFAULT_MAX_RETX_ATTEMPTS: u64 = 8;

#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub capacity: u64,
    pub initial_rto_ms: u64,
    /// Fixed for deterministic tests; `None` means draw a random ISN.
    pub fixed_isn: Option<Wrap32>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            capacity: DEFAULT_CAPACITY,
            initial_rto_ms: DEFAULT_INITIAL_RTO_MS,
            fixed_isn: None,
        }
    }
}

/// One endpoint of a connection, as addressed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dual {
    pub ipv4: Ipv4Addr,
    pub port: u16,
}

/// A connection's four-tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quad {
    pub src: Dual,
    pub dst: Dual,
}

/// Adapter-level configuration: which quad this process's endpoint owns,
/// plus fault-injection knobs for tests.
#[derive(Debug, Clone, Copy)]
pub struct AdapterConfig {
    pub quad: Quad,
    /// Probability, in `[0.0, 1.0]`, that an outbound datagram is dropped.
    pub loss_up: f64,
    /// Probability that an inbound datagram is dropped.
    pub loss_down: f64,
}

impl AdapterConfig {
    pub fn new(quad: Quad) -> Self {
        AdapterConfig {
            quad,
            loss_up: 0.0,
            loss_down: 0.0,
        }
    }
}

//! Crate-wide error type for fallible ambient operations. Protocol-level
//! conditions (bad checksum, stale ack, segment outside the window) are
//! never surfaced as `Result`s — see spec §7 — only setup/IO failures are.

#[derive(Debug, thiserror::Error)]
pub enum TcpError {
    #[error("tun error: {0}")]
    Tun(#[from] tidy_tuntap::error::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed ipv4 datagram: {0}")]
    MalformedIpv4(&'static str),

    #[error("malformed tcp segment: {0}")]
    MalformedTcpSegment(&'static str),
}

//! In-memory segment records exchanged between [`super::sender::Sender`] and
//! [`super::receiver::Receiver`]. Wire encoding lives in [`crate::net::ipv4`].

use super::wrap32::Wrap32;

/// The sender's half of a segment: everything needed to place payload bytes
/// (and the SYN/FIN control bits) at an absolute position in the sequence
/// space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSenderMessage {
    pub seqno: Wrap32,
    pub syn: bool,
    pub payload: Vec<u8>,
    pub fin: bool,
}

impl TcpSenderMessage {
    /// How many sequence numbers this segment occupies.
    pub fn sequence_length(&self) -> u64 {
        self.syn as u64 + self.payload.len() as u64 + self.fin as u64
    }
}

impl Default for TcpSenderMessage {
    fn default() -> Self {
        TcpSenderMessage {
            seqno: Wrap32::new(0),
            syn: false,
            payload: Vec::new(),
            fin: false,
        }
    }
}

/// The receiver's half of a segment: the cumulative ack and the advertised
/// window, or no ack at all if the ISN hasn't been observed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpReceiverMessage {
    pub ackno: Option<Wrap32>,
    pub window_size: u16,
}

/// A complete segment as exchanged between two endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TcpSegment {
    pub sender: TcpSenderMessage,
    pub receiver: TcpReceiverMessage,
    pub reset: bool,
}

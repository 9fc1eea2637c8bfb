//! Inbound half of the Transceiver: ISN capture and ACK/window synthesis.

use super::byte_stream::ByteStream;
use super::reassembler::Reassembler;
use super::segment::{TcpReceiverMessage, TcpSenderMessage};
use super::wrap32::Wrap32;

#[derive(Debug, Default)]
pub struct Receiver {
    isn: Option<Wrap32>,
    reassembler: Reassembler,
}

impl Receiver {
    pub fn new() -> Self {
        Receiver::default()
    }

    /// Capture the ISN from the first SYN seen, translate this segment's
    /// seqno into a stream offset, and hand payload/FIN to the reassembler.
    pub fn receive(&mut self, msg: TcpSenderMessage, inbound: &mut ByteStream) {
        if self.isn.is_none() {
            if !msg.syn {
                return;
            }
            self.isn = Some(msg.seqno);
        }
        let isn = self.isn.unwrap();

        let checkpoint = inbound.bytes_pushed();
        let absolute_seqno = msg.seqno.unwrap(isn, checkpoint);
        // stream offset 0 is occupied by SYN itself; every other position is
        // shifted left by one to land on the first payload byte.
        let Some(stream_index) = absolute_seqno.checked_sub(if msg.syn { 0 } else { 1 }) else {
            return;
        };

        self.reassembler
            .insert(stream_index, &msg.payload, msg.fin, inbound);
    }

    /// Build the ack/window pair to report back to the peer.
    pub fn send(&self, inbound: &ByteStream) -> TcpReceiverMessage {
        let ackno = self.isn.map(|isn| {
            let absolute = 1 + inbound.bytes_pushed() + inbound.is_closed() as u64;
            isn + absolute
        });
        let window_size = std::cmp::min(inbound.available_capacity(), u16::MAX as u64) as u16;
        TcpReceiverMessage { ackno, window_size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_everything_before_syn() {
        let mut r = Receiver::new();
        let mut s = ByteStream::new(10);
        let msg = TcpSenderMessage {
            seqno: Wrap32::new(5),
            syn: false,
            payload: b"x".to_vec(),
            fin: false,
        };
        r.receive(msg, &mut s);
        assert_eq!(s.bytes_pushed(), 0);
        assert!(r.send(&s).ackno.is_none());
    }

    #[test]
    fn syn_then_payload_advances_ack() {
        let isn = Wrap32::new(5);
        let mut r = Receiver::new();
        let mut s = ByteStream::new(10);

        r.receive(
            TcpSenderMessage {
                seqno: isn,
                syn: true,
                payload: Vec::new(),
                fin: false,
            },
            &mut s,
        );
        assert_eq!(r.send(&s).ackno, Some(isn + 1u64));

        r.receive(
            TcpSenderMessage {
                seqno: isn + 1u64,
                syn: false,
                payload: b"hi".to_vec(),
                fin: false,
            },
            &mut s,
        );
        assert_eq!(r.send(&s).ackno, Some(isn + 3u64));
        assert_eq!(s.bytes_pushed(), 2);
    }

    #[test]
    fn fin_closes_stream_and_bumps_ack_once_contiguous() {
        let isn = Wrap32::new(0);
        let mut r = Receiver::new();
        let mut s = ByteStream::new(10);

        r.receive(
            TcpSenderMessage {
                seqno: isn,
                syn: true,
                payload: Vec::new(),
                fin: false,
            },
            &mut s,
        );
        r.receive(
            TcpSenderMessage {
                seqno: isn + 1u64,
                syn: false,
                payload: b"hello".to_vec(),
                fin: true,
            },
            &mut s,
        );
        assert!(s.is_closed());
        assert_eq!(r.send(&s).ackno, Some(isn + 7u64));
    }

    #[test]
    fn window_reports_available_capacity() {
        let isn = Wrap32::new(0);
        let mut r = Receiver::new();
        let mut s = ByteStream::new(10);
        r.receive(
            TcpSenderMessage {
                seqno: isn,
                syn: true,
                payload: Vec::new(),
                fin: false,
            },
            &mut s,
        );
        assert_eq!(r.send(&s).window_size, 10);
        r.receive(
            TcpSenderMessage {
                seqno: isn + 1u64,
                syn: false,
                payload: vec![0u8; 4],
                fin: false,
            },
            &mut s,
        );
        assert_eq!(r.send(&s).window_size, 6);
    }
}

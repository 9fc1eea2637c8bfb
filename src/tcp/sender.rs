//! Outbound half of the Transceiver: segmentation, retransmission with
//! exponential RTO backoff, and zero-window probing.

use std::collections::{BTreeMap, VecDeque};

use super::byte_stream::{read, ByteStream};
use super::segment::{TcpReceiverMessage, TcpSenderMessage};
use super::wrap32::Wrap32;

/// Maximum TCP payload carried by a single segment, per spec §6.
pub const MAX_PAYLOAD_SIZE: u64 = 1000;

#[derive(Debug)]
pub struct Sender {
    isn: Wrap32,
    initial_rto_ms: u64,
    rto_factor: u64,
    consecutive_retransmissions: u64,
    ms_since_timer_restart: u64,

    /// Absolute seqno -> still-outstanding segment.
    outstanding: BTreeMap<u64, TcpSenderMessage>,
    /// Absolute seqnos awaiting (re)transmission, oldest first.
    retransmit_queue: VecDeque<u64>,

    last_ack: u64,
    ever_acked: bool,
    window_size: u16,

    started: bool,
    finished: bool,
    bytes_popped: u64,
}

impl Sender {
    pub fn new(initial_rto_ms: u64, fixed_isn: Option<Wrap32>) -> Self {
        Sender {
            isn: fixed_isn.unwrap_or_else(|| Wrap32::new(rand::random())),
            initial_rto_ms,
            rto_factor: 1,
            consecutive_retransmissions: 0,
            ms_since_timer_restart: 0,
            outstanding: BTreeMap::new(),
            retransmit_queue: VecDeque::new(),
            last_ack: 0,
            ever_acked: false,
            // "default 1 before any ACK" per spec §3.
            window_size: 1,
            started: false,
            finished: false,
            bytes_popped: 0,
        }
    }

    pub fn isn(&self) -> Wrap32 {
        self.isn
    }

    /// Read as much of `outbound` as the peer's window allows, building one
    /// segment at a time, until the window is full or there's nothing left
    /// worth sending.
    pub fn push(&mut self, outbound: &mut ByteStream) {
        loop {
            let effective_window = if self.window_size == 0 {
                1
            } else {
                self.window_size as u64
            };
            let in_flight = self.sequence_numbers_in_flight();
            if in_flight >= effective_window {
                break;
            }
            let mut remaining = effective_window - in_flight;

            let abs_seqno = self.started as u64 + self.bytes_popped;
            let syn = !self.started;
            if syn {
                remaining -= 1;
            }

            let payload_budget = std::cmp::min(remaining, MAX_PAYLOAD_SIZE);
            let payload = read(outbound, payload_budget);
            remaining -= payload.len() as u64;

            let fin = !self.finished && outbound.is_finished() && remaining >= 1;

            let sequence_length = syn as u64 + payload.len() as u64 + fin as u64;
            if sequence_length == 0 {
                break;
            }

            self.started = true;
            self.bytes_popped += payload.len() as u64;
            self.finished = self.finished || fin;

            let msg = TcpSenderMessage {
                seqno: self.isn + abs_seqno,
                syn,
                payload,
                fin,
            };

            self.outstanding.insert(abs_seqno, msg);
            self.retransmit_queue.push_back(abs_seqno);
        }
    }

    /// Dequeue the next segment awaiting (re)transmission, skipping entries
    /// that were already acked since being queued.
    pub fn maybe_send(&mut self) -> Option<TcpSenderMessage> {
        while let Some(seqno) = self.retransmit_queue.pop_front() {
            if let Some(msg) = self.outstanding.get(&seqno) {
                return Some(msg.clone());
            }
        }
        None
    }

    /// A bare segment carrying no flags or payload, for piggyback-free ACKs.
    pub fn send_empty_message(&self) -> TcpSenderMessage {
        TcpSenderMessage {
            seqno: self.isn + (self.started as u64 + self.bytes_popped + self.finished as u64),
            ..Default::default()
        }
    }

    pub fn receive(&mut self, msg: &TcpReceiverMessage) {
        // Updated unconditionally, even if the ack itself is rejected below.
        self.window_size = msg.window_size;

        let Some(wire_ackno) = msg.ackno else {
            return;
        };
        let ackno = wire_ackno.unwrap(self.isn, self.last_ack);
        let total_sent = self.started as u64 + self.bytes_popped + self.finished as u64;

        // `ever_acked` makes the first-ack case unambiguous: a fresh sender's
        // `last_ack` of 0 must never be mistaken for "already acked seqno 0".
        if self.ever_acked && ackno <= self.last_ack {
            return;
        }
        if ackno > total_sent {
            return;
        }

        self.last_ack = ackno;
        self.ever_acked = true;

        self.outstanding
            .retain(|&seqno, m| seqno + m.sequence_length() > ackno);

        self.rto_factor = 1;
        self.consecutive_retransmissions = 0;
        self.ms_since_timer_restart = 0;
    }

    pub fn tick(&mut self, ms_since_last_tick: u64) {
        if self.outstanding.is_empty() {
            return;
        }
        self.ms_since_timer_restart += ms_since_last_tick;

        let rto = self.initial_rto_ms * self.rto_factor;
        if self.ms_since_timer_restart < rto {
            return;
        }

        if let Some((&lowest, _)) = self.outstanding.iter().next() {
            self.retransmit_queue.push_back(lowest);
        }
        // Zero-window probes are responses to a closed receiver, not
        // congestion: don't back off while probing.
        if self.window_size != 0 {
            self.rto_factor *= 2;
            self.consecutive_retransmissions += 1;
        }
        self.ms_since_timer_restart = 0;
    }

    pub fn sequence_numbers_in_flight(&self) -> u64 {
        self.outstanding.values().map(|m| m.sequence_length()).sum()
    }

    pub fn consecutive_retransmissions(&self) -> u64 {
        self.consecutive_retransmissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(seqno: u64, isn: Wrap32, window: u16) -> TcpReceiverMessage {
        TcpReceiverMessage {
            ackno: Some(isn + seqno),
            window_size: window,
        }
    }

    #[test]
    fn first_segment_carries_syn() {
        let mut sender = Sender::new(1000, Some(Wrap32::new(0)));
        let mut stream = ByteStream::new(1000);
        sender.push(&mut stream);
        let msg = sender.maybe_send().unwrap();
        assert!(msg.syn);
        assert_eq!(msg.sequence_length(), 1);
        assert_eq!(sender.sequence_numbers_in_flight(), 1);
    }

    #[test]
    fn payload_and_fin_after_handshake() {
        let isn = Wrap32::new(0);
        let mut sender = Sender::new(1000, Some(isn));
        let mut stream = ByteStream::new(1000);
        sender.push(&mut stream);
        sender.maybe_send();
        sender.receive(&ack(1, isn, 1000));

        stream.push(b"hello");
        stream.close();
        sender.push(&mut stream);

        let msg = sender.maybe_send().unwrap();
        assert!(!msg.syn);
        assert_eq!(msg.payload, b"hello");
        assert!(msg.fin);
        assert_eq!(msg.sequence_length(), 6);
    }

    #[test]
    fn retransmission_on_timeout_resets_after_ack() {
        let isn = Wrap32::new(0);
        let mut sender = Sender::new(1000, Some(isn));
        let mut stream = ByteStream::new(1000);
        sender.push(&mut stream);
        sender.maybe_send();
        sender.receive(&ack(1, isn, 1000));

        stream.push(b"X");
        sender.push(&mut stream);
        sender.maybe_send();

        sender.tick(999);
        assert!(sender.maybe_send().is_none());
        sender.tick(1);
        assert!(sender.maybe_send().is_some());
        assert_eq!(sender.consecutive_retransmissions(), 1);

        sender.receive(&ack(2, isn, 1000));
        assert_eq!(sender.consecutive_retransmissions(), 0);
    }

    #[test]
    fn zero_window_probe_does_not_back_off() {
        let isn = Wrap32::new(0);
        let mut sender = Sender::new(1000, Some(isn));
        let mut stream = ByteStream::new(1000);
        sender.push(&mut stream);
        sender.maybe_send();
        sender.receive(&ack(1, isn, 0));

        stream.push(b"0123456789");
        sender.push(&mut stream);
        let msg = sender.maybe_send().unwrap();
        assert_eq!(msg.payload.len(), 1);

        sender.tick(1000);
        assert!(sender.maybe_send().is_some());
        // rto must not have doubled: another tick of 1000ms should fire again
        sender.tick(1000);
        assert!(sender.maybe_send().is_some());
    }

    #[test]
    fn stale_ack_is_ignored() {
        let isn = Wrap32::new(100);
        let mut sender = Sender::new(1000, Some(isn));
        let mut stream = ByteStream::new(1000);
        sender.push(&mut stream);
        sender.maybe_send();
        sender.receive(&ack(1, isn, 1000));
        sender.receive(&ack(1, isn, 1000));
        assert_eq!(sender.sequence_numbers_in_flight(), 0);
    }

    #[test]
    fn ack_beyond_everything_sent_is_rejected() {
        let isn = Wrap32::new(0);
        let mut sender = Sender::new(1000, Some(isn));
        let mut stream = ByteStream::new(1000);
        sender.push(&mut stream);
        sender.maybe_send();
        sender.receive(&ack(50, isn, 1000));
        // rejected: still only SYN outstanding
        assert_eq!(sender.sequence_numbers_in_flight(), 1);
    }
}

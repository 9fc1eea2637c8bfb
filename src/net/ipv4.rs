//! Minimal IPv4 header (no options) and the TCP segment wire codec, per
//! spec §6. Hand-rolled rather than delegated to a parsing crate, since the
//! segment codec is budgeted core plumbing, not an external collaborator.

use std::net::Ipv4Addr;

use crate::err::TcpError;
use crate::tcp::{TcpReceiverMessage, TcpSegment, TcpSenderMessage, Wrap32};

use super::checksum::checksum;

pub const TCP_PROTOCOL: u8 = 6;
const IPV4_HEADER_LEN: usize = 20;
const TCP_HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub total_length: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    pub fn new(payload_len: u16, ttl: u8, source: Ipv4Addr, destination: Ipv4Addr) -> Self {
        Ipv4Header {
            total_length: IPV4_HEADER_LEN as u16 + payload_len,
            ttl,
            protocol: TCP_PROTOCOL,
            source,
            destination,
        }
    }

    pub fn encode(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut buf = [0u8; IPV4_HEADER_LEN];
        buf[0] = 0x45; // version 4, IHL 5 (no options)
        buf[1] = 0; // DSCP/ECN
        buf[2..4].copy_from_slice(&self.total_length.to_be_bytes());
        buf[4..6].copy_from_slice(&0u16.to_be_bytes()); // identification
        buf[6..8].copy_from_slice(&0x4000u16.to_be_bytes()); // flags: don't fragment
        buf[8] = self.ttl;
        buf[9] = self.protocol;
        buf[10..12].copy_from_slice(&[0, 0]); // checksum, filled below
        buf[12..16].copy_from_slice(&self.source.octets());
        buf[16..20].copy_from_slice(&self.destination.octets());
        let csum = checksum(&buf);
        buf[10..12].copy_from_slice(&csum.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<(Ipv4Header, usize), TcpError> {
        if buf.len() < IPV4_HEADER_LEN {
            return Err(TcpError::MalformedIpv4("buffer shorter than a header"));
        }
        let version = buf[0] >> 4;
        let ihl = (buf[0] & 0x0F) as usize * 4;
        if version != 4 {
            return Err(TcpError::MalformedIpv4("not IPv4"));
        }
        if ihl < IPV4_HEADER_LEN || buf.len() < ihl {
            return Err(TcpError::MalformedIpv4("bad header length"));
        }
        if checksum(&buf[..ihl]) != 0 {
            return Err(TcpError::MalformedIpv4("bad header checksum"));
        }
        let total_length = u16::from_be_bytes([buf[2], buf[3]]);
        let protocol = buf[9];
        let source = Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]);
        let destination = Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]);
        Ok((
            Ipv4Header {
                total_length,
                ttl: buf[8],
                protocol,
                source,
                destination,
            },
            ihl,
        ))
    }
}

const FLAG_FIN: u8 = 1 << 0;
const FLAG_SYN: u8 = 1 << 1;
const FLAG_RST: u8 = 1 << 2;
const FLAG_ACK: u8 = 1 << 4;

/// Encode one [`TcpSegment`] as an IPv4 datagram carrying a TCP header (no
/// options) and payload, filling both checksums.
pub fn encode_segment(
    segment: &TcpSegment,
    source: Ipv4Addr,
    source_port: u16,
    destination: Ipv4Addr,
    destination_port: u16,
) -> Vec<u8> {
    let payload = &segment.sender.payload;
    let tcp_len = TCP_HEADER_LEN + payload.len();

    let mut tcp = vec![0u8; tcp_len];
    tcp[0..2].copy_from_slice(&source_port.to_be_bytes());
    tcp[2..4].copy_from_slice(&destination_port.to_be_bytes());
    tcp[4..8].copy_from_slice(&segment.sender.seqno.raw_value().to_be_bytes());
    let ackno = segment.receiver.ackno.map(Wrap32::raw_value).unwrap_or(0);
    tcp[8..12].copy_from_slice(&ackno.to_be_bytes());
    tcp[12] = ((TCP_HEADER_LEN / 4) as u8) << 4;

    let mut flags = 0u8;
    if segment.sender.fin {
        flags |= FLAG_FIN;
    }
    if segment.sender.syn {
        flags |= FLAG_SYN;
    }
    if segment.reset {
        flags |= FLAG_RST;
    }
    if segment.receiver.ackno.is_some() {
        flags |= FLAG_ACK;
    }
    tcp[13] = flags;
    tcp[14..16].copy_from_slice(&segment.receiver.window_size.to_be_bytes());
    // checksum at [16..18] filled below
    tcp[18..20].copy_from_slice(&0u16.to_be_bytes());
    tcp[TCP_HEADER_LEN..].copy_from_slice(payload);

    let csum = tcp_checksum(source, destination, &tcp);
    tcp[16..18].copy_from_slice(&csum.to_be_bytes());

    let ip_header = Ipv4Header::new(tcp_len as u16, 128, source, destination);
    let mut out = Vec::with_capacity(IPV4_HEADER_LEN + tcp_len);
    out.extend_from_slice(&ip_header.encode());
    out.extend_from_slice(&tcp);
    out
}

/// Decoded segment plus the addressing needed to attribute it to a quad.
pub struct DecodedSegment {
    pub segment: TcpSegment,
    pub source: Ipv4Addr,
    pub source_port: u16,
    pub destination: Ipv4Addr,
    pub destination_port: u16,
}

pub fn decode_segment(buf: &[u8]) -> Result<DecodedSegment, TcpError> {
    let (ip_header, ihl) = Ipv4Header::decode(buf)?;
    if ip_header.protocol != TCP_PROTOCOL {
        return Err(TcpError::MalformedIpv4("not a TCP datagram"));
    }
    let tcp = &buf[ihl..(ip_header.total_length as usize).min(buf.len())];
    if tcp.len() < TCP_HEADER_LEN {
        return Err(TcpError::MalformedTcpSegment(
            "buffer shorter than a TCP header",
        ));
    }
    if tcp_checksum(ip_header.source, ip_header.destination, tcp) != 0 {
        return Err(TcpError::MalformedTcpSegment("bad TCP checksum"));
    }

    let source_port = u16::from_be_bytes([tcp[0], tcp[1]]);
    let destination_port = u16::from_be_bytes([tcp[2], tcp[3]]);
    let seqno = Wrap32::new(u32::from_be_bytes([tcp[4], tcp[5], tcp[6], tcp[7]]));
    let ackno_raw = u32::from_be_bytes([tcp[8], tcp[9], tcp[10], tcp[11]]);
    let data_offset = ((tcp[12] >> 4) as usize) * 4;
    if data_offset < TCP_HEADER_LEN || tcp.len() < data_offset {
        return Err(TcpError::MalformedTcpSegment("bad data offset"));
    }
    let flags = tcp[13];
    let window_size = u16::from_be_bytes([tcp[14], tcp[15]]);
    let payload = tcp[data_offset..].to_vec();

    let ackno = if flags & FLAG_ACK != 0 {
        Some(Wrap32::new(ackno_raw))
    } else {
        None
    };

    Ok(DecodedSegment {
        segment: TcpSegment {
            sender: TcpSenderMessage {
                seqno,
                syn: flags & FLAG_SYN != 0,
                payload,
                fin: flags & FLAG_FIN != 0,
            },
            receiver: TcpReceiverMessage { ackno, window_size },
            reset: flags & FLAG_RST != 0,
        },
        source: ip_header.source,
        source_port,
        destination: ip_header.destination,
        destination_port,
    })
}

/// RFC 793 §3.1 pseudo-header checksum: source/destination address, zero
/// byte, protocol, TCP length, then the TCP header and payload themselves.
fn tcp_checksum(source: Ipv4Addr, destination: Ipv4Addr, tcp: &[u8]) -> u16 {
    let mut buf = Vec::with_capacity(12 + tcp.len() + 1);
    buf.extend_from_slice(&source.octets());
    buf.extend_from_slice(&destination.octets());
    buf.push(0);
    buf.push(TCP_PROTOCOL);
    buf.extend_from_slice(&(tcp.len() as u16).to_be_bytes());
    buf.extend_from_slice(tcp);
    checksum(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip_preserves_fields() {
        let segment = TcpSegment {
            sender: TcpSenderMessage {
                seqno: Wrap32::new(1000),
                syn: true,
                payload: b"hello".to_vec(),
                fin: false,
            },
            receiver: TcpReceiverMessage {
                ackno: Some(Wrap32::new(2000)),
                window_size: 4096,
            },
            reset: false,
        };
        let source = Ipv4Addr::new(10, 0, 0, 1);
        let destination = Ipv4Addr::new(10, 0, 0, 2);
        let wire = encode_segment(&segment, source, 1234, destination, 80);

        let decoded = decode_segment(&wire).unwrap();
        assert_eq!(decoded.source, source);
        assert_eq!(decoded.destination, destination);
        assert_eq!(decoded.source_port, 1234);
        assert_eq!(decoded.destination_port, 80);
        assert_eq!(decoded.segment, segment);
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let segment = TcpSegment {
            sender: TcpSenderMessage {
                seqno: Wrap32::new(1),
                syn: false,
                payload: b"x".to_vec(),
                fin: false,
            },
            receiver: TcpReceiverMessage {
                ackno: Some(Wrap32::new(1)),
                window_size: 10,
            },
            reset: false,
        };
        let mut wire = encode_segment(
            &segment,
            Ipv4Addr::new(1, 1, 1, 1),
            1,
            Ipv4Addr::new(2, 2, 2, 2),
            2,
        );
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        assert!(decode_segment(&wire).is_err());
    }
}

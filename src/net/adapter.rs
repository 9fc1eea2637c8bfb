//! Datagram transport abstraction: a real TUN device, or an in-memory
//! channel pair for tests.

use std::io;
use std::os::fd::AsRawFd;
use std::sync::mpsc;
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags};
use rand::Rng;
use tidy_tuntap::Tun;

use crate::config::AdapterConfig;
use crate::tcp::TcpSegment;

use super::ipv4::{decode_segment, encode_segment};

const MTU: usize = 1500;

/// One side of a segment transport: read the next segment addressed to us,
/// or write one out.
pub trait Adapter {
    fn read(&mut self) -> io::Result<Option<TcpSegment>>;
    fn write(&mut self, segment: &TcpSegment) -> io::Result<()>;
}

/// A real kernel TUN device, filtering on the configured quad and performing
/// the IPv4/TCP wrap and unwrap.
pub struct TunAdapter {
    tun: Tun,
    config: AdapterConfig,
    buf: [u8; MTU],
}

impl TunAdapter {
    pub fn new(tun: Tun, config: AdapterConfig) -> Self {
        TunAdapter {
            tun,
            config,
            buf: [0u8; MTU],
        }
    }
}

impl Adapter for TunAdapter {
    fn read(&mut self) -> io::Result<Option<TcpSegment>> {
        use std::io::Read;

        let mut pfd = [PollFd::new(self.tun.as_raw_fd(), PollFlags::POLLIN)];
        if poll(&mut pfd[..], 10).map_err(|e| io::Error::from_raw_os_error(e as i32))? == 0 {
            return Ok(None);
        }

        let n = self.tun.read(&mut self.buf)?;
        let Ok(decoded) = decode_segment(&self.buf[..n]) else {
            return Ok(None);
        };
        let quad = self.config.quad;
        if decoded.source != quad.dst.ipv4
            || decoded.source_port != quad.dst.port
            || decoded.destination != quad.src.ipv4
            || decoded.destination_port != quad.src.port
        {
            return Ok(None);
        }
        Ok(Some(decoded.segment))
    }

    fn write(&mut self, segment: &TcpSegment) -> io::Result<()> {
        use std::io::Write;

        let quad = self.config.quad;
        let wire = encode_segment(
            segment,
            quad.src.ipv4,
            quad.src.port,
            quad.dst.ipv4,
            quad.dst.port,
        );
        self.tun.write_all(&wire)
    }
}

/// An in-memory adapter backed by `mpsc` channels, with optional Bernoulli
/// loss in each direction, for driving two `Endpoint`s against each other
/// without a real network device.
pub struct ChannelAdapter {
    tx: mpsc::Sender<TcpSegment>,
    rx: mpsc::Receiver<TcpSegment>,
    loss_up: f64,
    loss_down: f64,
}

impl ChannelAdapter {
    pub fn new_pair(loss_up: f64, loss_down: f64) -> (ChannelAdapter, ChannelAdapter) {
        let (tx_a, rx_b) = mpsc::channel();
        let (tx_b, rx_a) = mpsc::channel();
        (
            ChannelAdapter {
                tx: tx_a,
                rx: rx_a,
                loss_up,
                loss_down,
            },
            ChannelAdapter {
                tx: tx_b,
                rx: rx_b,
                loss_up: loss_down,
                loss_down: loss_up,
            },
        )
    }
}

impl Adapter for ChannelAdapter {
    fn read(&mut self) -> io::Result<Option<TcpSegment>> {
        match self.rx.recv_timeout(Duration::from_millis(10)) {
            Ok(segment) => {
                if rand::thread_rng().gen_bool(self.loss_down) {
                    Ok(None)
                } else {
                    Ok(Some(segment))
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer adapter dropped"))
            }
        }
    }

    fn write(&mut self, segment: &TcpSegment) -> io::Result<()> {
        if rand::thread_rng().gen_bool(self.loss_up) {
            return Ok(());
        }
        self.tx
            .send(segment.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer adapter dropped"))
    }
}

//! Application-facing `Read`/`Write` handle to a connection, backed by
//! `mpsc` channels to the thread running [`crate::net::run_event_loop`].

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// A connected TCP stream. Dropping it closes the write half; the event
/// loop observes the channel disconnect and finishes its own teardown.
#[derive(Debug)]
pub struct TcpStream {
    pub(crate) to_net: Option<mpsc::Sender<Vec<u8>>>,
    pub(crate) from_net: mpsc::Receiver<Vec<u8>>,
    pub(crate) active: Arc<AtomicBool>,
    pending: Vec<u8>,
}

impl TcpStream {
    pub(crate) fn new(
        to_net: mpsc::Sender<Vec<u8>>,
        from_net: mpsc::Receiver<Vec<u8>>,
        active: Arc<AtomicBool>,
    ) -> Self {
        TcpStream {
            to_net: Some(to_net),
            from_net,
            active,
            pending: Vec::new(),
        }
    }

    /// Close the write half: no further bytes will be accepted, which lets
    /// the sender emit FIN once the outbound stream drains.
    pub fn shutdown_write(&mut self) {
        self.to_net = None;
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// A cloneable write-only handle, for feeding the stream from a
    /// separate thread (e.g. copying stdin) while `self` is read elsewhere.
    pub fn writer(&self) -> Option<StreamWriter> {
        self.to_net.clone().map(StreamWriter)
    }
}

/// A write-only handle sharing the same outbound channel as a [`TcpStream`].
#[derive(Debug, Clone)]
pub struct StreamWriter(mpsc::Sender<Vec<u8>>);

impl Write for StreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event loop is no longer running"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.from_net.recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0), // event loop exited: end of stream
            }
        }
        let n = std::cmp::min(buf.len(), self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

impl Write for TcpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(to_net) = &self.to_net else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "write half is closed",
            ));
        };
        to_net
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event loop is no longer running"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for TcpStream {
    fn drop(&mut self) {
        self.shutdown_write();
    }
}

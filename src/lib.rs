use std::net::Ipv4Addr;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use tidy_tuntap::Tun;

pub mod config;
pub mod err;
pub mod net;
pub mod stream;
pub mod tcp;

pub use config::{AdapterConfig, Dual, Quad, TcpConfig};
pub use err::TcpError;
pub use stream::TcpStream;
pub use tcp::Endpoint;

use net::{run_event_loop, Adapter, TunAdapter};

/// Owns the background thread running the event loop for one connection.
/// Single-connection by design: multi-connection demultiplexing is out of
/// scope (see `DESIGN.md`).
#[derive(Debug)]
pub struct NetStack {
    event_thread: Option<thread::JoinHandle<()>>,
    active: Arc<AtomicBool>,
}

impl NetStack {
    /// Bring up `tun_name` at `local`/`netmask`, actively open a connection
    /// to `quad.dst` (seeding the initial SYN), and spawn the event loop
    /// thread. Returns the handle to the background stack plus the
    /// application's stream.
    pub fn connect(
        tun_name: &str,
        local: Ipv4Addr,
        netmask: Ipv4Addr,
        quad: Quad,
        config: TcpConfig,
    ) -> Result<(NetStack, TcpStream), TcpError> {
        let (mut endpoint, adapter) = Self::bring_up(tun_name, local, netmask, quad, config)?;
        endpoint.initiate();
        Ok(Self::spawn(endpoint, adapter))
    }

    /// Bring up `tun_name` the same way as `connect`, but wait passively for
    /// `quad.dst` to send the first SYN instead of seeding one ourselves.
    pub fn listen(
        tun_name: &str,
        local: Ipv4Addr,
        netmask: Ipv4Addr,
        quad: Quad,
        config: TcpConfig,
    ) -> Result<(NetStack, TcpStream), TcpError> {
        let (endpoint, adapter) = Self::bring_up(tun_name, local, netmask, quad, config)?;
        Ok(Self::spawn(endpoint, adapter))
    }

    fn bring_up(
        tun_name: &str,
        local: Ipv4Addr,
        netmask: Ipv4Addr,
        quad: Quad,
        config: TcpConfig,
    ) -> Result<(Endpoint, TunAdapter), TcpError> {
        let tun = Tun::new(tun_name, false)?;
        tun.set_addr(local)?;
        tun.set_netmask(netmask)?;
        tun.bring_up()?;

        let adapter = TunAdapter::new(tun, AdapterConfig::new(quad));
        let endpoint = Endpoint::new(config.capacity, config.initial_rto_ms, config.fixed_isn);
        Ok((endpoint, adapter))
    }

    fn spawn(endpoint: Endpoint, adapter: impl Adapter + Send + 'static) -> (NetStack, TcpStream) {
        let (app_tx, net_rx) = mpsc::channel();
        let (net_tx, app_rx) = mpsc::channel();
        let active = Arc::new(AtomicBool::new(true));

        let thread_active = active.clone();
        let event_thread = thread::spawn(move || {
            run_event_loop(endpoint, adapter, net_rx, net_tx, thread_active)
        });

        let stream = TcpStream::new(app_tx, app_rx, active.clone());
        (
            NetStack {
                event_thread: Some(event_thread),
                active,
            },
            stream,
        )
    }

    pub fn is_active(&self) -> bool {
        self.active.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Block until the event loop thread exits (the connection finished or
    /// was reset).
    pub fn join(mut self) {
        if let Some(handle) = self.event_thread.take() {
            let _ = handle.join();
        }
    }
}

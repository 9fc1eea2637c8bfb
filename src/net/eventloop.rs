//! Drives one `Endpoint` against one `Adapter` to completion: poll, tick,
//! receive, maybe_send, and ferry bytes to/from the application thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use crate::config::DEFAULT_MAX_RETX_ATTEMPTS;
use crate::tcp::byte_stream;
use crate::tcp::Endpoint;

use super::adapter::Adapter;

/// Matches the adapter's own poll timeout, so a full loop iteration costs
/// about one tick's worth of wall-clock time either way.
const TICK_MS: u64 = 10;

/// Run `endpoint` against `adapter` until the connection is no longer
/// active or `active` is cleared by the owning thread.
///
/// `from_app` carries bytes the application wants to send; `to_app` carries
/// bytes the peer has delivered. `active` is updated to `false` when the
/// loop exits, so an application-side handle can detect it without waiting
/// on a channel read.
pub fn run_event_loop(
    mut endpoint: Endpoint,
    mut adapter: impl Adapter,
    from_app: mpsc::Receiver<Vec<u8>>,
    to_app: mpsc::Sender<Vec<u8>>,
    active: Arc<AtomicBool>,
) {
    while active.load(Ordering::Acquire) {
        while let Ok(chunk) = from_app.try_recv() {
            endpoint.outbound_mut().push(&chunk);
        }

        if let Some(segment) = endpoint.maybe_send() {
            if let Err(err) = adapter.write(&segment) {
                tracing::warn!(?err, "adapter write failed");
            }
        }

        match adapter.read() {
            Ok(Some(segment)) => {
                tracing::trace!(?segment, "segment received");
                endpoint.receive(segment);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(?err, "adapter read failed"),
        }

        endpoint.tick(TICK_MS);
        if endpoint.consecutive_retransmissions() > DEFAULT_MAX_RETX_ATTEMPTS {
            tracing::warn!("retransmission ceiling exceeded, aborting connection");
            endpoint.abort();
        }

        let available = endpoint.inbound_mut().bytes_buffered();
        if available > 0 {
            let chunk = byte_stream::read(endpoint.inbound_mut(), available);
            if to_app.send(chunk).is_err() {
                break;
            }
        }

        if !endpoint.active() {
            tracing::debug!(state = endpoint.state(), "endpoint no longer active");
            break;
        }
    }

    active.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::net::adapter::ChannelAdapter;
    use crate::tcp::Wrap32;

    #[test]
    fn two_endpoints_exchange_a_message_end_to_end() {
        let (adapter_a, adapter_b) = ChannelAdapter::new_pair(0.0, 0.0);

        let mut endpoint_a = Endpoint::new(4096, 100, Some(Wrap32::new(0)));
        let endpoint_b = Endpoint::new(4096, 100, Some(Wrap32::new(5000)));
        // a is the actively connecting side; b stays passive until a's SYN
        // arrives.
        endpoint_a.initiate();

        let (app_to_a_tx, app_to_a_rx) = mpsc::channel();
        let (a_to_app_tx, a_to_app_rx) = mpsc::channel();
        let (_app_to_b_tx, app_to_b_rx) = mpsc::channel();
        let (b_to_app_tx, b_to_app_rx) = mpsc::channel();

        let active_a = Arc::new(AtomicBool::new(true));
        let active_b = Arc::new(AtomicBool::new(true));

        let handle_a = {
            let active_a = active_a.clone();
            thread::spawn(move || {
                run_event_loop(endpoint_a, adapter_a, app_to_a_rx, a_to_app_tx, active_a)
            })
        };
        let handle_b = {
            let active_b = active_b.clone();
            thread::spawn(move || {
                run_event_loop(endpoint_b, adapter_b, app_to_b_rx, b_to_app_tx, active_b)
            })
        };

        app_to_a_tx.send(b"hello".to_vec()).unwrap();

        let received = b_to_app_rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
        assert_eq!(received, b"hello");

        drop(app_to_a_tx);
        active_a.store(false, Ordering::Release);
        active_b.store(false, Ordering::Release);
        handle_a.join().unwrap();
        handle_b.join().unwrap();
        drop(a_to_app_rx);
    }
}

//! CURVE-secured ZeroMQ transport
//!
//! Ledger nodes listen on a ROUTER socket with CurveZMQ enabled. The client
//! connects a DEALER socket using its ephemeral Curve25519 key pair and the
//! node's transformed server key. libzmq sockets are not thread safe, so
//! each link gets a socket thread that owns the DEALER and blocks in
//! `zmq::poll` on it together with an inproc wake socket. A writer thread
//! moves outbound frames from the async side onto the wake socket, so a
//! write wakes the socket thread immediately.

use async_trait::async_trait;
use ledgerlink_core::{ClientKeyPair, ConnectionParams, LedgerError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::transport::{Link, Transport};

/// Sent on the wake socket when the outbound side is dropped; real frames are never empty
const STOP: &[u8] = b"";

static NEXT_WAKE_ENDPOINT: AtomicUsize = AtomicUsize::new(0);

fn zmq_error(context: &str, err: zmq::Error) -> LedgerError {
    LedgerError::network(format!("{context}: {err}"))
}

/// DEALER-socket transport speaking CurveZMQ to a ledger node
pub struct CurveZmqTransport {
    context: zmq::Context,
}

impl Default for CurveZmqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CurveZmqTransport {
    /// Create a transport with its own ZeroMQ context
    pub fn new() -> Self {
        Self {
            context: zmq::Context::new(),
        }
    }

    fn configure(&self, params: &ConnectionParams, keys: &ClientKeyPair) -> Result<zmq::Socket> {
        let socket = self
            .context
            .socket(zmq::DEALER)
            .map_err(|e| zmq_error("create socket", e))?;

        let identity = zmq::z85_encode(keys.public_key())
            .map_err(|e| LedgerError::crypto(format!("encode identity: {e}")))?;
        socket
            .set_identity(identity.as_bytes())
            .map_err(|e| zmq_error("set identity", e))?;
        socket
            .set_curve_publickey(keys.public_key())
            .map_err(|e| zmq_error("set curve public key", e))?;
        socket
            .set_curve_secretkey(keys.secret_key())
            .map_err(|e| zmq_error("set curve secret key", e))?;
        socket
            .set_curve_serverkey(&params.server_auth_key)
            .map_err(|e| zmq_error("set curve server key", e))?;
        socket.set_linger(0).map_err(|e| zmq_error("set linger", e))?;

        socket
            .connect(&params.endpoint())
            .map_err(|e| zmq_error("connect", e))?;
        Ok(socket)
    }

    /// Bound and connected ends of a fresh inproc PAIR
    fn wake_pair(&self) -> Result<(zmq::Socket, zmq::Socket)> {
        let endpoint = format!(
            "inproc://ledgerlink-wake-{}",
            NEXT_WAKE_ENDPOINT.fetch_add(1, Ordering::Relaxed)
        );
        let pair = || -> std::result::Result<zmq::Socket, zmq::Error> {
            let socket = self.context.socket(zmq::PAIR)?;
            // Unbounded queues, so the writer never blocks on a slow socket thread
            socket.set_sndhwm(0)?;
            socket.set_rcvhwm(0)?;
            socket.set_linger(0)?;
            Ok(socket)
        };

        let wake_rx = pair().map_err(|e| zmq_error("create wake socket", e))?;
        wake_rx
            .bind(&endpoint)
            .map_err(|e| zmq_error("bind wake socket", e))?;
        let wake_tx = pair().map_err(|e| zmq_error("create wake socket", e))?;
        wake_tx
            .connect(&endpoint)
            .map_err(|e| zmq_error("connect wake socket", e))?;
        Ok((wake_tx, wake_rx))
    }
}

fn run_writer(mut to_node: mpsc::UnboundedReceiver<Vec<u8>>, wake_tx: zmq::Socket, endpoint: String) {
    while let Some(frame) = to_node.blocking_recv() {
        if let Err(err) = wake_tx.send(frame, 0) {
            warn!(%endpoint, error = %err, "failed to queue frame");
            return;
        }
    }
    if let Err(err) = wake_tx.send(STOP, 0) {
        warn!(%endpoint, error = %err, "failed to stop socket thread");
    }
}

fn run_socket(
    socket: zmq::Socket,
    wake_rx: zmq::Socket,
    from_node: mpsc::UnboundedSender<Vec<u8>>,
    endpoint: String,
) {
    debug!(%endpoint, "socket thread started");
    loop {
        let (node_readable, wake_readable) = {
            let mut items = [
                socket.as_poll_item(zmq::POLLIN),
                wake_rx.as_poll_item(zmq::POLLIN),
            ];
            if let Err(err) = zmq::poll(&mut items, -1) {
                warn!(%endpoint, error = %err, "poll failed");
                return;
            }
            (items[0].is_readable(), items[1].is_readable())
        };

        if wake_readable {
            while let Ok(frame) = wake_rx.recv_bytes(zmq::DONTWAIT) {
                if frame.is_empty() {
                    debug!(%endpoint, "socket thread stopping");
                    return;
                }
                if let Err(err) = socket.send(frame, 0) {
                    warn!(%endpoint, error = %err, "failed to write frame");
                }
            }
        }

        if node_readable {
            while let Ok(frame) = socket.recv_bytes(zmq::DONTWAIT) {
                if from_node.send(frame).is_err() {
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for CurveZmqTransport {
    async fn open(&self, params: &ConnectionParams, keys: &ClientKeyPair) -> Result<Link> {
        let socket = self.configure(params, keys)?;
        let (wake_tx, wake_rx) = self.wake_pair()?;
        let endpoint = params.endpoint();

        let (outbound, to_node) = mpsc::unbounded_channel::<Vec<u8>>();
        let (from_node, inbound) = mpsc::unbounded_channel::<Vec<u8>>();

        let socket_endpoint = endpoint.clone();
        thread::Builder::new()
            .name(format!("ledgerlink-zmq-{}", params.port))
            .spawn(move || run_socket(socket, wake_rx, from_node, socket_endpoint))
            .map_err(|e| LedgerError::network(format!("spawn socket thread: {e}")))?;
        thread::Builder::new()
            .name(format!("ledgerlink-zmq-writer-{}", params.port))
            .spawn(move || run_writer(to_node, wake_tx, endpoint))
            .map_err(|e| LedgerError::network(format!("spawn writer thread: {e}")))?;

        Ok(Link { outbound, inbound })
    }

    fn transport_type(&self) -> &'static str {
        "curve-zmq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn curve_available() -> bool {
        zmq::has("curve").unwrap_or(false)
    }

    fn local_params(port: u16, server_auth_key: [u8; 32]) -> ConnectionParams {
        ConnectionParams {
            host: "127.0.0.1".to_string(),
            port,
            server_auth_key,
        }
    }

    #[test]
    fn configure_sets_identity_and_linger() {
        if !curve_available() {
            return;
        }
        let transport = CurveZmqTransport::new();
        let keys = ClientKeyPair::generate();

        // Connecting is asynchronous in libzmq, so no listener is needed here
        let socket = transport.configure(&local_params(9702, [9; 32]), &keys).unwrap();

        let identity = zmq::z85_encode(keys.public_key()).unwrap();
        assert_eq!(socket.get_identity().unwrap(), identity.into_bytes());
        assert_eq!(socket.get_linger().unwrap(), 0);
        assert_eq!(socket.get_socket_type().unwrap(), zmq::DEALER);
    }

    #[test]
    fn wake_pair_carries_frames() {
        let transport = CurveZmqTransport::new();
        let (wake_tx, wake_rx) = transport.wake_pair().unwrap();

        wake_tx.send(&b"pi"[..], 0).unwrap();
        assert_eq!(wake_rx.recv_bytes(0).unwrap(), b"pi".to_vec());
    }

    #[tokio::test]
    async fn round_trip_through_a_curve_router() {
        if !curve_available() {
            return;
        }
        let transport = CurveZmqTransport::new();
        let server_keys = ClientKeyPair::generate();

        let router = transport.context.socket(zmq::ROUTER).unwrap();
        router.set_curve_server(true).unwrap();
        router.set_curve_secretkey(server_keys.secret_key()).unwrap();
        router.set_rcvtimeo(5_000).unwrap();
        router.bind("tcp://127.0.0.1:*").unwrap();
        let bound = router.get_last_endpoint().unwrap().unwrap();
        let port: u16 = bound.rsplit(':').next().unwrap().parse().unwrap();

        let node = thread::spawn(move || {
            let parts = router.recv_multipart(0).unwrap();
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[1], b"pi".to_vec());
            router
                .send_multipart([parts[0].clone(), b"po".to_vec()], 0)
                .unwrap();
        });

        let mut link = transport
            .open(&local_params(port, *server_keys.public_key()), &ClientKeyPair::generate())
            .await
            .unwrap();
        link.outbound.send(b"pi".to_vec()).unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), link.inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, b"po".to_vec());
        node.join().unwrap();
    }
}

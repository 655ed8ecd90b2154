//! QUIC-backed [`Transport`].
//!
//! All network I/O runs on a tokio runtime owned by a background thread.
//! Received messages are handed to the simulation thread through a single
//! queue drained by [`Transport::poll`]; outgoing messages travel the other
//! way through a command channel. Nothing on the simulation side awaits.

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use quinn::{Connection, SendStream};
use starhaven_core::PeerId;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::channel::{self, FrameKind};
use crate::ping::PingLocation;
use crate::transport::{ClientEndpoint, Delivery, ServerEndpoint, Transport, TransportError, TransportEvent};

/// Reference point name used in ping locations: every peer measures its
/// round trip to the host.
pub const HOST_RELAY: &str = "host";

/// How long shutdown waits for close frames to leave before the runtime
/// stops driving the endpoint.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

enum Command {
    Register(PeerId, PeerLink),
    Unregister(PeerId),
    Send {
        peer: PeerId,
        bytes: Vec<u8>,
        delivery: Delivery,
    },
    Disconnect(PeerId),
    Shutdown,
}

struct PeerLink {
    writer: UnboundedSender<(Delivery, Vec<u8>)>,
    connection: Connection,
}

#[derive(Clone)]
struct LinkContext {
    local: PeerId,
    commands: UnboundedSender<Command>,
    events: mpsc::Sender<TransportEvent>,
    round_trip_ms: Arc<AtomicU32>,
}

pub struct QuicTransport {
    local: PeerId,
    is_host: bool,
    local_addr: SocketAddr,
    commands: UnboundedSender<Command>,
    events: mpsc::Receiver<TransportEvent>,
    connected: BTreeSet<PeerId>,
    round_trip_ms: Arc<AtomicU32>,
    io_thread: Option<JoinHandle<()>>,
}

impl QuicTransport {
    /// Bind a host endpoint and start accepting peers.
    pub fn host(bind: SocketAddr) -> Result<Self> {
        let runtime = build_runtime()?;
        let server = runtime.block_on(async { ServerEndpoint::bind(bind) })?;
        let local_addr = server.local_addr();
        Self::start(runtime, local_addr, true, move |ctx, commands| async move {
            run_dispatcher(commands, ctx, Some(server)).await;
        })
    }

    /// Connect to a host. Blocks until the QUIC handshake completes.
    pub fn join(host: SocketAddr) -> Result<Self> {
        let runtime = build_runtime()?;
        let (client, connection) = runtime.block_on(async {
            let client = ClientEndpoint::new()?;
            let connection = client.connect(host).await?;
            anyhow::Ok((client, connection))
        })?;
        let local_addr = connection.local_ip().map_or(host, |ip| SocketAddr::new(ip, 0));
        Self::start(runtime, local_addr, false, move |ctx, commands| async move {
            tokio::spawn(run_link(connection, ctx.clone()));
            run_dispatcher(commands, ctx, None).await;
            client.close();
            client.wait_idle(SHUTDOWN_GRACE).await;
        })
    }

    fn start<F, Fut>(runtime: tokio::runtime::Runtime, local_addr: SocketAddr, is_host: bool, body: F) -> Result<Self>
    where
        F: FnOnce(LinkContext, UnboundedReceiver<Command>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let local = PeerId(rand::random());
        let (command_tx, command_rx) = unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel();
        let round_trip_ms = Arc::new(AtomicU32::new(0));
        let ctx = LinkContext {
            local,
            commands: command_tx.clone(),
            events: event_tx,
            round_trip_ms: round_trip_ms.clone(),
        };

        let io_thread = std::thread::Builder::new()
            .name("starhaven-net".into())
            .spawn(move || runtime.block_on(body(ctx, command_rx)))
            .context("Failed to spawn network thread")?;

        info!(peer = %local, %local_addr, is_host, "QUIC transport started");
        Ok(Self {
            local,
            is_host,
            local_addr,
            commands: command_tx,
            events: event_rx,
            connected: BTreeSet::new(),
            round_trip_ms,
            io_thread: Some(io_thread),
        })
    }

    /// Bound address (host) or local address of the connection (client).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for QuicTransport {
    fn local_peer(&self) -> PeerId {
        self.local
    }

    fn send(&mut self, peer: PeerId, bytes: &[u8], delivery: Delivery) -> Result<(), TransportError> {
        if !self.connected.contains(&peer) {
            return Err(TransportError::UnknownPeer(peer));
        }
        if bytes.len() > channel::MAX_FRAME_LEN {
            return Err(TransportError::TooLarge(bytes.len()));
        }
        self.commands
            .send(Command::Send {
                peer,
                bytes: bytes.to_vec(),
                delivery,
            })
            .map_err(|_| TransportError::Closed)
    }

    fn poll(&mut self, max: usize) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while events.len() < max {
            let Ok(event) = self.events.try_recv() else {
                break;
            };
            match &event {
                TransportEvent::Connected(peer) => {
                    self.connected.insert(*peer);
                }
                TransportEvent::Disconnected(peer) => {
                    self.connected.remove(peer);
                }
                TransportEvent::Message { .. } => {}
            }
            events.push(event);
        }
        events
    }

    fn ping_location(&self) -> PingLocation {
        let round_trip = if self.is_host {
            0
        } else {
            self.round_trip_ms.load(Ordering::Relaxed)
        };
        PingLocation::new().with_relay(HOST_RELAY, round_trip)
    }

    fn disconnect(&mut self, peer: PeerId) {
        let _ = self.commands.send(Command::Disconnect(peer));
    }
}

impl Drop for QuicTransport {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.io_thread.take() {
            if thread.join().is_err() {
                warn!("network thread panicked");
            }
        }
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("starhaven-net-io")
        .enable_all()
        .build()
        .context("Failed to build network runtime")
}

async fn accept_next(server: Option<&ServerEndpoint>) -> Option<quinn::Incoming> {
    match server {
        Some(server) => server.accept().await,
        None => std::future::pending().await,
    }
}

/// Owns the peer table and routes outgoing messages.
async fn run_dispatcher(mut commands: UnboundedReceiver<Command>, ctx: LinkContext, server: Option<ServerEndpoint>) {
    let mut links: HashMap<PeerId, PeerLink> = HashMap::new();
    loop {
        tokio::select! {
            incoming = accept_next(server.as_ref()) => {
                let Some(incoming) = incoming else { break };
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let addr = incoming.remote_address();
                    match incoming.await {
                        Ok(connection) => run_link(connection, ctx).await,
                        Err(err) => warn!(%addr, %err, "failed to establish connection"),
                    }
                });
            }
            command = commands.recv() => match command {
                None | Some(Command::Shutdown) => break,
                Some(Command::Register(peer, link)) => {
                    links.insert(peer, link);
                }
                Some(Command::Unregister(peer)) => {
                    links.remove(&peer);
                }
                Some(Command::Send { peer, bytes, delivery }) => match links.get(&peer) {
                    Some(link) => {
                        let _ = link.writer.send((delivery, bytes));
                    }
                    None => debug!(%peer, "dropping message for departed peer"),
                },
                Some(Command::Disconnect(peer)) => {
                    if let Some(link) = links.remove(&peer) {
                        link.connection.close(0u32.into(), b"disconnected");
                    }
                }
            }
        }
    }

    for link in links.values() {
        link.connection.close(0u32.into(), b"shutting down");
    }
    if let Some(server) = server {
        server.close();
        server.wait_idle(SHUTDOWN_GRACE).await;
    }
}

/// Drive one peer connection from hello to close.
async fn run_link(connection: Connection, ctx: LinkContext) {
    let addr = connection.remote_address();
    let (peer, send, mut recv) = match channel::exchange_hello(&connection, ctx.local).await {
        Ok(hello) => hello,
        Err(err) => {
            warn!(%addr, "handshake failed: {err:#}");
            connection.close(1u32.into(), b"bad hello");
            return;
        }
    };
    info!(%peer, %addr, "peer connected");

    let (writer_tx, writer_rx) = unbounded_channel();
    let link = PeerLink {
        writer: writer_tx,
        connection: connection.clone(),
    };
    if ctx.commands.send(Command::Register(peer, link)).is_err() {
        return;
    }
    let _ = ctx.events.send(TransportEvent::Connected(peer));

    tokio::spawn(write_loop(send, connection.clone(), writer_rx));

    let stream_ctx = ctx.clone();
    let stream_connection = connection.clone();
    tokio::spawn(async move {
        loop {
            match channel::read_frame(&mut recv).await {
                Ok(Some((FrameKind::Packet, bytes))) => {
                    deliver(&stream_ctx, &stream_connection, peer, bytes, Delivery::Reliable);
                }
                Ok(Some((kind, _))) => debug!(%peer, ?kind, "ignoring unexpected frame"),
                Ok(None) => break,
                Err(err) => {
                    debug!(%peer, "reliable stream ended: {err:#}");
                    break;
                }
            }
        }
    });

    let datagram_ctx = ctx.clone();
    let datagram_connection = connection.clone();
    tokio::spawn(async move {
        loop {
            match channel::recv_datagram(&datagram_connection).await {
                Ok(bytes) => deliver(&datagram_ctx, &datagram_connection, peer, bytes, Delivery::Unreliable),
                Err(err) => {
                    debug!(%peer, "datagram reader ended: {err:#}");
                    break;
                }
            }
        }
    });

    let reason = connection.closed().await;
    info!(%peer, %reason, "peer connection closed");
    let _ = ctx.commands.send(Command::Unregister(peer));
    let _ = ctx.events.send(TransportEvent::Disconnected(peer));
}

fn deliver(ctx: &LinkContext, connection: &Connection, peer: PeerId, bytes: Vec<u8>, delivery: Delivery) {
    let rtt = connection.rtt().as_millis().min(u32::MAX as u128) as u32;
    ctx.round_trip_ms.store(rtt, Ordering::Relaxed);
    let _ = ctx.events.send(TransportEvent::Message { peer, bytes, delivery });
}

async fn write_loop(mut send: SendStream, connection: Connection, mut outgoing: UnboundedReceiver<(Delivery, Vec<u8>)>) {
    while let Some((delivery, bytes)) = outgoing.recv().await {
        // Snapshots larger than a datagram fall back to the ordered stream.
        let result = if delivery == Delivery::Unreliable && channel::fits_datagram(&connection, bytes.len()) {
            channel::send_datagram(&connection, &bytes)
        } else {
            channel::write_frame(&mut send, FrameKind::Packet, &bytes).await
        };
        if let Err(err) = result {
            debug!(peer = %connection.remote_address(), "send failed: {err:#}");
            if delivery == Delivery::Reliable {
                break;
            }
        }
    }
    let _ = send.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn poll_until(transport: &mut QuicTransport, mut done: impl FnMut(&TransportEvent) -> bool) -> Vec<TransportEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            for event in transport.poll(16) {
                let finished = done(&event);
                seen.push(event);
                if finished {
                    return seen;
                }
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("timed out; saw {seen:?}");
    }

    #[test]
    fn host_and_client_exchange_messages() {
        let mut host = QuicTransport::host("127.0.0.1:0".parse().unwrap()).expect("bind host");
        let mut client = QuicTransport::join(host.local_addr()).expect("join host");

        poll_until(&mut host, |e| *e == TransportEvent::Connected(client.local_peer()));
        poll_until(&mut client, |e| *e == TransportEvent::Connected(host.local_peer()));

        client
            .send(host.local_peer(), b"first", Delivery::Reliable)
            .unwrap();
        client
            .send(host.local_peer(), b"second", Delivery::Reliable)
            .unwrap();
        let mut received = Vec::new();
        poll_until(&mut host, |e| {
            if let TransportEvent::Message { bytes, .. } = e {
                received.push(bytes.clone());
            }
            received.len() == 2
        });
        assert_eq!(received, vec![b"first".to_vec(), b"second".to_vec()]);

        host.send(client.local_peer(), b"tick", Delivery::Unreliable).unwrap();
        poll_until(&mut client, |e| matches!(e, TransportEvent::Message { bytes, .. } if bytes == b"tick"));
        assert!(client.ping_location().estimate_round_trip_ms(&host.ping_location()).is_some());
    }

    #[test]
    fn sending_to_unknown_peer_fails() {
        let mut host = QuicTransport::host("127.0.0.1:0".parse().unwrap()).expect("bind host");
        let err = host.send(PeerId(42), b"x", Delivery::Reliable).unwrap_err();
        assert!(matches!(err, TransportError::UnknownPeer(PeerId(42))));
    }

    #[test]
    fn client_disconnect_is_reported() {
        let mut host = QuicTransport::host("127.0.0.1:0".parse().unwrap()).expect("bind host");
        let client = QuicTransport::join(host.local_addr()).expect("join host");
        let client_peer = client.local_peer();
        poll_until(&mut host, |e| *e == TransportEvent::Connected(client_peer));
        drop(client);
        poll_until(&mut host, |e| *e == TransportEvent::Disconnected(client_peer));
    }

    #[test]
    fn host_shutdown_is_reported() {
        let host = QuicTransport::host("127.0.0.1:0".parse().unwrap()).expect("bind host");
        let host_peer = host.local_peer();
        let mut client = QuicTransport::join(host.local_addr()).expect("join host");
        poll_until(&mut client, |e| *e == TransportEvent::Connected(host_peer));
        drop(host);
        poll_until(&mut client, |e| *e == TransportEvent::Disconnected(host_peer));
    }
}

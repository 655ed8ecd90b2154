//! Peer-addressed transport abstraction and the QUIC endpoints behind it.
//!
//! The session layer only sees [`Transport`]: send bytes to a peer with a
//! delivery mode, and poll a bounded batch of events. Endpoints use
//! self-signed certificates; clients skip server verification.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use quinn::{ClientConfig, Endpoint, ServerConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use starhaven_core::PeerId;
use thiserror::Error;
use tracing::{debug, info};

use crate::ping::PingLocation;

/// ALPN protocol id.
pub const ALPN: &[u8] = b"starhaven";

/// Delivery mode of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Delivery {
    /// Ordered per peer and retransmitted until delivered.
    Reliable = 0,
    /// Best effort; may be dropped.
    Unreliable = 1,
}

impl TryFrom<u8> for Delivery {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Delivery::Reliable),
            1 => Ok(Delivery::Unreliable),
            _ => Err(anyhow::anyhow!("Invalid delivery mode: {}", value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(PeerId),
    Message {
        peer: PeerId,
        bytes: Vec<u8>,
        delivery: Delivery,
    },
    Disconnected(PeerId),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),
    #[error("message of {0} bytes exceeds the transport limit")]
    TooLarge(usize),
    #[error("transport closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Peer-identity-addressed messaging with reliable and unreliable delivery.
///
/// Implementations never block: `send` queues, `poll` returns what has
/// already arrived.
pub trait Transport {
    /// Identity of this endpoint.
    fn local_peer(&self) -> PeerId;

    fn send(&mut self, peer: PeerId, bytes: &[u8], delivery: Delivery) -> Result<(), TransportError>;

    /// Take at most `max` pending events.
    fn poll(&mut self, max: usize) -> Vec<TransportEvent>;

    /// This endpoint's current ping location.
    fn ping_location(&self) -> PingLocation;

    /// Drop the connection to a peer. Unknown peers are ignored.
    fn disconnect(&mut self, peer: PeerId);
}

/// Name certificates are issued for and clients connect with.
const SERVER_NAME: &str = "localhost";
const KEEP_ALIVE: Duration = Duration::from_secs(5);
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

fn install_crypto_provider() {
    // Fails only when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Keep-alive and idle settings shared by both ends, so a quiet client is
/// noticed by the host within `IDLE_TIMEOUT`.
fn session_transport_config() -> Result<Arc<quinn::TransportConfig>> {
    let mut config = quinn::TransportConfig::default();
    config.keep_alive_interval(Some(KEEP_ALIVE));
    config.max_idle_timeout(Some(IDLE_TIMEOUT.try_into().context("Idle timeout out of range")?));
    Ok(Arc::new(config))
}

/// Listening side of a QUIC session.
pub struct ServerEndpoint {
    endpoint: Endpoint,
    addr: SocketAddr,
}

impl ServerEndpoint {
    /// Bind with a freshly generated self-signed certificate. Must be called
    /// inside a tokio runtime.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        install_crypto_provider();
        let (cert, key) = self_signed_certificate()?;

        let mut tls = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert], key)
            .context("Failed to build rustls ServerConfig")?;
        tls.alpn_protocols = vec![ALPN.to_vec()];

        let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls).context("Failed to create QuicServerConfig")?;
        let mut config = ServerConfig::with_crypto(Arc::new(crypto));
        config.transport_config(session_transport_config()?);

        let endpoint = Endpoint::server(config, addr).with_context(|| format!("Failed to bind {addr}"))?;
        let addr = endpoint.local_addr()?;
        info!(%addr, "server endpoint bound");
        Ok(Self { endpoint, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Next incoming connection, or `None` once the endpoint is closed.
    pub async fn accept(&self) -> Option<quinn::Incoming> {
        self.endpoint.accept().await
    }

    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"host shutting down");
    }

    /// Wait until closed connections have told their peers, up to `grace`.
    pub async fn wait_idle(&self, grace: Duration) {
        if tokio::time::timeout(grace, self.endpoint.wait_idle()).await.is_err() {
            debug!("server endpoint still draining at shutdown");
        }
    }
}

/// Dialing side of a QUIC session. Accepts any server certificate.
pub struct ClientEndpoint {
    endpoint: Endpoint,
}

impl ClientEndpoint {
    /// Must be called inside a tokio runtime.
    pub fn new() -> Result<Self> {
        install_crypto_provider();

        let mut tls = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServer))
            .with_no_client_auth();
        tls.alpn_protocols = vec![ALPN.to_vec()];

        let crypto = quinn::crypto::rustls::QuicClientConfig::try_from(tls).context("Failed to create QuicClientConfig")?;
        let mut config = ClientConfig::new(Arc::new(crypto));
        config.transport_config(session_transport_config()?);

        let mut endpoint = Endpoint::client(SocketAddr::from(([0, 0, 0, 0], 0)))?;
        endpoint.set_default_client_config(config);
        debug!(addr = %endpoint.local_addr()?, "client endpoint created");
        Ok(Self { endpoint })
    }

    pub async fn connect(&self, host: SocketAddr) -> Result<quinn::Connection> {
        let connection = self
            .endpoint
            .connect(host, SERVER_NAME)
            .context("Failed to initiate connection")?
            .await
            .with_context(|| format!("Failed to establish connection to {host}"))?;
        info!(%host, "connected to host");
        Ok(connection)
    }

    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"client shutting down");
    }

    /// Wait until the close has reached the host, up to `grace`.
    pub async fn wait_idle(&self, grace: Duration) {
        if tokio::time::timeout(grace, self.endpoint.wait_idle()).await.is_err() {
            debug!("client endpoint still draining at shutdown");
        }
    }
}

fn self_signed_certificate() -> Result<(CertificateDer<'static>, PrivateKeyDer<'static>)> {
    let certified = rcgen::generate_simple_self_signed(vec![SERVER_NAME.to_string()])
        .context("Failed to generate certificate")?;
    let key = PrivateKeyDer::Pkcs8(certified.key_pair.serialize_der().into());
    Ok((CertificateDer::from(certified.cert), key))
}

/// Sessions are joined by address; there is no certificate authority to
/// check the host against.
#[derive(Debug)]
struct AcceptAnyServer;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServer {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_tags_roundtrip() {
        assert_eq!(Delivery::try_from(0).unwrap(), Delivery::Reliable);
        assert_eq!(Delivery::try_from(1).unwrap(), Delivery::Unreliable);
        assert!(Delivery::try_from(2).is_err());
    }

    #[tokio::test]
    async fn host_binds_an_ephemeral_port() {
        let server = ServerEndpoint::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        server.close();
    }

    #[tokio::test]
    async fn client_reaches_the_host() {
        let server = ServerEndpoint::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = server.local_addr();
        let accepted = tokio::spawn(async move { server.accept().await.expect("incoming").await.expect("handshake") });

        let client = ClientEndpoint::new().unwrap();
        let outbound = client.connect(addr).await.unwrap();
        let inbound = accepted.await.unwrap();

        assert_eq!(outbound.remote_address(), addr);
        assert_eq!(inbound.remote_address().port(), client.endpoint.local_addr().unwrap().port());
        outbound.close(0u32.into(), b"done");
    }
}

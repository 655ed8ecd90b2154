//! Message framing over a QUIC connection.
//!
//! Reliable messages share one long-lived unidirectional stream per
//! direction so that they arrive in send order. Each frame is
//! `[kind: u8][length: u32 LE][data]`. Unreliable messages are datagrams
//! prefixed with their kind byte.

use anyhow::{anyhow, bail, Context, Result};
use quinn::{Connection, RecvStream, SendStream};
use starhaven_core::PeerId;
use tracing::trace;

/// Largest frame accepted from a peer.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// First frame on every stream: the sender's peer id.
    Hello = 0,
    /// A packet envelope.
    Packet = 1,
}

impl TryFrom<u8> for FrameKind {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FrameKind::Hello),
            1 => Ok(FrameKind::Packet),
            _ => Err(anyhow!("Invalid frame kind: {}", value)),
        }
    }
}

/// Write one frame on a reliable stream.
pub async fn write_frame(stream: &mut SendStream, kind: FrameKind, data: &[u8]) -> Result<()> {
    if data.len() > MAX_FRAME_LEN {
        bail!("Frame of {} bytes exceeds limit", data.len());
    }
    let mut header = [0u8; 5];
    header[0] = kind as u8;
    header[1..].copy_from_slice(&(data.len() as u32).to_le_bytes());

    stream.write_all(&header).await.context("Failed to write frame header")?;
    stream.write_all(data).await.context("Failed to write frame data")?;

    trace!("Sent {} bytes on reliable stream ({:?})", data.len(), kind);
    Ok(())
}

/// Read the next frame from a reliable stream. Returns `None` when the
/// stream finished cleanly between frames.
pub async fn read_frame(stream: &mut RecvStream) -> Result<Option<(FrameKind, Vec<u8>)>> {
    let mut kind = [0u8; 1];
    match stream.read_exact(&mut kind).await {
        Ok(()) => {}
        Err(quinn::ReadExactError::FinishedEarly(0)) => return Ok(None),
        Err(err) => return Err(err).context("Failed to read frame kind"),
    }
    let kind = FrameKind::try_from(kind[0])?;

    let mut len = [0u8; 4];
    stream
        .read_exact(&mut len)
        .await
        .context("Failed to read frame length")?;
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        bail!("Frame of {} bytes exceeds limit", len);
    }

    let mut data = vec![0u8; len];
    stream
        .read_exact(&mut data)
        .await
        .context("Failed to read frame data")?;

    trace!("Received {} bytes on reliable stream ({:?})", data.len(), kind);
    Ok(Some((kind, data)))
}

/// Whether `len` bytes of payload fit in one datagram on this connection.
pub fn fits_datagram(connection: &Connection, len: usize) -> bool {
    connection
        .max_datagram_size()
        .is_some_and(|max| len + 1 <= max)
}

pub fn send_datagram(connection: &Connection, data: &[u8]) -> Result<()> {
    let mut datagram = Vec::with_capacity(1 + data.len());
    datagram.push(FrameKind::Packet as u8);
    datagram.extend_from_slice(data);
    connection
        .send_datagram(datagram.into())
        .context("Failed to send datagram")?;
    trace!("Sent {} bytes as datagram", data.len());
    Ok(())
}

pub async fn recv_datagram(connection: &Connection) -> Result<Vec<u8>> {
    let datagram = connection
        .read_datagram()
        .await
        .context("Failed to read datagram")?;
    let (&kind, data) = datagram
        .split_first()
        .ok_or_else(|| anyhow!("Received empty datagram"))?;
    if FrameKind::try_from(kind)? != FrameKind::Packet {
        bail!("Unexpected datagram kind {}", kind);
    }
    trace!("Received {} bytes as datagram", data.len());
    Ok(data.to_vec())
}

/// Exchange peer ids over freshly opened streams. Each side sends its hello
/// first, so neither waits on the other.
pub async fn exchange_hello(connection: &Connection, local: PeerId) -> Result<(PeerId, SendStream, RecvStream)> {
    let mut send = connection.open_uni().await.context("Failed to open stream")?;
    write_frame(&mut send, FrameKind::Hello, &local.0.to_le_bytes()).await?;

    let mut recv = connection.accept_uni().await.context("Failed to accept stream")?;
    let (kind, data) = read_frame(&mut recv)
        .await?
        .ok_or_else(|| anyhow!("Stream closed before hello"))?;
    if kind != FrameKind::Hello {
        bail!("Expected hello, got {:?}", kind);
    }
    let id: [u8; 8] = data
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("Hello has {} bytes, expected 8", data.len()))?;
    Ok((PeerId(u64::from_le_bytes(id)), send, recv))
}

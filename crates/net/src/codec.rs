//! Packet envelope encoding and the data hash compared at join time.
//!
//! Envelope format: `[packet_type: u8][payload: postcard bytes]`. Framing is
//! left to the transport.

use anyhow::{anyhow, Context, Result};
use starhaven_world::{object_signatures, tile_names};

use crate::protocol::{Packet, PacketType, PROTOCOL_MAGIC, PROTOCOL_VERSION};

/// Hash over the protocol version and the tile and object registries.
///
/// Peers built with different registries would disagree on what a tile or
/// object id means, so the host refuses joins whose hash differs.
pub fn compute_data_hash() -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&PROTOCOL_VERSION.to_le_bytes());
    hasher.update(PROTOCOL_MAGIC);

    for name in tile_names() {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    for (name, (w, h)) in object_signatures() {
        hasher.update(name.as_bytes());
        hasher.update(&[0, w, h]);
    }

    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Encode a packet into an envelope.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>> {
    let payload = packet
        .encode_payload()
        .with_context(|| format!("Failed to serialize {} payload", packet.packet_type().as_str()))?;

    let mut envelope = Vec::with_capacity(1 + payload.len());
    envelope.push(packet.packet_type() as u8);
    envelope.extend_from_slice(&payload);
    Ok(envelope)
}

/// Decode and validate an envelope.
///
/// Fails on unknown discriminants, undecodable or trailing payload bytes, and
/// payloads that do not pass [`Packet::verify`].
pub fn decode_packet(envelope: &[u8]) -> Result<Packet> {
    let (&tag, payload) = envelope
        .split_first()
        .ok_or_else(|| anyhow!("Empty envelope"))?;
    let packet_type = PacketType::try_from(tag)?;

    let (packet, rest) = Packet::decode_payload(packet_type, payload)
        .with_context(|| format!("Failed to deserialize {} payload", packet_type.as_str()))?;
    if !rest.is_empty() {
        return Err(anyhow!(
            "{} payload has {} trailing bytes",
            packet_type.as_str(),
            rest.len()
        ));
    }

    packet
        .verify()
        .map_err(|reason| anyhow!("{} rejected: {}", packet_type.as_str(), reason))?;
    Ok(packet)
}

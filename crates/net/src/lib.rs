//! Wire protocol and transports for starhaven sessions.
//!
//! [`protocol`] defines the packet catalogue, [`codec`] turns packets into
//! envelopes, and [`Transport`] moves envelopes between peers, either over
//! QUIC ([`QuicTransport`]) or in-process ([`LoopbackTransport`]).

mod channel;
mod codec;
mod compact;
mod loopback;
mod ping;
pub mod protocol;
mod quic;
mod transport;

pub use codec::{compute_data_hash, decode_packet, encode_packet};
pub use compact::{CharacterFlags, CompactFloat, CompactPosition, CompactTimer, CompactVec2, CompactVelocity};
pub use loopback::{LoopbackHub, LoopbackTransport};
pub use ping::{PingLocation, PingLocationError, MAX_COMPENSATION_SECONDS};
pub use protocol::{Packet, PacketType};
pub use quic::{QuicTransport, HOST_RELAY};
pub use transport::{ClientEndpoint, Delivery, ServerEndpoint, Transport, TransportError, TransportEvent, ALPN};

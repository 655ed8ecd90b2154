//! Protocol tunables.

use serde::{Deserialize, Serialize};
use starhaven_core::PlanetType;

/// Timing, batching and world-shape settings of a session.
///
/// Every field has a default, so a config file only needs to name what it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds between server ticks.
    pub server_update_tick: f32,
    /// Server ticks per cadence cycle.
    pub max_update_tick_count: u32,
    /// The tick of each cycle that also carries clock, entity, projectile and
    /// boss snapshots.
    pub non_player_update_tick: u32,
    /// Seconds before an unanswered chunk request may be sent again.
    pub chunk_request_timeout: f32,
    /// Debounce delay for player data sends.
    pub player_data_send_delay: f32,
    /// Seconds a client waits for a structure-enter reply before it may ask again.
    pub structure_enter_cooldown: f32,
    /// Chunk snapshots per `ChunkDatas` packet.
    pub max_chunks_per_packet: usize,
    /// Transport events taken per poll.
    pub receive_batch_size: usize,
    /// Chunks per side of every planet.
    pub world_size: u16,
    /// Planet new players spawn on. Numeric planet id.
    pub starting_planet: PlanetType,
    /// Chunk radius searched for a land spawn.
    pub spawn_water_search_radius: u16,
    /// Chunks kept loaded around each player in every direction.
    pub view_radius: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_update_tick: 0.05,
            max_update_tick_count: 4,
            non_player_update_tick: 0,
            chunk_request_timeout: 3.0,
            player_data_send_delay: 0.5,
            structure_enter_cooldown: 1.0,
            max_chunks_per_packet: 8,
            receive_batch_size: 64,
            world_size: 200,
            starting_planet: PlanetType::VERDANT,
            spawn_water_search_radius: 16,
            view_radius: 2,
        }
    }
}

impl SessionConfig {
    /// Chunk snapshots per packet, clamped to what a packet may carry.
    pub fn chunks_per_packet(&self) -> usize {
        self.max_chunks_per_packet
            .clamp(1, starhaven_net::protocol::MAX_CHUNK_DATAS_PER_PACKET)
    }
}

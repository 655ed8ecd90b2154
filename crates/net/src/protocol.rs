//! Packet discriminants and payload definitions.
//!
//! Every packet is a one-byte [`PacketType`] followed by a postcard-encoded
//! payload. Payloads are validated with [`Packet::verify`] before dispatch so
//! that oversized or inconsistent input never reaches world state.

use serde::{Deserialize, Serialize};
use starhaven_core::{ItemStack, LocationState, PeerId, PlanetType, PlayerData, RoomType, StructureId};
use starhaven_world::{
    chunk_pod_checksum, BossPod, BossType, ChestPod, ChunkPod, ChunkPosition, EntityPod, ItemPickupPod, LandmarkPod,
    ObjectReference, ObjectTypeId, ProjectilePod, RoomPod, TileCoord, TileId, WorldMapSnapshot, CHEST_SLOT_COUNT,
    CHUNK_TILE_COUNT,
};

use crate::compact::{CharacterFlags, CompactTimer, CompactVec2};
use crate::ping::MAX_PING_LOCATION_LEN;
use crate::transport::Delivery;

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u16 = 1;

/// Protocol magic bytes mixed into the data hash.
pub const PROTOCOL_MAGIC: &[u8; 8] = b"STRHVN\x00\x01";

/// Maximum length of a player name (bytes).
pub const MAX_NAME_LEN: usize = 32;

/// Maximum length of a chat message (bytes).
pub const MAX_CHAT_LEN: usize = 256;

/// Maximum length of a join failure reason (bytes).
pub const MAX_REASON_LEN: usize = 256;

/// Maximum chunk positions in one request packet.
pub const MAX_CHUNK_REQUESTS_PER_PACKET: usize = 64;

/// Maximum chunk snapshots in one data packet.
pub const MAX_CHUNK_DATAS_PER_PACKET: usize = 32;

/// Maximum chunk positions in one modified-alert packet.
pub const MAX_CHUNK_ALERTS_PER_PACKET: usize = 256;

/// Maximum pickups created or requested in one packet.
pub const MAX_PICKUPS_PER_PACKET: usize = 128;

/// Maximum pickups carried in one chunk snapshot.
pub const MAX_PICKUPS_PER_CHUNK: usize = 256;

/// Maximum chunks in one entity snapshot.
pub const MAX_ENTITY_CHUNKS_PER_PACKET: usize = 1024;

/// Maximum entities per chunk in an entity snapshot.
pub const MAX_ENTITIES_PER_CHUNK: usize = 16;

/// Maximum projectiles in one snapshot.
pub const MAX_PROJECTILES_PER_PACKET: usize = 512;

/// Maximum bosses in one snapshot.
pub const MAX_BOSSES_PER_PACKET: usize = 8;

/// Maximum peers listed in a join snapshot.
pub const MAX_PEERS_PER_PACKET: usize = 64;

/// Maximum landmarks in a join or travel snapshot.
pub const MAX_LANDMARKS_PER_PACKET: usize = 1024;

/// Maximum chunk positions in a world map snapshot.
pub const MAX_WORLD_MAP_CHUNKS: usize = 65_536;

/// Maximum inventory slots accepted in player data.
pub const MAX_INVENTORY_SLOTS: usize = 64;

/// Maximum cells in a transferred room.
pub const MAX_ROOM_CELLS: usize = 32 * 32;

fn verify_player_data(data: &PlayerData) -> Result<(), &'static str> {
    if data.name.len() > MAX_NAME_LEN {
        return Err("Player name too long");
    }
    if data.inventory.len() > MAX_INVENTORY_SLOTS {
        return Err("Too many inventory slots");
    }
    if !data.position.0.is_finite() || !data.position.1.is_finite() {
        return Err("Player position not finite");
    }
    Ok(())
}

fn verify_ping_location(ping_location: &str) -> Result<(), &'static str> {
    if ping_location.len() > MAX_PING_LOCATION_LEN {
        return Err("Ping location too long");
    }
    Ok(())
}

fn verify_chunk_pod(pod: &ChunkPod) -> Result<(), &'static str> {
    if pod.ground.len() != CHUNK_TILE_COUNT {
        return Err("Chunk ground grid has wrong size");
    }
    if pod.objects.len() > CHUNK_TILE_COUNT {
        return Err("Too many objects in chunk");
    }
    if pod.objects.iter().any(|(tile, _)| !tile.is_valid()) {
        return Err("Chunk object outside chunk");
    }
    if pod.item_pickups.len() > MAX_PICKUPS_PER_CHUNK {
        return Err("Too many item pickups in chunk");
    }
    Ok(())
}

fn verify_room_pod(room: &RoomPod) -> Result<(), &'static str> {
    let cells = room.size.0 as usize * room.size.1 as usize;
    if cells > MAX_ROOM_CELLS {
        return Err("Room too large");
    }
    if room.floor.len() != cells {
        return Err("Room floor has wrong size");
    }
    if room.objects.len() > cells {
        return Err("Too many objects in room");
    }
    Ok(())
}

/// Validation and routing metadata shared by every payload.
pub trait PacketPayload {
    /// Check limits and internal consistency.
    fn verify(&self) -> Result<(), &'static str> {
        Ok(())
    }

    /// The location whose world state this packet reads or mutates. Packets
    /// for a location the receiver has not initialised are dropped.
    fn world_location(&self) -> Option<LocationState> {
        None
    }
}

macro_rules! define_packets {
    ($($tag:literal => $variant:ident($payload:ident)),* $(,)?) => {
        /// Packet discriminant, the first byte of every envelope.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum PacketType {
            $($variant = $tag,)*
        }

        impl PacketType {
            pub const ALL: &'static [PacketType] = &[$(PacketType::$variant,)*];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $(PacketType::$variant => stringify!($variant),)*
                }
            }
        }

        impl TryFrom<u8> for PacketType {
            type Error = anyhow::Error;

            fn try_from(value: u8) -> anyhow::Result<Self> {
                match value {
                    $($tag => Ok(PacketType::$variant),)*
                    _ => Err(anyhow::anyhow!("Invalid packet type: {}", value)),
                }
            }
        }

        /// A decoded packet.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Packet {
            $($variant($payload),)*
        }

        impl Packet {
            pub fn packet_type(&self) -> PacketType {
                match self {
                    $(Packet::$variant(_) => PacketType::$variant,)*
                }
            }

            pub fn verify(&self) -> Result<(), &'static str> {
                match self {
                    $(Packet::$variant(payload) => payload.verify(),)*
                }
            }

            pub fn world_location(&self) -> Option<LocationState> {
                match self {
                    $(Packet::$variant(payload) => payload.world_location(),)*
                }
            }

            pub(crate) fn encode_payload(&self) -> postcard::Result<Vec<u8>> {
                match self {
                    $(Packet::$variant(payload) => postcard::to_allocvec(payload),)*
                }
            }

            pub(crate) fn decode_payload(packet_type: PacketType, bytes: &[u8]) -> postcard::Result<(Self, &[u8])> {
                match packet_type {
                    $(PacketType::$variant => postcard::take_from_bytes::<$payload>(bytes)
                        .map(|(payload, rest)| (Packet::$variant(payload), rest)),)*
                }
            }
        }

        $(
            impl From<$payload> for Packet {
                fn from(payload: $payload) -> Self {
                    Packet::$variant(payload)
                }
            }
        )*
    };
}

define_packets! {
    0 => JoinQuery(JoinQueryPacket),
    1 => JoinReply(JoinReplyPacket),
    2 => JoinInfo(JoinInfoPacket),
    3 => JoinFailed(JoinFailedPacket),
    4 => PlayerData(PlayerDataPacket),
    5 => PlayerDisconnected(PlayerDisconnectedPacket),
    6 => PlayerCharacterInfo(PlayerCharacterInfoPacket),
    7 => ServerInfo(ServerInfoPacket),
    8 => ChatMessage(ChatMessagePacket),
    9 => ObjectBuilt(ObjectBuiltPacket),
    10 => ObjectHit(ObjectHitPacket),
    11 => ObjectDestroyed(ObjectDestroyedPacket),
    12 => LandPlaced(LandPlacedPacket),
    13 => ItemPickupsCreateRequest(ItemPickupsCreateRequestPacket),
    14 => ItemPickupsCreated(ItemPickupsCreatedPacket),
    15 => ItemPickupCollected(ItemPickupCollectedPacket),
    16 => InventoryAddItem(InventoryAddItemPacket),
    17 => ChunkRequests(ChunkRequestsPacket),
    18 => ChunkDatas(ChunkDatasPacket),
    19 => ChunkModifiedAlerts(ChunkModifiedAlertsPacket),
    20 => Entities(EntitiesPacket),
    21 => Projectiles(ProjectilesPacket),
    22 => Bosses(BossesPacket),
    23 => ProjectileCreateRequest(ProjectileCreateRequestPacket),
    24 => BossSpawnRequest(BossSpawnRequestPacket),
    25 => PlanetTravelRequest(PlanetTravelRequestPacket),
    26 => PlanetTravelReply(PlanetTravelReplyPacket),
    27 => RoomTravelRequest(RoomTravelRequestPacket),
    28 => RoomTravelReply(RoomTravelReplyPacket),
    29 => StructureEnterRequest(StructureEnterRequestPacket),
    30 => StructureEnterReply(StructureEnterReplyPacket),
    31 => RocketEnterRequest(RocketEnterRequestPacket),
    32 => RocketInteraction(RocketInteractionPacket),
    33 => ChestOpened(ChestOpenedPacket),
    34 => ChestClosed(ChestClosedPacket),
    35 => ChestDataModified(ChestDataModifiedPacket),
    36 => LandmarkModified(LandmarkModifiedPacket),
}

impl PacketType {
    /// Per-tick snapshots tolerate loss because each one fully replaces the
    /// last; everything else must arrive.
    pub fn delivery(self) -> Delivery {
        match self {
            PacketType::PlayerCharacterInfo
            | PacketType::ServerInfo
            | PacketType::Entities
            | PacketType::Projectiles
            | PacketType::Bosses => Delivery::Unreliable,
            _ => Delivery::Reliable,
        }
    }
}

// ---------------------------------------------------------------------------
// Lobby handshake

/// Host → joining client, sent as soon as the connection is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinQueryPacket {
    pub protocol_version: u16,
    pub data_hash: u64,
}

impl PacketPayload for JoinQueryPacket {}

/// Joining client → host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinReplyPacket {
    pub protocol_version: u16,
    pub data_hash: u64,
    pub name: String,
    /// The client's own copy of its player data, if it has played here.
    pub player_data: Option<PlayerData>,
}

impl PacketPayload for JoinReplyPacket {
    fn verify(&self) -> Result<(), &'static str> {
        if self.name.len() > MAX_NAME_LEN {
            return Err("Player name too long");
        }
        if let Some(data) = &self.player_data {
            verify_player_data(data)?;
        }
        Ok(())
    }
}

/// Host → joining client: everything needed to enter the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinInfoPacket {
    pub seed: u64,
    pub world_size: u16,
    pub game_time: f64,
    pub ping_location: String,
    /// The joining player's resolved data, including spawn position.
    pub player_data: PlayerData,
    /// Every other peer in the session, host included.
    pub peers: Vec<(PeerId, PlayerData)>,
    /// Present when the joining player is on a planet surface.
    pub landmarks: Option<Vec<LandmarkPod>>,
    pub world_map: Option<WorldMapSnapshot>,
    /// Present when the joining player is inside a room or structure.
    pub room: Option<RoomPod>,
}

impl PacketPayload for JoinInfoPacket {
    fn verify(&self) -> Result<(), &'static str> {
        verify_ping_location(&self.ping_location)?;
        verify_player_data(&self.player_data)?;
        if self.world_size == 0 {
            return Err("World size must be non-zero");
        }
        if self.peers.len() > MAX_PEERS_PER_PACKET {
            return Err("Too many peers");
        }
        for (_, data) in &self.peers {
            verify_player_data(data)?;
        }
        if self.landmarks.as_ref().is_some_and(|l| l.len() > MAX_LANDMARKS_PER_PACKET) {
            return Err("Too many landmarks");
        }
        if self.world_map.as_ref().is_some_and(|m| m.chunks.len() > MAX_WORLD_MAP_CHUNKS) {
            return Err("World map too large");
        }
        if let Some(room) = &self.room {
            verify_room_pod(room)?;
        }
        Ok(())
    }
}

/// Host → joining client when the join is refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinFailedPacket {
    pub reason: String,
}

impl PacketPayload for JoinFailedPacket {
    fn verify(&self) -> Result<(), &'static str> {
        if self.reason.len() > MAX_REASON_LEN {
            return Err("Join failure reason too long");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Players

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDataPacket {
    /// Whose data this is. The host overwrites it with the sender on receipt.
    pub peer: PeerId,
    pub data: PlayerData,
}

impl PacketPayload for PlayerDataPacket {
    fn verify(&self) -> Result<(), &'static str> {
        verify_player_data(&self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDisconnectedPacket {
    pub peer: PeerId,
}

impl PacketPayload for PlayerDisconnectedPacket {}

/// Per-tick character state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerCharacterInfoPacket {
    pub peer: PeerId,
    pub location: LocationState,
    pub position: CompactVec2<4, 2>,
    pub velocity: CompactVec2<2, 1>,
    pub animation_time: CompactTimer,
    pub flags: CharacterFlags,
    pub ping_location: String,
}

impl PacketPayload for PlayerCharacterInfoPacket {
    fn verify(&self) -> Result<(), &'static str> {
        verify_ping_location(&self.ping_location)
    }
}

/// Host → clients: authoritative game clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfoPacket {
    pub game_time: f64,
    pub ping_location: String,
}

impl PacketPayload for ServerInfoPacket {
    fn verify(&self) -> Result<(), &'static str> {
        if !self.game_time.is_finite() {
            return Err("Game time not finite");
        }
        verify_ping_location(&self.ping_location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessagePacket {
    /// The host overwrites this with the sender on receipt.
    pub sender: PeerId,
    pub name: String,
    pub text: String,
}

impl PacketPayload for ChatMessagePacket {
    fn verify(&self) -> Result<(), &'static str> {
        if self.name.len() > MAX_NAME_LEN {
            return Err("Chat sender name too long");
        }
        if self.text.len() > MAX_CHAT_LEN {
            return Err("Chat message too long");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// World mutation

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectBuiltPacket {
    pub location: LocationState,
    pub reference: ObjectReference,
    pub object_type: ObjectTypeId,
}

impl PacketPayload for ObjectBuiltPacket {
    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHitPacket {
    pub location: LocationState,
    pub reference: ObjectReference,
    pub damage: u16,
}

impl PacketPayload for ObjectHitPacket {
    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDestroyedPacket {
    pub location: LocationState,
    pub reference: ObjectReference,
}

impl PacketPayload for ObjectDestroyedPacket {
    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandPlacedPacket {
    pub location: LocationState,
    pub chunk: ChunkPosition,
    pub tile: TileCoord,
    pub land: TileId,
}

impl PacketPayload for LandPlacedPacket {
    fn verify(&self) -> Result<(), &'static str> {
        if !self.tile.is_valid() {
            return Err("Land tile outside chunk");
        }
        Ok(())
    }

    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

/// One pickup a client asks the host to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPickupRequest {
    pub chunk: ChunkPosition,
    /// Offset from the chunk's world origin in pixels.
    pub relative_position: (f32, f32),
    pub item: ItemStack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPickupsCreateRequestPacket {
    pub location: LocationState,
    pub requests: Vec<ItemPickupRequest>,
}

impl PacketPayload for ItemPickupsCreateRequestPacket {
    fn verify(&self) -> Result<(), &'static str> {
        if self.requests.len() > MAX_PICKUPS_PER_PACKET {
            return Err("Too many pickup requests");
        }
        if self.requests.iter().any(|r| r.item.count == 0) {
            return Err("Empty pickup request");
        }
        Ok(())
    }

    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedPickup {
    pub chunk: ChunkPosition,
    /// Position is chunk-relative.
    pub pickup: ItemPickupPod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPickupsCreatedPacket {
    pub location: LocationState,
    pub pickups: Vec<CreatedPickup>,
}

impl PacketPayload for ItemPickupsCreatedPacket {
    fn verify(&self) -> Result<(), &'static str> {
        if self.pickups.len() > MAX_PICKUPS_PER_PACKET {
            return Err("Too many created pickups");
        }
        Ok(())
    }

    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

/// Client → host: "I picked this up". Host → others: "it is gone".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPickupCollectedPacket {
    pub location: LocationState,
    pub chunk: ChunkPosition,
    pub id: u64,
}

impl PacketPayload for ItemPickupCollectedPacket {
    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

/// Host → the collecting client only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAddItemPacket {
    pub item: ItemStack,
}

impl PacketPayload for InventoryAddItemPacket {}

// ---------------------------------------------------------------------------
// Chunk streaming

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRequestsPacket {
    pub location: LocationState,
    pub chunks: Vec<ChunkPosition>,
}

impl PacketPayload for ChunkRequestsPacket {
    fn verify(&self) -> Result<(), &'static str> {
        if self.chunks.len() > MAX_CHUNK_REQUESTS_PER_PACKET {
            return Err("Too many chunk requests");
        }
        Ok(())
    }

    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

/// One chunk snapshot with its integrity checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkData {
    pub position: ChunkPosition,
    pub pod: ChunkPod,
    pub checksum: u32,
}

impl ChunkData {
    pub fn new(position: ChunkPosition, pod: ChunkPod) -> Self {
        let checksum = chunk_pod_checksum(&pod);
        Self { position, pod, checksum }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDatasPacket {
    pub location: LocationState,
    pub chunks: Vec<ChunkData>,
}

impl PacketPayload for ChunkDatasPacket {
    fn verify(&self) -> Result<(), &'static str> {
        if self.chunks.len() > MAX_CHUNK_DATAS_PER_PACKET {
            return Err("Too many chunks in data packet");
        }
        for chunk in &self.chunks {
            verify_chunk_pod(&chunk.pod)?;
            if chunk_pod_checksum(&chunk.pod) != chunk.checksum {
                return Err("Chunk checksum mismatch");
            }
        }
        Ok(())
    }

    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkModifiedAlertsPacket {
    pub location: LocationState,
    pub chunks: Vec<ChunkPosition>,
}

impl PacketPayload for ChunkModifiedAlertsPacket {
    fn verify(&self) -> Result<(), &'static str> {
        if self.chunks.len() > MAX_CHUNK_ALERTS_PER_PACKET {
            return Err("Too many chunk alerts");
        }
        Ok(())
    }

    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

// ---------------------------------------------------------------------------
// Fast-state mirrors

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitiesPacket {
    pub location: LocationState,
    pub chunks: Vec<(ChunkPosition, Vec<EntityPod>)>,
    pub ping_location: String,
}

impl PacketPayload for EntitiesPacket {
    fn verify(&self) -> Result<(), &'static str> {
        verify_ping_location(&self.ping_location)?;
        if self.chunks.len() > MAX_ENTITY_CHUNKS_PER_PACKET {
            return Err("Too many entity chunks");
        }
        if self.chunks.iter().any(|(_, e)| e.len() > MAX_ENTITIES_PER_CHUNK) {
            return Err("Too many entities in chunk");
        }
        Ok(())
    }

    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectilesPacket {
    pub location: LocationState,
    pub projectiles: Vec<ProjectilePod>,
    pub ping_location: String,
}

impl PacketPayload for ProjectilesPacket {
    fn verify(&self) -> Result<(), &'static str> {
        verify_ping_location(&self.ping_location)?;
        if self.projectiles.len() > MAX_PROJECTILES_PER_PACKET {
            return Err("Too many projectiles");
        }
        Ok(())
    }

    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossesPacket {
    pub location: LocationState,
    pub bosses: Vec<BossPod>,
    pub ping_location: String,
}

impl PacketPayload for BossesPacket {
    fn verify(&self) -> Result<(), &'static str> {
        verify_ping_location(&self.ping_location)?;
        if self.bosses.len() > MAX_BOSSES_PER_PACKET {
            return Err("Too many bosses");
        }
        Ok(())
    }

    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileCreateRequestPacket {
    pub location: LocationState,
    pub projectile: ProjectilePod,
}

impl PacketPayload for ProjectileCreateRequestPacket {
    fn verify(&self) -> Result<(), &'static str> {
        let p = &self.projectile;
        let finite = [p.position.0, p.position.1, p.velocity.0, p.velocity.1, p.lifetime, p.damage]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err("Projectile fields not finite");
        }
        Ok(())
    }

    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossSpawnRequestPacket {
    pub location: LocationState,
    pub boss_type: BossType,
    pub position: (f32, f32),
}

impl PacketPayload for BossSpawnRequestPacket {
    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

// ---------------------------------------------------------------------------
// Cross-world transitions

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanetTravelRequestPacket {
    pub planet: PlanetType,
}

impl PacketPayload for PlanetTravelRequestPacket {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanetTravelReplyPacket {
    pub location: LocationState,
    pub position: (f32, f32),
    pub landmarks: Vec<LandmarkPod>,
    pub world_map: WorldMapSnapshot,
}

impl PacketPayload for PlanetTravelReplyPacket {
    fn verify(&self) -> Result<(), &'static str> {
        if self.landmarks.len() > MAX_LANDMARKS_PER_PACKET {
            return Err("Too many landmarks");
        }
        if self.world_map.chunks.len() > MAX_WORLD_MAP_CHUNKS {
            return Err("World map too large");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTravelRequestPacket {
    pub room: RoomType,
}

impl PacketPayload for RoomTravelRequestPacket {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomTravelReplyPacket {
    pub location: LocationState,
    pub position: (f32, f32),
    pub room: RoomPod,
}

impl PacketPayload for RoomTravelReplyPacket {
    fn verify(&self) -> Result<(), &'static str> {
        verify_room_pod(&self.room)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureEnterRequestPacket {
    pub planet: PlanetType,
    pub chunk: ChunkPosition,
}

impl PacketPayload for StructureEnterRequestPacket {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureEntry {
    pub structure: StructureId,
    pub room: RoomPod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureEnterReplyPacket {
    pub planet: PlanetType,
    pub chunk: ChunkPosition,
    /// `None` when the chunk holds no structure on the host.
    pub entered: Option<StructureEntry>,
}

impl PacketPayload for StructureEnterReplyPacket {
    fn verify(&self) -> Result<(), &'static str> {
        match &self.entered {
            Some(entry) => verify_room_pod(&entry.room),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RocketEnterRequestPacket {
    pub location: LocationState,
    pub reference: ObjectReference,
}

impl PacketPayload for RocketEnterRequestPacket {
    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RocketInteractionPacket {
    pub location: LocationState,
    pub reference: ObjectReference,
    pub occupant: Option<PeerId>,
}

impl PacketPayload for RocketInteractionPacket {
    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

// ---------------------------------------------------------------------------
// Chests and landmarks

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChestOpenedPacket {
    pub location: LocationState,
    pub reference: ObjectReference,
    /// `None` from a client opening a chest for the first time; the host
    /// allocates the id.
    pub chest_id: Option<u16>,
    pub peer: PeerId,
}

impl PacketPayload for ChestOpenedPacket {
    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChestClosedPacket {
    pub chest_id: u16,
    pub peer: PeerId,
}

impl PacketPayload for ChestClosedPacket {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChestDataModifiedPacket {
    pub chest: ChestPod,
}

impl PacketPayload for ChestDataModifiedPacket {
    fn verify(&self) -> Result<(), &'static str> {
        if self.chest.slots.len() > CHEST_SLOT_COUNT {
            return Err("Too many chest slots");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandmarkModifiedPacket {
    pub location: LocationState,
    pub landmark: LandmarkPod,
}

impl PacketPayload for LandmarkModifiedPacket {
    fn world_location(&self) -> Option<LocationState> {
        Some(self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starhaven_core::ItemType;

    #[test]
    fn discriminants_roundtrip() {
        for packet_type in PacketType::ALL {
            assert_eq!(PacketType::try_from(*packet_type as u8).unwrap(), *packet_type);
        }
        assert!(PacketType::try_from(PacketType::ALL.len() as u8).is_err());
        assert_eq!(PacketType::ChunkDatas.as_str(), "ChunkDatas");
    }

    #[test]
    fn snapshots_are_unreliable() {
        assert_eq!(PacketType::Entities.delivery(), Delivery::Unreliable);
        assert_eq!(PacketType::PlayerCharacterInfo.delivery(), Delivery::Unreliable);
        assert_eq!(PacketType::ChunkDatas.delivery(), Delivery::Reliable);
        assert_eq!(PacketType::ObjectDestroyed.delivery(), Delivery::Reliable);
    }

    #[test]
    fn verify_rejects_oversized_requests() {
        let location = LocationState::default();
        let ok = Packet::from(ChunkRequestsPacket {
            location,
            chunks: vec![ChunkPosition::new(0, 0); MAX_CHUNK_REQUESTS_PER_PACKET],
        });
        assert!(ok.verify().is_ok());
        let too_many = Packet::from(ChunkRequestsPacket {
            location,
            chunks: vec![ChunkPosition::new(0, 0); MAX_CHUNK_REQUESTS_PER_PACKET + 1],
        });
        assert_eq!(too_many.verify(), Err("Too many chunk requests"));
    }

    #[test]
    fn verify_checks_chunk_checksum() {
        let mut data = ChunkData::new(ChunkPosition::new(1, 2), ChunkPod::default());
        let packet = ChunkDatasPacket {
            location: LocationState::default(),
            chunks: vec![data.clone()],
        };
        assert!(packet.verify().is_ok());
        data.checksum ^= 1;
        let tampered = ChunkDatasPacket {
            location: LocationState::default(),
            chunks: vec![data],
        };
        assert_eq!(tampered.verify(), Err("Chunk checksum mismatch"));
    }

    #[test]
    fn verify_rejects_empty_pickups_and_long_chat() {
        let request = ItemPickupsCreateRequestPacket {
            location: LocationState::default(),
            requests: vec![ItemPickupRequest {
                chunk: ChunkPosition::new(0, 0),
                relative_position: (1.0, 1.0),
                item: ItemStack::new(ItemType::WOOD, 0),
            }],
        };
        assert!(request.verify().is_err());
        let chat = ChatMessagePacket {
            sender: PeerId(1),
            name: "a".into(),
            text: "x".repeat(MAX_CHAT_LEN + 1),
        };
        assert!(chat.verify().is_err());
    }

    #[test]
    fn only_world_packets_carry_a_world_location() {
        let location = LocationState::default();
        let alerts = Packet::from(ChunkModifiedAlertsPacket {
            location,
            chunks: Vec::new(),
        });
        assert_eq!(alerts.world_location(), Some(location));
        let travel = Packet::from(PlanetTravelRequestPacket {
            planet: PlanetType::DUNE,
        });
        assert_eq!(travel.world_location(), None);
    }
}

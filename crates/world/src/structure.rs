//! Enterable structures placed on planet chunks by the generator.

use serde::{Deserialize, Serialize};
use starhaven_core::StructureId;

use crate::position::TileCoord;

/// Structure type identifier referencing the static registry.
pub type StructureTypeId = u16;

pub const STRUCTURE_HUT: StructureTypeId = 0;
pub const STRUCTURE_RUIN: StructureTypeId = 1;

/// Static properties of a structure type.
#[derive(Debug, Clone, Copy)]
pub struct StructureData {
    pub name: &'static str,
    /// Interior room size in tiles.
    pub room_size: (u8, u8),
    /// Chance per generated chunk, in 1/1000ths.
    pub spawn_permille: u16,
}

const STRUCTURE_DATA: &[StructureData] = &[
    StructureData {
        name: "hut",
        room_size: (6, 5),
        spawn_permille: 12,
    },
    StructureData {
        name: "ruin",
        room_size: (8, 6),
        spawn_permille: 5,
    },
];

pub fn structure_data(structure_type: StructureTypeId) -> Option<&'static StructureData> {
    STRUCTURE_DATA.get(structure_type as usize)
}

pub fn structure_count() -> usize {
    STRUCTURE_DATA.len()
}

/// A structure entrance living in a chunk.
///
/// The interior id is allocated by the host the first time anyone enters, after
/// which the owning chunk is modified and clients are told to re-request it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureObject {
    pub structure_type: StructureTypeId,
    pub entrance: TileCoord,
    pub structure_id: Option<StructureId>,
}

impl StructureObject {
    pub fn new(structure_type: StructureTypeId, entrance: TileCoord) -> Self {
        Self {
            structure_type,
            entrance,
            structure_id: None,
        }
    }

    pub fn data(&self) -> Option<&'static StructureData> {
        structure_data(self.structure_type)
    }

    pub fn to_pod(&self) -> StructurePod {
        StructurePod {
            structure_type: self.structure_type,
            entrance: self.entrance,
            structure_id: self.structure_id.map(|id| id.0),
        }
    }

    pub fn from_pod(pod: &StructurePod) -> Self {
        Self {
            structure_type: pod.structure_type,
            entrance: pod.entrance,
            structure_id: pod.structure_id.map(StructureId),
        }
    }
}

/// Flattened structure entrance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructurePod {
    pub structure_type: StructureTypeId,
    pub entrance: TileCoord,
    pub structure_id: Option<u32>,
}

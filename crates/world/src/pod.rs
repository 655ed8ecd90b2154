//! Versioned plain snapshots ("PODs") of objects and chunks.
//!
//! Network payloads carry the current shapes directly. Persisted bytes start
//! with a little-endian `u16` version followed by the bincode body of that
//! version's layout; decoding upgrades older layouts to the current one.

use serde::{Deserialize, Serialize};
use starhaven_core::ItemStack;

use crate::position::{TileCoord, CHUNK_TILE_COUNT};
use crate::structure::StructurePod;
use crate::tiles::{TileId, TILE_WATER};

/// Current persisted version of [`BuildableObjectPod`].
pub const OBJECT_POD_VERSION: u16 = 3;
/// Current persisted version of [`ChunkPod`].
pub const CHUNK_POD_VERSION: u16 = 2;

/// Errors raised while decoding persisted snapshots.
#[derive(Debug, thiserror::Error)]
pub enum PodError {
    #[error("snapshot truncated before version header")]
    MissingVersion,
    #[error("unknown {kind} snapshot version {version}")]
    UnknownVersion { kind: &'static str, version: u16 },
    #[error("{kind} snapshot codec error: {source}")]
    Codec {
        kind: &'static str,
        #[source]
        source: bincode::Error,
    },
    #[error("chunk snapshot has {0} ground tiles")]
    BadGroundLength(usize),
}

/// Flattened built object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BuildableObjectPod {
    pub object_type: u16,
    pub health: u16,
    pub chest_id: Option<u16>,
    pub plant_stage: u8,
    pub growth_timer: f32,
    pub landmark_colours: Option<([u8; 3], [u8; 3])>,
}

#[derive(Serialize, Deserialize)]
struct ObjectPodV1 {
    object_type: u16,
    health: u16,
}

#[derive(Serialize, Deserialize)]
struct ObjectPodV2 {
    object_type: u16,
    health: u16,
    chest_id: Option<u16>,
    plant_stage: u8,
    growth_timer: f32,
}

#[derive(Serialize, Deserialize)]
struct ObjectPodV3 {
    object_type: u16,
    health: u16,
    chest_id: Option<u16>,
    plant_stage: u8,
    growth_timer: f32,
    landmark_colours: Option<([u8; 3], [u8; 3])>,
}

impl From<ObjectPodV1> for BuildableObjectPod {
    fn from(v1: ObjectPodV1) -> Self {
        Self {
            object_type: v1.object_type,
            health: v1.health,
            ..Self::default()
        }
    }
}

impl From<ObjectPodV2> for BuildableObjectPod {
    fn from(v2: ObjectPodV2) -> Self {
        Self {
            object_type: v2.object_type,
            health: v2.health,
            chest_id: v2.chest_id,
            plant_stage: v2.plant_stage,
            growth_timer: v2.growth_timer,
            landmark_colours: None,
        }
    }
}

impl From<ObjectPodV3> for BuildableObjectPod {
    fn from(v3: ObjectPodV3) -> Self {
        Self {
            object_type: v3.object_type,
            health: v3.health,
            chest_id: v3.chest_id,
            plant_stage: v3.plant_stage,
            growth_timer: v3.growth_timer,
            landmark_colours: v3.landmark_colours,
        }
    }
}

impl BuildableObjectPod {
    fn to_current(&self) -> ObjectPodV3 {
        ObjectPodV3 {
            object_type: self.object_type,
            health: self.health,
            chest_id: self.chest_id,
            plant_stage: self.plant_stage,
            growth_timer: self.growth_timer,
            landmark_colours: self.landmark_colours,
        }
    }
}

/// Item pickup with its position relative to the owning chunk's origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPickupPod {
    pub id: u64,
    pub item: ItemStack,
    pub relative_position: (f32, f32),
}

/// Flattened chunk as sent over the network and persisted.
///
/// Objects are listed by origin tile only; reference cells are rebuilt from
/// each object's footprint on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPod {
    pub ground: Vec<TileId>,
    pub objects: Vec<(TileCoord, BuildableObjectPod)>,
    pub structure: Option<StructurePod>,
    pub item_pickups: Vec<ItemPickupPod>,
}

impl Default for ChunkPod {
    fn default() -> Self {
        Self {
            ground: vec![TILE_WATER; CHUNK_TILE_COUNT],
            objects: Vec::new(),
            structure: None,
            item_pickups: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ChunkPodV1 {
    ground: Vec<TileId>,
    objects: Vec<(TileCoord, Vec<u8>)>,
}

#[derive(Serialize, Deserialize)]
struct ChunkPodV2 {
    ground: Vec<TileId>,
    objects: Vec<(TileCoord, Vec<u8>)>,
    structure: Option<StructurePod>,
    item_pickups: Vec<ItemPickupPod>,
}

fn split_version(bytes: &[u8]) -> Result<(u16, &[u8]), PodError> {
    if bytes.len() < 2 {
        return Err(PodError::MissingVersion);
    }
    let version = u16::from_le_bytes([bytes[0], bytes[1]]);
    Ok((version, &bytes[2..]))
}

fn with_version<T: Serialize>(version: u16, body: &T, kind: &'static str) -> Result<Vec<u8>, PodError> {
    let mut bytes = version.to_le_bytes().to_vec();
    let encoded = bincode::serialize(body).map_err(|source| PodError::Codec { kind, source })?;
    bytes.extend_from_slice(&encoded);
    Ok(bytes)
}

fn decode_body<'a, T: Deserialize<'a>>(body: &'a [u8], kind: &'static str) -> Result<T, PodError> {
    bincode::deserialize(body).map_err(|source| PodError::Codec { kind, source })
}

/// Encode an object snapshot at the current version.
pub fn encode_object_pod(pod: &BuildableObjectPod) -> Result<Vec<u8>, PodError> {
    with_version(OBJECT_POD_VERSION, &pod.to_current(), "object")
}

/// Decode an object snapshot of any known version.
pub fn decode_object_pod(bytes: &[u8]) -> Result<BuildableObjectPod, PodError> {
    let (version, body) = split_version(bytes)?;
    match version {
        1 => decode_body::<ObjectPodV1>(body, "object").map(Into::into),
        2 => decode_body::<ObjectPodV2>(body, "object").map(Into::into),
        3 => decode_body::<ObjectPodV3>(body, "object").map(Into::into),
        _ => Err(PodError::UnknownVersion {
            kind: "object",
            version,
        }),
    }
}

/// Encode a chunk snapshot at the current version. Objects are nested as
/// their own versioned blobs so that each can evolve independently.
pub fn encode_chunk_pod(pod: &ChunkPod) -> Result<Vec<u8>, PodError> {
    let objects = pod
        .objects
        .iter()
        .map(|(tile, object)| Ok((*tile, encode_object_pod(object)?)))
        .collect::<Result<Vec<_>, PodError>>()?;
    let body = ChunkPodV2 {
        ground: pod.ground.clone(),
        objects,
        structure: pod.structure.clone(),
        item_pickups: pod.item_pickups.clone(),
    };
    with_version(CHUNK_POD_VERSION, &body, "chunk")
}

/// Decode a chunk snapshot of any known version.
pub fn decode_chunk_pod(bytes: &[u8]) -> Result<ChunkPod, PodError> {
    let (version, body) = split_version(bytes)?;
    let (ground, objects, structure, item_pickups) = match version {
        1 => {
            let v1: ChunkPodV1 = decode_body(body, "chunk")?;
            (v1.ground, v1.objects, None, Vec::new())
        }
        2 => {
            let v2: ChunkPodV2 = decode_body(body, "chunk")?;
            (v2.ground, v2.objects, v2.structure, v2.item_pickups)
        }
        _ => {
            return Err(PodError::UnknownVersion {
                kind: "chunk",
                version,
            })
        }
    };
    if ground.len() != CHUNK_TILE_COUNT {
        return Err(PodError::BadGroundLength(ground.len()));
    }
    let objects = objects
        .into_iter()
        .map(|(tile, blob)| Ok((tile, decode_object_pod(&blob)?)))
        .collect::<Result<Vec<_>, PodError>>()?;
    Ok(ChunkPod {
        ground,
        objects,
        structure,
        item_pickups,
    })
}

/// CRC32 over the persisted encoding, carried alongside chunk payloads.
pub fn chunk_pod_checksum(pod: &ChunkPod) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    match encode_chunk_pod(pod) {
        Ok(bytes) => hasher.update(&bytes),
        Err(_) => hasher.update(&[]),
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use starhaven_core::ItemType;

    #[test]
    fn v1_object_upgrades_with_defaults() {
        let v1 = ObjectPodV1 {
            object_type: 5,
            health: 3,
        };
        let bytes = with_version(1, &v1, "object").unwrap();
        let pod = decode_object_pod(&bytes).unwrap();
        assert_eq!(pod.object_type, 5);
        assert_eq!(pod.health, 3);
        assert_eq!(pod.landmark_colours, None);
        assert_eq!(pod.chest_id, None);
    }

    #[test]
    fn v2_object_has_no_landmark_colours() {
        let v2 = ObjectPodV2 {
            object_type: 3,
            health: 4,
            chest_id: Some(9),
            plant_stage: 0,
            growth_timer: 0.0,
        };
        let bytes = with_version(2, &v2, "object").unwrap();
        let pod = decode_object_pod(&bytes).unwrap();
        assert_eq!(pod.chest_id, Some(9));
        assert!(pod.landmark_colours.is_none());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let bytes = [9u8, 0, 1, 2];
        assert!(matches!(
            decode_object_pod(&bytes),
            Err(PodError::UnknownVersion { version: 9, .. })
        ));
        assert!(matches!(decode_object_pod(&[1]), Err(PodError::MissingVersion)));
    }

    #[test]
    fn v1_chunk_upgrades_without_pickups() {
        let object = encode_object_pod(&BuildableObjectPod {
            object_type: 0,
            health: 5,
            ..Default::default()
        })
        .unwrap();
        let v1 = ChunkPodV1 {
            ground: vec![2; CHUNK_TILE_COUNT],
            objects: vec![(TileCoord::new(1, 1), object)],
        };
        let bytes = with_version(1, &v1, "chunk").unwrap();
        let pod = decode_chunk_pod(&bytes).unwrap();
        assert_eq!(pod.objects.len(), 1);
        assert!(pod.item_pickups.is_empty());
        assert!(pod.structure.is_none());
    }

    #[test]
    fn checksum_changes_with_content() {
        let mut pod = ChunkPod::default();
        let before = chunk_pod_checksum(&pod);
        pod.item_pickups.push(ItemPickupPod {
            id: 0,
            item: ItemStack::new(ItemType::WOOD, 1),
            relative_position: (4.0, 4.0),
        });
        assert_ne!(before, chunk_pod_checksum(&pod));
    }

    #[test]
    fn short_ground_is_rejected() {
        let pod = ChunkPod {
            ground: vec![0; 3],
            ..Default::default()
        };
        let bytes = encode_chunk_pod(&pod).unwrap();
        assert!(matches!(decode_chunk_pod(&bytes), Err(PodError::BadGroundLength(3))));
    }
}

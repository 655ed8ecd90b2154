//! Landmarks placed on a planet, used as labelled markers on the world map.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunk_manager::ChunkManager;
use crate::position::{ChunkPosition, ObjectReference};

/// A landmark as sent in join snapshots and edit notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandmarkPod {
    pub reference: ObjectReference,
    pub colour_a: [u8; 3],
    pub colour_b: [u8; 3],
}

/// Landmark origins on one planet. The objects themselves live in chunks;
/// this only indexes them.
#[derive(Debug, Clone, Default)]
pub struct LandmarkManager {
    landmarks: BTreeSet<ObjectReference>,
}

impl LandmarkManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, reference: ObjectReference) -> bool {
        self.landmarks.insert(reference)
    }

    pub fn remove(&mut self, reference: ObjectReference) -> bool {
        self.landmarks.remove(&reference)
    }

    pub fn contains(&self, reference: ObjectReference) -> bool {
        self.landmarks.contains(&reference)
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjectReference> + '_ {
        self.landmarks.iter().copied()
    }

    /// Current colours of every indexed landmark that is still resident.
    pub fn snapshot(&self, chunks: &ChunkManager) -> Vec<LandmarkPod> {
        self.landmarks
            .iter()
            .filter_map(|reference| {
                let (colour_a, colour_b) = chunks.object(*reference)?.as_landmark()?;
                Some(LandmarkPod {
                    reference: *reference,
                    colour_a,
                    colour_b,
                })
            })
            .collect()
    }

    /// Apply a colour edit. Returns `Err(chunk)` when the landmark object is
    /// not present locally, so the caller can re-request that chunk.
    pub fn apply_edit(&mut self, pod: &LandmarkPod, chunks: &mut ChunkManager) -> Result<(), ChunkPosition> {
        let Some(object) = chunks.object_mut(pod.reference) else {
            debug!(landmark = %pod.reference, "landmark edit for missing object");
            return Err(pod.reference.chunk);
        };
        let Some((colour_a, colour_b)) = object.as_landmark_mut() else {
            debug!(landmark = %pod.reference, "landmark edit targets another object kind");
            return Err(pod.reference.chunk);
        };
        *colour_a = pod.colour_a;
        *colour_b = pod.colour_b;
        self.landmarks.insert(pod.reference);
        Ok(())
    }

    /// Replace the index from a join snapshot. Landmarks whose chunks are
    /// resident get their colours applied; the chunks of the rest are
    /// returned as stale.
    pub fn replace_from_snapshot(&mut self, pods: &[LandmarkPod], chunks: &mut ChunkManager) -> Vec<ChunkPosition> {
        self.landmarks.clear();
        let mut stale = Vec::new();
        for pod in pods {
            self.landmarks.insert(pod.reference);
            if !chunks.is_chunk_generated(pod.reference.chunk) {
                continue;
            }
            if let Err(chunk) = self.apply_edit(pod, chunks) {
                if !stale.contains(&chunk) {
                    stale.push(chunk);
                }
            }
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{BuildableObject, OBJECT_LANDMARK, OBJECT_TREE};
    use crate::position::{ChunkViewRange, TileCoord};
    use crate::tiles::TILE_GRASS;
    use starhaven_core::PlanetType;

    fn manager_with_land() -> ChunkManager {
        let mut chunks = ChunkManager::new(1, PlanetType::VERDANT, 8);
        let mut requests = Vec::new();
        let view = ChunkViewRange {
            top_left: ChunkPosition::new(0, 0),
            width: 1,
            height: 1,
        };
        chunks.update_chunks(&[view], false, &mut requests);
        let pos = ChunkPosition::new(0, 0);
        for x in 0..2 {
            let tile = TileCoord::new(x, 0);
            chunks.delete_object(pos, tile);
            chunks.set_chunk_tile(pos, tile, TILE_GRASS);
        }
        chunks
    }

    #[test]
    fn edit_recolours_landmark() {
        let mut chunks = manager_with_land();
        let pos = ChunkPosition::new(0, 0);
        let reference = chunks
            .set_object(pos, TileCoord::new(0, 0), BuildableObject::new(OBJECT_LANDMARK).unwrap())
            .unwrap();
        let mut landmarks = LandmarkManager::new();
        let edit = LandmarkPod {
            reference,
            colour_a: [1, 2, 3],
            colour_b: [4, 5, 6],
        };
        assert_eq!(landmarks.apply_edit(&edit, &mut chunks), Ok(()));
        assert_eq!(landmarks.snapshot(&chunks), vec![edit]);
    }

    #[test]
    fn edit_on_wrong_kind_reports_chunk() {
        let mut chunks = manager_with_land();
        let pos = ChunkPosition::new(0, 0);
        let reference = chunks
            .set_object(pos, TileCoord::new(1, 0), BuildableObject::new(OBJECT_TREE).unwrap())
            .unwrap();
        let mut landmarks = LandmarkManager::new();
        let edit = LandmarkPod {
            reference,
            colour_a: [0; 3],
            colour_b: [0; 3],
        };
        assert_eq!(landmarks.apply_edit(&edit, &mut chunks), Err(pos));
        assert!(landmarks.is_empty());
    }

    #[test]
    fn snapshot_for_missing_objects_marks_chunks_stale() {
        let mut chunks = manager_with_land();
        let mut landmarks = LandmarkManager::new();
        let resident_missing = LandmarkPod {
            reference: ObjectReference::new(ChunkPosition::new(0, 0), TileCoord::new(5, 5)),
            colour_a: [0; 3],
            colour_b: [0; 3],
        };
        let far = LandmarkPod {
            reference: ObjectReference::new(ChunkPosition::new(4, 4), TileCoord::new(1, 1)),
            colour_a: [0; 3],
            colour_b: [0; 3],
        };
        chunks.delete_object(ChunkPosition::new(0, 0), TileCoord::new(5, 5));
        let stale = landmarks.replace_from_snapshot(&[resident_missing, far], &mut chunks);
        assert_eq!(stale, vec![ChunkPosition::new(0, 0)]);
        assert_eq!(landmarks.len(), 2);
    }
}

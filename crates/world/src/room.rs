//! Small fixed interiors: room destinations and structure interiors.
//!
//! Rooms are not chunked. They are built from a template, mutated in place
//! and sent wholesale in travel and structure-enter replies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use starhaven_core::RoomType;

use crate::object::{
    object_data, BuildableObject, ObjectTypeId, OBJECT_CHEST, OBJECT_MERCHANT, OBJECT_SPAWN_BEACON,
    OBJECT_WORKBENCH,
};
use crate::pod::BuildableObjectPod;
use crate::structure::{structure_data, StructureTypeId, STRUCTURE_HUT};
use crate::tiles::{TileId, TILE_ROCK, TILE_WOODEN_FLOOR};

/// Room cell coordinate.
pub type RoomTile = (u8, u8);

#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    size: (u8, u8),
    floor: Vec<TileId>,
    objects: BTreeMap<RoomTile, BuildableObject>,
    entrance: RoomTile,
}

impl Room {
    fn empty(size: (u8, u8), floor: TileId) -> Self {
        let size = (size.0.max(1), size.1.max(1));
        Self {
            size,
            floor: vec![floor; size.0 as usize * size.1 as usize],
            objects: BTreeMap::new(),
            entrance: (size.0 / 2, size.1 - 1),
        }
    }

    fn with_objects(mut self, objects: &[(RoomTile, ObjectTypeId)]) -> Self {
        for (tile, object_type) in objects {
            if let Some(object) = BuildableObject::new(*object_type) {
                self.set_object(*tile, object.settled());
            }
        }
        self
    }

    /// Template for a room destination.
    pub fn for_room_type(room_type: RoomType) -> Self {
        match room_type {
            RoomType::OUTPOST => Room::empty((8, 6), TILE_ROCK)
                .with_objects(&[((1, 1), OBJECT_CHEST), ((6, 1), OBJECT_SPAWN_BEACON)]),
            _ => Room::empty((10, 8), TILE_WOODEN_FLOOR)
                .with_objects(&[((4, 2), OBJECT_MERCHANT), ((1, 1), OBJECT_WORKBENCH)]),
        }
    }

    /// Template for a structure interior.
    pub fn for_structure(structure_type: StructureTypeId) -> Self {
        let size = structure_data(structure_type)
            .map(|data| data.room_size)
            .unwrap_or((6, 5));
        let room = Room::empty(size, TILE_WOODEN_FLOOR);
        if structure_type == STRUCTURE_HUT {
            room.with_objects(&[((1, 1), OBJECT_CHEST)])
        } else {
            room.with_objects(&[((1, 1), OBJECT_CHEST), ((size.0 - 2, 1), OBJECT_CHEST)])
        }
    }

    pub fn size(&self) -> (u8, u8) {
        self.size
    }

    /// Where arriving players stand.
    pub fn entrance(&self) -> RoomTile {
        self.entrance
    }

    pub fn in_bounds(&self, tile: RoomTile) -> bool {
        tile.0 < self.size.0 && tile.1 < self.size.1
    }

    pub fn floor_tile(&self, tile: RoomTile) -> Option<TileId> {
        self.in_bounds(tile)
            .then(|| self.floor[tile.1 as usize * self.size.0 as usize + tile.0 as usize])
    }

    pub fn objects(&self) -> impl Iterator<Item = (RoomTile, &BuildableObject)> {
        self.objects.iter().map(|(tile, object)| (*tile, object))
    }

    /// Origin of the object covering a cell.
    pub fn resolve_origin(&self, tile: RoomTile) -> Option<RoomTile> {
        self.objects.iter().find_map(|(origin, object)| {
            let (w, h) = object.size();
            let covers = tile.0 >= origin.0
                && tile.0 < origin.0 + w
                && tile.1 >= origin.1
                && tile.1 < origin.1 + h;
            covers.then_some(*origin)
        })
    }

    pub fn object(&self, tile: RoomTile) -> Option<&BuildableObject> {
        self.objects.get(&self.resolve_origin(tile)?)
    }

    pub fn object_mut(&mut self, tile: RoomTile) -> Option<&mut BuildableObject> {
        let origin = self.resolve_origin(tile)?;
        self.objects.get_mut(&origin)
    }

    /// Place an object if its footprint is inside the room and free.
    pub fn set_object(&mut self, origin: RoomTile, object: BuildableObject) -> bool {
        let (w, h) = object.size();
        for y in origin.1..origin.1.saturating_add(h) {
            for x in origin.0..origin.0.saturating_add(w) {
                if !self.in_bounds((x, y)) || self.resolve_origin((x, y)).is_some() {
                    return false;
                }
            }
        }
        self.objects.insert(origin, object);
        true
    }

    /// Remove the object covering a cell.
    pub fn delete_object(&mut self, tile: RoomTile) -> Option<(RoomTile, BuildableObject)> {
        let origin = self.resolve_origin(tile)?;
        self.objects.remove(&origin).map(|object| (origin, object))
    }

    pub fn update(&mut self, dt: f32, simulate_growth: bool) {
        for object in self.objects.values_mut() {
            object.update(dt, simulate_growth);
        }
    }

    pub fn to_pod(&self) -> RoomPod {
        RoomPod {
            size: self.size,
            floor: self.floor.clone(),
            objects: self.objects.iter().map(|(tile, object)| (*tile, object.to_pod())).collect(),
            entrance: self.entrance,
        }
    }

    /// Rebuild from a snapshot. Objects that no longer fit are dropped.
    pub fn from_pod(pod: &RoomPod) -> Self {
        let size = (pod.size.0.max(1), pod.size.1.max(1));
        let cells = size.0 as usize * size.1 as usize;
        let mut floor = pod.floor.clone();
        floor.resize(cells, TILE_WOODEN_FLOOR);
        let mut room = Self {
            size,
            floor,
            objects: BTreeMap::new(),
            entrance: pod.entrance,
        };
        for (tile, object_pod) in &pod.objects {
            if object_data(object_pod.object_type).is_none() {
                continue;
            }
            if let Some(object) = BuildableObject::from_pod(object_pod) {
                room.set_object(*tile, object);
            }
        }
        room
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomPod {
    pub size: (u8, u8),
    pub floor: Vec<TileId>,
    pub objects: Vec<(RoomTile, BuildableObjectPod)>,
    pub entrance: RoomTile,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{OBJECT_ROCKET, OBJECT_TREE};
    use crate::structure::STRUCTURE_RUIN;

    #[test]
    fn station_has_merchant() {
        let room = Room::for_room_type(RoomType::STATION);
        assert_eq!(room.object((4, 2)).map(|o| o.object_type()), Some(OBJECT_MERCHANT));
        // Workbench is 2x1; its second cell resolves to the origin.
        assert_eq!(room.resolve_origin((2, 1)), Some((1, 1)));
    }

    #[test]
    fn structure_interiors_follow_registry_size() {
        assert_eq!(Room::for_structure(STRUCTURE_RUIN).size(), (8, 6));
        assert_eq!(Room::for_structure(STRUCTURE_HUT).objects().count(), 1);
    }

    #[test]
    fn placement_respects_bounds_and_overlap() {
        let mut room = Room::for_structure(STRUCTURE_HUT);
        assert!(!room.set_object((5, 4), BuildableObject::new(OBJECT_ROCKET).unwrap()));
        assert!(!room.set_object((1, 1), BuildableObject::new(OBJECT_TREE).unwrap()));
        assert!(room.set_object((3, 2), BuildableObject::new(OBJECT_TREE).unwrap()));
        assert_eq!(room.delete_object((3, 2)).map(|(origin, _)| origin), Some((3, 2)));
    }

    #[test]
    fn pod_roundtrip() {
        let room = Room::for_room_type(RoomType::OUTPOST);
        let copy = Room::from_pod(&room.to_pod());
        assert_eq!(copy.to_pod(), room.to_pod());
        assert_eq!(copy.floor_tile((0, 0)), Some(TILE_ROCK));
        assert_eq!(copy.floor_tile((8, 0)), None);
    }
}

//! Replicated world mutations applied to the local [`World`].
//!
//! These helpers only apply changes. Whether the local peer may apply a
//! change directly, and whom to tell afterwards, is decided by the handler.
//! Inside rooms and structure interiors an [`ObjectReference`] addresses a
//! room cell through its tile; the chunk part is ignored.

use starhaven_core::LocationState;
use starhaven_world::{
    BuildableObject, ChunkPosition, ObjectHit, ObjectReference, ObjectTypeId, Planet, RoomTile, TileCoord, TileId,
    World,
};

/// Why a mutation could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The local copy of this chunk disagrees with the mutation: the target
    /// is missing, occupied or not resident.
    Stale(ChunkPosition),
    /// The mutation can never apply here (unknown object type, bad location,
    /// chunk outside the world, cell outside a room).
    Invalid,
}

/// The planet a surface mutation lands on. Chunks past the world edge are
/// never valid, so they can't be mistaken for stale ones.
fn surface<'a>(world: &'a mut World, location: &LocationState, chunk: ChunkPosition) -> Result<&'a mut Planet, Rejection> {
    if !chunk.is_within(world.world_size()) {
        return Err(Rejection::Invalid);
    }
    world
        .planet_mut(location.planet().ok_or(Rejection::Invalid)?)
        .ok_or(Rejection::Invalid)
}

fn room_tile(reference: ObjectReference) -> RoomTile {
    (reference.tile.x, reference.tile.y)
}

fn room_reference(tile: RoomTile) -> ObjectReference {
    ObjectReference::new(ChunkPosition::new(0, 0), TileCoord::new(tile.0, tile.1))
}

/// Resolve a cell to its object's origin.
pub fn resolve(world: &World, location: &LocationState, reference: ObjectReference) -> Option<ObjectReference> {
    if location.is_on_planet_surface() {
        world
            .planet(location.planet()?)?
            .chunks
            .resolve_object(reference.chunk, reference.tile)
    } else {
        world
            .room(location)?
            .resolve_origin(room_tile(reference))
            .map(room_reference)
    }
}

pub fn object<'a>(
    world: &'a World,
    location: &LocationState,
    reference: ObjectReference,
) -> Option<&'a BuildableObject> {
    let origin = resolve(world, location, reference)?;
    if location.is_on_planet_surface() {
        world.planet(location.planet()?)?.chunks.object(origin)
    } else {
        world.room(location)?.object(room_tile(origin))
    }
}

/// Mutable access to the object covering a cell. On a planet the chunk is
/// marked modified.
pub fn object_mut<'a>(
    world: &'a mut World,
    location: &LocationState,
    reference: ObjectReference,
) -> Result<&'a mut BuildableObject, Rejection> {
    if location.is_on_planet_surface() {
        let chunks = &mut surface(world, location, reference.chunk)?.chunks;
        let origin = chunks
            .resolve_object(reference.chunk, reference.tile)
            .ok_or(Rejection::Stale(reference.chunk))?;
        chunks.object_mut(origin).ok_or(Rejection::Stale(reference.chunk))
    } else {
        world
            .room_mut(location)
            .ok_or(Rejection::Invalid)?
            .object_mut(room_tile(reference))
            .ok_or(Rejection::Invalid)
    }
}

pub fn build_object(
    world: &mut World,
    location: &LocationState,
    reference: ObjectReference,
    object_type: ObjectTypeId,
) -> Result<ObjectReference, Rejection> {
    let object = BuildableObject::new(object_type).ok_or(Rejection::Invalid)?;
    if location.is_on_planet_surface() {
        let planet = surface(world, location, reference.chunk)?;
        let is_landmark = object.as_landmark().is_some();
        let origin = planet
            .chunks
            .set_object(reference.chunk, reference.tile, object)
            .ok_or(Rejection::Stale(reference.chunk))?;
        if is_landmark {
            planet.landmarks.add(origin);
        }
        Ok(origin)
    } else {
        let room = world.room_mut(location).ok_or(Rejection::Invalid)?;
        if room.set_object(room_tile(reference), object) {
            Ok(reference)
        } else {
            Err(Rejection::Invalid)
        }
    }
}

/// Damage an object. Destruction is left to the caller.
pub fn hit_object(
    world: &mut World,
    location: &LocationState,
    reference: ObjectReference,
    damage: u16,
) -> Result<ObjectHit, Rejection> {
    if location.is_on_planet_surface() {
        surface(world, location, reference.chunk)?
            .chunks
            .damage_object(reference.chunk, reference.tile, damage)
            .ok_or(Rejection::Stale(reference.chunk))
    } else {
        let room = world.room_mut(location).ok_or(Rejection::Invalid)?;
        let origin = room.resolve_origin(room_tile(reference)).ok_or(Rejection::Invalid)?;
        let destroyed = room.object_mut(origin).ok_or(Rejection::Invalid)?.damage(damage);
        Ok(ObjectHit {
            origin: room_reference(origin),
            destroyed,
        })
    }
}

/// Remove an object and every cell of its footprint.
pub fn destroy_object(
    world: &mut World,
    location: &LocationState,
    reference: ObjectReference,
) -> Result<(ObjectReference, BuildableObject), Rejection> {
    if location.is_on_planet_surface() {
        let planet = surface(world, location, reference.chunk)?;
        let (origin, object) = planet
            .chunks
            .delete_object(reference.chunk, reference.tile)
            .ok_or(Rejection::Stale(reference.chunk))?;
        planet.landmarks.remove(origin);
        Ok((origin, object))
    } else {
        world
            .room_mut(location)
            .ok_or(Rejection::Invalid)?
            .delete_object(room_tile(reference))
            .map(|(origin, object)| (room_reference(origin), object))
            .ok_or(Rejection::Invalid)
    }
}

pub fn place_land(
    world: &mut World,
    location: &LocationState,
    chunk: ChunkPosition,
    tile: TileCoord,
    land: TileId,
) -> Result<(), Rejection> {
    if !location.is_on_planet_surface() {
        return Err(Rejection::Invalid);
    }
    let planet = surface(world, location, chunk)?;
    if planet.chunks.place_land(chunk, tile, land) {
        Ok(())
    } else {
        Err(Rejection::Stale(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starhaven_core::{PlanetType, RoomType};
    use starhaven_world::{OBJECT_CHEST, OBJECT_LANDMARK, OBJECT_ROCK};

    fn world_with_surface() -> (World, LocationState, ChunkPosition) {
        let mut world = World::new(11, 16);
        let location = LocationState::surface(PlanetType::VERDANT);
        world.init_location(&location);
        let chunks = &mut world.planet_mut(PlanetType::VERDANT).unwrap().chunks;
        let (pos, _) = chunks.find_valid_spawn_chunk(8);
        (world, location, pos)
    }

    fn free_cell(world: &World, pos: ChunkPosition, object_type: ObjectTypeId) -> TileCoord {
        let chunks = &world.planet(PlanetType::VERDANT).unwrap().chunks;
        TileCoord::all()
            .find(|tile| chunks.can_place_object(pos, *tile, object_type))
            .expect("spawn chunk has room for an object")
    }

    #[test]
    fn built_landmarks_are_indexed_and_removed_on_destroy() {
        let (mut world, location, pos) = world_with_surface();
        let tile = free_cell(&world, pos, OBJECT_LANDMARK);
        let reference = ObjectReference::new(pos, tile);

        let origin = build_object(&mut world, &location, reference, OBJECT_LANDMARK).unwrap();
        assert!(world.planet(PlanetType::VERDANT).unwrap().landmarks.contains(origin));

        let (removed, object) = destroy_object(&mut world, &location, reference).unwrap();
        assert_eq!(removed, origin);
        assert!(object.as_landmark().is_some());
        assert!(!world.planet(PlanetType::VERDANT).unwrap().landmarks.contains(origin));
    }

    #[test]
    fn occupied_cells_report_the_stale_chunk() {
        let (mut world, location, pos) = world_with_surface();
        let reference = ObjectReference::new(pos, free_cell(&world, pos, OBJECT_ROCK));
        build_object(&mut world, &location, reference, OBJECT_ROCK).unwrap();
        assert_eq!(
            build_object(&mut world, &location, reference, OBJECT_ROCK),
            Err(Rejection::Stale(pos))
        );
    }

    #[test]
    fn missing_objects_are_stale() {
        let (mut world, location, pos) = world_with_surface();
        let reference = ObjectReference::new(pos, free_cell(&world, pos, OBJECT_ROCK));
        assert_eq!(
            destroy_object(&mut world, &location, reference).map(|(origin, _)| origin),
            Err(Rejection::Stale(pos))
        );
        assert_eq!(hit_object(&mut world, &location, reference, 1), Err(Rejection::Stale(pos)));
    }

    #[test]
    fn rooms_address_cells_by_tile() {
        let mut world = World::new(3, 16);
        let location = LocationState::Room(RoomType::OUTPOST);
        world.init_location(&location);
        let reference = ObjectReference::new(ChunkPosition::new(9, 9), TileCoord::new(3, 3));

        build_object(&mut world, &location, reference, OBJECT_CHEST).unwrap();
        assert!(object(&world, &location, reference).and_then(BuildableObject::as_chest).is_some());
        let (origin, _) = destroy_object(&mut world, &location, reference).unwrap();
        assert_eq!(origin.tile, TileCoord::new(3, 3));
        assert!(object(&world, &location, reference).is_none());
    }

    #[test]
    fn chunks_past_the_world_edge_are_invalid() {
        let (mut world, location, _) = world_with_surface();
        let outside = ChunkPosition::new(5000, 5000);
        let reference = ObjectReference::new(outside, TileCoord::new(0, 0));
        assert_eq!(
            build_object(&mut world, &location, reference, OBJECT_ROCK),
            Err(Rejection::Invalid)
        );
        assert_eq!(hit_object(&mut world, &location, reference, 1), Err(Rejection::Invalid));
        assert_eq!(
            place_land(&mut world, &location, ChunkPosition::new(0, 16), TileCoord::new(0, 0), 1),
            Err(Rejection::Invalid)
        );
        let chunks = &world.planet(PlanetType::VERDANT).unwrap().chunks;
        assert!(!chunks.is_chunk_generated(outside));
    }

    #[test]
    fn uninitialised_locations_are_invalid() {
        let mut world = World::new(3, 16);
        let location = LocationState::surface(PlanetType::DUNE);
        let reference = ObjectReference::new(ChunkPosition::new(0, 0), TileCoord::new(0, 0));
        assert_eq!(
            build_object(&mut world, &location, reference, OBJECT_ROCK),
            Err(Rejection::Invalid)
        );
    }
}

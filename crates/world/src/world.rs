//! Top-level world context: every planet a peer has initialised, the room
//! destinations, and state shared across locations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use starhaven_core::{LocationState, PlanetType, RoomType, StructureId};
use tracing::{debug, info, instrument};

use crate::boss::{BossManager, BossType};
use crate::chest::ChestDataPool;
use crate::chunk_manager::ChunkManager;
use crate::item_pickup::ItemPickup;
use crate::landmark::LandmarkManager;
use crate::position::ChunkPosition;
use crate::projectile::ProjectileManager;
use crate::room::{Room, RoomPod};

/// Generated chunk positions of a planet, for the world map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldMapSnapshot {
    pub planet: PlanetType,
    pub chunks: Vec<ChunkPosition>,
}

/// What happened on a planet during one update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanetUpdate {
    /// Chunks whose plants advanced a growth stage.
    pub grown_chunks: Vec<ChunkPosition>,
    /// Pickups dropped by killed creatures.
    pub dropped_pickups: Vec<(ChunkPosition, u64)>,
    pub killed_bosses: Vec<BossType>,
}

/// One planet and its per-planet subsystems.
pub struct Planet {
    planet_type: PlanetType,
    pub chunks: ChunkManager,
    pub projectiles: ProjectileManager,
    pub bosses: BossManager,
    pub landmarks: LandmarkManager,
    structure_rooms: BTreeMap<StructureId, Room>,
}

impl Planet {
    pub fn new(seed: u64, planet_type: PlanetType, world_size: u16) -> Self {
        Self {
            planet_type,
            chunks: ChunkManager::new(seed, planet_type, world_size),
            projectiles: ProjectileManager::new(),
            bosses: BossManager::new(),
            landmarks: LandmarkManager::new(),
            structure_rooms: BTreeMap::new(),
        }
    }

    pub fn planet_type(&self) -> PlanetType {
        self.planet_type
    }

    pub fn structure_room(&self, id: StructureId) -> Option<&Room> {
        self.structure_rooms.get(&id)
    }

    pub fn structure_room_mut(&mut self, id: StructureId) -> Option<&mut Room> {
        self.structure_rooms.get_mut(&id)
    }

    pub fn insert_structure_room(&mut self, id: StructureId, room: Room) {
        self.structure_rooms.insert(id, room);
    }

    pub fn world_map_snapshot(&self) -> WorldMapSnapshot {
        WorldMapSnapshot {
            planet: self.planet_type,
            chunks: self.chunks.generated_positions(),
        }
    }

    /// Advance the planet. `simulate` is true on the authoritative peer;
    /// `targets` are the positions of players on this planet's surface.
    pub fn update(&mut self, dt: f32, simulate: bool, targets: &[(f32, f32)]) -> PlanetUpdate {
        let world_size = self.chunks.world_size();
        let mut result = PlanetUpdate {
            grown_chunks: self.chunks.update(dt, simulate),
            ..PlanetUpdate::default()
        };
        self.projectiles.update(dt, world_size);
        if simulate {
            for projectile in self.bosses.update(dt, targets, world_size) {
                self.projectiles.spawn(projectile);
            }
            for kill in self.projectiles.damage_entities(&mut self.chunks) {
                if let Some(id) = self.chunks.add_item_pickup(kill.chunk, ItemPickup::new(kill.drops, kill.position)) {
                    result.dropped_pickups.push((kill.chunk, id));
                }
            }
            result.killed_bosses = self.bosses.take_projectile_hits(&mut self.projectiles);
        }
        for room in self.structure_rooms.values_mut() {
            room.update(dt, simulate);
        }
        result
    }
}

pub struct World {
    seed: u64,
    world_size: u16,
    planets: BTreeMap<PlanetType, Planet>,
    rooms: BTreeMap<RoomType, Room>,
    pub chests: ChestDataPool,
    next_structure_id: u32,
    game_time: f64,
}

impl World {
    pub fn new(seed: u64, world_size: u16) -> Self {
        Self {
            seed,
            world_size: world_size.max(1),
            planets: BTreeMap::new(),
            rooms: BTreeMap::new(),
            chests: ChestDataPool::new(),
            next_structure_id: 0,
            game_time: 0.0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn world_size(&self) -> u16 {
        self.world_size
    }

    /// Seconds of authoritative game time.
    pub fn game_time(&self) -> f64 {
        self.game_time
    }

    pub fn set_game_time(&mut self, time: f64) {
        self.game_time = time;
    }

    /// Adopt the host's seed and size. Drops every initialised location,
    /// which were generated from the old seed.
    pub fn reset(&mut self, seed: u64, world_size: u16, game_time: f64) {
        *self = Self::new(seed, world_size);
        self.game_time = game_time;
    }

    pub fn planet(&self, planet: PlanetType) -> Option<&Planet> {
        self.planets.get(&planet)
    }

    pub fn planet_mut(&mut self, planet: PlanetType) -> Option<&mut Planet> {
        self.planets.get_mut(&planet)
    }

    pub fn planets(&self) -> impl Iterator<Item = &Planet> {
        self.planets.values()
    }

    /// Whether a packet for `location` can be applied here.
    pub fn is_location_initialized(&self, location: &LocationState) -> bool {
        match location {
            LocationState::Planet { planet, structure } => match self.planets.get(planet) {
                Some(p) => structure.map_or(true, |id| p.structure_rooms.contains_key(&id)),
                None => false,
            },
            LocationState::Room(room) => self.rooms.contains_key(room),
        }
    }

    /// Make a location ready for use. Planets and room destinations are
    /// created from templates; structure interiors must already have been
    /// allocated (host) or received (client). Returns whether the location is
    /// initialised afterwards.
    #[instrument(skip(self))]
    pub fn init_location(&mut self, location: &LocationState) -> bool {
        match location {
            LocationState::Planet { planet, .. } => {
                if !planet.is_known() {
                    return false;
                }
                if !self.planets.contains_key(planet) {
                    info!(planet = planet.as_str(), "initialising planet");
                    self.planets
                        .insert(*planet, Planet::new(self.seed, *planet, self.world_size));
                }
            }
            LocationState::Room(room) => {
                if !room.is_known() {
                    return false;
                }
                self.rooms
                    .entry(*room)
                    .or_insert_with(|| Room::for_room_type(*room));
            }
        }
        self.is_location_initialized(location)
    }

    /// Forget a planet this peer no longer mirrors.
    pub fn unload_planet(&mut self, planet: PlanetType) -> bool {
        self.planets.remove(&planet).is_some()
    }

    /// The room for a room destination or structure interior.
    pub fn room(&self, location: &LocationState) -> Option<&Room> {
        match location {
            LocationState::Room(room) => self.rooms.get(room),
            LocationState::Planet {
                planet,
                structure: Some(id),
            } => self.planets.get(planet)?.structure_rooms.get(id),
            LocationState::Planet { structure: None, .. } => None,
        }
    }

    pub fn room_mut(&mut self, location: &LocationState) -> Option<&mut Room> {
        match location {
            LocationState::Room(room) => self.rooms.get_mut(room),
            LocationState::Planet {
                planet,
                structure: Some(id),
            } => self.planets.get_mut(planet)?.structure_rooms.get_mut(id),
            LocationState::Planet { structure: None, .. } => None,
        }
    }

    /// Install a room received from the host.
    pub fn insert_room(&mut self, location: &LocationState, pod: &RoomPod) -> bool {
        let room = Room::from_pod(pod);
        match location {
            LocationState::Room(room_type) => {
                self.rooms.insert(*room_type, room);
                true
            }
            LocationState::Planet {
                planet,
                structure: Some(id),
            } => match self.planets.get_mut(planet) {
                Some(p) => {
                    p.insert_structure_room(*id, room);
                    true
                }
                None => false,
            },
            LocationState::Planet { structure: None, .. } => false,
        }
    }

    /// Resolve the interior of the structure in `chunk`, allocating an id and
    /// building its room the first time. Host only. Returns `None` if the
    /// chunk has no structure.
    pub fn enter_structure(&mut self, planet: PlanetType, chunk: ChunkPosition) -> Option<StructureId> {
        let p = self.planets.get_mut(&planet)?;
        let chunk_ref = p.chunks.chunk_mut(chunk)?;
        let structure = chunk_ref.structure_mut()?;
        if let Some(id) = structure.structure_id {
            if !p.structure_rooms.contains_key(&id) {
                p.structure_rooms.insert(id, Room::for_structure(structure.structure_type));
            }
            return Some(id);
        }
        let id = StructureId(self.next_structure_id);
        self.next_structure_id = self.next_structure_id.wrapping_add(1);
        structure.structure_id = Some(id);
        let structure_type = structure.structure_type;
        chunk_ref.mark_modified();
        p.structure_rooms.insert(id, Room::for_structure(structure_type));
        debug!(planet = planet.as_str(), chunk = %chunk, structure = id.0, "allocated structure interior");
        Some(id)
    }

    /// Keep structure ids unique after loading chunks that carry them.
    pub fn observe_structure_id(&mut self, id: StructureId) {
        if id.0 >= self.next_structure_id {
            self.next_structure_id = id.0.wrapping_add(1);
        }
    }

    /// Advance game time and every initialised location.
    pub fn update(
        &mut self,
        dt: f32,
        simulate: bool,
        targets: &BTreeMap<PlanetType, Vec<(f32, f32)>>,
    ) -> BTreeMap<PlanetType, PlanetUpdate> {
        self.game_time += dt as f64;
        for room in self.rooms.values_mut() {
            room.update(dt, simulate);
        }
        self.planets
            .iter_mut()
            .map(|(planet_type, planet)| {
                let planet_targets = targets.get(planet_type).map(Vec::as_slice).unwrap_or(&[]);
                (*planet_type, planet.update(dt, simulate, planet_targets))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{StructureObject, STRUCTURE_HUT};
    use crate::position::TileCoord;

    #[test]
    fn locations_initialise_on_demand() {
        let mut world = World::new(9, 16);
        let surface = LocationState::surface(PlanetType::DUNE);
        assert!(!world.is_location_initialized(&surface));
        assert!(world.init_location(&surface));
        assert!(world.is_location_initialized(&surface));
        assert!(!world.is_location_initialized(&LocationState::surface(PlanetType::VERDANT)));

        let station = LocationState::Room(RoomType::STATION);
        assert!(world.init_location(&station));
        assert!(world.room(&station).is_some());
        assert!(!world.init_location(&LocationState::Room(RoomType(99))));
    }

    #[test]
    fn structure_interior_needs_allocation() {
        let mut world = World::new(9, 16);
        let inside = LocationState::structure(PlanetType::VERDANT, StructureId(0));
        assert!(!world.init_location(&inside));

        let pos = ChunkPosition::new(2, 2);
        let planet = world.planet_mut(PlanetType::VERDANT).unwrap();
        planet.chunks.get_chunk_data_and_generate(pos);
        planet
            .chunks
            .chunk_mut(pos)
            .unwrap()
            .set_structure(Some(StructureObject::new(STRUCTURE_HUT, TileCoord::new(1, 1))));

        let id = world.enter_structure(PlanetType::VERDANT, pos).unwrap();
        assert_eq!(id, StructureId(0));
        assert_eq!(world.enter_structure(PlanetType::VERDANT, pos), Some(id));
        assert!(world.is_location_initialized(&inside));
        let chunk = world.planet(PlanetType::VERDANT).unwrap().chunks.chunk(pos).unwrap();
        assert!(chunk.is_modified());
    }

    #[test]
    fn client_receives_structure_room() {
        let mut host = World::new(1, 8);
        host.init_location(&LocationState::surface(PlanetType::VERDANT));
        let inside = LocationState::structure(PlanetType::VERDANT, StructureId(4));
        host.planet_mut(PlanetType::VERDANT)
            .unwrap()
            .insert_structure_room(StructureId(4), Room::for_structure(STRUCTURE_HUT));
        let pod = host.room(&inside).unwrap().to_pod();

        let mut client = World::new(1, 8);
        assert!(!client.insert_room(&inside, &pod));
        client.init_location(&LocationState::surface(PlanetType::VERDANT));
        assert!(client.insert_room(&inside, &pod));
        assert!(client.is_location_initialized(&inside));
    }

    #[test]
    fn update_advances_game_time() {
        let mut world = World::new(3, 8);
        world.init_location(&LocationState::surface(PlanetType::VERDANT));
        let updates = world.update(0.5, true, &BTreeMap::new());
        assert_eq!(world.game_time(), 0.5);
        assert!(updates.contains_key(&PlanetType::VERDANT));
    }
}

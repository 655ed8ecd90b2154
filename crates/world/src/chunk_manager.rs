//! Per-planet chunk orchestration.
//!
//! `ChunkManager` owns the chunk store, generator, pathfinding grid and the
//! derived tilemap/collision state that spans chunk borders. It applies
//! mutations without any notion of network authority; callers decide whether
//! the local peer may mutate directly.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use lru::LruCache;
use rand::Rng;
use starhaven_core::{scoped_rng, ItemStack, PlanetType};
use tracing::{debug, instrument, trace, warn};

use crate::chunk::{Chunk, ObjectSlot};
use crate::entity::{EntityPod, EntityType, ENTITY_SPAWN_COOLDOWN, MAX_ENTITIES_PER_CHUNK};
use crate::item_pickup::ItemPickup;
use crate::object::{object_data, BuildableObject, ObjectTypeId};
use crate::pathfinding::{GridPos, PathfindingGrid};
use crate::pod::ChunkPod;
use crate::position::{
    offset_tile, ChunkPosition, ChunkViewRange, ObjectReference, TileCoord, CARDINAL_OFFSETS,
    CHUNK_SIZE_PIXELS, CHUNK_TILE_SIZE, NEIGHBOUR_OFFSETS_8, TILE_SIZE_PIXELS,
};
use crate::storage::ChunkStore;
use crate::terrain::{Biome, ChunkGenerator, NoiseChunkGenerator};
use crate::tiles::{layers_for_cell, tile_data, PresenceWindow, TileId, TILE_WATER};

const BIOME_CACHE_SIZE: usize = 1024;

/// Simulation ticks per second used to derive per-tick RNG streams.
const RNG_TICKS_PER_SECOND: f64 = 20.0;

/// Result of damaging an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHit {
    pub origin: ObjectReference,
    pub destroyed: bool,
}

/// Chunk orchestrator for one planet.
pub struct ChunkManager {
    planet: PlanetType,
    world_seed: u64,
    world_size: u16,
    store: ChunkStore,
    generator: Box<dyn ChunkGenerator + Send>,
    pathfinding: PathfindingGrid,
    entity_spawn_cooldowns: BTreeMap<ChunkPosition, f64>,
    biome_cache: LruCache<ChunkPosition, Biome>,
    clock: f64,
}

impl ChunkManager {
    /// Manager with the default noise generator.
    pub fn new(world_seed: u64, planet: PlanetType, world_size: u16) -> Self {
        let generator = NoiseChunkGenerator::new(world_seed, planet, world_size);
        Self::with_generator(world_seed, planet, world_size, Box::new(generator))
    }

    pub fn with_generator(
        world_seed: u64,
        planet: PlanetType,
        world_size: u16,
        generator: Box<dyn ChunkGenerator + Send>,
    ) -> Self {
        let world_size = world_size.max(1);
        Self {
            planet,
            world_seed,
            world_size,
            store: ChunkStore::default(),
            generator,
            pathfinding: PathfindingGrid::new(world_size),
            entity_spawn_cooldowns: BTreeMap::new(),
            biome_cache: LruCache::new(
                NonZeroUsize::new(BIOME_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            ),
            clock: 0.0,
        }
    }

    #[inline]
    pub fn planet(&self) -> PlanetType {
        self.planet
    }

    #[inline]
    pub fn world_size(&self) -> u16 {
        self.world_size
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Seconds of simulation this manager has seen.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn pathfinding(&self) -> &PathfindingGrid {
        &self.pathfinding
    }

    /// Fetch a resident chunk, loaded or stored.
    pub fn chunk(&self, pos: ChunkPosition) -> Option<&Chunk> {
        self.store.get(pos)
    }

    pub fn chunk_mut(&mut self, pos: ChunkPosition) -> Option<&mut Chunk> {
        self.store.get_mut(pos)
    }

    pub fn loaded_chunk(&self, pos: ChunkPosition) -> Option<&Chunk> {
        self.store.get_loaded(pos)
    }

    /// Chunks in the working set.
    pub fn loaded_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.store.loaded()
    }

    pub fn loaded_chunks_mut(&mut self) -> impl Iterator<Item = &mut Chunk> {
        self.store.loaded_mut()
    }

    #[inline]
    pub fn is_chunk_loaded(&self, pos: ChunkPosition) -> bool {
        self.store.is_loaded(pos)
    }

    /// Whether this peer holds the chunk at all.
    #[inline]
    pub fn is_chunk_generated(&self, pos: ChunkPosition) -> bool {
        self.store.contains(pos)
    }

    pub fn biome_at(&mut self, pos: ChunkPosition) -> Biome {
        if let Some(biome) = self.biome_cache.get(&pos) {
            return *biome;
        }
        let biome = self.generator.biome_at(pos);
        self.biome_cache.put(pos, biome);
        biome
    }

    /// Generated chunk positions, for the world map.
    pub fn generated_positions(&self) -> Vec<ChunkPosition> {
        let mut positions: Vec<_> = self.store.all_positions().collect();
        positions.sort();
        positions
    }

    fn visible_positions(&self, views: &[ChunkViewRange]) -> BTreeSet<ChunkPosition> {
        views
            .iter()
            .flat_map(|view| view.positions(self.world_size))
            .collect()
    }

    /// Bring every visible chunk into the loaded set.
    ///
    /// Stored chunks are promoted; chunks restored from a snapshot get their
    /// deferred tilemap and collision initialisation here. Absent chunks are
    /// generated on a host, or appended to `out_requests` on a client.
    /// Returns whether any position needed work.
    #[instrument(skip_all, fields(planet = self.planet.as_str(), is_client = is_client))]
    pub fn update_chunks(
        &mut self,
        views: &[ChunkViewRange],
        is_client: bool,
        out_requests: &mut Vec<ChunkPosition>,
    ) -> bool {
        let mut has_changes = false;
        for pos in self.visible_positions(views) {
            if self.store.is_loaded(pos) {
                continue;
            }
            has_changes = true;
            if self.store.promote(pos) {
                let needs_init = self
                    .store
                    .get_loaded(pos)
                    .map(|chunk| chunk.generated_from_pod() || !chunk.tiles_initialized())
                    .unwrap_or(false);
                if needs_init {
                    self.initialise_chunk(pos);
                } else if !is_client {
                    self.try_spawn_entities(pos);
                }
                continue;
            }
            if is_client {
                if !out_requests.contains(&pos) {
                    out_requests.push(pos);
                }
                continue;
            }
            let chunk = self.generator.generate_chunk(pos);
            self.store.insert_loaded(chunk);
            self.initialise_chunk(pos);
            self.try_spawn_entities(pos);
        }
        has_changes
    }

    /// Evict loaded chunks no view covers. Modified chunks move to storage;
    /// clean ones are dropped and will be regenerated or re-requested.
    pub fn unload_chunks_out_of_view(&mut self, views: &[ChunkViewRange]) -> bool {
        let visible = self.visible_positions(views);
        let out_of_view: Vec<ChunkPosition> = self
            .store
            .loaded_positions()
            .filter(|pos| !visible.contains(pos))
            .collect();
        for pos in &out_of_view {
            let modified = self.store.get_loaded(*pos).map(Chunk::is_modified).unwrap_or(false);
            if modified {
                self.store.demote(*pos);
            } else {
                self.store.remove_loaded(*pos);
                self.entity_spawn_cooldowns.remove(pos);
            }
            trace!(chunk = %pos, modified, "unloaded chunk");
        }
        !out_of_view.is_empty()
    }

    /// Snapshot of a chunk for transfer, generating it into storage first if
    /// this peer has never seen it. Only authoritative peers should call this.
    pub fn get_chunk_data_and_generate(&mut self, pos: ChunkPosition) -> ChunkPod {
        if !self.store.contains(pos) {
            let chunk = self.generator.generate_chunk(pos);
            self.pathfinding.update_chunk(&chunk);
            self.store.insert_stored(chunk);
        }
        self.get_chunk_data(pos).unwrap_or_default()
    }

    pub fn get_chunk_data(&self, pos: ChunkPosition) -> Option<ChunkPod> {
        self.store.get(pos).map(|chunk| chunk.to_pod(self.world_size))
    }

    /// Apply an authoritative chunk snapshot.
    ///
    /// An absent chunk is created in storage and initialised when it enters a
    /// view. A loaded chunk is initialised immediately, together with the
    /// seams of its neighbours. Reference cells are rebuilt from object
    /// footprints on both sides of every chunk border.
    #[instrument(skip_all, fields(chunk = %pos))]
    pub fn set_chunk_data(&mut self, pos: ChunkPosition, pod: &ChunkPod) {
        self.clear_foreign_references(pos);
        match self.store.get_mut(pos) {
            Some(chunk) => chunk.load_pod(pod, self.world_size),
            None => {
                let mut chunk = Chunk::new(pos);
                chunk.load_pod(pod, self.world_size);
                self.store.insert_stored(chunk);
            }
        }
        self.restore_references(pos);
        if self.store.is_loaded(pos) {
            self.initialise_chunk(pos);
        } else if let Some(chunk) = self.store.get(pos) {
            self.pathfinding.update_chunk(chunk);
        }
        debug!(objects = pod.objects.len(), pickups = pod.item_pickups.len(), "applied chunk data");
    }

    /// Remove reference cells in neighbouring chunks that point at this
    /// chunk's current objects.
    fn clear_foreign_references(&mut self, pos: ChunkPosition) {
        let Some(chunk) = self.store.get(pos) else {
            return;
        };
        let footprints: Vec<(ObjectReference, (u8, u8))> = chunk
            .objects()
            .map(|(tile, object)| (ObjectReference::new(pos, tile), object.size()))
            .collect();
        for (origin, size) in footprints {
            for (chunk_pos, tile) in self.footprint(origin, size) {
                if chunk_pos == pos {
                    continue;
                }
                if let Some(neighbour) = self.store.get_mut(chunk_pos) {
                    if neighbour.object_slot(tile) == Some(&ObjectSlot::Reference(origin)) {
                        neighbour.restore_object_slot(tile, None);
                    }
                }
            }
        }
    }

    /// Lay reference cells for this chunk's objects and for neighbouring
    /// objects whose footprints reach into this chunk.
    fn restore_references(&mut self, pos: ChunkPosition) {
        let mut origins = Vec::new();
        for (dx, dy) in [(0, 0), (-1, 0), (0, -1), (-1, -1)] {
            let source = pos.offset(dx, dy, self.world_size);
            if let Some(chunk) = self.store.get(source) {
                origins.extend(
                    chunk
                        .objects()
                        .map(|(tile, object)| (ObjectReference::new(source, tile), object.size())),
                );
            }
        }
        for (origin, size) in origins {
            for (chunk_pos, tile) in self.footprint(origin, size) {
                if (chunk_pos, tile) == (origin.chunk, origin.tile) {
                    continue;
                }
                let Some(chunk) = self.store.get_mut(chunk_pos) else {
                    continue;
                };
                match chunk.object_slot(tile) {
                    Some(ObjectSlot::Object(_)) => {
                        warn!(origin = %origin, chunk = %chunk_pos, "object footprint overlaps another origin");
                    }
                    _ => chunk.restore_object_slot(tile, Some(ObjectSlot::Reference(origin))),
                }
            }
        }
    }

    /// Every cell covered by an object of `size` at `origin`.
    fn footprint(&self, origin: ObjectReference, size: (u8, u8)) -> Vec<(ChunkPosition, TileCoord)> {
        let mut cells = Vec::with_capacity(size.0 as usize * size.1 as usize);
        for dy in 0..size.1 as i32 {
            for dx in 0..size.0 as i32 {
                cells.push(offset_tile(origin.chunk, origin.tile, dx, dy, self.world_size));
            }
        }
        cells
    }

    /// Resolve any cell to the origin of the object covering it.
    pub fn resolve_object(&self, pos: ChunkPosition, tile: TileCoord) -> Option<ObjectReference> {
        self.store.get(pos)?.resolve_origin(tile)
    }

    pub fn object(&self, reference: ObjectReference) -> Option<&BuildableObject> {
        self.store.get(reference.chunk)?.object(reference.tile)
    }

    pub fn object_mut(&mut self, reference: ObjectReference) -> Option<&mut BuildableObject> {
        let chunk = self.store.get_mut(reference.chunk)?;
        chunk.mark_modified();
        chunk.object_mut(reference.tile)
    }

    /// Whether an object of `object_type` fits with its origin at `tile`.
    pub fn can_place_object(&self, pos: ChunkPosition, tile: TileCoord, object_type: ObjectTypeId) -> bool {
        let Some(data) = object_data(object_type) else {
            return false;
        };
        self.footprint(ObjectReference::new(pos, tile), data.size)
            .into_iter()
            .all(|(chunk_pos, tile)| {
                self.store
                    .get(chunk_pos)
                    .map(|chunk| !chunk.is_tile_occupied(tile) && chunk.ground_tile(tile) != TILE_WATER)
                    .unwrap_or(false)
            })
    }

    /// Place an object with its origin at `tile`, filling the rest of its
    /// footprint with references. Returns `None` without mutating if any
    /// covered cell is missing, occupied or water.
    pub fn set_object(
        &mut self,
        pos: ChunkPosition,
        tile: TileCoord,
        object: BuildableObject,
    ) -> Option<ObjectReference> {
        if !self.can_place_object(pos, tile, object.object_type()) {
            return None;
        }
        let origin = ObjectReference::new(pos, tile);
        let cells = self.footprint(origin, object.size());
        for (chunk_pos, cell) in cells.iter().skip(1) {
            self.set_object_reference(origin, *chunk_pos, *cell);
        }
        if let Some(chunk) = self.store.get_mut(pos) {
            chunk.set_object_slot(tile, Some(ObjectSlot::Object(object)));
        }
        self.refresh_derived(cells.iter().map(|(chunk_pos, _)| *chunk_pos));
        Some(origin)
    }

    /// Point a cell at an object's origin.
    pub fn set_object_reference(&mut self, origin: ObjectReference, pos: ChunkPosition, tile: TileCoord) {
        if let Some(chunk) = self.store.get_mut(pos) {
            chunk.set_object_slot(tile, Some(ObjectSlot::Reference(origin)));
        }
    }

    /// Remove the object covering a cell along with every reference cell of
    /// its footprint. Returns the origin and the removed object.
    pub fn delete_object(&mut self, pos: ChunkPosition, tile: TileCoord) -> Option<(ObjectReference, BuildableObject)> {
        let origin = self.resolve_object(pos, tile)?;
        let object = match self.store.get_mut(origin.chunk)?.take_object_slot(origin.tile) {
            Some(ObjectSlot::Object(object)) => object,
            Some(other) => {
                warn!(origin = %origin, "reference chain does not end at an object");
                if let Some(chunk) = self.store.get_mut(origin.chunk) {
                    chunk.set_object_slot(origin.tile, Some(other));
                }
                return None;
            }
            None => {
                warn!(origin = %origin, "dangling object reference");
                if let Some(chunk) = self.store.get_mut(pos) {
                    chunk.set_object_slot(tile, None);
                }
                return None;
            }
        };
        let cells = self.footprint(origin, object.size());
        for (chunk_pos, cell) in cells.iter().skip(1) {
            if let Some(chunk) = self.store.get_mut(*chunk_pos) {
                if chunk.object_slot(*cell) == Some(&ObjectSlot::Reference(origin)) {
                    chunk.set_object_slot(*cell, None);
                }
            }
        }
        self.refresh_derived(cells.iter().map(|(chunk_pos, _)| *chunk_pos));
        Some((origin, object))
    }

    /// Damage the object covering a cell. Destruction is left to the caller.
    pub fn damage_object(&mut self, pos: ChunkPosition, tile: TileCoord, amount: u16) -> Option<ObjectHit> {
        let origin = self.resolve_object(pos, tile)?;
        let chunk = self.store.get_mut(origin.chunk)?;
        let destroyed = chunk.object_mut(origin.tile)?.damage(amount);
        chunk.mark_modified();
        Some(ObjectHit { origin, destroyed })
    }

    /// Turn water into land. Returns false if the cell is not water, the
    /// tile is not placeable, or the chunk is not resident.
    pub fn place_land(&mut self, pos: ChunkPosition, tile: TileCoord, land: TileId) -> bool {
        let placeable = tile_data(land).map(|data| data.placeable).unwrap_or(false);
        let is_water = self
            .store
            .get(pos)
            .map(|chunk| chunk.ground_tile(tile) == TILE_WATER)
            .unwrap_or(false);
        if !placeable || !is_water {
            return false;
        }
        self.set_chunk_tile(pos, tile, land)
    }

    /// Set a ground tile and propagate background layers and tilemap seams.
    pub fn set_chunk_tile(&mut self, pos: ChunkPosition, tile: TileCoord, id: TileId) -> bool {
        let changed = match self.store.get_mut(pos) {
            Some(chunk) => chunk.set_ground_tile(tile, id),
            None => return false,
        };
        if !changed {
            return false;
        }
        let mut changed_layers = BTreeSet::new();
        let mut touched = BTreeSet::new();
        self.set_background_adjacent_tiles_for_tile(pos, tile, &mut changed_layers, &mut touched);
        for (dx, dy) in CARDINAL_OFFSETS {
            let (chunk_pos, cell) = offset_tile(pos, tile, dx, dy, self.world_size);
            self.set_background_adjacent_tiles_for_tile(chunk_pos, cell, &mut changed_layers, &mut touched);
        }
        if !changed_layers.is_empty() {
            let mut refresh = self.update_adjacent_chunk_tiles(pos);
            refresh.extend(self.update_surrounding_adjacent_chunk_tiles(pos));
            self.refresh_tilemaps(&refresh, Some(&changed_layers));
        }
        self.refresh_derived(std::iter::once(pos));
        true
    }

    /// Recompute which layers are drawn at one cell. A cell holds its own
    /// tile's layer plus the layer of every lower-ranked cardinal neighbour.
    /// Only chunks with initialised tilemaps are touched.
    pub fn set_background_adjacent_tiles_for_tile(
        &mut self,
        pos: ChunkPosition,
        tile: TileCoord,
        changed_layers: &mut BTreeSet<TileId>,
        touched: &mut BTreeSet<ChunkPosition>,
    ) {
        let initialised = self.store.get(pos).map(Chunk::tiles_initialized).unwrap_or(false);
        if !initialised {
            return;
        }
        self.recompute_cell_layers(pos, tile, changed_layers, touched);
    }

    fn recompute_cell_layers(
        &mut self,
        pos: ChunkPosition,
        tile: TileCoord,
        changed_layers: &mut BTreeSet<TileId>,
        touched: &mut BTreeSet<ChunkPosition>,
    ) {
        let Some(own) = self.ground_at(pos, tile, 0, 0) else {
            return;
        };
        let neighbours = CARDINAL_OFFSETS.map(|(dx, dy)| self.ground_at(pos, tile, dx, dy));
        let wanted = layers_for_cell(own, neighbours);
        let Some(chunk) = self.store.get_mut(pos) else {
            return;
        };
        let current = chunk.layers_at(tile);
        for id in current.iter().filter(|id| !wanted.contains(id)) {
            if chunk.set_layer_presence(*id, tile, false) {
                changed_layers.insert(*id);
                touched.insert(pos);
            }
        }
        for id in &wanted {
            if chunk.set_layer_presence(*id, tile, true) {
                changed_layers.insert(*id);
                touched.insert(pos);
            }
        }
    }

    /// The edited chunk and its 8 neighbours.
    pub fn update_adjacent_chunk_tiles(&self, pos: ChunkPosition) -> BTreeSet<ChunkPosition> {
        let mut set: BTreeSet<_> = pos.neighbours(self.world_size).collect();
        set.insert(pos);
        set
    }

    /// Neighbours of the diagonal neighbours, covering the 2-ring whose seams
    /// a corner tile can reach.
    pub fn update_surrounding_adjacent_chunk_tiles(&self, pos: ChunkPosition) -> BTreeSet<ChunkPosition> {
        [(-1, -1), (1, -1), (-1, 1), (1, 1)]
            .into_iter()
            .flat_map(|(dx, dy)| self.update_adjacent_chunk_tiles(pos.offset(dx, dy, self.world_size)))
            .collect()
    }

    /// Recompute variations for the given chunks. `None` refreshes every
    /// layer a chunk has.
    fn refresh_tilemaps(&mut self, positions: &BTreeSet<ChunkPosition>, layers: Option<&BTreeSet<TileId>>) {
        for pos in positions {
            let Some(chunk) = self.store.get_loaded(*pos) else {
                continue;
            };
            if !chunk.tiles_initialized() {
                continue;
            }
            let ids: Vec<TileId> = match layers {
                Some(layers) => layers.iter().copied().collect(),
                None => chunk.tile_layers().keys().copied().collect(),
            };
            let windows: Vec<(TileId, PresenceWindow)> =
                ids.into_iter().map(|id| (id, self.presence_window(*pos, id))).collect();
            if let Some(chunk) = self.store.get_loaded_mut(*pos) {
                for (id, window) in &windows {
                    chunk.refresh_layer(*id, window);
                }
                chunk.finish_tilemap_refresh();
            }
        }
    }

    fn presence_window(&self, pos: ChunkPosition, id: TileId) -> PresenceWindow {
        let mut window = PresenceWindow::default();
        let size = CHUNK_TILE_SIZE as i32;
        for y in -1..=size {
            for x in -1..=size {
                let (chunk_pos, tile) = offset_tile(pos, TileCoord::new(0, 0), x, y, self.world_size);
                let present = self
                    .store
                    .get(chunk_pos)
                    .and_then(|chunk| chunk.tile_layer(id))
                    .map(|layer| layer.is_present(tile.index()))
                    .unwrap_or(false);
                window.set(x, y, present);
            }
        }
        window
    }

    fn ground_at(&self, pos: ChunkPosition, tile: TileCoord, dx: i32, dy: i32) -> Option<TileId> {
        let (chunk_pos, tile) = offset_tile(pos, tile, dx, dy, self.world_size);
        self.store.get(chunk_pos).map(|chunk| chunk.ground_tile(tile))
    }

    /// Build tilemap layers, collision and pathing for a chunk entering the
    /// working set, and fix the seams of its loaded neighbours.
    fn initialise_chunk(&mut self, pos: ChunkPosition) {
        let mut changed_layers = BTreeSet::new();
        let mut touched = BTreeSet::new();
        for tile in TileCoord::all() {
            self.recompute_cell_layers(pos, tile, &mut changed_layers, &mut touched);
        }
        if let Some(chunk) = self.store.get_loaded_mut(pos) {
            chunk.finish_tilemap_refresh();
        }
        for (dx, dy) in CARDINAL_OFFSETS {
            let neighbour = pos.offset(dx, dy, self.world_size);
            let ready = self
                .store
                .get_loaded(neighbour)
                .map(Chunk::tiles_initialized)
                .unwrap_or(false);
            if ready {
                for tile in TileCoord::all() {
                    self.recompute_cell_layers(neighbour, tile, &mut changed_layers, &mut touched);
                }
            }
        }
        let refresh = self.update_adjacent_chunk_tiles(pos);
        self.refresh_tilemaps(&refresh, None);
        self.refresh_derived(std::iter::once(pos));
    }

    /// Recompute collision for loaded chunks and pathing for all.
    fn refresh_derived(&mut self, positions: impl IntoIterator<Item = ChunkPosition>) {
        let positions: BTreeSet<_> = positions.into_iter().collect();
        for pos in positions {
            if let Some(chunk) = self.store.get_loaded_mut(pos) {
                chunk.recalculate_collision();
            }
            if let Some(chunk) = self.store.get(pos) {
                self.pathfinding.update_chunk(chunk);
            }
        }
    }

    /// Whether a world-pixel point is blocked by water or a solid object.
    pub fn is_position_blocked(&self, position: (f32, f32)) -> bool {
        let pos = ChunkPosition::from_world(position, self.world_size);
        let Some(chunk) = self.store.get_loaded(pos) else {
            return true;
        };
        let wrapped = crate::position::wrap_world_position(position, self.world_size);
        chunk.collision_rects().iter().any(|rect| rect.contains(wrapped))
    }

    pub fn add_item_pickup(&mut self, pos: ChunkPosition, pickup: ItemPickup) -> Option<u64> {
        Some(self.store.get_mut(pos)?.add_item_pickup(pickup))
    }

    pub fn insert_item_pickup(&mut self, pos: ChunkPosition, id: u64, pickup: ItemPickup) -> bool {
        match self.store.get_mut(pos) {
            Some(chunk) => {
                chunk.insert_item_pickup(id, pickup);
                true
            }
            None => false,
        }
    }

    pub fn remove_item_pickup(&mut self, pos: ChunkPosition, id: u64) -> Option<ItemPickup> {
        self.store.get_mut(pos)?.remove_item_pickup(id)
    }

    /// Scatter item stacks around an object's origin as pickups.
    pub fn drop_items(&mut self, origin: ObjectReference, items: &[ItemStack]) -> Vec<(ChunkPosition, u64)> {
        let (ox, oy) = origin.world_position();
        let mut created = Vec::new();
        for (i, stack) in items.iter().enumerate() {
            let offset = (i as f32 * 3.0) % TILE_SIZE_PIXELS;
            let position = crate::position::wrap_world_position(
                (ox + TILE_SIZE_PIXELS / 2.0 + offset, oy + TILE_SIZE_PIXELS / 2.0),
                self.world_size,
            );
            let pos = ChunkPosition::from_world(position, self.world_size);
            if let Some(id) = self.add_item_pickup(pos, ItemPickup::new(*stack, position)) {
                created.push((pos, id));
            }
        }
        created
    }

    /// Advance object, pickup and (when simulating) entity state of every
    /// loaded chunk. Returns the chunks whose plants advanced a stage.
    pub fn update(&mut self, dt: f32, simulate: bool) -> Vec<ChunkPosition> {
        self.clock += dt as f64;
        let tick = (self.clock * RNG_TICKS_PER_SECOND) as u64;
        let mut grown = Vec::new();
        let mut migrating = Vec::new();
        for chunk in self.store.loaded_mut() {
            let pos = chunk.position();
            if !chunk.update(dt, simulate).is_empty() {
                grown.push(pos);
            }
            if !simulate {
                continue;
            }
            let mut rng = scoped_rng(self.world_seed, pos.hash_u64(), tick);
            let (ox, oy) = pos.world_origin();
            let entities = chunk.entities_mut();
            for entity in entities.iter_mut() {
                entity.update(dt, &mut rng);
            }
            entities.retain(|entity| entity.alive);
            let mut index = 0;
            while index < entities.len() {
                let (x, y) = entities[index].position;
                let inside = x >= ox && x < ox + CHUNK_SIZE_PIXELS && y >= oy && y < oy + CHUNK_SIZE_PIXELS;
                if inside {
                    index += 1;
                } else {
                    migrating.push((pos, entities.swap_remove(index)));
                }
            }
        }
        for (from, mut entity) in migrating {
            entity.position = crate::position::wrap_world_position(entity.position, self.world_size);
            let to = ChunkPosition::from_world(entity.position, self.world_size);
            let target_ok = self
                .store
                .get_loaded(to)
                .map(|chunk| chunk.entities().len() < MAX_ENTITIES_PER_CHUNK * 2)
                .unwrap_or(false)
                && !self.is_position_blocked(entity.position);
            let destination = if target_ok { to } else { from };
            if !target_ok {
                let (ox, oy) = from.world_origin();
                entity.position = (
                    entity.position.0.clamp(ox, ox + CHUNK_SIZE_PIXELS - 1.0),
                    entity.position.1.clamp(oy, oy + CHUNK_SIZE_PIXELS - 1.0),
                );
                entity.velocity = (-entity.velocity.0, -entity.velocity.1);
            }
            if let Some(chunk) = self.store.get_loaded_mut(destination) {
                chunk.adopt_entity(entity);
            }
        }
        grown
    }

    fn try_spawn_entities(&mut self, pos: ChunkPosition) {
        let now = self.clock;
        if let Some(last) = self.entity_spawn_cooldowns.get(&pos) {
            if now - last < ENTITY_SPAWN_COOLDOWN {
                return;
            }
        }
        self.entity_spawn_cooldowns.insert(pos, now);
        let Some(entity_type) = EntityType::native_to(self.planet) else {
            return;
        };
        let Some(chunk) = self.store.get_loaded_mut(pos) else {
            return;
        };
        if chunk.entities().len() >= MAX_ENTITIES_PER_CHUNK {
            return;
        }
        let mut rng = scoped_rng(self.world_seed, pos.hash_u64(), (now * RNG_TICKS_PER_SECOND) as u64);
        if !rng.gen_bool(0.25) {
            return;
        }
        let candidates: Vec<TileCoord> = TileCoord::all().filter(|tile| !chunk.is_tile_blocked(*tile)).collect();
        if candidates.is_empty() {
            return;
        }
        let tile = candidates[rng.gen_range(0..candidates.len())];
        let (ox, oy) = pos.world_origin();
        let position = (
            ox + (tile.x as f32 + 0.5) * TILE_SIZE_PIXELS,
            oy + (tile.y as f32 + 0.5) * TILE_SIZE_PIXELS,
        );
        let id = chunk.spawn_entity(entity_type, position);
        trace!(chunk = %pos, id, entity = entity_type.as_str(), "spawned entity");
    }

    /// Entities of every loaded chunk, positions chunk-relative.
    pub fn entity_snapshot(&self) -> Vec<(ChunkPosition, Vec<EntityPod>)> {
        self.store
            .loaded()
            .map(|chunk| {
                let origin = chunk.position().world_origin();
                (
                    chunk.position(),
                    chunk.entities().iter().map(|e| e.to_pod(origin)).collect(),
                )
            })
            .collect()
    }

    /// Replace mirrored entities wholesale. Loaded chunks missing from the
    /// snapshot lose their entities; snapshot chunks not loaded here are
    /// ignored.
    pub fn apply_entity_snapshot(&mut self, snapshot: &[(ChunkPosition, Vec<EntityPod>)], latency: f32) {
        let by_chunk: BTreeMap<ChunkPosition, &Vec<EntityPod>> =
            snapshot.iter().map(|(pos, pods)| (*pos, pods)).collect();
        for chunk in self.store.loaded_mut() {
            let origin = chunk.position().world_origin();
            let entities = by_chunk
                .get(&chunk.position())
                .map(|pods| {
                    pods.iter()
                        .map(|pod| {
                            let mut entity = crate::entity::Entity::from_pod(pod, origin);
                            entity.compensate(latency);
                            entity
                        })
                        .collect()
                })
                .unwrap_or_default();
            chunk.replace_entities(entities);
        }
    }

    /// Find a land chunk near a seed-chosen start for a brand-new player,
    /// generating candidates into storage as needed. Returns the chunk and a
    /// world-pixel position on a free walkable tile inside it.
    #[instrument(skip(self), fields(planet = self.planet.as_str()))]
    pub fn find_valid_spawn_chunk(&mut self, search_radius: u16) -> (ChunkPosition, (f32, f32)) {
        let mut rng = scoped_rng(self.world_seed ^ self.planet.seed_salt(), 0, 0);
        let start = ChunkPosition::new(
            rng.gen_range(0..self.world_size),
            rng.gen_range(0..self.world_size),
        );
        for radius in 0..=search_radius as i32 {
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs() != radius && dy.abs() != radius {
                        continue;
                    }
                    let pos = start.offset(dx, dy, self.world_size);
                    if !self.store.contains(pos) {
                        self.get_chunk_data_and_generate(pos);
                    }
                    if let Some(position) = self.spawn_position_in(pos) {
                        debug!(chunk = %pos, radius, "found spawn chunk");
                        return (pos, position);
                    }
                }
            }
        }
        warn!(start = %start, search_radius, "no land found, spawning at search origin");
        let (ox, oy) = start.world_origin();
        (start, (ox + CHUNK_SIZE_PIXELS / 2.0, oy + CHUNK_SIZE_PIXELS / 2.0))
    }

    /// Centre of a free tile in a chunk that is mostly land.
    fn spawn_position_in(&self, pos: ChunkPosition) -> Option<(f32, f32)> {
        let chunk = self.store.get(pos)?;
        let free: Vec<TileCoord> = TileCoord::all().filter(|tile| !chunk.is_tile_blocked(*tile)).collect();
        if free.len() * 2 < crate::position::CHUNK_TILE_COUNT {
            return None;
        }
        let centre = (CHUNK_TILE_SIZE as i32 - 1) as f32 / 2.0;
        let tile = free.into_iter().min_by(|a, b| {
            let da = (a.x as f32 - centre).abs() + (a.y as f32 - centre).abs();
            let db = (b.x as f32 - centre).abs() + (b.y as f32 - centre).abs();
            da.total_cmp(&db)
        })?;
        let (ox, oy) = pos.world_origin();
        Some((
            ox + (tile.x as f32 + 0.5) * TILE_SIZE_PIXELS,
            oy + (tile.y as f32 + 0.5) * TILE_SIZE_PIXELS,
        ))
    }

    /// Path between two world-pixel positions over walkable tiles.
    pub fn find_path(&self, from: (f32, f32), to: (f32, f32), max_expansions: usize) -> Option<Vec<GridPos>> {
        let to_grid = |p: (f32, f32)| {
            let (x, y) = crate::position::wrap_world_position(p, self.world_size);
            GridPos::new((x / TILE_SIZE_PIXELS) as i32, (y / TILE_SIZE_PIXELS) as i32)
        };
        self.pathfinding.find_path(to_grid(from), to_grid(to), max_expansions)
    }

    /// Positions of the 8 chunks around `pos`, for callers that need to
    /// resend a neighbourhood.
    pub fn neighbourhood(&self, pos: ChunkPosition) -> Vec<ChunkPosition> {
        let mut positions = vec![pos];
        positions.extend(NEIGHBOUR_OFFSETS_8.iter().map(|(dx, dy)| pos.offset(*dx, *dy, self.world_size)));
        positions
    }
}

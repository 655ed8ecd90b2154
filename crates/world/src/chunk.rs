use std::collections::BTreeMap;

use crate::entity::{Entity, EntityType};
use crate::item_pickup::ItemPickup;
use crate::object::BuildableObject;
use crate::pod::ChunkPod;
use crate::position::{
    ChunkPosition, ObjectReference, TileCoord, CHUNK_TILE_COUNT, CHUNK_TILE_SIZE, TILE_SIZE_PIXELS,
};
use crate::structure::StructureObject;
use crate::tiles::{is_walkable, PresenceWindow, TileId, TileMapLayer, TILE_WATER};

/// Contents of one object cell: either the object itself (at its origin
/// tile) or a reference back to the origin of a multi-tile object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectSlot {
    Object(BuildableObject),
    Reference(ObjectReference),
}

/// Axis-aligned blocker in world pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CollisionRect {
    pub fn contains(&self, point: (f32, f32)) -> bool {
        point.0 >= self.x
            && point.0 < self.x + self.width
            && point.1 >= self.y
            && point.1 < self.y + self.height
    }
}

/// 8x8 tile cell of world state.
#[derive(Debug, Clone)]
pub struct Chunk {
    position: ChunkPosition,
    ground: [TileId; CHUNK_TILE_COUNT],
    objects: Vec<Option<ObjectSlot>>,
    entities: Vec<Entity>,
    next_entity_id: u32,
    item_pickups: BTreeMap<u64, ItemPickup>,
    next_pickup_id: u64,
    structure: Option<StructureObject>,
    tile_layers: BTreeMap<TileId, TileMapLayer>,
    tiles_initialized: bool,
    tilemap_revision: u64,
    collision_rects: Vec<CollisionRect>,
    modified: bool,
    generated_from_pod: bool,
}

impl Chunk {
    /// Allocate an all-water chunk.
    pub fn new(position: ChunkPosition) -> Self {
        Self {
            position,
            ground: [TILE_WATER; CHUNK_TILE_COUNT],
            objects: vec![None; CHUNK_TILE_COUNT],
            entities: Vec::new(),
            next_entity_id: 0,
            item_pickups: BTreeMap::new(),
            next_pickup_id: 0,
            structure: None,
            tile_layers: BTreeMap::new(),
            tiles_initialized: false,
            tilemap_revision: 0,
            collision_rects: Vec::new(),
            modified: false,
            generated_from_pod: false,
        }
    }

    #[inline]
    pub fn position(&self) -> ChunkPosition {
        self.position
    }

    #[inline]
    pub fn ground_tile(&self, tile: TileCoord) -> TileId {
        self.ground[tile.index()]
    }

    pub fn ground(&self) -> &[TileId; CHUNK_TILE_COUNT] {
        &self.ground
    }

    /// Overwrite a ground tile. Tilemap layers are refreshed by the caller,
    /// which can see the neighbouring chunks.
    pub fn set_ground_tile(&mut self, tile: TileCoord, id: TileId) -> bool {
        let slot = &mut self.ground[tile.index()];
        if *slot == id {
            return false;
        }
        *slot = id;
        self.modified = true;
        true
    }

    /// Used by generators, which do not count as modification.
    pub(crate) fn fill_ground(&mut self, ground: [TileId; CHUNK_TILE_COUNT]) {
        self.ground = ground;
    }

    pub fn object_slot(&self, tile: TileCoord) -> Option<&ObjectSlot> {
        self.objects[tile.index()].as_ref()
    }

    /// The object whose origin is this tile.
    pub fn object(&self, tile: TileCoord) -> Option<&BuildableObject> {
        match self.objects[tile.index()].as_ref() {
            Some(ObjectSlot::Object(object)) => Some(object),
            _ => None,
        }
    }

    pub fn object_mut(&mut self, tile: TileCoord) -> Option<&mut BuildableObject> {
        match self.objects[tile.index()].as_mut() {
            Some(ObjectSlot::Object(object)) => Some(object),
            _ => None,
        }
    }

    pub fn is_tile_occupied(&self, tile: TileCoord) -> bool {
        self.objects[tile.index()].is_some()
    }

    /// Resolve a cell to the reference of the object occupying it.
    pub fn resolve_origin(&self, tile: TileCoord) -> Option<ObjectReference> {
        match self.objects[tile.index()].as_ref()? {
            ObjectSlot::Object(_) => Some(ObjectReference::new(self.position, tile)),
            ObjectSlot::Reference(reference) => Some(*reference),
        }
    }

    /// Used by generators, which do not count as modification.
    pub(crate) fn place_generated_object(&mut self, tile: TileCoord, object: BuildableObject) {
        self.objects[tile.index()] = Some(ObjectSlot::Object(object));
    }

    /// Rebuild a reference cell while restoring from a snapshot.
    pub(crate) fn restore_object_slot(&mut self, tile: TileCoord, slot: Option<ObjectSlot>) {
        self.objects[tile.index()] = slot;
    }

    pub(crate) fn set_object_slot(&mut self, tile: TileCoord, slot: Option<ObjectSlot>) {
        self.objects[tile.index()] = slot;
        self.modified = true;
    }

    pub(crate) fn take_object_slot(&mut self, tile: TileCoord) -> Option<ObjectSlot> {
        let slot = self.objects[tile.index()].take();
        if slot.is_some() {
            self.modified = true;
        }
        slot
    }

    /// Every origin object in row-major order.
    pub fn objects(&self) -> impl Iterator<Item = (TileCoord, &BuildableObject)> {
        self.objects.iter().enumerate().filter_map(|(index, slot)| match slot {
            Some(ObjectSlot::Object(object)) => Some((TileCoord::from_index(index), object)),
            _ => None,
        })
    }

    /// Every reference cell and the origin it points at.
    pub fn references(&self) -> impl Iterator<Item = (TileCoord, ObjectReference)> + '_ {
        self.objects.iter().enumerate().filter_map(|(index, slot)| match slot {
            Some(ObjectSlot::Reference(reference)) => Some((TileCoord::from_index(index), *reference)),
            _ => None,
        })
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut Vec<Entity> {
        &mut self.entities
    }

    pub fn spawn_entity(&mut self, entity_type: EntityType, position: (f32, f32)) -> u32 {
        let id = self.next_entity_id;
        self.next_entity_id = self.next_entity_id.wrapping_add(1);
        self.entities.push(Entity::new(id, entity_type, position));
        id
    }

    /// Accept an entity that wandered in from another chunk.
    pub fn adopt_entity(&mut self, mut entity: Entity) {
        entity.id = self.next_entity_id;
        self.next_entity_id = self.next_entity_id.wrapping_add(1);
        self.entities.push(entity);
    }

    /// Wholesale replacement from an authoritative snapshot.
    pub fn replace_entities(&mut self, entities: Vec<Entity>) {
        self.next_entity_id = entities
            .iter()
            .map(|e| e.id.wrapping_add(1))
            .max()
            .unwrap_or(0)
            .max(self.next_entity_id);
        self.entities = entities;
    }

    pub fn item_pickups(&self) -> &BTreeMap<u64, ItemPickup> {
        &self.item_pickups
    }

    pub fn item_pickup(&self, id: u64) -> Option<&ItemPickup> {
        self.item_pickups.get(&id)
    }

    /// Add a pickup under a fresh id.
    pub fn add_item_pickup(&mut self, pickup: ItemPickup) -> u64 {
        let id = self.next_pickup_id;
        self.next_pickup_id += 1;
        self.item_pickups.insert(id, pickup);
        self.modified = true;
        id
    }

    /// Insert a pickup under an id chosen by the host.
    pub fn insert_item_pickup(&mut self, id: u64, pickup: ItemPickup) {
        self.next_pickup_id = self.next_pickup_id.max(id + 1);
        self.item_pickups.insert(id, pickup);
        self.modified = true;
    }

    pub fn remove_item_pickup(&mut self, id: u64) -> Option<ItemPickup> {
        let removed = self.item_pickups.remove(&id);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    pub fn structure(&self) -> Option<&StructureObject> {
        self.structure.as_ref()
    }

    pub fn structure_mut(&mut self) -> Option<&mut StructureObject> {
        self.structure.as_mut()
    }

    pub(crate) fn set_structure(&mut self, structure: Option<StructureObject>) {
        self.structure = structure;
    }

    #[inline]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    #[inline]
    pub fn generated_from_pod(&self) -> bool {
        self.generated_from_pod
    }

    #[inline]
    pub fn tiles_initialized(&self) -> bool {
        self.tiles_initialized
    }

    /// Number of tilemap refreshes applied to this chunk.
    #[inline]
    pub fn tilemap_revision(&self) -> u64 {
        self.tilemap_revision
    }

    pub fn tile_layers(&self) -> &BTreeMap<TileId, TileMapLayer> {
        &self.tile_layers
    }

    pub fn tile_layer(&self, id: TileId) -> Option<&TileMapLayer> {
        self.tile_layers.get(&id)
    }

    /// Layers drawn at a cell, ordered by tile id.
    pub fn layers_at(&self, tile: TileCoord) -> Vec<TileId> {
        let index = tile.index();
        self.tile_layers
            .iter()
            .filter(|(_, layer)| layer.is_present(index))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Set presence of one layer at one cell. Returns true on change.
    pub(crate) fn set_layer_presence(&mut self, id: TileId, tile: TileCoord, present: bool) -> bool {
        let index = tile.index();
        if present {
            let layer = self.tile_layers.entry(id).or_default();
            if layer.is_present(index) {
                return false;
            }
            layer.set_present(index, true);
            true
        } else {
            let Some(layer) = self.tile_layers.get_mut(&id) else {
                return false;
            };
            if !layer.is_present(index) {
                return false;
            }
            layer.set_present(index, false);
            if layer.is_empty() {
                self.tile_layers.remove(&id);
            }
            true
        }
    }

    pub(crate) fn refresh_layer(&mut self, id: TileId, window: &PresenceWindow) {
        if let Some(layer) = self.tile_layers.get_mut(&id) {
            layer.refresh_variations(window);
        }
    }

    pub(crate) fn finish_tilemap_refresh(&mut self) {
        self.tiles_initialized = true;
        self.tilemap_revision += 1;
    }

    pub fn collision_rects(&self) -> &[CollisionRect] {
        &self.collision_rects
    }

    /// Rebuild blockers from water tiles and path-blocking objects, merging
    /// horizontal runs per row.
    pub fn recalculate_collision(&mut self) {
        let (origin_x, origin_y) = self.position.world_origin();
        let mut rects = Vec::new();
        for y in 0..CHUNK_TILE_SIZE {
            let mut run_start: Option<usize> = None;
            for x in 0..=CHUNK_TILE_SIZE {
                let blocked = x < CHUNK_TILE_SIZE && self.is_tile_blocked(TileCoord::new(x as u8, y as u8));
                match (blocked, run_start) {
                    (true, None) => run_start = Some(x),
                    (false, Some(start)) => {
                        rects.push(CollisionRect {
                            x: origin_x + start as f32 * TILE_SIZE_PIXELS,
                            y: origin_y + y as f32 * TILE_SIZE_PIXELS,
                            width: (x - start) as f32 * TILE_SIZE_PIXELS,
                            height: TILE_SIZE_PIXELS,
                        });
                        run_start = None;
                    }
                    _ => {}
                }
            }
        }
        self.collision_rects = rects;
    }

    /// Whether a cell blocks movement: water, or any cell of a blocking
    /// object that lives in this chunk. References to objects in other
    /// chunks are treated as blocking.
    pub fn is_tile_blocked(&self, tile: TileCoord) -> bool {
        if !is_walkable(self.ground_tile(tile)) {
            return true;
        }
        match self.object_slot(tile) {
            Some(ObjectSlot::Object(object)) => object.data().blocks_path,
            Some(ObjectSlot::Reference(reference)) if reference.chunk == self.position => self
                .object(reference.tile)
                .map(|object| object.data().blocks_path)
                .unwrap_or(true),
            Some(ObjectSlot::Reference(_)) => true,
            None => false,
        }
    }

    /// Advance object and pickup timers. Returns the tiles of plants that
    /// advanced a growth stage.
    pub fn update(&mut self, dt: f32, simulate_growth: bool) -> Vec<TileCoord> {
        let mut grown = Vec::new();
        for (index, slot) in self.objects.iter_mut().enumerate() {
            if let Some(ObjectSlot::Object(object)) = slot {
                if object.update(dt, simulate_growth) {
                    grown.push(TileCoord::from_index(index));
                }
            }
        }
        if !grown.is_empty() {
            self.modified = true;
        }
        for pickup in self.item_pickups.values_mut() {
            pickup.update(dt);
        }
        grown
    }

    /// Flatten for transfer: origin objects only, pickups chunk-relative.
    pub fn to_pod(&self, world_size: u16) -> ChunkPod {
        ChunkPod {
            ground: self.ground.to_vec(),
            objects: self
                .objects()
                .map(|(tile, object)| (tile, object.to_pod()))
                .collect(),
            structure: self.structure.as_ref().map(StructureObject::to_pod),
            item_pickups: self
                .item_pickups
                .iter()
                .map(|(id, pickup)| pickup.to_pod(*id, self.position, world_size))
                .collect(),
        }
    }

    /// Replace contents from a snapshot.
    ///
    /// Cells owned by this chunk's previous objects are cleared; references
    /// into other chunks survive, since those objects are not part of the
    /// snapshot. Reference cells for the new objects are laid by the caller.
    /// The chunk is left unmodified and flagged as restored.
    pub fn load_pod(&mut self, pod: &ChunkPod, world_size: u16) {
        for (index, tile) in pod.ground.iter().take(CHUNK_TILE_COUNT).enumerate() {
            self.ground[index] = *tile;
        }
        let position = self.position;
        for slot in self.objects.iter_mut() {
            let keep = matches!(slot, Some(ObjectSlot::Reference(r)) if r.chunk != position);
            if !keep {
                *slot = None;
            }
        }
        for (tile, object_pod) in &pod.objects {
            if !tile.is_valid() {
                continue;
            }
            if let Some(object) = BuildableObject::from_pod(object_pod) {
                self.objects[tile.index()] = Some(ObjectSlot::Object(object));
            }
        }
        self.structure = pod.structure.as_ref().map(StructureObject::from_pod);
        self.item_pickups = pod
            .item_pickups
            .iter()
            .map(|p| (p.id, ItemPickup::from_pod(p, position, world_size)))
            .collect();
        self.next_pickup_id = self
            .item_pickups
            .keys()
            .next_back()
            .map(|id| id + 1)
            .unwrap_or(0);
        self.tile_layers.clear();
        self.tiles_initialized = false;
        self.collision_rects.clear();
        self.modified = false;
        self.generated_from_pod = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{OBJECT_CHEST, OBJECT_TREE};
    use crate::tiles::TILE_GRASS;
    use starhaven_core::{ItemStack, ItemType};

    fn grass_chunk(position: ChunkPosition) -> Chunk {
        let mut chunk = Chunk::new(position);
        chunk.fill_ground([TILE_GRASS; CHUNK_TILE_COUNT]);
        chunk
    }

    #[test]
    fn new_chunk_is_unmodified_water() {
        let chunk = Chunk::new(ChunkPosition::new(1, 1));
        assert!(!chunk.is_modified());
        assert_eq!(chunk.ground_tile(TileCoord::new(3, 3)), TILE_WATER);
        assert!(chunk.objects().next().is_none());
    }

    #[test]
    fn set_ground_marks_modified_only_on_change() {
        let mut chunk = grass_chunk(ChunkPosition::new(0, 0));
        assert!(!chunk.set_ground_tile(TileCoord::new(0, 0), TILE_GRASS));
        assert!(!chunk.is_modified());
        assert!(chunk.set_ground_tile(TileCoord::new(0, 0), TILE_WATER));
        assert!(chunk.is_modified());
    }

    #[test]
    fn pod_roundtrip_keeps_objects_and_pickups() {
        let position = ChunkPosition::new(3, 4);
        let mut chunk = grass_chunk(position);
        let tree = BuildableObject::new(OBJECT_TREE).unwrap();
        chunk.set_object_slot(TileCoord::new(2, 2), Some(ObjectSlot::Object(tree)));
        let origin = position.world_origin();
        chunk.add_item_pickup(ItemPickup::new(
            ItemStack::new(ItemType::WOOD, 2),
            (origin.0 + 8.0, origin.1 + 20.0),
        ));

        let pod = chunk.to_pod(16);
        let mut copy = Chunk::new(position);
        copy.load_pod(&pod, 16);

        assert_eq!(copy.ground(), chunk.ground());
        assert_eq!(copy.object(TileCoord::new(2, 2)).map(|o| o.object_type()), Some(OBJECT_TREE));
        assert_eq!(copy.object(TileCoord::new(2, 2)).map(|o| o.flash_time()), Some(0.0));
        assert_eq!(copy.item_pickup(0).map(|p| p.position), chunk.item_pickup(0).map(|p| p.position));
        assert!(!copy.is_modified());
        assert!(copy.generated_from_pod());
    }

    #[test]
    fn load_pod_twice_is_idempotent() {
        let position = ChunkPosition::new(0, 0);
        let mut chunk = grass_chunk(position);
        chunk.set_object_slot(
            TileCoord::new(1, 1),
            Some(ObjectSlot::Object(BuildableObject::new(OBJECT_CHEST).unwrap())),
        );
        chunk.add_item_pickup(ItemPickup::new(ItemStack::new(ItemType::STONE, 1), (4.0, 4.0)));
        let pod = chunk.to_pod(8);

        let mut copy = Chunk::new(position);
        copy.load_pod(&pod, 8);
        let first = copy.to_pod(8);
        copy.load_pod(&pod, 8);
        assert_eq!(copy.to_pod(8), first);
        assert_eq!(copy.item_pickups().len(), 1);
    }

    #[test]
    fn load_pod_keeps_foreign_references() {
        let position = ChunkPosition::new(1, 0);
        let mut chunk = grass_chunk(position);
        let foreign = ObjectReference::new(ChunkPosition::new(0, 0), TileCoord::new(7, 0));
        chunk.set_object_slot(TileCoord::new(0, 0), Some(ObjectSlot::Reference(foreign)));
        let pod = ChunkPod::default();
        chunk.load_pod(&pod, 8);
        assert_eq!(chunk.resolve_origin(TileCoord::new(0, 0)), Some(foreign));
    }

    #[test]
    fn collision_merges_rows() {
        let mut chunk = Chunk::new(ChunkPosition::new(0, 0));
        chunk.recalculate_collision();
        assert_eq!(chunk.collision_rects().len(), CHUNK_TILE_SIZE);
        assert_eq!(chunk.collision_rects()[0].width, CHUNK_TILE_SIZE as f32 * TILE_SIZE_PIXELS);

        let mut land = grass_chunk(ChunkPosition::new(0, 0));
        land.recalculate_collision();
        assert!(land.collision_rects().is_empty());
    }

    #[test]
    fn layer_presence_toggles() {
        let mut chunk = grass_chunk(ChunkPosition::new(0, 0));
        let tile = TileCoord::new(4, 4);
        assert!(chunk.set_layer_presence(TILE_GRASS, tile, true));
        assert!(!chunk.set_layer_presence(TILE_GRASS, tile, true));
        assert_eq!(chunk.layers_at(tile), vec![TILE_GRASS]);
        assert!(chunk.set_layer_presence(TILE_GRASS, tile, false));
        assert!(chunk.tile_layer(TILE_GRASS).is_none());
    }
}

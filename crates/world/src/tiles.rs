//! Ground tile registry and per-chunk tilemap caches.
//!
//! Every non-water tile id is its own draw layer with a fixed rank. A cell is
//! drawn in its own tile's layer and, where a cardinal neighbour holds a
//! lower-ranked tile, also in that neighbour's layer underneath, so that the
//! lower tile bleeds under the seam instead of leaving a hole.

use crate::position::{CHUNK_TILE_COUNT, CHUNK_TILE_SIZE};

/// Ground tile identifier.
pub type TileId = u16;

/// Reserved id for water / no ground.
pub const TILE_WATER: TileId = 0;
pub const TILE_SAND: TileId = 1;
pub const TILE_GRASS: TileId = 2;
pub const TILE_DIRT: TileId = 3;
pub const TILE_ROCK: TileId = 4;
pub const TILE_SNOW: TileId = 5;
pub const TILE_ICE: TileId = 6;
pub const TILE_SOIL: TileId = 7;
pub const TILE_WOODEN_FLOOR: TileId = 8;

/// Static properties of a ground tile.
#[derive(Debug, Clone, Copy)]
pub struct TileData {
    pub name: &'static str,
    /// Draw rank; higher ranks draw above lower ones. `None` for water.
    pub layer: Option<u8>,
    pub walkable: bool,
    /// Whether players may place this tile as land.
    pub placeable: bool,
}

const TILE_DATA: &[TileData] = &[
    TileData { name: "water", layer: None, walkable: false, placeable: false },
    TileData { name: "sand", layer: Some(0), walkable: true, placeable: true },
    TileData { name: "grass", layer: Some(2), walkable: true, placeable: false },
    TileData { name: "dirt", layer: Some(1), walkable: true, placeable: true },
    TileData { name: "rock", layer: Some(5), walkable: true, placeable: false },
    TileData { name: "snow", layer: Some(4), walkable: true, placeable: false },
    TileData { name: "ice", layer: Some(3), walkable: true, placeable: false },
    TileData { name: "soil", layer: Some(6), walkable: true, placeable: true },
    TileData { name: "wooden floor", layer: Some(7), walkable: true, placeable: true },
];

/// Look up a tile's static data.
pub fn tile_data(id: TileId) -> Option<&'static TileData> {
    TILE_DATA.get(id as usize)
}

/// Draw rank of a tile, `None` for water and unknown ids.
pub fn tile_layer(id: TileId) -> Option<u8> {
    tile_data(id).and_then(|data| data.layer)
}

pub fn is_walkable(id: TileId) -> bool {
    tile_data(id).map(|data| data.walkable).unwrap_or(false)
}

/// Number of registered tiles, used by the data hash.
pub fn tile_count() -> usize {
    TILE_DATA.len()
}

/// Registry names in id order, used by the data hash.
pub fn tile_names() -> impl Iterator<Item = &'static str> {
    TILE_DATA.iter().map(|data| data.name)
}

/// Tiles drawn at a cell: the cell's own tile plus every lower-ranked tile held
/// by a cardinal neighbour. Water contributes nothing and receives nothing.
pub fn layers_for_cell(own: TileId, cardinal_neighbours: [Option<TileId>; 4]) -> Vec<TileId> {
    let Some(own_rank) = tile_layer(own) else {
        return Vec::new();
    };
    let mut layers = vec![own];
    for neighbour in cardinal_neighbours.into_iter().flatten() {
        if let Some(rank) = tile_layer(neighbour) {
            if rank < own_rank && !layers.contains(&neighbour) {
                layers.push(neighbour);
            }
        }
    }
    layers
}

/// Cached presence and autotile variation of one tile layer within a chunk.
/// Derived from the ground grid and rebuilt on load, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileMapLayer {
    present: u64,
    /// Bitmask of which of the 8 neighbours also hold this layer, per cell.
    /// Bit order follows `NEIGHBOUR_OFFSETS_8`.
    variations: [u8; CHUNK_TILE_COUNT],
}

impl Default for TileMapLayer {
    fn default() -> Self {
        Self {
            present: 0,
            variations: [0; CHUNK_TILE_COUNT],
        }
    }
}

impl TileMapLayer {
    #[inline]
    pub fn is_present(&self, index: usize) -> bool {
        self.present & (1 << index) != 0
    }

    pub fn set_present(&mut self, index: usize, present: bool) {
        if present {
            self.present |= 1 << index;
        } else {
            self.present &= !(1 << index);
        }
    }

    pub fn presence_mask(&self) -> u64 {
        self.present
    }

    pub fn is_empty(&self) -> bool {
        self.present == 0
    }

    pub fn variation(&self, index: usize) -> u8 {
        self.variations[index]
    }

    /// Recompute variations from a presence window that includes a one-cell
    /// border taken from the neighbouring chunks.
    pub fn refresh_variations(&mut self, window: &PresenceWindow) {
        for index in 0..CHUNK_TILE_COUNT {
            if !self.is_present(index) {
                self.variations[index] = 0;
                continue;
            }
            let x = (index % CHUNK_TILE_SIZE) as i32;
            let y = (index / CHUNK_TILE_SIZE) as i32;
            let mut mask = 0u8;
            for (bit, (dx, dy)) in crate::position::NEIGHBOUR_OFFSETS_8.iter().enumerate() {
                if window.get(x + dx, y + dy) {
                    mask |= 1 << bit;
                }
            }
            self.variations[index] = mask;
        }
    }
}

/// Presence of one layer over a chunk plus its one-tile border.
/// Coordinates run from -1 to `CHUNK_TILE_SIZE` inclusive.
#[derive(Debug, Clone)]
pub struct PresenceWindow {
    cells: [[bool; CHUNK_TILE_SIZE + 2]; CHUNK_TILE_SIZE + 2],
}

impl Default for PresenceWindow {
    fn default() -> Self {
        Self {
            cells: [[false; CHUNK_TILE_SIZE + 2]; CHUNK_TILE_SIZE + 2],
        }
    }
}

impl PresenceWindow {
    pub fn set(&mut self, x: i32, y: i32, present: bool) {
        self.cells[(y + 1) as usize][(x + 1) as usize] = present;
    }

    pub fn get(&self, x: i32, y: i32) -> bool {
        self.cells[(y + 1) as usize][(x + 1) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn water_has_no_layers() {
        assert!(layers_for_cell(TILE_WATER, [Some(TILE_SAND); 4]).is_empty());
    }

    #[test]
    fn lower_neighbours_become_background() {
        let layers = layers_for_cell(
            TILE_GRASS,
            [Some(TILE_SAND), Some(TILE_ROCK), Some(TILE_WATER), None],
        );
        assert_eq!(layers, vec![TILE_GRASS, TILE_SAND]);
    }

    #[test]
    fn duplicate_backgrounds_collapse() {
        let layers = layers_for_cell(TILE_ROCK, [Some(TILE_SAND); 4]);
        assert_eq!(layers, vec![TILE_ROCK, TILE_SAND]);
    }

    #[test]
    fn ranks_are_unique() {
        let mut ranks: Vec<u8> = (0..tile_count() as TileId).filter_map(tile_layer).collect();
        let before = ranks.len();
        ranks.sort_unstable();
        ranks.dedup();
        assert_eq!(ranks.len(), before);
    }

    #[test]
    fn variations_follow_window() {
        let mut layer = TileMapLayer::default();
        layer.set_present(0, true);
        let mut window = PresenceWindow::default();
        window.set(0, 0, true);
        window.set(1, 0, true);
        window.set(-1, -1, true);
        layer.refresh_variations(&window);
        // bit 0 = (-1,-1), bit 4 = (1,0)
        assert_eq!(layer.variation(0), 0b0001_0001);
        assert_eq!(layer.variation(1), 0);
    }
}

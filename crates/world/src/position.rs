use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Chunk width and height in tiles.
pub const CHUNK_TILE_SIZE: usize = 8;
/// Tiles per chunk.
pub const CHUNK_TILE_COUNT: usize = CHUNK_TILE_SIZE * CHUNK_TILE_SIZE;
/// Size of one tile in world pixels.
pub const TILE_SIZE_PIXELS: f32 = 16.0;
/// Size of one chunk in world pixels.
pub const CHUNK_SIZE_PIXELS: f32 = TILE_SIZE_PIXELS * CHUNK_TILE_SIZE as f32;

/// Chunk coordinate on the toroidal chunk grid.
///
/// Ordered by `(y, x)` so that row-major iteration over a `BTreeMap` matches
/// the order chunks are laid out on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPosition {
    pub x: u16,
    pub y: u16,
}

impl ChunkPosition {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Whether this position names a chunk of a world `world_size` chunks
    /// across.
    pub fn is_within(self, world_size: u16) -> bool {
        self.x < world_size && self.y < world_size
    }

    /// Offset by a signed amount, wrapping modulo `world_size`.
    pub fn offset(self, dx: i32, dy: i32, world_size: u16) -> Self {
        let size = world_size.max(1) as i32;
        Self {
            x: (self.x as i32 + dx).rem_euclid(size) as u16,
            y: (self.y as i32 + dy).rem_euclid(size) as u16,
        }
    }

    /// World-pixel position of this chunk's top-left corner.
    pub fn world_origin(self) -> (f32, f32) {
        (
            self.x as f32 * CHUNK_SIZE_PIXELS,
            self.y as f32 * CHUNK_SIZE_PIXELS,
        )
    }

    /// Chunk containing a world-pixel position (wrapped first).
    pub fn from_world(position: (f32, f32), world_size: u16) -> Self {
        let (x, y) = wrap_world_position(position, world_size);
        let max = world_size.max(1) - 1;
        Self {
            x: ((x / CHUNK_SIZE_PIXELS) as u16).min(max),
            y: ((y / CHUNK_SIZE_PIXELS) as u16).min(max),
        }
    }

    /// The 8 surrounding chunks, wrapping at the world edge.
    pub fn neighbours(self, world_size: u16) -> impl Iterator<Item = ChunkPosition> {
        NEIGHBOUR_OFFSETS_8
            .into_iter()
            .map(move |(dx, dy)| self.offset(dx, dy, world_size))
    }

    /// Shortest wrapped Chebyshev distance between two chunks.
    pub fn wrapped_distance(self, other: Self, world_size: u16) -> u16 {
        let size = world_size.max(1);
        let axis = |a: u16, b: u16| {
            let d = a.abs_diff(b) % size;
            d.min(size - d)
        };
        axis(self.x, other.x).max(axis(self.y, other.y))
    }

    /// Stable hash used to seed per-chunk randomness.
    pub fn hash_u64(self) -> u64 {
        ((self.y as u64) << 16 | self.x as u64).wrapping_mul(0xA24B_AED4_963E_E407)
    }
}

impl Ord for ChunkPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.y.cmp(&other.y).then(self.x.cmp(&other.x))
    }
}

impl PartialOrd for ChunkPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ChunkPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Offsets of the 8 neighbouring cells, in a fixed order.
pub const NEIGHBOUR_OFFSETS_8: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Offsets of the 4 cardinal neighbours.
pub const CARDINAL_OFFSETS: [(i32, i32); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

/// Tile coordinate inside a chunk, each axis in `0..CHUNK_TILE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u8,
    pub y: u8,
}

impl TileCoord {
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Linear index into per-tile arrays.
    #[inline]
    pub fn index(self) -> usize {
        debug_assert!((self.x as usize) < CHUNK_TILE_SIZE);
        debug_assert!((self.y as usize) < CHUNK_TILE_SIZE);
        self.y as usize * CHUNK_TILE_SIZE + self.x as usize
    }

    /// Inverse of [`TileCoord::index`].
    pub fn from_index(index: usize) -> Self {
        Self {
            x: (index % CHUNK_TILE_SIZE) as u8,
            y: (index / CHUNK_TILE_SIZE) as u8,
        }
    }

    pub fn is_valid(self) -> bool {
        (self.x as usize) < CHUNK_TILE_SIZE && (self.y as usize) < CHUNK_TILE_SIZE
    }

    /// Every tile of a chunk in row-major order.
    pub fn all() -> impl Iterator<Item = TileCoord> {
        (0..CHUNK_TILE_COUNT).map(Self::from_index)
    }
}

/// Step from a tile by a signed offset, crossing into neighbouring chunks and
/// wrapping at the world edge.
pub fn offset_tile(
    chunk: ChunkPosition,
    tile: TileCoord,
    dx: i32,
    dy: i32,
    world_size: u16,
) -> (ChunkPosition, TileCoord) {
    let size = CHUNK_TILE_SIZE as i32;
    let tx = tile.x as i32 + dx;
    let ty = tile.y as i32 + dy;
    let chunk = chunk.offset(tx.div_euclid(size), ty.div_euclid(size), world_size);
    let tile = TileCoord::new(tx.rem_euclid(size) as u8, ty.rem_euclid(size) as u8);
    (chunk, tile)
}

/// Global tile coordinate of a chunk tile.
pub fn global_tile(chunk: ChunkPosition, tile: TileCoord) -> (u32, u32) {
    (
        chunk.x as u32 * CHUNK_TILE_SIZE as u32 + tile.x as u32,
        chunk.y as u32 * CHUNK_TILE_SIZE as u32 + tile.y as u32,
    )
}

/// Wrap a world-pixel position into `[0, world_pixels)` on both axes.
pub fn wrap_world_position(position: (f32, f32), world_size: u16) -> (f32, f32) {
    let extent = world_size.max(1) as f32 * CHUNK_SIZE_PIXELS;
    (position.0.rem_euclid(extent), position.1.rem_euclid(extent))
}

/// Stable, serialisable handle to a built object's origin cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectReference {
    pub chunk: ChunkPosition,
    pub tile: TileCoord,
}

impl ObjectReference {
    pub const fn new(chunk: ChunkPosition, tile: TileCoord) -> Self {
        Self { chunk, tile }
    }

    /// World-pixel position of the referenced tile's top-left corner.
    pub fn world_position(self) -> (f32, f32) {
        let (ox, oy) = self.chunk.world_origin();
        (
            ox + self.tile.x as f32 * TILE_SIZE_PIXELS,
            oy + self.tile.y as f32 * TILE_SIZE_PIXELS,
        )
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{},{}]", self.chunk, self.tile.x, self.tile.y)
    }
}

/// Rectangle of chunks visible to one viewer, anchored at its top-left chunk.
/// Both extents wrap around the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkViewRange {
    pub top_left: ChunkPosition,
    pub width: u16,
    pub height: u16,
}

impl ChunkViewRange {
    /// View centred on a world-pixel position, extending `radius` chunks each way.
    pub fn around(position: (f32, f32), radius: u16, world_size: u16) -> Self {
        let centre = ChunkPosition::from_world(position, world_size);
        let span = (radius * 2 + 1).min(world_size.max(1));
        Self {
            top_left: centre.offset(-(radius as i32), -(radius as i32), world_size),
            width: span,
            height: span,
        }
    }

    /// Every chunk covered, row by row.
    pub fn positions(&self, world_size: u16) -> impl Iterator<Item = ChunkPosition> + '_ {
        let width = self.width.min(world_size.max(1));
        let height = self.height.min(world_size.max(1));
        (0..height).flat_map(move |dy| {
            (0..width).map(move |dx| self.top_left.offset(dx as i32, dy as i32, world_size))
        })
    }

    pub fn contains(&self, pos: ChunkPosition, world_size: u16) -> bool {
        let size = world_size.max(1) as i32;
        let dx = (pos.x as i32 - self.top_left.x as i32).rem_euclid(size);
        let dy = (pos.y as i32 - self.top_left.y as i32).rem_euclid(size);
        dx < self.width as i32 && dy < self.height as i32
    }
}

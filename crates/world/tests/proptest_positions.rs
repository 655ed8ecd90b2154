//! Property-based tests for wrap-around position arithmetic.
//!
//! Critical invariants:
//! - Offsets always land inside the world
//! - Offsetting and then offsetting back returns the start
//! - Chunk ordering is row-major
//! - Tile steps across chunk edges agree with global tile arithmetic

use proptest::prelude::*;
use starhaven_world::{
    global_tile, offset_tile, ChunkPosition, ChunkViewRange, TileCoord, CHUNK_TILE_SIZE,
};

proptest! {
    #[test]
    fn offset_stays_in_world_and_inverts(
        world_size in 1u16..300,
        x in 0u16..300,
        y in 0u16..300,
        dx in -1000i32..1000,
        dy in -1000i32..1000,
    ) {
        let start = ChunkPosition::new(x % world_size, y % world_size);
        let moved = start.offset(dx, dy, world_size);
        prop_assert!(moved.x < world_size && moved.y < world_size);
        prop_assert_eq!(moved.offset(-dx, -dy, world_size), start);
    }

    #[test]
    fn ordering_is_row_major(ax in 0u16..50, ay in 0u16..50, bx in 0u16..50, by in 0u16..50) {
        let a = ChunkPosition::new(ax, ay);
        let b = ChunkPosition::new(bx, by);
        prop_assert_eq!(a.cmp(&b), (ay, ax).cmp(&(by, bx)));
    }

    #[test]
    fn tile_offsets_match_global_tiles(
        world_size in 1u16..64,
        cx in 0u16..64,
        cy in 0u16..64,
        tx in 0u8..8,
        ty in 0u8..8,
        dx in -40i32..40,
        dy in -40i32..40,
    ) {
        let chunk = ChunkPosition::new(cx % world_size, cy % world_size);
        let tile = TileCoord::new(tx, ty);
        let (moved_chunk, moved_tile) = offset_tile(chunk, tile, dx, dy, world_size);
        prop_assert!(moved_tile.is_valid());

        let side = world_size as i64 * CHUNK_TILE_SIZE as i64;
        let (gx, gy) = global_tile(chunk, tile);
        let expected = (
            (gx as i64 + dx as i64).rem_euclid(side) as u32,
            (gy as i64 + dy as i64).rem_euclid(side) as u32,
        );
        prop_assert_eq!(global_tile(moved_chunk, moved_tile), expected);
    }

    #[test]
    fn view_ranges_contain_their_positions(
        world_size in 1u16..40,
        x in 0u16..40,
        y in 0u16..40,
        radius in 0u16..6,
    ) {
        let centre = ChunkPosition::new(x % world_size, y % world_size);
        let view = ChunkViewRange::around(centre.world_origin(), radius, world_size);
        let positions: Vec<_> = view.positions(world_size).collect();
        prop_assert!(positions.contains(&centre));
        for pos in &positions {
            prop_assert!(view.contains(*pos, world_size));
            prop_assert!(pos.wrapped_distance(centre, world_size) <= radius);
        }
    }
}

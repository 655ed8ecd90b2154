//! Chunk transfer worldtest.
//!
//! Generates a neighbourhood on an authoritative manager, edits it, ships
//! every chunk through the persisted POD codec and checks that a mirror
//! manager rebuilds the same world.

use starhaven_core::{ItemStack, ItemType, PlanetType};
use starhaven_world::{
    decode_chunk_pod, encode_chunk_pod, BuildableObject, ChunkManager, ChunkPosition,
    ChunkViewRange, ItemPickup, TileCoord, OBJECT_ROCKET, TILE_GRASS, TILE_SIZE_PIXELS,
};

const WORLD_SEED: u64 = 0x5eed_cafe;
const WORLD_SIZE: u16 = 24;

fn clear_for_rocket(manager: &mut ChunkManager, pos: ChunkPosition, tile: TileCoord) {
    for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        let (chunk, cell) = starhaven_world::offset_tile(pos, tile, dx, dy, WORLD_SIZE);
        manager.delete_object(chunk, cell);
        manager.set_chunk_tile(chunk, cell, TILE_GRASS);
    }
}

#[test]
fn chunk_sync_worldtest() {
    let mut host = ChunkManager::new(WORLD_SEED, PlanetType::VERDANT, WORLD_SIZE);
    let view = ChunkViewRange {
        top_left: ChunkPosition::new(WORLD_SIZE - 1, WORLD_SIZE - 1),
        width: 3,
        height: 3,
    };
    let mut requests = Vec::new();
    host.update_chunks(&[view], false, &mut requests);

    // A rocket straddling the world's wrap seam.
    let origin_chunk = ChunkPosition::new(WORLD_SIZE - 1, WORLD_SIZE - 1);
    let origin_tile = TileCoord::new(7, 7);
    clear_for_rocket(&mut host, origin_chunk, origin_tile);
    let rocket = BuildableObject::new(OBJECT_ROCKET).expect("rocket registered");
    let origin = host
        .set_object(origin_chunk, origin_tile, rocket)
        .expect("rocket fits on cleared land");

    let pickup_chunk = ChunkPosition::new(0, 0);
    let (ox, oy) = pickup_chunk.world_origin();
    let pickup_position = (ox + 3.5 * TILE_SIZE_PIXELS, oy + 6.25 * TILE_SIZE_PIXELS);
    host.add_item_pickup(pickup_chunk, ItemPickup::new(ItemStack::new(ItemType::WOOD, 2), pickup_position))
        .expect("chunk is resident");

    let mut mirror = ChunkManager::new(WORLD_SEED ^ 1, PlanetType::VERDANT, WORLD_SIZE);
    let mut mirror_requests = Vec::new();
    mirror.update_chunks(&[view], true, &mut mirror_requests);
    assert_eq!(mirror_requests.len(), 9);

    for pos in &mirror_requests {
        let bytes = encode_chunk_pod(&host.get_chunk_data_and_generate(*pos)).expect("encode");
        let pod = decode_chunk_pod(&bytes).expect("decode");
        mirror.set_chunk_data(*pos, &pod);
    }
    mirror_requests.clear();
    mirror.update_chunks(&[view], true, &mut mirror_requests);
    assert!(mirror_requests.is_empty(), "all chunks arrived");

    for pos in view.positions(WORLD_SIZE) {
        let a = host.chunk(pos).expect("host chunk");
        let b = mirror.chunk(pos).expect("mirror chunk");
        assert_eq!(a.ground(), b.ground(), "ground differs at {pos}");
        assert_eq!(a.to_pod(WORLD_SIZE), b.to_pod(WORLD_SIZE), "contents differ at {pos}");
        assert!(!b.is_modified());
        assert!(b.tiles_initialized());
        assert_eq!(a.layers_at(TileCoord::new(0, 0)), b.layers_at(TileCoord::new(0, 0)));
    }

    for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        let (chunk, cell) = starhaven_world::offset_tile(origin_chunk, origin_tile, dx, dy, WORLD_SIZE);
        assert_eq!(mirror.resolve_object(chunk, cell), Some(origin));
    }

    let mirrored = mirror
        .chunk(pickup_chunk)
        .and_then(|chunk| chunk.item_pickups().values().next().cloned())
        .expect("pickup mirrored");
    assert!((mirrored.position.0 - pickup_position.0).abs() < 1e-3);
    assert!((mirrored.position.1 - pickup_position.1).abs() < 1e-3);

    // Destroying through a reference cell on the far side of the seam clears
    // the whole footprint.
    let (far_chunk, far_tile) = starhaven_world::offset_tile(origin_chunk, origin_tile, 1, 1, WORLD_SIZE);
    let (removed, _) = mirror.delete_object(far_chunk, far_tile).expect("rocket removed");
    assert_eq!(removed, origin);
    for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        let (chunk, cell) = starhaven_world::offset_tile(origin_chunk, origin_tile, dx, dy, WORLD_SIZE);
        assert_eq!(mirror.resolve_object(chunk, cell), None);
    }
}

//! Property-based tests for the loaded/stored working set.
//!
//! Critical invariants:
//! - A position is never both loaded and stored
//! - Unloading never loses a modified chunk

use proptest::prelude::*;
use starhaven_world::{
    Chunk, ChunkManager, ChunkPosition, ChunkStore, ChunkViewRange, TileCoord, TILE_SAND,
};
use starhaven_core::PlanetType;

#[derive(Debug, Clone)]
enum StoreOp {
    InsertLoaded(u16, u16),
    InsertStored(u16, u16),
    Promote(u16, u16),
    Demote(u16, u16),
    Remove(u16, u16),
}

fn store_op() -> impl Strategy<Value = StoreOp> {
    let coord = (0u16..6, 0u16..6);
    prop_oneof![
        coord.clone().prop_map(|(x, y)| StoreOp::InsertLoaded(x, y)),
        coord.clone().prop_map(|(x, y)| StoreOp::InsertStored(x, y)),
        coord.clone().prop_map(|(x, y)| StoreOp::Promote(x, y)),
        coord.clone().prop_map(|(x, y)| StoreOp::Demote(x, y)),
        coord.prop_map(|(x, y)| StoreOp::Remove(x, y)),
    ]
}

proptest! {
    #[test]
    fn loaded_and_stored_stay_disjoint(ops in proptest::collection::vec(store_op(), 1..80)) {
        let mut store = ChunkStore::new(8);
        for op in ops {
            match op {
                StoreOp::InsertLoaded(x, y) => store.insert_loaded(Chunk::new(ChunkPosition::new(x, y))),
                StoreOp::InsertStored(x, y) => store.insert_stored(Chunk::new(ChunkPosition::new(x, y))),
                StoreOp::Promote(x, y) => {
                    store.promote(ChunkPosition::new(x, y));
                }
                StoreOp::Demote(x, y) => {
                    store.demote(ChunkPosition::new(x, y));
                }
                StoreOp::Remove(x, y) => {
                    store.remove_loaded(ChunkPosition::new(x, y));
                }
            }
            prop_assert!(store.is_consistent());
            for pos in store.loaded_positions() {
                prop_assert!(!store.is_stored(pos));
            }
        }
    }

    #[test]
    fn view_changes_never_drop_modified_chunks(
        seed in any::<u64>(),
        views in proptest::collection::vec((0u16..12, 0u16..12), 1..6),
        edits in proptest::collection::vec((0usize..6, 0u8..8, 0u8..8), 0..6),
    ) {
        let mut manager = ChunkManager::new(seed, PlanetType::VERDANT, 12);
        let mut edited = Vec::new();
        for (step, (x, y)) in views.iter().enumerate() {
            let view = ChunkViewRange { top_left: ChunkPosition::new(*x, *y), width: 2, height: 2 };
            let mut requests = Vec::new();
            manager.update_chunks(&[view], false, &mut requests);
            prop_assert!(requests.is_empty());
            for (edit_step, tx, ty) in &edits {
                if *edit_step == step && manager.set_chunk_tile(view.top_left, TileCoord::new(*tx, *ty), TILE_SAND) {
                    edited.push(view.top_left);
                }
            }
            manager.unload_chunks_out_of_view(&[]);
            prop_assert!(manager.store().is_consistent());
            for pos in &edited {
                prop_assert!(manager.is_chunk_generated(*pos));
            }
        }
    }
}

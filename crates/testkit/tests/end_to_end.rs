//! End-to-end protocol scenarios over the loopback hub.

use starhaven_core::{ItemStack, ItemType, LocationState, PlanetType};
use starhaven_net::protocol::ItemPickupRequest;
use starhaven_session::{mutation, Role, SessionConfig};
use starhaven_testkit::{Harness, Peer};
use starhaven_world::{
    BuildableObject, ChunkPosition, ObjectReference, ObjectTypeId, TileCoord, CHUNK_TILE_SIZE, OBJECT_ROCK,
};

const SEED: u64 = 0xC0FFEE;
const MAX_FRAMES: u64 = 200;

fn config() -> SessionConfig {
    SessionConfig {
        world_size: 16,
        view_radius: 1,
        spawn_water_search_radius: 4,
        ..SessionConfig::default()
    }
}

fn surface() -> LocationState {
    LocationState::surface(PlanetType::VERDANT)
}

fn joined_harness(clients: usize) -> Harness {
    let mut harness = Harness::new(config(), SEED);
    for i in 0..clients {
        harness.add_client(&format!("pilot-{i}"));
    }
    assert!(harness.settle_joins(MAX_FRAMES), "clients joined");
    assert!(harness.clients().iter().all(|c| c.handler.is_joined()));
    harness
}

fn request_chunk(peer: &mut Peer, pos: ChunkPosition) {
    let Peer { handler, game } = peer;
    handler.request_chunks_from_host(game, &[pos], true).unwrap();
}

fn has_chunk(peer: &Peer, pos: ChunkPosition) -> bool {
    peer.game
        .world
        .planet(PlanetType::VERDANT)
        .is_some_and(|planet| planet.chunks.is_chunk_generated(pos))
}

/// A free cell for `object_type` on the host whose footprint stays inside `pos`.
fn free_cell(harness: &mut Harness, pos: ChunkPosition, object_type: ObjectTypeId) -> Option<TileCoord> {
    let (w, h) = BuildableObject::new(object_type)?.size();
    let chunks = &mut harness.host_mut().game.world.planet_mut(PlanetType::VERDANT)?.chunks;
    chunks.get_chunk_data_and_generate(pos);
    TileCoord::all().find(|tile| {
        tile.x as usize + w as usize <= CHUNK_TILE_SIZE
            && tile.y as usize + h as usize <= CHUNK_TILE_SIZE
            && chunks.can_place_object(pos, *tile, object_type)
    })
}

#[test]
fn requested_chunk_matches_the_host() {
    let mut harness = joined_harness(1);
    let pos = ChunkPosition::new(0, 0);
    let host_ground = {
        let chunks = &mut harness.host_mut().game.world.planet_mut(PlanetType::VERDANT).unwrap().chunks;
        chunks.get_chunk_data_and_generate(pos);
        *chunks.chunk(pos).unwrap().ground()
    };

    request_chunk(harness.client_mut(0), pos);
    assert!(harness.run_until(MAX_FRAMES, |h| has_chunk(h.client(0), pos)));

    let client = harness.client(0);
    let chunk = client.game.world.planet(PlanetType::VERDANT).unwrap().chunks.chunk(pos).unwrap();
    assert_eq!(*chunk.ground(), host_ground);
    assert!(!chunk.is_modified());
    assert!(!client.handler.outstanding_chunk_requests().is_outstanding(pos));
}

#[test]
fn requested_pickup_lands_at_the_chunk_relative_offset() {
    let mut harness = joined_harness(1);
    let pos = ChunkPosition::new(2, 3);
    request_chunk(harness.client_mut(0), pos);
    assert!(harness.run_until(MAX_FRAMES, |h| has_chunk(h.client(0), pos)));

    let offset = (40.0, 24.0);
    {
        let Peer { handler, game } = harness.client_mut(0);
        handler
            .create_item_pickups(
                game,
                surface(),
                vec![ItemPickupRequest {
                    chunk: pos,
                    relative_position: offset,
                    item: ItemStack::new(ItemType::STONE, 2),
                }],
            )
            .unwrap();
    }
    let mirrored = |peer: &Peer| {
        peer.game
            .world
            .planet(PlanetType::VERDANT)
            .and_then(|planet| planet.chunks.chunk(pos))
            .map_or(0, |chunk| chunk.item_pickups().len())
    };
    assert!(harness.run_until(MAX_FRAMES, |h| mirrored(h.client(0)) == 1));

    let origin = pos.world_origin();
    let chunk = harness.client(0).game.world.planet(PlanetType::VERDANT).unwrap().chunks.chunk(pos).unwrap();
    let pickup = chunk.item_pickups().values().next().unwrap();
    assert!((pickup.position.0 - (origin.0 + offset.0)).abs() < 1e-3);
    assert!((pickup.position.1 - (origin.1 + offset.1)).abs() < 1e-3);
    assert_eq!(pickup.item, ItemStack::new(ItemType::STONE, 2));
    assert_eq!(mirrored(harness.host()), 1);
}

#[test]
fn host_destruction_empties_the_tile_everywhere() {
    let mut harness = joined_harness(2);
    let pos = ChunkPosition::new(5, 5);
    let tile = free_cell(&mut harness, pos, OBJECT_ROCK).expect("free cell");
    for i in 0..2 {
        request_chunk(harness.client_mut(i), pos);
    }
    assert!(harness.run_until(MAX_FRAMES, |h| h.clients().iter().all(|c| has_chunk(c, pos))));

    let reference = ObjectReference::new(pos, tile);
    {
        let Peer { handler, game } = harness.host_mut();
        assert!(handler.build_object(game, surface(), reference, OBJECT_ROCK).unwrap());
    }
    let present = |peer: &Peer| mutation::object(&peer.game.world, &surface(), reference).is_some();
    assert!(harness.run_until(MAX_FRAMES, |h| h.clients().iter().all(present)));

    {
        let Peer { handler, game } = harness.host_mut();
        handler.destroy_object(game, surface(), reference).unwrap();
    }
    assert!(harness.run_until(MAX_FRAMES, |h| !h.clients().iter().any(present)));
    assert!(!present(harness.host()));
}

#[test]
fn only_the_collector_is_credited() {
    let mut harness = joined_harness(2);
    let pos = ChunkPosition::new(1, 1);
    for i in 0..2 {
        request_chunk(harness.client_mut(i), pos);
    }
    assert!(harness.run_until(MAX_FRAMES, |h| h.clients().iter().all(|c| has_chunk(c, pos))));
    {
        let Peer { handler, game } = harness.host_mut();
        handler
            .create_item_pickups(
                game,
                surface(),
                vec![ItemPickupRequest {
                    chunk: pos,
                    relative_position: (8.0, 8.0),
                    item: ItemStack::new(ItemType::BERRIES, 5),
                }],
            )
            .unwrap();
    }
    let pickup_id = |peer: &Peer| {
        peer.game
            .world
            .planet(PlanetType::VERDANT)
            .and_then(|planet| planet.chunks.chunk(pos))
            .and_then(|chunk| chunk.item_pickups().keys().next().copied())
    };
    assert!(harness.run_until(MAX_FRAMES, |h| h.clients().iter().all(|c| pickup_id(c).is_some())));

    let id = pickup_id(harness.client(0)).unwrap();
    {
        let Peer { handler, game } = harness.client_mut(0);
        assert!(handler.collect_item_pickup(game, surface(), pos, id).unwrap());
    }
    assert!(harness.run_until(MAX_FRAMES, |h| {
        h.client(0).game.player.inventory.count_of(ItemType::BERRIES) == 5 && pickup_id(h.client(1)).is_none()
    }));
    assert_eq!(harness.client(1).game.player.inventory.count_of(ItemType::BERRIES), 0);
    assert_eq!(harness.host().game.player.inventory.count_of(ItemType::BERRIES), 0);
    assert!(pickup_id(harness.host()).is_none());
}

#[test]
fn mismatched_data_hash_is_turned_away() {
    let mut harness = Harness::new(config(), SEED);
    harness.add_client_with_hash("modded", 0x0bad_cafe);
    harness.run(40);

    let client = harness.client(0);
    assert_eq!(client.handler.role(), Role::Solo);
    assert!(!client.game.notices.is_empty());
    assert_eq!(harness.host().handler.players().count(), 0);
}

#[test]
fn planet_travel_reaches_host_and_client() {
    let mut harness = joined_harness(1);
    {
        let Peer { handler, game } = harness.client_mut(0);
        handler.request_planet_travel(game, PlanetType::DUNE).unwrap();
    }
    let dune = LocationState::surface(PlanetType::DUNE);
    assert!(harness.run_until(MAX_FRAMES, |h| h.client(0).game.player.location == dune));

    let peer = harness.client(0).peer();
    assert_eq!(harness.host().handler.player(peer).unwrap().location(), dune);
    assert!(harness.client(0).game.world_maps.iter().any(|map| map.planet == PlanetType::DUNE));
}

#[test]
fn rejoining_restores_saved_player_data() {
    let mut harness = joined_harness(1);
    let peer = harness.client(0).peer();
    harness.client_mut(0).game.player.inventory.add_item(ItemType::WOOD, 7);
    harness.client_mut(0).handler.queue_send_player_data();
    assert!(harness.run_until(MAX_FRAMES, |h| {
        h.host()
            .handler
            .player(peer)
            .is_some_and(|p| p.data.inventory.count_of(ItemType::WOOD) == 7)
    }));

    harness.disconnect(peer);
    harness.run(4);
    assert!(harness.host().handler.saved_player_data(peer).is_some());

    harness.reconnect_client(0);
    assert!(harness.settle_joins(MAX_FRAMES));
    assert_eq!(harness.client(0).game.player.inventory.count_of(ItemType::WOOD), 7);
}

#[test]
fn report_counts_joined_clients() {
    let harness = joined_harness(2);
    let report = harness.report("two_clients");
    let session = report.session.expect("session metrics");
    assert_eq!(session.clients_joined, 2);
    assert_eq!(session.peers.len(), 3);
    assert!(session.bytes_sent > 0);
}

//! In-process sessions over the loopback hub for unit tests.

use starhaven_core::{LocationState, PeerId, PlanetType, PlayerData};
use starhaven_net::{LoopbackHub, LoopbackTransport};
use starhaven_world::{
    BuildableObject, ChunkPosition, ObjectTypeId, TileCoord, World, WorldMapSnapshot, CHUNK_TILE_SIZE,
};

use crate::config::SessionConfig;
use crate::game::GameFacade;
use crate::handler::NetworkHandler;
use crate::player::CharacterState;

pub const HOST_PEER: PeerId = PeerId(1);
pub const WORLD_SIZE: u16 = 16;
const HOST_SEED: u64 = 0x5eed;
const PUMP_ROUNDS: usize = 24;

pub fn test_config() -> SessionConfig {
    SessionConfig {
        world_size: WORLD_SIZE,
        view_radius: 1,
        spawn_water_search_radius: 4,
        ..SessionConfig::default()
    }
}

/// Minimal game: a world, the local player and a record of callbacks.
pub struct TestGame {
    pub world: World,
    pub player: PlayerData,
    pub chat: Vec<(String, String)>,
    pub notices: Vec<String>,
    pub opened_chests: Vec<u16>,
    pub world_maps: Vec<WorldMapSnapshot>,
    pub travels: Vec<(LocationState, (f32, f32))>,
}

impl TestGame {
    pub fn new(name: &str, world: World) -> Self {
        Self {
            world,
            player: PlayerData::new(name),
            chat: Vec::new(),
            notices: Vec::new(),
            opened_chests: Vec::new(),
            world_maps: Vec::new(),
            travels: Vec::new(),
        }
    }

    /// A host standing on the starting planet.
    pub fn host() -> Self {
        let mut game = Self::new("host", World::new(HOST_SEED, WORLD_SIZE));
        let location = LocationState::surface(PlanetType::VERDANT);
        game.world.init_location(&location);
        if let Some(planet) = game.world.planet_mut(PlanetType::VERDANT) {
            game.player.position = planet.chunks.find_valid_spawn_chunk(4).1;
        }
        game.player.location = location;
        game.player.spawned = true;
        game
    }
}

impl GameFacade for TestGame {
    fn world(&self) -> &World {
        &self.world
    }

    fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    fn player_data(&self) -> &PlayerData {
        &self.player
    }

    fn player_data_mut(&mut self) -> &mut PlayerData {
        &mut self.player
    }

    fn character_state(&self) -> CharacterState {
        CharacterState::idle(self.player.location, self.player.position)
    }

    fn travel_to(&mut self, location: LocationState, position: (f32, f32)) {
        self.player.location = location;
        self.player.position = position;
        self.travels.push((location, position));
    }

    fn show_notice(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }

    fn chat_received(&mut self, name: &str, text: &str) {
        self.chat.push((name.to_string(), text.to_string()));
    }

    fn chest_opened(&mut self, chest_id: u16) {
        self.opened_chests.push(chest_id);
    }

    fn world_map_received(&mut self, map: WorldMapSnapshot) {
        self.world_maps.push(map);
    }
}

pub type TestHandler = NetworkHandler<LoopbackTransport>;

/// A host and its clients on one loopback hub.
pub struct TestSession {
    pub hub: LoopbackHub,
    pub host: TestHandler,
    pub host_game: TestGame,
    pub clients: Vec<(TestHandler, TestGame)>,
}

impl TestSession {
    /// A host plus `clients` linked clients that have not been pumped yet.
    pub fn new(clients: usize) -> Self {
        let hub = LoopbackHub::new(7);
        let host = NetworkHandler::host(hub.transport(HOST_PEER), test_config());
        let mut session = Self {
            hub,
            host,
            host_game: TestGame::host(),
            clients: Vec::new(),
        };
        for _ in 0..clients {
            session.add_client();
        }
        session
    }

    /// Every client has completed its join.
    pub fn joined(clients: usize) -> Self {
        let mut session = Self::new(clients);
        session.pump();
        assert!(
            session.clients.iter().all(|(client, _)| client.is_joined()),
            "all clients joined"
        );
        session
    }

    fn next_peer(&self) -> PeerId {
        PeerId(100 + self.clients.len() as u64)
    }

    pub fn add_client(&mut self) -> PeerId {
        let peer = self.next_peer();
        let handler = NetworkHandler::client(self.hub.transport(peer), test_config());
        self.push_client(peer, handler)
    }

    pub fn add_client_with_hash(&mut self, data_hash: u64) -> PeerId {
        let peer = self.next_peer();
        let handler = NetworkHandler::client(self.hub.transport(peer), test_config()).with_data_hash(data_hash);
        self.push_client(peer, handler)
    }

    fn push_client(&mut self, peer: PeerId, handler: TestHandler) -> PeerId {
        let game = TestGame::new(&format!("pilot-{}", peer.0), World::new(0, WORLD_SIZE));
        self.hub.link(HOST_PEER, peer);
        self.clients.push((handler, game));
        peer
    }

    /// Restart client `index` with fresh local state and the same peer id.
    pub fn reconnect_client(&mut self, index: usize) {
        let peer = self.clients[index].0.local_peer();
        let handler = NetworkHandler::client(self.hub.transport(peer), test_config());
        let game = TestGame::new(&format!("pilot-{}", peer.0), World::new(0, WORLD_SIZE));
        self.clients[index] = (handler, game);
        self.hub.link(HOST_PEER, peer);
    }

    pub fn host_mut(&mut self) -> (&mut TestHandler, &mut TestGame) {
        (&mut self.host, &mut self.host_game)
    }

    pub fn client_mut(&mut self, index: usize) -> (&mut TestHandler, &mut TestGame) {
        let (handler, game) = &mut self.clients[index];
        (handler, game)
    }

    pub fn all_games(&self) -> impl Iterator<Item = &TestGame> {
        std::iter::once(&self.host_game).chain(self.clients.iter().map(|(_, game)| game))
    }

    /// Run enough frames for requests to be answered and debounced sends
    /// to go out.
    pub fn pump(&mut self) {
        let dt = self.host.config().server_update_tick;
        for _ in 0..PUMP_ROUNDS {
            self.host.update(&mut self.host_game, dt);
            for (client, game) in &mut self.clients {
                client.update(game, dt);
            }
        }
    }

    /// A chunk of the host's spawn area with a free cell for `object_type`,
    /// copied to every client. The footprint stays inside the chunk.
    pub fn shared_free_cell(&mut self, object_type: ObjectTypeId) -> (ChunkPosition, TileCoord) {
        let (w, h) = BuildableObject::new(object_type).expect("known object").size();
        let chunks = &mut self
            .host_game
            .world
            .planet_mut(PlanetType::VERDANT)
            .expect("host planet")
            .chunks;
        let (start, _) = chunks.find_valid_spawn_chunk(4);
        let mut found = None;
        'search: for dx in 0..WORLD_SIZE as i32 {
            let pos = start.offset(dx, 0, WORLD_SIZE);
            chunks.get_chunk_data_and_generate(pos);
            for tile in TileCoord::all() {
                let fits = tile.x as usize + w as usize <= CHUNK_TILE_SIZE && tile.y as usize + h as usize <= CHUNK_TILE_SIZE;
                if fits && chunks.can_place_object(pos, tile, object_type) {
                    found = Some((pos, tile));
                    break 'search;
                }
            }
        }
        let (pos, tile) = found.expect("free cell on the starting planet");
        let pod = chunks.get_chunk_data_and_generate(pos);
        for (_, game) in &mut self.clients {
            if let Some(planet) = game.world.planet_mut(PlanetType::VERDANT) {
                planet.chunks.set_chunk_data(pos, &pod);
            }
        }
        (pos, tile)
    }

    /// A host chunk holding an enterable structure, generating the whole
    /// planet if needed.
    pub fn find_structure_chunk(&mut self, planet: PlanetType) -> Option<ChunkPosition> {
        let chunks = &mut self.host_game.world.planet_mut(planet)?.chunks;
        for y in 0..WORLD_SIZE {
            for x in 0..WORLD_SIZE {
                let pos = ChunkPosition::new(x, y);
                chunks.get_chunk_data_and_generate(pos);
                if chunks.chunk(pos).is_some_and(|chunk| chunk.structure().is_some()) {
                    return Some(pos);
                }
            }
        }
        None
    }
}
